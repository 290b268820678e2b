// Copyright (c) Zefchain Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Core identifiers used by the indexer hub.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

#[cfg(test)]
#[path = "unit_tests/identifiers_tests.rs"]
mod identifiers_tests;

/// The length in bytes of a [`NodeAddress`].
pub const NODE_ADDRESS_LENGTH: usize = 20;

/// The stable identity of a node, derived from the public key it registered with.
#[derive(Clone, Copy, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct NodeAddress([u8; NODE_ADDRESS_LENGTH]);

/// An error parsing a [`NodeAddress`].
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AddressParseError {
    #[error("node address must start with `0x`: {0}")]
    MissingPrefix(String),
    #[error("node address must have {expected} bytes, found {found}")]
    InvalidLength { expected: usize, found: usize },
    #[error(transparent)]
    Hex(#[from] hex::FromHexError),
}

impl NodeAddress {
    /// Creates an address from its raw bytes.
    pub const fn new(bytes: [u8; NODE_ADDRESS_LENGTH]) -> Self {
        NodeAddress(bytes)
    }

    /// Returns the raw bytes of this address.
    pub const fn as_bytes(&self) -> &[u8; NODE_ADDRESS_LENGTH] {
        &self.0
    }

    /// Creates an address whose last byte is `value`. Used to build fixtures.
    #[cfg(with_testing)]
    pub fn test_address(value: u8) -> Self {
        let mut bytes = [0u8; NODE_ADDRESS_LENGTH];
        bytes[NODE_ADDRESS_LENGTH - 1] = value;
        NodeAddress(bytes)
    }
}

impl fmt::Display for NodeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for NodeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl FromStr for NodeAddress {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .ok_or_else(|| AddressParseError::MissingPrefix(s.to_string()))?;
        let bytes = hex::decode(digits)?;
        let found = bytes.len();
        let bytes = <[u8; NODE_ADDRESS_LENGTH]>::try_from(bytes).map_err(|_| {
            AddressParseError::InvalidLength {
                expected: NODE_ADDRESS_LENGTH,
                found,
            }
        })?;
        Ok(NodeAddress(bytes))
    }
}

impl Serialize for NodeAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for NodeAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

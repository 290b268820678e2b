// Copyright (c) Zefchain Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! The core of the indexer hub: selecting nodes able to answer a query, fanning the
//! query out to them, verifying their answers against each other, and turning the
//! outcome into reputation scores.

mod config;
pub mod detector;
pub mod distributor;
pub mod hub;
pub mod lock;
pub mod matcher;
pub mod node;
pub mod pool;
pub mod registry;
pub mod request;
pub mod response;
pub mod scheduler;
pub mod scorer;
pub mod staking;
#[cfg(with_testing)]
#[path = "unit_tests/test_utils.rs"]
pub mod test_utils;
pub mod verifier;

pub use crate::{
    config::{HubConfig, DEFAULT_NODE_COUNT, DEFAULT_SLASH_COUNT, DEFAULT_VERIFY_COUNT},
    hub::{Hub, HubError},
};

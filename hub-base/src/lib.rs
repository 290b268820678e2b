// Copyright (c) Zefchain Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! This module provides the common definitions shared by the indexer hub: node
//! identities and their lifecycle, reputation records, and the capability tables that
//! describe what a node indexes.

pub mod capability;
pub mod data_types;
pub mod identifiers;
pub mod node;
#[cfg(with_metrics)]
pub mod prometheus_util;
pub mod stat;
pub mod time;
pub mod tracing;

/// Returns early with an error if a condition is not satisfied.
#[macro_export]
macro_rules! ensure {
    ($cond:expr, $e:expr) => {
        if !($cond) {
            return Err($e.into());
        }
    };
}

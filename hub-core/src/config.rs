// Copyright (c) Zefchain Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

/// The default size of a quorum and of each cached node pool.
pub const DEFAULT_NODE_COUNT: usize = 3;
/// The number of invalid answers in one epoch after which a node is slashed.
pub const DEFAULT_SLASH_COUNT: u64 = 4;
/// The maximum number of platforms cross-checked after a round.
pub const DEFAULT_VERIFY_COUNT: usize = 3;

/// Tuning parameters of the hub.
#[derive(Clone, Debug, PartialEq, clap::Args)]
pub struct HubConfig {
    /// The number of nodes queried per request and kept in each node pool.
    #[arg(long, default_value = "3")]
    pub node_count: usize,

    /// The number of invalid answers in one epoch that zeroes the score of a node.
    #[arg(long, default_value = "4")]
    pub slash_count: u64,

    /// The maximum number of platforms cross-checked against out-of-set nodes.
    #[arg(long, default_value = "3")]
    pub verify_count: usize,

    /// How long a client waits for the first acceptable answer, in milliseconds.
    #[arg(long = "request-timeout-ms", default_value = "3000")]
    pub request_timeout_ms: u64,

    /// How long a single node request may take, in milliseconds. This bounds each
    /// request of a fan-out, which keeps running after the client stopped waiting, and
    /// each cross-check sent to a node outside the round.
    #[arg(long = "verification-timeout-ms", default_value = "5000")]
    pub verification_timeout_ms: u64,

    /// The interval between two runs of the reputation scorer, in seconds.
    #[arg(long = "score-interval-secs", default_value = "600")]
    pub score_interval_secs: u64,

    /// How long a node may stay silent before it is considered offline, in seconds.
    #[arg(long = "heartbeat-timeout-secs", default_value = "300")]
    pub heartbeat_timeout_secs: u64,

    /// The stake a node needs to be allowed to register.
    #[arg(long, default_value = "10000")]
    pub minimum_stake: f64,

    /// How long a scheduled job keeps its lease, in seconds.
    #[arg(long = "lock-ttl-secs", default_value = "60")]
    pub lock_ttl_secs: u64,
}

impl Default for HubConfig {
    fn default() -> Self {
        HubConfig {
            node_count: DEFAULT_NODE_COUNT,
            slash_count: DEFAULT_SLASH_COUNT,
            verify_count: DEFAULT_VERIFY_COUNT,
            request_timeout_ms: 3000,
            verification_timeout_ms: 5000,
            score_interval_secs: 600,
            heartbeat_timeout_secs: 300,
            minimum_stake: 10000.0,
            lock_ttl_secs: 60,
        }
    }
}

impl HubConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn verification_timeout(&self) -> Duration {
        Duration::from_millis(self.verification_timeout_ms)
    }

    pub fn score_interval(&self) -> Duration {
        Duration::from_secs(self.score_interval_secs)
    }

    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_secs(self.heartbeat_timeout_secs)
    }

    pub fn lock_ttl(&self) -> Duration {
        Duration::from_secs(self.lock_ttl_secs)
    }
}

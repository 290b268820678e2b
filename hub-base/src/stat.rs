// Copyright (c) Zefchain Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Reputation records and the endpoint projections cached from them.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{
    capability::{CapabilityTable, Indexer},
    data_types::{Epoch, Timestamp},
    identifiers::NodeAddress,
};

/// The reputation record of one node.
///
/// `score` is always recomputed from the other fields by the scorer and is never
/// edited directly.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Stat {
    pub address: NodeAddress,
    pub endpoint: String,
    /// Valid answers over the whole lifetime of the node.
    pub total_request: u64,
    /// Valid answers in the current epoch.
    pub epoch_request: u64,
    /// Invalid answers in the current epoch.
    pub epoch_invalid_request: u64,
    pub is_full_node: bool,
    pub is_rss_node: bool,
    pub is_public_good: bool,
    /// The number of distinct decentralized networks the node indexes.
    pub decentralized_network: u32,
    /// The number of distinct federated networks the node indexes.
    pub federated_network: u32,
    /// The number of capability records of the node.
    pub indexer: u32,
    /// The amount staked for the node on chain.
    pub staking: f64,
    pub score: f64,
    /// When the node last came online.
    pub reset_at: Timestamp,
    /// The epoch the per-epoch counters belong to.
    pub epoch: Epoch,
}

impl Stat {
    /// Creates the record of a newly registered node.
    pub fn new(address: NodeAddress, endpoint: impl Into<String>, now: Timestamp) -> Self {
        Stat {
            address,
            endpoint: endpoint.into(),
            reset_at: now,
            ..Stat::default()
        }
    }

    /// Recomputes the capability-derived flags and counts from `indexers`.
    pub fn apply_capabilities(&mut self, table: &CapabilityTable, indexers: &[Indexer]) {
        let (decentralized, federated) = table.network_diversity(indexers);
        self.is_full_node = table.is_full_node(indexers);
        self.is_rss_node = table.is_rss_node(indexers);
        self.decentralized_network = decentralized;
        self.federated_network = federated;
        self.indexer = indexers
            .iter()
            .filter(|indexer| table.recognizes(indexer))
            .count() as u32;
    }

    /// Whether this node belongs to the pool serving `category`.
    pub fn serves(&self, category: NodeCategory) -> bool {
        match category {
            NodeCategory::Rss => self.is_rss_node,
            NodeCategory::Full => self.is_full_node,
        }
    }

    /// The cached projection of this record.
    pub fn endpoint(&self) -> NodeEndpoint {
        NodeEndpoint {
            address: self.address,
            endpoint: self.endpoint.clone(),
        }
    }
}

/// A node address and the endpoint to reach it.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeEndpoint {
    pub address: NodeAddress,
    pub endpoint: String,
}

/// A category of queries with its own pool of candidate nodes.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeCategory {
    Rss,
    Full,
}

impl NodeCategory {
    pub const ALL: [NodeCategory; 2] = [NodeCategory::Rss, NodeCategory::Full];

    /// The cache key holding the pool of this category.
    pub fn cache_key(&self) -> String {
        format!("nodes:{self}")
    }
}

impl fmt::Display for NodeCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeCategory::Rss => f.write_str("rss"),
            NodeCategory::Full => f.write_str("full"),
        }
    }
}

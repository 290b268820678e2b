// Copyright (c) Zefchain Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Storage and cache abstractions for the indexer hub.
//!
//! The hub core never owns authoritative state: nodes, reputation records and
//! capability records live behind a [`Store`], and the ranked node pools behind a
//! [`Cache`].

mod memory;

use async_trait::async_trait;
use hub_base::{
    capability::{Indexer, Network, Worker},
    identifiers::NodeAddress,
    node::{Node, NodeStatus},
    stat::{NodeCategory, Stat},
};
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

pub use crate::memory::{MemoryCache, MemoryStore, DEFAULT_CACHE_CAPACITY};

/// An error raised by a [`Store`] backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("node {0} is not registered")]
    NodeNotFound(NodeAddress),
    #[error("store backend failure: {0}")]
    Backend(String),
}

/// An error raised by a [`Cache`] backend.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The key is not present. Callers rebuild the entry instead of failing.
    #[error("cache miss")]
    Miss,
    #[error("failed to (de)serialize cached value: {0}")]
    Codec(#[from] serde_json::Error),
    #[error("cache backend failure: {0}")]
    Backend(String),
}

impl CacheError {
    /// Whether this error only reports a missing key.
    pub fn is_miss(&self) -> bool {
        matches!(self, CacheError::Miss)
    }
}

/// Filters for [`Store::find_nodes`]. Empty filters match everything.
#[derive(Clone, Debug, Default)]
pub struct NodeQuery {
    pub addresses: Option<Vec<NodeAddress>>,
    pub status: Option<NodeStatus>,
}

/// Filters for [`Store::find_node_stats`].
///
/// Results are ordered by score, highest first, with ties broken by address.
#[derive(Clone, Debug, Default)]
pub struct StatQuery {
    pub addresses: Option<Vec<NodeAddress>>,
    /// Only records of nodes serving this category.
    pub category: Option<NodeCategory>,
    /// Only records of nodes in this status.
    pub status: Option<NodeStatus>,
    /// Only records whose `epoch_invalid_request` is strictly below this bound.
    pub max_invalid_request: Option<u64>,
    pub limit: Option<usize>,
}

impl StatQuery {
    pub fn matches(&self, stat: &Stat) -> bool {
        self.addresses
            .as_ref()
            .map_or(true, |addresses| addresses.contains(&stat.address))
            && self.category.map_or(true, |category| stat.serves(category))
            && self
                .max_invalid_request
                .map_or(true, |bound| stat.epoch_invalid_request < bound)
    }
}

/// Filters for [`Store::find_node_indexers`]. Empty filters match everything.
#[derive(Clone, Debug, Default)]
pub struct IndexerQuery {
    pub addresses: Option<Vec<NodeAddress>>,
    pub networks: Option<Vec<Network>>,
    pub workers: Option<Vec<Worker>>,
}

impl IndexerQuery {
    pub fn matches(&self, indexer: &Indexer) -> bool {
        self.addresses
            .as_ref()
            .map_or(true, |addresses| addresses.contains(&indexer.address))
            && self
                .networks
                .as_ref()
                .map_or(true, |networks| networks.contains(&indexer.network))
            && self
                .workers
                .as_ref()
                .map_or(true, |workers| workers.contains(&indexer.worker))
    }
}

/// The relational store holding nodes, their reputation and their capabilities.
#[async_trait]
pub trait Store: Send + Sync {
    /// Returns the nodes matching `query`.
    async fn find_nodes(&self, query: &NodeQuery) -> Result<Vec<Node>, StoreError>;

    /// Inserts or replaces a node.
    async fn save_node(&self, node: Node) -> Result<(), StoreError>;

    /// Returns the reputation records matching `query`, best score first.
    async fn find_node_stats(&self, query: &StatQuery) -> Result<Vec<Stat>, StoreError>;

    /// Inserts or replaces a batch of reputation records.
    async fn save_node_stats(&self, stats: Vec<Stat>) -> Result<(), StoreError>;

    /// Returns the capability records matching `query`.
    async fn find_node_indexers(&self, query: &IndexerQuery) -> Result<Vec<Indexer>, StoreError>;

    /// Replaces every capability record of `address` with `indexers`.
    async fn save_node_indexers(
        &self,
        address: NodeAddress,
        indexers: Vec<Indexer>,
    ) -> Result<(), StoreError>;

    /// Returns the node with the given address, if registered.
    async fn find_node(&self, address: NodeAddress) -> Result<Option<Node>, StoreError> {
        let query = NodeQuery {
            addresses: Some(vec![address]),
            status: None,
        };
        Ok(self.find_nodes(&query).await?.into_iter().next())
    }

    /// Returns the reputation record of `address`, if any.
    async fn find_node_stat(&self, address: NodeAddress) -> Result<Option<Stat>, StoreError> {
        let query = StatQuery {
            addresses: Some(vec![address]),
            ..StatQuery::default()
        };
        Ok(self.find_node_stats(&query).await?.into_iter().next())
    }
}

/// A key-value cache that signals missing keys with [`CacheError::Miss`].
#[async_trait]
pub trait Cache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Vec<u8>, CacheError>;

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<(), CacheError>;
}

/// JSON helpers on top of any [`Cache`].
#[async_trait]
pub trait CacheExt: Cache {
    /// Reads and decodes the value stored under `key`.
    async fn get_json<T: DeserializeOwned + Send>(&self, key: &str) -> Result<T, CacheError> {
        let bytes = self.get(key).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Encodes and stores `value` under `key`.
    async fn set_json<T: Serialize + Sync>(&self, key: &str, value: &T) -> Result<(), CacheError> {
        let bytes = serde_json::to_vec(value)?;
        self.set(key, bytes).await
    }
}

impl<C: Cache + ?Sized> CacheExt for C {}

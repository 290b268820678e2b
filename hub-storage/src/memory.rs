// Copyright (c) Zefchain Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! In-memory implementations of [`Store`] and [`Cache`].

#[cfg(test)]
#[path = "unit_tests/memory_tests.rs"]
mod unit_tests;

use std::{cmp::Ordering, collections::BTreeMap, num::NonZeroUsize, sync::Arc};

use async_trait::async_trait;
use hub_base::{capability::Indexer, identifiers::NodeAddress, node::Node, stat::Stat};
use lru::LruCache;
use tokio::sync::{Mutex, RwLock};
use tracing::trace;

use crate::{Cache, CacheError, IndexerQuery, NodeQuery, StatQuery, Store, StoreError};

/// The default number of entries kept by a [`MemoryCache`].
pub const DEFAULT_CACHE_CAPACITY: usize = 1000;

#[derive(Default)]
struct State {
    nodes: BTreeMap<NodeAddress, Node>,
    stats: BTreeMap<NodeAddress, Stat>,
    indexers: BTreeMap<NodeAddress, Vec<Indexer>>,
}

/// A [`Store`] keeping everything in process memory.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<RwLock<State>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn by_score(left: &Stat, right: &Stat) -> Ordering {
    right
        .score
        .total_cmp(&left.score)
        .then_with(|| left.address.cmp(&right.address))
}

#[async_trait]
impl Store for MemoryStore {
    async fn find_nodes(&self, query: &NodeQuery) -> Result<Vec<Node>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .nodes
            .values()
            .filter(|node| {
                query
                    .addresses
                    .as_ref()
                    .map_or(true, |addresses| addresses.contains(&node.address))
                    && query.status.map_or(true, |status| node.status() == status)
            })
            .cloned()
            .collect())
    }

    async fn save_node(&self, node: Node) -> Result<(), StoreError> {
        trace!(address = %node.address, status = %node.status(), "saving node");
        self.state.write().await.nodes.insert(node.address, node);
        Ok(())
    }

    async fn find_node_stats(&self, query: &StatQuery) -> Result<Vec<Stat>, StoreError> {
        let state = self.state.read().await;
        let mut stats = state
            .stats
            .values()
            .filter(|stat| query.matches(stat))
            .filter(|stat| {
                query.status.map_or(true, |status| {
                    state
                        .nodes
                        .get(&stat.address)
                        .is_some_and(|node| node.status() == status)
                })
            })
            .cloned()
            .collect::<Vec<_>>();
        stats.sort_by(by_score);
        if let Some(limit) = query.limit {
            stats.truncate(limit);
        }
        Ok(stats)
    }

    async fn save_node_stats(&self, stats: Vec<Stat>) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        for stat in stats {
            state.stats.insert(stat.address, stat);
        }
        Ok(())
    }

    async fn find_node_indexers(&self, query: &IndexerQuery) -> Result<Vec<Indexer>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .indexers
            .values()
            .flatten()
            .filter(|indexer| query.matches(indexer))
            .cloned()
            .collect())
    }

    async fn save_node_indexers(
        &self,
        address: NodeAddress,
        indexers: Vec<Indexer>,
    ) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        state.indexers.remove(&address);
        let indexers = indexers
            .into_iter()
            .filter(|indexer| indexer.address == address)
            .collect::<Vec<_>>();
        if !indexers.is_empty() {
            state.indexers.insert(address, indexers);
        }
        Ok(())
    }
}

/// A least-recently used [`Cache`] kept in process memory.
#[derive(Clone)]
pub struct MemoryCache {
    entries: Arc<Mutex<LruCache<String, Vec<u8>>>>,
}

impl Default for MemoryCache {
    fn default() -> Self {
        let capacity = NonZeroUsize::try_from(DEFAULT_CACHE_CAPACITY)
            .expect("Default cache capacity is larger than zero");
        Self::with_capacity(capacity)
    }
}

impl MemoryCache {
    pub fn with_capacity(capacity: NonZeroUsize) -> Self {
        MemoryCache {
            entries: Arc::new(Mutex::new(LruCache::new(capacity))),
        }
    }

    /// Drops the entry stored under `key`, if any.
    pub async fn invalidate(&self, key: &str) {
        self.entries.lock().await.pop(key);
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Vec<u8>, CacheError> {
        self.entries
            .lock()
            .await
            .get(key)
            .cloned()
            .ok_or(CacheError::Miss)
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<(), CacheError> {
        self.entries.lock().await.put(key.to_owned(), value);
        Ok(())
    }
}

// Copyright (c) Zefchain Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! The ranked pools of nodes serving each category of queries.

#[cfg(test)]
#[path = "unit_tests/pool_tests.rs"]
mod unit_tests;

use std::sync::Arc;

use hub_base::{
    identifiers::NodeAddress,
    node::NodeStatus,
    stat::{NodeCategory, NodeEndpoint, Stat},
};
use hub_storage::{Cache, CacheError, CacheExt, StatQuery, Store, StoreError};
use thiserror::Error;
use tracing::{debug, trace};

#[derive(Debug, Error)]
pub enum PoolError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Cache(#[from] CacheError),
}

/// Serves node pools from the cache and rebuilds them from the store on a miss.
#[derive(Clone)]
pub struct NodePool {
    store: Arc<dyn Store>,
    cache: Arc<dyn Cache>,
    node_count: usize,
    slash_count: u64,
}

impl NodePool {
    pub fn new(
        store: Arc<dyn Store>,
        cache: Arc<dyn Cache>,
        node_count: usize,
        slash_count: u64,
    ) -> Self {
        NodePool {
            store,
            cache,
            node_count,
            slash_count,
        }
    }

    /// The query selecting the best eligible nodes, optionally among `addresses`.
    fn eligible(
        &self,
        category: Option<NodeCategory>,
        addresses: Option<Vec<NodeAddress>>,
    ) -> StatQuery {
        StatQuery {
            addresses,
            category,
            status: Some(NodeStatus::Online),
            max_invalid_request: Some(self.slash_count),
            limit: Some(self.node_count),
        }
    }

    /// Returns the pool of `category`, best node first.
    ///
    /// A cache miss rebuilds the pool; any other cache failure is returned.
    pub async fn retrieve_nodes(
        &self,
        category: NodeCategory,
    ) -> Result<Vec<NodeEndpoint>, PoolError> {
        let key = category.cache_key();
        match self.cache.get_json::<Vec<NodeEndpoint>>(&key).await {
            Ok(nodes) => {
                trace!(%category, count = nodes.len(), "node pool served from cache");
                Ok(nodes)
            }
            Err(CacheError::Miss) => self.rebuild(category).await,
            Err(error) => Err(error.into()),
        }
    }

    /// Recomputes the pool of `category` from the store and caches it.
    pub async fn rebuild(&self, category: NodeCategory) -> Result<Vec<NodeEndpoint>, PoolError> {
        let stats = self
            .store
            .find_node_stats(&self.eligible(Some(category), None))
            .await?;
        let nodes = stats.iter().map(Stat::endpoint).collect::<Vec<_>>();
        self.cache.set_json(&category.cache_key(), &nodes).await?;
        debug!(%category, count = nodes.len(), "node pool rebuilt");
        Ok(nodes)
    }

    /// Returns the nodes for an account query.
    ///
    /// The best of the `matches` come first; the remaining slots are filled from the
    /// full-node pool without repeating a node.
    pub async fn retrieve_account_nodes(
        &self,
        matches: &[NodeAddress],
    ) -> Result<Vec<NodeEndpoint>, PoolError> {
        let mut nodes = if matches.is_empty() {
            Vec::new()
        } else {
            self.store
                .find_node_stats(&self.eligible(None, Some(matches.to_vec())))
                .await?
                .iter()
                .map(Stat::endpoint)
                .collect::<Vec<_>>()
        };
        if nodes.len() < self.node_count {
            for node in self.retrieve_nodes(NodeCategory::Full).await? {
                if nodes.len() == self.node_count {
                    break;
                }
                if !nodes.iter().any(|known| known.address == node.address) {
                    nodes.push(node);
                }
            }
        }
        Ok(nodes)
    }
}

// Copyright (c) Zefchain Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Scripted nodes and fixtures for testing the hub.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use hub_base::{
    capability::{CapabilityTable, Indexer, Network, Worker},
    data_types::Timestamp,
    identifiers::NodeAddress,
    node::{Node, NodeStatus},
    stat::{NodeEndpoint, Stat},
};
use hub_storage::{
    IndexerQuery, MemoryCache, MemoryStore, NodeQuery, StatQuery, Store, StoreError,
};
use serde_json::json;

use crate::{
    node::{NodeClient, NodeError},
    staking::StaticStakingClient,
    Hub, HubConfig,
};

/// The scripted answer of a [`FakeNodeClient`] for one URL.
#[derive(Clone, Debug)]
pub struct Reply {
    pub delay: Duration,
    pub result: Result<Vec<u8>, NodeError>,
}

/// A [`NodeClient`] answering from a script instead of the network.
///
/// URLs without a script fail with a transport error.
#[derive(Clone, Default)]
pub struct FakeNodeClient {
    replies: Arc<Mutex<HashMap<String, Reply>>>,
    requests: Arc<Mutex<Vec<String>>>,
}

impl FakeNodeClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answers `body` on `url` after `delay`.
    pub fn reply_after(&self, url: impl Into<String>, delay: Duration, body: impl Into<Vec<u8>>) {
        self.script(url, delay, Ok(body.into()));
    }

    /// Answers `body` on `url` immediately.
    pub fn reply(&self, url: impl Into<String>, body: impl Into<Vec<u8>>) {
        self.reply_after(url, Duration::ZERO, body);
    }

    /// Fails requests to `url` with `error` after `delay`.
    pub fn fail_after(&self, url: impl Into<String>, delay: Duration, error: NodeError) {
        self.script(url, delay, Err(error));
    }

    fn script(&self, url: impl Into<String>, delay: Duration, result: Result<Vec<u8>, NodeError>) {
        self.replies
            .lock()
            .unwrap()
            .insert(url.into(), Reply { delay, result });
    }

    /// The URLs requested so far, in order.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl NodeClient for FakeNodeClient {
    async fn get(&self, url: &str) -> Result<Vec<u8>, NodeError> {
        self.requests.lock().unwrap().push(url.to_owned());
        let reply = self.replies.lock().unwrap().get(url).cloned();
        let Some(Reply { delay, result }) = reply else {
            return Err(NodeError::Transport {
                error: format!("no route to {url}"),
            });
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        result
    }
}

/// A [`Store`] over a [`MemoryStore`] whose writes of reputation records can be made to fail.
#[derive(Clone, Default)]
pub struct FlakyStore {
    pub inner: MemoryStore,
    fail_stat_writes: Arc<AtomicBool>,
}

impl FlakyStore {
    pub fn fail_stat_writes(&self, fail: bool) {
        self.fail_stat_writes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl Store for FlakyStore {
    async fn find_nodes(&self, query: &NodeQuery) -> Result<Vec<Node>, StoreError> {
        self.inner.find_nodes(query).await
    }

    async fn save_node(&self, node: Node) -> Result<(), StoreError> {
        self.inner.save_node(node).await
    }

    async fn find_node_stats(&self, query: &StatQuery) -> Result<Vec<Stat>, StoreError> {
        self.inner.find_node_stats(query).await
    }

    async fn save_node_stats(&self, stats: Vec<Stat>) -> Result<(), StoreError> {
        if self.fail_stat_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("stat writes disabled".to_owned()));
        }
        self.inner.save_node_stats(stats).await
    }

    async fn find_node_indexers(&self, query: &IndexerQuery) -> Result<Vec<Indexer>, StoreError> {
        self.inner.find_node_indexers(query).await
    }

    async fn save_node_indexers(
        &self,
        address: NodeAddress,
        indexers: Vec<Indexer>,
    ) -> Result<(), StoreError> {
        self.inner.save_node_indexers(address, indexers).await
    }
}

/// The endpoint of the test node `id`.
pub fn endpoint(id: u8) -> String {
    format!("https://node-{id}.example")
}

/// Every capability record a full node declares.
pub fn full_node_indexers(table: &CapabilityTable, address: NodeAddress) -> Vec<Indexer> {
    table
        .worker_networks
        .iter()
        .flat_map(|(worker, networks)| {
            networks.iter().map(move |network| Indexer {
                address,
                network: *network,
                worker: *worker,
            })
        })
        .collect()
}

/// A single-activity answer.
pub fn activity_payload(id: &str, content: &str) -> Vec<u8> {
    json!({ "data": { "id": id, "content": content } })
        .to_string()
        .into_bytes()
}

/// An activity-list answer with one activity per `(id, platform, network)`.
pub fn activities_payload(activities: &[(&str, &str, &str)]) -> Vec<u8> {
    let data = activities
        .iter()
        .map(|(id, platform, network)| {
            json!({ "id": id, "platform": platform, "network": network })
        })
        .collect::<Vec<_>>();
    json!({ "data": data, "meta": { "cursor": "next" } })
        .to_string()
        .into_bytes()
}

/// The single-activity answer matching one entry of [`activities_payload`].
pub fn listed_activity_payload(id: &str, platform: &str, network: &str) -> Vec<u8> {
    json!({ "data": { "id": id, "platform": platform, "network": network } })
        .to_string()
        .into_bytes()
}

/// A store, cache and scripted network to build hubs from.
pub struct TestNetwork {
    pub config: HubConfig,
    pub table: Arc<CapabilityTable>,
    pub store: FlakyStore,
    pub cache: MemoryCache,
    pub client: FakeNodeClient,
    pub staking: StaticStakingClient,
}

impl Default for TestNetwork {
    fn default() -> Self {
        TestNetwork {
            config: HubConfig::default(),
            table: Arc::new(CapabilityTable::default()),
            store: FlakyStore::default(),
            cache: MemoryCache::default(),
            client: FakeNodeClient::new(),
            staking: StaticStakingClient::default(),
        }
    }
}

impl TestNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an online node `id` with reputation `score` and the given capabilities.
    pub async fn add_node(&self, id: u8, score: f64, indexers: Vec<Indexer>) -> NodeEndpoint {
        let address = NodeAddress::test_address(id);
        let now = Timestamp::from(0);
        let node = Node::new(address, endpoint(id), Default::default(), false, now)
            .with_status(NodeStatus::Online);
        let mut stat = Stat::new(address, endpoint(id), now);
        stat.score = score;
        stat.apply_capabilities(&self.table, &indexers);
        self.store.save_node(node).await.unwrap();
        self.store.save_node_stats(vec![stat]).await.unwrap();
        self.store.save_node_indexers(address, indexers).await.unwrap();
        NodeEndpoint {
            address,
            endpoint: endpoint(id),
        }
    }

    /// Adds an online full node `id` with reputation `score`.
    pub async fn add_full_node(&self, id: u8, score: f64) -> NodeEndpoint {
        let indexers = full_node_indexers(&self.table, NodeAddress::test_address(id));
        self.add_node(id, score, indexers).await
    }

    /// Adds an online node `id` serving only `worker` on `network`.
    pub async fn add_light_node(
        &self,
        id: u8,
        score: f64,
        network: Network,
        worker: Worker,
    ) -> NodeEndpoint {
        let address = NodeAddress::test_address(id);
        let indexers = vec![Indexer {
            address,
            network,
            worker,
        }];
        self.add_node(id, score, indexers).await
    }

    pub async fn stat(&self, id: u8) -> Stat {
        self.store
            .find_node_stat(NodeAddress::test_address(id))
            .await
            .unwrap()
            .unwrap()
    }

    pub fn hub(&self) -> Hub {
        Hub::new(
            &self.config,
            self.table.clone(),
            Arc::new(self.store.clone()),
            Arc::new(self.cache.clone()),
            Arc::new(self.client.clone()),
        )
    }
}

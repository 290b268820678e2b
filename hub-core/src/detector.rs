// Copyright (c) Zefchain Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use hub_base::{data_types::Timestamp, node::NodeStatus};
use hub_storage::{NodeQuery, Store, StoreError};
use tracing::info;

use crate::scheduler::{Job, JobError};

/// Moves online nodes that stopped sending heartbeats to the offline status.
#[derive(Clone)]
pub struct HeartbeatDetector {
    store: Arc<dyn Store>,
    heartbeat_timeout: Duration,
    interval: Duration,
}

impl HeartbeatDetector {
    pub fn new(store: Arc<dyn Store>, heartbeat_timeout: Duration, interval: Duration) -> Self {
        HeartbeatDetector {
            store,
            heartbeat_timeout,
            interval,
        }
    }

    /// Returns the number of nodes taken offline at time `now`.
    pub async fn detect(&self, now: Timestamp) -> Result<usize, StoreError> {
        let query = NodeQuery {
            addresses: None,
            status: Some(NodeStatus::Online),
        };
        let deadline = now.saturating_sub(self.heartbeat_timeout);
        let mut count = 0;
        for mut node in self.store.find_nodes(&query).await? {
            if node.last_heartbeat >= deadline {
                continue;
            }
            if node.update_status(NodeStatus::Offline).is_ok() {
                info!(
                    address = %node.address,
                    last_heartbeat = %node.last_heartbeat,
                    "node went offline"
                );
                self.store.save_node(node).await?;
                count += 1;
            }
        }
        Ok(count)
    }
}

#[async_trait]
impl Job for HeartbeatDetector {
    fn name(&self) -> &str {
        "heartbeat-detector"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn run(&self) -> Result<(), JobError> {
        self.detect(Timestamp::now()).await?;
        Ok(())
    }
}

// Copyright (c) Zefchain Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Registration of nodes and their heartbeats.

#[cfg(test)]
#[path = "unit_tests/registry_tests.rs"]
mod unit_tests;

use std::sync::Arc;

use hub_base::{
    capability::{CapabilityTable, NodeConfig},
    data_types::Timestamp,
    identifiers::NodeAddress,
    node::{Node, NodeStatus, NodeStatusTransitionError},
    stat::Stat,
};
use hub_storage::{Store, StoreError};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::staking::{StakingClient, StakingError};

#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error("node {address} stakes {staked}, below the minimum of {required}")]
    InsufficientStake {
        address: NodeAddress,
        staked: f64,
        required: f64,
    },
    #[error("invalid endpoint {endpoint:?}: {error}")]
    InvalidEndpoint {
        endpoint: String,
        error: url::ParseError,
    },
    #[error("node {0} is not registered")]
    UnknownNode(NodeAddress),
    #[error(transparent)]
    Transition(#[from] NodeStatusTransitionError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Staking(#[from] StakingError),
}

/// What a node submits to join the network.
///
/// The signature proving ownership of `address` is checked by the transport layer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Registration {
    pub address: NodeAddress,
    pub endpoint: String,
    #[serde(default)]
    pub config: NodeConfig,
    #[serde(default)]
    pub is_public_good: bool,
}

/// Admits nodes and keeps track of their liveness.
#[derive(Clone)]
pub struct NodeRegistry {
    store: Arc<dyn Store>,
    staking: Arc<dyn StakingClient>,
    table: Arc<CapabilityTable>,
    minimum_stake: f64,
}

impl NodeRegistry {
    pub fn new(
        store: Arc<dyn Store>,
        staking: Arc<dyn StakingClient>,
        table: Arc<CapabilityTable>,
        minimum_stake: f64,
    ) -> Self {
        NodeRegistry {
            store,
            staking,
            table,
            minimum_stake,
        }
    }

    /// Registers a new node, or refreshes the declaration of a known one.
    ///
    /// The capability records of the node are replaced by those of `registration`.
    pub async fn register(
        &self,
        registration: Registration,
        now: Timestamp,
    ) -> Result<Node, RegistrationError> {
        let Registration {
            address,
            endpoint,
            config,
            is_public_good,
        } = registration;
        url::Url::parse(&endpoint).map_err(|error| RegistrationError::InvalidEndpoint {
            endpoint: endpoint.clone(),
            error,
        })?;
        let staked = self.staking.staking(address).await?;
        hub_base::ensure!(
            staked >= self.minimum_stake,
            RegistrationError::InsufficientStake {
                address,
                staked,
                required: self.minimum_stake,
            }
        );

        let node = match self.store.find_node(address).await? {
            None => Node::new(address, endpoint.clone(), config, is_public_good, now),
            Some(mut node) => {
                if node.status() == NodeStatus::Exited {
                    node.update_status(NodeStatus::Registered)?;
                }
                node.endpoint = endpoint.clone();
                node.config = config;
                node.is_public_good = is_public_good;
                node
            }
        };

        let indexers = node.config.indexers(address);
        let mut stat = self
            .store
            .find_node_stat(address)
            .await?
            .unwrap_or_else(|| Stat::new(address, endpoint.clone(), now));
        stat.endpoint = endpoint;
        stat.is_public_good = is_public_good;
        stat.staking = staked;
        stat.apply_capabilities(&self.table, &indexers);

        self.store.save_node_indexers(address, indexers).await?;
        self.store.save_node_stats(vec![stat]).await?;
        self.store.save_node(node.clone()).await?;
        info!(%address, status = %node.status(), "node registered");
        Ok(node)
    }

    /// Records a heartbeat of `address` at time `now`.
    ///
    /// Registered, offline and slashed nodes come online and restart their uptime.
    pub async fn heartbeat(
        &self,
        address: NodeAddress,
        now: Timestamp,
    ) -> Result<Node, RegistrationError> {
        let mut node = self
            .store
            .find_node(address)
            .await?
            .ok_or(RegistrationError::UnknownNode(address))?;
        if matches!(
            node.status(),
            NodeStatus::Registered | NodeStatus::Offline | NodeStatus::Slashed
        ) {
            node.update_status(NodeStatus::Online)?;
            if let Some(mut stat) = self.store.find_node_stat(address).await? {
                stat.reset_at = now;
                self.store.save_node_stats(vec![stat]).await?;
            }
            info!(%address, "node online");
        }
        node.last_heartbeat = now;
        self.store.save_node(node.clone()).await?;
        Ok(node)
    }

    /// Announces that an online node is leaving at the end of the epoch.
    pub async fn request_exit(&self, address: NodeAddress) -> Result<Node, RegistrationError> {
        let mut node = self
            .store
            .find_node(address)
            .await?
            .ok_or(RegistrationError::UnknownNode(address))?;
        node.update_status(NodeStatus::Exiting)?;
        self.store.save_node(node.clone()).await?;
        info!(%address, "node exiting");
        Ok(node)
    }
}

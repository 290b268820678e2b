// Copyright (c) Zefchain Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Nodes registered with the hub and the state machine governing their status.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{capability::NodeConfig, data_types::Timestamp, identifiers::NodeAddress};

#[cfg(test)]
#[path = "unit_tests/node_tests.rs"]
mod node_tests;

/// The lifecycle status of a node.
///
/// ```text
/// Registered → Online | Exited
/// Online     → Exiting | Exited | Slashed | Offline
/// Exiting    → Exited
/// Slashed    → Online | Offline
/// Offline    → Online | Exited
/// Exited     → Registered
/// ```
///
/// Any other pair is rejected, including self-transitions.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    #[default]
    Registered,
    Online,
    Exiting,
    Exited,
    Slashed,
    Offline,
}

impl NodeStatus {
    /// All the statuses, in declaration order.
    pub const ALL: [NodeStatus; 6] = [
        NodeStatus::Registered,
        NodeStatus::Online,
        NodeStatus::Exiting,
        NodeStatus::Exited,
        NodeStatus::Slashed,
        NodeStatus::Offline,
    ];

    /// Returns whether a node in this status may move to `target`.
    pub const fn can_transition_to(&self, target: NodeStatus) -> bool {
        use NodeStatus::*;
        matches!(
            (self, target),
            (Registered, Online)
                | (Registered, Exited)
                | (Online, Exiting)
                | (Online, Exited)
                | (Online, Slashed)
                | (Online, Offline)
                | (Exiting, Exited)
                | (Slashed, Online)
                | (Slashed, Offline)
                | (Offline, Online)
                | (Offline, Exited)
                | (Exited, Registered)
        )
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NodeStatus::Registered => "registered",
            NodeStatus::Online => "online",
            NodeStatus::Exiting => "exiting",
            NodeStatus::Exited => "exited",
            NodeStatus::Slashed => "slashed",
            NodeStatus::Offline => "offline",
        };
        f.write_str(name)
    }
}

/// A transition that is not part of the node lifecycle was requested.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("node {address} cannot move from status {from} to {to}")]
pub struct NodeStatusTransitionError {
    pub address: NodeAddress,
    pub from: NodeStatus,
    pub to: NodeStatus,
}

/// A node registered with the hub.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// The stable identity of the node.
    pub address: NodeAddress,
    /// The URL prefix under which the node serves its data.
    pub endpoint: String,
    /// The workers and networks the node declared it indexes.
    pub config: NodeConfig,
    /// Whether the node is operated as a public good.
    pub is_public_good: bool,
    status: NodeStatus,
    /// When the node last reported as alive.
    pub last_heartbeat: Timestamp,
    pub created_at: Timestamp,
}

impl Node {
    /// Creates a freshly registered node.
    pub fn new(
        address: NodeAddress,
        endpoint: impl Into<String>,
        config: NodeConfig,
        is_public_good: bool,
        now: Timestamp,
    ) -> Self {
        Node {
            address,
            endpoint: endpoint.into(),
            config,
            is_public_good,
            status: NodeStatus::Registered,
            last_heartbeat: now,
            created_at: now,
        }
    }

    /// The current lifecycle status.
    pub fn status(&self) -> NodeStatus {
        self.status
    }

    /// Moves the node to `target`, leaving it untouched if the lifecycle forbids it.
    pub fn update_status(&mut self, target: NodeStatus) -> Result<(), NodeStatusTransitionError> {
        crate::ensure!(
            self.status.can_transition_to(target),
            NodeStatusTransitionError {
                address: self.address,
                from: self.status,
                to: target,
            }
        );
        self.status = target;
        Ok(())
    }

    /// Returns a copy of this node in an arbitrary status. Used to build fixtures.
    #[cfg(with_testing)]
    pub fn with_status(mut self, status: NodeStatus) -> Self {
        self.status = status;
        self
    }
}

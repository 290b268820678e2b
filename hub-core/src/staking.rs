// Copyright (c) Zefchain Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! The on-chain inputs of the hub: staked amounts and the current epoch.

use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, RwLock,
    },
    time::Duration,
};

use async_trait::async_trait;
use hub_base::{
    data_types::{Epoch, Timestamp},
    identifiers::NodeAddress,
};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StakingError {
    #[error("failed to read staking data: {0}")]
    Unavailable(String),
}

/// Reads staking data from the chain.
#[async_trait]
pub trait StakingClient: Send + Sync {
    /// The amount currently staked for the node at `address`.
    async fn staking(&self, address: NodeAddress) -> Result<f64, StakingError>;

    /// The current settlement epoch.
    async fn current_epoch(&self) -> Result<Epoch, StakingError>;
}

/// A [`StakingClient`] answering from configured values.
///
/// The epoch is either set explicitly or derived from the wall clock when an epoch
/// length is configured.
#[derive(Clone, Default)]
pub struct StaticStakingClient {
    stakes: Arc<RwLock<BTreeMap<NodeAddress, f64>>>,
    epoch: Arc<AtomicU64>,
    epoch_length: Option<Duration>,
}

impl StaticStakingClient {
    pub fn new(stakes: BTreeMap<NodeAddress, f64>) -> Self {
        StaticStakingClient {
            stakes: Arc::new(RwLock::new(stakes)),
            ..StaticStakingClient::default()
        }
    }

    /// Derives the epoch from the wall clock, one epoch every `epoch_length`.
    pub fn with_epoch_length(mut self, epoch_length: Duration) -> Self {
        self.epoch_length = Some(epoch_length).filter(|length| !length.is_zero());
        self
    }

    pub fn set_stake(&self, address: NodeAddress, amount: f64) {
        if let Ok(mut stakes) = self.stakes.write() {
            stakes.insert(address, amount);
        }
    }

    pub fn set_epoch(&self, epoch: Epoch) {
        self.epoch.store(epoch.0, Ordering::SeqCst);
    }
}

#[async_trait]
impl StakingClient for StaticStakingClient {
    async fn staking(&self, address: NodeAddress) -> Result<f64, StakingError> {
        let stakes = self
            .stakes
            .read()
            .map_err(|error| StakingError::Unavailable(error.to_string()))?;
        Ok(stakes.get(&address).copied().unwrap_or_default())
    }

    async fn current_epoch(&self) -> Result<Epoch, StakingError> {
        match self.epoch_length {
            Some(length) => {
                let elapsed = Duration::from_micros(Timestamp::now().micros());
                Ok(Epoch(elapsed.as_secs() / length.as_secs().max(1)))
            }
            None => Ok(Epoch(self.epoch.load(Ordering::SeqCst))),
        }
    }
}

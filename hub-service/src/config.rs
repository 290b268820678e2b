// Copyright (c) Zefchain Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use std::{
    fs::{self, OpenOptions},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use hub_base::{capability::CapabilityTable, data_types::Timestamp};
use hub_core::{
    registry::{NodeRegistry, Registration},
    scorer::ReputationScorer,
    staking::StaticStakingClient,
    HubConfig,
};
use hub_storage::{MemoryCache, MemoryStore};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{info, warn};

pub trait Import: DeserializeOwned {
    fn read(path: &Path) -> Result<Self, std::io::Error> {
        let data = fs::read(path)?;
        Ok(serde_json::from_slice(data.as_slice())?)
    }
}

pub trait Export: Serialize {
    fn write(&self, path: &Path) -> Result<(), std::io::Error> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;
        let mut writer = BufWriter::new(file);
        let data = serde_json::to_string_pretty(self)?;
        writer.write_all(data.as_ref())?;
        writer.write_all(b"\n")?;
        Ok(())
    }
}

impl Import for CapabilityTable {}
impl Export for CapabilityTable {}

/// A node to register at startup, with the amount staked for it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodeSeed {
    #[serde(flatten)]
    pub registration: Registration,
    pub stake: f64,
}

impl Import for Vec<NodeSeed> {}

/// Where the initial state of the hub comes from.
#[derive(Clone, Debug, Default, clap::Args)]
pub struct SeedOptions {
    /// A JSON file replacing the built-in capability table.
    #[arg(long)]
    pub capabilities: Option<PathBuf>,

    /// A JSON list of nodes to register and bring online at startup.
    #[arg(long)]
    pub nodes: Option<PathBuf>,

    /// The length of a staking epoch, in seconds. Without it the epoch never changes.
    #[arg(long = "epoch-length-secs")]
    pub epoch_length_secs: Option<u64>,
}

/// The collaborators of a hub running on in-memory storage.
pub struct Environment {
    pub table: Arc<CapabilityTable>,
    pub store: MemoryStore,
    pub cache: MemoryCache,
    pub staking: StaticStakingClient,
}

impl Environment {
    /// Loads the configured files and registers the seeded nodes.
    pub async fn prepare(config: &HubConfig, options: &SeedOptions) -> anyhow::Result<Self> {
        let table = match &options.capabilities {
            Some(path) => CapabilityTable::read(path)?,
            None => CapabilityTable::default(),
        };
        let seeds = match &options.nodes {
            Some(path) => Vec::<NodeSeed>::read(path)?,
            None => Vec::new(),
        };
        Ok(Self::with_seeds(config, table, options.epoch_length_secs, seeds).await)
    }

    async fn with_seeds(
        config: &HubConfig,
        table: CapabilityTable,
        epoch_length_secs: Option<u64>,
        seeds: Vec<NodeSeed>,
    ) -> Self {
        let table = Arc::new(table);
        let store = MemoryStore::new();
        let cache = MemoryCache::default();
        let mut staking = StaticStakingClient::new(
            seeds
                .iter()
                .map(|seed| (seed.registration.address, seed.stake))
                .collect(),
        );
        if let Some(secs) = epoch_length_secs {
            staking = staking.with_epoch_length(Duration::from_secs(secs));
        }

        let registry = NodeRegistry::new(
            Arc::new(store.clone()),
            Arc::new(staking.clone()),
            table.clone(),
            config.minimum_stake,
        );
        let now = Timestamp::now();
        let mut online = 0;
        for seed in seeds {
            let address = seed.registration.address;
            if let Err(error) = registry.register(seed.registration, now).await {
                warn!(%address, %error, "skipping seeded node");
                continue;
            }
            match registry.heartbeat(address, now).await {
                Ok(_) => online += 1,
                Err(error) => warn!(%address, %error, "seeded node did not come online"),
            }
        }
        info!(online, "seeded nodes registered");

        Environment {
            table,
            store,
            cache,
            staking,
        }
    }

    /// The reputation scorer over this environment.
    pub fn scorer(&self, config: &HubConfig) -> ReputationScorer {
        let pool = hub_core::pool::NodePool::new(
            Arc::new(self.store.clone()),
            Arc::new(self.cache.clone()),
            config.node_count,
            config.slash_count,
        );
        ReputationScorer::new(
            Arc::new(self.store.clone()),
            Arc::new(self.staking.clone()),
            pool,
            config.slash_count,
            config.score_interval(),
        )
    }
}

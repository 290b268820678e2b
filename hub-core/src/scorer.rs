// Copyright (c) Zefchain Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! The reputation scorer: epoch bookkeeping, score formula, slashing, and pool refresh.

#[cfg(test)]
#[path = "unit_tests/scorer_tests.rs"]
mod unit_tests;

use std::{collections::BTreeMap, sync::Arc};

#[cfg(with_metrics)]
use std::sync::LazyLock;

use async_trait::async_trait;
use hub_base::{
    data_types::Timestamp,
    node::{NodeStatus, NodeStatusTransitionError},
    stat::{NodeCategory, Stat},
    time::Duration,
};
use hub_storage::{NodeQuery, StatQuery, Store, StoreError};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};
#[cfg(with_metrics)]
use {hub_base::prometheus_util::register_int_counter, prometheus::IntCounter};

use crate::{
    pool::{NodePool, PoolError},
    scheduler::{Job, JobError},
    staking::{StakingClient, StakingError},
};

#[cfg(with_metrics)]
static SLASHED_COUNT: LazyLock<IntCounter> = LazyLock::new(|| {
    register_int_counter("scorer_slashed_total", "Nodes moved to the slashed status")
});

const HOURS_PER_UPTIME_STEP: f64 = 18.0;

#[derive(Debug, Error)]
pub enum ScorerError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Pool(#[from] PoolError),
    #[error(transparent)]
    Staking(#[from] StakingError),
    #[error(transparent)]
    Transition(#[from] NodeStatusTransitionError),
}

/// Computes the score of a node from its reputation record at time `now`.
///
/// The score is zero once `epoch_invalid_request` reaches `slash_count`, and never
/// negative otherwise.
pub fn compute_score(stat: &Stat, now: Timestamp, slash_count: u64) -> f64 {
    if stat.epoch_invalid_request >= slash_count {
        return 0.0;
    }
    let hours_since_reset = now.duration_since(stat.reset_at).as_secs_f64() / 3600.0;

    let staking = (stat.staking / 100_000.0 + 1.0).log2().min(0.2);
    let public_good = if stat.is_public_good { 0.0 } else { 1.0 };
    let uptime = ((hours_since_reset / HOURS_PER_UPTIME_STEP).ceil() / 120.0).min(0.3);
    let requests = (stat.total_request as f64 / 100_000.0 + 1.0)
        .log(100.0)
        .min(0.3);
    let epoch_requests = (stat.epoch_request as f64 / 1_000_000.0 + 1.0)
        .log(5000.0)
        .min(1.0);
    let diversity = 0.1 * f64::from(stat.decentralized_network + stat.federated_network)
        + if stat.is_rss_node { 0.3 } else { 0.0 };
    let indexers = (f64::from(stat.indexer) * 0.05).min(0.2);

    let score = staking + public_good + uptime + requests + epoch_requests + diversity + indexers
        - 0.5 * stat.epoch_invalid_request as f64;
    score.max(0.0)
}

/// What one run of the scorer changed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ScoreReport {
    pub scored: usize,
    pub slashed: usize,
    pub exited: usize,
    pub rolled_over: bool,
}

/// Periodically recomputes every reputation record and refreshes the node pools.
#[derive(Clone)]
pub struct ReputationScorer {
    store: Arc<dyn Store>,
    staking: Arc<dyn StakingClient>,
    pool: NodePool,
    slash_count: u64,
    interval: Duration,
}

impl ReputationScorer {
    pub fn new(
        store: Arc<dyn Store>,
        staking: Arc<dyn StakingClient>,
        pool: NodePool,
        slash_count: u64,
        interval: Duration,
    ) -> Self {
        ReputationScorer {
            store,
            staking,
            pool,
            slash_count,
            interval,
        }
    }

    /// Runs one scoring pass at time `now`.
    #[instrument(level = "trace", skip(self))]
    pub async fn score_all(&self, now: Timestamp) -> Result<ScoreReport, ScorerError> {
        let epoch = self.staking.current_epoch().await?;
        let mut nodes = self
            .store
            .find_nodes(&NodeQuery::default())
            .await?
            .into_iter()
            .map(|node| (node.address, node))
            .collect::<BTreeMap<_, _>>();
        let mut stats = self.store.find_node_stats(&StatQuery::default()).await?;

        let mut report = ScoreReport::default();
        let mut changed_nodes = Vec::new();
        for stat in &mut stats {
            match self.staking.staking(stat.address).await {
                Ok(amount) => stat.staking = amount,
                Err(error) => {
                    warn!(address = %stat.address, %error, "keeping previous staking amount")
                }
            }
            let Some(node) = nodes.get_mut(&stat.address) else {
                debug!(address = %stat.address, "reputation record without node");
                continue;
            };
            let mut node_changed = false;

            if node.status() == NodeStatus::Online && stat.epoch_invalid_request >= self.slash_count
            {
                node.update_status(NodeStatus::Slashed)?;
                node_changed = true;
                report.slashed += 1;
                #[cfg(with_metrics)]
                SLASHED_COUNT.inc();
                info!(
                    address = %stat.address,
                    invalid = stat.epoch_invalid_request,
                    "node slashed"
                );
            }

            if stat.epoch != epoch {
                stat.epoch = epoch;
                stat.epoch_request = 0;
                stat.epoch_invalid_request = 0;
                report.rolled_over = true;
                if node.status() == NodeStatus::Exiting {
                    node.update_status(NodeStatus::Exited)?;
                    node_changed = true;
                    report.exited += 1;
                }
            }

            if node.status() != NodeStatus::Online {
                stat.reset_at = now;
            }
            stat.is_public_good = node.is_public_good;
            stat.score = compute_score(stat, now, self.slash_count);
            report.scored += 1;
            if node_changed {
                changed_nodes.push(node.clone());
            }
        }

        for node in changed_nodes {
            self.store.save_node(node).await?;
        }
        self.store.save_node_stats(stats).await?;
        for category in NodeCategory::ALL {
            self.pool.rebuild(category).await?;
        }
        info!(
            scored = report.scored,
            slashed = report.slashed,
            exited = report.exited,
            %epoch,
            "reputation scores updated"
        );
        Ok(report)
    }
}

#[async_trait]
impl Job for ReputationScorer {
    fn name(&self) -> &str {
        "reputation-scorer"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn run(&self) -> Result<(), JobError> {
        self.score_all(Timestamp::now()).await?;
        Ok(())
    }
}

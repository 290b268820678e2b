// Copyright (c) Zefchain Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Periodic jobs guarded by a [`DistributedLock`].

#[cfg(test)]
#[path = "unit_tests/scheduler_tests.rs"]
mod unit_tests;

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use hub_base::time::timer::{interval, MissedTickBehavior};
use hub_storage::StoreError;
use thiserror::Error;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    lock::{DistributedLock, LockError},
    scorer::ScorerError,
};

#[derive(Debug, Error)]
pub enum JobError {
    #[error(transparent)]
    Scorer(#[from] ScorerError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Lock(#[from] LockError),
}

/// A task run periodically by the [`Scheduler`].
#[async_trait]
pub trait Job: Send + Sync {
    /// The name of the lease guarding this job.
    fn name(&self) -> &str;

    /// The time between two runs.
    fn interval(&self) -> Duration;

    async fn run(&self) -> Result<(), JobError>;
}

/// Runs [`Job`]s on their interval, one process at a time across the fleet.
#[derive(Clone)]
pub struct Scheduler {
    lock: Arc<dyn DistributedLock>,
    holder: String,
    ttl: Duration,
}

impl Scheduler {
    /// Creates a scheduler taking leases as `holder` for `ttl`.
    pub fn new(lock: Arc<dyn DistributedLock>, holder: impl Into<String>, ttl: Duration) -> Self {
        Scheduler {
            lock,
            holder: holder.into(),
            ttl,
        }
    }

    /// Runs `job` once if its lease can be taken.
    ///
    /// Returns whether the job ran. The lease is released whatever the outcome.
    pub async fn run_once(&self, job: &dyn Job) -> Result<bool, JobError> {
        if !self
            .lock
            .try_acquire(job.name(), &self.holder, self.ttl)
            .await?
        {
            debug!(job = job.name(), "lease held elsewhere, skipping");
            return Ok(false);
        }
        let result = job.run().await;
        if let Err(error) = self.lock.release(job.name(), &self.holder).await {
            warn!(job = job.name(), %error, "failed to release lease");
        }
        result.map(|()| true)
    }

    /// Runs every job on its interval until `cancellation` fires.
    pub async fn run(self, jobs: Vec<Arc<dyn Job>>, cancellation: CancellationToken) {
        let mut tasks = JoinSet::new();
        for job in jobs {
            let scheduler = self.clone();
            let cancellation = cancellation.clone();
            tasks.spawn(async move {
                let mut ticks = interval(job.interval().max(Duration::from_millis(1)));
                ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);
                info!(job = job.name(), interval = ?job.interval(), "job scheduled");
                loop {
                    tokio::select! {
                        _ = cancellation.cancelled() => break,
                        _ = ticks.tick() => {
                            if let Err(error) = scheduler.run_once(job.as_ref()).await {
                                error!(job = job.name(), %error, "job failed");
                            }
                        }
                    }
                }
            });
        }
        while tasks.join_next().await.is_some() {}
    }
}

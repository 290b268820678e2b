// Copyright (c) Zefchain Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Named leases guaranteeing a scheduled job runs in at most one process at a time.

use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use hub_base::time::timer::Instant;
use thiserror::Error;
use tokio::sync::Mutex;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LockError {
    #[error("lock {name} is not held by {holder}")]
    NotHolder { name: String, holder: String },
    #[error("lock service failure: {0}")]
    Backend(String),
}

/// An externally brokered lock service.
#[async_trait]
pub trait DistributedLock: Send + Sync {
    /// Takes the lease `name` for `holder` during `ttl`.
    ///
    /// Returns `false` if another holder owns an unexpired lease. A holder may renew its
    /// own lease.
    async fn try_acquire(&self, name: &str, holder: &str, ttl: Duration)
        -> Result<bool, LockError>;

    /// Gives the lease `name` back before it expires.
    async fn release(&self, name: &str, holder: &str) -> Result<(), LockError>;
}

struct Lease {
    holder: String,
    expires_at: Instant,
}

/// A [`DistributedLock`] shared by the tasks of a single process.
#[derive(Clone, Default)]
pub struct MemoryLock {
    leases: Arc<Mutex<HashMap<String, Lease>>>,
}

impl MemoryLock {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DistributedLock for MemoryLock {
    async fn try_acquire(
        &self,
        name: &str,
        holder: &str,
        ttl: Duration,
    ) -> Result<bool, LockError> {
        let now = Instant::now();
        let mut leases = self.leases.lock().await;
        if let Some(lease) = leases.get(name) {
            if lease.holder != holder && lease.expires_at > now {
                return Ok(false);
            }
        }
        leases.insert(
            name.to_owned(),
            Lease {
                holder: holder.to_owned(),
                expires_at: now + ttl,
            },
        );
        Ok(true)
    }

    async fn release(&self, name: &str, holder: &str) -> Result<(), LockError> {
        let mut leases = self.leases.lock().await;
        match leases.get(name) {
            Some(lease) if lease.holder == holder => {
                leases.remove(name);
                Ok(())
            }
            _ => Err(LockError::NotHolder {
                name: name.to_owned(),
                holder: holder.to_owned(),
            }),
        }
    }
}

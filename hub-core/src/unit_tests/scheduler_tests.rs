// Copyright (c) Zefchain Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use assert_matches::assert_matches;
use async_trait::async_trait;
use hub_base::{data_types::Timestamp, identifiers::NodeAddress, node::NodeStatus};
use hub_storage::{Store, StoreError};
use tokio_util::sync::CancellationToken;

use super::{Job, JobError, Scheduler};
use crate::{
    detector::HeartbeatDetector,
    lock::{DistributedLock, LockError, MemoryLock},
    test_utils::TestNetwork,
};

#[derive(Default)]
struct CountingJob {
    runs: AtomicUsize,
    fail: bool,
}

#[async_trait]
impl Job for CountingJob {
    fn name(&self) -> &str {
        "counting"
    }

    fn interval(&self) -> Duration {
        Duration::from_secs(10)
    }

    async fn run(&self) -> Result<(), JobError> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(StoreError::Backend("unavailable".to_owned()).into());
        }
        Ok(())
    }
}

const TTL: Duration = Duration::from_secs(60);

#[tokio::test(start_paused = true)]
async fn leases_exclude_other_holders_until_they_expire() {
    let lock = MemoryLock::new();
    assert!(lock.try_acquire("scorer", "a", TTL).await.unwrap());
    assert!(!lock.try_acquire("scorer", "b", TTL).await.unwrap());
    assert!(lock.try_acquire("scorer", "a", TTL).await.unwrap());
    assert!(lock.try_acquire("detector", "b", TTL).await.unwrap());

    tokio::time::advance(TTL + Duration::from_secs(1)).await;
    assert!(lock.try_acquire("scorer", "b", TTL).await.unwrap());
}

#[tokio::test]
async fn only_the_holder_releases_a_lease() {
    let lock = MemoryLock::new();
    lock.try_acquire("scorer", "a", TTL).await.unwrap();
    assert_matches!(
        lock.release("scorer", "b").await,
        Err(LockError::NotHolder { .. })
    );
    lock.release("scorer", "a").await.unwrap();
    assert!(lock.try_acquire("scorer", "b", TTL).await.unwrap());
}

#[tokio::test]
async fn job_is_skipped_while_another_process_holds_the_lease() {
    let lock = Arc::new(MemoryLock::new());
    let job = CountingJob::default();
    lock.try_acquire("counting", "other", TTL).await.unwrap();

    let scheduler = Scheduler::new(lock.clone(), "me", TTL);
    assert!(!scheduler.run_once(&job).await.unwrap());
    assert_eq!(job.runs.load(Ordering::SeqCst), 0);

    lock.release("counting", "other").await.unwrap();
    assert!(scheduler.run_once(&job).await.unwrap());
    assert_eq!(job.runs.load(Ordering::SeqCst), 1);
    assert!(lock.try_acquire("counting", "other", TTL).await.unwrap());
}

#[tokio::test]
async fn lease_is_released_when_the_job_fails() {
    let lock = Arc::new(MemoryLock::new());
    let job = CountingJob {
        fail: true,
        ..CountingJob::default()
    };
    let scheduler = Scheduler::new(lock.clone(), "me", TTL);
    assert_matches!(scheduler.run_once(&job).await, Err(JobError::Store(_)));
    assert!(lock.try_acquire("counting", "other", TTL).await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn jobs_run_on_their_interval_until_cancelled() {
    let job = Arc::new(CountingJob::default());
    let scheduler = Scheduler::new(Arc::new(MemoryLock::new()), "me", TTL);
    let cancellation = CancellationToken::new();
    let handle = tokio::spawn(scheduler.run(vec![job.clone()], cancellation.clone()));

    tokio::time::sleep(Duration::from_secs(25)).await;
    cancellation.cancel();
    handle.await.unwrap();
    assert_eq!(job.runs.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn silent_nodes_go_offline() {
    let network = TestNetwork::new();
    network.add_full_node(1, 1.0).await;
    network.add_full_node(2, 1.0).await;
    let mut fresh = network
        .store
        .find_node(NodeAddress::test_address(2))
        .await
        .unwrap()
        .unwrap();
    fresh.last_heartbeat = Timestamp::from(3_000_000_000);
    network.store.save_node(fresh).await.unwrap();

    let detector = HeartbeatDetector::new(
        Arc::new(network.store.clone()),
        Duration::from_secs(300),
        Duration::from_secs(60),
    );
    let offline = detector.detect(Timestamp::from(3_100_000_000)).await.unwrap();
    assert_eq!(offline, 1);

    let status = |id| {
        let store = network.store.clone();
        async move {
            store
                .find_node(NodeAddress::test_address(id))
                .await
                .unwrap()
                .unwrap()
                .status()
        }
    };
    assert_eq!(status(1).await, NodeStatus::Offline);
    assert_eq!(status(2).await, NodeStatus::Online);
}

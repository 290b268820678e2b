// Copyright (c) Zefchain Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use std::{sync::Arc, time::Duration};

use hub_base::{
    data_types::{Epoch, Timestamp},
    identifiers::NodeAddress,
    node::NodeStatus,
    stat::{NodeEndpoint, Stat},
};
use hub_storage::{CacheExt, Store};
use test_case::test_case;

use super::{compute_score, ReputationScorer, ScoreReport};
use crate::{pool::NodePool, test_utils::TestNetwork};

const HOUR: u64 = 3_600_000_000;

fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-9,
        "expected {expected}, got {actual}"
    );
}

#[test]
fn fresh_node_scores_the_operator_bonus() {
    let stat = Stat::new(NodeAddress::test_address(1), "", Timestamp::from(0));
    assert_close(compute_score(&stat, Timestamp::from(0), 4), 1.0);
}

#[test]
fn every_component_is_capped() {
    let stat = Stat {
        staking: 1_000_000.0,
        is_public_good: true,
        total_request: 9_900_000,
        epoch_request: 4_999_000_000,
        decentralized_network: 3,
        federated_network: 1,
        is_rss_node: true,
        indexer: 10,
        epoch_invalid_request: 2,
        ..Stat::default()
    };
    let now = Timestamp::from(648 * HOUR);
    // 0.2 + 0 + 0.3 + 0.3 + 1.0 + 0.4 + 0.3 + 0.2 - 1.0
    assert_close(compute_score(&stat, now, 4), 1.7);
}

#[test]
fn uptime_grows_in_steps_of_eighteen_hours() {
    let stat = Stat {
        is_public_good: true,
        ..Stat::default()
    };
    assert_close(compute_score(&stat, Timestamp::from(HOUR), 4), 1.0 / 120.0);
    assert_close(compute_score(&stat, Timestamp::from(18 * HOUR), 4), 1.0 / 120.0);
    assert_close(compute_score(&stat, Timestamp::from(19 * HOUR), 4), 2.0 / 120.0);
}

#[test_case(4; "at the threshold")]
#[test_case(40; "far beyond the threshold")]
fn slashed_nodes_score_zero(invalid: u64) {
    let stat = Stat {
        staking: 1_000_000.0,
        total_request: 1_000_000,
        decentralized_network: 10,
        epoch_invalid_request: invalid,
        ..Stat::default()
    };
    assert_eq!(compute_score(&stat, Timestamp::from(100 * HOUR), 4), 0.0);
}

#[test]
fn score_is_never_negative() {
    let stat = Stat {
        is_public_good: true,
        epoch_invalid_request: 3,
        ..Stat::default()
    };
    assert_eq!(compute_score(&stat, Timestamp::from(0), 4), 0.0);
}

fn scorer(network: &TestNetwork) -> ReputationScorer {
    let store = Arc::new(network.store.clone());
    let pool = NodePool::new(
        store.clone(),
        Arc::new(network.cache.clone()),
        network.config.node_count,
        network.config.slash_count,
    );
    ReputationScorer::new(
        store,
        Arc::new(network.staking.clone()),
        pool,
        network.config.slash_count,
        Duration::from_secs(600),
    )
}

#[tokio::test]
async fn scoring_slashes_and_refreshes_pools() {
    let network = TestNetwork::new();
    for id in 1..=4 {
        network.add_full_node(id, 0.0).await;
    }
    network.staking.set_stake(NodeAddress::test_address(1), 100_000.0);
    let mut misbehaving = network.stat(2).await;
    misbehaving.epoch_invalid_request = 4;
    network.store.save_node_stats(vec![misbehaving]).await.unwrap();

    let now = Timestamp::from(10 * HOUR);
    let report = scorer(&network).score_all(now).await.unwrap();
    assert_eq!(
        report,
        ScoreReport {
            scored: 4,
            slashed: 1,
            exited: 0,
            rolled_over: false,
        }
    );

    let slashed = network.store.find_node(NodeAddress::test_address(2)).await.unwrap().unwrap();
    assert_eq!(slashed.status(), NodeStatus::Slashed);
    let stat = network.stat(2).await;
    assert_eq!(stat.score, 0.0);
    assert_eq!(stat.reset_at, now);

    let best = network.stat(1).await;
    assert_eq!(best.staking, 100_000.0);
    assert!(best.score > network.stat(3).await.score);

    let pool: Vec<NodeEndpoint> = network.cache.get_json("nodes:full").await.unwrap();
    let addresses = pool.iter().map(|node| node.address).collect::<Vec<_>>();
    assert_eq!(addresses, [1, 3, 4].map(NodeAddress::test_address));
}

#[tokio::test]
async fn epoch_rollover_resets_counters_and_completes_exits() {
    let network = TestNetwork::new();
    network.add_full_node(1, 0.0).await;
    network.add_full_node(2, 0.0).await;
    let mut stat = network.stat(1).await;
    stat.epoch_request = 10;
    stat.epoch_invalid_request = 3;
    stat.total_request = 10;
    network.store.save_node_stats(vec![stat]).await.unwrap();
    let mut exiting = network.store.find_node(NodeAddress::test_address(2)).await.unwrap().unwrap();
    exiting.update_status(NodeStatus::Exiting).unwrap();
    network.store.save_node(exiting).await.unwrap();

    network.staking.set_epoch(Epoch(1));
    let report = scorer(&network).score_all(Timestamp::from(HOUR)).await.unwrap();
    assert!(report.rolled_over);
    assert_eq!(report.exited, 1);

    let stat = network.stat(1).await;
    assert_eq!(stat.epoch, Epoch(1));
    assert_eq!((stat.epoch_request, stat.epoch_invalid_request), (0, 0));
    assert_eq!(stat.total_request, 10);
    let exited = network.store.find_node(NodeAddress::test_address(2)).await.unwrap().unwrap();
    assert_eq!(exited.status(), NodeStatus::Exited);
}

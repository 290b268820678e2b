// Copyright (c) Zefchain Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Client queries flowing through the whole hub.

use std::time::Duration;

use assert_matches::assert_matches;
use hub_base::{
    capability::{Network, Worker},
    identifiers::NodeAddress,
    stat::{NodeCategory, NodeEndpoint},
};
use hub_core::{
    distributor::DistributorError,
    matcher::CapabilityError,
    node::NodeError,
    request::{AccountActivitiesRequest, ActivityRequest, RssRequest},
    test_utils::{activity_payload, endpoint, TestNetwork},
    HubError,
};
use hub_storage::CacheExt;
use tokio::time::Instant;

const FEED: &[u8] = b"<?xml version=\"1.0\"?><rss><channel><title>abc</title></channel></rss>";

fn rss_request(path: &str) -> RssRequest {
    RssRequest {
        path: path.to_owned(),
        query: Vec::new(),
    }
}

#[tokio::test(start_paused = true)]
async fn majority_is_rewarded_and_outlier_penalized() {
    let network = TestNetwork::new();
    for id in 1..=3 {
        network.add_full_node(id, f64::from(10 - id)).await;
    }
    let tx = |id: u8| format!("{}/decentralized/tx/X", endpoint(id));
    network
        .client
        .reply_after(tx(1), Duration::from_millis(30), activity_payload("X", "data1"));
    network
        .client
        .reply_after(tx(2), Duration::from_millis(10), activity_payload("X", "data1"));
    network
        .client
        .reply_after(tx(3), Duration::from_millis(20), activity_payload("X", "data2"));

    let hub = network.hub();
    let payload = hub.activity(&ActivityRequest::new("X")).await.unwrap();
    assert_eq!(payload, activity_payload("X", "data1"));
    hub.await_verifications().await;

    // Answers arrive as 2, 3, 1; all are valid, so the round is scored in that order.
    let mut stats = Vec::new();
    for id in [2, 3, 1] {
        stats.push(network.stat(id).await);
    }
    let valid = stats.iter().map(|stat| stat.total_request).collect::<Vec<_>>();
    let invalid = stats
        .iter()
        .map(|stat| stat.epoch_invalid_request)
        .collect::<Vec<_>>();
    assert_eq!(valid, vec![2, 0, 1]);
    assert_eq!(invalid, vec![0, 1, 0]);
}

#[tokio::test(start_paused = true)]
async fn data1_data1_data2_round_scores_two_one_zero() {
    let network = TestNetwork::new();
    for id in 1..=3 {
        network.add_full_node(id, f64::from(10 - id)).await;
    }
    for (id, content, delay) in [(1, "data1", 10), (2, "data1", 20), (3, "data2", 30)] {
        network.client.reply_after(
            format!("{}/decentralized/tx/X", endpoint(id)),
            Duration::from_millis(delay),
            activity_payload("X", content),
        );
    }

    let hub = network.hub();
    let payload = hub.activity(&ActivityRequest::new("X")).await.unwrap();
    assert_eq!(payload, activity_payload("X", "data1"));
    hub.await_verifications().await;

    let mut valid = Vec::new();
    let mut invalid = Vec::new();
    for id in 1..=3 {
        let stat = network.stat(id).await;
        valid.push(stat.total_request);
        invalid.push(stat.epoch_invalid_request);
    }
    assert_eq!(valid, vec![2, 1, 0]);
    assert_eq!(invalid, vec![0, 0, 1]);
}

#[tokio::test]
async fn unknown_filters_are_rejected_before_fan_out() {
    let network = TestNetwork::new();
    network.add_full_node(1, 1.0).await;
    let request = AccountActivitiesRequest {
        network: vec!["solana".to_owned()],
        ..AccountActivitiesRequest::new("vitalik.eth")
    };
    let result = network.hub().account_activities(&request).await;
    assert_matches!(result, Err(HubError::Capability(CapabilityError::UnknownValue(_))));
    assert!(network.client.requests().is_empty());
}

#[tokio::test]
async fn account_queries_prefer_capable_light_nodes() {
    let network = TestNetwork::new();
    network.add_full_node(1, 5.0).await;
    network
        .add_light_node(4, 0.1, Network::Farcaster, Worker::Farcaster)
        .await;
    network
        .add_light_node(5, 0.2, Network::Farcaster, Worker::Farcaster)
        .await;
    network
        .add_light_node(6, 9.0, Network::Polygon, Worker::Lens)
        .await;
    let request = AccountActivitiesRequest {
        platform: vec!["Farcaster".to_owned()],
        ..AccountActivitiesRequest::new("dwr.eth")
    };
    let url = |id: u8| format!("{}/decentralized/dwr.eth?platform=Farcaster", endpoint(id));
    for id in [1, 4, 5, 6] {
        network
            .client
            .reply(url(id), br#"{"data": [], "meta": null}"#.to_vec());
    }

    let hub = network.hub();
    hub.account_activities(&request).await.unwrap();
    hub.await_verifications().await;

    let mut requested = network.client.requests();
    requested.sort();
    assert_eq!(requested, [1, 4, 5].map(url).to_vec());
}

#[tokio::test(start_paused = true)]
async fn slow_nodes_yield_the_failure_sentinel() {
    let network = TestNetwork::new();
    let node = network
        .add_light_node(1, 1.0, Network::Rss, Worker::Rsshub)
        .await;
    network.client.reply_after(
        format!("{}/rss/abc", node.endpoint),
        Duration::from_secs(4),
        FEED,
    );

    let hub = network.hub();
    let error = hub.rss(&rss_request("abc")).await.unwrap_err();
    assert_matches!(
        &error,
        HubError::Distributor(DistributorError::NodeDataFailed(_))
    );
    hub.await_verifications().await;
    assert_eq!(network.stat(1).await.total_request, 1);

    let pool: Vec<NodeEndpoint> = network.cache.get_json("nodes:rss").await.unwrap();
    assert_eq!(pool, vec![node]);
}

#[tokio::test(start_paused = true)]
async fn feeds_are_answered_early_and_agreeing_nodes_rewarded() {
    let network = TestNetwork::new();
    for id in 1..=3 {
        network
            .add_light_node(id, 1.0, Network::Rss, Worker::Rsshub)
            .await;
    }
    let url = |id: u8| format!("{}/rss/abc", endpoint(id));
    network.client.reply_after(url(1), Duration::from_millis(10), FEED);
    network.client.reply_after(url(2), Duration::from_secs(2), FEED);
    network.client.reply_after(url(3), Duration::from_secs(2), FEED);

    let hub = network.hub();
    for _ in 0..network.config.slash_count {
        let start = Instant::now();
        let payload = hub.rss(&rss_request("abc")).await.unwrap();
        assert_eq!(payload, FEED);
        assert!(start.elapsed() < Duration::from_secs(1));
        hub.await_verifications().await;
    }

    for id in 1..=3 {
        let stat = network.stat(id).await;
        assert_eq!(stat.epoch_invalid_request, 0);
        assert!(stat.total_request > 0);
    }
    let pool = hub.pool().retrieve_nodes(NodeCategory::Rss).await.unwrap();
    assert_eq!(pool.len(), 3);
}

#[tokio::test(start_paused = true)]
async fn slashed_nodes_stop_receiving_requests() {
    let network = TestNetwork::new();
    for id in 1..=3 {
        network.add_full_node(id, f64::from(10 - id)).await;
    }
    let tx = |id: u8| format!("{}/decentralized/tx/X", endpoint(id));
    for (id, content, delay) in [(1, "data1", 10), (2, "data1", 20), (3, "data2", 30)] {
        network.client.reply_after(
            tx(id),
            Duration::from_millis(delay),
            activity_payload("X", content),
        );
    }

    let hub = network.hub();
    for _ in 0..=network.config.slash_count {
        hub.activity(&ActivityRequest::new("X")).await.unwrap();
        hub.await_verifications().await;
    }

    let slashed = network.stat(3).await;
    assert_eq!(slashed.epoch_invalid_request, network.config.slash_count);
    let served = hub
        .pool()
        .retrieve_nodes(NodeCategory::Full)
        .await
        .unwrap()
        .into_iter()
        .map(|node| node.address)
        .collect::<Vec<_>>();
    assert_eq!(served, [1, 2].map(NodeAddress::test_address).to_vec());
    let requests_to_slashed = network
        .client
        .requests()
        .into_iter()
        .filter(|url| *url == tx(3))
        .count();
    assert_eq!(requests_to_slashed as u64, network.config.slash_count);
}

#[tokio::test(start_paused = true)]
async fn each_node_request_is_bounded_by_the_node_timeout() {
    let mut network = TestNetwork::new();
    network.config.verification_timeout_ms = 500;
    let node = network
        .add_light_node(1, 1.0, Network::Rss, Worker::Rsshub)
        .await;
    network.client.reply_after(
        format!("{}/rss/abc", node.endpoint),
        Duration::from_secs(1),
        FEED,
    );

    let hub = network.hub();
    let start = Instant::now();
    let error = hub.rss(&rss_request("abc")).await.unwrap_err();
    assert_matches!(
        error,
        HubError::Distributor(DistributorError::Node { error: NodeError::Timeout(timeout), .. })
            if timeout == Duration::from_millis(500)
    );
    assert!(start.elapsed() < Duration::from_secs(1));
    hub.await_verifications().await;
}

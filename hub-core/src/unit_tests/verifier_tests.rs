// Copyright (c) Zefchain Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;

use hub_base::{
    capability::{Network, Worker},
    identifiers::NodeAddress,
    stat::{NodeCategory, NodeEndpoint},
};
use hub_storage::Store;
use test_case::test_case;

use super::{assign_points, sort_responses, ResponseVerifier};
use crate::{
    distributor::DataResponse,
    matcher::CapabilityMatcher,
    node::NodeError,
    pool::NodePool,
    response::ResponseKind,
    test_utils::{
        activities_payload, activity_payload, endpoint, listed_activity_payload, TestNetwork,
    },
};

#[derive(Clone, Copy, Debug)]
enum Answer {
    Data(&'static str),
    Invalid,
    Failed,
}
use Answer::*;

const ERROR: &[u8] = br#"{"error": "internal", "error_code": "E500"}"#;

fn node(id: u8) -> NodeEndpoint {
    NodeEndpoint {
        address: NodeAddress::test_address(id),
        endpoint: endpoint(id),
    }
}

fn responses(answers: &[Answer]) -> Vec<DataResponse> {
    answers
        .iter()
        .zip(1..)
        .map(|(answer, id)| {
            let result = match answer {
                Data(content) => Ok(activity_payload("x", content)),
                Invalid => Ok(ERROR.to_vec()),
                Failed => Err(NodeError::Transport {
                    error: "refused".to_owned(),
                }),
            };
            DataResponse::new(node(id), ResponseKind::Activity, result)
        })
        .collect()
}

/// Scores a round the way the verifier does and returns `(valid, invalid)` points in
/// the order nodes answered.
fn score(answers: &[Answer], known_stats: usize) -> (Vec<u64>, Vec<u64>) {
    let mut round = responses(answers);
    sort_responses(&mut round);
    assign_points(&mut round, known_stats, 3);
    round.sort_by_key(|response| response.address);
    (
        round.iter().map(|response| response.valid_points).collect(),
        round.iter().map(|response| response.invalid_points).collect(),
    )
}

#[test_case(&[Data("data1")], &[1], &[0]; "single answer")]
#[test_case(&[Failed], &[0], &[1]; "single failure")]
#[test_case(&[Data("data1"), Data("data1")], &[2, 1], &[0, 0]; "pair agrees")]
#[test_case(&[Data("data1"), Data("data2")], &[1, 0], &[0, 0]; "pair disagrees")]
#[test_case(&[Data("data1"), Failed], &[1, 0], &[0, 1]; "pair with failure")]
#[test_case(&[Data("data1"), Data("data1"), Data("data1")], &[2, 1, 1], &[0, 0, 0]; "all agree")]
#[test_case(&[Data("data1"), Data("data1"), Data("data2")], &[2, 1, 0], &[0, 0, 1]; "third is the outlier")]
#[test_case(&[Data("data1"), Data("data2"), Data("data1")], &[2, 0, 1], &[0, 1, 0]; "second is the outlier")]
#[test_case(&[Data("data1"), Data("data2"), Data("data2")], &[0, 2, 1], &[1, 0, 0]; "first is the outlier")]
#[test_case(&[Data("data1"), Invalid, Invalid], &[1, 0, 0], &[0, 0, 0]; "agreeing invalid answers")]
#[test_case(&[Data("data1"), Data("data2"), Data("data3")], &[1, 0, 0], &[0, 0, 0]; "all differ")]
#[test_case(&[Data("data1"), Failed, Failed], &[1, 0, 0], &[0, 1, 1]; "two failures")]
#[test_case(&[Data("data1"), Data("data1"), Failed], &[2, 1, 0], &[0, 0, 1]; "failure with agreeing pair")]
#[test_case(&[Data("data1"), Data("data2"), Failed], &[1, 0, 0], &[0, 0, 1]; "failure with disagreeing pair")]
#[test_case(&[Failed, Data("data1"), Data("data1")], &[0, 2, 1], &[1, 0, 0]; "sorting moves failures last")]
#[test_case(&[Invalid, Invalid, Failed], &[0, 0, 0], &[1, 1, 1]; "no valid answer")]
fn quorum_table(answers: &[Answer], valid: &[u64], invalid: &[u64]) {
    assert_eq!(score(answers, 3), (valid.to_vec(), invalid.to_vec()));
}

#[test]
fn cold_start_skips_comparison() {
    let answers = [Data("data1"), Data("data2"), Failed];
    assert_eq!(score(&answers, 2), (vec![1, 1, 0], vec![0, 0, 1]));
}

#[test]
fn answers_beyond_the_quorum_get_nothing() {
    let answers = [Data("data1"), Data("data1"), Data("data1"), Data("data1")];
    assert_eq!(score(&answers, 4), (vec![2, 1, 1, 0], vec![0, 0, 0, 0]));
}

fn pool(network: &TestNetwork) -> NodePool {
    NodePool::new(
        Arc::new(network.store.clone()),
        Arc::new(network.cache.clone()),
        network.config.node_count,
        network.config.slash_count,
    )
}

fn verifier(network: &TestNetwork) -> ResponseVerifier {
    ResponseVerifier::new(
        Arc::new(network.store.clone()),
        Arc::new(network.client.clone()),
        CapabilityMatcher::new(network.table.clone()),
        pool(network),
        &network.config,
    )
}

#[tokio::test]
async fn points_are_persisted_in_reputation_records() {
    let network = TestNetwork::new();
    for id in 1..=3 {
        network.add_full_node(id, 1.0).await;
    }
    let round = responses(&[Data("data1"), Data("data1"), Data("data2")]);
    verifier(&network).process_results(round).await;

    let first = network.stat(1).await;
    assert_eq!((first.total_request, first.epoch_request), (2, 2));
    let second = network.stat(2).await;
    assert_eq!((second.total_request, second.epoch_request), (1, 1));
    let third = network.stat(3).await;
    assert_eq!((third.total_request, third.epoch_invalid_request), (0, 1));
    assert!(first.score > third.score);
}

#[tokio::test]
async fn slashed_nodes_leave_the_cached_pool() {
    let network = TestNetwork::new();
    for id in 1..=3 {
        network.add_full_node(id, f64::from(10 - id)).await;
    }
    let pool = pool(&network);
    assert_eq!(pool.retrieve_nodes(NodeCategory::Full).await.unwrap().len(), 3);

    let verifier = verifier(&network);
    for _ in 0..network.config.slash_count {
        let round = responses(&[Data("data1"), Data("data1"), Data("data2")]);
        verifier.process_results(round).await;
    }
    assert_eq!(
        network.stat(3).await.epoch_invalid_request,
        network.config.slash_count
    );

    let served = pool
        .retrieve_nodes(NodeCategory::Full)
        .await
        .unwrap()
        .into_iter()
        .map(|node| node.address)
        .collect::<Vec<_>>();
    assert_eq!(served, [1, 2].map(NodeAddress::test_address).to_vec());
}

#[tokio::test]
async fn feed_rounds_reward_agreeing_nodes() {
    let network = TestNetwork::new();
    for id in 1..=3 {
        network
            .add_light_node(id, 1.0, Network::Rss, Worker::Rsshub)
            .await;
    }
    let feed = b"<?xml version=\"1.0\"?><rss><channel/></rss>".to_vec();
    let round = (1..=3)
        .map(|id| DataResponse::new(node(id), ResponseKind::Feed, Ok(feed.clone())))
        .collect();
    verifier(&network).process_results(round).await;

    for (id, points) in [(1, 2), (2, 1), (3, 1)] {
        let stat = network.stat(id).await;
        assert_eq!((stat.total_request, stat.epoch_invalid_request), (points, 0));
    }
}

#[tokio::test]
async fn failing_to_save_is_not_fatal() {
    let network = TestNetwork::new();
    for id in 1..=3 {
        network.add_full_node(id, 1.0).await;
    }
    network.store.fail_stat_writes(true);
    let scored = verifier(&network)
        .process_results(responses(&[Data("data1"), Data("data1"), Data("data2")]))
        .await;
    assert_eq!(scored[2].invalid_points, 1);

    network.store.fail_stat_writes(false);
    assert_eq!(network.stat(3).await.epoch_invalid_request, 0);
}

#[tokio::test]
async fn listed_activities_are_cross_checked_outside_the_round() {
    let network = TestNetwork::new();
    for id in 1..=3 {
        network.add_full_node(id, 1.0).await;
    }
    network
        .add_light_node(4, 0.5, Network::Polygon, Worker::Lens)
        .await;
    network
        .add_light_node(5, 0.5, Network::Ethereum, Worker::Uniswap)
        .await;
    network
        .add_light_node(6, 0.5, Network::Mastodon, Worker::Mastodon)
        .await;
    network.client.reply(
        format!("{}/decentralized/tx/a", endpoint(4)),
        listed_activity_payload("a", "Lens", "polygon"),
    );
    network.client.reply(
        format!("{}/decentralized/tx/c", endpoint(5)),
        listed_activity_payload("c", "Uniswap", "linea"),
    );

    let list = activities_payload(&[
        ("a", "Lens", "polygon"),
        ("b", "Mastodon", "mastodon"),
        ("c", "Uniswap", "ethereum"),
        ("d", "Lens", "polygon"),
    ]);
    let round = (1..=3)
        .map(|id| DataResponse::new(node(id), ResponseKind::Activity, Ok(list.clone())))
        .collect();
    verifier(&network).process_results(round).await;

    let requests = network.client.requests();
    assert_eq!(
        requests,
        vec![
            format!("{}/decentralized/tx/a", endpoint(4)),
            format!("{}/decentralized/tx/c", endpoint(5)),
        ]
    );
    let agreeing = network.stat(4).await;
    assert_eq!((agreeing.total_request, agreeing.epoch_invalid_request), (1, 0));
    let disagreeing = network.stat(5).await;
    assert_eq!(
        (disagreeing.total_request, disagreeing.epoch_invalid_request),
        (0, 1)
    );
    let untouched = network.stat(6).await;
    assert_eq!(untouched.total_request + untouched.epoch_invalid_request, 0);
    assert_eq!(network.stat(1).await.total_request, 2);
}

#[tokio::test]
async fn cross_check_failure_counts_as_disagreement() {
    let network = TestNetwork::new();
    for id in 1..=3 {
        network.add_full_node(id, 1.0).await;
    }
    network
        .add_light_node(4, 0.5, Network::Farcaster, Worker::Farcaster)
        .await;
    let list = activities_payload(&[("f", "Farcaster", "farcaster")]);
    let round = (1..=3)
        .map(|id| DataResponse::new(node(id), ResponseKind::Activity, Ok(list.clone())))
        .collect();
    verifier(&network).process_results(round).await;

    assert_eq!(network.stat(4).await.epoch_invalid_request, 1);
    let all = network
        .store
        .find_node_stats(&Default::default())
        .await
        .unwrap();
    assert_eq!(all.len(), 4);
}

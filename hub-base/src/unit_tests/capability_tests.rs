// Copyright (c) Zefchain Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use std::collections::BTreeSet;

use assert_matches::assert_matches;

use super::*;

fn indexers_for(table: &CapabilityTable, address: NodeAddress) -> Vec<Indexer> {
    table
        .worker_networks
        .iter()
        .flat_map(|(worker, networks)| {
            networks.iter().map(move |network| Indexer {
                address,
                network: *network,
                worker: *worker,
            })
        })
        .collect()
}

#[test]
fn names_parse_case_insensitively() {
    assert_eq!("Ethereum".parse::<Network>().unwrap(), Network::Ethereum);
    assert_eq!(
        "binance-smart-chain".parse::<Network>().unwrap(),
        Network::BinanceSmartChain
    );
    assert_eq!("uniswap".parse::<Platform>().unwrap(), Platform::Uniswap);
    assert_eq!("SOCIAL".parse::<Tag>().unwrap(), Tag::Social);
    assert_matches!(
        "solana".parse::<Network>(),
        Err(UnknownValueError { kind: "network", .. })
    );
}

#[test]
fn full_node_covers_every_worker() {
    let table = CapabilityTable::default();
    let address = NodeAddress::test_address(1);
    let mut indexers = indexers_for(&table, address);
    assert!(table.is_full_node(&indexers));
    assert!(!table.is_rss_node(&indexers));

    // Dropping a single network of a single worker is enough to lose the status.
    let position = indexers
        .iter()
        .position(|indexer| indexer.worker == Worker::Uniswap)
        .unwrap();
    indexers.remove(position);
    assert!(!table.is_full_node(&indexers));
}

#[test]
fn rss_capability_is_separate_from_full_node() {
    let table = CapabilityTable::default();
    let address = NodeAddress::test_address(2);
    let indexers = vec![Indexer {
        address,
        network: Network::Rss,
        worker: Worker::Rsshub,
    }];
    assert!(table.is_rss_node(&indexers));
    assert!(!table.is_full_node(&indexers));
    assert_eq!(table.networks_for(Worker::Rsshub), BTreeSet::from([Network::Rss]));
    assert_eq!(table.workers_on(Network::Rss), BTreeSet::from([Worker::Rsshub]));
}

#[test]
fn network_diversity_counts_distinct_networks() {
    let table = CapabilityTable::default();
    let address = NodeAddress::test_address(3);
    let config = NodeConfig {
        workers: vec![
            WorkerConfig {
                network: Network::Ethereum,
                worker: Worker::Core,
            },
            WorkerConfig {
                network: Network::Ethereum,
                worker: Worker::Uniswap,
            },
            WorkerConfig {
                network: Network::Polygon,
                worker: Worker::Lens,
            },
            WorkerConfig {
                network: Network::Mastodon,
                worker: Worker::Mastodon,
            },
            WorkerConfig {
                network: Network::Rss,
                worker: Worker::Rsshub,
            },
        ],
    };
    let indexers = config.indexers(address);
    assert_eq!(indexers.len(), 5);
    assert_eq!(table.network_diversity(&indexers), (2, 1));
}

#[test]
fn declared_duplicates_collapse_into_one_record() {
    let pair = WorkerConfig {
        network: Network::Farcaster,
        worker: Worker::Farcaster,
    };
    let config = NodeConfig {
        workers: vec![pair, pair],
    };
    assert_eq!(config.indexers(NodeAddress::test_address(4)).len(), 1);
}

#[test]
fn tags_resolve_to_worker_union() {
    let table = CapabilityTable::default();
    let workers = table.workers_for_tags(&[Tag::Transaction, Tag::Collectible]);
    assert_eq!(
        workers,
        BTreeSet::from([Worker::Core, Worker::Highlight, Worker::Opensea])
    );
    assert_eq!(
        table.worker_for_platform(Platform::Farcaster),
        Some(Worker::Farcaster)
    );
    assert!(table.is_mutable(Platform::Mastodon));
    assert!(!table.is_mutable(Platform::Uniswap));
}

#[test]
fn table_survives_json_configuration() {
    let table = CapabilityTable::default();
    let json = serde_json::to_string(&table).unwrap();
    assert_eq!(serde_json::from_str::<CapabilityTable>(&json).unwrap(), table);
}

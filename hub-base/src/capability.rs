// Copyright (c) Zefchain Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Networks, workers, tags and platforms, and the tables relating them.
//!
//! A node declares a list of `(network, worker)` pairs it indexes. Clients query by
//! network, tag or platform; the [`CapabilityTable`] translates those into the workers a
//! node must run, and on which networks, to answer the query.

use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    str::FromStr,
};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use crate::identifiers::NodeAddress;

#[cfg(test)]
#[path = "unit_tests/capability_tests.rs"]
mod capability_tests;

/// A string did not name any known value of a capability enum.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown {kind}: {value}")]
pub struct UnknownValueError {
    pub kind: &'static str,
    pub value: String,
}

/// Declares a closed set of names, parsed case-insensitively and serialized as strings.
macro_rules! named_enum {
    (
        $(#[$meta:meta])*
        $name:ident as $kind:literal {
            $($variant:ident => $text:literal,)*
        }
    ) => {
        $(#[$meta])*
        #[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub enum $name {
            $($variant,)*
        }

        impl $name {
            /// All the values, in declaration order.
            pub const ALL: &'static [$name] = &[$($name::$variant,)*];

            /// The canonical name of this value.
            pub const fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text,)*
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = UnknownValueError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                $name::ALL
                    .iter()
                    .find(|value| value.as_str().eq_ignore_ascii_case(s))
                    .copied()
                    .ok_or_else(|| UnknownValueError {
                        kind: $kind,
                        value: s.to_string(),
                    })
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_str())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

named_enum! {
    /// A network whose activity nodes can index.
    Network as "network" {
        Arbitrum => "arbitrum",
        Arweave => "arweave",
        Avax => "avax",
        Base => "base",
        BinanceSmartChain => "binance-smart-chain",
        Crossbell => "crossbell",
        Ethereum => "ethereum",
        Farcaster => "farcaster",
        Gnosis => "gnosis",
        Linea => "linea",
        Mastodon => "mastodon",
        Optimism => "optimism",
        Polygon => "polygon",
        Rss => "rss",
    }
}

named_enum! {
    /// A data-extraction program a node runs against one or more networks.
    Worker as "worker" {
        Aave => "aave",
        Core => "core",
        Crossbell => "crossbell",
        Curve => "curve",
        Farcaster => "farcaster",
        Highlight => "highlight",
        Lens => "lens",
        Mastodon => "mastodon",
        Mirror => "mirror",
        Momoka => "momoka",
        Opensea => "opensea",
        Paragraph => "paragraph",
        Rsshub => "rsshub",
        Uniswap => "uniswap",
    }
}

named_enum! {
    /// A category of activity clients can filter by.
    Tag as "tag" {
        Collectible => "collectible",
        Exchange => "exchange",
        Rss => "rss",
        Social => "social",
        Transaction => "transaction",
    }
}

named_enum! {
    /// An application whose activity appears on one of the networks.
    Platform as "platform" {
        Aave => "Aave",
        Crossbell => "Crossbell",
        Curve => "Curve",
        Farcaster => "Farcaster",
        Highlight => "Highlight",
        Lens => "Lens",
        Mastodon => "Mastodon",
        Mirror => "Mirror",
        Momoka => "Momoka",
        OpenSea => "OpenSea",
        Paragraph => "Paragraph",
        RssHub => "RSSHub",
        Uniswap => "Uniswap",
    }
}

/// How a network distributes its data.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum NetworkSource {
    Decentralized,
    Federated,
    Rss,
}

impl Network {
    /// The kind of source this network is.
    pub const fn source(&self) -> NetworkSource {
        match self {
            Network::Mastodon => NetworkSource::Federated,
            Network::Rss => NetworkSource::Rss,
            _ => NetworkSource::Decentralized,
        }
    }
}

/// One `(network, worker)` pair a node declares.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WorkerConfig {
    pub network: Network,
    pub worker: Worker,
}

/// The capabilities a node declares when registering.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeConfig {
    pub workers: Vec<WorkerConfig>,
}

impl NodeConfig {
    /// The capability records of the node at `address`, one per distinct pair.
    pub fn indexers(&self, address: NodeAddress) -> Vec<Indexer> {
        let pairs: BTreeSet<_> = self.workers.iter().copied().collect();
        pairs
            .into_iter()
            .map(|WorkerConfig { network, worker }| Indexer {
                address,
                network,
                worker,
            })
            .collect()
    }
}

/// A capability record: the node at `address` runs `worker` on `network`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Indexer {
    pub address: NodeAddress,
    pub network: Network,
    pub worker: Worker,
}

/// The immutable tables relating workers, networks, tags and platforms.
///
/// Built once at startup and shared by reference; tests may build alternative tables.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityTable {
    /// The networks each decentralized or federated worker must cover.
    pub worker_networks: BTreeMap<Worker, BTreeSet<Network>>,
    /// The workers able to produce activity of a given tag.
    pub tag_workers: BTreeMap<Tag, BTreeSet<Worker>>,
    /// The worker indexing each platform.
    pub platform_workers: BTreeMap<Platform, Worker>,
    /// The capability marking a node as serving RSS.
    pub rss: WorkerConfig,
    /// Platforms whose content may change after publication.
    pub mutable_platforms: BTreeSet<Platform>,
}

impl Default for CapabilityTable {
    fn default() -> Self {
        use Network as N;
        use Worker as W;

        let evm = [
            N::Arbitrum,
            N::Avax,
            N::Base,
            N::BinanceSmartChain,
            N::Ethereum,
            N::Gnosis,
            N::Linea,
            N::Optimism,
            N::Polygon,
        ];
        let worker_networks = BTreeMap::from([
            (
                W::Core,
                evm.into_iter().chain([N::Arweave]).collect::<BTreeSet<_>>(),
            ),
            (
                W::Aave,
                BTreeSet::from([
                    N::Arbitrum,
                    N::Avax,
                    N::Base,
                    N::Ethereum,
                    N::Optimism,
                    N::Polygon,
                ]),
            ),
            (
                W::Curve,
                BTreeSet::from([
                    N::Arbitrum,
                    N::Avax,
                    N::Ethereum,
                    N::Gnosis,
                    N::Optimism,
                    N::Polygon,
                ]),
            ),
            (W::Uniswap, BTreeSet::from([N::Ethereum, N::Linea])),
            (W::Opensea, BTreeSet::from([N::Ethereum])),
            (
                W::Highlight,
                BTreeSet::from([N::Arbitrum, N::Ethereum, N::Optimism, N::Polygon]),
            ),
            (W::Mirror, BTreeSet::from([N::Arweave])),
            (W::Paragraph, BTreeSet::from([N::Arweave])),
            (W::Momoka, BTreeSet::from([N::Arweave])),
            (W::Lens, BTreeSet::from([N::Polygon])),
            (W::Crossbell, BTreeSet::from([N::Crossbell])),
            (W::Farcaster, BTreeSet::from([N::Farcaster])),
            (W::Mastodon, BTreeSet::from([N::Mastodon])),
        ]);
        let tag_workers = BTreeMap::from([
            (
                Tag::Collectible,
                BTreeSet::from([W::Core, W::Highlight, W::Opensea]),
            ),
            (
                Tag::Exchange,
                BTreeSet::from([W::Aave, W::Core, W::Curve, W::Uniswap]),
            ),
            (Tag::Rss, BTreeSet::from([W::Rsshub])),
            (
                Tag::Social,
                BTreeSet::from([
                    W::Crossbell,
                    W::Farcaster,
                    W::Lens,
                    W::Mastodon,
                    W::Mirror,
                    W::Momoka,
                    W::Paragraph,
                ]),
            ),
            (Tag::Transaction, BTreeSet::from([W::Core])),
        ]);
        let platform_workers = BTreeMap::from([
            (Platform::Aave, W::Aave),
            (Platform::Crossbell, W::Crossbell),
            (Platform::Curve, W::Curve),
            (Platform::Farcaster, W::Farcaster),
            (Platform::Highlight, W::Highlight),
            (Platform::Lens, W::Lens),
            (Platform::Mastodon, W::Mastodon),
            (Platform::Mirror, W::Mirror),
            (Platform::Momoka, W::Momoka),
            (Platform::OpenSea, W::Opensea),
            (Platform::Paragraph, W::Paragraph),
            (Platform::RssHub, W::Rsshub),
            (Platform::Uniswap, W::Uniswap),
        ]);
        CapabilityTable {
            worker_networks,
            tag_workers,
            platform_workers,
            rss: WorkerConfig {
                network: N::Rss,
                worker: W::Rsshub,
            },
            mutable_platforms: BTreeSet::from([Platform::Mastodon, Platform::Mirror]),
        }
    }
}

impl CapabilityTable {
    /// The union of the workers producing any of `tags`.
    pub fn workers_for_tags(&self, tags: &[Tag]) -> BTreeSet<Worker> {
        tags.iter()
            .filter_map(|tag| self.tag_workers.get(tag))
            .flatten()
            .copied()
            .collect()
    }

    /// The worker indexing `platform`, if any.
    pub fn worker_for_platform(&self, platform: Platform) -> Option<Worker> {
        self.platform_workers.get(&platform).copied()
    }

    /// The networks `worker` is expected to cover.
    pub fn networks_for(&self, worker: Worker) -> BTreeSet<Network> {
        if worker == self.rss.worker {
            return BTreeSet::from([self.rss.network]);
        }
        self.worker_networks
            .get(&worker)
            .cloned()
            .unwrap_or_default()
    }

    /// The workers expected to run on `network`.
    pub fn workers_on(&self, network: Network) -> BTreeSet<Worker> {
        if network == self.rss.network {
            return BTreeSet::from([self.rss.worker]);
        }
        self.worker_networks
            .iter()
            .filter(|(_, networks)| networks.contains(&network))
            .map(|(worker, _)| *worker)
            .collect()
    }

    /// Whether the content of `platform` may change after it was first indexed.
    pub fn is_mutable(&self, platform: Platform) -> bool {
        self.mutable_platforms.contains(&platform)
    }

    /// Whether `indexers` cover every worker of the table on all its networks.
    pub fn is_full_node(&self, indexers: &[Indexer]) -> bool {
        let declared = group_by_worker(indexers);
        self.worker_networks.iter().all(|(worker, required)| {
            declared
                .get(worker)
                .is_some_and(|networks| networks.is_superset(required))
        })
    }

    /// Whether `indexers` include the RSS capability.
    pub fn is_rss_node(&self, indexers: &[Indexer]) -> bool {
        indexers
            .iter()
            .any(|indexer| indexer.network == self.rss.network && indexer.worker == self.rss.worker)
    }

    /// The number of distinct decentralized and federated networks in `indexers`.
    pub fn network_diversity(&self, indexers: &[Indexer]) -> (u32, u32) {
        let networks: BTreeSet<_> = indexers.iter().map(|indexer| indexer.network).collect();
        let count = |source| {
            networks
                .iter()
                .filter(|network| network.source() == source)
                .count() as u32
        };
        (
            count(NetworkSource::Decentralized),
            count(NetworkSource::Federated),
        )
    }

    /// Whether the table knows `indexer` as a valid capability.
    pub fn recognizes(&self, indexer: &Indexer) -> bool {
        self.networks_for(indexer.worker).contains(&indexer.network)
    }
}

/// Groups capability records into the networks each worker covers.
pub fn group_by_worker(indexers: &[Indexer]) -> BTreeMap<Worker, BTreeSet<Network>> {
    let mut grouped: BTreeMap<Worker, BTreeSet<Network>> = BTreeMap::new();
    for indexer in indexers {
        grouped
            .entry(indexer.worker)
            .or_default()
            .insert(indexer.network);
    }
    grouped
}

// Copyright (c) Zefchain Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Selection of the nodes whose declared capabilities satisfy a query.

#[cfg(test)]
#[path = "unit_tests/matcher_tests.rs"]
mod unit_tests;

use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};

use hub_base::{
    capability::{
        group_by_worker, CapabilityTable, Network, Platform, Tag, UnknownValueError, Worker,
    },
    identifiers::NodeAddress,
};
use hub_storage::{IndexerQuery, Store, StoreError};
use thiserror::Error;
use tracing::debug;

/// A query filter that cannot be served.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CapabilityError {
    #[error(transparent)]
    UnknownValue(#[from] UnknownValueError),
}

/// The networks each worker must index for a node to qualify.
///
/// An empty requirement means the query does not narrow the candidate nodes.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Requirement(BTreeMap<Worker, BTreeSet<Network>>);

impl Requirement {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn workers(&self) -> impl Iterator<Item = Worker> + '_ {
        self.0.keys().copied()
    }

    pub fn networks(&self) -> BTreeSet<Network> {
        self.0.values().flatten().copied().collect()
    }

    /// Whether the grouped capabilities of a node cover this requirement.
    pub fn is_covered_by(&self, declared: &BTreeMap<Worker, BTreeSet<Network>>) -> bool {
        self.0.iter().all(|(worker, required)| {
            declared
                .get(worker)
                .is_some_and(|networks| networks.is_superset(required))
        })
    }

    fn insert(&mut self, worker: Worker, networks: BTreeSet<Network>) {
        if !networks.is_empty() {
            self.0.insert(worker, networks);
        }
    }
}

impl FromIterator<(Worker, BTreeSet<Network>)> for Requirement {
    fn from_iter<I: IntoIterator<Item = (Worker, BTreeSet<Network>)>>(iter: I) -> Self {
        let mut requirement = Requirement::default();
        for (worker, networks) in iter {
            requirement.insert(worker, networks);
        }
        requirement
    }
}

/// Resolves query filters to a [`Requirement`] and finds the nodes meeting it.
#[derive(Clone)]
pub struct CapabilityMatcher {
    table: Arc<CapabilityTable>,
}

impl CapabilityMatcher {
    pub fn new(table: Arc<CapabilityTable>) -> Self {
        CapabilityMatcher { table }
    }

    pub fn table(&self) -> &CapabilityTable {
        &self.table
    }

    /// Parses and resolves the raw query filters.
    ///
    /// Unknown names are rejected before anything else happens.
    pub fn resolve<S: AsRef<str>>(
        &self,
        networks: &[S],
        tags: &[S],
        platforms: &[S],
    ) -> Result<Requirement, CapabilityError> {
        let networks = parse_all::<Network, _>(networks)?;
        let tags = parse_all::<Tag, _>(tags)?;
        let platforms = parse_all::<Platform, _>(platforms)?;

        let tag_workers = (!tags.is_empty()).then(|| self.table.workers_for_tags(&tags));
        let platform_workers = (!platforms.is_empty()).then(|| {
            platforms
                .iter()
                .filter_map(|platform| self.table.worker_for_platform(*platform))
                .collect::<BTreeSet<_>>()
        });
        let workers = match (tag_workers, platform_workers) {
            (Some(tag_workers), Some(platform_workers)) => Some(
                tag_workers
                    .intersection(&platform_workers)
                    .copied()
                    .collect::<BTreeSet<_>>(),
            ),
            (Some(workers), None) | (None, Some(workers)) => Some(workers),
            (None, None) => None,
        };
        let networks =
            (!networks.is_empty()).then(|| networks.into_iter().collect::<BTreeSet<_>>());

        let requirement = match (workers, networks) {
            (None, None) => Requirement::default(),
            (Some(workers), None) => workers
                .into_iter()
                .map(|worker| (worker, self.table.networks_for(worker)))
                .collect(),
            (None, Some(networks)) => self
                .workers_on_any(&networks)
                .into_iter()
                .map(|worker| (worker, self.restricted_networks(worker, &networks)))
                .collect(),
            (Some(workers), Some(networks)) => workers
                .intersection(&self.workers_on_any(&networks))
                .map(|worker| (*worker, self.restricted_networks(*worker, &networks)))
                .collect(),
        };
        Ok(requirement)
    }

    /// The requirement for serving content of `platform` published on `network`.
    pub fn platform_requirement(&self, platform: Platform, network: Network) -> Requirement {
        self.table
            .worker_for_platform(platform)
            .map(|worker| {
                let networks = self.restricted_networks(worker, &BTreeSet::from([network]));
                std::iter::once((worker, networks)).collect()
            })
            .unwrap_or_default()
    }

    /// Returns the nodes whose capability records cover `requirement`, in address order.
    ///
    /// An empty requirement or the absence of a match yields an empty list.
    pub async fn matching_nodes(
        &self,
        store: &dyn Store,
        requirement: &Requirement,
    ) -> Result<Vec<NodeAddress>, StoreError> {
        if requirement.is_empty() {
            return Ok(Vec::new());
        }
        let query = IndexerQuery {
            addresses: None,
            networks: Some(requirement.networks().into_iter().collect()),
            workers: Some(requirement.workers().collect()),
        };
        let indexers = store.find_node_indexers(&query).await?;

        let mut by_address: BTreeMap<NodeAddress, Vec<_>> = BTreeMap::new();
        for indexer in indexers {
            by_address.entry(indexer.address).or_default().push(indexer);
        }
        let matches = by_address
            .into_iter()
            .filter(|(_, indexers)| requirement.is_covered_by(&group_by_worker(indexers)))
            .map(|(address, _)| address)
            .collect::<Vec<_>>();
        debug!(count = matches.len(), "matched nodes by capability");
        Ok(matches)
    }

    fn workers_on_any(&self, networks: &BTreeSet<Network>) -> BTreeSet<Worker> {
        networks
            .iter()
            .flat_map(|network| self.table.workers_on(*network))
            .collect()
    }

    fn restricted_networks(
        &self,
        worker: Worker,
        networks: &BTreeSet<Network>,
    ) -> BTreeSet<Network> {
        self.table
            .networks_for(worker)
            .intersection(networks)
            .copied()
            .collect()
    }
}

fn parse_all<T, S>(values: &[S]) -> Result<Vec<T>, UnknownValueError>
where
    T: std::str::FromStr<Err = UnknownValueError>,
    S: AsRef<str>,
{
    values.iter().map(|value| value.as_ref().parse()).collect()
}

// Copyright (c) Zefchain Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Scoring of one round of answers, and cross-checks against nodes outside the round.

#[cfg(test)]
#[path = "unit_tests/verifier_tests.rs"]
mod unit_tests;

use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
    time::Duration,
};

#[cfg(with_metrics)]
use std::sync::LazyLock;

use hub_base::{
    capability::Platform,
    data_types::Timestamp,
    identifiers::NodeAddress,
    stat::{NodeCategory, Stat},
    time::timer::timeout,
};
use hub_storage::{StatQuery, Store, StoreError};
use tracing::{debug, error, instrument, trace, warn};
#[cfg(with_metrics)]
use {hub_base::prometheus_util::register_int_counter_vec, prometheus::IntCounterVec};

use crate::{
    distributor::DataResponse,
    matcher::CapabilityMatcher,
    node::NodeClient,
    pool::NodePool,
    request::{build_path, ActivityRequest},
    response::{compare, Activity, NodeResponse},
    scorer::compute_score,
};

#[cfg(with_metrics)]
static POINTS_COUNT: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec(
        "verifier_points_total",
        "Points handed out to nodes after verification, by kind",
        &["kind"],
    )
});

/// The largest round the comparison table covers.
const COMPARED_RESPONSES: usize = 3;

/// Sorts `responses` so that valid answers come first, keeping arrival order otherwise.
pub fn sort_responses(responses: &mut [DataResponse]) {
    responses.sort_by_key(|response| !response.valid);
}

/// Assigns points to the sorted `responses` of one round.
///
/// `known_stats` is the number of reputation records found for the participants; below
/// `quorum` the round is a cold start and answers are not compared.
pub fn assign_points(responses: &mut [DataResponse], known_stats: usize, quorum: usize) {
    if responses.is_empty() {
        return;
    }
    if known_stats < quorum {
        for response in responses.iter_mut() {
            reward_or_penalize(response);
        }
        return;
    }
    if !responses[0].valid {
        for response in responses.iter_mut() {
            response.invalid_points = 1;
        }
        return;
    }
    let count = responses.len().min(COMPARED_RESPONSES);
    let round = &mut responses[..count];
    match round {
        [first] => reward_or_penalize(first),
        [first, second] => assign_pair(first, second),
        [first, second, third] => assign_triple(first, second, third),
        _ => {}
    }
}

fn reward_or_penalize(response: &mut DataResponse) {
    if response.is_error() {
        response.invalid_points = 1;
    } else {
        response.valid_points = 1;
    }
}

fn payloads_match(left: &DataResponse, right: &DataResponse) -> bool {
    compare(left.payload.as_deref(), right.payload.as_deref())
}

/// Two answers: agreement rewards both, disagreement only the first, errors are penalized.
fn assign_pair(first: &mut DataResponse, second: &mut DataResponse) {
    match (first.is_error(), second.is_error()) {
        (false, false) => {
            if payloads_match(first, second) {
                first.valid_points = 2;
                second.valid_points = 1;
            } else {
                first.valid_points = 1;
            }
        }
        _ => {
            reward_or_penalize(first);
            reward_or_penalize(second);
        }
    }
}

fn assign_triple(first: &mut DataResponse, second: &mut DataResponse, third: &mut DataResponse) {
    match (second.is_error(), third.is_error()) {
        (true, true) => {
            reward_or_penalize(first);
            second.invalid_points = 1;
            third.invalid_points = 1;
            return;
        }
        (true, false) => {
            assign_pair(first, third);
            second.invalid_points = 1;
            return;
        }
        (false, true) => {
            assign_pair(first, second);
            third.invalid_points = 1;
            return;
        }
        (false, false) => {}
    }

    let first_second = payloads_match(first, second);
    let first_third = payloads_match(first, third);
    let second_third = payloads_match(second, third);
    if first_second && first_third {
        first.valid_points = 2;
        second.valid_points = 1;
        third.valid_points = 1;
    } else if first_second {
        first.valid_points = 2;
        second.valid_points = 1;
        third.invalid_points = 1;
    } else if first_third {
        first.valid_points = 2;
        third.valid_points = 1;
        second.invalid_points = 1;
    } else if second_third {
        if second.valid {
            second.valid_points = 2;
            third.valid_points = 1;
            first.invalid_points = 1;
        } else {
            first.valid_points = 1;
        }
    } else {
        first.valid_points = 1;
    }
}

/// Adds the points of `response` to the counters of `stat`.
fn apply_points(stat: &mut Stat, valid_points: u64, invalid_points: u64) {
    stat.total_request += valid_points;
    stat.epoch_request += valid_points;
    stat.epoch_invalid_request += invalid_points;
}

/// The pools a reputation record can be served from.
fn served_categories(stat: &Stat) -> impl Iterator<Item = NodeCategory> + '_ {
    NodeCategory::ALL
        .into_iter()
        .filter(move |category| stat.serves(*category))
}

/// Scores rounds in the background and persists the outcome.
#[derive(Clone)]
pub struct ResponseVerifier {
    store: Arc<dyn Store>,
    client: Arc<dyn NodeClient>,
    matcher: CapabilityMatcher,
    pool: NodePool,
    quorum: usize,
    slash_count: u64,
    verify_count: usize,
    verification_timeout: Duration,
}

impl ResponseVerifier {
    pub fn new(
        store: Arc<dyn Store>,
        client: Arc<dyn NodeClient>,
        matcher: CapabilityMatcher,
        pool: NodePool,
        config: &crate::HubConfig,
    ) -> Self {
        ResponseVerifier {
            store,
            client,
            matcher,
            pool,
            quorum: config.node_count,
            slash_count: config.slash_count,
            verify_count: config.verify_count,
            verification_timeout: config.verification_timeout(),
        }
    }

    /// Scores every answer of a round, persists the updated reputation records and
    /// rebuilds the node pools they belong to.
    ///
    /// Failures are logged: by the time this runs, the client already has its answer.
    #[instrument(level = "trace", skip_all, fields(responses = responses.len()))]
    pub async fn process_results(&self, mut responses: Vec<DataResponse>) -> Vec<DataResponse> {
        if responses.is_empty() {
            return responses;
        }
        let addresses = responses
            .iter()
            .map(|response| response.address)
            .collect::<Vec<_>>();
        let query = StatQuery {
            addresses: Some(addresses.clone()),
            ..StatQuery::default()
        };
        let stats = match self.store.find_node_stats(&query).await {
            Ok(stats) => stats,
            Err(error) => {
                error!(%error, "failed to load reputation records of the round");
                return responses;
            }
        };

        sort_responses(&mut responses);
        assign_points(&mut responses, stats.len(), self.quorum);

        let mut stats = stats
            .into_iter()
            .map(|stat| (stat.address, stat))
            .collect::<BTreeMap<_, _>>();
        let now = Timestamp::now();
        for response in &responses {
            #[cfg(with_metrics)]
            {
                POINTS_COUNT
                    .with_label_values(&["valid"])
                    .inc_by(response.valid_points);
                POINTS_COUNT
                    .with_label_values(&["invalid"])
                    .inc_by(response.invalid_points);
            }
            trace!(
                address = %response.address,
                valid_points = response.valid_points,
                invalid_points = response.invalid_points,
                "points assigned"
            );
            if let Some(stat) = stats.get_mut(&response.address) {
                apply_points(stat, response.valid_points, response.invalid_points);
                stat.score = compute_score(stat, now, self.slash_count);
            }
        }
        let mut categories = stats
            .values()
            .flat_map(served_categories)
            .collect::<BTreeSet<_>>();
        if let Err(error) = self
            .store
            .save_node_stats(stats.into_values().collect())
            .await
        {
            error!(%error, "failed to save reputation records of the round");
        }

        if let Some(best) = responses.first().filter(|response| response.valid) {
            let working_set = addresses.into_iter().collect::<BTreeSet<_>>();
            self.verify_secondary(best, &working_set, &mut categories).await;
        }
        self.refresh_pools(categories).await;
        responses
    }

    /// Rebuilds the cached pools of `categories` from the freshly saved records, so that
    /// a node slashed by this round is no longer served.
    async fn refresh_pools(&self, categories: BTreeSet<NodeCategory>) {
        for category in categories {
            if let Err(error) = self.pool.rebuild(category).await {
                error!(%category, %error, "failed to refresh the node pool");
            }
        }
    }

    /// Cross-checks the activities of a list answer against nodes outside `working_set`.
    ///
    /// At most `verify_count` distinct platforms are checked, and platforms whose content
    /// may change after publication are skipped.
    async fn verify_secondary(
        &self,
        best: &DataResponse,
        working_set: &BTreeSet<NodeAddress>,
        categories: &mut BTreeSet<NodeCategory>,
    ) {
        let Some(payload) = &best.payload else {
            return;
        };
        let NodeResponse::Activities { data, .. } = NodeResponse::classify(payload) else {
            return;
        };

        let mut samples: BTreeMap<Platform, Activity> = BTreeMap::new();
        for activity in data {
            if samples.len() == self.verify_count {
                break;
            }
            let Some(platform) = activity.platform() else {
                continue;
            };
            if self.matcher.table().is_mutable(platform) || samples.contains_key(&platform) {
                continue;
            }
            samples.insert(platform, activity);
        }

        let mut excluded = working_set.clone();
        for (platform, activity) in samples {
            match self.verify_activity(platform, &activity, &excluded).await {
                Ok(Some(stat)) => {
                    excluded.insert(stat.address);
                    categories.extend(served_categories(&stat));
                }
                Ok(None) => debug!(%platform, "no node available for a cross-check"),
                Err(error) => error!(%platform, %error, "cross-check failed"),
            }
        }
    }

    /// Asks the best qualifying node outside `excluded` for `activity` and records
    /// whether it agrees. Returns the updated record of the node that was asked, if any.
    async fn verify_activity(
        &self,
        platform: Platform,
        activity: &Activity,
        excluded: &BTreeSet<NodeAddress>,
    ) -> Result<Option<Stat>, StoreError> {
        let Some(network) = activity.network() else {
            return Ok(None);
        };
        let requirement = self.matcher.platform_requirement(platform, network);
        let candidates = self
            .matcher
            .matching_nodes(self.store.as_ref(), &requirement)
            .await?
            .into_iter()
            .filter(|address| !excluded.contains(address))
            .collect::<Vec<_>>();
        if candidates.is_empty() {
            return Ok(None);
        }
        let query = StatQuery {
            addresses: Some(candidates),
            max_invalid_request: Some(self.slash_count),
            limit: Some(1),
            ..StatQuery::default()
        };
        let Some(mut stat) = self.store.find_node_stats(&query).await?.into_iter().next() else {
            return Ok(None);
        };

        let url = build_path(&stat.endpoint, &ActivityRequest::new(activity.id.clone()));
        let agrees = match timeout(self.verification_timeout, self.client.get(&url)).await {
            Ok(Ok(body)) => match NodeResponse::classify(&body) {
                NodeResponse::Activity(Some(answer)) => answer.canonical() == activity.canonical(),
                _ => false,
            },
            Ok(Err(error)) => {
                warn!(address = %stat.address, %error, "cross-check request failed");
                false
            }
            Err(_) => false,
        };
        if agrees {
            apply_points(&mut stat, 1, 0);
        } else {
            apply_points(&mut stat, 0, 1);
        }
        stat.score = compute_score(&stat, Timestamp::now(), self.slash_count);
        debug!(address = %stat.address, %platform, agrees, "cross-check done");
        self.store.save_node_stats(vec![stat.clone()]).await?;
        Ok(Some(stat))
    }
}

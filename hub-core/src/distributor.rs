// Copyright (c) Zefchain Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Concurrent fan-out of one request to a set of nodes.
//!
//! Every node is queried in its own task. A collector task receives the answers as they
//! arrive, hands the first acceptable one to the caller and, once every node has
//! answered, runs the verification of the round in the background.

#[cfg(test)]
#[path = "unit_tests/distributor_tests.rs"]
mod unit_tests;

use std::{future::Future, sync::Arc, time::Duration};

#[cfg(with_metrics)]
use std::sync::LazyLock;

use hub_base::{identifiers::NodeAddress, stat::NodeEndpoint, time::timer::timeout};
use thiserror::Error;
use tokio::{
    sync::{oneshot, Mutex},
    task::JoinSet,
};
use tracing::{debug, instrument, trace, warn};
#[cfg(with_metrics)]
use {
    hub_base::prometheus_util::{
        exponential_bucket_latencies, register_histogram_vec, register_int_counter_vec,
    },
    prometheus::{HistogramVec, IntCounterVec},
};

use crate::{
    node::{NodeClient, NodeError},
    response::ResponseKind,
};

/// The payload handed to clients when no node answered in time.
pub const NODE_DATA_FAILED: &str = "node data failed";

#[cfg(with_metrics)]
static NODE_RESPONSE_COUNT: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec(
        "distributor_node_response_total",
        "Answers received from nodes, by outcome",
        &["outcome"],
    )
});

#[cfg(with_metrics)]
static ROUND_LATENCY: LazyLock<HistogramVec> = LazyLock::new(|| {
    register_histogram_vec(
        "distributor_round_latency_ms",
        "Time until a client received an answer, in milliseconds",
        &[],
        exponential_bucket_latencies(10_000.0),
    )
});

/// A failed round.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DistributorError {
    #[error("no node is available for this request")]
    NoNodes,
    /// No node answered usefully before the deadline.
    #[error("node data failed: no acceptable answer within {0:?}")]
    NodeDataFailed(Duration),
    /// Every node failed and the first failure is reported.
    #[error("node {address} failed: {error}")]
    Node {
        address: NodeAddress,
        error: NodeError,
    },
}

impl DistributorError {
    /// The payload returned to the client in place of node data.
    pub fn payload(&self) -> &'static [u8] {
        NODE_DATA_FAILED.as_bytes()
    }
}

/// The answer of one node within one round, and the points it earned.
#[derive(Clone, Debug, PartialEq)]
pub struct DataResponse {
    pub address: NodeAddress,
    pub endpoint: String,
    pub payload: Option<Vec<u8>>,
    pub error: Option<NodeError>,
    /// Whether the payload is acceptable for the kind of the round.
    pub valid: bool,
    pub valid_points: u64,
    pub invalid_points: u64,
}

impl DataResponse {
    /// Classifies the outcome of a request to `node` in a round expecting `kind`.
    pub fn new(
        node: NodeEndpoint,
        kind: ResponseKind,
        result: Result<Vec<u8>, NodeError>,
    ) -> Self {
        let (payload, error, valid) = match result {
            Ok(payload) => {
                let valid = kind.accepts(&payload);
                (Some(payload), None, valid)
            }
            Err(error) => (None, Some(error), false),
        };
        DataResponse {
            address: node.address,
            endpoint: node.endpoint,
            payload,
            error,
            valid,
            valid_points: 0,
            invalid_points: 0,
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    fn outcome(&self) -> &'static str {
        match (self.is_error(), self.valid) {
            (true, _) => "error",
            (false, true) => "valid",
            (false, false) => "invalid",
        }
    }

    fn into_client_result(self) -> Result<Vec<u8>, DistributorError> {
        match (self.payload, self.error) {
            (Some(payload), _) => Ok(payload),
            (None, Some(error)) => Err(DistributorError::Node {
                address: self.address,
                error,
            }),
            (None, None) => Err(DistributorError::NoNodes),
        }
    }
}

/// Picks the answer handed to the client once every node has answered and none of
/// them was acceptable: the first error-free one, else the very first.
fn fallback_winner(responses: &[DataResponse]) -> Option<&DataResponse> {
    responses
        .iter()
        .find(|response| !response.is_error())
        .or_else(|| responses.first())
}

/// Sends requests to nodes and returns the first acceptable answer.
#[derive(Clone)]
pub struct RequestDistributor {
    client: Arc<dyn NodeClient>,
    /// How long the client waits for an acceptable answer.
    request_timeout: Duration,
    /// How long any single node request may run, including after the client gave up.
    node_timeout: Duration,
    background: Arc<Mutex<JoinSet<()>>>,
}

impl RequestDistributor {
    pub fn new(
        client: Arc<dyn NodeClient>,
        request_timeout: Duration,
        node_timeout: Duration,
    ) -> Self {
        RequestDistributor {
            client,
            request_timeout,
            node_timeout,
            background: Arc::default(),
        }
    }

    /// Sends one request per `(node, url)` pair and returns the first answer that `kind`
    /// accepts.
    ///
    /// `process_results` receives every answer of the round once all nodes have answered
    /// or timed out. It runs in the background and is not cancelled when the caller stops
    /// waiting.
    #[instrument(level = "trace", skip_all, fields(nodes = requests.len()))]
    pub async fn distribute<F, R>(
        &self,
        requests: Vec<(NodeEndpoint, String)>,
        kind: ResponseKind,
        process_results: F,
    ) -> Result<Vec<u8>, DistributorError>
    where
        F: FnOnce(Vec<DataResponse>) -> R + Send + 'static,
        R: Future<Output = ()> + Send + 'static,
    {
        if requests.is_empty() {
            return Err(DistributorError::NoNodes);
        }
        #[cfg(with_metrics)]
        let start = std::time::Instant::now();

        let (sender, receiver) = oneshot::channel();
        let collector = Self::collect(
            self.client.clone(),
            self.node_timeout,
            requests,
            kind,
            sender,
            process_results,
        );
        {
            let mut background = self.background.lock().await;
            while background.try_join_next().is_some() {}
            background.spawn(collector);
        }

        let result = match timeout(self.request_timeout, receiver).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) | Err(_) => {
                warn!(timeout = ?self.request_timeout, "no node answered in time");
                Err(DistributorError::NodeDataFailed(self.request_timeout))
            }
        };
        #[cfg(with_metrics)]
        ROUND_LATENCY
            .with_label_values(&[])
            .observe(start.elapsed().as_secs_f64() * 1000.0);
        result
    }

    async fn collect<F, R>(
        client: Arc<dyn NodeClient>,
        node_timeout: Duration,
        requests: Vec<(NodeEndpoint, String)>,
        kind: ResponseKind,
        sender: oneshot::Sender<Result<Vec<u8>, DistributorError>>,
        process_results: F,
    ) where
        F: FnOnce(Vec<DataResponse>) -> R + Send + 'static,
        R: Future<Output = ()> + Send + 'static,
    {
        let mut tasks = JoinSet::new();
        for (node, url) in requests {
            let client = client.clone();
            tasks.spawn(async move {
                let result = match timeout(node_timeout, client.get(&url)).await {
                    Ok(result) => result,
                    Err(_) => Err(NodeError::Timeout(node_timeout)),
                };
                let response = DataResponse::new(node, kind, result);
                trace!(
                    address = %response.address,
                    %url,
                    outcome = response.outcome(),
                    "node request finished"
                );
                response
            });
        }

        let mut sender = Some(sender);
        let mut responses = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            let response = match joined {
                Ok(response) => response,
                Err(error) => {
                    warn!(%error, "node request task failed");
                    continue;
                }
            };
            #[cfg(with_metrics)]
            NODE_RESPONSE_COUNT
                .with_label_values(&[response.outcome()])
                .inc();
            if !response.is_error() && response.valid {
                if let Some(sender) = sender.take() {
                    debug!(address = %response.address, "first acceptable answer");
                    let payload = response.payload.clone().unwrap_or_default();
                    let _ = sender.send(Ok(payload));
                }
            }
            responses.push(response);
        }

        if let Some(sender) = sender.take() {
            let result = match fallback_winner(&responses) {
                Some(response) => response.clone().into_client_result(),
                None => Err(DistributorError::NoNodes),
            };
            let _ = sender.send(result);
        }
        process_results(responses).await;
    }

    /// Waits until every background verification started so far has finished.
    pub async fn await_verifications(&self) {
        loop {
            let mut tasks = std::mem::take(&mut *self.background.lock().await);
            if tasks.is_empty() {
                return;
            }
            while tasks.join_next().await.is_some() {}
        }
    }
}

// Copyright (c) Zefchain Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! The entry point of client queries.

use std::sync::Arc;

use hub_base::{
    capability::CapabilityTable,
    stat::{NodeCategory, NodeEndpoint},
};
use hub_storage::{Cache, Store, StoreError};
use thiserror::Error;
use tracing::{debug, instrument};

use crate::{
    distributor::{DistributorError, RequestDistributor},
    matcher::{CapabilityError, CapabilityMatcher},
    node::NodeClient,
    pool::{NodePool, PoolError},
    request::{build_paths, AccountActivitiesRequest, ActivityRequest, QueryParameters, RssRequest},
    response::ResponseKind,
    verifier::ResponseVerifier,
    HubConfig,
};

#[derive(Debug, Error)]
pub enum HubError {
    #[error(transparent)]
    Capability(#[from] CapabilityError),
    #[error(transparent)]
    Pool(#[from] PoolError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Distributor(#[from] DistributorError),
}

/// Answers client queries by fanning them out to the best qualified nodes.
#[derive(Clone)]
pub struct Hub {
    store: Arc<dyn Store>,
    matcher: CapabilityMatcher,
    pool: NodePool,
    distributor: RequestDistributor,
    verifier: Arc<ResponseVerifier>,
}

impl Hub {
    pub fn new(
        config: &HubConfig,
        table: Arc<CapabilityTable>,
        store: Arc<dyn Store>,
        cache: Arc<dyn Cache>,
        client: Arc<dyn NodeClient>,
    ) -> Self {
        let matcher = CapabilityMatcher::new(table);
        let pool = NodePool::new(
            store.clone(),
            cache,
            config.node_count,
            config.slash_count,
        );
        let distributor = RequestDistributor::new(
            client.clone(),
            config.request_timeout(),
            config.verification_timeout(),
        );
        let verifier = Arc::new(ResponseVerifier::new(
            store.clone(),
            client,
            matcher.clone(),
            pool.clone(),
            config,
        ));
        Hub {
            store,
            matcher,
            pool,
            distributor,
            verifier,
        }
    }

    pub fn pool(&self) -> &NodePool {
        &self.pool
    }

    /// Returns one activity by id.
    #[instrument(level = "trace", skip_all, fields(id = %request.id))]
    pub async fn activity(&self, request: &ActivityRequest) -> Result<Vec<u8>, HubError> {
        let nodes = self.pool.retrieve_nodes(NodeCategory::Full).await?;
        self.dispatch(nodes, request, ResponseKind::Activity).await
    }

    /// Returns the activities of one account.
    ///
    /// Unknown networks, tags or platforms are rejected before any node is queried.
    #[instrument(level = "trace", skip_all, fields(account = %request.account))]
    pub async fn account_activities(
        &self,
        request: &AccountActivitiesRequest,
    ) -> Result<Vec<u8>, HubError> {
        let requirement =
            self.matcher
                .resolve(&request.network, &request.tag, &request.platform)?;
        let matches = self
            .matcher
            .matching_nodes(self.store.as_ref(), &requirement)
            .await?;
        debug!(matches = matches.len(), "capability matches");
        let nodes = self.pool.retrieve_account_nodes(&matches).await?;
        self.dispatch(nodes, request, ResponseKind::Activity).await
    }

    /// Forwards an RSS query to the RSS pool. The feed is returned as the node sent it.
    #[instrument(level = "trace", skip_all, fields(path = %request.path))]
    pub async fn rss(&self, request: &RssRequest) -> Result<Vec<u8>, HubError> {
        let nodes = self.pool.retrieve_nodes(NodeCategory::Rss).await?;
        self.dispatch(nodes, request, ResponseKind::Feed).await
    }

    async fn dispatch(
        &self,
        nodes: Vec<NodeEndpoint>,
        request: &impl QueryParameters,
        kind: ResponseKind,
    ) -> Result<Vec<u8>, HubError> {
        let requests = build_paths(&nodes, request);
        let verifier = self.verifier.clone();
        let payload = self
            .distributor
            .distribute(requests, kind, move |responses| async move {
                verifier.process_results(responses).await;
            })
            .await?;
        Ok(payload)
    }

    /// Waits for the background verification of every round started so far.
    pub async fn await_verifications(&self) {
        self.distributor.await_verifications().await;
    }
}

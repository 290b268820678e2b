// Copyright (c) Zefchain Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Access to the HTTP surface of indexing nodes.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::trace;

/// The failure of a single request to a single node.
///
/// Such a failure is recorded against that node and never aborts a round.
#[derive(Eq, PartialEq, Clone, Debug, Serialize, Deserialize, Error, Hash)]
pub enum NodeError {
    #[error("failed to reach node: {error}")]
    Transport { error: String },

    #[error("node did not answer within {0:?}")]
    Timeout(Duration),

    #[error("failed to read the answer of the node: {error}")]
    Body { error: String },
}

/// How the hub talks to nodes.
#[async_trait]
pub trait NodeClient: Send + Sync {
    /// Performs a `GET` on `url` and returns the raw body.
    ///
    /// The body is returned whatever the HTTP status; classifying it is up to the caller.
    async fn get(&self, url: &str) -> Result<Vec<u8>, NodeError>;
}

/// A [`NodeClient`] over `reqwest`.
#[derive(Clone, Debug)]
pub struct HttpNodeClient {
    client: reqwest::Client,
}

impl HttpNodeClient {
    /// Creates a client whose requests give up after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, NodeError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| NodeError::Transport {
                error: error.to_string(),
            })?;
        Ok(HttpNodeClient { client })
    }
}

#[async_trait]
impl NodeClient for HttpNodeClient {
    async fn get(&self, url: &str) -> Result<Vec<u8>, NodeError> {
        let response =
            self.client
                .get(url)
                .send()
                .await
                .map_err(|error| NodeError::Transport {
                    error: error.to_string(),
                })?;
        trace!(%url, status = %response.status(), "node answered");
        let body = response.bytes().await.map_err(|error| NodeError::Body {
            error: error.to_string(),
        })?;
        Ok(body.to_vec())
    }
}

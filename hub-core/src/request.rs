// Copyright (c) Zefchain Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Requests the hub forwards to nodes, and how they are rendered into URLs.

#[cfg(test)]
#[path = "unit_tests/request_tests.rs"]
mod unit_tests;

use hub_base::stat::NodeEndpoint;
use percent_encoding::percent_decode_str;
use serde::{Deserialize, Serialize};
use url::form_urlencoded;

/// A request that can be sent to the HTTP surface of a node.
pub trait QueryParameters {
    /// The path of the request, relative to the endpoint of a node.
    fn path(&self) -> String;

    /// The query parameters, in order. Repeated keys are allowed.
    fn query(&self) -> Vec<(String, String)>;
}

/// Renders `request` against the endpoint of one node.
///
/// The query is form-encoded and the joined URL is then percent-decoded, so the same
/// request always produces the same URL for the same endpoint.
pub fn build_path(endpoint: &str, request: &impl QueryParameters) -> String {
    let mut path = format!("{}{}", endpoint.trim_end_matches('/'), request.path());
    let query = request.query();
    if !query.is_empty() {
        let encoded = form_urlencoded::Serializer::new(String::new())
            .extend_pairs(query)
            .finish();
        path.push('?');
        path.push_str(&encoded);
    }
    percent_decode_str(&path).decode_utf8_lossy().into_owned()
}

/// Renders `request` for every node of `nodes`.
pub fn build_paths(
    nodes: &[NodeEndpoint],
    request: &impl QueryParameters,
) -> Vec<(NodeEndpoint, String)> {
    nodes
        .iter()
        .map(|node| (node.clone(), build_path(&node.endpoint, request)))
        .collect()
}

/// A single activity, by id.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityRequest {
    pub id: String,
    pub action_limit: Option<u32>,
    pub action_page: Option<u32>,
}

impl ActivityRequest {
    pub fn new(id: impl Into<String>) -> Self {
        ActivityRequest {
            id: id.into(),
            ..ActivityRequest::default()
        }
    }
}

impl QueryParameters for ActivityRequest {
    fn path(&self) -> String {
        format!("/decentralized/tx/{}", self.id)
    }

    fn query(&self) -> Vec<(String, String)> {
        let mut query = Vec::new();
        push_optional(&mut query, "action_limit", self.action_limit);
        push_optional(&mut query, "action_page", self.action_page);
        query
    }
}

/// The activities of one account.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountActivitiesRequest {
    pub account: String,
    pub limit: Option<u32>,
    pub action_limit: Option<u32>,
    pub cursor: Option<String>,
    pub since_timestamp: Option<u64>,
    pub until_timestamp: Option<u64>,
    pub success: Option<bool>,
    pub direction: Option<String>,
    #[serde(default)]
    pub network: Vec<String>,
    #[serde(default)]
    pub tag: Vec<String>,
    #[serde(default, rename = "type")]
    pub activity_type: Vec<String>,
    #[serde(default)]
    pub platform: Vec<String>,
}

impl AccountActivitiesRequest {
    pub fn new(account: impl Into<String>) -> Self {
        AccountActivitiesRequest {
            account: account.into(),
            ..AccountActivitiesRequest::default()
        }
    }
}

impl QueryParameters for AccountActivitiesRequest {
    fn path(&self) -> String {
        format!("/decentralized/{}", self.account)
    }

    fn query(&self) -> Vec<(String, String)> {
        let mut query = Vec::new();
        push_optional(&mut query, "limit", self.limit);
        push_optional(&mut query, "action_limit", self.action_limit);
        push_optional(&mut query, "cursor", self.cursor.as_ref());
        push_optional(&mut query, "since_timestamp", self.since_timestamp);
        push_optional(&mut query, "until_timestamp", self.until_timestamp);
        push_optional(&mut query, "success", self.success);
        push_optional(&mut query, "direction", self.direction.as_ref());
        for (key, values) in [
            ("network", &self.network),
            ("tag", &self.tag),
            ("type", &self.activity_type),
            ("platform", &self.platform),
        ] {
            query.extend(values.iter().map(|value| (key.to_owned(), value.clone())));
        }
        query
    }
}

/// An RSS-hub passthrough.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RssRequest {
    /// The path below `/rss/`.
    pub path: String,
    /// The raw query forwarded to the node.
    #[serde(default)]
    pub query: Vec<(String, String)>,
}

impl QueryParameters for RssRequest {
    fn path(&self) -> String {
        format!("/rss/{}", self.path.trim_start_matches('/'))
    }

    fn query(&self) -> Vec<(String, String)> {
        self.query.clone()
    }
}

fn push_optional<T: ToString>(
    query: &mut Vec<(String, String)>,
    key: &str,
    value: Option<T>,
) {
    if let Some(value) = value {
        query.push((key.to_owned(), value.to_string()));
    }
}

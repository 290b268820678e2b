// Copyright (c) Zefchain Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Classification and comparison of the answers of nodes.

#[cfg(test)]
#[path = "unit_tests/response_tests.rs"]
mod unit_tests;

use hub_base::capability::{Network, Platform};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha3::{Digest, Sha3_256};

/// One indexed activity.
///
/// Only the fields the hub inspects are typed; everything else is kept as is.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

impl Activity {
    pub fn network(&self) -> Option<Network> {
        self.network.as_deref()?.parse().ok()
    }

    pub fn platform(&self) -> Option<Platform> {
        self.platform.as_deref()?.parse().ok()
    }

    /// The JSON value of this activity, with object keys in a canonical order.
    pub fn canonical(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// The pagination data of an activity list.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meta {
    #[serde(default)]
    pub cursor: Option<String>,
}

/// The decoded answer of a node.
#[derive(Clone, Debug, PartialEq)]
pub enum NodeResponse {
    /// `{"data": <Activity|null>}`
    Activity(Option<Activity>),
    /// `{"data": [<Activity>...], "meta": {"cursor": ...}}`
    Activities {
        data: Vec<Activity>,
        meta: Option<Meta>,
    },
    /// `{"error": ..., "error_code": ...}`
    Error { error: String, error_code: String },
    /// `{"message": ...}`
    NotFound { message: String },
    /// Anything else.
    Malformed,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: String,
    #[serde(default)]
    error_code: String,
}

#[derive(Deserialize)]
struct NotFoundEnvelope {
    message: String,
}

#[derive(Deserialize)]
struct ActivityEnvelope {
    data: Option<Activity>,
}

#[derive(Deserialize)]
struct ActivitiesEnvelope {
    data: Vec<Activity>,
    #[serde(default)]
    meta: Option<Meta>,
}

impl NodeResponse {
    /// Decodes a raw answer, trying the error envelope, then the not-found envelope,
    /// then the activity envelopes, and stopping at the first consistent match.
    pub fn classify(payload: &[u8]) -> NodeResponse {
        let Ok(Value::Object(object)) = serde_json::from_slice::<Value>(payload) else {
            return NodeResponse::Malformed;
        };
        if object.contains_key("error") {
            if let Ok(envelope) = ErrorEnvelope::deserialize(&Value::Object(object.clone())) {
                return NodeResponse::Error {
                    error: envelope.error,
                    error_code: envelope.error_code,
                };
            }
        }
        if !object.contains_key("data") {
            return match NotFoundEnvelope::deserialize(&Value::Object(object)) {
                Ok(envelope) => NodeResponse::NotFound {
                    message: envelope.message,
                },
                Err(_) => NodeResponse::Malformed,
            };
        }
        let value = Value::Object(object);
        if value["data"].is_array() {
            return match ActivitiesEnvelope::deserialize(&value) {
                Ok(envelope) => NodeResponse::Activities {
                    data: envelope.data,
                    meta: envelope.meta,
                },
                Err(_) => NodeResponse::Malformed,
            };
        }
        match ActivityEnvelope::deserialize(&value) {
            Ok(envelope) => NodeResponse::Activity(envelope.data),
            Err(_) => NodeResponse::Malformed,
        }
    }

    /// Whether the answer is one of the two activity envelopes.
    pub fn is_valid(&self) -> bool {
        matches!(
            self,
            NodeResponse::Activity(_) | NodeResponse::Activities { .. }
        )
    }
}

/// What a round expects from nodes, which decides when an answer is acceptable.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ResponseKind {
    /// One of the activity envelopes.
    #[default]
    Activity,
    /// An RSS-hub feed, passed through untouched. Any non-blank body that is not an
    /// error or not-found envelope is accepted, whatever its format.
    Feed,
}

impl ResponseKind {
    /// Whether `payload` is an acceptable answer of this kind.
    pub fn accepts(self, payload: &[u8]) -> bool {
        match self {
            ResponseKind::Activity => NodeResponse::classify(payload).is_valid(),
            ResponseKind::Feed => {
                payload.iter().any(|byte| !byte.is_ascii_whitespace())
                    && !matches!(
                        NodeResponse::classify(payload),
                        NodeResponse::Error { .. } | NodeResponse::NotFound { .. }
                    )
            }
        }
    }
}

/// The SHA3-256 digest of a payload.
pub fn payload_hash(payload: &[u8]) -> [u8; 32] {
    Sha3_256::digest(payload).into()
}

/// Whether two payloads carry the same content.
///
/// A missing payload is never equal to anything, including another missing payload.
pub fn compare(left: Option<&[u8]>, right: Option<&[u8]>) -> bool {
    match (left, right) {
        (Some(left), Some(right)) => payload_hash(left) == payload_hash(right),
        _ => false,
    }
}

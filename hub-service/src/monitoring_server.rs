// Copyright (c) Zefchain Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! The Prometheus endpoint of the hub.

use std::net::SocketAddr;

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use prometheus::{Encoder as _, TextEncoder};
use tokio::{net::TcpListener, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Serves `/metrics` on `address` until `shutdown_signal` is cancelled.
///
/// A failure to bind is logged and leaves the hub running without metrics.
pub fn start_metrics(address: SocketAddr, shutdown_signal: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        let listener = match TcpListener::bind(address).await {
            Ok(listener) => listener,
            Err(error) => {
                error!(%address, %error, "cannot bind the metrics endpoint");
                return;
            }
        };
        info!(%address, "serving metrics");
        let app = Router::new().route("/metrics", get(metrics));
        if let Err(error) = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal.cancelled_owned())
            .await
        {
            error!(%error, "metrics endpoint stopped");
        }
    })
}

async fn metrics() -> Response {
    let encoder = TextEncoder::new();
    let mut body = Vec::new();
    match encoder.encode(&prometheus::gather(), &mut body) {
        Ok(()) => {
            let content_type = encoder.format_type().to_owned();
            ([(header::CONTENT_TYPE, content_type)], body).into_response()
        }
        Err(error) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("cannot encode metrics: {error}"),
        )
            .into_response(),
    }
}

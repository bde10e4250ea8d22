// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! HTTP endpoints for metrics and probes.
//!
//! - `/metrics` serves the Prometheus registry in text format
//! - `/healthz` answers as long as the process serves requests
//! - `/readyz` succeeds once the reconciler has been started

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use axum::body::Body;
use axum::extract::State as AxumState;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::metrics::gather_metrics;

/// Shared state of the HTTP handlers.
#[derive(Clone)]
pub struct State {
    ready: CancellationToken,
}

impl State {
    /// Creates handler state. Readiness is reported once `ready` is cancelled.
    #[must_use]
    pub fn new(ready: CancellationToken) -> Self {
        Self { ready }
    }

    fn readiness(&self) -> Readiness {
        if self.ready.is_cancelled() {
            Readiness::Ready
        } else {
            Readiness::NotReady
        }
    }
}

/// Serves the HTTP endpoints on `addr` until `cancel` fires.
///
/// # Errors
///
/// Returns an error if the address cannot be bound or the server fails.
pub async fn serve(addr: SocketAddr, state: Arc<State>, cancel: CancellationToken) -> Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind metrics listener on {addr}"))?;
    info!("Metrics listening on {addr}");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
        .context("metrics server failed")?;
    Ok(())
}

/// Builds the router for the HTTP endpoints.
pub fn router(state: Arc<State>) -> Router {
    Router::new()
        .route("/metrics", get(metrics))
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .with_state(state)
}

async fn metrics() -> Response {
    match gather_metrics() {
        Ok(text) => text_response(StatusCode::OK, text),
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            text_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

async fn healthz() -> Response {
    text_response(StatusCode::OK, "Ok")
}

async fn readyz(AxumState(state): AxumState<Arc<State>>) -> Readiness {
    state.readiness()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Readiness {
    Ready,
    NotReady,
}

impl IntoResponse for Readiness {
    fn into_response(self) -> Response {
        match self {
            Self::Ready => text_response(StatusCode::OK, "Ok"),
            Self::NotReady => text_response(StatusCode::SERVICE_UNAVAILABLE, "NotReady"),
        }
    }
}

fn text_response(status: StatusCode, body: impl Into<Body>) -> Response {
    (
        status,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        body.into(),
    )
        .into_response()
}

#[cfg(test)]
#[path = "http_tests.rs"]
mod http_tests;

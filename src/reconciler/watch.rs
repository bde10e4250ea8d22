// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! API server endpoint watcher.
//!
//! Follows the `default/kubernetes` Endpoints object and dispatches every
//! freshly extracted API server list to the reconciliation loop. A failed
//! watch is restarted, at most once per restart interval.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, Result};
use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};
use k8s_openapi::api::core::v1::Endpoints;
use kube::runtime::{watcher, WatchStreamExt};
use kube::{Api, Client};
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::constants::{DEFAULT_NAMESPACE, KUBERNETES_ENDPOINTS_NAME};
use crate::endpoints::extract_api_server_addresses;
use crate::errors::ReconcileError;
use crate::metrics::record_endpoint_extraction;
use crate::reconciler::dispatch::Dispatcher;

/// A watchable source of the API server Endpoints object.
pub trait EndpointsSource: Send + Sync {
    /// Opens a stream yielding the Endpoints object whenever it is added or modified.
    fn watch(&self) -> BoxStream<'static, Result<Endpoints>>;
}

/// Watches `default/kubernetes` through the Kubernetes API.
#[derive(Clone)]
pub struct KubeEndpointsSource {
    client: Client,
}

impl KubeEndpointsSource {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

impl EndpointsSource for KubeEndpointsSource {
    fn watch(&self) -> BoxStream<'static, Result<Endpoints>> {
        let api: Api<Endpoints> = Api::namespaced(self.client.clone(), DEFAULT_NAMESPACE);
        let config = watcher::Config::default()
            .fields(&format!("metadata.name={KUBERNETES_ENDPOINTS_NAME}"));

        watcher(api, config)
            .default_backoff()
            .applied_objects()
            .map_err(anyhow::Error::from)
            .boxed()
    }
}

/// Runs the watcher until `cancel` fires.
pub(crate) async fn run_endpoint_watcher(
    source: Arc<dyn EndpointsSource>,
    dispatcher: Dispatcher,
    cancel: CancellationToken,
    restart_interval: Duration,
) {
    let mut restart = interval(restart_interval);
    restart.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            _ = restart.tick() => {}
        }

        if let Err(e) = watch_api_servers(source.as_ref(), &dispatcher, &cancel).await {
            if !is_shutdown(&e, &cancel) {
                let message = format!("{e:#}");
                error!(error = %message, "Failed to reconcile API server addresses");
            }
        }
    }
}

async fn watch_api_servers(
    source: &dyn EndpointsSource,
    dispatcher: &Dispatcher,
    cancel: &CancellationToken,
) -> Result<()> {
    let mut stream = source.watch();
    debug!("Watching API server endpoints");

    loop {
        let endpoints = tokio::select! {
            biased;
            () = cancel.cancelled() => return Ok(()),
            next = stream.next() => match next {
                Some(endpoints) => endpoints.context("failed to watch API server endpoints")?,
                None => anyhow::bail!("API server endpoints watch ended"),
            },
        };

        let extracted = match extract_api_server_addresses(&endpoints) {
            Ok(extracted) => extracted,
            Err(e) => {
                record_endpoint_extraction(None, e.warning_count());
                warn!(error = %e, "Failed to extract API server addresses, keeping previous ones");
                continue;
            }
        };

        for warning in &extracted.warnings {
            warn!(path = %warning.path, "Skipped API server endpoint: {}", warning.message);
        }
        record_endpoint_extraction(Some(extracted.api_servers.len()), extracted.warnings.len());

        let api_servers = extracted.api_servers;
        debug!(api_servers = api_servers.len(), "Dispatching API server addresses");
        dispatcher
            .dispatch(cancel, move |snapshot| snapshot.api_servers = api_servers)
            .await?;
    }
}

/// Whether `e` only reports that the watcher is being shut down.
fn is_shutdown(e: &anyhow::Error, cancel: &CancellationToken) -> bool {
    if cancel.is_cancelled() {
        return true;
    }
    e.downcast_ref::<ReconcileError>()
        .is_some_and(|e| e.is_stopped_concurrently() || e.is_cancelled())
}

#[cfg(test)]
#[path = "watch_tests.rs"]
mod watch_tests;

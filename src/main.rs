// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

use anyhow::{Context as _, Result};
use clap::Parser;
use kube::Client;
use std::future::Future;
use std::sync::Arc;
use tokio::signal::unix::{signal, Signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use workerconfig::{
    applier::KubeApplier,
    config::{load_cluster_config, ControllerArgs},
    constants::TOKIO_WORKER_THREADS,
    crd::ClusterSpec,
    http,
    leader::{LeaderElector, LeaseLeaderElector, StaticLeaderElector},
    reconciler::{
        watch::{EndpointsSource, KubeEndpointsSource},
        Reconciler,
    },
};

/// Identity used for the leader lease when none is configured.
const FALLBACK_IDENTITY: &str = "workerconfig";

fn main() -> Result<()> {
    let args = ControllerArgs::parse();

    // Build Tokio runtime with custom thread names
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(TOKIO_WORKER_THREADS)
        .thread_name("workerconfig")
        .enable_all()
        .build()?;

    runtime.block_on(async_main(args))
}

async fn async_main(args: ControllerArgs) -> Result<()> {
    // Respects RUST_LOG (default: info) and RUST_LOG_FORMAT (json or text)
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let log_format = std::env::var("RUST_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    match log_format.to_lowercase().as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .json()
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .with_ansi(true)
                .compact()
                .init();
        }
    }

    info!("Starting worker configuration reconciler");

    let cluster = load_cluster_config(&args.cluster_config).await?;
    let config = args.reconciler_config(&cluster.spec)?;
    debug!(
        cluster_dns = %config.generator.cluster_dns_ip,
        cluster_domain = %config.generator.cluster_domain,
        api_server_reconciliation = config.api_server_reconciliation_enabled,
        "Loaded cluster configuration"
    );

    debug!("Initializing Kubernetes client");
    let client = Client::try_default().await?;
    debug!("Kubernetes client initialized successfully");

    let shutdown = CancellationToken::new();

    let leader: Arc<dyn LeaderElector> = if args.leader_election {
        let settings = args.lease_settings(&hostname_or(std::env::var("HOSTNAME").ok()));
        Arc::new(
            LeaseLeaderElector::start(client.clone(), &settings, shutdown.child_token()).await?,
        )
    } else {
        info!("Leader election disabled, acting as leader");
        Arc::new(StaticLeaderElector::leader())
    };

    let endpoints: Arc<dyn EndpointsSource> = Arc::new(KubeEndpointsSource::new(client.clone()));
    let reconciler = Reconciler::new(config, leader, Some(endpoints));
    reconciler.init(Arc::new(KubeApplier::new(client)))?;
    reconciler.start()?;

    let ready = CancellationToken::new();
    let mut server = tokio::spawn(http::serve(
        args.metrics_bind_address,
        Arc::new(http::State::new(ready.clone())),
        shutdown.child_token(),
    ));
    ready.cancel();

    let mut hangup = signal(SignalKind::hangup()).context("failed to install SIGHUP handler")?;
    let mut terminate =
        signal(SignalKind::terminate()).context("failed to install SIGTERM handler")?;

    let mut terminated = unless_terminated(
        reconcile_cluster_config(&reconciler, &shutdown, &cluster.spec),
        termination(&mut terminate),
    )
    .await;

    let outcome = loop {
        if let Some(name) = terminated {
            info!("Received {name}, shutting down");
            break Ok(());
        }
        tokio::select! {
            name = termination(&mut terminate) => terminated = Some(name),
            _ = hangup.recv() => {
                info!("Received SIGHUP, reloading cluster configuration");
                terminated = unless_terminated(
                    reload_cluster_config(&args, &reconciler, &shutdown),
                    termination(&mut terminate),
                )
                .await;
            }
            result = &mut server => {
                error!("CRITICAL: metrics server exited unexpectedly: {:?}", result);
                break Err(anyhow::anyhow!("metrics server exited unexpectedly"));
            }
        }
    };

    reconciler.stop().await?;
    shutdown.cancel();
    outcome
}

/// Waits for SIGINT or SIGTERM and names the signal received.
async fn termination(terminate: &mut Signal) -> &'static str {
    tokio::select! {
        _ = tokio::signal::ctrl_c() => "SIGINT",
        _ = terminate.recv() => "SIGTERM",
    }
}

/// Runs `work` unless a termination signal arrives first, in which case
/// `work` is abandoned and the signal name returned.
async fn unless_terminated(
    work: impl Future<Output = ()>,
    termination: impl Future<Output = &'static str>,
) -> Option<&'static str> {
    tokio::select! {
        () = work => None,
        name = termination => Some(name),
    }
}

/// Reads the cluster config file again and reconciles it.
async fn reload_cluster_config(
    args: &ControllerArgs,
    reconciler: &Reconciler,
    shutdown: &CancellationToken,
) {
    match load_cluster_config(&args.cluster_config).await {
        Ok(cluster) => reconcile_cluster_config(reconciler, shutdown, &cluster.spec).await,
        Err(e) => {
            let message = format!("{e:#}");
            error!(error = %message, "Failed to reload cluster configuration");
        }
    }
}

/// Reconciles `spec`, logging failures. A concurrent stop is not a failure.
async fn reconcile_cluster_config(
    reconciler: &Reconciler,
    shutdown: &CancellationToken,
    spec: &ClusterSpec,
) {
    match reconciler.reconcile(shutdown, spec).await {
        Ok(()) => debug!("Cluster configuration reconciled"),
        Err(e) if e.is_stopped_concurrently() || e.is_cancelled() => {
            warn!(error = %e, "Cluster configuration not reconciled, shutting down");
        }
        Err(e) => error!(error = %e, "Failed to reconcile cluster configuration"),
    }
}

/// Lease identity derived from the hostname, if one is known.
fn hostname_or(hostname: Option<String>) -> String {
    hostname
        .map(|h| h.trim().to_string())
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| FALLBACK_IDENTITY.to_string())
}

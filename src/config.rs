// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Process configuration.
//!
//! Every flag can also be set through an environment variable. The cluster
//! configuration file is a YAML `ClusterConfig` document; its spec provides the
//! node-level reconciler settings and is the first input reconciled.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context as _, Result};
use clap::Parser;

use crate::constants::{
    DEFAULT_LEASE_DURATION_SECS, DEFAULT_LEASE_GRACE_SECS, DEFAULT_LEASE_NAME,
    DEFAULT_METRICS_BIND_ADDRESS, KUBE_SYSTEM_NAMESPACE, RECONCILE_RETRY_INTERVAL,
};
use crate::crd::{ClusterConfig, ClusterSpec};
use crate::leader::LeaseSettings;
use crate::reconciler::ReconcilerConfig;

/// Reconciles k0s worker configuration into the cluster.
#[derive(Parser, Debug, Clone)]
#[command(name = "workerconfig", version, about)]
pub struct ControllerArgs {
    /// Path to the YAML ClusterConfig document
    #[arg(long, env = "WORKERCONFIG_CLUSTER_CONFIG")]
    pub cluster_config: PathBuf,

    /// Whether konnectivity agents run on worker nodes
    #[arg(
        long,
        env = "WORKERCONFIG_KONNECTIVITY_ENABLED",
        default_value_t = true,
        action = clap::ArgAction::Set
    )]
    pub konnectivity_enabled: bool,

    /// Only reconcile while holding the leader lease
    #[arg(
        long,
        env = "WORKERCONFIG_LEADER_ELECTION",
        default_value_t = true,
        action = clap::ArgAction::Set
    )]
    pub leader_election: bool,

    /// Name of the leader election Lease
    #[arg(long, env = "WORKERCONFIG_LEASE_NAME", default_value = DEFAULT_LEASE_NAME)]
    pub lease_name: String,

    /// Namespace of the leader election Lease
    #[arg(long, env = "WORKERCONFIG_LEASE_NAMESPACE", default_value = KUBE_SYSTEM_NAMESPACE)]
    pub lease_namespace: String,

    /// Lease holder identity, defaults to the hostname
    #[arg(long, env = "POD_NAME")]
    pub identity: Option<String>,

    /// Address serving /metrics, /healthz and /readyz
    #[arg(long, env = "WORKERCONFIG_METRICS_BIND_ADDRESS", default_value = DEFAULT_METRICS_BIND_ADDRESS)]
    pub metrics_bind_address: SocketAddr,

    /// Seconds between retries of a failed reconciliation
    #[arg(
        long,
        env = "WORKERCONFIG_RETRY_INTERVAL_SECS",
        default_value_t = RECONCILE_RETRY_INTERVAL.as_secs(),
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub retry_interval_secs: u64,
}

impl ControllerArgs {
    /// Derives the reconciler settings from the node's cluster configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the cluster DNS address cannot be derived.
    pub fn reconciler_config(&self, spec: &ClusterSpec) -> Result<ReconcilerConfig> {
        let mut config = ReconcilerConfig::from_node_spec(spec, self.konnectivity_enabled)
            .context("invalid network configuration")?;
        config.retry_interval = Duration::from_secs(self.retry_interval_secs);
        Ok(config)
    }

    /// Lease settings for leader election, identifying this replica by
    /// `--identity` or the given hostname.
    #[must_use]
    pub fn lease_settings(&self, hostname: &str) -> LeaseSettings {
        LeaseSettings {
            name: self.lease_name.clone(),
            namespace: self.lease_namespace.clone(),
            identity: self
                .identity
                .clone()
                .unwrap_or_else(|| hostname.to_string()),
            duration_secs: DEFAULT_LEASE_DURATION_SECS,
            grace_secs: DEFAULT_LEASE_GRACE_SECS,
        }
    }
}

/// Parses a YAML `ClusterConfig` document.
///
/// # Errors
///
/// Returns an error if the document is not a valid `ClusterConfig`.
pub fn parse_cluster_config(yaml: &str) -> Result<ClusterConfig> {
    serde_yaml::from_str(yaml).context("failed to parse ClusterConfig")
}

/// Reads and parses a YAML `ClusterConfig` file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub async fn load_cluster_config(path: &Path) -> Result<ClusterConfig> {
    let yaml = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    parse_cluster_config(&yaml).with_context(|| format!("invalid cluster config {}", path.display()))
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod config_tests;

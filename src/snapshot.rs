// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Snapshots of the state worker configuration is derived from.
//!
//! Snapshots are plain values: cloning one gives an independent copy and
//! structural equality decides whether a reconciliation has anything to do.

use crate::crd::{ClusterSpec, FeatureGate, ImageSpec, NodeLocalLoadBalancing, WorkerProfile};
use crate::host_port::HostPort;

/// The subset of a [`ClusterSpec`] that affects generated worker configuration.
#[derive(Clone, Debug, PartialEq)]
pub struct ConfigSnapshot {
    pub dual_stack_enabled: bool,
    pub node_local_load_balancing: Option<NodeLocalLoadBalancing>,
    pub konnectivity_agent_port: u16,
    pub default_image_pull_policy: String,
    pub profiles: Vec<WorkerProfile>,
    pub feature_gates: Vec<FeatureGate>,
    pub pause_image: ImageSpec,
    pub windows_pause_image: Option<ImageSpec>,
}

impl ConfigSnapshot {
    /// Takes a snapshot of the relevant parts of `spec`.
    #[must_use]
    pub fn from_spec(spec: &ClusterSpec) -> Self {
        let network = spec.network_or_default();
        let images = spec.images_or_default();

        Self {
            dual_stack_enabled: network.dual_stack.enabled,
            node_local_load_balancing: network.node_local_load_balancing,
            konnectivity_agent_port: spec.konnectivity_or_default().agent_port,
            default_image_pull_policy: images.default_pull_policy,
            profiles: spec.worker_profiles.clone(),
            feature_gates: spec.feature_gates.clone(),
            pause_image: images.pause,
            windows_pause_image: images.windows_pause,
        }
    }
}

/// The composite state owned by the reconciliation loop.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Snapshot {
    /// Cluster configuration, unset until the first reconcile call.
    pub config: Option<ConfigSnapshot>,

    /// Currently known API server addresses.
    pub api_servers: Vec<HostPort>,

    /// Bumped to force a reconciliation when nothing else changed.
    pub serial: u64,
}

impl Snapshot {
    /// Whether enough is known to generate resources.
    ///
    /// The cluster configuration must have been supplied, and when API server
    /// reconciliation is enabled at least one API server must be known.
    #[must_use]
    pub fn is_complete(&self, api_server_reconciliation_enabled: bool) -> bool {
        self.config.is_some() && (!api_server_reconciliation_enabled || !self.api_servers.is_empty())
    }

    /// Forces the next comparison against an applied snapshot to differ.
    pub fn bump_serial(&mut self) {
        self.serial = self.serial.wrapping_add(1);
    }
}

#[cfg(test)]
#[path = "snapshot_tests.rs"]
mod snapshot_tests;

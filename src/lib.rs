// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

#![allow(unexpected_cfgs)]

//! # workerconfig - Worker configuration reconciler for k0s
//!
//! `workerconfig` keeps the kubelet configuration of every worker profile, and
//! the RBAC rules that let nodes read it, in sync with the cluster's
//! administrator-supplied `ClusterConfig` and its live API server endpoints.
//!
//! ## Overview
//!
//! Several control plane replicas may run at once, but only the lease holder
//! writes. Inputs arrive on independent timelines:
//!
//! - cluster configuration changes, through [`reconciler::Reconciler::reconcile`]
//! - API server endpoint churn, through the endpoint watcher
//! - leadership transitions, through the [`leader::LeaderElector`] callback
//!
//! All of them are serialized through a single reconciliation loop that only
//! applies when the desired state differs from what was last applied, and
//! retries failed applies on a fixed interval.
//!
//! ## Modules
//!
//! - [`reconciler`] - Lifecycle, update dispatch, reconciliation loop and endpoint watcher
//! - [`resources`] - ConfigMap, Role and RoleBinding generation
//! - [`profile`] - Worker profile data stored in ConfigMaps
//! - [`endpoints`] - API server address extraction
//! - [`crd`] - The `ClusterConfig` custom resource
//! - [`applier`] - Server-side apply of generated resources
//! - [`leader`] - Leader election
//!
//! ## Example
//!
//! ```rust
//! use workerconfig::crd::ClusterSpec;
//! use workerconfig::reconciler::ReconcilerConfig;
//!
//! let config = ReconcilerConfig::from_node_spec(&ClusterSpec::default(), true).unwrap();
//! assert_eq!(config.generator.cluster_dns_ip.to_string(), "10.96.0.10");
//! assert!(config.api_server_reconciliation_enabled);
//! ```

pub mod applier;
pub mod config;
pub mod constants;
pub mod crd;
pub mod endpoints;
pub mod errors;
pub mod host_port;
pub mod http;
pub mod labels;
pub mod leader;
pub mod metrics;
pub mod profile;
pub mod reconciler;
pub mod resources;
pub mod snapshot;

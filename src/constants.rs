// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Global constants for the worker configuration reconciler.
//!
//! This module contains all numeric and string constants used throughout the codebase.
//! Constants are organized by category for easy maintenance.

use std::time::Duration;

// ============================================================================
// Component Constants
// ============================================================================

/// Name of the worker configuration component
///
/// Used as the stack label value, the RBAC name suffix and the ConfigMap name prefix.
pub const COMPONENT_NAME: &str = "worker-config";

/// Field manager used for server-side apply
pub const FIELD_MANAGER: &str = "workerconfig";

/// Namespace all generated resources live in
pub const KUBE_SYSTEM_NAMESPACE: &str = "kube-system";

/// Kubernetes `major.minor` version embedded into ConfigMap names
pub const KUBERNETES_MAJOR_MINOR_VERSION: &str = "1.31";

// ============================================================================
// ClusterConfig API Constants
// ============================================================================

/// API group of the `ClusterConfig` resource
pub const API_GROUP: &str = "k0s.k0sproject.io";

/// API version of the `ClusterConfig` resource
pub const API_VERSION: &str = "v1beta1";

/// Kind name of the `ClusterConfig` resource
pub const KIND_CLUSTER_CONFIG: &str = "ClusterConfig";

// ============================================================================
// Worker Profile Constants
// ============================================================================

/// Built-in worker profile for Linux nodes
pub const DEFAULT_PROFILE_NAME: &str = "default";

/// Built-in worker profile for Windows nodes
pub const DEFAULT_WINDOWS_PROFILE_NAME: &str = "default-windows";

/// `apiVersion` of the generated kubelet configuration
pub const KUBELET_CONFIG_API_VERSION: &str = "kubelet.config.k8s.io/v1beta1";

/// `kind` of the generated kubelet configuration
pub const KUBELET_CONFIG_KIND: &str = "KubeletConfiguration";

/// Minimum TLS version accepted by kubelets
pub const KUBELET_TLS_MIN_VERSION: &str = "VersionTLS12";

/// TLS 1.2 cipher suites allowed on kubelet endpoints
pub const KUBELET_TLS_CIPHER_SUITES: [&str; 6] = [
    "TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256",
    "TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384",
    "TLS_ECDHE_ECDSA_WITH_CHACHA20_POLY1305_SHA256",
    "TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256",
    "TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384",
    "TLS_ECDHE_RSA_WITH_CHACHA20_POLY1305_SHA256",
];

/// Component name used to select kubelet feature gates
pub const KUBELET_COMPONENT: &str = "kubelet";

/// Components a feature gate applies to when it names none
pub const KUBERNETES_COMPONENTS: [&str; 5] = [
    "kube-apiserver",
    "kube-controller-manager",
    "kubelet",
    "kube-scheduler",
    "kube-proxy",
];

// ============================================================================
// RBAC Constants
// ============================================================================

/// Group of nodes using bootstrap tokens
pub const BOOTSTRAPPERS_GROUP: &str = "system:bootstrappers";

/// Group of fully joined nodes
pub const NODES_GROUP: &str = "system:nodes";

// ============================================================================
// Endpoint Discovery Constants
// ============================================================================

/// Name of the Endpoints object backing the API server service
pub const KUBERNETES_ENDPOINTS_NAME: &str = "kubernetes";

/// Namespace of the API server Endpoints object
pub const DEFAULT_NAMESPACE: &str = "default";

/// Port name carrying secure API traffic
pub const HTTPS_PORT_NAME: &str = "https";

/// Protocol accepted for API server ports
pub const TCP_PROTOCOL: &str = "TCP";

// ============================================================================
// Network Defaults
// ============================================================================

/// Default service CIDR
pub const DEFAULT_SERVICE_CIDR: &str = "10.96.0.0/12";

/// Default cluster domain
pub const DEFAULT_CLUSTER_DOMAIN: &str = "cluster.local";

/// Default konnectivity agent port
pub const DEFAULT_KONNECTIVITY_AGENT_PORT: u16 = 8132;

/// Default Envoy bind port for the API server
pub const DEFAULT_ENVOY_API_SERVER_BIND_PORT: u16 = 7443;

/// Default Envoy bind port for konnectivity
pub const DEFAULT_ENVOY_KONNECTIVITY_SERVER_BIND_PORT: u16 = 7132;

/// Offset of the cluster DNS address inside the service CIDR
pub const CLUSTER_DNS_ADDRESS_OFFSET: u32 = 10;

/// Offset used when the service CIDR is too narrow for the regular offset
pub const CLUSTER_DNS_NARROW_ADDRESS_OFFSET: u32 = 2;

/// Prefix length from which the narrow offset is used
pub const CLUSTER_DNS_NARROW_PREFIX_LEN: u8 = 29;

// ============================================================================
// Image Defaults
// ============================================================================

/// Default pause image repository
pub const DEFAULT_PAUSE_IMAGE: &str = "registry.k8s.io/pause";

/// Default pause image version
pub const DEFAULT_PAUSE_IMAGE_VERSION: &str = "3.9";

/// Default Envoy proxy image repository
pub const DEFAULT_ENVOY_PROXY_IMAGE: &str = "quay.io/k0sproject/envoy-distroless";

/// Default Envoy proxy image version
pub const DEFAULT_ENVOY_PROXY_IMAGE_VERSION: &str = "v1.31.5";

/// Default image pull policy
pub const DEFAULT_PULL_POLICY: &str = "IfNotPresent";

// ============================================================================
// Timing Constants
// ============================================================================

/// Interval at which a failed reconciliation is retried
pub const RECONCILE_RETRY_INTERVAL: Duration = Duration::from_secs(60);

/// Minimum time between two restarts of the endpoint watch
pub const ENDPOINT_WATCH_RESTART_INTERVAL: Duration = Duration::from_secs(10);

/// Deadline for the dispatch issued when leadership is acquired
pub const LEADER_CALLBACK_TIMEOUT: Duration = Duration::from_secs(60);

/// Capacity of the update queue between producers and the reconciliation loop
pub const UPDATE_QUEUE_CAPACITY: usize = 1;

// ============================================================================
// Leader Election Defaults
// ============================================================================

/// Default name of the lease used for leader election
pub const DEFAULT_LEASE_NAME: &str = "worker-config";

/// Default lease duration in seconds
pub const DEFAULT_LEASE_DURATION_SECS: u64 = 30;

/// Default lease grace period in seconds
pub const DEFAULT_LEASE_GRACE_SECS: u64 = 5;

// ============================================================================
// Runtime Constants
// ============================================================================

/// Number of Tokio worker threads
pub const TOKIO_WORKER_THREADS: usize = 2;

/// Default bind address of the metrics server
pub const DEFAULT_METRICS_BIND_ADDRESS: &str = "0.0.0.0:8080";

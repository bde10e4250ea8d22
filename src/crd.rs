// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Custom Resource Definition for the administrator-supplied cluster configuration.
//!
//! Only the parts of the k0s `ClusterConfig` (`k0s.k0sproject.io/v1beta1`) that
//! influence worker configuration are modelled here. Unknown fields are ignored
//! when a document is loaded.
//!
//! # Example
//!
//! ```rust
//! use workerconfig::crd::{ClusterSpec, WorkerProfile};
//! use serde_json::json;
//!
//! let spec = ClusterSpec {
//!     worker_profiles: vec![WorkerProfile {
//!         name: "low-memory".to_string(),
//!         values: json!({"evictionHard": {"memory.available": "100Mi"}}),
//!     }],
//!     ..Default::default()
//! };
//! assert_eq!(spec.network_or_default().cluster_domain, "cluster.local");
//! ```

use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr};

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::constants::{
    CLUSTER_DNS_ADDRESS_OFFSET, CLUSTER_DNS_NARROW_ADDRESS_OFFSET, CLUSTER_DNS_NARROW_PREFIX_LEN,
    DEFAULT_CLUSTER_DOMAIN, DEFAULT_ENVOY_API_SERVER_BIND_PORT,
    DEFAULT_ENVOY_KONNECTIVITY_SERVER_BIND_PORT, DEFAULT_ENVOY_PROXY_IMAGE,
    DEFAULT_ENVOY_PROXY_IMAGE_VERSION, DEFAULT_KONNECTIVITY_AGENT_PORT, DEFAULT_PAUSE_IMAGE,
    DEFAULT_PAUSE_IMAGE_VERSION, DEFAULT_PULL_POLICY, DEFAULT_SERVICE_CIDR, KUBERNETES_COMPONENTS,
};
use crate::errors::ClusterDnsError;

/// `ClusterConfig` describes a k0s cluster.
///
/// The worker configuration reconciler consumes the network settings, images,
/// konnectivity settings, feature gates and worker profiles.
#[derive(CustomResource, Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "k0s.k0sproject.io",
    version = "v1beta1",
    kind = "ClusterConfig",
    namespaced,
    doc = "ClusterConfig is the administrator-supplied configuration of a k0s cluster."
)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSpec {
    /// API server settings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api: Option<ApiSpec>,

    /// Cluster networking.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<Network>,

    /// Named overrides of the kubelet configuration.
    ///
    /// A profile named `default` or `default-windows` replaces the values of the
    /// built-in profile of that name.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub worker_profiles: Vec<WorkerProfile>,

    /// Images used by cluster components.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub images: Option<ClusterImages>,

    /// Konnectivity settings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub konnectivity: Option<KonnectivitySpec>,

    /// Feature gates passed to Kubernetes components.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub feature_gates: Vec<FeatureGate>,
}

impl ClusterSpec {
    /// Network settings, falling back to defaults when none are given.
    #[must_use]
    pub fn network_or_default(&self) -> Network {
        self.network.clone().unwrap_or_default()
    }

    /// Image settings, falling back to defaults when none are given.
    #[must_use]
    pub fn images_or_default(&self) -> ClusterImages {
        self.images.clone().unwrap_or_default()
    }

    /// Konnectivity settings, falling back to defaults when none are given.
    #[must_use]
    pub fn konnectivity_or_default(&self) -> KonnectivitySpec {
        self.konnectivity.clone().unwrap_or_default()
    }

    /// Whether worker traffic to the API server is tunneled through konnectivity.
    #[must_use]
    pub fn tunneled_networking_mode(&self) -> bool {
        self.api
            .as_ref()
            .is_some_and(|api| api.tunneled_networking_mode)
    }
}

/// API server settings.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApiSpec {
    /// When enabled, workers reach the API server through konnectivity and
    /// API server addresses are not published to them.
    #[serde(default)]
    pub tunneled_networking_mode: bool,
}

/// Cluster networking settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Network {
    /// IPv4 service CIDR. The cluster DNS address is derived from it.
    #[serde(default = "default_service_cidr", rename = "serviceCIDR")]
    pub service_cidr: String,

    /// DNS domain of the cluster.
    #[serde(default = "default_cluster_domain")]
    pub cluster_domain: String,

    /// Dual-stack settings.
    #[serde(default)]
    pub dual_stack: DualStack,

    /// Node-local load balancing of API server traffic.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_local_load_balancing: Option<NodeLocalLoadBalancing>,
}

impl Default for Network {
    fn default() -> Self {
        Self {
            service_cidr: default_service_cidr(),
            cluster_domain: default_cluster_domain(),
            dual_stack: DualStack::default(),
            node_local_load_balancing: None,
        }
    }
}

impl Network {
    /// Address of the cluster DNS service.
    ///
    /// This is the 10th address of the service CIDR, or the 2nd one for
    /// networks of /29 and narrower.
    ///
    /// # Errors
    ///
    /// Returns an error if the CIDR is malformed, not IPv4, or too narrow.
    pub fn dns_address(&self) -> Result<Ipv4Addr, ClusterDnsError> {
        let cidr = &self.service_cidr;
        let invalid = || ClusterDnsError::InvalidServiceCidr(cidr.clone());

        let (addr, prefix) = cidr.split_once('/').ok_or_else(invalid)?;
        let addr: IpAddr = addr.parse().map_err(|_| invalid())?;
        let IpAddr::V4(addr) = addr else {
            return Err(ClusterDnsError::NotIpv4(cidr.clone()));
        };
        let prefix: u8 = prefix.parse().map_err(|_| invalid())?;
        if prefix > 32 {
            return Err(invalid());
        }

        let host_bits = 32 - u32::from(prefix);
        let mask = u32::MAX.checked_shl(host_bits).unwrap_or(0);
        let network = u32::from(addr) & mask;
        let offset = if prefix < CLUSTER_DNS_NARROW_PREFIX_LEN {
            CLUSTER_DNS_ADDRESS_OFFSET
        } else {
            CLUSTER_DNS_NARROW_ADDRESS_OFFSET
        };

        let size = 1u64 << host_bits;
        if u64::from(offset) >= size {
            return Err(ClusterDnsError::TooNarrow(cidr.clone()));
        }
        Ok(Ipv4Addr::from(network + offset))
    }
}

fn default_service_cidr() -> String {
    DEFAULT_SERVICE_CIDR.to_string()
}

fn default_cluster_domain() -> String {
    DEFAULT_CLUSTER_DOMAIN.to_string()
}

/// Dual-stack networking settings.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DualStack {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default, rename = "IPv6podCIDR", skip_serializing_if = "String::is_empty")]
    pub ipv6_pod_cidr: String,

    #[serde(default, rename = "IPv6serviceCIDR", skip_serializing_if = "String::is_empty")]
    pub ipv6_service_cidr: String,
}

/// Node-local load balancing of API server traffic on worker nodes.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NodeLocalLoadBalancing {
    /// Whether node-local load balancing is enabled.
    #[serde(default)]
    pub enabled: bool,

    /// Type of the load balancer.
    #[serde(default, rename = "type")]
    pub lb_type: NllbType,

    /// Settings of the Envoy proxy load balancer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub envoy_proxy: Option<EnvoyProxy>,
}

/// Load balancer implementation used for node-local load balancing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum NllbType {
    #[default]
    EnvoyProxy,
}

/// Envoy proxy settings for node-local load balancing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct EnvoyProxy {
    /// Envoy image.
    #[serde(default = "default_envoy_image", skip_serializing_if = "Option::is_none")]
    pub image: Option<ImageSpec>,

    /// Pull policy of the Envoy image. Falls back to the cluster default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_pull_policy: Option<String>,

    /// Local port Envoy listens on for API server traffic.
    #[serde(default = "default_api_server_bind_port")]
    pub api_server_bind_port: u16,

    /// Local port Envoy listens on for konnectivity traffic.
    #[serde(
        default = "default_konnectivity_server_bind_port",
        skip_serializing_if = "Option::is_none"
    )]
    pub konnectivity_server_bind_port: Option<u16>,
}

impl Default for EnvoyProxy {
    fn default() -> Self {
        Self {
            image: default_envoy_image(),
            image_pull_policy: None,
            api_server_bind_port: default_api_server_bind_port(),
            konnectivity_server_bind_port: default_konnectivity_server_bind_port(),
        }
    }
}

#[allow(clippy::unnecessary_wraps)]
fn default_envoy_image() -> Option<ImageSpec> {
    Some(ImageSpec::new(
        DEFAULT_ENVOY_PROXY_IMAGE,
        DEFAULT_ENVOY_PROXY_IMAGE_VERSION,
    ))
}

fn default_api_server_bind_port() -> u16 {
    DEFAULT_ENVOY_API_SERVER_BIND_PORT
}

#[allow(clippy::unnecessary_wraps)]
fn default_konnectivity_server_bind_port() -> Option<u16> {
    Some(DEFAULT_ENVOY_KONNECTIVITY_SERVER_BIND_PORT)
}

/// A container image reference.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ImageSpec {
    pub image: String,
    pub version: String,
}

impl ImageSpec {
    pub fn new(image: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            version: version.into(),
        }
    }

    /// Full image reference, `image:version`.
    #[must_use]
    pub fn uri(&self) -> String {
        format!("{}:{}", self.image, self.version)
    }
}

/// Images used by cluster components.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClusterImages {
    /// Pause image for Linux workers.
    #[serde(default = "default_pause_image")]
    pub pause: ImageSpec,

    /// Pause image for Windows workers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub windows_pause: Option<ImageSpec>,

    /// Pull policy used when a component does not set its own.
    #[serde(default = "default_pull_policy", rename = "default_pull_policy")]
    pub default_pull_policy: String,
}

impl Default for ClusterImages {
    fn default() -> Self {
        Self {
            pause: default_pause_image(),
            windows_pause: None,
            default_pull_policy: default_pull_policy(),
        }
    }
}

fn default_pause_image() -> ImageSpec {
    ImageSpec::new(DEFAULT_PAUSE_IMAGE, DEFAULT_PAUSE_IMAGE_VERSION)
}

fn default_pull_policy() -> String {
    DEFAULT_PULL_POLICY.to_string()
}

/// Konnectivity settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct KonnectivitySpec {
    /// Port konnectivity agents connect to.
    #[serde(default = "default_konnectivity_agent_port")]
    pub agent_port: u16,
}

impl Default for KonnectivitySpec {
    fn default() -> Self {
        Self {
            agent_port: default_konnectivity_agent_port(),
        }
    }
}

fn default_konnectivity_agent_port() -> u16 {
    DEFAULT_KONNECTIVITY_AGENT_PORT
}

/// A named override of the kubelet configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct WorkerProfile {
    /// Profile name, selected on worker nodes.
    pub name: String,

    /// Kubelet configuration values merged onto the generated baseline.
    #[serde(default)]
    pub values: serde_json::Value,
}

/// A Kubernetes feature gate.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct FeatureGate {
    pub name: String,

    #[serde(default)]
    pub enabled: bool,

    /// Components the gate is passed to. Empty means all Kubernetes components.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub components: Vec<String>,
}

impl FeatureGate {
    /// Whether the gate applies to `component`.
    #[must_use]
    pub fn applies_to(&self, component: &str) -> bool {
        if self.components.is_empty() {
            KUBERNETES_COMPONENTS.contains(&component)
        } else {
            self.components.iter().any(|c| c == component)
        }
    }
}

/// Feature gates applying to `component`, keyed by gate name.
#[must_use]
pub fn feature_gates_for(gates: &[FeatureGate], component: &str) -> BTreeMap<String, bool> {
    gates
        .iter()
        .filter(|gate| gate.applies_to(component))
        .map(|gate| (gate.name.clone(), gate.enabled))
        .collect()
}

#[cfg(test)]
#[path = "crd_tests.rs"]
mod crd_tests;

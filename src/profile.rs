// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Worker profiles and their ConfigMap representation.
//!
//! A [`Profile`] is everything a worker node needs to configure its kubelet and
//! reach the control plane. It is stored as ConfigMap data with one JSON-encoded
//! entry per field. Fields holding their zero value are left out.

use std::collections::BTreeMap;
use std::net::Ipv4Addr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::constants::{
    KUBELET_COMPONENT, KUBELET_CONFIG_API_VERSION, KUBELET_CONFIG_KIND, KUBELET_TLS_CIPHER_SUITES,
    KUBELET_TLS_MIN_VERSION,
};
use crate::crd::{feature_gates_for, FeatureGate, ImageSpec, NodeLocalLoadBalancing};
use crate::errors::ProfileDataError;
use crate::host_port::HostPort;

// ============================================================================
// ConfigMap Data Keys
// ============================================================================

pub const API_SERVER_ADDRESSES_KEY: &str = "apiServerAddresses";
pub const KUBELET_CONFIGURATION_KEY: &str = "kubeletConfiguration";
pub const NODE_LOCAL_LOAD_BALANCING_KEY: &str = "nodeLocalLoadBalancing";
pub const KONNECTIVITY_KEY: &str = "konnectivity";
pub const PAUSE_IMAGE_KEY: &str = "pauseImage";
pub const DUAL_STACK_ENABLED_KEY: &str = "dualStackEnabled";

/// Configuration handed to worker nodes of one profile.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Profile {
    pub api_server_addresses: Vec<HostPort>,
    pub kubelet_configuration: Map<String, Value>,
    pub node_local_load_balancing: Option<NodeLocalLoadBalancing>,
    pub konnectivity: Konnectivity,
    pub pause_image: Option<ImageSpec>,
    pub dual_stack_enabled: bool,
}

/// Konnectivity settings for worker nodes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Konnectivity {
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub enabled: bool,

    #[serde(default, skip_serializing_if = "is_zero_port")]
    pub agent_port: u16,
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_zero_port(port: &u16) -> bool {
    *port == 0
}

impl Konnectivity {
    fn is_zero(&self) -> bool {
        *self == Self::default()
    }
}

impl Profile {
    /// Encodes the profile as ConfigMap data.
    ///
    /// # Errors
    ///
    /// Returns an error if the profile is invalid or a field cannot be encoded.
    pub fn to_config_map_data(&self) -> Result<BTreeMap<String, String>, ProfileDataError> {
        self.validate()?;

        let mut data = BTreeMap::new();
        if !self.api_server_addresses.is_empty() {
            insert_json(&mut data, API_SERVER_ADDRESSES_KEY, &self.api_server_addresses)?;
        }
        if !self.kubelet_configuration.is_empty() {
            insert_json(&mut data, KUBELET_CONFIGURATION_KEY, &self.kubelet_configuration)?;
        }
        if let Some(nllb) = &self.node_local_load_balancing {
            insert_json(&mut data, NODE_LOCAL_LOAD_BALANCING_KEY, nllb)?;
        }
        if !self.konnectivity.is_zero() {
            insert_json(&mut data, KONNECTIVITY_KEY, &self.konnectivity)?;
        }
        if let Some(pause_image) = &self.pause_image {
            insert_json(&mut data, PAUSE_IMAGE_KEY, pause_image)?;
        }
        if self.dual_stack_enabled {
            insert_json(&mut data, DUAL_STACK_ENABLED_KEY, &self.dual_stack_enabled)?;
        }
        Ok(data)
    }

    /// Decodes a profile from ConfigMap data. Missing keys keep their zero value.
    ///
    /// # Errors
    ///
    /// Returns an error if an entry cannot be decoded or the result is invalid.
    pub fn from_config_map_data(data: &BTreeMap<String, String>) -> Result<Self, ProfileDataError> {
        let profile = Self {
            api_server_addresses: read_json(data, API_SERVER_ADDRESSES_KEY)?.unwrap_or_default(),
            kubelet_configuration: read_json(data, KUBELET_CONFIGURATION_KEY)?.unwrap_or_default(),
            node_local_load_balancing: read_json(data, NODE_LOCAL_LOAD_BALANCING_KEY)?,
            konnectivity: read_json(data, KONNECTIVITY_KEY)?.unwrap_or_default(),
            pause_image: read_json(data, PAUSE_IMAGE_KEY)?,
            dual_stack_enabled: read_json(data, DUAL_STACK_ENABLED_KEY)?.unwrap_or_default(),
        };
        profile.validate()?;
        Ok(profile)
    }

    fn validate(&self) -> Result<(), ProfileDataError> {
        if self.konnectivity.enabled && self.konnectivity.agent_port == 0 {
            return Err(ProfileDataError::Invalid {
                field: "konnectivity.agentPort",
                value: self.konnectivity.agent_port.to_string(),
                message: "must be between 1 and 65535, inclusive",
            });
        }
        if let Some(envoy) = self
            .node_local_load_balancing
            .as_ref()
            .and_then(|nllb| nllb.envoy_proxy.as_ref())
        {
            if envoy.api_server_bind_port == 0 {
                return Err(ProfileDataError::Invalid {
                    field: "nodeLocalLoadBalancing.envoyProxy.apiServerBindPort",
                    value: "0".to_string(),
                    message: "must be between 1 and 65535, inclusive",
                });
            }
        }
        Ok(())
    }
}

fn insert_json<T: Serialize + ?Sized>(
    data: &mut BTreeMap<String, String>,
    key: &'static str,
    value: &T,
) -> Result<(), ProfileDataError> {
    let encoded =
        serde_json::to_string(value).map_err(|source| ProfileDataError::Encode { key, source })?;
    data.insert(key.to_string(), encoded);
    Ok(())
}

fn read_json<T: DeserializeOwned>(
    data: &BTreeMap<String, String>,
    key: &'static str,
) -> Result<Option<T>, ProfileDataError> {
    data.get(key)
        .map(|raw| serde_json::from_str(raw))
        .transpose()
        .map_err(|source| ProfileDataError::Decode { key, source })
}

/// Builds the kubelet configuration every profile starts from.
#[must_use]
pub fn baseline_kubelet_configuration(
    cluster_dns: Ipv4Addr,
    cluster_domain: &str,
    feature_gates: &[FeatureGate],
) -> Map<String, Value> {
    let mut config = Map::new();
    config.insert("apiVersion".into(), KUBELET_CONFIG_API_VERSION.into());
    config.insert("kind".into(), KUBELET_CONFIG_KIND.into());
    config.insert(
        "clusterDNS".into(),
        Value::Array(vec![cluster_dns.to_string().into()]),
    );
    config.insert("clusterDomain".into(), cluster_domain.into());
    config.insert("tlsMinVersion".into(), KUBELET_TLS_MIN_VERSION.into());
    config.insert(
        "tlsCipherSuites".into(),
        KUBELET_TLS_CIPHER_SUITES.iter().map(|s| Value::from(*s)).collect(),
    );
    config.insert("failSwapOn".into(), false.into());
    config.insert("rotateCertificates".into(), true.into());
    config.insert("serverTLSBootstrap".into(), true.into());
    config.insert("eventRecordQPS".into(), 0.into());

    let gates = feature_gates_for(feature_gates, KUBELET_COMPONENT);
    if !gates.is_empty() {
        config.insert(
            "featureGates".into(),
            gates.into_iter().map(|(k, v)| (k, Value::Bool(v))).collect(),
        );
    }
    config
}

/// Deep-merges `overlay` onto `base`.
///
/// Objects merge key by key, anything else replaces the existing value.
/// A `null` in the overlay removes the key.
pub fn merge_values(base: &mut Map<String, Value>, overlay: &Map<String, Value>) {
    for (key, value) in overlay {
        match (base.get_mut(key), value) {
            (_, Value::Null) => {
                base.remove(key);
            }
            (Some(Value::Object(existing)), Value::Object(nested)) => merge_values(existing, nested),
            _ => {
                base.insert(key.clone(), value.clone());
            }
        }
    }
}

#[cfg(test)]
#[path = "profile_tests.rs"]
mod profile_tests;

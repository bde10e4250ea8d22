// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Resource generation for worker configuration.
//!
//! Every worker profile becomes one ConfigMap in `kube-system`. Two profiles are
//! always present: `default` for Linux nodes and `default-windows` for Windows
//! nodes. A Role and RoleBinding grant bootstrapping and joined nodes read
//! access to exactly those ConfigMaps.
//!
//! The output is sorted by kind, namespace and name, so equal snapshots always
//! generate equal resources.
//!
//! # Example
//!
//! ```rust
//! use workerconfig::crd::ClusterSpec;
//! use workerconfig::host_port::HostPort;
//! use workerconfig::resources::ResourceGenerator;
//! use workerconfig::snapshot::ConfigSnapshot;
//! use std::net::Ipv4Addr;
//!
//! let generator = ResourceGenerator {
//!     cluster_dns_ip: Ipv4Addr::new(10, 96, 0, 10),
//!     cluster_domain: "cluster.local".to_string(),
//!     konnectivity_enabled: true,
//! };
//! let config = ConfigSnapshot::from_spec(&ClusterSpec::default());
//! let api_servers = vec![HostPort::new("10.0.0.1", 6443).unwrap()];
//! let resources = generator.generate(&config, &api_servers).unwrap();
//! assert_eq!(resources.len(), 4);
//! ```

use std::collections::BTreeMap;
use std::net::Ipv4Addr;

use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::api::rbac::v1::{PolicyRule, Role, RoleBinding, RoleRef, Subject};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::DynamicObject;
use kube::{Resource, ResourceExt};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::constants::{
    BOOTSTRAPPERS_GROUP, COMPONENT_NAME, DEFAULT_PROFILE_NAME, DEFAULT_WINDOWS_PROFILE_NAME,
    KUBERNETES_MAJOR_MINOR_VERSION, KUBE_SYSTEM_NAMESPACE, NODES_GROUP,
};
use crate::errors::GenerateError;
use crate::host_port::HostPort;
use crate::labels::{component_labels, WORKER_PROFILE_LABEL};
use crate::profile::{baseline_kubelet_configuration, merge_values, Konnectivity, Profile};
use crate::snapshot::ConfigSnapshot;

/// API group of the RBAC resources
const RBAC_API_GROUP: &str = "rbac.authorization.k8s.io";

/// Node-independent settings that go into every generated profile.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResourceGenerator {
    pub cluster_dns_ip: Ipv4Addr,
    pub cluster_domain: String,
    pub konnectivity_enabled: bool,
}

impl ResourceGenerator {
    /// Generates all worker configuration resources for a snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if a worker profile's values are not a JSON object or
    /// a resource cannot be encoded.
    pub fn generate(
        &self,
        config: &ConfigSnapshot,
        api_servers: &[HostPort],
    ) -> Result<Vec<DynamicObject>, GenerateError> {
        let config_maps = self.build_config_maps(config, api_servers)?;
        let names: Vec<String> = config_maps.iter().map(ResourceExt::name_any).collect();
        let (role, role_binding) = build_rbac_resources(names);

        let mut objects = Vec::with_capacity(config_maps.len() + 2);
        objects.push(to_dynamic(&role)?);
        objects.push(to_dynamic(&role_binding)?);
        for config_map in &config_maps {
            objects.push(to_dynamic(config_map)?);
        }

        objects.sort_by_cached_key(sort_key);

        debug!(
            resources = objects.len(),
            profiles = config_maps.len(),
            "Generated worker configuration resources"
        );
        Ok(objects)
    }

    /// Builds one ConfigMap per worker profile, sorted by profile name.
    ///
    /// # Errors
    ///
    /// See [`ResourceGenerator::generate`].
    pub fn build_config_maps(
        &self,
        config: &ConfigSnapshot,
        api_servers: &[HostPort],
    ) -> Result<Vec<ConfigMap>, GenerateError> {
        let mut profiles = BTreeMap::new();

        let mut profile = self.build_profile(config, api_servers);
        profile
            .kubelet_configuration
            .insert("cgroupsPerQOS".into(), true.into());
        profiles.insert(DEFAULT_PROFILE_NAME.to_string(), profile);

        let mut profile = self.build_profile(config, api_servers);
        profile
            .kubelet_configuration
            .insert("cgroupsPerQOS".into(), false.into());
        profile.pause_image.clone_from(&config.windows_pause_image);
        profiles.insert(DEFAULT_WINDOWS_PROFILE_NAME.to_string(), profile);

        let no_values = serde_json::Map::new();
        for worker_profile in &config.profiles {
            let values = match &worker_profile.values {
                Value::Object(values) => values,
                Value::Null => &no_values,
                _ => {
                    return Err(GenerateError::InvalidProfileValues {
                        profile: worker_profile.name.clone(),
                    })
                }
            };
            let profile = profiles
                .entry(worker_profile.name.clone())
                .or_insert_with(|| self.build_profile(config, api_servers));
            merge_values(&mut profile.kubelet_configuration, values);
        }

        profiles
            .into_iter()
            .map(|(name, profile)| to_config_map(&name, &profile))
            .collect()
    }

    fn build_profile(&self, config: &ConfigSnapshot, api_servers: &[HostPort]) -> Profile {
        let mut node_local_load_balancing = config.node_local_load_balancing.clone();
        if let Some(envoy) = node_local_load_balancing
            .as_mut()
            .and_then(|nllb| nllb.envoy_proxy.as_mut())
        {
            if envoy.image_pull_policy.as_deref().unwrap_or_default().is_empty() {
                envoy.image_pull_policy = Some(config.default_image_pull_policy.clone());
            }
        }

        Profile {
            api_server_addresses: api_servers.to_vec(),
            kubelet_configuration: baseline_kubelet_configuration(
                self.cluster_dns_ip,
                &self.cluster_domain,
                &config.feature_gates,
            ),
            node_local_load_balancing,
            konnectivity: Konnectivity {
                enabled: self.konnectivity_enabled,
                agent_port: config.konnectivity_agent_port,
            },
            pause_image: Some(config.pause_image.clone()),
            dual_stack_enabled: config.dual_stack_enabled,
        }
    }
}

/// Name of the ConfigMap holding a worker profile.
#[must_use]
pub fn config_map_name(profile_name: &str) -> String {
    format!("{COMPONENT_NAME}-{profile_name}-{KUBERNETES_MAJOR_MINOR_VERSION}")
}

/// Name shared by the Role and RoleBinding.
#[must_use]
pub fn rbac_name() -> String {
    format!("{BOOTSTRAPPERS_GROUP}:{COMPONENT_NAME}")
}

fn to_config_map(profile_name: &str, profile: &Profile) -> Result<ConfigMap, GenerateError> {
    let data = profile
        .to_config_map_data()
        .map_err(|source| GenerateError::ConfigMapData {
            profile: profile_name.to_string(),
            source,
        })?;

    let mut labels = component_labels();
    labels.insert(WORKER_PROFILE_LABEL.to_string(), profile_name.to_string());

    Ok(ConfigMap {
        metadata: ObjectMeta {
            name: Some(config_map_name(profile_name)),
            namespace: Some(KUBE_SYSTEM_NAMESPACE.to_string()),
            labels: Some(labels),
            ..Default::default()
        },
        data: Some(data),
        ..Default::default()
    })
}

/// Builds the Role and RoleBinding granting nodes read access to the given ConfigMaps.
#[must_use]
pub fn build_rbac_resources(mut config_map_names: Vec<String>) -> (Role, RoleBinding) {
    config_map_names.sort();

    let metadata = ObjectMeta {
        name: Some(rbac_name()),
        namespace: Some(KUBE_SYSTEM_NAMESPACE.to_string()),
        labels: Some(component_labels()),
        ..Default::default()
    };

    let role = Role {
        metadata: metadata.clone(),
        rules: Some(vec![PolicyRule {
            api_groups: Some(vec![String::new()]),
            resources: Some(vec!["configmaps".to_string()]),
            verbs: vec!["get".to_string(), "list".to_string(), "watch".to_string()],
            resource_names: Some(config_map_names),
            ..Default::default()
        }]),
    };

    let group = |name: &str| Subject {
        api_group: Some(RBAC_API_GROUP.to_string()),
        kind: "Group".to_string(),
        name: name.to_string(),
        namespace: None,
    };

    let role_binding = RoleBinding {
        metadata,
        role_ref: RoleRef {
            api_group: RBAC_API_GROUP.to_string(),
            kind: "Role".to_string(),
            name: rbac_name(),
        },
        subjects: Some(vec![group(BOOTSTRAPPERS_GROUP), group(NODES_GROUP)]),
    };

    (role, role_binding)
}

fn to_dynamic<K>(resource: &K) -> Result<DynamicObject, GenerateError>
where
    K: Resource<DynamicType = ()> + Serialize,
{
    let convert = |source| GenerateError::Convert {
        kind: K::kind(&()).to_string(),
        name: resource.meta().name.clone().unwrap_or_default(),
        source,
    };
    let value = serde_json::to_value(resource).map_err(convert)?;
    serde_json::from_value(value).map_err(convert)
}

fn sort_key(object: &DynamicObject) -> String {
    let kind = object
        .types
        .as_ref()
        .map(|types| types.kind.as_str())
        .unwrap_or_default();
    format!(
        "{kind}/{}/{}",
        object.metadata.namespace.as_deref().unwrap_or_default(),
        object.metadata.name.as_deref().unwrap_or_default()
    )
}

#[cfg(test)]
#[path = "resources_tests.rs"]
mod resources_tests;

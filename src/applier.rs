// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Applying generated resources to the cluster.
//!
//! The reconciler only depends on the [`Applier`] trait. [`KubeApplier`] is the
//! Kubernetes implementation: it server-side applies every resource and then
//! deletes stack members that are no longer part of the applied set, such as
//! the ConfigMap of a removed worker profile.

use std::collections::HashSet;

use anyhow::{Context as _, Result};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::api::rbac::v1::{Role, RoleBinding};
use kube::api::{
    ApiResource, DeleteParams, DynamicObject, GroupVersionKind, ListParams, Patch, PatchParams,
};
use kube::{Api, Client};
use tracing::{debug, info};

use crate::constants::{FIELD_MANAGER, KUBE_SYSTEM_NAMESPACE};
use crate::labels::stack_selector;

/// Applies a complete set of resources.
///
/// Applying the same set twice must leave the cluster in the same state.
#[async_trait]
pub trait Applier: Send + Sync {
    async fn apply(&self, resources: Vec<DynamicObject>) -> Result<()>;
}

/// Applies resources to a Kubernetes cluster using server-side apply.
#[derive(Clone)]
pub struct KubeApplier {
    client: Client,
    field_manager: String,
}

impl KubeApplier {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self {
            client,
            field_manager: FIELD_MANAGER.to_string(),
        }
    }

    async fn apply_one(&self, object: &DynamicObject) -> Result<ResourceKey> {
        let key = ResourceKey::of(object)?;
        let api = self.api_for(&key.api_resource, &key.namespace);

        debug!(
            kind = %key.api_resource.kind,
            namespace = %key.namespace,
            name = %key.name,
            "Applying resource with server-side apply"
        );
        api.patch(
            &key.name,
            &PatchParams::apply(&self.field_manager).force(),
            &Patch::Apply(object),
        )
        .await
        .with_context(|| format!("failed to apply {key}"))?;

        Ok(key)
    }

    async fn prune(&self, applied: &HashSet<String>) -> Result<()> {
        let selector = stack_selector();
        for api_resource in [
            ApiResource::erase::<ConfigMap>(&()),
            ApiResource::erase::<Role>(&()),
            ApiResource::erase::<RoleBinding>(&()),
        ] {
            let api = self.api_for(&api_resource, KUBE_SYSTEM_NAMESPACE);
            let existing = api
                .list(&ListParams::default().labels(&selector))
                .await
                .with_context(|| format!("failed to list {}", api_resource.plural))?;

            for object in existing {
                let Some(name) = object.metadata.name.as_deref() else {
                    continue;
                };
                let key = ResourceKey::format(&api_resource.kind, KUBE_SYSTEM_NAMESPACE, name);
                if applied.contains(&key) {
                    continue;
                }
                api.delete(name, &DeleteParams::default())
                    .await
                    .with_context(|| format!("failed to prune {key}"))?;
                info!("Pruned {key}");
            }
        }
        Ok(())
    }

    fn api_for(&self, api_resource: &ApiResource, namespace: &str) -> Api<DynamicObject> {
        Api::namespaced_with(self.client.clone(), namespace, api_resource)
    }
}

#[async_trait]
impl Applier for KubeApplier {
    async fn apply(&self, resources: Vec<DynamicObject>) -> Result<()> {
        let mut applied = HashSet::with_capacity(resources.len());
        for object in &resources {
            let key = self.apply_one(object).await?;
            applied.insert(key.to_string());
        }
        self.prune(&applied).await?;

        info!(resources = resources.len(), "Applied worker configuration stack");
        Ok(())
    }
}

/// Identity of an applied resource.
struct ResourceKey {
    api_resource: ApiResource,
    namespace: String,
    name: String,
}

impl ResourceKey {
    fn of(object: &DynamicObject) -> Result<Self> {
        let types = object
            .types
            .as_ref()
            .context("Resource must have apiVersion and kind")?;
        let name = object
            .metadata
            .name
            .clone()
            .context("Resource must have a name")?;
        let (group, version) = match types.api_version.split_once('/') {
            Some((group, version)) => (group, version),
            None => ("", types.api_version.as_str()),
        };
        let gvk = GroupVersionKind::gvk(group, version, &types.kind);

        Ok(Self {
            api_resource: ApiResource::from_gvk(&gvk),
            namespace: object
                .metadata
                .namespace
                .clone()
                .unwrap_or_else(|| KUBE_SYSTEM_NAMESPACE.to_string()),
            name,
        })
    }

    fn format(kind: &str, namespace: &str, name: &str) -> String {
        format!("{kind} {namespace}/{name}")
    }
}

impl std::fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&Self::format(
            &self.api_resource.kind,
            &self.namespace,
            &self.name,
        ))
    }
}

#[cfg(test)]
#[path = "applier_tests.rs"]
mod applier_tests;

// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `applier.rs`

#[cfg(test)]
mod tests {
    use super::super::ResourceKey;
    use kube::api::DynamicObject;
    use serde_json::json;

    fn object(value: serde_json::Value) -> DynamicObject {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_resource_key_core_group() {
        let key = ResourceKey::of(&object(json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": {"name": "worker-config-default-1.31", "namespace": "kube-system"}
        })))
        .unwrap();

        assert_eq!(key.api_resource.group, "");
        assert_eq!(key.api_resource.version, "v1");
        assert_eq!(key.api_resource.plural, "configmaps");
        assert_eq!(key.to_string(), "ConfigMap kube-system/worker-config-default-1.31");
    }

    #[test]
    fn test_resource_key_named_group() {
        let key = ResourceKey::of(&object(json!({
            "apiVersion": "rbac.authorization.k8s.io/v1",
            "kind": "RoleBinding",
            "metadata": {"name": "system:bootstrappers:worker-config"}
        })))
        .unwrap();

        assert_eq!(key.api_resource.group, "rbac.authorization.k8s.io");
        assert_eq!(key.api_resource.plural, "rolebindings");
        assert_eq!(key.namespace, "kube-system");
    }

    #[test]
    fn test_resource_key_requires_type_and_name() {
        let untyped = DynamicObject {
            types: None,
            metadata: Default::default(),
            data: json!({}),
        };
        assert!(ResourceKey::of(&untyped).is_err());

        let unnamed = object(json!({"apiVersion": "v1", "kind": "ConfigMap", "metadata": {}}));
        assert!(ResourceKey::of(&unnamed).is_err());
    }

    #[test]
    fn test_key_format_matches_display() {
        assert_eq!(
            ResourceKey::format("Role", "kube-system", "x"),
            "Role kube-system/x"
        );
    }
}

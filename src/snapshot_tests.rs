// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `snapshot.rs`

#[cfg(test)]
mod tests {
    use crate::crd::{ClusterImages, ClusterSpec, DualStack, ImageSpec, Network, WorkerProfile};
    use crate::host_port::HostPort;
    use crate::snapshot::{ConfigSnapshot, Snapshot};
    use serde_json::json;

    #[test]
    fn test_config_snapshot_from_default_spec() {
        let snapshot = ConfigSnapshot::from_spec(&ClusterSpec::default());
        assert!(!snapshot.dual_stack_enabled);
        assert!(snapshot.node_local_load_balancing.is_none());
        assert_eq!(snapshot.konnectivity_agent_port, 8132);
        assert_eq!(snapshot.default_image_pull_policy, "IfNotPresent");
        assert!(snapshot.profiles.is_empty());
        assert!(snapshot.feature_gates.is_empty());
        assert_eq!(snapshot.pause_image.image, "registry.k8s.io/pause");
        assert!(snapshot.windows_pause_image.is_none());
    }

    #[test]
    fn test_config_snapshot_copies_relevant_fields() {
        let spec = ClusterSpec {
            network: Some(Network {
                dual_stack: DualStack {
                    enabled: true,
                    ..Default::default()
                },
                ..Default::default()
            }),
            images: Some(ClusterImages {
                windows_pause: Some(ImageSpec::new("mcr.microsoft.com/pause", "3.9")),
                default_pull_policy: "Always".into(),
                ..Default::default()
            }),
            worker_profiles: vec![WorkerProfile {
                name: "a".into(),
                values: json!({"maxPods": 1}),
            }],
            ..Default::default()
        };

        let snapshot = ConfigSnapshot::from_spec(&spec);
        assert!(snapshot.dual_stack_enabled);
        assert_eq!(snapshot.default_image_pull_policy, "Always");
        assert_eq!(snapshot.profiles, spec.worker_profiles);
        assert_eq!(
            snapshot.windows_pause_image.map(|i| i.uri()),
            Some("mcr.microsoft.com/pause:3.9".to_string())
        );
    }

    #[test]
    fn test_equal_specs_give_equal_snapshots() {
        let spec = ClusterSpec {
            worker_profiles: vec![WorkerProfile {
                name: "a".into(),
                values: json!({"x": {"y": 1}}),
            }],
            ..Default::default()
        };
        assert_eq!(
            ConfigSnapshot::from_spec(&spec),
            ConfigSnapshot::from_spec(&spec.clone())
        );
    }

    #[test]
    fn test_completeness() {
        let mut snapshot = Snapshot::default();
        assert!(!snapshot.is_complete(false));
        assert!(!snapshot.is_complete(true));

        snapshot.config = Some(ConfigSnapshot::from_spec(&ClusterSpec::default()));
        assert!(snapshot.is_complete(false));
        assert!(!snapshot.is_complete(true));

        snapshot.api_servers = vec![HostPort::new("10.0.0.1", 6443).unwrap()];
        assert!(snapshot.is_complete(true));
    }

    #[test]
    fn test_bump_serial_breaks_equality() {
        let applied = Snapshot::default();
        let mut desired = applied.clone();
        assert_eq!(desired, applied);
        desired.bump_serial();
        assert_ne!(desired, applied);
        assert_eq!(desired.serial, 1);
    }
}

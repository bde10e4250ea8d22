// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `config.rs`

#[cfg(test)]
mod tests {
    use crate::config::{load_cluster_config, parse_cluster_config, ControllerArgs};
    use crate::crd::ClusterSpec;
    use clap::Parser;
    use std::io::Write;
    use std::time::Duration;

    const CLUSTER_CONFIG: &str = r#"
apiVersion: k0s.k0sproject.io/v1beta1
kind: ClusterConfig
metadata:
  name: k0s
  namespace: kube-system
spec:
  network:
    serviceCIDR: 10.100.0.0/16
    clusterDomain: example.internal
  workerProfiles:
    - name: profile_XXX
      values:
        maxPods: 110
"#;

    fn args(extra: &[&str]) -> ControllerArgs {
        let mut argv = vec!["workerconfig", "--cluster-config", "/etc/k0s/k0s.yaml"];
        argv.extend_from_slice(extra);
        ControllerArgs::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_parse_cluster_config() {
        let config = parse_cluster_config(CLUSTER_CONFIG).unwrap();

        assert_eq!(config.metadata.name.as_deref(), Some("k0s"));
        assert_eq!(config.spec.worker_profiles.len(), 1);
        assert_eq!(config.spec.worker_profiles[0].name, "profile_XXX");
        assert_eq!(
            config.spec.network_or_default().cluster_domain,
            "example.internal"
        );
    }

    #[test]
    fn test_parse_cluster_config_rejects_garbage() {
        assert!(parse_cluster_config("spec: [not, a, mapping]").is_err());
    }

    #[tokio::test]
    async fn test_load_cluster_config_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(CLUSTER_CONFIG.as_bytes()).unwrap();

        let config = load_cluster_config(file.path()).await.unwrap();
        assert_eq!(config.spec.worker_profiles[0].name, "profile_XXX");
    }

    #[tokio::test]
    async fn test_load_missing_cluster_config() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_cluster_config(&dir.path().join("missing.yaml"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("missing.yaml"));
    }

    #[test]
    fn test_args_defaults() {
        let args = args(&["--identity", "controller-0"]);

        assert!(args.konnectivity_enabled);
        assert!(args.leader_election);
        assert_eq!(args.lease_name, "worker-config");
        assert_eq!(args.lease_namespace, "kube-system");
        assert_eq!(args.metrics_bind_address.to_string(), "0.0.0.0:8080");
        assert_eq!(args.retry_interval_secs, 60);
    }

    #[test]
    fn test_args_explicit_values() {
        let args = args(&[
            "--konnectivity-enabled",
            "false",
            "--leader-election",
            "false",
            "--retry-interval-secs",
            "5",
            "--identity",
            "controller-1",
        ]);

        assert!(!args.konnectivity_enabled);
        assert!(!args.leader_election);
        assert_eq!(args.retry_interval_secs, 5);
        assert_eq!(args.lease_settings("node-a").identity, "controller-1");
    }

    #[test]
    fn test_args_reject_zero_retry_interval() {
        let result = ControllerArgs::try_parse_from([
            "workerconfig",
            "--cluster-config",
            "k0s.yaml",
            "--retry-interval-secs",
            "0",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_reconciler_config_from_args() {
        let args = args(&["--retry-interval-secs", "15", "--konnectivity-enabled", "false"]);
        let spec = parse_cluster_config(CLUSTER_CONFIG).unwrap().spec;

        let config = args.reconciler_config(&spec).unwrap();

        assert_eq!(config.retry_interval, Duration::from_secs(15));
        assert_eq!(config.generator.cluster_dns_ip.to_string(), "10.100.0.10");
        assert_eq!(config.generator.cluster_domain, "example.internal");
        assert!(!config.generator.konnectivity_enabled);
    }

    #[test]
    fn test_reconciler_config_rejects_ipv6_service_cidr() {
        let spec: ClusterSpec =
            serde_yaml::from_str("network:\n  serviceCIDR: fd00::/108\n").unwrap();

        assert!(args(&[]).reconciler_config(&spec).is_err());
    }

    #[test]
    fn test_lease_settings() {
        let settings = args(&["--identity", "controller-2"]).lease_settings("ignored");

        assert_eq!(settings.name, "worker-config");
        assert_eq!(settings.namespace, "kube-system");
        assert_eq!(settings.identity, "controller-2");
        assert_eq!(settings.duration_secs, 30);
        assert_eq!(settings.grace_secs, 5);
    }
}

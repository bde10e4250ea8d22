// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `errors.rs`

#[cfg(test)]
mod tests {
    use crate::errors::*;
    use crate::reconciler::LifecycleState;

    #[test]
    fn test_lifecycle_error_messages() {
        assert_eq!(
            LifecycleError::CannotInitialize(LifecycleState::Started).to_string(),
            "cannot initialize, not created: started"
        );
        assert_eq!(
            LifecycleError::CannotStart(LifecycleState::Created).to_string(),
            "cannot start, not initialized: created"
        );
        assert_eq!(
            LifecycleError::CannotReconcile(LifecycleState::Stopped).to_string(),
            "cannot reconcile, not started: stopped"
        );
        assert_eq!(
            LifecycleError::CannotStop(LifecycleState::Initialized).to_string(),
            "cannot stop: initialized"
        );
    }

    #[test]
    fn test_stopped_concurrently_messages() {
        let cases = [
            (DispatchPhase::ProcessingReconciliation, "stopped concurrently while processing reconciliation"),
            (DispatchPhase::EnqueueingUpdate, "stopped concurrently while trying to enqueue state update"),
            (DispatchPhase::AwaitingReconciliation, "stopped concurrently while waiting for reconciliation to finish"),
        ];
        for (during, expected) in cases {
            let err = ReconcileError::StoppedConcurrently { during };
            assert_eq!(err.to_string(), expected);
            assert!(err.is_stopped_concurrently());
            assert!(!err.is_cancelled());
        }
    }

    #[test]
    fn test_cancelled_is_distinct_from_stopped() {
        let err = ReconcileError::Cancelled {
            during: DispatchPhase::AwaitingReconciliation,
        };
        assert!(err.is_cancelled());
        assert!(!err.is_stopped_concurrently());
        assert_eq!(err.to_string(), "cancelled while waiting for reconciliation to finish");
    }

    #[test]
    fn test_lifecycle_error_is_transparent() {
        let err: ReconcileError = LifecycleError::CannotReconcile(LifecycleState::Created).into();
        assert_eq!(err.to_string(), "cannot reconcile, not started: created");
        assert!(!err.is_stopped_concurrently());
    }

    #[test]
    fn test_apply_error_includes_cause_chain() {
        let cause = anyhow::anyhow!("connection refused").context("patching ConfigMap");
        let err = ReconcileError::Apply(cause);
        assert_eq!(
            err.to_string(),
            "failed to apply resources: patching ConfigMap: connection refused"
        );
    }

    #[test]
    fn test_no_api_servers_without_warnings() {
        let err = EndpointError::NoApiServers { warnings: vec![] };
        assert_eq!(err.to_string(), "no API server addresses discovered");
    }

    #[test]
    fn test_no_api_servers_joins_warnings() {
        let err = EndpointError::NoApiServers {
            warnings: vec![
                FieldWarning::new("subsets[0]", "no suitable TCP/https ports found"),
                FieldWarning::new("subsets[1].addresses[0]", "neither ip nor hostname specified"),
            ],
        };
        assert_eq!(
            err.to_string(),
            "no API server addresses discovered: subsets[0]: no suitable TCP/https ports found; \
             subsets[1].addresses[0]: neither ip nor hostname specified"
        );
    }

    #[test]
    fn test_host_port_error_messages() {
        assert_eq!(
            HostPortError::InvalidPort("abc".into()).to_string(),
            "port is not a positive number: \"abc\""
        );
        assert_eq!(
            HostPortError::PortOutOfRange(65536).to_string(),
            "port is out of range: 65536"
        );
        assert_eq!(HostPortError::ZeroPort.to_string(), "port is zero");
    }
}

// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Error types for the worker configuration reconciler.
//!
//! This module provides specialized error types for:
//! - Lifecycle violations (operations invoked out of order)
//! - Dispatch outcomes when the reconciler stops or the caller gives up
//! - Resource generation and apply failures
//! - API server endpoint extraction and address validation
//!
//! Callers that need to tell a concurrent stop apart from a real failure use
//! [`ReconcileError::is_stopped_concurrently`].

use std::fmt;

use thiserror::Error;

use crate::reconciler::LifecycleState;

/// Errors returned when a lifecycle operation is invoked in the wrong state.
///
/// These are programming errors in the caller and are never retried.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleError {
    /// `init` was called after the reconciler left the created state
    #[error("cannot initialize, not created: {0}")]
    CannotInitialize(LifecycleState),

    /// `start` was called before `init` or after `start`
    #[error("cannot start, not initialized: {0}")]
    CannotStart(LifecycleState),

    /// `reconcile` was called while the reconciler was not running
    #[error("cannot reconcile, not started: {0}")]
    CannotReconcile(LifecycleState),

    /// `stop` was called before the reconciler was started
    #[error("cannot stop: {0}")]
    CannotStop(LifecycleState),
}

/// Step of the dispatch protocol that was abandoned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchPhase {
    /// The loop was about to reconcile a dispatched update
    ProcessingReconciliation,
    /// The caller was handing its update to the loop
    EnqueueingUpdate,
    /// The caller was waiting for the loop's acknowledgement
    AwaitingReconciliation,
}

impl fmt::Display for DispatchPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ProcessingReconciliation => "processing reconciliation",
            Self::EnqueueingUpdate => "trying to enqueue state update",
            Self::AwaitingReconciliation => "waiting for reconciliation to finish",
        })
    }
}

/// Errors reported back to producers of snapshot updates.
#[derive(Error, Debug)]
pub enum ReconcileError {
    /// The operation is not legal in the current lifecycle state
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    /// The reconciler stopped while the update was in flight
    #[error("stopped concurrently while {during}")]
    StoppedConcurrently {
        /// Step that was abandoned
        during: DispatchPhase,
    },

    /// The caller's own cancellation fired while the update was in flight
    #[error("cancelled while {during}")]
    Cancelled {
        /// Step that was abandoned
        during: DispatchPhase,
    },

    /// Resources could not be generated from the desired snapshot
    #[error("failed to generate resources: {0}")]
    Generate(#[from] GenerateError),

    /// The generated resources could not be applied
    #[error("failed to apply resources: {0:#}")]
    Apply(anyhow::Error),
}

impl ReconcileError {
    /// Whether the update was abandoned because the reconciler stopped.
    #[must_use]
    pub fn is_stopped_concurrently(&self) -> bool {
        matches!(self, Self::StoppedConcurrently { .. })
    }

    /// Whether the update was abandoned because the caller gave up.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

/// Errors raised while turning a snapshot into Kubernetes resources.
#[derive(Error, Debug)]
pub enum GenerateError {
    /// A worker profile's values are not a JSON object
    #[error("invalid values for worker profile {profile:?}: expected a JSON object")]
    InvalidProfileValues {
        /// Name of the offending profile
        profile: String,
    },

    /// The ConfigMap data of a worker profile could not be produced
    #[error("failed to generate ConfigMap for worker profile {profile:?}: {source}")]
    ConfigMapData {
        /// Name of the profile being generated
        profile: String,
        /// What went wrong
        source: ProfileDataError,
    },

    /// A typed resource could not be converted into a dynamic object
    #[error("failed to convert {kind} {name}: {source}")]
    Convert {
        /// Kind of the resource
        kind: String,
        /// Name of the resource
        name: String,
        /// Underlying serialization error
        source: serde_json::Error,
    },
}

/// Errors raised while converting a worker profile to or from ConfigMap data.
#[derive(Error, Debug)]
pub enum ProfileDataError {
    #[error("{key}: {source}")]
    Encode {
        key: &'static str,
        source: serde_json::Error,
    },

    #[error("{key}: {source}")]
    Decode {
        key: &'static str,
        source: serde_json::Error,
    },

    #[error("{field}: Invalid value: {value}: {message}")]
    Invalid {
        field: &'static str,
        value: String,
        message: &'static str,
    },
}

/// A non-fatal problem found at a specific path of an Endpoints object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldWarning {
    /// Field path, e.g. `subsets[0].addresses[1]`
    pub path: String,
    /// What is wrong with the field
    pub message: String,
}

impl FieldWarning {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Errors raised while extracting API server addresses.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EndpointError {
    /// Not a single usable address was found
    #[error("no API server addresses discovered{}", join_warnings(.warnings))]
    NoApiServers {
        /// Everything that was skipped along the way
        warnings: Vec<FieldWarning>,
    },
}

impl EndpointError {
    /// Number of warnings collected before giving up.
    #[must_use]
    pub fn warning_count(&self) -> usize {
        match self {
            Self::NoApiServers { warnings } => warnings.len(),
        }
    }
}

fn join_warnings(warnings: &[FieldWarning]) -> String {
    if warnings.is_empty() {
        return String::new();
    }
    let joined = warnings
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ");
    format!(": {joined}")
}

/// Errors raised when validating a host/port pair.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HostPortError {
    #[error("host is neither an IP address nor a DNS name")]
    InvalidHost,

    #[error("port is zero")]
    ZeroPort,

    #[error("missing port in address")]
    MissingPort,

    #[error("port is not a positive number: {0:?}")]
    InvalidPort(String),

    #[error("port is out of range: {0}")]
    PortOutOfRange(u64),

    #[error("invalid address: {0}")]
    InvalidAddress(String),
}

/// Errors raised when deriving the cluster DNS address from the service CIDR.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClusterDnsError {
    #[error("invalid service CIDR {0:?}")]
    InvalidServiceCidr(String),

    #[error("service CIDR {0:?} is not an IPv4 network")]
    NotIpv4(String),

    #[error("service CIDR {0:?} is too narrow to hold a cluster DNS address")]
    TooNarrow(String),
}

#[cfg(test)]
#[path = "errors_tests.rs"]
mod errors_tests;

// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Common label constants stamped on every generated resource.
//!
//! The stack label is what the applier uses to find resources that belong to
//! this component and prune the ones that are no longer generated.

use std::collections::BTreeMap;

use crate::constants::COMPONENT_NAME;

// ============================================================================
// Kubernetes Standard Labels
// https://kubernetes.io/docs/concepts/overview/working-with-objects/common-labels/
// ============================================================================

/// Standard label for the component name within the architecture
pub const K8S_COMPONENT: &str = "app.kubernetes.io/component";

/// Standard label for the tool being used to manage the operation of an application
pub const K8S_MANAGED_BY: &str = "app.kubernetes.io/managed-by";

// ============================================================================
// k0s-Specific Labels
// ============================================================================

/// Label grouping every resource of one applied stack
pub const STACK_LABEL: &str = "k0s.k0sproject.io/stack";

/// Label carrying the worker profile a ConfigMap was generated for
pub const WORKER_PROFILE_LABEL: &str = "k0s.k0sproject.io/worker-profile";

// ============================================================================
// Label Values
// ============================================================================

/// Value for `app.kubernetes.io/managed-by`
pub const MANAGED_BY_K0S: &str = "k0s";

/// Labels shared by every resource this component generates.
#[must_use]
pub fn component_labels() -> BTreeMap<String, String> {
    BTreeMap::from([
        (K8S_COMPONENT.to_string(), COMPONENT_NAME.to_string()),
        (K8S_MANAGED_BY.to_string(), MANAGED_BY_K0S.to_string()),
        (STACK_LABEL.to_string(), COMPONENT_NAME.to_string()),
    ])
}

/// Label selector matching every resource of this component's stack.
#[must_use]
pub fn stack_selector() -> String {
    format!("{STACK_LABEL}={COMPONENT_NAME}")
}

#[cfg(test)]
#[path = "labels_tests.rs"]
mod labels_tests;

// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `labels.rs`

#[cfg(test)]
mod tests {
    use crate::labels::*;

    #[test]
    fn test_component_labels_contain_stack() {
        let labels = component_labels();
        assert_eq!(labels.get(STACK_LABEL).map(String::as_str), Some("worker-config"));
        assert_eq!(labels.get(K8S_COMPONENT).map(String::as_str), Some("worker-config"));
        assert_eq!(labels.get(K8S_MANAGED_BY).map(String::as_str), Some("k0s"));
        assert!(!labels.contains_key(WORKER_PROFILE_LABEL));
    }

    #[test]
    fn test_stack_selector() {
        assert_eq!(stack_selector(), "k0s.k0sproject.io/stack=worker-config");
    }
}

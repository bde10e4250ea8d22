// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Shared helpers for the integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use kube::api::DynamicObject;
use kube::client::Client;
use workerconfig::applier::Applier;

/// Get a Kubernetes client or skip the test if not in a cluster
pub async fn get_kube_client_or_skip() -> Option<Client> {
    match Client::try_default().await {
        Ok(client) => Some(client),
        Err(e) => {
            eprintln!("Skipping integration test: not running in Kubernetes cluster: {e}");
            None
        }
    }
}

/// Records every resource set it is asked to apply.
#[derive(Default)]
pub struct RecordingApplier {
    calls: Mutex<Vec<Vec<DynamicObject>>>,
}

impl RecordingApplier {
    pub fn calls(&self) -> Vec<Vec<DynamicObject>> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl Applier for RecordingApplier {
    async fn apply(&self, resources: Vec<DynamicObject>) -> Result<()> {
        self.calls.lock().unwrap().push(resources);
        Ok(())
    }
}

pub fn recording_applier() -> Arc<RecordingApplier> {
    Arc::new(RecordingApplier::default())
}

/// Kind and name of every resource in `resources`, sorted.
pub fn kinds_and_names(resources: &[DynamicObject]) -> Vec<(String, String)> {
    let mut out: Vec<(String, String)> = resources
        .iter()
        .map(|r| {
            (
                r.types.as_ref().map(|t| t.kind.clone()).unwrap_or_default(),
                r.metadata.name.clone().unwrap_or_default(),
            )
        })
        .collect();
    out.sort();
    out
}

// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Test doubles for the reconciler's collaborators.

use std::collections::VecDeque;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use k8s_openapi::api::core::v1::{EndpointAddress, EndpointPort, EndpointSubset, Endpoints};
use kube::api::DynamicObject;
use tokio::sync::{mpsc, Notify};

use crate::applier::Applier;
use crate::leader::{AcquiredLeaseCallback, LeaderElector, LeadershipState};
use crate::reconciler::watch::EndpointsSource;
use crate::reconciler::ReconcilerConfig;
use crate::resources::ResourceGenerator;

/// Records every apply call and answers with queued results, `Ok` once empty.
#[derive(Default)]
pub(crate) struct MockApplier {
    calls: Mutex<Vec<Vec<DynamicObject>>>,
    results: Mutex<VecDeque<Result<()>>>,
    /// When set, every apply call waits for a notification before returning.
    gate: Option<Arc<Notify>>,
    /// Notified when an apply call starts.
    pub(crate) entered: Arc<Notify>,
}

impl MockApplier {
    pub(crate) fn gated(gate: Arc<Notify>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::default()
        }
    }

    pub(crate) fn push_result(&self, result: Result<()>) {
        self.results.lock().unwrap().push_back(result);
    }

    pub(crate) fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub(crate) fn calls(&self) -> Vec<Vec<DynamicObject>> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Applier for MockApplier {
    async fn apply(&self, resources: Vec<DynamicObject>) -> Result<()> {
        self.calls.lock().unwrap().push(resources);
        self.entered.notify_one();
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        self.results.lock().unwrap().pop_front().unwrap_or(Ok(()))
    }
}

/// Leader elector driven by the test.
#[derive(Default)]
pub(crate) struct MockLeader {
    state: LeadershipState,
}

impl MockLeader {
    pub(crate) fn leading() -> Self {
        let leader = Self::default();
        leader.activate();
        leader
    }

    pub(crate) fn activate(&self) {
        self.state.set_leading(true);
    }

    pub(crate) fn deactivate(&self) {
        self.state.set_leading(false);
    }
}

impl LeaderElector for MockLeader {
    fn is_leader(&self) -> bool {
        self.state.is_leader()
    }

    fn add_acquired_lease_callback(&self, callback: AcquiredLeaseCallback) {
        self.state.add_callback(callback);
    }
}

/// Endpoints source fed through a channel. Each `watch` takes over the channel.
pub(crate) struct ChannelEndpointsSource {
    receiver: Mutex<Option<mpsc::UnboundedReceiver<Result<Endpoints>>>>,
}

impl ChannelEndpointsSource {
    pub(crate) fn new() -> (Self, mpsc::UnboundedSender<Result<Endpoints>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                receiver: Mutex::new(Some(rx)),
            },
            tx,
        )
    }
}

impl EndpointsSource for ChannelEndpointsSource {
    fn watch(&self) -> BoxStream<'static, Result<Endpoints>> {
        match self.receiver.lock().unwrap().take() {
            Some(rx) => futures::stream::unfold(rx, |mut rx| async move {
                rx.recv().await.map(|item| (item, rx))
            })
            .boxed(),
            None => futures::stream::pending().boxed(),
        }
    }
}

/// Endpoints source whose watches never yield and count themselves while open.
#[derive(Default)]
pub(crate) struct IdleEndpointsSource {
    open: Arc<AtomicUsize>,
    opened: Arc<AtomicUsize>,
}

impl IdleEndpointsSource {
    /// Watches currently open.
    pub(crate) fn open_watches(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }

    /// Watches opened so far.
    pub(crate) fn opened_watches(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }
}

struct OpenWatch(Arc<AtomicUsize>);

impl Drop for OpenWatch {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl EndpointsSource for IdleEndpointsSource {
    fn watch(&self) -> BoxStream<'static, Result<Endpoints>> {
        self.open.fetch_add(1, Ordering::SeqCst);
        self.opened.fetch_add(1, Ordering::SeqCst);
        let watch = OpenWatch(self.open.clone());
        futures::stream::unfold(watch, |watch| async move {
            let _watch = watch;
            futures::future::pending::<Option<(Result<Endpoints>, OpenWatch)>>().await
        })
        .boxed()
    }
}

/// Reconciler settings with short intervals.
pub(crate) fn test_config(api_server_reconciliation_enabled: bool) -> ReconcilerConfig {
    ReconcilerConfig {
        generator: ResourceGenerator {
            cluster_dns_ip: Ipv4Addr::new(10, 96, 0, 10),
            cluster_domain: "cluster.local".to_string(),
            konnectivity_enabled: true,
        },
        api_server_reconciliation_enabled,
        retry_interval: Duration::from_millis(50),
        endpoint_restart_interval: Duration::from_millis(10),
    }
}

/// An Endpoints object with one address and one `https` TCP port.
pub(crate) fn endpoints(ip: &str, port: i32) -> Endpoints {
    Endpoints {
        subsets: Some(vec![EndpointSubset {
            addresses: Some(vec![EndpointAddress {
                ip: ip.to_string(),
                ..Default::default()
            }]),
            ports: Some(vec![EndpointPort {
                name: Some("https".to_string()),
                port,
                protocol: Some("TCP".to_string()),
                ..Default::default()
            }]),
            ..Default::default()
        }]),
        ..Default::default()
    }
}

// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Worker configuration reconciler.
//!
//! The [`Reconciler`] keeps exactly one applied copy of the worker
//! configuration in the cluster. Three independent producers feed it:
//!
//! - [`Reconciler::reconcile`], called whenever the administrator's cluster
//!   configuration changes
//! - the endpoint watcher, whenever the set of API server addresses changes
//! - the leader elector, whenever this replica (re)acquires the lease
//!
//! Producers never touch state directly. Each one hands a mutation to a single
//! reconciliation loop task and waits for the result of the reconciliation that
//! includes its change.
//!
//! # Lifecycle
//!
//! `created -> initialized -> started -> stopped`. Every operation checks the
//! current state under a short-held lock and fails with a [`LifecycleError`]
//! when invoked out of order. [`Reconciler::stop`] is idempotent once stopped.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//! use workerconfig::applier::KubeApplier;
//! use workerconfig::crd::ClusterSpec;
//! use workerconfig::leader::StaticLeaderElector;
//! use workerconfig::reconciler::{Reconciler, ReconcilerConfig};
//!
//! # async fn example(client: kube::Client) -> anyhow::Result<()> {
//! let spec = ClusterSpec::default();
//! let config = ReconcilerConfig::from_node_spec(&spec, true)?;
//! let reconciler = Reconciler::new(config, Arc::new(StaticLeaderElector::leader()), None);
//!
//! reconciler.init(Arc::new(KubeApplier::new(client)))?;
//! reconciler.start()?;
//! reconciler.reconcile(&CancellationToken::new(), &spec).await?;
//! reconciler.stop().await?;
//! # Ok(())
//! # }
//! ```

mod dispatch;
mod reconcile_loop;
pub mod watch;

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures::future::join_all;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::applier::Applier;
use crate::constants::{
    ENDPOINT_WATCH_RESTART_INTERVAL, LEADER_CALLBACK_TIMEOUT, RECONCILE_RETRY_INTERVAL,
    UPDATE_QUEUE_CAPACITY,
};
use crate::crd::ClusterSpec;
use crate::errors::{ClusterDnsError, LifecycleError, ReconcileError};
use crate::leader::LeaderElector;
use crate::resources::ResourceGenerator;
use crate::snapshot::{ConfigSnapshot, Snapshot};

use dispatch::Dispatcher;
use reconcile_loop::ReconcileLoop;
use watch::{run_endpoint_watcher, EndpointsSource};

/// Lifecycle state of a [`Reconciler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Created,
    Initialized,
    Started,
    Stopped,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Created => "created",
            Self::Initialized => "initialized",
            Self::Started => "started",
            Self::Stopped => "stopped",
        })
    }
}

/// Node-level settings of a [`Reconciler`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconcilerConfig {
    /// Settings shared by every generated worker profile
    pub generator: ResourceGenerator,

    /// Whether API server addresses are discovered and published to workers.
    /// Disabled in tunneled networking mode.
    pub api_server_reconciliation_enabled: bool,

    /// Interval at which a failed reconciliation is retried
    pub retry_interval: Duration,

    /// Minimum time between two starts of the endpoint watch
    pub endpoint_restart_interval: Duration,
}

impl ReconcilerConfig {
    /// Derives the reconciler settings from this node's cluster configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the cluster DNS address cannot be derived from the
    /// service CIDR.
    pub fn from_node_spec(
        spec: &ClusterSpec,
        konnectivity_enabled: bool,
    ) -> Result<Self, ClusterDnsError> {
        let network = spec.network_or_default();
        Ok(Self {
            generator: ResourceGenerator {
                cluster_dns_ip: network.dns_address()?,
                cluster_domain: network.cluster_domain,
                konnectivity_enabled,
            },
            api_server_reconciliation_enabled: !spec.tunneled_networking_mode(),
            retry_interval: RECONCILE_RETRY_INTERVAL,
            endpoint_restart_interval: ENDPOINT_WATCH_RESTART_INTERVAL,
        })
    }
}

enum State {
    Created,
    Initialized {
        applier: Arc<dyn Applier>,
    },
    Started {
        cancel: CancellationToken,
        dispatcher: Dispatcher,
        tasks: Vec<CancellationToken>,
    },
    Stopped {
        tasks: Vec<CancellationToken>,
    },
}

impl State {
    fn lifecycle(&self) -> LifecycleState {
        match self {
            Self::Created => LifecycleState::Created,
            Self::Initialized { .. } => LifecycleState::Initialized,
            Self::Started { .. } => LifecycleState::Started,
            Self::Stopped { .. } => LifecycleState::Stopped,
        }
    }
}

/// Reconciles worker configuration into the cluster.
pub struct Reconciler {
    config: ReconcilerConfig,
    leader: Arc<dyn LeaderElector>,
    endpoints: Option<Arc<dyn EndpointsSource>>,
    state: Mutex<State>,
}

impl Reconciler {
    /// Creates a reconciler in the `created` state.
    ///
    /// `endpoints` is only watched when API server reconciliation is enabled.
    #[must_use]
    pub fn new(
        config: ReconcilerConfig,
        leader: Arc<dyn LeaderElector>,
        endpoints: Option<Arc<dyn EndpointsSource>>,
    ) -> Self {
        Self {
            config,
            leader,
            endpoints,
            state: Mutex::new(State::Created),
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> LifecycleState {
        self.lock().lifecycle()
    }

    /// Wires the reconciler to the cluster.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::CannotInitialize`] unless in the `created` state.
    pub fn init(&self, applier: Arc<dyn Applier>) -> Result<(), LifecycleError> {
        let mut state = self.lock();
        if !matches!(*state, State::Created) {
            return Err(LifecycleError::CannotInitialize(state.lifecycle()));
        }
        *state = State::Initialized { applier };
        Ok(())
    }

    /// Spawns the reconciliation loop and the endpoint watcher, and subscribes
    /// to lease acquisitions.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::CannotStart`] unless in the `initialized` state.
    pub fn start(&self) -> Result<(), LifecycleError> {
        let mut state = self.lock();
        let State::Initialized { applier } = &*state else {
            return Err(LifecycleError::CannotStart(state.lifecycle()));
        };

        let (updates_tx, updates_rx) = mpsc::channel(UPDATE_QUEUE_CAPACITY);
        let cancel = CancellationToken::new();
        let stopped = CancellationToken::new();
        let dispatcher = Dispatcher::new(updates_tx, stopped.clone());

        let reconcile_loop = ReconcileLoop::new(
            self.config.generator.clone(),
            applier.clone(),
            self.leader.clone(),
            self.config.api_server_reconciliation_enabled,
            self.config.retry_interval,
        );
        let loop_cancel = cancel.clone();
        let loop_stopped = stopped.clone();
        tokio::spawn(async move {
            let _stopped = loop_stopped.drop_guard();
            info!("Starting reconciliation loop");
            reconcile_loop.run(updates_rx, loop_cancel).await;
            info!("Reconciliation loop done");
        });

        let mut tasks = vec![stopped];
        if self.config.api_server_reconciliation_enabled {
            if let Some(source) = &self.endpoints {
                let watcher_done = CancellationToken::new();
                tasks.push(watcher_done.clone());
                let watcher = run_endpoint_watcher(
                    source.clone(),
                    dispatcher.clone(),
                    cancel.child_token(),
                    self.config.endpoint_restart_interval,
                );
                tokio::spawn(async move {
                    let _done = watcher_done.drop_guard();
                    watcher.await;
                });
            } else {
                debug!("No endpoints source, API server addresses will not be discovered");
            }
        }

        let runtime = Handle::current();
        let on_lease = dispatcher.clone();
        self.leader.add_acquired_lease_callback(Arc::new(move || {
            let dispatcher = on_lease.clone();
            runtime.spawn(async move {
                let ctx = CancellationToken::new();
                let bump = dispatcher.dispatch(&ctx, Snapshot::bump_serial);
                let error = match tokio::time::timeout(LEADER_CALLBACK_TIMEOUT, bump).await {
                    Ok(Ok(())) => return,
                    Ok(Err(e)) if e.is_stopped_concurrently() => return,
                    Ok(Err(e)) => e.to_string(),
                    Err(elapsed) => elapsed.to_string(),
                };
                error!(
                    error = %error,
                    "Failed to reconcile after having acquired the leader lease"
                );
            });
        }));

        *state = State::Started {
            cancel,
            dispatcher,
            tasks,
        };
        Ok(())
    }

    /// Reconciles the worker configuration against `cluster`.
    ///
    /// Returns once the reconciliation that includes this configuration has
    /// finished, or when `ctx` or the reconciler stops first.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::CannotReconcile`] unless started, the
    /// concurrent-stop or cancellation sentinels, or the generation or apply
    /// failure of the reconciliation attempt.
    pub async fn reconcile(
        &self,
        ctx: &CancellationToken,
        cluster: &ClusterSpec,
    ) -> Result<(), ReconcileError> {
        let dispatcher = {
            let state = self.lock();
            match &*state {
                State::Started { dispatcher, .. } => dispatcher.clone(),
                other => return Err(LifecycleError::CannotReconcile(other.lifecycle()).into()),
            }
        };

        let config = ConfigSnapshot::from_spec(cluster);
        dispatcher
            .dispatch(ctx, move |snapshot| snapshot.config = Some(config))
            .await
    }

    /// Stops the reconciliation loop and the endpoint watcher, and waits for
    /// both to exit.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::CannotStop`] unless started or stopped.
    pub async fn stop(&self) -> Result<(), LifecycleError> {
        let tasks = {
            let mut state = self.lock();
            let tasks = match &*state {
                State::Started { cancel, tasks, .. } => {
                    cancel.cancel();
                    tasks.clone()
                }
                State::Stopped { tasks } => tasks.clone(),
                other => return Err(LifecycleError::CannotStop(other.lifecycle())),
            };
            *state = State::Stopped {
                tasks: tasks.clone(),
            };
            tasks
        };

        join_all(tasks.iter().map(CancellationToken::cancelled)).await;
        info!("Stopped");
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
pub(crate) mod test_support;

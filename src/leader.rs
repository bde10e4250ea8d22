// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Leader election.
//!
//! The reconciler never acquires or releases leadership itself. It asks a
//! [`LeaderElector`] whether this replica currently leads and registers a
//! callback that fires whenever the lease is (re)acquired.
//!
//! [`LeaseLeaderElector`] follows a Kubernetes `Lease` through
//! `kube-lease-manager`. [`StaticLeaderElector`] is for single-replica setups
//! where leader election is disabled.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::{Context as _, Result};
use kube::Client;
use kube_lease_manager::LeaseManagerBuilder;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::metrics::{record_leader_elected, record_leader_lost};

/// Callback invoked when the lease is acquired. Must not block.
pub type AcquiredLeaseCallback = Arc<dyn Fn() + Send + Sync>;

/// Leader-election contract consumed by the reconciler.
pub trait LeaderElector: Send + Sync {
    /// Whether this replica currently holds the lease.
    fn is_leader(&self) -> bool;

    /// Registers a callback invoked every time the lease is acquired,
    /// including immediately if the lease is already held.
    fn add_acquired_lease_callback(&self, callback: AcquiredLeaseCallback);
}

/// A leader elector whose answer never changes.
#[derive(Debug, Clone, Copy)]
pub struct StaticLeaderElector {
    leader: bool,
}

impl StaticLeaderElector {
    #[must_use]
    pub fn leader() -> Self {
        Self { leader: true }
    }

    #[must_use]
    pub fn follower() -> Self {
        Self { leader: false }
    }
}

impl LeaderElector for StaticLeaderElector {
    fn is_leader(&self) -> bool {
        self.leader
    }

    fn add_acquired_lease_callback(&self, callback: AcquiredLeaseCallback) {
        if self.leader {
            callback();
        }
    }
}

/// Lease parameters for [`LeaseLeaderElector`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaseSettings {
    pub name: String,
    pub namespace: String,
    pub identity: String,
    pub duration_secs: u64,
    pub grace_secs: u64,
}

/// Leadership state plus the callbacks waiting for it.
///
/// The flag and the callback list share one lock, so a callback registered
/// while the lease is being acquired fires exactly once.
#[derive(Default)]
pub(crate) struct LeadershipState {
    inner: Mutex<Leadership>,
}

#[derive(Default)]
struct Leadership {
    leading: bool,
    callbacks: Vec<AcquiredLeaseCallback>,
}

impl LeadershipState {
    pub(crate) fn is_leader(&self) -> bool {
        self.lock().leading
    }

    /// Records a leadership change and returns whether this was an acquisition.
    pub(crate) fn set_leading(&self, leading: bool) -> bool {
        let acquired = {
            let mut inner = self.lock();
            let was_leading = std::mem::replace(&mut inner.leading, leading);
            (leading && !was_leading).then(|| inner.callbacks.clone())
        };
        let Some(callbacks) = acquired else {
            return false;
        };
        for callback in callbacks {
            callback();
        }
        true
    }

    pub(crate) fn add_callback(&self, callback: AcquiredLeaseCallback) {
        let leading = {
            let mut inner = self.lock();
            inner.callbacks.push(callback.clone());
            inner.leading
        };
        if leading {
            callback();
        }
    }

    fn lock(&self) -> MutexGuard<'_, Leadership> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Leader elector backed by a Kubernetes `Lease`.
#[derive(Clone)]
pub struct LeaseLeaderElector {
    state: Arc<LeadershipState>,
}

impl LeaseLeaderElector {
    /// Creates the lease manager and starts following the lease in the background.
    ///
    /// The background task releases its watch when `cancel` fires.
    ///
    /// # Errors
    ///
    /// Returns an error if the lease manager cannot be created.
    pub async fn start(
        client: Client,
        settings: &LeaseSettings,
        cancel: CancellationToken,
    ) -> Result<Self> {
        let manager = LeaseManagerBuilder::new(client, &settings.name)
            .with_namespace(&settings.namespace)
            .with_identity(&settings.identity)
            .with_duration(settings.duration_secs)
            .with_grace(settings.grace_secs)
            .build()
            .await
            .with_context(|| {
                format!(
                    "failed to create lease manager for {}/{}",
                    settings.namespace, settings.name
                )
            })?;

        info!(
            lease = %settings.name,
            namespace = %settings.namespace,
            identity = %settings.identity,
            "Starting leader election"
        );

        let state = Arc::new(LeadershipState::default());
        let (mut channel, task) = manager.watch().await;
        let identity = settings.identity.clone();
        let watched = state.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    changed = channel.changed() => {
                        if changed.is_err() {
                            warn!("Lease manager stopped publishing lease state");
                            break;
                        }
                        let leading = *channel.borrow_and_update();
                        if watched.set_leading(leading) {
                            info!(identity = %identity, "Acquired leader lease");
                            record_leader_elected(&identity);
                        } else if !leading {
                            info!(identity = %identity, "Lost leader lease");
                            record_leader_lost(&identity);
                        }
                    }
                }
            }

            watched.set_leading(false);
            drop(channel);
            match task.await {
                Ok(Ok(_manager)) => debug!("Lease manager finished"),
                Ok(Err(e)) => error!(error = %e, "Lease manager failed"),
                Err(e) => error!(error = %e, "Lease manager task panicked"),
            }
        });

        Ok(Self { state })
    }
}

impl LeaderElector for LeaseLeaderElector {
    fn is_leader(&self) -> bool {
        self.state.is_leader()
    }

    fn add_acquired_lease_callback(&self, callback: AcquiredLeaseCallback) {
        self.state.add_callback(callback);
    }
}

#[cfg(test)]
#[path = "leader_tests.rs"]
mod leader_tests;

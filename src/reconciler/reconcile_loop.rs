// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! The reconciliation loop.
//!
//! One task owns both the desired and the last applied snapshot. It applies
//! dispatched mutations one at a time, reconciles after each of them, and
//! retries on a fixed interval while the previous attempt failed.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::time::{interval_at, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::applier::Applier;
use crate::errors::{DispatchPhase, ReconcileError};
use crate::leader::LeaderElector;
use crate::metrics::{
    record_reconciliation_applied, record_reconciliation_failed, record_reconciliation_skipped,
    record_retry, SKIP_INCOMPLETE, SKIP_NOT_LEADER, SKIP_UNCHANGED,
};
use crate::reconciler::dispatch::Update;
use crate::resources::ResourceGenerator;
use crate::snapshot::Snapshot;

pub(crate) struct ReconcileLoop {
    generator: ResourceGenerator,
    applier: Arc<dyn Applier>,
    leader: Arc<dyn LeaderElector>,
    api_server_reconciliation_enabled: bool,
    retry_interval: Duration,
    desired: Snapshot,
    reconciled: Option<Snapshot>,
}

impl ReconcileLoop {
    pub(crate) fn new(
        generator: ResourceGenerator,
        applier: Arc<dyn Applier>,
        leader: Arc<dyn LeaderElector>,
        api_server_reconciliation_enabled: bool,
        retry_interval: Duration,
    ) -> Self {
        Self {
            generator,
            applier,
            leader,
            api_server_reconciliation_enabled,
            retry_interval,
            desired: Snapshot::default(),
            reconciled: None,
        }
    }

    /// Runs until `cancel` fires. Queued updates are dropped on exit, which
    /// their producers observe as a concurrent stop.
    pub(crate) async fn run(
        mut self,
        mut updates: mpsc::Receiver<Update>,
        cancel: CancellationToken,
    ) {
        let start = tokio::time::Instant::now() + self.retry_interval;
        let mut retry = interval_at(start, self.retry_interval);
        retry.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last_failed = false;

        loop {
            tokio::select! {
                () = cancel.cancelled() => return,

                Some(update) = updates.recv() => {
                    (update.mutate)(&mut self.desired);
                    let result = self.reconcile(&cancel).await;
                    last_failed = result.is_err();
                    // The producer may have given up already.
                    let _ = update.done.send(result);
                }

                _ = retry.tick() => {
                    if !last_failed {
                        continue;
                    }
                    match self.reconcile(&cancel).await {
                        Ok(()) => {
                            record_retry(true);
                            last_failed = false;
                        }
                        Err(e) => {
                            record_retry(false);
                            error!(
                                error = %e,
                                "Failed to recover from previously failed reconciliation"
                            );
                        }
                    }
                }
            }
        }
    }

    /// Reconciles the desired snapshot if this replica leads and it differs
    /// from the last applied one.
    async fn reconcile(&mut self, cancel: &CancellationToken) -> Result<(), ReconcileError> {
        if cancel.is_cancelled() {
            return Err(ReconcileError::StoppedConcurrently {
                during: DispatchPhase::ProcessingReconciliation,
            });
        }

        if !self.leader.is_leader() {
            debug!("Skipping reconciliation, not the leader");
            record_reconciliation_skipped(SKIP_NOT_LEADER);
            return Ok(());
        }

        if !self.desired.is_complete(self.api_server_reconciliation_enabled) {
            debug!("Skipping reconciliation, snapshot not yet complete");
            record_reconciliation_skipped(SKIP_INCOMPLETE);
            return Ok(());
        }

        if self.reconciled.as_ref() == Some(&self.desired) {
            debug!("Skipping reconciliation, nothing changed");
            record_reconciliation_skipped(SKIP_UNCHANGED);
            return Ok(());
        }

        let desired = self.desired.clone();
        let Some(config) = desired.config.as_ref() else {
            return Ok(());
        };

        let resources = match self.generator.generate(config, &desired.api_servers) {
            Ok(resources) => resources,
            Err(e) => {
                record_reconciliation_failed(None);
                return Err(e.into());
            }
        };

        let started = Instant::now();
        let applied = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                return Err(ReconcileError::StoppedConcurrently {
                    during: DispatchPhase::ProcessingReconciliation,
                });
            }
            applied = self.applier.apply(resources) => applied,
        };
        if let Err(e) = applied {
            record_reconciliation_failed(Some(started.elapsed()));
            return Err(ReconcileError::Apply(e));
        }
        record_reconciliation_applied(started.elapsed());

        info!(
            api_servers = desired.api_servers.len(),
            serial = desired.serial,
            "Worker configuration updated"
        );
        self.reconciled = Some(desired);
        Ok(())
    }
}

#[cfg(test)]
#[path = "reconcile_loop_tests.rs"]
mod reconcile_loop_tests;

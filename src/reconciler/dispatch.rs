// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Hand-off of snapshot mutations to the reconciliation loop.
//!
//! A producer enqueues one mutation together with a private acknowledgement
//! channel and then waits for the result of the reconciliation that includes
//! its change. Both steps race the loop's stopped signal and the producer's
//! own cancellation, so a producer never waits on a loop that is gone.

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::errors::{DispatchPhase, ReconcileError};
use crate::snapshot::Snapshot;

/// A single logical change to the desired snapshot.
pub(crate) type Mutation = Box<dyn FnOnce(&mut Snapshot) + Send>;

/// A mutation plus the channel its reconciliation result is reported on.
pub(crate) struct Update {
    pub(crate) mutate: Mutation,
    pub(crate) done: oneshot::Sender<Result<(), ReconcileError>>,
}

/// Sending half of the loop's update queue plus its stopped signal.
#[derive(Clone)]
pub(crate) struct Dispatcher {
    updates: mpsc::Sender<Update>,
    stopped: CancellationToken,
}

impl Dispatcher {
    pub(crate) fn new(updates: mpsc::Sender<Update>, stopped: CancellationToken) -> Self {
        Self { updates, stopped }
    }

    /// Hands `mutate` to the loop and waits for the reconciliation result.
    pub(crate) async fn dispatch(
        &self,
        ctx: &CancellationToken,
        mutate: impl FnOnce(&mut Snapshot) + Send + 'static,
    ) -> Result<(), ReconcileError> {
        let (done, result) = oneshot::channel();
        let update = Update {
            mutate: Box::new(mutate),
            done,
        };

        let phase = DispatchPhase::EnqueueingUpdate;
        tokio::select! {
            biased;
            () = self.stopped.cancelled() => {
                return Err(ReconcileError::StoppedConcurrently { during: phase });
            }
            () = ctx.cancelled() => return Err(ReconcileError::Cancelled { during: phase }),
            sent = self.updates.send(update) => {
                if sent.is_err() {
                    return Err(ReconcileError::StoppedConcurrently { during: phase });
                }
            }
        }

        let phase = DispatchPhase::AwaitingReconciliation;
        tokio::select! {
            biased;
            // A dropped sender means the loop exited with the update still queued.
            result = result => result
                .unwrap_or(Err(ReconcileError::StoppedConcurrently { during: phase })),
            () = self.stopped.cancelled() => {
                Err(ReconcileError::StoppedConcurrently { during: phase })
            }
            () = ctx.cancelled() => Err(ReconcileError::Cancelled { during: phase }),
        }
    }
}

#[cfg(test)]
#[path = "dispatch_tests.rs"]
mod dispatch_tests;

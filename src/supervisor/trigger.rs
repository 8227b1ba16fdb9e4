//! Restart requests from outside the run loop.
//!
//! The live child slot is the only state shared between a supervisor's run
//! loop and the task consuming file-change batches. Both sides touch it only
//! while holding its lock, and the trigger side never does more under the
//! lock than deliver one signal.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;
use tokio_stream::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::process::{GroupSignal, ProcessHandle};
use crate::watcher::ChangeEvent;

/// The currently running child of one supervisor.
pub(crate) struct LiveChild {
    pub(crate) handle: Arc<dyn ProcessHandle>,
    pub(crate) restart_tx: oneshot::Sender<()>,
}

pub(crate) type ChildSlot = Arc<Mutex<Option<LiveChild>>>;

pub(crate) fn lock_slot(slot: &ChildSlot) -> MutexGuard<'_, Option<LiveChild>> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Cloneable handle that asks a supervisor for a clean restart.
#[derive(Clone)]
pub struct RestartTrigger {
    role: Arc<str>,
    slot: ChildSlot,
}

impl RestartTrigger {
    pub(crate) fn new(role: &str, slot: ChildSlot) -> Self {
        Self {
            role: role.into(),
            slot,
        }
    }

    /// Interrupt the live child and tell the run loop to start a new one.
    ///
    /// Returns `false` when no child is live; there is nothing to restart
    /// and the next spawn will pick up the change anyway.
    pub fn request_restart(&self) -> bool {
        let mut slot = lock_slot(&self.slot);
        let Some(child) = slot.take() else {
            return false;
        };

        if let Err(e) = child.handle.signal_group(GroupSignal::Interrupt) {
            tracing::debug!(role = %self.role, error = %e, "Failed to send restart signal");
        }
        let _ = child.restart_tx.send(());
        drop(slot);

        tracing::debug!(role = %self.role, "Restart requested");
        true
    }

    /// Whether a child is currently live.
    #[must_use]
    pub fn has_live_child(&self) -> bool {
        lock_slot(&self.slot).is_some()
    }

    #[must_use]
    pub fn role(&self) -> &str {
        &self.role
    }
}

impl std::fmt::Debug for RestartTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestartTrigger")
            .field("role", &self.role)
            .field("live", &self.has_live_child())
            .finish()
    }
}

/// Turn change batches into restart requests until the stream ends or
/// `cancel` fires. Returns the number of restarts actually triggered.
pub async fn forward_changes<S>(
    mut changes: S,
    trigger: RestartTrigger,
    cancel: CancellationToken,
) -> usize
where
    S: Stream<Item = ChangeEvent> + Unpin,
{
    let mut restarts = 0;
    loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => {
                tracing::debug!(role = trigger.role(), "Change forwarding cancelled");
                break;
            }
            batch = changes.next() => {
                let Some(batch) = batch else {
                    tracing::trace!(role = trigger.role(), "Watch ending");
                    break;
                };
                tracing::trace!(
                    role = trigger.role(),
                    paths = ?batch.paths,
                    "Sources changed"
                );
                if trigger.request_restart() {
                    restarts += 1;
                }
            }
        }
    }
    restarts
}

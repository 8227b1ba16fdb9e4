//! The per-role run loop.
//!
//! One [`ProcessSupervisor`] owns one role's child from spawn to terminal
//! state. Only the run loop spawns, and it always waits for the previous
//! child to exit first, so a role never has two live children.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::output::{OutputClassifier, ReadinessLatch};
use crate::process::{
    reap_group, terminate, wait_or_kill, CommandSpec, ExitReason, ProcessHandle, ProcessLauncher,
    DEFAULT_GRACE_PERIOD,
};
use crate::status::Component;

use super::trigger::{lock_slot, ChildSlot, LiveChild};
use super::{
    Backoff, BackoffPolicy, BreakerPolicy, BreakerVerdict, HardExitBreaker, RestartTrigger,
    SupervisorError, SupervisorState, SupervisorStateMachine, SupervisorStats, TerminalReason,
};

/// How long to keep forwarding output after the child has exited.
const OUTPUT_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Tunables for one supervisor.
#[derive(Debug, Clone)]
pub struct SupervisorOptions {
    pub backoff: BackoffPolicy,
    pub breaker: BreakerPolicy,
    /// Interrupt-to-kill grace period for restarts and shutdown.
    pub grace: Duration,
    /// Output substrings that mean "finished booting". Empty means the
    /// role is ready as soon as its child spawns.
    pub ready_sentinels: Vec<String>,
}

impl Default for SupervisorOptions {
    fn default() -> Self {
        Self {
            backoff: BackoffPolicy::default(),
            breaker: BreakerPolicy::default(),
            grace: DEFAULT_GRACE_PERIOD,
            ready_sentinels: Vec::new(),
        }
    }
}

/// What ended one run of the child.
enum RunEnd {
    Shutdown,
    Restart,
    Exited(ExitReason),
}

/// Supervises one role's command.
pub struct ProcessSupervisor {
    role: String,
    command: CommandSpec,
    launcher: Arc<dyn ProcessLauncher>,
    classifier: OutputClassifier,
    slot: ChildSlot,
    backoff: Backoff,
    breaker: HardExitBreaker,
    grace: Duration,
    cancel: CancellationToken,
    state: SupervisorStateMachine,
}

impl ProcessSupervisor {
    #[must_use]
    pub fn new(
        role: impl Into<String>,
        command: CommandSpec,
        component: Component,
        launcher: Arc<dyn ProcessLauncher>,
        options: SupervisorOptions,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            role: role.into(),
            command,
            launcher,
            classifier: OutputClassifier::new(
                component,
                options.ready_sentinels,
                Arc::new(ReadinessLatch::new()),
            ),
            slot: ChildSlot::default(),
            backoff: Backoff::new(options.backoff),
            breaker: HardExitBreaker::new(options.breaker),
            grace: options.grace,
            cancel,
            state: SupervisorStateMachine::new(),
        }
    }

    /// Handle for requesting clean restarts from another task.
    #[must_use]
    pub fn restart_trigger(&self) -> RestartTrigger {
        RestartTrigger::new(&self.role, Arc::clone(&self.slot))
    }

    #[must_use]
    pub fn role(&self) -> &str {
        &self.role
    }

    #[must_use]
    pub fn command(&self) -> &CommandSpec {
        &self.command
    }

    #[must_use]
    pub fn state(&self) -> SupervisorState {
        self.state.state()
    }

    /// Subscribe to state transitions.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SupervisorState> {
        self.state.subscribe()
    }

    #[must_use]
    pub fn stats(&self) -> SupervisorStats {
        self.state.stats()
    }

    /// Hard exits counted in the current breaker window.
    #[must_use]
    pub fn hard_exit_count(&self) -> u32 {
        self.breaker.count()
    }

    /// Run until shutdown or until the breaker trips.
    ///
    /// Calling `run` again after a terminal state returns that state
    /// without spawning.
    ///
    /// # Errors
    ///
    /// Returns `SupervisorError::GaveUp` when the child keeps crashing.
    pub async fn run(&mut self) -> Result<TerminalReason, SupervisorError> {
        if let SupervisorState::Terminal(reason) = self.state.state() {
            return Ok(reason);
        }

        loop {
            if self.cancel.is_cancelled() {
                return Ok(self.finish(TerminalReason::ShutDown));
            }

            self.state.transition(SupervisorState::Starting);

            let launched = match self.launcher.launch(&self.command) {
                Ok(launched) => launched,
                Err(e) => {
                    tracing::error!(role = %self.role, error = %e, "Failed to start command");
                    self.classifier
                        .component()
                        .logerr(format!("failed to start `{}`: {e}", self.command.display_line()))
                        .await;
                    if let Some(reason) = self.crashed().await? {
                        return Ok(reason);
                    }
                    continue;
                }
            };

            self.state.record_spawn();
            let handle = launched.handle;
            let (restart_tx, restart_rx) = oneshot::channel();
            *lock_slot(&self.slot) = Some(LiveChild {
                handle: Arc::clone(&handle),
                restart_tx,
            });

            let readers = self.classifier.attach(launched.stdout, launched.stderr);
            self.state.transition(SupervisorState::Running);
            tracing::info!(
                role = %self.role,
                pid = ?handle.id(),
                command = %self.command.display_line(),
                "Child started"
            );

            if !self.classifier.detects_readiness() {
                self.classifier
                    .latch()
                    .signal(self.classifier.component())
                    .await;
            }

            let end = tokio::select! {
                biased;

                () = self.cancel.cancelled() => RunEnd::Shutdown,
                _ = restart_rx => RunEnd::Restart,
                reason = handle.wait() => RunEnd::Exited(reason),
            };

            match end {
                RunEnd::Shutdown => {
                    self.state.transition(SupervisorState::Stopping);
                    let live = lock_slot(&self.slot).take();
                    if live.is_some() {
                        terminate(handle.as_ref(), self.grace).await;
                    } else {
                        // A restart already sent the interrupt.
                        wait_or_kill(handle.as_ref(), self.grace).await;
                    }
                    drain_output(readers).await;
                    return Ok(self.finish(TerminalReason::ShutDown));
                }
                RunEnd::Restart => {
                    self.clean_restart(handle.as_ref(), readers).await;
                }
                RunEnd::Exited(reason) => {
                    let ours = lock_slot(&self.slot).take();
                    reap_group(handle.as_ref());
                    drain_output(readers).await;

                    if ours.is_none() {
                        // A restart request raced the exit; it is still a clean restart.
                        self.state.record_clean_restart();
                        tracing::debug!(role = %self.role, %reason, "Child exited during restart");
                        continue;
                    }

                    if self.cancel.is_cancelled() || reason.is_cancellation() {
                        tracing::debug!(role = %self.role, %reason, "Child stopped externally");
                        return Ok(self.finish(TerminalReason::ShutDown));
                    }

                    tracing::warn!(role = %self.role, %reason, "Child exited");
                    if let Some(reason) = self.crashed().await? {
                        return Ok(reason);
                    }
                }
            }
        }
    }

    async fn clean_restart(&mut self, handle: &dyn ProcessHandle, readers: Vec<JoinHandle<()>>) {
        self.state.transition(SupervisorState::Stopping);
        let reason = wait_or_kill(handle, self.grace).await;
        drain_output(readers).await;
        self.state.record_clean_restart();
        tracing::info!(role = %self.role, %reason, "Restarting after source change");
    }

    /// Account for a hard exit and sleep out the backoff.
    ///
    /// Returns `Some` when the supervisor reached a terminal state.
    async fn crashed(&mut self) -> Result<Option<TerminalReason>, SupervisorError> {
        self.state.transition(SupervisorState::Crashed);
        self.state.record_hard_exit();

        match self.breaker.record(Instant::now()) {
            BreakerVerdict::Trip { count } => {
                let window = self.breaker.policy().window;
                let err = SupervisorError::GaveUp {
                    role: self.role.clone(),
                    command: self.command.display_line(),
                    exits: count,
                    window,
                };
                tracing::error!(role = %self.role, exits = count, window = ?window, "Giving up");
                self.classifier.component().logerr(err.to_string()).await;
                self.finish(TerminalReason::GiveUp);
                return Err(err);
            }
            BreakerVerdict::Retry { window_reset, .. } => {
                if window_reset {
                    self.backoff.reset();
                }
            }
        }

        let delay = self.backoff.next_delay();
        tracing::error!(
            role = %self.role,
            waiting = ?delay,
            "Command failed, restarting"
        );
        self.classifier
            .component()
            .logerr(format!("command failed, restarting in {delay:?}"))
            .await;

        tokio::select! {
            biased;

            () = self.cancel.cancelled() => Ok(Some(self.finish(TerminalReason::ShutDown))),
            () = tokio::time::sleep(delay) => Ok(None),
        }
    }

    fn finish(&mut self, reason: TerminalReason) -> TerminalReason {
        self.state.transition(SupervisorState::Terminal(reason));
        reason
    }
}

impl std::fmt::Debug for ProcessSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessSupervisor")
            .field("role", &self.role)
            .field("command", &self.command.display_line())
            .field("state", &self.state.state())
            .finish_non_exhaustive()
    }
}

async fn drain_output(readers: Vec<JoinHandle<()>>) {
    for reader in readers {
        let abort = reader.abort_handle();
        if tokio::time::timeout(OUTPUT_DRAIN_TIMEOUT, reader).await.is_err() {
            abort.abort();
        }
    }
}

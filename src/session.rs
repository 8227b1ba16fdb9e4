//! Wires configured roles, their watchers and the status view together.

use std::fmt;
use std::sync::Arc;

use tokio::task::JoinSet;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

use crate::config::DevConfig;
use crate::process::ProcessLauncher;
use crate::status::{Component, StatusAggregator, StatusRenderer};
use crate::supervisor::{
    forward_changes, ProcessSupervisor, RestartTrigger, SupervisorError, SupervisorStats,
    TerminalReason,
};
use crate::watcher::{ChangeEvent, FileWatcher};

/// How one role ended.
#[derive(Debug)]
pub struct RoleOutcome {
    pub role: String,
    pub result: Result<TerminalReason, SupervisorError>,
    pub stats: SupervisorStats,
}

impl RoleOutcome {
    #[must_use]
    pub fn gave_up(&self) -> bool {
        self.result.is_err()
    }
}

/// Terminal state of every role, in configuration order.
#[derive(Debug, Default)]
pub struct SessionReport {
    pub roles: Vec<RoleOutcome>,
}

impl SessionReport {
    /// Roles that gave up, with their errors.
    pub fn failures(&self) -> impl Iterator<Item = (&str, &SupervisorError)> {
        self.roles
            .iter()
            .filter_map(|o| o.result.as_ref().err().map(|e| (o.role.as_str(), e)))
    }

    /// Whether every role shut down without giving up.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.roles.iter().all(|o| !o.gave_up())
    }
}

impl fmt::Display for SessionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for outcome in &self.roles {
            match &outcome.result {
                Ok(reason) => writeln!(
                    f,
                    "{}: {reason:?} ({} spawns, {} restarts, {} crashes)",
                    outcome.role,
                    outcome.stats.spawns,
                    outcome.stats.clean_restarts,
                    outcome.stats.hard_exits
                )?,
                Err(e) => writeln!(f, "{}: {e}", outcome.role)?,
            }
        }
        Ok(())
    }
}

struct PendingWatch {
    watcher: FileWatcher,
    changes: ReceiverStream<ChangeEvent>,
    trigger: RestartTrigger,
}

/// A running development session: one supervisor per configured role.
///
/// Construction validates commands and sets up every watcher before any
/// child is spawned, so a bad watch root fails the session up front.
pub struct DevSession {
    aggregator: StatusAggregator,
    pending: Vec<(ProcessSupervisor, Option<PendingWatch>)>,
    supervisors: JoinSet<RoleOutcome>,
    watchers: JoinSet<()>,
    outcomes: Vec<RoleOutcome>,
    order: Vec<String>,
    cancel: CancellationToken,
}

impl DevSession {
    /// Prepare supervisors and watchers for every role in `config`.
    ///
    /// # Errors
    ///
    /// Returns `SupervisorError::Command` for an unusable command line and
    /// `SupervisorError::Startup` when a watch root cannot be watched.
    pub fn new(
        config: &DevConfig,
        renderer: Arc<dyn StatusRenderer>,
        launcher: Arc<dyn ProcessLauncher>,
        cancel: CancellationToken,
    ) -> Result<Self, SupervisorError> {
        let aggregator = StatusAggregator::new(renderer, config.queue_capacity, config.debug);
        let mut pending = Vec::with_capacity(config.roles.len());

        for role in &config.roles {
            let command = role.command().map_err(|source| SupervisorError::Command {
                role: role.name.clone(),
                source,
            })?;
            let component = aggregator.add(role.name.as_str());
            let supervisor = ProcessSupervisor::new(
                role.name.as_str(),
                command,
                component,
                Arc::clone(&launcher),
                config.supervisor_options(role),
                cancel.child_token(),
            );

            let watch = match role.watch_spec() {
                Some(spec) => {
                    let (watcher, changes) =
                        FileWatcher::stream(spec).map_err(|source| SupervisorError::Startup {
                            role: role.name.clone(),
                            source,
                        })?;
                    Some(PendingWatch {
                        watcher,
                        changes,
                        trigger: supervisor.restart_trigger(),
                    })
                }
                None => None,
            };

            pending.push((supervisor, watch));
        }

        Ok(Self {
            aggregator,
            order: config.roles.iter().map(|r| r.name.clone()).collect(),
            pending,
            supervisors: JoinSet::new(),
            watchers: JoinSet::new(),
            outcomes: Vec::new(),
            cancel,
        })
    }

    /// Register a component driven by the host rather than a supervisor.
    ///
    /// The all-ready summary waits for it, so register it before
    /// [`start`](Self::start) and mark it ready with [`Component::ready`].
    pub fn add_component(&self, name: impl Into<String>) -> Component {
        self.aggregator.add(name)
    }

    /// Start the status consumer, every supervisor and every watcher.
    pub fn start(&mut self) {
        self.aggregator.start();

        for (mut supervisor, watch) in self.pending.drain(..) {
            let role = supervisor.role().to_string();
            tracing::info!(role = %role, command = %supervisor.command().display_line(), "Starting role");

            self.supervisors.spawn(async move {
                let result = supervisor.run().await;
                RoleOutcome {
                    role,
                    result,
                    stats: supervisor.stats(),
                }
            });

            if let Some(PendingWatch {
                mut watcher,
                changes,
                trigger,
            }) = watch
            {
                let cancel = self.cancel.child_token();
                self.watchers.spawn(async move {
                    let restarts = forward_changes(changes, trigger.clone(), cancel).await;
                    watcher.stop();
                    tracing::debug!(role = trigger.role(), restarts, "Watch finished");
                });
            }
        }
    }

    /// Wait until every supervisor is terminal or the session is cancelled.
    pub async fn wait(&mut self) {
        loop {
            tokio::select! {
                biased;

                () = self.cancel.cancelled() => return,
                joined = self.supervisors.join_next() => match joined {
                    Some(Ok(outcome)) => self.record(outcome),
                    Some(Err(e)) => tracing::error!(error = %e, "Supervisor task failed"),
                    None => return,
                },
            }
        }
    }

    /// Stop everything and report how each role ended.
    pub async fn shutdown(mut self) -> SessionReport {
        self.cancel.cancel();

        while let Some(joined) = self.supervisors.join_next().await {
            match joined {
                Ok(outcome) => self.record(outcome),
                Err(e) => tracing::error!(error = %e, "Supervisor task failed"),
            }
        }
        while let Some(joined) = self.watchers.join_next().await {
            if let Err(e) = joined {
                tracing::warn!(error = %e, "Watch task failed");
            }
        }

        self.aggregator.stop().await;

        let mut roles = std::mem::take(&mut self.outcomes);
        roles.sort_by_key(|o| self.order.iter().position(|name| *name == o.role));
        tracing::info!(roles = roles.len(), "Session stopped");
        SessionReport { roles }
    }

    /// Whether the all-ready summary has been rendered.
    #[must_use]
    pub fn all_ready(&self) -> bool {
        self.aggregator.all_ready()
    }

    /// Handle that stops the session when cancelled.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    fn record(&mut self, outcome: RoleOutcome) {
        match &outcome.result {
            Ok(reason) => tracing::debug!(role = %outcome.role, ?reason, "Role finished"),
            Err(e) => tracing::error!(role = %outcome.role, error = %e, "Role gave up"),
        }
        self.outcomes.push(outcome);
    }
}

impl fmt::Debug for DevSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DevSession")
            .field("roles", &self.order)
            .field("running", &self.supervisors.len())
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

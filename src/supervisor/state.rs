//! Supervisor state machine.

use tokio::sync::watch;

/// Why a supervisor stopped for good.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalReason {
    /// Shutdown was requested or the child was stopped from outside.
    ShutDown,
    /// The hard-exit breaker tripped.
    GiveUp,
}

/// Lifecycle state of one supervised role.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SupervisorState {
    #[default]
    Idle,
    Starting,
    Running,
    Stopping,
    Crashed,
    Terminal(TerminalReason),
}

impl SupervisorState {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Terminal(_))
    }
}

/// Counters kept across every run of a role.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SupervisorStats {
    /// Children successfully spawned.
    pub spawns: usize,
    /// Restarts caused by a change notification.
    pub clean_restarts: usize,
    /// Crashes and spawn failures.
    pub hard_exits: usize,
}

/// Tracks the current state and publishes it to watchers.
#[derive(Debug)]
pub struct SupervisorStateMachine {
    state: watch::Sender<SupervisorState>,
    stats: SupervisorStats,
}

impl Default for SupervisorStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl SupervisorStateMachine {
    #[must_use]
    pub fn new() -> Self {
        let (state, _) = watch::channel(SupervisorState::Idle);
        Self {
            state,
            stats: SupervisorStats::default(),
        }
    }

    #[must_use]
    pub fn state(&self) -> SupervisorState {
        *self.state.borrow()
    }

    /// Subscribe to state changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SupervisorState> {
        self.state.subscribe()
    }

    pub fn transition(&mut self, new_state: SupervisorState) {
        let old = self.state.send_replace(new_state);
        tracing::debug!(from = ?old, to = ?new_state, "State transition");
    }

    pub fn record_spawn(&mut self) {
        self.stats.spawns = self.stats.spawns.saturating_add(1);
    }

    pub fn record_clean_restart(&mut self) {
        self.stats.clean_restarts = self.stats.clean_restarts.saturating_add(1);
    }

    pub fn record_hard_exit(&mut self) {
        self.stats.hard_exits = self.stats.hard_exits.saturating_add(1);
    }

    #[must_use]
    pub fn stats(&self) -> SupervisorStats {
        self.stats
    }
}

//! Supervisor error types.

use std::time::Duration;

use crate::process::SpawnError;
use crate::watcher::WatcherError;

/// Errors surfaced by supervisors and the session that owns them.
#[derive(thiserror::Error, Debug)]
pub enum SupervisorError {
    /// The watch target for a role could not be set up.
    #[error("Failed to watch sources for {role}: {source}")]
    Startup {
        role: String,
        #[source]
        source: WatcherError,
    },

    /// The role's command line is unusable.
    #[error("Invalid command for {role}: {source}")]
    Command {
        role: String,
        #[source]
        source: SpawnError,
    },

    /// The hard-exit breaker tripped.
    #[error("{role}: `{command}` failed {exits} times within {window:?}, giving up")]
    GaveUp {
        role: String,
        command: String,
        exits: u32,
        window: Duration,
    },
}

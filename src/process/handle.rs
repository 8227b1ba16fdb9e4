//! The process-handle capability and typed exit reasons.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncRead;

use super::{CommandSpec, SignalError, SpawnError};

/// Default grace period between interrupt and kill.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// A child output pipe.
pub type OutputStream = Box<dyn AsyncRead + Send + Unpin>;

/// Signal sent to a whole process group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupSignal {
    /// Ask the group to stop (SIGINT on Unix).
    Interrupt,
    /// Force the group to stop (SIGKILL on Unix).
    Kill,
}

/// Signal that terminated a child.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TermSignal {
    Interrupt,
    Kill,
    Hangup,
    Terminate,
    Other(i32),
}

impl TermSignal {
    /// Map a raw Unix signal number.
    #[must_use]
    pub fn from_raw(raw: i32) -> Self {
        match raw {
            1 => Self::Hangup,
            2 => Self::Interrupt,
            9 => Self::Kill,
            15 => Self::Terminate,
            other => Self::Other(other),
        }
    }
}

impl fmt::Display for TermSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Interrupt => f.write_str("interrupt"),
            Self::Kill => f.write_str("killed"),
            Self::Hangup => f.write_str("hangup"),
            Self::Terminate => f.write_str("terminated"),
            Self::Other(n) => write!(f, "signal {n}"),
        }
    }
}

/// Why a child process stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitReason {
    /// Exited with status 0.
    Success,
    /// Exited with a non-zero status.
    Code(i32),
    /// Terminated by a signal.
    Signaled(TermSignal),
    /// The exit status could not be collected.
    WaitFailed(String),
}

impl ExitReason {
    /// Classify an OS exit status.
    #[must_use]
    pub fn from_status(status: std::process::ExitStatus) -> Self {
        if status.success() {
            return Self::Success;
        }
        if let Some(code) = status.code() {
            return Self::Code(code);
        }
        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            if let Some(raw) = status.signal() {
                return Self::Signaled(TermSignal::from_raw(raw));
            }
        }
        Self::WaitFailed("unknown exit status".to_string())
    }

    /// Whether the child was stopped from outside: interrupt, kill or hangup.
    ///
    /// These exits end supervision rather than trigger a retry.
    #[must_use]
    pub fn is_cancellation(&self) -> bool {
        matches!(
            self,
            Self::Signaled(TermSignal::Interrupt | TermSignal::Kill | TermSignal::Hangup)
        )
    }
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => f.write_str("exited successfully"),
            Self::Code(code) => write!(f, "exit status {code}"),
            Self::Signaled(sig) => write!(f, "signal: {sig}"),
            Self::WaitFailed(msg) => write!(f, "wait failed: {msg}"),
        }
    }
}

/// A started child that owns its own process group.
#[async_trait]
pub trait ProcessHandle: Send + Sync {
    /// OS process id of the group leader, if known.
    fn id(&self) -> Option<u32>;

    /// Send a signal to every process in the group.
    ///
    /// Signalling a group that has already exited is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `SignalError` if the signal could not be delivered.
    fn signal_group(&self, signal: GroupSignal) -> Result<(), SignalError>;

    /// Wait for the group leader to exit.
    ///
    /// Cancel-safe, and returns the same reason on every call after exit.
    async fn wait(&self) -> ExitReason;
}

/// A freshly launched child and its output pipes.
pub struct Launched {
    pub handle: Arc<dyn ProcessHandle>,
    pub stdout: Option<OutputStream>,
    pub stderr: Option<OutputStream>,
}

impl fmt::Debug for Launched {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Launched")
            .field("pid", &self.handle.id())
            .field("stdout", &self.stdout.is_some())
            .field("stderr", &self.stderr.is_some())
            .finish()
    }
}

/// Starts commands in their own process group.
pub trait ProcessLauncher: Send + Sync {
    /// Spawn the command described by `spec`.
    ///
    /// # Errors
    ///
    /// Returns `SpawnError` if the process could not be started.
    fn launch(&self, spec: &CommandSpec) -> Result<Launched, SpawnError>;
}

/// Wait up to `grace` for the child, then kill its group and wait again.
///
/// The group is reaped once the leader is gone, so descendants that ignored
/// the interrupt or outlived their parent do not survive it.
pub async fn wait_or_kill(handle: &dyn ProcessHandle, grace: Duration) -> ExitReason {
    let reason = match tokio::time::timeout(grace, handle.wait()).await {
        Ok(reason) => reason,
        Err(_) => {
            tracing::warn!(
                pid = ?handle.id(),
                grace = ?grace,
                "Process group ignored interrupt, killing"
            );
            if let Err(e) = handle.signal_group(GroupSignal::Kill) {
                tracing::debug!(error = %e, "Kill signal not delivered");
            }
            handle.wait().await
        }
    };
    reap_group(handle);
    reason
}

/// Kill whatever is left of the group after its leader has exited.
pub fn reap_group(handle: &dyn ProcessHandle) {
    if let Err(e) = handle.signal_group(GroupSignal::Kill) {
        tracing::debug!(pid = ?handle.id(), error = %e, "Group reap not delivered");
    }
}

/// Interrupt the child's group and escalate to kill after `grace`.
pub async fn terminate(handle: &dyn ProcessHandle, grace: Duration) -> ExitReason {
    if let Err(e) = handle.signal_group(GroupSignal::Interrupt) {
        tracing::debug!(error = %e, "Interrupt signal not delivered");
    }
    wait_or_kill(handle, grace).await
}

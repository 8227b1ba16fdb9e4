//! OS-backed launcher: one process group per child.
//!
//! On Unix the child is placed in a fresh process group and signals go to
//! the whole group with `killpg`, so shells, package-manager wrappers and
//! their descendants all stop together. Elsewhere the direct child is
//! killed.

use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
#[cfg(not(unix))]
use tokio::sync::Notify;

use super::{
    CommandSpec, ExitReason, GroupSignal, Launched, OutputStream, ProcessHandle, ProcessLauncher,
    SignalError, SpawnError,
};

/// Launches commands with `tokio::process` in their own process group.
#[derive(Debug, Clone, Copy, Default)]
pub struct GroupLauncher;

impl ProcessLauncher for GroupLauncher {
    fn launch(&self, spec: &CommandSpec) -> Result<Launched, SpawnError> {
        let mut cmd = Command::new(spec.program());
        cmd.args(spec.get_args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        for (key, value) in spec.get_env() {
            cmd.env(key, value);
        }

        if let Some(dir) = spec.get_working_dir() {
            cmd.current_dir(dir);
        }

        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd
            .spawn()
            .map_err(|e| SpawnError::from_io(spec.program(), e))?;

        let stdout = child
            .stdout
            .take()
            .map(|s| Box::new(s) as OutputStream);
        let stderr = child
            .stderr
            .take()
            .map(|s| Box::new(s) as OutputStream);

        tracing::debug!(
            pid = ?child.id(),
            command = %spec.display_line(),
            "Spawned process group"
        );

        Ok(Launched {
            handle: Arc::new(GroupHandle::new(child)),
            stdout,
            stderr,
        })
    }
}

struct WaitState {
    child: Child,
    exit: Option<ExitReason>,
}

/// Handle to a child started by [`GroupLauncher`].
pub struct GroupHandle {
    pid: Option<u32>,
    state: Mutex<WaitState>,
    #[cfg(not(unix))]
    kill_requested: Notify,
}

impl GroupHandle {
    fn new(child: Child) -> Self {
        Self {
            pid: child.id(),
            state: Mutex::new(WaitState { child, exit: None }),
            #[cfg(not(unix))]
            kill_requested: Notify::new(),
        }
    }
}

impl std::fmt::Debug for GroupHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GroupHandle").field("pid", &self.pid).finish()
    }
}

#[async_trait]
impl ProcessHandle for GroupHandle {
    fn id(&self) -> Option<u32> {
        self.pid
    }

    #[cfg(unix)]
    fn signal_group(&self, signal: GroupSignal) -> Result<(), SignalError> {
        use nix::errno::Errno;
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;

        let Some(pid) = self.pid else {
            return Ok(());
        };

        let sig = match signal {
            GroupSignal::Interrupt => Signal::SIGINT,
            GroupSignal::Kill => Signal::SIGKILL,
        };

        let pgid = Pid::from_raw(i32::try_from(pid).unwrap_or(i32::MAX));
        match killpg(pgid, sig) {
            Ok(()) | Err(Errno::ESRCH) => Ok(()),
            Err(errno) => Err(SignalError::Delivery {
                pgid: pid,
                source: errno.into(),
            }),
        }
    }

    #[cfg(not(unix))]
    fn signal_group(&self, _signal: GroupSignal) -> Result<(), SignalError> {
        self.kill_requested.notify_one();
        Ok(())
    }

    async fn wait(&self) -> ExitReason {
        let mut state = self.state.lock().await;
        if let Some(reason) = &state.exit {
            return reason.clone();
        }

        #[cfg(unix)]
        let result = state.child.wait().await;

        #[cfg(not(unix))]
        let result = loop {
            tokio::select! {
                result = state.child.wait() => break result,
                () = self.kill_requested.notified() => {
                    let _ = state.child.start_kill();
                }
            }
        };

        let reason = match result {
            Ok(status) => ExitReason::from_status(status),
            Err(e) => ExitReason::WaitFailed(e.to_string()),
        };
        state.exit = Some(reason.clone());
        reason
    }
}

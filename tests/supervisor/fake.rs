//! Scripted process launcher for driving supervisors without real children.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::time::Instant;

use devloop::process::{
    CommandSpec, ExitReason, GroupSignal, Launched, ProcessHandle, ProcessLauncher, SignalError,
    SpawnError, TermSignal,
};

/// How one launch behaves.
#[derive(Debug, Clone)]
pub struct Run {
    exit: Option<(Duration, ExitReason)>,
    ignore_interrupt: bool,
    fail_spawn: bool,
    stdout: &'static [u8],
}

impl Run {
    /// Runs until signalled.
    pub fn hang() -> Self {
        Self {
            exit: None,
            ignore_interrupt: false,
            fail_spawn: false,
            stdout: b"",
        }
    }

    /// Exits on its own after `after`.
    pub fn exit_after(after: Duration, reason: ExitReason) -> Self {
        Self {
            exit: Some((after, reason)),
            ..Self::hang()
        }
    }

    /// Exits with status 1 after `after`.
    pub fn crash_after(after: Duration) -> Self {
        Self::exit_after(after, ExitReason::Code(1))
    }

    /// Never starts.
    pub fn fail_spawn() -> Self {
        Self {
            fail_spawn: true,
            ..Self::hang()
        }
    }

    /// Only a kill stops it.
    pub fn ignoring_interrupt(mut self) -> Self {
        self.ignore_interrupt = true;
        self
    }

    pub fn with_stdout(mut self, stdout: &'static [u8]) -> Self {
        self.stdout = stdout;
        self
    }
}

/// Launcher that plays back a list of [`Run`]s, repeating the last one.
pub struct FakeLauncher {
    runs: Mutex<VecDeque<Run>>,
    last: Mutex<Option<Run>>,
    launches: Mutex<Vec<Instant>>,
    handles: Mutex<Vec<Arc<FakeHandle>>>,
    overlaps: AtomicUsize,
    next_pid: AtomicU32,
}

impl FakeLauncher {
    pub fn new(runs: Vec<Run>) -> Arc<Self> {
        Arc::new(Self {
            runs: Mutex::new(runs.into()),
            last: Mutex::new(None),
            launches: Mutex::new(Vec::new()),
            handles: Mutex::new(Vec::new()),
            overlaps: AtomicUsize::new(0),
            next_pid: AtomicU32::new(1000),
        })
    }

    /// Number of launch attempts, successful or not.
    pub fn launches(&self) -> usize {
        self.launches.lock().unwrap().len()
    }

    /// When each launch attempt happened.
    pub fn launch_times(&self) -> Vec<Instant> {
        self.launches.lock().unwrap().clone()
    }

    /// Handles of every child that was started.
    pub fn handles(&self) -> Vec<Arc<FakeHandle>> {
        self.handles.lock().unwrap().clone()
    }

    /// Launches that happened while an earlier child had not been waited on.
    pub fn overlapping_launches(&self) -> usize {
        self.overlaps.load(Ordering::SeqCst)
    }

    fn next_run(&self) -> Run {
        let mut last = self.last.lock().unwrap();
        if let Some(run) = self.runs.lock().unwrap().pop_front() {
            *last = Some(run.clone());
            return run;
        }
        last.clone().unwrap_or_else(Run::hang)
    }
}

impl ProcessLauncher for FakeLauncher {
    fn launch(&self, _spec: &CommandSpec) -> Result<Launched, SpawnError> {
        self.launches.lock().unwrap().push(Instant::now());
        if self.handles.lock().unwrap().iter().any(|h| !h.reaped()) {
            self.overlaps.fetch_add(1, Ordering::SeqCst);
        }
        let run = self.next_run();
        if run.fail_spawn {
            return Err(SpawnError::NotFound("fake".to_string()));
        }

        let (exit, _) = watch::channel(None);
        let handle = Arc::new(FakeHandle {
            pid: self.next_pid.fetch_add(1, Ordering::Relaxed),
            deadline: run
                .exit
                .clone()
                .map(|(after, reason)| (Instant::now() + after, reason)),
            ignore_interrupt: run.ignore_interrupt,
            exit,
            waited: AtomicBool::new(false),
            signals: Mutex::new(Vec::new()),
        });
        self.handles.lock().unwrap().push(Arc::clone(&handle));

        Ok(Launched {
            handle,
            stdout: Some(Box::new(run.stdout)),
            stderr: Some(Box::new(&b""[..])),
        })
    }
}

pub struct FakeHandle {
    pid: u32,
    deadline: Option<(Instant, ExitReason)>,
    ignore_interrupt: bool,
    exit: watch::Sender<Option<ExitReason>>,
    waited: AtomicBool,
    signals: Mutex<Vec<GroupSignal>>,
}

impl FakeHandle {
    /// Whether some `wait` call has returned the exit status.
    pub fn reaped(&self) -> bool {
        self.waited.load(Ordering::SeqCst)
    }

    /// Signals delivered to this child, in order.
    pub fn signals(&self) -> Vec<GroupSignal> {
        self.signals.lock().unwrap().clone()
    }

    fn finish(&self, reason: ExitReason) {
        self.exit.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(reason);
            true
        });
    }

    async fn exited(&self) -> ExitReason {
        let mut rx = self.exit.subscribe();
        loop {
            let current = rx.borrow_and_update().clone();
            if let Some(reason) = current {
                return reason;
            }
            let _ = rx.changed().await;
        }
    }
}

#[async_trait]
impl ProcessHandle for FakeHandle {
    fn id(&self) -> Option<u32> {
        Some(self.pid)
    }

    fn signal_group(&self, signal: GroupSignal) -> Result<(), SignalError> {
        self.signals.lock().unwrap().push(signal);
        match signal {
            GroupSignal::Interrupt if self.ignore_interrupt => {}
            GroupSignal::Interrupt => self.finish(ExitReason::Signaled(TermSignal::Interrupt)),
            GroupSignal::Kill => self.finish(ExitReason::Signaled(TermSignal::Kill)),
        }
        Ok(())
    }

    async fn wait(&self) -> ExitReason {
        let reason = match &self.deadline {
            Some((deadline, reason)) => {
                tokio::select! {
                    reason = self.exited() => reason,
                    () = tokio::time::sleep_until(*deadline) => {
                        self.finish(reason.clone());
                        self.exited().await
                    }
                }
            }
            None => self.exited().await,
        };
        self.waited.store(true, Ordering::SeqCst);
        reason
    }
}

//! Process-group control for supervised children.
//!
//! A [`ProcessLauncher`] starts one command in its own process group and
//! hands back a [`ProcessHandle`] that can signal the whole group and wait
//! for the leader to exit. [`GroupLauncher`] is the OS-backed implementation.

mod command;
mod error;
mod group;
mod handle;

pub use command::CommandSpec;
pub use error::{SignalError, SpawnError};
pub use group::{GroupHandle, GroupLauncher};
pub use handle::{
    reap_group, terminate, wait_or_kill, ExitReason, GroupSignal, Launched, OutputStream,
    ProcessHandle, ProcessLauncher, TermSignal, DEFAULT_GRACE_PERIOD,
};

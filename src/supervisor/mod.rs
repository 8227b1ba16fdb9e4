//! Per-role supervision: spawn, restart on change, back off on crash, give up.

mod backoff;
mod breaker;
mod error;
mod runner;
mod state;
mod trigger;

pub use backoff::{Backoff, BackoffPolicy};
pub use breaker::{BreakerPolicy, BreakerVerdict, HardExitBreaker};
pub use error::SupervisorError;
pub use runner::{ProcessSupervisor, SupervisorOptions};
pub use state::{SupervisorState, SupervisorStateMachine, SupervisorStats, TerminalReason};
pub use trigger::{forward_changes, RestartTrigger};

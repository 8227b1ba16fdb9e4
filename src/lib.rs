//! devloop - a development-mode process supervisor.
//!
//! Runs one supervised child per configured role, restarts it cleanly when
//! its sources change, backs off and eventually gives up when it keeps
//! crashing, and renders every role's output in one consolidated view.

pub mod config;
pub mod output;
pub mod process;
pub mod session;
pub mod status;
pub mod supervisor;
pub mod watcher;

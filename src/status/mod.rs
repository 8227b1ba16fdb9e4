//! Consolidated status for every supervised component.
//!
//! Each [`Component`] pushes [`StatusUpdate`]s onto one shared queue. The
//! [`StatusAggregator`] is the only consumer; it decides what reaches the
//! [`StatusRenderer`] and renders the one-time "all ready" summary.

mod aggregator;
mod component;
mod render;
mod update;

pub use aggregator::{StatusAggregator, DEFAULT_STATUS_QUEUE};
pub use component::Component;
pub use render::{Link, MemoryRenderer, Rendered, StatusRenderer, TerminalRenderer, TracingRenderer};
pub use update::{StatusUpdate, UpdateKind};

//! Source-tree watching.
//!
//! [`FileWatcher`] turns filesystem activity under a root directory into
//! debounced [`ChangeEvent`] batches filtered by include/exclude globs.

mod error;
mod file_watcher;
mod pattern;

pub use error::WatcherError;
pub use file_watcher::{ChangeEvent, FileWatcher, WatchSpec, DEFAULT_LULL, DEFAULT_WATCH_QUEUE};
pub use pattern::{GlobPattern, GlobSet};

//! Watcher error types.

use std::path::PathBuf;

/// Errors that can occur while setting up a file watcher.
///
/// All of these are raised at construction time; a running watcher reports
/// nothing but change batches.
#[derive(thiserror::Error, Debug)]
pub enum WatcherError {
    /// Watch root does not exist.
    #[error("Watch root not found: {0}")]
    RootMissing(PathBuf),

    /// Watch root exists but is not a directory.
    #[error("Watch root is not a directory: {0}")]
    RootNotDirectory(PathBuf),

    /// Watch root could not be read.
    #[error("Watch root unreadable: {path}: {source}")]
    RootUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// An include or exclude glob is malformed or could not be compiled.
    #[error("Invalid glob pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// Notify watcher error.
    #[error("File watcher error: {0}")]
    Notify(#[from] notify::Error),
}

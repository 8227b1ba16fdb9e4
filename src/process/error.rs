//! Process error types.

/// Error type for process spawning operations.
#[derive(thiserror::Error, Debug)]
pub enum SpawnError {
    /// The executable was not found.
    #[error("Executable not found: {0}")]
    NotFound(String),
    /// Permission denied when spawning.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),
    /// The command line had no program in it.
    #[error("Empty command line")]
    EmptyCommand,
    /// Other I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SpawnError {
    /// Create a `SpawnError` from an I/O error, classifying common cases.
    pub(crate) fn from_io(program: &str, err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(program.to_string()),
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied(program.to_string()),
            _ => Self::Io(err),
        }
    }
}

/// Error type for process-group signal delivery.
#[derive(thiserror::Error, Debug)]
pub enum SignalError {
    /// The signal could not be delivered to the group.
    #[error("Failed to signal process group {pgid}: {source}")]
    Delivery {
        pgid: u32,
        #[source]
        source: std::io::Error,
    },
}

//! Debounced, filtered directory watcher.
//!
//! Uses notify-debouncer-full so that a burst of edits inside the lull
//! window arrives as one batch, then filters the batch through the
//! include/exclude globs and forwards it on a bounded tokio channel.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use notify_debouncer_full::{
    new_debouncer,
    notify::{EventKind, RecommendedWatcher, RecursiveMode},
    DebounceEventResult, DebouncedEvent, Debouncer, RecommendedCache,
};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_stream::wrappers::ReceiverStream;

use super::error::WatcherError;
use super::pattern::GlobSet;

/// Default quiet time after the last change before a batch is emitted.
pub const DEFAULT_LULL: Duration = Duration::from_millis(100);

/// Default capacity of the change queue.
pub const DEFAULT_WATCH_QUEUE: usize = 1024;

/// A batch of changed paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    /// Changed paths, absolute, deduplicated, in first-seen order.
    pub paths: Vec<PathBuf>,
    /// When the batch was emitted.
    pub at: DateTime<Utc>,
}

/// What to watch and how.
#[derive(Debug, Clone)]
pub struct WatchSpec {
    pub root: PathBuf,
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    pub lull: Duration,
    pub capacity: usize,
}

impl WatchSpec {
    /// Watch everything under `root` with default lull and capacity.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            include: Vec::new(),
            exclude: Vec::new(),
            lull: DEFAULT_LULL,
            capacity: DEFAULT_WATCH_QUEUE,
        }
    }

    #[must_use]
    pub fn include(mut self, patterns: &[&str]) -> Self {
        self.include = patterns.iter().map(|s| (*s).to_string()).collect();
        self
    }

    #[must_use]
    pub fn exclude(mut self, patterns: &[&str]) -> Self {
        self.exclude = patterns.iter().map(|s| (*s).to_string()).collect();
        self
    }

    #[must_use]
    pub fn lull(mut self, lull: Duration) -> Self {
        self.lull = lull;
        self
    }
}

/// Watches a source tree and emits [`ChangeEvent`] batches.
///
/// The receiver returned by [`FileWatcher::new`] yields `None` once the
/// watcher is stopped or dropped.
pub struct FileWatcher {
    root: PathBuf,
    debouncer: Option<Debouncer<RecommendedWatcher, RecommendedCache>>,
}

impl FileWatcher {
    /// Start watching `spec.root`.
    ///
    /// # Errors
    ///
    /// Returns an error if the root is missing or unreadable, a glob is
    /// invalid, or the OS watcher cannot be created.
    pub fn new(spec: WatchSpec) -> Result<(Self, mpsc::Receiver<ChangeEvent>), WatcherError> {
        let root = validate_root(&spec.root)?;
        let globs = GlobSet::new(&spec.include, &spec.exclude)?;
        let (tx, rx) = mpsc::channel(spec.capacity.max(1));

        tracing::debug!(
            path = %root.display(),
            include = ?spec.include,
            exclude = ?spec.exclude,
            lull = ?spec.lull,
            "Watcher starting"
        );

        let handler_root = root.clone();
        let mut debouncer = new_debouncer(spec.lull, None, move |result: DebounceEventResult| {
            match result {
                Ok(events) => {
                    let Some(batch) = collect_batch(&handler_root, &globs, &events) else {
                        return;
                    };
                    tracing::trace!(paths = batch.paths.len(), "Change batch");
                    match tx.try_send(batch) {
                        Ok(()) => {}
                        Err(TrySendError::Full(_)) => {
                            tracing::warn!("Change queue full, dropping batch");
                        }
                        Err(TrySendError::Closed(_)) => {
                            tracing::trace!("Change queue closed");
                        }
                    }
                }
                Err(errors) => {
                    for error in errors {
                        tracing::warn!(error = %error, "File watcher error");
                    }
                }
            }
        })?;

        debouncer.watch(&root, RecursiveMode::Recursive)?;

        Ok((
            Self {
                root,
                debouncer: Some(debouncer),
            },
            rx,
        ))
    }

    /// Like [`FileWatcher::new`] but yields the batches as a stream.
    ///
    /// # Errors
    ///
    /// See [`FileWatcher::new`].
    pub fn stream(spec: WatchSpec) -> Result<(Self, ReceiverStream<ChangeEvent>), WatcherError> {
        let (watcher, rx) = Self::new(spec)?;
        Ok((watcher, ReceiverStream::new(rx)))
    }

    /// Stop watching. The change queue closes once the debouncer shuts down.
    pub fn stop(&mut self) {
        if let Some(debouncer) = self.debouncer.take() {
            debouncer.stop();
            tracing::debug!(path = %self.root.display(), "Watcher stopped");
        }
    }

    /// Whether [`FileWatcher::stop`] has been called.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.debouncer.is_none()
    }

    /// The canonical root being watched.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl std::fmt::Debug for FileWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileWatcher")
            .field("root", &self.root)
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

fn validate_root(root: &Path) -> Result<PathBuf, WatcherError> {
    let meta = std::fs::metadata(root).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => WatcherError::RootMissing(root.to_path_buf()),
        _ => WatcherError::RootUnreadable {
            path: root.to_path_buf(),
            source: e,
        },
    })?;

    if !meta.is_dir() {
        return Err(WatcherError::RootNotDirectory(root.to_path_buf()));
    }

    let unreadable = |source| WatcherError::RootUnreadable {
        path: root.to_path_buf(),
        source,
    };
    std::fs::read_dir(root).map_err(unreadable)?;
    std::fs::canonicalize(root).map_err(unreadable)
}

fn collect_batch(root: &Path, globs: &GlobSet, events: &[DebouncedEvent]) -> Option<ChangeEvent> {
    let mut paths: Vec<PathBuf> = Vec::new();

    for event in events {
        if matches!(event.kind, EventKind::Access(_)) {
            continue;
        }
        for path in &event.paths {
            let Ok(relative) = path.strip_prefix(root) else {
                continue;
            };
            if globs.accepts(relative) && !paths.contains(path) {
                paths.push(path.clone());
            }
        }
    }

    if paths.is_empty() {
        None
    } else {
        Some(ChangeEvent {
            paths,
            at: Utc::now(),
        })
    }
}

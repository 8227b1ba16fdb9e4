//! Component handles.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;

use super::StatusUpdate;

struct Inner {
    name: String,
    ready: AtomicBool,
    sender: Mutex<Option<mpsc::Sender<StatusUpdate>>>,
}

/// A named participant in the consolidated status view.
///
/// Cheap to clone; all clones share one readiness flag and one queue
/// reference. Once detached by [`StatusAggregator::stop`], every send is a
/// no-op.
///
/// [`StatusAggregator::stop`]: super::StatusAggregator::stop
#[derive(Clone)]
pub struct Component {
    inner: Arc<Inner>,
}

impl Component {
    pub(crate) fn new(name: impl Into<String>, sender: mpsc::Sender<StatusUpdate>) -> Self {
        Self {
            inner: Arc::new(Inner {
                name: name.into(),
                ready: AtomicBool::new(false),
                sender: Mutex::new(Some(sender)),
            }),
        }
    }

    /// A component attached to no queue.
    #[must_use]
    pub fn detached(name: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(Inner {
                name: name.into(),
                ready: AtomicBool::new(false),
                sender: Mutex::new(None),
            }),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Whether the aggregator has seen a Ready update from this component.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.inner.ready.load(Ordering::Acquire)
    }

    pub(crate) fn mark_ready(&self) {
        self.inner.ready.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn is_detached(&self) -> bool {
        self.sender().is_none()
    }

    pub(crate) fn detach(&self) {
        self.inner
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    /// Whether two handles refer to the same component.
    #[must_use]
    pub fn same_as(&self, other: &Component) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub async fn log(&self, text: impl Into<String>) {
        self.send(StatusUpdate::Log {
            component: self.clone(),
            text: text.into(),
        })
        .await;
    }

    pub async fn logerr(&self, text: impl Into<String>) {
        self.send(StatusUpdate::Logerr {
            component: self.clone(),
            text: text.into(),
        })
        .await;
    }

    pub async fn ready(&self) {
        self.send(StatusUpdate::Ready {
            component: self.clone(),
        })
        .await;
    }

    pub async fn restarted(&self) {
        self.send(StatusUpdate::Restarted {
            component: self.clone(),
        })
        .await;
    }

    fn sender(&self) -> Option<mpsc::Sender<StatusUpdate>> {
        self.inner
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    async fn send(&self, update: StatusUpdate) {
        let Some(tx) = self.sender() else {
            return;
        };
        // Closed queue means the aggregator is shutting down.
        let _ = tx.send(update).await;
    }
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Component")
            .field("name", &self.inner.name)
            .field("ready", &self.is_ready())
            .finish()
    }
}

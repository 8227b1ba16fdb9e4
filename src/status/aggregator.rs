//! Single consumer of the shared status queue.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::{Component, StatusRenderer, StatusUpdate};

/// Default capacity of the status queue.
pub const DEFAULT_STATUS_QUEUE: usize = 1024;

type Registry = Arc<Mutex<Vec<Component>>>;

/// Collects updates from every component and renders the consolidated view.
///
/// Updates are processed strictly in queue order. The first time every
/// registered component has reported ready, the renderer's `all_ready`
/// summary fires; it never fires again. Until then plain `Log` output is
/// held back (unless `debug` is set) while `Logerr` output always shows.
pub struct StatusAggregator {
    registry: Registry,
    tx: Option<mpsc::Sender<StatusUpdate>>,
    rx: Option<mpsc::Receiver<StatusUpdate>>,
    consumer: Option<Consumer>,
    task: Option<JoinHandle<Consumer>>,
    close: CancellationToken,
    all_ready: Arc<AtomicBool>,
}

impl StatusAggregator {
    /// Create an aggregator. Nothing is consumed until [`start`](Self::start).
    #[must_use]
    pub fn new(renderer: Arc<dyn StatusRenderer>, capacity: usize, debug: bool) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let registry: Registry = Arc::new(Mutex::new(Vec::new()));
        let all_ready = Arc::new(AtomicBool::new(false));

        Self {
            consumer: Some(Consumer {
                registry: Arc::clone(&registry),
                renderer,
                debug,
                all_ready: Arc::clone(&all_ready),
            }),
            registry,
            tx: Some(tx),
            rx: Some(rx),
            task: None,
            close: CancellationToken::new(),
            all_ready,
        }
    }

    /// Register a component. Registering after [`stop`](Self::stop) yields
    /// a detached component.
    pub fn add(&self, name: impl Into<String>) -> Component {
        let comp = match &self.tx {
            Some(tx) => Component::new(name, tx.clone()),
            None => Component::detached(name),
        };
        self.lock_registry().push(comp.clone());
        comp
    }

    /// Spawn the consumer task. Calling twice has no effect.
    pub fn start(&mut self) {
        let (Some(consumer), Some(rx)) = (self.consumer.take(), self.rx.take()) else {
            return;
        };
        let close = self.close.clone();
        self.task = Some(tokio::spawn(consumer.run(rx, close)));
    }

    /// Whether the all-ready summary has been rendered.
    #[must_use]
    pub fn all_ready(&self) -> bool {
        self.all_ready.load(Ordering::Acquire)
    }

    /// Snapshot of registered components.
    #[must_use]
    pub fn components(&self) -> Vec<Component> {
        self.lock_registry().clone()
    }

    /// Drain the queue, detach every component and release the queue.
    ///
    /// Safe whether or not the aggregator was started and whether or not
    /// any component ever became ready.
    pub async fn stop(mut self) {
        self.tx = None;
        self.close.cancel();

        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "Status consumer task failed");
            }
        } else if let (Some(mut consumer), Some(rx)) = (self.consumer.take(), self.rx.take()) {
            consumer.drain(rx).await;
        }

        for comp in self.lock_registry().iter() {
            comp.detach();
        }
        tracing::debug!("Status aggregator stopped");
    }

    fn lock_registry(&self) -> std::sync::MutexGuard<'_, Vec<Component>> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

struct Consumer {
    registry: Registry,
    renderer: Arc<dyn StatusRenderer>,
    debug: bool,
    all_ready: Arc<AtomicBool>,
}

impl Consumer {
    async fn run(mut self, mut rx: mpsc::Receiver<StatusUpdate>, close: CancellationToken) -> Self {
        loop {
            tokio::select! {
                biased;

                update = rx.recv() => {
                    let Some(update) = update else { break };
                    self.process(&update);
                }
                () = close.cancelled() => {
                    self.drain(rx).await;
                    return self;
                }
            }
        }
        self
    }

    async fn drain(&mut self, mut rx: mpsc::Receiver<StatusUpdate>) {
        rx.close();
        while let Some(update) = rx.recv().await {
            self.process(&update);
        }
    }

    fn process(&mut self, update: &StatusUpdate) {
        match update {
            StatusUpdate::Ready { component } => {
                component.mark_ready();

                let names = {
                    let registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
                    if !registry.iter().all(Component::is_ready) {
                        return;
                    }
                    registry.iter().map(|c| c.name().to_string()).collect::<Vec<_>>()
                };

                if self.all_ready.swap(true, Ordering::AcqRel) {
                    self.renderer.refreshed(component.name());
                } else {
                    tracing::info!(components = ?names, "All components ready");
                    self.renderer.all_ready(&names);
                }
            }
            StatusUpdate::Restarted { component } => {
                if self.all_ready.load(Ordering::Acquire) {
                    self.renderer.refreshed(component.name());
                }
            }
            StatusUpdate::Log { component, text } => {
                if self.all_ready.load(Ordering::Acquire) || self.debug {
                    self.render_lines(component, text, false);
                }
            }
            StatusUpdate::Logerr { component, text } => {
                self.render_lines(component, text, true);
            }
        }
    }

    fn render_lines(&self, component: &Component, text: &str, is_err: bool) {
        for line in text.trim_end_matches('\n').split('\n') {
            self.renderer
                .line(component.name(), line.trim_end_matches('\r'), is_err);
        }
    }
}

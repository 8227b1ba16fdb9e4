//! Forwards child output to a [`Component`] and spots readiness sentinels.
//!
//! Supervised commands are arbitrary programs with no health-check channel,
//! so readiness is inferred from text: the first line containing any
//! configured sentinel marks the component Ready, later matches (after a
//! restart) mark it Restarted.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::task::JoinHandle;

use crate::process::OutputStream;
use crate::status::Component;

/// Longest chunk forwarded at once. Output without newlines is split here.
pub const MAX_CHUNK: usize = 64 * 1024;

/// Which pipe a chunk came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputSource {
    Stdout,
    Stderr,
}

/// Remembers whether a component has ever been ready.
///
/// Shared across every run of one supervised role.
#[derive(Debug, Default)]
pub struct ReadinessLatch {
    started_once: AtomicBool,
}

impl ReadinessLatch {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Emit Ready the first time, Restarted afterwards.
    pub async fn signal(&self, component: &Component) {
        if self.started_once.swap(true, Ordering::AcqRel) {
            tracing::debug!(component = component.name(), "Component restarted");
            component.restarted().await;
        } else {
            tracing::debug!(component = component.name(), "Component ready");
            component.ready().await;
        }
    }

    #[must_use]
    pub fn has_started(&self) -> bool {
        self.started_once.load(Ordering::Acquire)
    }
}

/// Wraps a child's output pipes.
#[derive(Debug, Clone)]
pub struct OutputClassifier {
    component: Component,
    sentinels: Arc<[String]>,
    latch: Arc<ReadinessLatch>,
}

impl OutputClassifier {
    #[must_use]
    pub fn new(component: Component, sentinels: Vec<String>, latch: Arc<ReadinessLatch>) -> Self {
        Self {
            component,
            sentinels: sentinels.into(),
            latch,
        }
    }

    /// Whether readiness is detected from output at all.
    #[must_use]
    pub fn detects_readiness(&self) -> bool {
        !self.sentinels.is_empty()
    }

    #[must_use]
    pub fn latch(&self) -> &Arc<ReadinessLatch> {
        &self.latch
    }

    #[must_use]
    pub fn component(&self) -> &Component {
        &self.component
    }

    /// Spawn one forwarding task per pipe.
    pub fn attach(
        &self,
        stdout: Option<OutputStream>,
        stderr: Option<OutputStream>,
    ) -> Vec<JoinHandle<()>> {
        [
            stdout.map(|s| (s, OutputSource::Stdout)),
            stderr.map(|s| (s, OutputSource::Stderr)),
        ]
        .into_iter()
        .flatten()
        .map(|(stream, source)| {
            let this = self.clone();
            tokio::spawn(async move { this.forward(stream, source).await })
        })
        .collect()
    }

    /// Read `stream` to EOF, classifying each line. Lines longer than
    /// [`MAX_CHUNK`] arrive as several chunks.
    pub async fn forward(&self, stream: OutputStream, source: OutputSource) {
        let mut reader = BufReader::new(stream);
        let mut buf = Vec::new();

        loop {
            buf.clear();
            let mut chunk = (&mut reader).take(MAX_CHUNK as u64);
            match chunk.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    let text = String::from_utf8_lossy(&buf);
                    self.classify(&text, source).await;
                }
                Err(e) => {
                    tracing::debug!(
                        component = self.component.name(),
                        error = %e,
                        "Output stream read failed"
                    );
                    break;
                }
            }
        }
    }

    /// Forward one chunk and check it for a sentinel.
    pub async fn classify(&self, text: &str, source: OutputSource) {
        let ready = self.sentinels.iter().any(|s| text.contains(s.as_str()));

        match source {
            OutputSource::Stdout => self.component.log(text).await,
            OutputSource::Stderr => self.component.logerr(text).await,
        }

        if ready {
            self.latch.signal(&self.component).await;
        }
    }
}

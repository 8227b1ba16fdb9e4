//! Presentation of the consolidated status.
//!
//! The aggregator decides *what* to show; a [`StatusRenderer`] decides *how*.

use std::io::{self, Write};
use std::sync::{Mutex, PoisonError};

use chrono::Utc;
use owo_colors::OwoColorize;
use serde::{Deserialize, Serialize};

/// A labelled URL listed in the all-ready summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub label: String,
    pub url: String,
}

/// Draws aggregator output.
pub trait StatusRenderer: Send + Sync {
    /// Every registered component reported ready for the first time.
    fn all_ready(&self, components: &[String]);

    /// A component restarted after the system was already up.
    fn refreshed(&self, component: &str);

    /// One line of child output.
    fn line(&self, component: &str, line: &str, is_err: bool);
}

/// Get current timestamp in the same format as tracing.
fn timestamp() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()
}

/// Colored human-facing renderer writing to stderr.
#[derive(Debug, Clone, Default)]
pub struct TerminalRenderer {
    title: String,
    links: Vec<Link>,
}

impl TerminalRenderer {
    #[must_use]
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            links: Vec::new(),
        }
    }

    /// Links printed under the all-ready banner.
    #[must_use]
    pub fn with_links(mut self, links: Vec<Link>) -> Self {
        self.links = links;
        self
    }

    fn label_width(&self) -> usize {
        self.links.iter().map(|l| l.label.len()).max().unwrap_or(0)
    }
}

impl StatusRenderer for TerminalRenderer {
    fn all_ready(&self, components: &[String]) {
        let mut err = io::stderr().lock();
        let _ = writeln!(err);
        let _ = writeln!(
            err,
            "{} {} {} {}",
            timestamp().dimmed(),
            "[READY]".green().bold(),
            self.title.blue().bold(),
            format!("({})", components.join(", ")).dimmed()
        );
        let width = self.label_width();
        for link in &self.links {
            let _ = writeln!(
                err,
                "    {:<width$}  {}",
                link.label.bold(),
                link.url.dimmed()
            );
        }
        let _ = writeln!(err);
        let _ = err.flush();
    }

    fn refreshed(&self, component: &str) {
        let mut err = io::stderr().lock();
        let _ = writeln!(
            err,
            "{} {} {}",
            timestamp().dimmed(),
            "[REFRESH]".cyan().bold(),
            format!("{component} refreshed").dimmed()
        );
        let _ = err.flush();
    }

    fn line(&self, component: &str, line: &str, is_err: bool) {
        let tag = format!("[{component}]");
        let mut err = io::stderr().lock();
        if is_err {
            let _ = writeln!(err, "{} {}", tag.red(), line);
        } else {
            let _ = writeln!(err, "{} {}", tag.dimmed(), line);
        }
        let _ = err.flush();
    }
}

/// Renderer that emits tracing events instead of drawing.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingRenderer;

impl StatusRenderer for TracingRenderer {
    fn all_ready(&self, components: &[String]) {
        tracing::info!(components = ?components, "All components ready");
    }

    fn refreshed(&self, component: &str) {
        tracing::info!(component, "Component refreshed");
    }

    fn line(&self, component: &str, line: &str, is_err: bool) {
        if is_err {
            tracing::warn!(component, "{line}");
        } else {
            tracing::info!(component, "{line}");
        }
    }
}

/// What a [`MemoryRenderer`] saw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rendered {
    AllReady(Vec<String>),
    Refreshed(String),
    Line {
        component: String,
        line: String,
        is_err: bool,
    },
}

/// Renderer that records output in memory, for headless hosts and tests.
#[derive(Debug, Default)]
pub struct MemoryRenderer {
    entries: Mutex<Vec<Rendered>>,
}

impl MemoryRenderer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything rendered so far.
    #[must_use]
    pub fn entries(&self) -> Vec<Rendered> {
        self.lock().clone()
    }

    /// Number of all-ready summaries rendered.
    #[must_use]
    pub fn all_ready_count(&self) -> usize {
        self.lock()
            .iter()
            .filter(|e| matches!(e, Rendered::AllReady(_)))
            .count()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Rendered>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl StatusRenderer for MemoryRenderer {
    fn all_ready(&self, components: &[String]) {
        self.lock().push(Rendered::AllReady(components.to_vec()));
    }

    fn refreshed(&self, component: &str) {
        self.lock().push(Rendered::Refreshed(component.to_string()));
    }

    fn line(&self, component: &str, line: &str, is_err: bool) {
        self.lock().push(Rendered::Line {
            component: component.to_string(),
            line: line.to_string(),
            is_err,
        });
    }
}

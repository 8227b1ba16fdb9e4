//! Messages flowing from components to the aggregator.

use std::fmt;

use super::Component;

/// Discriminant of a [`StatusUpdate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpdateKind {
    Log,
    Logerr,
    Ready,
    Restarted,
}

impl fmt::Display for UpdateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Log => "log",
            Self::Logerr => "logerr",
            Self::Ready => "ready",
            Self::Restarted => "restarted",
        })
    }
}

/// One event from a component.
#[derive(Debug, Clone)]
pub enum StatusUpdate {
    /// Standard output text.
    Log { component: Component, text: String },
    /// Standard error text.
    Logerr { component: Component, text: String },
    /// The component finished booting.
    Ready { component: Component },
    /// The component came back after a restart.
    Restarted { component: Component },
}

impl StatusUpdate {
    #[must_use]
    pub fn kind(&self) -> UpdateKind {
        match self {
            Self::Log { .. } => UpdateKind::Log,
            Self::Logerr { .. } => UpdateKind::Logerr,
            Self::Ready { .. } => UpdateKind::Ready,
            Self::Restarted { .. } => UpdateKind::Restarted,
        }
    }

    #[must_use]
    pub fn component(&self) -> &Component {
        match self {
            Self::Log { component, .. }
            | Self::Logerr { component, .. }
            | Self::Ready { component }
            | Self::Restarted { component } => component,
        }
    }

    /// Text payload for the log kinds.
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Log { text, .. } | Self::Logerr { text, .. } => Some(text),
            Self::Ready { .. } | Self::Restarted { .. } => None,
        }
    }
}

//! Hard-exit circuit breaker.
//!
//! Keeps a rolling count of hard exits. If more than `window` has passed
//! since the previous hard exit the count starts over. Once the count
//! reaches `threshold` the breaker trips and the supervisor gives up.

use std::time::Duration;

use tokio::time::Instant;

/// Breaker parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerPolicy {
    pub threshold: u32,
    pub window: Duration,
}

impl Default for BreakerPolicy {
    fn default() -> Self {
        Self {
            threshold: 3,
            window: Duration::from_secs(6),
        }
    }
}

/// Result of recording one hard exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerVerdict {
    /// Keep retrying. `window_reset` is set when this exit opened a new window.
    Retry { count: u32, window_reset: bool },
    /// Threshold reached inside one window.
    Trip { count: u32 },
}

#[derive(Debug, Clone)]
pub struct HardExitBreaker {
    policy: BreakerPolicy,
    count: u32,
    last: Option<Instant>,
}

impl HardExitBreaker {
    #[must_use]
    pub fn new(policy: BreakerPolicy) -> Self {
        Self {
            policy,
            count: 0,
            last: None,
        }
    }

    /// Record a hard exit at `now`.
    pub fn record(&mut self, now: Instant) -> BreakerVerdict {
        let window_reset = self
            .last
            .map_or(true, |last| now.saturating_duration_since(last) > self.policy.window);
        if window_reset {
            self.count = 0;
        }

        self.count = self.count.saturating_add(1);
        self.last = Some(now);

        if self.count >= self.policy.threshold {
            BreakerVerdict::Trip { count: self.count }
        } else {
            BreakerVerdict::Retry {
                count: self.count,
                window_reset,
            }
        }
    }

    #[must_use]
    pub fn count(&self) -> u32 {
        self.count
    }

    #[must_use]
    pub fn last_hard_exit(&self) -> Option<Instant> {
        self.last
    }

    #[must_use]
    pub fn policy(&self) -> &BreakerPolicy {
        &self.policy
    }
}

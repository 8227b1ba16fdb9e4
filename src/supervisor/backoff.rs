//! Restart delay policy.
//!
//! The delay for attempt `n` is `min × factor^n`, clamped to `max`. With
//! jitter enabled the result is drawn uniformly from `[min, delay]`, so the
//! jittered value never exceeds the un-jittered curve and never feeds back
//! into later attempts.

use std::time::Duration;

use rand::Rng;

/// Backoff parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    /// Delay before the first retry.
    pub min: Duration,
    /// Upper bound on any delay.
    pub max: Duration,
    /// Multiplicative growth per attempt.
    pub factor: f64,
    /// Randomise each delay between `min` and the computed value.
    pub jitter: bool,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            min: Duration::from_millis(500),
            max: Duration::from_secs(12),
            factor: 1.5,
            jitter: true,
        }
    }
}

impl BackoffPolicy {
    /// Un-jittered delay for a 0-indexed attempt.
    #[must_use]
    pub fn base(&self, attempt: u32) -> Duration {
        let min = self.min.min(self.max);
        let exp = i32::try_from(attempt).unwrap_or(i32::MAX);
        let secs = min.as_secs_f64() * self.factor.powi(exp);

        if !secs.is_finite() || secs < 0.0 || secs > self.max.as_secs_f64() {
            self.max
        } else {
            Duration::from_secs_f64(secs)
        }
    }

    /// Delay for a 0-indexed attempt, with jitter applied if enabled.
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        let base = self.base(attempt);
        let min = self.min.min(base);
        if !self.jitter || base <= min {
            return base;
        }
        rand::thread_rng().gen_range(min..=base)
    }
}

/// Attempt counter over a [`BackoffPolicy`].
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: BackoffPolicy,
    attempt: u32,
}

impl Backoff {
    #[must_use]
    pub fn new(policy: BackoffPolicy) -> Self {
        Self { policy, attempt: 0 }
    }

    /// Delay for the next retry; advances the attempt counter.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.policy.delay(self.attempt);
        self.attempt = self.attempt.saturating_add(1);
        delay
    }

    /// Go back to the minimum delay.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    #[must_use]
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    #[must_use]
    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }
}

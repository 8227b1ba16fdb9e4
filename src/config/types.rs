//! Configuration types.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::process::{CommandSpec, SpawnError};
use crate::status::{Link, DEFAULT_STATUS_QUEUE};
use crate::supervisor::{BackoffPolicy, BreakerPolicy, SupervisorOptions};
use crate::watcher::{WatchSpec, DEFAULT_LULL, DEFAULT_WATCH_QUEUE};

use super::ConfigError;

/// Top-level development session configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DevConfig {
    /// Show stdout lines before every component is ready.
    #[serde(default)]
    pub debug: bool,
    /// Interrupt-to-kill grace period in milliseconds.
    #[serde(default = "default_grace_ms")]
    pub grace_ms: u64,
    /// Capacity of the status update queue.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Links listed in the all-ready summary.
    #[serde(default)]
    pub links: Vec<Link>,
    #[serde(default)]
    pub backoff: BackoffConfig,
    #[serde(default)]
    pub breaker: BreakerConfig,
    #[serde(default)]
    pub roles: Vec<RoleConfig>,
}

fn default_grace_ms() -> u64 {
    5000
}

fn default_queue_capacity() -> usize {
    DEFAULT_STATUS_QUEUE
}

impl Default for DevConfig {
    fn default() -> Self {
        Self {
            debug: false,
            grace_ms: default_grace_ms(),
            queue_capacity: default_queue_capacity(),
            links: Vec::new(),
            backoff: BackoffConfig::default(),
            breaker: BreakerConfig::default(),
            roles: Vec::new(),
        }
    }
}

impl DevConfig {
    /// Check the invariants serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` describing the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.roles.is_empty() {
            return Err(ConfigError::Invalid("no roles configured".to_string()));
        }

        let mut seen = HashSet::new();
        for role in &self.roles {
            if role.name.trim().is_empty() {
                return Err(ConfigError::Invalid("role name must not be empty".to_string()));
            }
            if !seen.insert(role.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate role name `{}`",
                    role.name
                )));
            }
            if role.dev_cmd.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "role `{}` has an empty dev_cmd",
                    role.name
                )));
            }
        }

        if self.backoff.factor.is_nan() || self.backoff.factor < 1.0 {
            return Err(ConfigError::Invalid(format!(
                "backoff.factor must be at least 1, got {}",
                self.backoff.factor
            )));
        }
        if self.backoff.min_ms > self.backoff.max_ms {
            return Err(ConfigError::Invalid(format!(
                "backoff.min_ms ({}) exceeds backoff.max_ms ({})",
                self.backoff.min_ms, self.backoff.max_ms
            )));
        }
        if self.breaker.threshold == 0 {
            return Err(ConfigError::Invalid(
                "breaker.threshold must be at least 1".to_string(),
            ));
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "queue_capacity must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    #[must_use]
    pub fn grace(&self) -> Duration {
        Duration::from_millis(self.grace_ms)
    }

    /// Supervisor tunables for `role`.
    #[must_use]
    pub fn supervisor_options(&self, role: &RoleConfig) -> SupervisorOptions {
        SupervisorOptions {
            backoff: self.backoff.policy(),
            breaker: self.breaker.policy(),
            grace: self.grace(),
            ready_sentinels: role.ready_sentinels.clone(),
        }
    }
}

/// Restart backoff settings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    pub min_ms: u64,
    pub max_ms: u64,
    pub factor: f64,
    pub jitter: bool,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            min_ms: 500,
            max_ms: 12_000,
            factor: 1.5,
            jitter: true,
        }
    }
}

impl BackoffConfig {
    #[must_use]
    pub fn policy(&self) -> BackoffPolicy {
        BackoffPolicy {
            min: Duration::from_millis(self.min_ms),
            max: Duration::from_millis(self.max_ms),
            factor: self.factor,
            jitter: self.jitter,
        }
    }
}

/// Hard-exit circuit breaker settings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerConfig {
    pub threshold: u32,
    pub window_ms: u64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            threshold: 3,
            window_ms: 6000,
        }
    }
}

impl BreakerConfig {
    #[must_use]
    pub fn policy(&self) -> BreakerPolicy {
        BreakerPolicy {
            threshold: self.threshold,
            window: Duration::from_millis(self.window_ms),
        }
    }
}

/// One supervised role.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleConfig {
    pub name: String,
    /// Working directory of the command.
    #[serde(default = "default_role_path")]
    pub path: PathBuf,
    /// Literal dev-mode command line.
    pub dev_cmd: String,
    /// Appended to the command line before spawn.
    #[serde(default)]
    pub extra_args: Vec<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Run through `$SHELL -c`.
    #[serde(default)]
    pub shell: bool,
    /// Output substrings that mean the role finished booting.
    #[serde(default)]
    pub ready_sentinels: Vec<String>,
    /// Restart on source changes when present.
    #[serde(default)]
    pub watch: Option<WatchConfig>,
}

fn default_role_path() -> PathBuf {
    PathBuf::from(".")
}

impl RoleConfig {
    /// Build the command this role spawns.
    ///
    /// # Errors
    ///
    /// Returns `SpawnError::EmptyCommand` for a blank `dev_cmd`.
    pub fn command(&self) -> Result<CommandSpec, SpawnError> {
        let spec = if self.shell {
            CommandSpec::from_shell_line(&self.dev_cmd, &self.extra_args)?
        } else {
            CommandSpec::from_line(&self.dev_cmd, &self.extra_args)?
        };

        Ok(self
            .env
            .iter()
            .fold(spec.working_dir(&self.path), |spec, (k, v)| spec.env(k, v)))
    }

    /// Watch settings resolved against the role's working directory.
    #[must_use]
    pub fn watch_spec(&self) -> Option<WatchSpec> {
        self.watch.as_ref().map(|w| w.spec(&self.path))
    }
}

/// Source watching for one role.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Relative to the role's `path`.
    pub dir: PathBuf,
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    pub lull_ms: u64,
    pub queue_capacity: usize,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("src"),
            include: Vec::new(),
            exclude: Vec::new(),
            lull_ms: u64::try_from(DEFAULT_LULL.as_millis()).unwrap_or(100),
            queue_capacity: DEFAULT_WATCH_QUEUE,
        }
    }
}

impl WatchConfig {
    #[must_use]
    pub fn spec(&self, base: &Path) -> WatchSpec {
        WatchSpec {
            root: base.join(&self.dir),
            include: self.include.clone(),
            exclude: self.exclude.clone(),
            lull: Duration::from_millis(self.lull_ms),
            capacity: self.queue_capacity.max(1),
        }
    }
}

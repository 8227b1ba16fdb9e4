//! Configuration file loader.

use std::path::{Path, PathBuf};

use super::DevConfig;

/// Configuration loader that searches multiple locations.
#[derive(Debug)]
pub struct ConfigLoader {
    /// Search paths in order of priority.
    search_paths: Vec<PathBuf>,
    /// Set by [`ConfigLoader::with_path`]; the file must then exist.
    explicit: bool,
}

impl ConfigLoader {
    /// Create a new config loader with default search paths.
    #[must_use]
    pub fn new() -> Self {
        let mut search_paths = Vec::new();

        // 1. Current directory: devloop.toml
        search_paths.push(PathBuf::from("devloop.toml"));

        // 2. User config directory: ~/.config/devloop/config.toml
        if let Some(config_dir) = dirs::config_dir() {
            search_paths.push(config_dir.join("devloop").join("config.toml"));
        }

        Self {
            search_paths,
            explicit: false,
        }
    }

    /// Create a config loader for one specific file, which must exist.
    #[must_use]
    pub fn with_path(path: PathBuf) -> Self {
        Self {
            search_paths: vec![path],
            explicit: true,
        }
    }

    /// Load and validate configuration from the first available file.
    ///
    /// When searching and no file is present the defaults are validated,
    /// which fails because they configure no roles.
    ///
    /// # Errors
    ///
    /// Returns an error if an explicit path is missing, if a config file
    /// cannot be read or parsed, or if the result is invalid.
    pub fn load(&self) -> Result<DevConfig, ConfigError> {
        if self.explicit {
            let config = self
                .search_paths
                .first()
                .map_or_else(|| Ok(DevConfig::default()), |p| Self::load_from_path(p))?;
            config.validate()?;
            return Ok(config);
        }

        let config = match self.find_config_file() {
            Some(path) => {
                tracing::debug!(path = %path.display(), "Loading config file");
                Self::load_from_path(&path)?
            }
            None => {
                tracing::debug!("No config file found, using defaults");
                DevConfig::default()
            }
        };

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific path without validating it.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_from_path(path: &Path) -> Result<DevConfig, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Get the search paths for debugging.
    #[must_use]
    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }

    /// Find the first config file that exists.
    #[must_use]
    pub fn find_config_file(&self) -> Option<PathBuf> {
        self.search_paths.iter().find(|p| p.exists()).cloned()
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Errors that can occur during configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

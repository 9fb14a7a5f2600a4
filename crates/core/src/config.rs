//! Configuration for the decision engine
//!
//! Loaded from a TOML file; every field is optional.
//!
//! ```toml
//! repositoryRoot = "/src/monorepo"
//! maxParallel = 8
//! storeTimeoutSecs = 10
//!
//! [logging]
//! level = "debug"
//! format = "json"
//! ```

use crate::resolver::DEFAULT_DECLARATION_CACHE_CAPACITY;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    /// Repository root (default: current directory)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repository_root: Option<PathBuf>,

    /// Maximum tasks evaluated concurrently
    pub max_parallel: usize,

    /// Declaration results kept by the resolver
    pub declaration_cache_capacity: usize,

    /// Run store call timeout in seconds
    pub store_timeout_secs: u64,

    /// Where task-info descriptors are written (default: `<tmp>/cairn/task-info`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_info_dir: Option<PathBuf>,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            repository_root: None,
            max_parallel: 4,
            declaration_cache_capacity: DEFAULT_DECLARATION_CACHE_CAPACITY,
            store_timeout_secs: 30,
            task_info_dir: None,
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Create a config for the repository at `root`
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            repository_root: Some(root.into()),
            ..Default::default()
        }
    }

    /// Load and validate a TOML config file
    ///
    /// # Errors
    ///
    /// Returns [`Error::Filesystem`] if the file cannot be read, and
    /// [`Error::Configuration`] if it is malformed or invalid.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::filesystem(None, e, path, "read"))?;
        let config = Self::from_toml_str(&content)?;
        tracing::debug!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Parse and validate TOML config text
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the text is malformed or invalid.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| Error::configuration(format!("invalid configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] for a zero `maxParallel` or
    /// `declarationCacheCapacity`.
    pub fn validate(&self) -> Result<()> {
        if self.max_parallel == 0 {
            return Err(Error::configuration("maxParallel must be at least 1"));
        }
        if self.declaration_cache_capacity == 0 {
            return Err(Error::configuration(
                "declarationCacheCapacity must be at least 1",
            ));
        }
        Ok(())
    }

    /// Set the repository root
    #[must_use]
    pub fn with_repository_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.repository_root = Some(root.into());
        self
    }

    /// Set the maximum parallel evaluations
    #[must_use]
    pub fn with_max_parallel(mut self, max_parallel: usize) -> Self {
        self.max_parallel = max_parallel;
        self
    }

    /// Set the declaration cache capacity
    #[must_use]
    pub fn with_declaration_cache_capacity(mut self, capacity: usize) -> Self {
        self.declaration_cache_capacity = capacity;
        self
    }

    /// Set the run store timeout
    #[must_use]
    pub fn with_store_timeout_secs(mut self, secs: u64) -> Self {
        self.store_timeout_secs = secs;
        self
    }

    /// Set the task-info descriptor directory
    #[must_use]
    pub fn with_task_info_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.task_info_dir = Some(dir.into());
        self
    }

    /// Effective repository root
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if no root is configured and the
    /// current directory is unavailable.
    pub fn repository_root(&self) -> Result<PathBuf> {
        match &self.repository_root {
            Some(root) => Ok(root.clone()),
            None => std::env::current_dir().map_err(|e| {
                Error::configuration(format!("cannot determine current directory: {e}"))
            }),
        }
    }

    /// Effective task-info descriptor directory
    #[must_use]
    pub fn effective_task_info_dir(&self) -> PathBuf {
        self.task_info_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("cairn/task-info"))
    }

    /// Run store call timeout
    #[must_use]
    pub const fn store_timeout(&self) -> Duration {
        Duration::from_secs(self.store_timeout_secs)
    }
}

/// Log level
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Everything
    Trace,
    /// Debug and above
    Debug,
    /// Info and above
    Info,
    /// Warnings and above
    #[default]
    Warn,
    /// Errors only
    Error,
}

impl LogLevel {
    /// Filter directive name
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Pretty-printed human-readable format
    #[default]
    Pretty,
    /// Compact single-line format
    Compact,
    /// Structured JSON format
    Json,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingConfig {
    /// Minimum level when no filter is given
    pub level: LogLevel,
    /// Output format
    pub format: LogFormat,
    /// Explicit `EnvFilter` directives, overriding `level` and `RUST_LOG`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
}

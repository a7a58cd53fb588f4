//! Configuration types for transfer operations.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Configuration for transfer operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    /// Attempts made by the retry wrapper before giving up.
    pub attempts: u32,
    /// Capacity of the byte-delta queue of a background transfer.
    pub queue_capacity: usize,
    /// TCP connect timeout in seconds.
    pub connect_timeout_secs: u64,
    /// Whole-request timeout in seconds. `None` disables it.
    pub timeout_secs: Option<u64>,
    /// How long idle pooled connections are kept, in seconds.
    pub pool_idle_timeout_secs: u64,
    /// User agent sent with every request.
    pub user_agent: String,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            attempts: 3,
            queue_capacity: 10_000,
            connect_timeout_secs: 30,
            timeout_secs: None,
            pool_idle_timeout_secs: 60,
            user_agent: concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl DownloadConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the number of attempts for retried downloads.
    #[must_use]
    pub const fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    /// Sets the byte-delta queue capacity.
    #[must_use]
    pub const fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Sets the connect timeout.
    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout_secs = timeout.as_secs();
        self
    }

    /// Sets the whole-request timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout_secs = match timeout {
            Some(t) => Some(t.as_secs()),
            None => None,
        };
        self
    }

    /// Connect timeout as a [`Duration`].
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Request timeout as a [`Duration`], if any.
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    /// Pool idle timeout as a [`Duration`].
    #[must_use]
    pub const fn pool_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.pool_idle_timeout_secs)
    }

    /// Checks values that would make a transfer impossible.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `attempts` or `queue_capacity` is zero.
    pub fn validate(&self) -> Result<()> {
        if self.attempts == 0 {
            return Err(Error::Config("attempts must be at least 1".to_string()));
        }
        if self.queue_capacity == 0 {
            return Err(Error::Config("queue_capacity must be at least 1".to_string()));
        }
        Ok(())
    }
}

/// Path configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathConfig {
    /// Directory where fetched artifacts are saved when none is given.
    pub download_dir: PathBuf,
}

impl Default for PathConfig {
    fn default() -> Self {
        Self {
            download_dir: PathBuf::from("."),
        }
    }
}

/// Complete application configuration combining download and path settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Download configuration.
    pub download: DownloadConfig,
    /// Path configuration.
    pub paths: PathConfig,
}

impl AppConfig {
    /// Creates a new config with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Default location of the config file, `<config_dir>/provision-dl/config.toml`.
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("provision-dl").join("config.toml"))
    }

    /// Loads configuration.
    ///
    /// An explicit `path` must exist. Without one, the default location is
    /// read if present and defaults are used otherwise.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if the
    /// resulting values fail validation.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_path().filter(|p| p.is_file()) {
                Some(path) => Self::from_file(&path)?,
                None => {
                    log::debug!("No config file found, using defaults");
                    Self::default()
                }
            },
        };
        config.download.validate()?;
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self> {
        log::debug!("Loading config from {}", path.display());
        let text = std::fs::read_to_string(path)?;
        toml::from_str(&text).map_err(|e| Error::Config(format!("{}: {e}", path.display())))
    }
}

//! Configuration structures and utilities
//!
//! Session tuning is plain data with defaults. Binaries may override it with a
//! JSON file:
//!
//! ```json
//! { "immediate_publish_limit": 50, "publish_interval_ms": 500 }
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read configuration file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("Invalid configuration JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid configuration value: {0}")]
    Invalid(String),
}

/// Tuning for one query session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Number of leading records that are published as soon as they arrive.
    pub immediate_publish_limit: usize,
    /// Minimum spacing between rate-limited publishes.
    pub publish_interval_ms: u64,
    /// Elapsed-time tick period.
    pub timer_tick_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            immediate_publish_limit: 100,
            publish_interval_ms: 250,
            timer_tick_ms: 10,
        }
    }
}

impl SessionConfig {
    /// Reads and validates a JSON configuration file. Missing fields take
    /// their default values.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.publish_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "publish_interval_ms must be greater than 0".into(),
            ));
        }
        if self.timer_tick_ms == 0 {
            return Err(ConfigError::Invalid(
                "timer_tick_ms must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    pub fn publish_interval(&self) -> Duration {
        Duration::from_millis(self.publish_interval_ms)
    }

    pub fn timer_tick(&self) -> Duration {
        Duration::from_millis(self.timer_tick_ms)
    }
}

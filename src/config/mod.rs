//! Executor configuration
//!
//! An [`ExecutorConfig`] is immutable for the lifetime of an executor. Values can come
//! from code, from any serde source, or from the environment via [`ExecutorConfig::from_env`].

use std::time::Duration;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

/// Environment variable for [`ExecutorConfig::max_retries`]
pub const ENV_MAX_RETRIES: &str = "STOCKRUNNER_MAX_RETRIES";
/// Environment variable for [`ExecutorConfig::retry_delay_ms`]
pub const ENV_RETRY_DELAY_MS: &str = "STOCKRUNNER_RETRY_DELAY_MS";
/// Environment variable for [`ExecutorConfig::max_retry_delay_ms`]
pub const ENV_MAX_RETRY_DELAY_MS: &str = "STOCKRUNNER_MAX_RETRY_DELAY_MS";

/// Configuration errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A value violates its constraint
    #[error("Invalid value for {field}: {reason}")]
    InvalidValue {
        /// Field name
        field: &'static str,
        /// What is wrong with it
        reason: String,
    },

    /// An environment variable could not be parsed
    #[error("Failed to parse {var}={value}")]
    Parse {
        /// Variable name
        var: &'static str,
        /// Raw value
        value: String,
    },
}

/// Retry configuration shared by every batch an executor runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Retries after the first attempt; an operation runs at most `max_retries + 1` times
    pub max_retries: u32,

    /// Base backoff delay in milliseconds
    pub retry_delay_ms: u64,

    /// Backoff ceiling in milliseconds
    pub max_retry_delay_ms: u64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay_ms: 1000,
            max_retry_delay_ms: 10_000,
        }
    }
}

impl ExecutorConfig {
    /// Set the retry count
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Set the base delay. Stored in whole milliseconds; sub-millisecond parts are dropped.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay_ms = delay.as_millis() as u64;
        self
    }

    /// Set the delay ceiling. Stored in whole milliseconds; sub-millisecond parts are dropped.
    pub fn with_max_retry_delay(mut self, delay: Duration) -> Self {
        self.max_retry_delay_ms = delay.as_millis() as u64;
        self
    }

    /// Base delay as a [`Duration`]
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Ceiling as a [`Duration`]
    pub fn max_retry_delay(&self) -> Duration {
        Duration::from_millis(self.max_retry_delay_ms)
    }

    /// Check the positivity constraints.
    ///
    /// A base delay above the ceiling is allowed; it only caps growth earlier.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retry_delay_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "retry_delay_ms",
                reason: "must be positive".to_string(),
            });
        }
        if self.max_retry_delay_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_retry_delay_ms",
                reason: "must be positive".to_string(),
            });
        }
        if self.retry_delay_ms > self.max_retry_delay_ms {
            warn!(
                retry_delay_ms = self.retry_delay_ms,
                max_retry_delay_ms = self.max_retry_delay_ms,
                "Base retry delay exceeds ceiling; every delay will be capped"
            );
        }
        Ok(())
    }

    /// Load from `STOCKRUNNER_*` environment variables over the defaults
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(value) = lookup(ENV_MAX_RETRIES) {
            config.max_retries = parse_var(ENV_MAX_RETRIES, value)?;
        }
        if let Some(value) = lookup(ENV_RETRY_DELAY_MS) {
            config.retry_delay_ms = parse_var(ENV_RETRY_DELAY_MS, value)?;
        }
        if let Some(value) = lookup(ENV_MAX_RETRY_DELAY_MS) {
            config.max_retry_delay_ms = parse_var(ENV_MAX_RETRY_DELAY_MS, value)?;
        }

        config.validate()?;
        Ok(config)
    }
}

fn parse_var<T: std::str::FromStr>(var: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Parse { var, value })
}

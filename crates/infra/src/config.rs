//! Projection configuration.
//!
//! Options can be built in code or read from the process environment:
//!
//! | variable | default |
//! |---|---|
//! | `STREAMLOG_PROJECTION_CACHE_SIZE` | 1000 |
//! | `STREAMLOG_PROJECTION_SLEEP_MS` | 100 |
//! | `STREAMLOG_PROJECTION_PERSIST_BLOCK_SIZE` | 1000 |

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const CACHE_SIZE_VAR: &str = "STREAMLOG_PROJECTION_CACHE_SIZE";
pub const SLEEP_MS_VAR: &str = "STREAMLOG_PROJECTION_SLEEP_MS";
pub const PERSIST_BLOCK_SIZE_VAR: &str = "STREAMLOG_PROJECTION_PERSIST_BLOCK_SIZE";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}: {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },

    #[error("{0} must be greater than 0")]
    ZeroSize(&'static str),
}

/// Tunables shared by every projection variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectionOptions {
    /// Capacity of the rolling cache of streams known to exist (emit/link_to).
    pub cache_size: usize,
    /// Idle sleep after a pass that found no events.
    pub sleep: Duration,
    /// Read-model flush interval, in handled events.
    pub persist_block_size: usize,
}

impl Default for ProjectionOptions {
    fn default() -> Self {
        Self {
            cache_size: 1000,
            sleep: Duration::from_millis(100),
            persist_block_size: 1000,
        }
    }
}

impl ProjectionOptions {
    pub fn with_cache_size(mut self, cache_size: usize) -> Self {
        self.cache_size = cache_size;
        self
    }

    pub fn with_sleep(mut self, sleep: Duration) -> Self {
        self.sleep = sleep;
        self
    }

    pub fn with_persist_block_size(mut self, persist_block_size: usize) -> Self {
        self.persist_block_size = persist_block_size;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache_size == 0 {
            return Err(ConfigError::ZeroSize("cache_size"));
        }
        if self.persist_block_size == 0 {
            return Err(ConfigError::ZeroSize("persist_block_size"));
        }
        Ok(())
    }

    /// Read options from `STREAMLOG_PROJECTION_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read options through an arbitrary key lookup (unset keys keep defaults).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let options = Self {
            cache_size: parse_var(&lookup, CACHE_SIZE_VAR)?.unwrap_or(defaults.cache_size),
            sleep: parse_var::<u64>(&lookup, SLEEP_MS_VAR)?
                .map(Duration::from_millis)
                .unwrap_or(defaults.sleep),
            persist_block_size: parse_var(&lookup, PERSIST_BLOCK_SIZE_VAR)?
                .unwrap_or(defaults.persist_block_size),
        };
        options.validate()?;
        Ok(options)
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>, ConfigError>
where
    T: core::str::FromStr,
    T::Err: core::fmt::Display,
{
    let Some(raw) = lookup(key) else {
        return Ok(None);
    };
    raw.trim()
        .parse::<T>()
        .map(Some)
        .map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            value: raw.clone(),
            reason: e.to_string(),
        })
}

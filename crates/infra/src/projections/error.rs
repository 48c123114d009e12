use thiserror::Error;

use streamlog_core::CoreError;
use streamlog_events::{MatcherError, PositionError, ReadModelError};

use crate::config::ConfigError;
use crate::event_store::EventStoreError;

/// Error type for projection configuration, execution and management.
///
/// - **Misconfiguration**: caller programming mistakes (configured twice, not at all)
/// - **NotFound**: unknown projection name
/// - **Unsupported**: the backend or projection variant cannot do this
/// - **InvalidArgument**: malformed names, patterns, pagination, options
#[derive(Debug, Error)]
pub enum ProjectionError {
    #[error("projection misconfigured: {0}")]
    Misconfiguration(String),

    #[error("projection not found: {0}")]
    NotFound(String),

    #[error("unsupported operation: {0}")]
    Unsupported(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("event store error: {0}")]
    EventStore(#[from] EventStoreError),

    #[error("read model error: {0}")]
    ReadModel(#[from] ReadModelError),

    #[error("position error: {0}")]
    Position(#[from] PositionError),

    #[error("projection registry failure: {0}")]
    Registry(String),

    #[error("handler failed: {0}")]
    Handler(String),
}

impl ProjectionError {
    pub fn misconfigured(msg: impl Into<String>) -> Self {
        Self::Misconfiguration(msg.into())
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported(msg.into())
    }

    /// Convenience for handlers reporting their own failures.
    pub fn handler(msg: impl Into<String>) -> Self {
        Self::Handler(msg.into())
    }
}

impl From<CoreError> for ProjectionError {
    fn from(err: CoreError) -> Self {
        Self::InvalidArgument(err.to_string())
    }
}

impl From<MatcherError> for ProjectionError {
    fn from(err: MatcherError) -> Self {
        Self::InvalidArgument(err.to_string())
    }
}

impl From<ConfigError> for ProjectionError {
    fn from(err: ConfigError) -> Self {
        Self::InvalidArgument(err.to_string())
    }
}

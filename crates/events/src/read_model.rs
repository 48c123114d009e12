//! Read model sink abstraction.
//!
//! A read model is an external materialized view fed by a projection. Writes
//! are two-phase: `stack()` queues an operation, `persist()` flushes the
//! queue. The projection decides when to flush (every block of handled events
//! and once at the end of every pass).
//!
//! This trait doesn't define how the view is stored; that is the caller's
//! concern. The caller owns the read model and shares it with the projection.

use std::sync::Arc;

use serde_json::Value as JsonValue;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReadModelError {
    /// A stacked operation name is not understood by this read model.
    #[error("unknown read model operation: {0}")]
    UnknownOperation(String),

    /// A stacked operation had unusable arguments.
    #[error("invalid arguments for {operation}: {reason}")]
    InvalidArguments { operation: String, reason: String },

    /// Storage-level failure (e.g. poisoned lock, lost connection).
    #[error("read model storage failure: {0}")]
    Storage(String),
}

/// External sink updated by a read-model projection.
pub trait ReadModel: Send + Sync {
    /// Create the underlying storage.
    fn init(&self) -> Result<(), ReadModelError>;

    fn is_initialized(&self) -> bool;

    /// Drop all data but keep the storage usable.
    fn reset(&self) -> Result<(), ReadModelError>;

    /// Remove the underlying storage.
    fn delete(&self) -> Result<(), ReadModelError>;

    /// Queue an operation for the next `persist()`.
    fn stack(&self, operation: &str, args: Vec<JsonValue>);

    /// Apply every queued operation, in order.
    fn persist(&self) -> Result<(), ReadModelError>;
}

impl<R> ReadModel for Arc<R>
where
    R: ReadModel + ?Sized,
{
    fn init(&self) -> Result<(), ReadModelError> {
        (**self).init()
    }

    fn is_initialized(&self) -> bool {
        (**self).is_initialized()
    }

    fn reset(&self) -> Result<(), ReadModelError> {
        (**self).reset()
    }

    fn delete(&self) -> Result<(), ReadModelError> {
        (**self).delete()
    }

    fn stack(&self, operation: &str, args: Vec<JsonValue>) {
        (**self).stack(operation, args)
    }

    fn persist(&self) -> Result<(), ReadModelError> {
        (**self).persist()
    }
}

//! Projection engines.
//!
//! Three variants share one run loop:
//! - [`Query`]: folds events into state, single pass
//! - [`Projector`]: can also write events back into the log
//! - [`ReadModelProjector`]: feeds an external [`ReadModel`](streamlog_events::ReadModel)
//!
//! The [`InMemoryProjectionManager`] creates engines bound to an event store
//! and reports on them by name.

mod context;
mod emitter;
mod engine;
mod error;
mod handle;
pub(crate) mod handler;
mod manager;
mod merged;
mod projector;
mod query;
mod read_model_projector;
pub(crate) mod selector;
mod stream_cache;

pub use context::{ControlRequest, ProjectionContext};
pub use emitter::Emitter;
pub use engine::ProjectionState;
pub use error::ProjectionError;
pub use handle::ProjectionHandle;
pub use handler::{EventHandlers, HandlerResult};
pub use manager::{InMemoryProjectionManager, ProjectionManager};
pub use merged::MergedStreamIterator;
pub use projector::Projector;
pub use query::Query;
pub use read_model_projector::ReadModelProjector;
pub use stream_cache::StreamCache;

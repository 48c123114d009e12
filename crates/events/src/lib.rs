//! Projection building blocks shared by every event log backend.
//!
//! Everything here is storage-agnostic: matching events, tracking how far a
//! projection got, and the contracts a projection talks to (read models,
//! cancellation).

pub mod matcher;
pub mod position;
pub mod read_model;
pub mod status;
pub mod stop;

pub use matcher::{
    Criterion, Field, FieldType, MatchValue, MatcherError, MessageProperty, MetadataMatcher,
    Operator,
};
pub use position::{Position, PositionError};
pub use read_model::{ReadModel, ReadModelError};
pub use status::ProjectionStatus;
pub use stop::StopToken;

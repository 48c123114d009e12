//! `streamlog-core` — event log building blocks.
//!
//! This crate contains **pure domain** primitives (no storage, no projection
//! machinery): stream names, events and their metadata.

pub mod error;
pub mod event;
pub mod id;
pub mod metadata;
pub mod stream;

pub use error::{CoreError, CoreResult};
pub use event::Event;
pub use id::EventId;
pub use metadata::{Metadata, MetadataValue};
pub use stream::{Stream, StreamName, category};

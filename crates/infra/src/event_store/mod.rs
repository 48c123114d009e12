//! Append-only event log boundary.
//!
//! This module defines the storage contract projections run against, and the
//! in-memory implementation of it.

pub mod in_memory;
pub mod query;
pub mod r#trait;

pub use in_memory::InMemoryEventStore;
pub use query::{Pagination, compile_pattern, natural_cmp, sort_natural};
pub use r#trait::{EventStore, EventStoreError, StoredEvent, TransactionalEventStore};

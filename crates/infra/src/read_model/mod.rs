//! Read model implementations fed by read-model projections.

pub mod in_memory;

pub use in_memory::InMemoryReadModel;

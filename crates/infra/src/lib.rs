//! Storage and projection runtime: the event log, projection engines and
//! read models.

pub mod config;
pub mod event_store;
pub mod projections;
pub mod read_model;

use std::sync::Arc;

use super::engine::{NoSink, ProjectionCore, ProjectionState, impl_projection_configuration};
use super::ProjectionError;
use crate::config::ProjectionOptions;
use crate::event_store::EventStore;

/// A read-only projection: folds events into in-memory state, nothing else.
///
/// `run()` is always a single pass. A query reading `from_streams` sees the
/// listed streams interleaved by sequence number.
pub struct Query<S> {
    core: ProjectionCore<S>,
}

impl<S: ProjectionState> Query<S> {
    pub fn new(
        name: impl Into<String>,
        store: Arc<dyn EventStore>,
        options: ProjectionOptions,
    ) -> Result<Self, ProjectionError> {
        let mut core = ProjectionCore::new(name, store, options)?;
        core.enable_merged_reads();
        Ok(Self { core })
    }

    pub fn run(&mut self) -> Result<(), ProjectionError> {
        self.core.run(false, &mut NoSink)
    }

    /// Forget positions and re-seed the state.
    pub fn reset(&mut self) -> Result<(), ProjectionError> {
        self.core.reset(&mut NoSink)
    }
}

impl_projection_configuration!(Query);

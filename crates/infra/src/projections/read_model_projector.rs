use std::sync::Arc;

use streamlog_events::ReadModel;

use super::engine::{
    ProjectionCore, ProjectionSink, ProjectionState, SinkParts, impl_projection_configuration,
};
use super::ProjectionError;
use crate::config::ProjectionOptions;
use crate::event_store::EventStore;

/// A projection feeding an external [`ReadModel`].
///
/// Handlers stack operations through `ctx.read_model()`. The read model is
/// initialized on first run and flushed every `persist_block_size` handled
/// events and at the end of every pass.
pub struct ReadModelProjector<S> {
    core: ProjectionCore<S>,
    sink: ReadModelSink,
}

struct ReadModelSink {
    read_model: Arc<dyn ReadModel>,
    persist_block_size: usize,
}

impl<S: ProjectionState> ReadModelProjector<S> {
    pub fn new(
        name: impl Into<String>,
        store: Arc<dyn EventStore>,
        read_model: Arc<dyn ReadModel>,
        options: ProjectionOptions,
    ) -> Result<Self, ProjectionError> {
        let core = ProjectionCore::new(name, store, options)?;
        let sink = ReadModelSink {
            read_model,
            persist_block_size: core.options().persist_block_size,
        };
        Ok(Self { core, sink })
    }

    pub fn run(&mut self, keep_running: bool) -> Result<(), ProjectionError> {
        self.core.run(keep_running, &mut self.sink)
    }

    /// Forget positions, re-seed the state and reset the read model.
    pub fn reset(&mut self) -> Result<(), ProjectionError> {
        self.core.reset(&mut self.sink)
    }

    /// Forget positions; with `include_emitted` the read model storage is deleted too.
    pub fn delete(&mut self, include_emitted: bool) -> Result<(), ProjectionError> {
        self.core.delete(&mut self.sink, include_emitted)
    }

    pub fn read_model(&self) -> &Arc<dyn ReadModel> {
        &self.sink.read_model
    }
}

impl_projection_configuration!(ReadModelProjector);

impl ProjectionSink for ReadModelSink {
    fn prepare(&mut self) -> Result<(), ProjectionError> {
        if !self.read_model.is_initialized() {
            self.read_model.init()?;
        }
        Ok(())
    }

    fn parts(&mut self) -> SinkParts<'_> {
        SinkParts {
            read_model: Some(self.read_model.as_ref()),
            persist_block_size: Some(self.persist_block_size),
            ..SinkParts::default()
        }
    }

    fn flush(&mut self) -> Result<(), ProjectionError> {
        self.read_model.persist()?;
        Ok(())
    }

    fn reset(&mut self) -> Result<(), ProjectionError> {
        self.read_model.reset()?;
        Ok(())
    }

    fn delete(&mut self, include_emitted: bool) -> Result<(), ProjectionError> {
        if include_emitted {
            self.read_model.delete()?;
        }
        Ok(())
    }
}

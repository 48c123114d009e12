use streamlog_core::{Event, StreamName};
use streamlog_events::{ReadModel, StopToken};

use super::emitter::Emitter;
use super::ProjectionError;

/// Control operation requested by a handler, applied once it returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlRequest {
    Reset,
    Delete { include_emitted: bool },
}

/// What a handler may see and do besides updating its state.
///
/// Built fresh for every handled event. Capabilities depend on the projection
/// variant: only projectors can `emit`/`link_to`, only read-model projections
/// expose a `read_model`.
pub struct ProjectionContext<'a> {
    stream_name: &'a StreamName,
    stop: &'a StopToken,
    control: &'a mut Option<ControlRequest>,
    emitter: Option<&'a mut Emitter>,
    read_model: Option<&'a dyn ReadModel>,
}

impl<'a> ProjectionContext<'a> {
    pub(crate) fn new(
        stream_name: &'a StreamName,
        stop: &'a StopToken,
        control: &'a mut Option<ControlRequest>,
        emitter: Option<&'a mut Emitter>,
        read_model: Option<&'a dyn ReadModel>,
    ) -> Self {
        Self {
            stream_name,
            stop,
            control,
            emitter,
            read_model,
        }
    }

    /// Stream the current event was read from.
    pub fn stream_name(&self) -> &StreamName {
        self.stream_name
    }

    /// Halt the run once this handler returns.
    pub fn stop(&mut self) {
        self.stop.request_stop();
    }

    /// Reset the projection once this handler returns.
    ///
    /// The state this handler returns is discarded.
    pub fn reset(&mut self) {
        *self.control = Some(ControlRequest::Reset);
    }

    /// Delete the projection once this handler returns, ending the run.
    pub fn delete(&mut self, include_emitted: bool) {
        *self.control = Some(ControlRequest::Delete { include_emitted });
    }

    pub fn emit(&mut self, event: Event) -> Result<(), ProjectionError> {
        self.emitter()?.emit(event)
    }

    pub fn link_to(&mut self, stream: &str, event: Event) -> Result<(), ProjectionError> {
        let stream = StreamName::new(stream)?;
        self.emitter()?.link_to(&stream, event)
    }

    pub fn read_model(&self) -> Result<&dyn ReadModel, ProjectionError> {
        self.read_model.ok_or_else(|| {
            ProjectionError::unsupported("read model is only available to read model projections")
        })
    }

    fn emitter(&mut self) -> Result<&mut Emitter, ProjectionError> {
        self.emitter
            .as_deref_mut()
            .ok_or_else(|| ProjectionError::unsupported("emit and link_to are only available to projectors"))
    }
}

impl core::fmt::Debug for ProjectionContext<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ProjectionContext")
            .field("stream_name", &self.stream_name)
            .field("control", &self.control)
            .field("can_emit", &self.emitter.is_some())
            .field("has_read_model", &self.read_model.is_some())
            .finish()
    }
}

use std::sync::Arc;

use streamlog_core::StreamName;

use super::emitter::Emitter;
use super::engine::{
    ProjectionCore, ProjectionSink, ProjectionState, SinkParts, impl_projection_configuration,
};
use super::ProjectionError;
use crate::config::ProjectionOptions;
use crate::event_store::EventStore;

/// A projection that writes events back into the log.
///
/// Its output stream is named after the projection and exists from the first
/// run on. Handlers append to it with `ctx.emit`, or to any other stream with
/// `ctx.link_to`.
pub struct Projector<S> {
    core: ProjectionCore<S>,
    emitter: Emitter,
}

impl<S: ProjectionState> Projector<S> {
    pub fn new(
        name: impl Into<String>,
        store: Arc<dyn EventStore>,
        options: ProjectionOptions,
    ) -> Result<Self, ProjectionError> {
        let core = ProjectionCore::new(name, store, options)?;
        let output = StreamName::new(core.name())?;
        let emitter = Emitter::new(core.store().clone(), output, core.options().cache_size);
        Ok(Self { core, emitter })
    }

    pub fn run(&mut self, keep_running: bool) -> Result<(), ProjectionError> {
        self.core.run(keep_running, &mut self.emitter)
    }

    /// Forget positions, re-seed the state and recreate the output stream empty.
    pub fn reset(&mut self) -> Result<(), ProjectionError> {
        self.core.reset(&mut self.emitter)?;
        self.emitter.ensure_output_stream()
    }

    /// Forget positions; with `include_emitted` the output stream is deleted too.
    pub fn delete(&mut self, include_emitted: bool) -> Result<(), ProjectionError> {
        self.core.delete(&mut self.emitter, include_emitted)
    }

    pub fn output_stream(&self) -> &StreamName {
        self.emitter.output_stream()
    }
}

impl_projection_configuration!(Projector);

impl ProjectionSink for Emitter {
    fn prepare(&mut self) -> Result<(), ProjectionError> {
        self.ensure_output_stream()
    }

    fn parts(&mut self) -> SinkParts<'_> {
        SinkParts {
            emitter: Some(self),
            ..SinkParts::default()
        }
    }

    fn reset(&mut self) -> Result<(), ProjectionError> {
        self.delete_output_stream()
    }

    fn delete(&mut self, include_emitted: bool) -> Result<(), ProjectionError> {
        if include_emitted {
            self.delete_output_stream()
        } else {
            self.clear_cache();
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_store::InMemoryEventStore;
    use crate::projections::EventHandlers;
    use serde_json::json;
    use streamlog_core::{Event, Stream};

    fn name(s: &str) -> StreamName {
        StreamName::new(s).unwrap()
    }

    fn setup() -> (Arc<InMemoryEventStore>, Projector<u64>) {
        let store = Arc::new(InMemoryEventStore::new());
        store
            .create(Stream::new(
                name("user-1"),
                ["Registered", "Renamed", "Registered"].map(|e| Event::new(e, json!({}))),
            ))
            .unwrap();
        let projector = Projector::new("registrations", store.clone(), ProjectionOptions::default()).unwrap();
        (store, projector)
    }

    #[test]
    fn emits_into_its_own_stream() {
        let (store, mut projector) = setup();
        projector
            .from_category("user")
            .unwrap()
            .when(EventHandlers::new().on("Registered", |ctx, count: &mut u64, event| {
                ctx.emit(Event::new("Counted", json!({ "from": event.id().to_string() })))?;
                Ok(Some(*count + 1))
            }))
            .unwrap();

        projector.run(false).unwrap();

        assert_eq!(*projector.state(), 2);
        assert_eq!(projector.output_stream().as_str(), "registrations");
        assert_eq!(store.load(&name("registrations"), 1, None, None).unwrap().len(), 2);
    }

    #[test]
    fn output_stream_exists_before_any_emit() {
        let (store, mut projector) = setup();
        projector
            .from_stream("user-1", None)
            .unwrap()
            .when_any(|_, _, _| Ok(None))
            .unwrap();

        projector.run(false).unwrap();
        assert!(store.has_stream(&name("registrations")));
        assert!(store.load(&name("registrations"), 1, None, None).unwrap().is_empty());
    }

    #[test]
    fn link_to_creates_target_streams() {
        let (store, mut projector) = setup();
        projector
            .from_stream("user-1", None)
            .unwrap()
            .when_any(|ctx, _, event| {
                ctx.link_to(&format!("by-type-{}", event.name()), event.clone())?;
                Ok(None)
            })
            .unwrap();

        projector.run(false).unwrap();
        assert_eq!(store.load(&name("by-type-Registered"), 1, None, None).unwrap().len(), 2);
        assert_eq!(store.load(&name("by-type-Renamed"), 1, None, None).unwrap().len(), 1);
    }

    #[test]
    fn reset_recreates_empty_output_stream() {
        let (store, mut projector) = setup();
        projector
            .from_stream("user-1", None)
            .unwrap()
            .when_any(|ctx, count, event| {
                ctx.emit(event.clone())?;
                Ok(Some(*count + 1))
            })
            .unwrap();

        projector.run(false).unwrap();
        assert_eq!(store.load(&name("registrations"), 1, None, None).unwrap().len(), 3);

        projector.reset().unwrap();
        assert_eq!(*projector.state(), 0);
        assert!(store.has_stream(&name("registrations")));
        assert!(store.load(&name("registrations"), 1, None, None).unwrap().is_empty());

        projector.run(false).unwrap();
        assert_eq!(store.load(&name("registrations"), 1, None, None).unwrap().len(), 3);
    }

    #[test]
    fn delete_with_emitted_events_drops_output_stream() {
        let (store, mut projector) = setup();
        projector
            .from_stream("user-1", None)
            .unwrap()
            .when_any(|ctx, _, event| {
                ctx.emit(event.clone())?;
                Ok(None)
            })
            .unwrap();

        projector.run(false).unwrap();
        projector.delete(false).unwrap();
        assert!(store.has_stream(&name("registrations")));
        assert!(projector.positions().is_empty());

        projector.delete(true).unwrap();
        assert!(!store.has_stream(&name("registrations")));
    }

    #[test]
    fn read_model_is_unsupported_in_projectors() {
        let (_, mut projector) = setup();
        projector
            .from_stream("user-1", None)
            .unwrap()
            .when_any(|ctx, _, _| {
                ctx.read_model()?;
                Ok(None)
            })
            .unwrap();

        assert!(matches!(projector.run(false), Err(ProjectionError::Unsupported(_))));
    }
}

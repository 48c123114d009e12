use std::sync::Arc;

use tracing::debug;

use streamlog_core::{Event, Stream, StreamName};

use super::stream_cache::StreamCache;
use super::ProjectionError;
use crate::event_store::{EventStore, EventStoreError};

/// Writes events produced by a projector back into the log.
///
/// Target streams are created on first use. Names known to exist are kept in
/// a bounded [`StreamCache`] so repeated writes skip the existence check.
pub struct Emitter {
    store: Arc<dyn EventStore>,
    output: StreamName,
    cache: StreamCache,
}

impl Emitter {
    pub(crate) fn new(store: Arc<dyn EventStore>, output: StreamName, cache_size: usize) -> Self {
        Self {
            store,
            output,
            cache: StreamCache::new(cache_size),
        }
    }

    /// The projector's own stream.
    pub fn output_stream(&self) -> &StreamName {
        &self.output
    }

    /// Append to the output stream.
    pub fn emit(&mut self, event: Event) -> Result<(), ProjectionError> {
        let output = self.output.clone();
        self.link_to(&output, event)
    }

    /// Append to an arbitrary stream, creating it if needed.
    pub fn link_to(&mut self, stream: &StreamName, event: Event) -> Result<(), ProjectionError> {
        if self.cache.contains(stream) || self.store.has_stream(stream) {
            self.store.append(stream, vec![event])?;
        } else {
            self.store.create(Stream::new(stream.clone(), [event]))?;
            debug!(stream = %stream, "stream created by projection");
        }
        self.cache.remember(stream.clone());
        Ok(())
    }

    pub(crate) fn ensure_output_stream(&mut self) -> Result<(), ProjectionError> {
        if self.cache.contains(&self.output) {
            return Ok(());
        }
        if !self.store.has_stream(&self.output) {
            self.store.create(Stream::empty(self.output.clone()))?;
            debug!(stream = %self.output, "projection output stream created");
        }
        self.cache.remember(self.output.clone());
        Ok(())
    }

    pub(crate) fn delete_output_stream(&mut self) -> Result<(), ProjectionError> {
        self.cache.clear();
        match self.store.delete(&self.output) {
            Ok(()) | Err(EventStoreError::StreamNotFound(_)) => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    pub(crate) fn clear_cache(&mut self) {
        self.cache.clear();
    }
}

impl core::fmt::Debug for Emitter {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Emitter")
            .field("output", &self.output)
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_store::InMemoryEventStore;
    use serde_json::json;

    fn name(s: &str) -> StreamName {
        StreamName::new(s).unwrap()
    }

    #[test]
    fn creates_target_once_then_appends() {
        let store = Arc::new(InMemoryEventStore::new());
        let mut emitter = Emitter::new(store.clone(), name("totals"), 10);

        emitter.emit(Event::new("Counted", json!({"n": 1}))).unwrap();
        emitter.emit(Event::new("Counted", json!({"n": 2}))).unwrap();
        emitter
            .link_to(&name("audit-1"), Event::new("Seen", json!({})))
            .unwrap();

        assert_eq!(store.load(&name("totals"), 1, None, None).unwrap().len(), 2);
        assert_eq!(store.load(&name("audit-1"), 1, None, None).unwrap().len(), 1);
    }

    #[test]
    fn output_stream_can_be_recreated() {
        let store = Arc::new(InMemoryEventStore::new());
        let mut emitter = Emitter::new(store.clone(), name("totals"), 10);

        emitter.ensure_output_stream().unwrap();
        assert!(store.has_stream(&name("totals")));

        emitter.delete_output_stream().unwrap();
        assert!(!store.has_stream(&name("totals")));
        // deleting again is harmless
        emitter.delete_output_stream().unwrap();

        emitter.emit(Event::new("Counted", json!({}))).unwrap();
        assert!(store.has_stream(&name("totals")));
    }
}

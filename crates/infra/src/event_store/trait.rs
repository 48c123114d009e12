use serde::{Deserialize, Serialize};
use thiserror::Error;

use std::sync::Arc;

use streamlog_core::{CoreError, Event, Metadata, Stream, StreamName};
use streamlog_events::{MatcherError, MetadataMatcher};

/// An event as stored in a stream, together with its sequence number.
///
/// ## Sequence Numbers
///
/// Sequence numbers are the 1-based position of the event in its stream:
/// - **Dense**: the n-th event of a stream has sequence number n
/// - **Stream-scoped**: every stream starts at 1
/// - **Immutable**: once assigned, a sequence number never changes
///
/// They are derived from the storage order, never from anything inside the
/// event payload or metadata. Projections use them as resume positions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEvent {
    pub sequence_number: u64,
    pub event: Event,
}

impl StoredEvent {
    pub fn new(sequence_number: u64, event: Event) -> Self {
        Self {
            sequence_number,
            event,
        }
    }

    pub fn into_event(self) -> Event {
        self.event
    }
}

/// Event store operation error.
///
/// - **StreamNotFound / StreamExistsAlready**: expected business outcomes the
///   caller branches on
/// - **Transaction***: begin/commit/rollback misuse
/// - **InvalidArgument**: bad pagination, malformed pattern, bad matcher
/// - **Storage**: the backend itself failed (e.g. poisoned lock)
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EventStoreError {
    #[error("stream not found: {0}")]
    StreamNotFound(StreamName),

    #[error("stream already exists: {0}")]
    StreamExistsAlready(StreamName),

    #[error("transaction already started")]
    TransactionAlreadyStarted,

    #[error("transaction not started")]
    TransactionNotStarted,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("storage failure: {0}")]
    Storage(String),
}

impl From<MatcherError> for EventStoreError {
    fn from(err: MatcherError) -> Self {
        match err {
            MatcherError::InvalidArgument(msg) => EventStoreError::InvalidArgument(msg),
        }
    }
}

impl From<CoreError> for EventStoreError {
    fn from(err: CoreError) -> Self {
        EventStoreError::InvalidArgument(err.to_string())
    }
}

/// Append-only, per-stream event log.
///
/// This is the only storage contract projections depend on. Any backend
/// (in-memory, SQL, remote) that honors it is a drop-in collaborator.
///
/// ## Event Streams
///
/// A stream is a named, ordered, append-only list of events plus a metadata
/// mapping. Within a stream, events have dense sequence numbers (1, 2, 3, ...).
///
/// ## Read Semantics
///
/// `load()` / `load_reverse()`:
/// - fail with `StreamNotFound` only when the stream itself is missing
/// - return an empty vector when nothing satisfies the bounds and matcher
/// - reject `from_number` / `count` of 0 with `InvalidArgument`
///
/// ## Enumeration
///
/// Stream and category names are visited in natural order (digit runs compare
/// numerically). `limit` must be at least 1; `offset` skips matching entries.
pub trait EventStore: Send + Sync {
    /// Create a stream with all its events and metadata.
    fn create(&self, stream: Stream) -> Result<(), EventStoreError>;

    /// Append events to an existing stream, preserving their order.
    fn append(&self, stream_name: &StreamName, events: Vec<Event>) -> Result<(), EventStoreError>;

    /// Events with `sequence_number >= from_number`, ascending.
    fn load(
        &self,
        stream_name: &StreamName,
        from_number: u64,
        count: Option<u64>,
        matcher: Option<&MetadataMatcher>,
    ) -> Result<Vec<StoredEvent>, EventStoreError>;

    /// Events with `sequence_number <= from_number` (default: last), descending.
    fn load_reverse(
        &self,
        stream_name: &StreamName,
        from_number: Option<u64>,
        count: Option<u64>,
        matcher: Option<&MetadataMatcher>,
    ) -> Result<Vec<StoredEvent>, EventStoreError>;

    fn delete(&self, stream_name: &StreamName) -> Result<(), EventStoreError>;

    fn has_stream(&self, stream_name: &StreamName) -> bool;

    fn fetch_stream_metadata(&self, stream_name: &StreamName) -> Result<Metadata, EventStoreError>;

    fn update_stream_metadata(
        &self,
        stream_name: &StreamName,
        metadata: Metadata,
    ) -> Result<(), EventStoreError>;

    /// Every stream name, in natural order.
    fn list_stream_names(&self) -> Vec<StreamName>;

    fn fetch_stream_names(
        &self,
        filter: Option<&StreamName>,
        matcher: Option<&MetadataMatcher>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<StreamName>, EventStoreError>;

    fn fetch_stream_names_regex(
        &self,
        pattern: &str,
        matcher: Option<&MetadataMatcher>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<StreamName>, EventStoreError>;

    fn fetch_category_names(
        &self,
        filter: Option<&str>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<String>, EventStoreError>;

    fn fetch_category_names_regex(
        &self,
        pattern: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<String>, EventStoreError>;
}

/// An event store that can stage writes and apply them atomically.
///
/// Transactions isolate multi-step writes of one logical operation; they are
/// not a concurrency primitive across threads.
pub trait TransactionalEventStore: EventStore {
    fn begin_transaction(&self) -> Result<(), EventStoreError>;

    fn commit(&self) -> Result<(), EventStoreError>;

    fn rollback(&self) -> Result<(), EventStoreError>;

    fn in_transaction(&self) -> bool;

    /// Run `f` inside a transaction: commit on `Ok`, roll back on `Err`.
    fn transactional<T, F>(&self, f: F) -> Result<T, EventStoreError>
    where
        Self: Sized,
        F: FnOnce(&Self) -> Result<T, EventStoreError>,
    {
        self.begin_transaction()?;
        match f(self) {
            Ok(value) => {
                self.commit()?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = self.rollback() {
                    tracing::warn!(error = %rollback_err, "rollback after failed transaction failed");
                }
                Err(err)
            }
        }
    }
}

impl<S> EventStore for Arc<S>
where
    S: EventStore + ?Sized,
{
    fn create(&self, stream: Stream) -> Result<(), EventStoreError> {
        (**self).create(stream)
    }

    fn append(&self, stream_name: &StreamName, events: Vec<Event>) -> Result<(), EventStoreError> {
        (**self).append(stream_name, events)
    }

    fn load(
        &self,
        stream_name: &StreamName,
        from_number: u64,
        count: Option<u64>,
        matcher: Option<&MetadataMatcher>,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        (**self).load(stream_name, from_number, count, matcher)
    }

    fn load_reverse(
        &self,
        stream_name: &StreamName,
        from_number: Option<u64>,
        count: Option<u64>,
        matcher: Option<&MetadataMatcher>,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        (**self).load_reverse(stream_name, from_number, count, matcher)
    }

    fn delete(&self, stream_name: &StreamName) -> Result<(), EventStoreError> {
        (**self).delete(stream_name)
    }

    fn has_stream(&self, stream_name: &StreamName) -> bool {
        (**self).has_stream(stream_name)
    }

    fn fetch_stream_metadata(&self, stream_name: &StreamName) -> Result<Metadata, EventStoreError> {
        (**self).fetch_stream_metadata(stream_name)
    }

    fn update_stream_metadata(
        &self,
        stream_name: &StreamName,
        metadata: Metadata,
    ) -> Result<(), EventStoreError> {
        (**self).update_stream_metadata(stream_name, metadata)
    }

    fn list_stream_names(&self) -> Vec<StreamName> {
        (**self).list_stream_names()
    }

    fn fetch_stream_names(
        &self,
        filter: Option<&StreamName>,
        matcher: Option<&MetadataMatcher>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<StreamName>, EventStoreError> {
        (**self).fetch_stream_names(filter, matcher, limit, offset)
    }

    fn fetch_stream_names_regex(
        &self,
        pattern: &str,
        matcher: Option<&MetadataMatcher>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<StreamName>, EventStoreError> {
        (**self).fetch_stream_names_regex(pattern, matcher, limit, offset)
    }

    fn fetch_category_names(
        &self,
        filter: Option<&str>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<String>, EventStoreError> {
        (**self).fetch_category_names(filter, limit, offset)
    }

    fn fetch_category_names_regex(
        &self,
        pattern: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<String>, EventStoreError> {
        (**self).fetch_category_names_regex(pattern, limit, offset)
    }
}

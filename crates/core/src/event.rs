use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::id::EventId;
use crate::metadata::{Metadata, MetadataValue};

/// Timestamp layout used when `created_at` is compared as a string.
///
/// Fixed width with microseconds, so lexical order is chronological order.
pub const CREATED_AT_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

/// An immutable event record.
///
/// Events are:
/// - **immutable** (treat them as facts; "adding metadata" yields a new value)
/// - **named** (the type name drives handler dispatch)
/// - stamped with a creation time at microsecond precision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    id: EventId,
    name: String,
    payload: JsonValue,
    metadata: Metadata,
    created_at: DateTime<Utc>,
}

impl Event {
    /// Create a new event with a fresh id and the current time.
    pub fn new(name: impl Into<String>, payload: JsonValue) -> Self {
        Self {
            id: EventId::new(),
            name: name.into(),
            payload,
            metadata: Metadata::new(),
            created_at: Utc::now().trunc_subsecs(6),
        }
    }

    /// Rebuild an event from its stored parts.
    pub fn from_parts(
        id: EventId,
        name: impl Into<String>,
        payload: JsonValue,
        metadata: Metadata,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            payload,
            metadata,
            created_at: created_at.trunc_subsecs(6),
        }
    }

    pub fn id(&self) -> EventId {
        self.id
    }

    /// Event type name (e.g. "UserCreated").
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn payload(&self) -> &JsonValue {
        &self.payload
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// `created_at` rendered with [`CREATED_AT_FORMAT`].
    pub fn created_at_string(&self) -> String {
        self.created_at.format(CREATED_AT_FORMAT).to_string()
    }

    /// Return a copy of this event carrying one more metadata entry.
    pub fn with_added_metadata(
        &self,
        key: impl Into<String>,
        value: impl Into<MetadataValue>,
    ) -> Self {
        let mut next = self.clone();
        next.metadata.insert(key, value);
        next
    }

    /// Return a copy of this event with its metadata replaced.
    pub fn with_metadata(&self, metadata: Metadata) -> Self {
        let mut next = self.clone();
        next.metadata = metadata;
        next
    }

    pub fn into_payload(self) -> JsonValue {
        self.payload
    }
}

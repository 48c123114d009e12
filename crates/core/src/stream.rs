//! Stream identity and the stream value handed to the log on creation.

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::event::Event;
use crate::metadata::Metadata;

/// Name of an event stream.
///
/// Non-empty; equality is exact string equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StreamName(String);

impl StreamName {
    pub fn new(name: impl Into<String>) -> CoreResult<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(CoreError::validation("stream name must not be empty"));
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Category of this stream (see [`category`]).
    pub fn category(&self) -> Option<&str> {
        category(&self.0)
    }
}

impl fmt::Display for StreamName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for StreamName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for StreamName {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for StreamName {
    type Error = CoreError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<StreamName> for String {
    fn from(value: StreamName) -> Self {
        value.0
    }
}

/// The prefix of a stream name before its first hyphen.
///
/// Names without a hyphen have no category.
pub fn category(stream_name: &str) -> Option<&str> {
    stream_name.split_once('-').map(|(prefix, _)| prefix)
}

/// A named sequence of events plus stream-level metadata.
///
/// Used to hand a complete stream to the log on creation; the log owns the
/// events from then on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stream {
    pub name: StreamName,
    pub events: Vec<Event>,
    pub metadata: Metadata,
}

impl Stream {
    pub fn new(name: StreamName, events: impl IntoIterator<Item = Event>) -> Self {
        Self {
            name,
            events: events.into_iter().collect(),
            metadata: Metadata::new(),
        }
    }

    /// A stream with no events.
    pub fn empty(name: StreamName) -> Self {
        Self::new(name, Vec::new())
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }
}

//! Per-stream projection progress.
//!
//! A [`Position`] records, for every tracked stream, the sequence number of
//! the last event a projection consumed (0 = nothing consumed yet). It is the
//! only thing a projection needs to resume exactly where it left off.

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use thiserror::Error;

use streamlog_core::StreamName;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PositionError {
    /// A stream was asked to move backwards (or stay in place).
    #[error("non-monotonic sequence on stream {stream}: last {last}, found {found}")]
    NonMonotonicSequence {
        stream: StreamName,
        last: u64,
        found: u64,
    },
}

/// Stream name → last consumed sequence number, in tracking order.
///
/// Tracking order matters: a projection visits streams in this order on
/// every pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Position {
    entries: Vec<(StreamName, u64)>,
}

impl Position {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last consumed sequence number, if the stream is tracked.
    pub fn get(&self, stream: &StreamName) -> Option<u64> {
        self.entries
            .iter()
            .find(|(name, _)| name == stream)
            .map(|(_, seq)| *seq)
    }

    pub fn contains(&self, stream: &StreamName) -> bool {
        self.get(stream).is_some()
    }

    /// Start tracking a stream at 0; no-op if already tracked.
    pub fn track(&mut self, stream: StreamName) {
        if !self.contains(&stream) {
            self.entries.push((stream, 0));
        }
    }

    /// Record that `sequence_number` was consumed from `stream`.
    ///
    /// Untracked streams are tracked on the fly. Moving backwards is refused.
    pub fn advance(&mut self, stream: &StreamName, sequence_number: u64) -> Result<(), PositionError> {
        match self.entries.iter_mut().find(|(name, _)| name == stream) {
            Some((_, last)) => {
                if sequence_number <= *last {
                    return Err(PositionError::NonMonotonicSequence {
                        stream: stream.clone(),
                        last: *last,
                        found: sequence_number,
                    });
                }
                *last = sequence_number;
            }
            None => self.entries.push((stream.clone(), sequence_number)),
        }
        Ok(())
    }

    /// Merge freshly resolved candidate streams into this position.
    ///
    /// Candidates come first, in the given order, keeping any stored position
    /// (new ones start at 0). Streams tracked before but no longer selected
    /// keep their position and follow the candidates.
    pub fn merge(&mut self, candidates: impl IntoIterator<Item = StreamName>) {
        let mut merged: Vec<(StreamName, u64)> = Vec::new();
        for stream in candidates {
            if merged.iter().any(|(name, _)| *name == stream) {
                continue;
            }
            let seq = self.get(&stream).unwrap_or(0);
            merged.push((stream, seq));
        }
        for (stream, seq) in self.entries.drain(..) {
            if !merged.iter().any(|(name, _)| *name == stream) {
                merged.push((stream, seq));
            }
        }
        self.entries = merged;
    }

    /// Rewind every tracked stream to 0, keeping the tracked set.
    pub fn rewind(&mut self) {
        for (_, seq) in &mut self.entries {
            *seq = 0;
        }
    }

    /// Forget every tracked stream.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (&StreamName, u64)> {
        self.entries.iter().map(|(name, seq)| (name, *seq))
    }

    pub fn streams(&self) -> impl Iterator<Item = &StreamName> {
        self.entries.iter().map(|(name, _)| name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Serialize for Position {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, seq) in &self.entries {
            map.serialize_entry(name.as_str(), seq)?;
        }
        map.end()
    }
}

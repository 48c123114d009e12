//! K-way merge of several streams' events.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, VecDeque};

use streamlog_core::StreamName;

use crate::event_store::StoredEvent;

/// Interleaves already-loaded streams by sequence number.
///
/// The smallest pending sequence number across all streams is yielded first;
/// ties go to the stream listed first. Each stream's own order is preserved.
#[derive(Debug)]
pub struct MergedStreamIterator {
    streams: Vec<(StreamName, VecDeque<StoredEvent>)>,
    heap: BinaryHeap<Reverse<(u64, usize)>>,
}

impl MergedStreamIterator {
    pub fn new(streams: Vec<(StreamName, Vec<StoredEvent>)>) -> Self {
        let streams: Vec<(StreamName, VecDeque<StoredEvent>)> = streams
            .into_iter()
            .map(|(name, events)| (name, VecDeque::from(events)))
            .collect();

        let heap = streams
            .iter()
            .enumerate()
            .filter_map(|(index, (_, events))| {
                events.front().map(|e| Reverse((e.sequence_number, index)))
            })
            .collect();

        Self { streams, heap }
    }

    /// Events not yet yielded.
    pub fn remaining(&self) -> usize {
        self.streams.iter().map(|(_, events)| events.len()).sum()
    }
}

impl Iterator for MergedStreamIterator {
    type Item = (StreamName, StoredEvent);

    fn next(&mut self) -> Option<Self::Item> {
        let Reverse((_, index)) = self.heap.pop()?;
        let (name, events) = &mut self.streams[index];
        let event = events.pop_front()?;
        if let Some(next) = events.front() {
            self.heap.push(Reverse((next.sequence_number, index)));
        }
        Some((name.clone(), event))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.remaining();
        (remaining, Some(remaining))
    }
}

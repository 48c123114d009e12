use std::collections::VecDeque;

use streamlog_core::StreamName;

/// Bounded rolling cache of stream names known to exist.
///
/// Lets `emit`/`link_to` skip the storage existence check once a stream is
/// known. When full, the oldest entry is evicted.
#[derive(Debug, Clone)]
pub struct StreamCache {
    capacity: usize,
    entries: VecDeque<StreamName>,
}

impl StreamCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity),
        }
    }

    pub fn contains(&self, stream: &StreamName) -> bool {
        self.entries.contains(stream)
    }

    /// Remember a stream, evicting the oldest entry when at capacity.
    pub fn remember(&mut self, stream: StreamName) {
        if self.contains(&stream) {
            return;
        }
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(stream);
    }

    pub fn forget(&mut self, stream: &StreamName) {
        self.entries.retain(|s| s != stream);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

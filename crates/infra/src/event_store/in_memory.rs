use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::debug;

use streamlog_core::{Event, Metadata, Stream, StreamName, category};
use streamlog_events::MetadataMatcher;

use super::query::{Pagination, compile_pattern, sort_natural};
use super::r#trait::{EventStore, EventStoreError, StoredEvent, TransactionalEventStore};

#[derive(Debug, Clone, Default)]
struct StreamData {
    events: Vec<Event>,
    metadata: Metadata,
}

/// Writes made while a transaction is open.
#[derive(Debug, Default)]
struct Staging {
    /// Streams created inside the transaction (replace same-named targets on commit).
    created: BTreeMap<StreamName, StreamData>,
    /// Events appended to already-committed streams.
    appended: BTreeMap<StreamName, Vec<Event>>,
}

#[derive(Debug, Default)]
struct State {
    streams: BTreeMap<StreamName, StreamData>,
    transaction: Option<Staging>,
}

/// In-memory event log with optional transactional staging.
///
/// Intended for tests/dev and as the reference backend for projections.
/// Reads (`load`, `has_stream`, enumeration) only ever see committed state.
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    state: RwLock<State>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, State>, EventStoreError> {
        self.state
            .read()
            .map_err(|_| EventStoreError::Storage("lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, State>, EventStoreError> {
        self.state
            .write()
            .map_err(|_| EventStoreError::Storage("lock poisoned".to_string()))
    }

    fn validate_bounds(from_number: Option<u64>, count: Option<u64>) -> Result<(), EventStoreError> {
        if from_number == Some(0) {
            return Err(EventStoreError::InvalidArgument(
                "from_number must be greater than or equal to 1".to_string(),
            ));
        }
        if count == Some(0) {
            return Err(EventStoreError::InvalidArgument(
                "count must be greater than or equal to 1".to_string(),
            ));
        }
        Ok(())
    }

    fn accepts(matcher: Option<&MetadataMatcher>, event: &Event) -> bool {
        matcher.is_none_or(|m| m.matches(event))
    }

    fn take_count(count: Option<u64>) -> usize {
        count
            .map(|c| usize::try_from(c).unwrap_or(usize::MAX))
            .unwrap_or(usize::MAX)
    }
}

impl EventStore for InMemoryEventStore {
    fn create(&self, stream: Stream) -> Result<(), EventStoreError> {
        let mut state = self.write()?;
        let name = stream.name;

        let staged = state
            .transaction
            .as_ref()
            .is_some_and(|tx| tx.created.contains_key(&name));
        if staged || state.streams.contains_key(&name) {
            return Err(EventStoreError::StreamExistsAlready(name));
        }

        let data = StreamData {
            events: stream.events,
            metadata: stream.metadata,
        };

        match state.transaction.as_mut() {
            Some(tx) => {
                debug!(stream = %name, events = data.events.len(), "stream creation staged");
                tx.created.insert(name, data);
            }
            None => {
                debug!(stream = %name, events = data.events.len(), "stream created");
                state.streams.insert(name, data);
            }
        }
        Ok(())
    }

    fn append(&self, stream_name: &StreamName, events: Vec<Event>) -> Result<(), EventStoreError> {
        let mut state = self.write()?;
        let State {
            streams,
            transaction,
        } = &mut *state;

        match transaction.as_mut() {
            Some(tx) => {
                if let Some(staged) = tx.created.get_mut(stream_name) {
                    staged.events.extend(events);
                } else if streams.contains_key(stream_name) {
                    tx.appended
                        .entry(stream_name.clone())
                        .or_default()
                        .extend(events);
                } else {
                    return Err(EventStoreError::StreamNotFound(stream_name.clone()));
                }
            }
            None => {
                let data = streams
                    .get_mut(stream_name)
                    .ok_or_else(|| EventStoreError::StreamNotFound(stream_name.clone()))?;
                data.events.extend(events);
            }
        }
        Ok(())
    }

    fn load(
        &self,
        stream_name: &StreamName,
        from_number: u64,
        count: Option<u64>,
        matcher: Option<&MetadataMatcher>,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        Self::validate_bounds(Some(from_number), count)?;

        let state = self.read()?;
        let data = state
            .streams
            .get(stream_name)
            .ok_or_else(|| EventStoreError::StreamNotFound(stream_name.clone()))?;

        Ok(data
            .events
            .iter()
            .zip(1u64..)
            .filter(|(event, seq)| *seq >= from_number && Self::accepts(matcher, event))
            .take(Self::take_count(count))
            .map(|(event, seq)| StoredEvent::new(seq, event.clone()))
            .collect())
    }

    fn load_reverse(
        &self,
        stream_name: &StreamName,
        from_number: Option<u64>,
        count: Option<u64>,
        matcher: Option<&MetadataMatcher>,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        Self::validate_bounds(from_number, count)?;

        let state = self.read()?;
        let data = state
            .streams
            .get(stream_name)
            .ok_or_else(|| EventStoreError::StreamNotFound(stream_name.clone()))?;

        let from_number = from_number.unwrap_or(data.events.len() as u64);

        Ok(data
            .events
            .iter()
            .enumerate()
            .map(|(idx, event)| (event, idx as u64 + 1))
            .rev()
            .filter(|(event, seq)| *seq <= from_number && Self::accepts(matcher, event))
            .take(Self::take_count(count))
            .map(|(event, seq)| StoredEvent::new(seq, event.clone()))
            .collect())
    }

    fn delete(&self, stream_name: &StreamName) -> Result<(), EventStoreError> {
        let mut state = self.write()?;

        let committed = state.streams.remove(stream_name).is_some();
        let staged = match state.transaction.as_mut() {
            Some(tx) => {
                tx.appended.remove(stream_name);
                tx.created.remove(stream_name).is_some()
            }
            None => false,
        };

        if !committed && !staged {
            return Err(EventStoreError::StreamNotFound(stream_name.clone()));
        }
        debug!(stream = %stream_name, "stream deleted");
        Ok(())
    }

    fn has_stream(&self, stream_name: &StreamName) -> bool {
        self.read()
            .map(|state| state.streams.contains_key(stream_name))
            .unwrap_or(false)
    }

    fn fetch_stream_metadata(&self, stream_name: &StreamName) -> Result<Metadata, EventStoreError> {
        let state = self.read()?;
        if let Some(data) = state.streams.get(stream_name) {
            return Ok(data.metadata.clone());
        }
        state
            .transaction
            .as_ref()
            .and_then(|tx| tx.created.get(stream_name))
            .map(|data| data.metadata.clone())
            .ok_or_else(|| EventStoreError::StreamNotFound(stream_name.clone()))
    }

    fn update_stream_metadata(
        &self,
        stream_name: &StreamName,
        metadata: Metadata,
    ) -> Result<(), EventStoreError> {
        let mut state = self.write()?;
        let State {
            streams,
            transaction,
        } = &mut *state;

        let target = match streams.get_mut(stream_name) {
            Some(data) => data,
            None => transaction
                .as_mut()
                .and_then(|tx| tx.created.get_mut(stream_name))
                .ok_or_else(|| EventStoreError::StreamNotFound(stream_name.clone()))?,
        };
        target.metadata = metadata;
        Ok(())
    }

    fn list_stream_names(&self) -> Vec<StreamName> {
        let mut names: Vec<StreamName> = match self.read() {
            Ok(state) => state.streams.keys().cloned().collect(),
            Err(_) => return Vec::new(),
        };
        sort_natural(&mut names);
        names
    }

    fn fetch_stream_names(
        &self,
        filter: Option<&StreamName>,
        matcher: Option<&MetadataMatcher>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<StreamName>, EventStoreError> {
        let page = Pagination::new(limit, offset)?;
        let state = self.read()?;

        let metadata_ok = |data: &StreamData| matcher.is_none_or(|m| m.matches_metadata(&data.metadata));

        if let Some(name) = filter {
            return Ok(match state.streams.get(name) {
                Some(data) if metadata_ok(data) => vec![name.clone()],
                _ => Vec::new(),
            });
        }

        let mut names: Vec<&StreamName> = state
            .streams
            .iter()
            .filter(|(_, data)| metadata_ok(data))
            .map(|(name, _)| name)
            .collect();
        sort_natural(&mut names);

        Ok(page.apply(names.into_iter().cloned()))
    }

    fn fetch_stream_names_regex(
        &self,
        pattern: &str,
        matcher: Option<&MetadataMatcher>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<StreamName>, EventStoreError> {
        let page = Pagination::new(limit, offset)?;
        let re = compile_pattern(pattern)?;
        let state = self.read()?;

        let mut names: Vec<&StreamName> = state
            .streams
            .iter()
            .filter(|(name, data)| {
                re.is_match(name.as_str())
                    && matcher.is_none_or(|m| m.matches_metadata(&data.metadata))
            })
            .map(|(name, _)| name)
            .collect();
        sort_natural(&mut names);

        Ok(page.apply(names.into_iter().cloned()))
    }

    fn fetch_category_names(
        &self,
        filter: Option<&str>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<String>, EventStoreError> {
        let page = Pagination::new(limit, offset)?;
        let categories = self.categories()?;

        if let Some(wanted) = filter {
            return Ok(categories
                .into_iter()
                .filter(|c| c == wanted)
                .take(1)
                .collect());
        }

        Ok(page.apply(categories))
    }

    fn fetch_category_names_regex(
        &self,
        pattern: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<String>, EventStoreError> {
        let page = Pagination::new(limit, offset)?;
        let re = compile_pattern(pattern)?;
        let categories = self.categories()?;

        Ok(page.apply(categories.into_iter().filter(|c| re.is_match(c))))
    }
}

impl InMemoryEventStore {
    /// Deduplicated, naturally sorted category names of committed streams.
    fn categories(&self) -> Result<Vec<String>, EventStoreError> {
        let state = self.read()?;
        let mut categories: Vec<String> = state
            .streams
            .keys()
            .filter_map(|name| category(name.as_str()))
            .map(str::to_string)
            .collect();
        categories.sort();
        categories.dedup();
        sort_natural(&mut categories);
        Ok(categories)
    }
}

impl TransactionalEventStore for InMemoryEventStore {
    fn begin_transaction(&self) -> Result<(), EventStoreError> {
        let mut state = self.write()?;
        if state.transaction.is_some() {
            return Err(EventStoreError::TransactionAlreadyStarted);
        }
        state.transaction = Some(Staging::default());
        Ok(())
    }

    fn commit(&self) -> Result<(), EventStoreError> {
        let mut state = self.write()?;
        let staging = state
            .transaction
            .take()
            .ok_or(EventStoreError::TransactionNotStarted)?;

        let created = staging.created.len();
        let appended = staging.appended.len();

        for (name, data) in staging.created {
            state.streams.insert(name, data);
        }
        for (name, events) in staging.appended {
            state.streams.entry(name).or_default().events.extend(events);
        }

        debug!(created, appended, "transaction committed");
        Ok(())
    }

    fn rollback(&self) -> Result<(), EventStoreError> {
        let mut state = self.write()?;
        state
            .transaction
            .take()
            .ok_or(EventStoreError::TransactionNotStarted)?;
        debug!("transaction rolled back");
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        self.read()
            .map(|state| state.transaction.is_some())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use streamlog_events::Operator;

    fn name(s: &str) -> StreamName {
        StreamName::new(s).unwrap()
    }

    fn events(n: usize) -> Vec<Event> {
        (1..=n)
            .map(|i| Event::new("Happened", json!({ "n": i })))
            .collect()
    }

    fn payloads(loaded: &[StoredEvent]) -> Vec<i64> {
        loaded
            .iter()
            .map(|e| e.event.payload()["n"].as_i64().unwrap())
            .collect()
    }

    #[test]
    fn load_returns_events_in_order_and_reverse_in_reverse() {
        let store = InMemoryEventStore::new();
        store.create(Stream::new(name("user-1"), events(5))).unwrap();

        let forward = store.load(&name("user-1"), 1, None, None).unwrap();
        assert_eq!(payloads(&forward), vec![1, 2, 3, 4, 5]);
        assert_eq!(
            forward.iter().map(|e| e.sequence_number).collect::<Vec<_>>(),
            vec![1, 2, 3, 4, 5]
        );

        let backward = store.load_reverse(&name("user-1"), None, None, None).unwrap();
        assert_eq!(payloads(&backward), vec![5, 4, 3, 2, 1]);
    }

    #[test]
    fn load_honors_from_number_and_count() {
        let store = InMemoryEventStore::new();
        store.create(Stream::new(name("s"), events(10))).unwrap();

        let page = store.load(&name("s"), 4, Some(3), None).unwrap();
        assert_eq!(payloads(&page), vec![4, 5, 6]);

        let reverse_page = store.load_reverse(&name("s"), Some(4), Some(2), None).unwrap();
        assert_eq!(payloads(&reverse_page), vec![4, 3]);

        assert!(store.load(&name("s"), 11, None, None).unwrap().is_empty());
    }

    #[test]
    fn load_rejects_zero_bounds() {
        let store = InMemoryEventStore::new();
        store.create(Stream::new(name("s"), events(1))).unwrap();

        assert!(matches!(
            store.load(&name("s"), 0, None, None),
            Err(EventStoreError::InvalidArgument(_))
        ));
        assert!(matches!(
            store.load(&name("s"), 1, Some(0), None),
            Err(EventStoreError::InvalidArgument(_))
        ));
        assert!(matches!(
            store.load_reverse(&name("s"), Some(0), None, None),
            Err(EventStoreError::InvalidArgument(_))
        ));
    }

    #[test]
    fn matcher_filters_and_count_applies_to_matches() {
        let store = InMemoryEventStore::new();
        let tagged: Vec<Event> = (1..=6)
            .map(|i| {
                Event::new("Happened", json!({ "n": i }))
                    .with_added_metadata("even", i % 2 == 0)
            })
            .collect();
        store.create(Stream::new(name("s"), tagged)).unwrap();

        let matcher = MetadataMatcher::new()
            .with_metadata_match("even", Operator::Equals, true)
            .unwrap();

        let loaded = store.load(&name("s"), 1, Some(2), Some(&matcher)).unwrap();
        assert_eq!(payloads(&loaded), vec![2, 4]);
        assert_eq!(loaded[1].sequence_number, 4);

        let none = MetadataMatcher::new()
            .with_metadata_match("even", Operator::Equals, "yes")
            .unwrap();
        assert!(store.load(&name("s"), 1, None, Some(&none)).unwrap().is_empty());
    }

    #[test]
    fn reverse_load_stops_after_count_matches() {
        let store = InMemoryEventStore::new();
        let tagged: Vec<Event> = (1..=7)
            .map(|i| {
                Event::new("Happened", json!({ "n": i }))
                    .with_added_metadata("even", i % 2 == 0)
            })
            .collect();
        store.create(Stream::new(name("s"), tagged)).unwrap();

        let even = MetadataMatcher::new()
            .with_metadata_match("even", Operator::Equals, true)
            .unwrap();

        let latest = store.load_reverse(&name("s"), None, Some(2), Some(&even)).unwrap();
        assert_eq!(
            latest.iter().map(|e| e.sequence_number).collect::<Vec<_>>(),
            vec![6, 4]
        );

        let older = store.load_reverse(&name("s"), Some(3), None, Some(&even)).unwrap();
        assert_eq!(payloads(&older), vec![2]);
    }

    #[test]
    fn metadata_filtered_names_paginate_after_filtering() {
        let store = InMemoryEventStore::new();
        for i in 1..=6 {
            let kind = if i % 2 == 0 { "user" } else { "order" };
            store
                .create(
                    Stream::empty(name(&format!("stream-{i}")))
                        .with_metadata(Metadata::new().with("kind", kind)),
                )
                .unwrap();
        }

        let users = MetadataMatcher::new()
            .with_metadata_match("kind", Operator::Equals, "user")
            .unwrap();

        assert_eq!(
            store.fetch_stream_names(None, Some(&users), 2, 1).unwrap(),
            vec![name("stream-4"), name("stream-6")]
        );
        assert_eq!(
            store
                .fetch_stream_names_regex("^stream-[1-4]$", Some(&users), 1, 1)
                .unwrap(),
            vec![name("stream-4")]
        );
    }

    #[test]
    fn missing_streams_are_reported() {
        let store = InMemoryEventStore::new();
        let missing = name("nope");

        assert_eq!(
            store.load(&missing, 1, None, None),
            Err(EventStoreError::StreamNotFound(missing.clone()))
        );
        assert!(matches!(
            store.append(&missing, events(1)),
            Err(EventStoreError::StreamNotFound(_))
        ));
        assert!(matches!(
            store.delete(&missing),
            Err(EventStoreError::StreamNotFound(_))
        ));
        assert!(matches!(
            store.fetch_stream_metadata(&missing),
            Err(EventStoreError::StreamNotFound(_))
        ));
        assert!(matches!(
            store.update_stream_metadata(&missing, Metadata::new()),
            Err(EventStoreError::StreamNotFound(_))
        ));
        assert!(!store.has_stream(&missing));
    }

    #[test]
    fn create_twice_fails_and_append_continues_numbering() {
        let store = InMemoryEventStore::new();
        store.create(Stream::new(name("s"), events(2))).unwrap();

        assert_eq!(
            store.create(Stream::empty(name("s"))),
            Err(EventStoreError::StreamExistsAlready(name("s")))
        );

        store.append(&name("s"), events(1)).unwrap();
        let loaded = store.load(&name("s"), 3, None, None).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].sequence_number, 3);
    }

    #[test]
    fn stream_metadata_can_be_updated() {
        let store = InMemoryEventStore::new();
        store
            .create(Stream::empty(name("s")).with_metadata(Metadata::new().with("owner", "ops")))
            .unwrap();

        store
            .update_stream_metadata(&name("s"), Metadata::new().with("owner", "dev"))
            .unwrap();

        let metadata = store.fetch_stream_metadata(&name("s")).unwrap();
        assert_eq!(metadata.get("owner").and_then(|v| v.as_str()), Some("dev"));
    }

    #[test]
    fn rolled_back_stream_does_not_exist_committed_one_does() {
        let store = InMemoryEventStore::new();

        store.begin_transaction().unwrap();
        store.create(Stream::new(name("tx-1"), events(1))).unwrap();
        assert!(!store.has_stream(&name("tx-1")));
        store.rollback().unwrap();
        assert!(!store.has_stream(&name("tx-1")));

        store.begin_transaction().unwrap();
        store.create(Stream::new(name("tx-1"), events(1))).unwrap();
        store.commit().unwrap();
        assert!(store.has_stream(&name("tx-1")));
    }

    #[test]
    fn staged_appends_are_invisible_until_commit() {
        let store = InMemoryEventStore::new();
        store.create(Stream::new(name("s"), events(1))).unwrap();

        store.begin_transaction().unwrap();
        store.append(&name("s"), events(2)).unwrap();
        assert_eq!(store.load(&name("s"), 1, None, None).unwrap().len(), 1);
        store.commit().unwrap();

        assert_eq!(store.load(&name("s"), 1, None, None).unwrap().len(), 3);
    }

    #[test]
    fn staged_create_conflicts_and_accepts_appends() {
        let store = InMemoryEventStore::new();
        store.begin_transaction().unwrap();
        store.create(Stream::new(name("s"), events(1))).unwrap();

        assert!(matches!(
            store.create(Stream::empty(name("s"))),
            Err(EventStoreError::StreamExistsAlready(_))
        ));

        store.append(&name("s"), events(2)).unwrap();
        store.commit().unwrap();
        assert_eq!(store.load(&name("s"), 1, None, None).unwrap().len(), 3);
    }

    #[test]
    fn transaction_misuse_is_reported() {
        let store = InMemoryEventStore::new();

        assert_eq!(store.commit(), Err(EventStoreError::TransactionNotStarted));
        assert_eq!(store.rollback(), Err(EventStoreError::TransactionNotStarted));

        store.begin_transaction().unwrap();
        assert!(store.in_transaction());
        assert_eq!(
            store.begin_transaction(),
            Err(EventStoreError::TransactionAlreadyStarted)
        );
        store.rollback().unwrap();
        assert!(!store.in_transaction());
    }

    #[test]
    fn transactional_rolls_back_on_error() {
        let store = InMemoryEventStore::new();

        let result: Result<(), EventStoreError> = store.transactional(|s| {
            s.create(Stream::new(name("s"), events(1)))?;
            s.append(&name("missing"), events(1))
        });

        assert!(matches!(result, Err(EventStoreError::StreamNotFound(_))));
        assert!(!store.in_transaction());
        assert!(!store.has_stream(&name("s")));

        store
            .transactional(|s| s.create(Stream::new(name("s"), events(1))))
            .unwrap();
        assert!(store.has_stream(&name("s")));
    }

    #[test]
    fn stream_names_paginate_in_natural_order() {
        let store = InMemoryEventStore::new();
        for i in 1..=30 {
            store
                .create(Stream::empty(name(&format!("stream-{i}"))))
                .unwrap();
        }

        let all = store.fetch_stream_names(None, None, 100, 0).unwrap();
        let page = store.fetch_stream_names(None, None, 10, 10).unwrap();

        assert_eq!(all.first().map(StreamName::as_str), Some("stream-1"));
        assert_eq!(all.get(9).map(StreamName::as_str), Some("stream-10"));
        assert_eq!(page, all[10..20].to_vec());
    }

    #[test]
    fn exact_filter_short_circuits() {
        let store = InMemoryEventStore::new();
        store
            .create(Stream::empty(name("user-1")).with_metadata(Metadata::new().with("kind", "user")))
            .unwrap();
        store.create(Stream::empty(name("user-2"))).unwrap();

        let kind = MetadataMatcher::new()
            .with_metadata_match("kind", Operator::Equals, "user")
            .unwrap();

        assert_eq!(
            store.fetch_stream_names(Some(&name("user-1")), None, 1, 5).unwrap(),
            vec![name("user-1")]
        );
        assert_eq!(
            store.fetch_stream_names(Some(&name("user-1")), Some(&kind), 1, 0).unwrap(),
            vec![name("user-1")]
        );
        assert!(store
            .fetch_stream_names(Some(&name("user-2")), Some(&kind), 1, 0)
            .unwrap()
            .is_empty());
        assert!(store
            .fetch_stream_names(Some(&name("user-3")), None, 1, 0)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn stream_names_regex() {
        let store = InMemoryEventStore::new();
        for s in ["user-1", "user-2", "order-1", "$internal"] {
            store.create(Stream::empty(name(s))).unwrap();
        }

        let users = store.fetch_stream_names_regex("^user-", None, 10, 0).unwrap();
        assert_eq!(users, vec![name("user-1"), name("user-2")]);

        assert!(matches!(
            store.fetch_stream_names_regex("(", None, 10, 0),
            Err(EventStoreError::InvalidArgument(_))
        ));
        assert!(matches!(
            store.fetch_stream_names(None, None, 0, 0),
            Err(EventStoreError::InvalidArgument(_))
        ));
    }

    #[test]
    fn category_names_are_deduplicated_and_sorted() {
        let store = InMemoryEventStore::new();
        for s in ["user-1", "user-2", "order10-1", "order2-1", "nohyphen"] {
            store.create(Stream::empty(name(s))).unwrap();
        }

        assert_eq!(
            store.fetch_category_names(None, 10, 0).unwrap(),
            vec!["order2", "order10", "user"]
        );
        assert_eq!(
            store.fetch_category_names(None, 1, 1).unwrap(),
            vec!["order10"]
        );
        assert_eq!(
            store.fetch_category_names(Some("user"), 10, 0).unwrap(),
            vec!["user"]
        );
        assert!(store.fetch_category_names(Some("nohyphen"), 10, 0).unwrap().is_empty());
        assert_eq!(
            store.fetch_category_names_regex("^order", 10, 0).unwrap(),
            vec!["order2", "order10"]
        );
    }
}

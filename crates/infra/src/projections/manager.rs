//! Projection registry and introspection.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use serde_json::Value as JsonValue;
use tracing::{debug, warn};

use streamlog_events::{Position, ProjectionStatus, ReadModel};

use super::engine::ProjectionState;
use super::handle::ProjectionHandle;
use super::{ProjectionError, Projector, Query, ReadModelProjector};
use crate::config::ProjectionOptions;
use crate::event_store::{EventStore, EventStoreError, Pagination, compile_pattern, sort_natural};

/// Lookup and control of named projections.
///
/// Names are listed in natural order and paginated like stream names.
pub trait ProjectionManager: Send + Sync {
    fn fetch_projection_names(
        &self,
        filter: Option<&str>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<String>, ProjectionError>;

    fn fetch_projection_names_regex(
        &self,
        pattern: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<String>, ProjectionError>;

    fn fetch_projection_status(&self, name: &str) -> Result<ProjectionStatus, ProjectionError>;

    fn fetch_projection_stream_positions(&self, name: &str) -> Result<Position, ProjectionError>;

    fn fetch_projection_state(&self, name: &str) -> Result<JsonValue, ProjectionError>;

    fn delete_projection(&self, name: &str, include_emitted: bool) -> Result<(), ProjectionError>;

    fn reset_projection(&self, name: &str) -> Result<(), ProjectionError>;

    fn stop_projection(&self, name: &str) -> Result<(), ProjectionError>;
}

/// In-process manager bound to one event store.
///
/// Engines are owned by their callers; the manager keeps each registered
/// projection's [`ProjectionHandle`] and answers from the snapshots published
/// there.
pub struct InMemoryProjectionManager {
    store: Arc<dyn EventStore>,
    registry: RwLock<BTreeMap<String, Arc<ProjectionHandle>>>,
}

impl InMemoryProjectionManager {
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        Self {
            store,
            registry: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<dyn EventStore> {
        &self.store
    }

    pub fn create_query<S: ProjectionState>(
        &self,
        name: &str,
        options: ProjectionOptions,
    ) -> Result<Query<S>, ProjectionError> {
        let query = Query::new(name, self.store.clone(), options)?;
        self.register(query.handle())?;
        Ok(query)
    }

    pub fn create_projection<S: ProjectionState>(
        &self,
        name: &str,
        options: ProjectionOptions,
    ) -> Result<Projector<S>, ProjectionError> {
        let projector = Projector::new(name, self.store.clone(), options)?;
        self.register(projector.handle())?;
        Ok(projector)
    }

    pub fn create_read_model_projection<S: ProjectionState>(
        &self,
        name: &str,
        read_model: Arc<dyn ReadModel>,
        options: ProjectionOptions,
    ) -> Result<ReadModelProjector<S>, ProjectionError> {
        let projector = ReadModelProjector::new(name, self.store.clone(), read_model, options)?;
        self.register(projector.handle())?;
        Ok(projector)
    }

    /// Register a handle under its name. The first registration wins.
    fn register(&self, handle: Arc<ProjectionHandle>) -> Result<(), ProjectionError> {
        let mut registry = self
            .registry
            .write()
            .map_err(|e| ProjectionError::Registry(e.to_string()))?;

        if registry.contains_key(handle.name()) {
            warn!(
                projection = handle.name(),
                "projection name already registered, new engine is not tracked"
            );
            return Ok(());
        }
        debug!(projection = handle.name(), "projection registered");
        registry.insert(handle.name().to_string(), handle);
        Ok(())
    }

    fn lookup(&self, name: &str) -> Result<Arc<ProjectionHandle>, ProjectionError> {
        let registry = self
            .registry
            .read()
            .map_err(|e| ProjectionError::Registry(e.to_string()))?;
        registry
            .get(name)
            .cloned()
            .ok_or_else(|| ProjectionError::NotFound(name.to_string()))
    }

    fn names_where(
        &self,
        accept: impl Fn(&str) -> bool,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<String>, ProjectionError> {
        let page = Pagination::new(limit, offset).map_err(invalid_argument)?;
        let registry = self
            .registry
            .read()
            .map_err(|e| ProjectionError::Registry(e.to_string()))?;

        let mut names: Vec<String> = registry.keys().filter(|n| accept(n)).cloned().collect();
        sort_natural(&mut names);
        Ok(page.apply(names))
    }
}

fn invalid_argument(err: EventStoreError) -> ProjectionError {
    match err {
        EventStoreError::InvalidArgument(msg) => ProjectionError::InvalidArgument(msg),
        other => ProjectionError::EventStore(other),
    }
}

impl ProjectionManager for InMemoryProjectionManager {
    fn fetch_projection_names(
        &self,
        filter: Option<&str>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<String>, ProjectionError> {
        self.names_where(|name| filter.is_none_or(|f| f == name), limit, offset)
    }

    fn fetch_projection_names_regex(
        &self,
        pattern: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<String>, ProjectionError> {
        let regex = compile_pattern(pattern).map_err(invalid_argument)?;
        self.names_where(|name| regex.is_match(name), limit, offset)
    }

    fn fetch_projection_status(&self, name: &str) -> Result<ProjectionStatus, ProjectionError> {
        Ok(self.lookup(name)?.status())
    }

    fn fetch_projection_stream_positions(&self, name: &str) -> Result<Position, ProjectionError> {
        Ok(self.lookup(name)?.positions())
    }

    fn fetch_projection_state(&self, name: &str) -> Result<JsonValue, ProjectionError> {
        Ok(self.lookup(name)?.state())
    }

    fn delete_projection(&self, _name: &str, _include_emitted: bool) -> Result<(), ProjectionError> {
        Err(ProjectionError::unsupported(
            "deleting projections is not supported by the in-memory manager",
        ))
    }

    fn reset_projection(&self, _name: &str) -> Result<(), ProjectionError> {
        Err(ProjectionError::unsupported(
            "resetting projections is not supported by the in-memory manager",
        ))
    }

    fn stop_projection(&self, _name: &str) -> Result<(), ProjectionError> {
        Err(ProjectionError::unsupported(
            "stopping projections is not supported by the in-memory manager",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_store::InMemoryEventStore;
    use serde_json::json;
    use streamlog_core::{Event, Stream, StreamName};

    fn manager() -> InMemoryProjectionManager {
        let store = Arc::new(InMemoryEventStore::new());
        store
            .create(Stream::new(
                StreamName::new("user-1").unwrap(),
                [Event::new("Registered", json!({})), Event::new("Registered", json!({}))],
            ))
            .unwrap();
        InMemoryProjectionManager::new(store)
    }

    #[test]
    fn lists_names_in_natural_order_with_paging() {
        let manager = manager();
        let _keep: Vec<Query<u64>> = ["p-10", "p-2", "p-1", "other"]
            .iter()
            .map(|n| manager.create_query(n, ProjectionOptions::default()).unwrap())
            .collect();

        assert_eq!(
            manager.fetch_projection_names(None, 10, 0).unwrap(),
            vec!["other", "p-1", "p-2", "p-10"]
        );
        assert_eq!(
            manager.fetch_projection_names(None, 2, 1).unwrap(),
            vec!["p-1", "p-2"]
        );
        assert_eq!(
            manager.fetch_projection_names(Some("p-2"), 10, 0).unwrap(),
            vec!["p-2"]
        );
        assert!(manager.fetch_projection_names(Some("nope"), 10, 0).unwrap().is_empty());
        assert_eq!(
            manager.fetch_projection_names_regex("^p-1", 10, 0).unwrap(),
            vec!["p-1", "p-10"]
        );
    }

    #[test]
    fn bad_paging_and_patterns_are_invalid_arguments() {
        let manager = manager();
        assert!(matches!(
            manager.fetch_projection_names(None, 0, 0),
            Err(ProjectionError::InvalidArgument(_))
        ));
        assert!(matches!(
            manager.fetch_projection_names_regex("", 10, 0),
            Err(ProjectionError::InvalidArgument(_))
        ));
        assert!(matches!(
            manager.fetch_projection_names_regex("(", 10, 0),
            Err(ProjectionError::InvalidArgument(_))
        ));
    }

    #[test]
    fn reports_state_positions_and_status_after_run() {
        let manager = manager();
        let mut projection = manager
            .create_projection::<u64>("counter", ProjectionOptions::default())
            .unwrap();
        projection
            .from_stream("user-1", None)
            .unwrap()
            .when_any(|_, count, _| Ok(Some(*count + 1)))
            .unwrap();

        assert_eq!(manager.fetch_projection_state("counter").unwrap(), json!(0));

        projection.run(false).unwrap();

        assert_eq!(manager.fetch_projection_state("counter").unwrap(), json!(2));
        assert_eq!(
            manager.fetch_projection_status("counter").unwrap(),
            ProjectionStatus::Idle
        );
        let positions = manager.fetch_projection_stream_positions("counter").unwrap();
        assert_eq!(positions.get(&StreamName::new("user-1").unwrap()), Some(2));
    }

    #[test]
    fn unknown_names_are_not_found() {
        let manager = manager();
        assert!(matches!(
            manager.fetch_projection_status("ghost"),
            Err(ProjectionError::NotFound(_))
        ));
        assert!(matches!(
            manager.fetch_projection_stream_positions("ghost"),
            Err(ProjectionError::NotFound(_))
        ));
        assert!(matches!(
            manager.fetch_projection_state("ghost"),
            Err(ProjectionError::NotFound(_))
        ));
    }

    #[test]
    fn first_registration_wins() {
        let manager = manager();
        let mut first = manager
            .create_query::<u64>("dup", ProjectionOptions::default())
            .unwrap();
        let mut second = manager
            .create_query::<u64>("dup", ProjectionOptions::default())
            .unwrap();

        for query in [&mut first, &mut second] {
            query
                .from_stream("user-1", None)
                .unwrap()
                .when_any(|_, count, _| Ok(Some(*count + 1)))
                .unwrap();
        }
        second.run().unwrap();
        assert_eq!(manager.fetch_projection_state("dup").unwrap(), json!(0));

        first.run().unwrap();
        assert_eq!(manager.fetch_projection_state("dup").unwrap(), json!(2));
        assert_eq!(manager.fetch_projection_names(None, 10, 0).unwrap(), vec!["dup"]);
    }

    #[test]
    fn control_operations_are_unsupported() {
        let manager = manager();
        let _query = manager
            .create_query::<u64>("q", ProjectionOptions::default())
            .unwrap();

        assert!(matches!(
            manager.delete_projection("q", true),
            Err(ProjectionError::Unsupported(_))
        ));
        assert!(matches!(
            manager.reset_projection("q"),
            Err(ProjectionError::Unsupported(_))
        ));
        assert!(matches!(
            manager.stop_projection("q"),
            Err(ProjectionError::Unsupported(_))
        ));
    }
}

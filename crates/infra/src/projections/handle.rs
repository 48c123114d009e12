//! Shared, introspectable view of a projection.
//!
//! The engine owns its state and position exclusively while it runs. It
//! publishes snapshots into a [`ProjectionHandle`] at synchronization points
//! (after every stream batch, on control operations, at the end of a run), so
//! a manager can report on a projection without borrowing the engine, also
//! from inside one of that projection's own handlers.

use std::sync::RwLock;

use serde::Serialize;
use serde_json::Value as JsonValue;
use tracing::warn;

use streamlog_events::{Position, ProjectionStatus};

#[derive(Debug)]
pub struct ProjectionHandle {
    name: String,
    status: RwLock<ProjectionStatus>,
    positions: RwLock<Position>,
    state: RwLock<JsonValue>,
}

impl ProjectionHandle {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: RwLock::new(ProjectionStatus::Idle),
            positions: RwLock::new(Position::new()),
            state: RwLock::new(JsonValue::Null),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn status(&self) -> ProjectionStatus {
        self.status.read().map(|s| *s).unwrap_or_default()
    }

    pub fn positions(&self) -> Position {
        self.positions
            .read()
            .map(|p| p.clone())
            .unwrap_or_default()
    }

    pub fn state(&self) -> JsonValue {
        self.state
            .read()
            .map(|s| s.clone())
            .unwrap_or(JsonValue::Null)
    }

    pub(crate) fn publish_status(&self, status: ProjectionStatus) {
        if let Ok(mut current) = self.status.write() {
            *current = status;
        }
    }

    pub(crate) fn publish<S: Serialize>(&self, positions: &Position, state: &S) {
        if let Ok(mut current) = self.positions.write() {
            *current = positions.clone();
        }
        match serde_json::to_value(state) {
            Ok(value) => {
                if let Ok(mut current) = self.state.write() {
                    *current = value;
                }
            }
            Err(err) => {
                warn!(projection = %self.name, error = %err, "projection state is not serializable");
            }
        }
    }
}

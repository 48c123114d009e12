use serde::{Deserialize, Serialize};

/// Lifecycle status of a projection, as reported by a projection manager.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectionStatus {
    #[default]
    Idle,
    Running,
    Stopping,
    Resetting,
    Deleting,
    DeletingInclEmittedEvents,
}

impl ProjectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectionStatus::Idle => "idle",
            ProjectionStatus::Running => "running",
            ProjectionStatus::Stopping => "stopping",
            ProjectionStatus::Resetting => "resetting",
            ProjectionStatus::Deleting => "deleting",
            ProjectionStatus::DeletingInclEmittedEvents => "deleting_incl_emitted_events",
        }
    }
}

impl core::fmt::Display for ProjectionStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

use serde::{Deserialize, Serialize};
use stagehand_types::{OperationId, OperationStatus};
use std::time::Duration;

/// Operation lifecycle events emitted by the registry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum OperationEvent {
    /// Operation materialized from a template
    Created {
        operation_id: OperationId,
        template_id: String,
        stage_count: usize,
    },

    /// Operation triggered; its first stage is running
    Started { operation_id: OperationId },

    /// Operation reached a terminal status through its stages
    Finished {
        operation_id: OperationId,
        status: OperationStatus,
        duration: Option<Duration>,
    },

    /// Operation was cancelled explicitly
    Cancelled {
        operation_id: OperationId,
        /// Stage that was running at the time, if any
        stage_id: Option<String>,
    },

    /// Terminal operation evicted from history
    Evicted { operation_id: OperationId },

    /// Registry contents replaced from a snapshot
    Restored { operations: usize },
}

impl OperationEvent {
    /// Operation this event belongs to, if it concerns a single one
    #[must_use]
    pub fn operation_id(&self) -> Option<OperationId> {
        match self {
            Self::Created { operation_id, .. }
            | Self::Started { operation_id }
            | Self::Finished { operation_id, .. }
            | Self::Cancelled { operation_id, .. }
            | Self::Evicted { operation_id } => Some(*operation_id),
            Self::Restored { .. } => None,
        }
    }
}

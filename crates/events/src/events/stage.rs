use serde::{Deserialize, Serialize};
use stagehand_types::OperationId;
use std::time::Duration;

/// Per-stage events emitted while an operation advances
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StageEvent {
    Started {
        operation_id: OperationId,
        stage_id: String,
        index: usize,
        name: String,
    },

    /// A progress-driven stage reached a checkpoint
    Progressed {
        operation_id: OperationId,
        stage_id: String,
        progress: u8,
        message: String,
    },

    Succeeded {
        operation_id: OperationId,
        stage_id: String,
        duration: Option<Duration>,
    },

    Failed {
        operation_id: OperationId,
        stage_id: String,
        failure: super::FailureContext,
    },

    Cancelled {
        operation_id: OperationId,
        stage_id: String,
    },

    /// Pending stage closed out after an earlier stage failed
    Skipped {
        operation_id: OperationId,
        stage_id: String,
    },
}

impl StageEvent {
    #[must_use]
    pub fn operation_id(&self) -> OperationId {
        match self {
            Self::Started { operation_id, .. }
            | Self::Progressed { operation_id, .. }
            | Self::Succeeded { operation_id, .. }
            | Self::Failed { operation_id, .. }
            | Self::Cancelled { operation_id, .. }
            | Self::Skipped { operation_id, .. } => *operation_id,
        }
    }

    #[must_use]
    pub fn stage_id(&self) -> &str {
        match self {
            Self::Started { stage_id, .. }
            | Self::Progressed { stage_id, .. }
            | Self::Succeeded { stage_id, .. }
            | Self::Failed { stage_id, .. }
            | Self::Cancelled { stage_id, .. }
            | Self::Skipped { stage_id, .. } => stage_id,
        }
    }
}

use serde::{Deserialize, Serialize};

use crate::EventSource;
use stagehand_types::OperationId;

/// Structured failure information shared across domains.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureContext {
    /// Optional stable error code.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Short user-facing message.
    pub message: String,
    /// Optional remediation hint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    /// Whether retrying the operation might succeed.
    pub retryable: bool,
}

impl FailureContext {
    /// Construct a new failure context.
    #[must_use]
    pub fn new(
        code: Option<impl Into<String>>,
        message: impl Into<String>,
        hint: Option<impl Into<String>>,
        retryable: bool,
    ) -> Self {
        Self {
            code: code.map(Into::into),
            message: message.into(),
            hint: hint.map(Into::into),
            retryable,
        }
    }

    /// Failure reported by a stage rather than an error value
    #[must_use]
    pub fn stage_failure(reason: impl Into<String>) -> Self {
        Self::new(Some("stage.failed"), reason, None::<String>, true)
    }
}

pub mod general;
pub mod operation;
pub mod scheduler;
pub mod stage;

pub use general::*;
pub use operation::*;
pub use scheduler::*;
pub use stage::*;

/// Top-level application event enum that aggregates all domain-specific events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "domain", content = "event", rename_all = "snake_case")]
pub enum AppEvent {
    /// Warnings and errors
    General(GeneralEvent),

    /// Operation lifecycle (created, started, finished, cancelled, evicted)
    Operation(OperationEvent),

    /// Stage transitions and checkpoint progress
    Stage(StageEvent),

    /// Scheduler lifecycle and passes
    Scheduler(SchedulerEvent),
}

impl AppEvent {
    /// Identify the source domain for this event (used for metadata/logging).
    #[must_use]
    pub fn event_source(&self) -> EventSource {
        match self {
            Self::General(_) => EventSource::GENERAL,
            Self::Operation(_) => EventSource::OPERATION,
            Self::Stage(_) => EventSource::STAGE,
            Self::Scheduler(_) => EventSource::SCHEDULER,
        }
    }

    /// Operation the event should be correlated with
    #[must_use]
    pub fn operation_id(&self) -> Option<OperationId> {
        match self {
            Self::Operation(event) => event.operation_id(),
            Self::Stage(event) => Some(event.operation_id()),
            Self::General(_) | Self::Scheduler(_) => None,
        }
    }

    /// Determine the appropriate tracing log level for this event
    #[must_use]
    pub fn log_level(&self) -> tracing::Level {
        use stagehand_types::OperationStatus;
        use tracing::Level;

        match self {
            // Error-level events
            Self::General(GeneralEvent::Error { .. })
            | Self::Stage(StageEvent::Failed { .. })
            | Self::Operation(OperationEvent::Finished {
                status: OperationStatus::Failed,
                ..
            }) => Level::ERROR,

            // Warning-level events
            Self::General(GeneralEvent::Warning { .. })
            | Self::Operation(OperationEvent::Cancelled { .. })
            | Self::Stage(StageEvent::Cancelled { .. } | StageEvent::Skipped { .. }) => {
                Level::WARN
            }

            // Debug-level events (progress updates, scheduler chatter)
            Self::Stage(StageEvent::Progressed { .. })
            | Self::Operation(OperationEvent::Evicted { .. })
            | Self::Scheduler(
                SchedulerEvent::PassCompleted { .. }
                | SchedulerEvent::Parked
                | SchedulerEvent::Resumed,
            ) => Level::DEBUG,

            // Default to INFO for most events
            _ => Level::INFO,
        }
    }
}

//! Operation engine error types

use std::borrow::Cow;

use crate::UserFacingError;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[non_exhaustive]
pub enum EngineError {
    #[error("unknown template: {template_id}")]
    UnknownTemplate { template_id: String },

    #[error("invalid template {template_id}: {reason}")]
    InvalidTemplate { template_id: String, reason: String },

    #[error("duplicate template id: {template_id}")]
    DuplicateTemplate { template_id: String },

    #[error("operation {operation_id} is {actual}, expected {expected}")]
    InvalidState {
        operation_id: Uuid,
        expected: String,
        actual: String,
    },

    #[error("operation not found: {operation_id}")]
    NotFound { operation_id: Uuid },

    #[error("invalid stage transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("scheduler is already running")]
    SchedulerAlreadyRunning,

    #[error("scheduler is not running")]
    SchedulerNotRunning,
}

impl EngineError {
    /// Build an `InvalidState` error from any displayable status pair
    pub fn invalid_state(
        operation_id: Uuid,
        expected: impl std::fmt::Display,
        actual: impl std::fmt::Display,
    ) -> Self {
        Self::InvalidState {
            operation_id,
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }
}

impl UserFacingError for EngineError {
    fn user_message(&self) -> Cow<'_, str> {
        Cow::Owned(self.to_string())
    }

    fn user_hint(&self) -> Option<&'static str> {
        match self {
            Self::UnknownTemplate { .. } => {
                Some("Pick one of the templates listed by the catalog.")
            }
            Self::InvalidTemplate { .. } | Self::DuplicateTemplate { .. } => {
                Some("Fix the template definition in the configuration file.")
            }
            Self::InvalidState { .. } => {
                Some("Refresh the operation list; the operation changed state in the meantime.")
            }
            Self::NotFound { .. } => Some("The operation may have been evicted from history."),
            Self::SchedulerAlreadyRunning => Some("Stop the scheduler before starting it again."),
            _ => None,
        }
    }

    fn user_code(&self) -> Option<&'static str> {
        let code = match self {
            Self::UnknownTemplate { .. } => "engine.unknown_template",
            Self::InvalidTemplate { .. } => "engine.invalid_template",
            Self::DuplicateTemplate { .. } => "engine.duplicate_template",
            Self::InvalidState { .. } => "engine.invalid_state",
            Self::NotFound { .. } => "engine.not_found",
            Self::InvalidTransition { .. } => "engine.invalid_transition",
            Self::SchedulerAlreadyRunning => "engine.scheduler_already_running",
            Self::SchedulerNotRunning => "engine.scheduler_not_running",
        };
        Some(code)
    }
}

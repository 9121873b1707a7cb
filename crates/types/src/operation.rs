//! Operation model: the aggregate a presentation layer renders

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use stagehand_errors::EngineError;
use uuid::Uuid;

use crate::template::stage_id;
use crate::{OperationStatus, OperationTemplate, Stage, StageStatus};

/// Operation identifier
pub type OperationId = Uuid;

/// Opaque caller-supplied metadata (branch/commit, sync type, ...)
pub type Metadata = BTreeMap<String, String>;

/// One tracked run: an ordered, fixed-length list of stages
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    id: OperationId,
    template_id: String,
    name: String,
    stages: Vec<Stage>,
    status: OperationStatus,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
    total_duration: Option<Duration>,
    #[serde(default)]
    metadata: Metadata,
    #[serde(default)]
    ticks: u64,
}

impl Operation {
    /// Materialize a pending operation from a template
    #[must_use]
    pub fn from_template(
        template: &OperationTemplate,
        metadata: Metadata,
        log_capacity: Option<usize>,
        now: DateTime<Utc>,
    ) -> Self {
        let stages = template
            .stages
            .iter()
            .enumerate()
            .map(|(index, spec)| {
                Stage::new(
                    stage_id(index, &spec.name),
                    spec.name.clone(),
                    spec.checkpoints.clone(),
                    log_capacity,
                )
            })
            .collect();

        Self {
            id: Uuid::new_v4(),
            template_id: template.id.clone(),
            name: template.name.clone(),
            stages,
            status: OperationStatus::Pending,
            created_at: now,
            started_at: None,
            ended_at: None,
            total_duration: None,
            metadata,
            ticks: 0,
        }
    }

    #[must_use]
    pub fn id(&self) -> OperationId {
        self.id
    }

    #[must_use]
    pub fn template_id(&self) -> &str {
        &self.template_id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    #[must_use]
    pub fn stage(&self, index: usize) -> Option<&Stage> {
        self.stages.get(index)
    }

    /// Mutable access to one stage; stage transitions remain checked
    pub fn stage_mut(&mut self, index: usize) -> Option<&mut Stage> {
        self.stages.get_mut(index)
    }

    #[must_use]
    pub fn status(&self) -> OperationStatus {
        self.status
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    #[must_use]
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    #[must_use]
    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.ended_at
    }

    #[must_use]
    pub fn total_duration(&self) -> Option<Duration> {
        self.total_duration
    }

    #[must_use]
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Scheduler ticks applied while running
    #[must_use]
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Index of the running stage, if any
    #[must_use]
    pub fn running_stage(&self) -> Option<usize> {
        self.stages
            .iter()
            .position(|s| s.status() == StageStatus::Running)
    }

    /// Number of stages currently running (never more than one)
    #[must_use]
    pub fn running_count(&self) -> usize {
        self.stages
            .iter()
            .filter(|s| s.status() == StageStatus::Running)
            .count()
    }

    /// Stages that reached `Succeeded`
    #[must_use]
    pub fn completed_count(&self) -> usize {
        self.stages
            .iter()
            .filter(|s| s.status() == StageStatus::Succeeded)
            .count()
    }

    /// Pending -> Running; the first stage starts at the same instant
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` unless the operation is pending.
    pub fn begin(&mut self, now: DateTime<Utc>) -> Result<(), EngineError> {
        if self.status != OperationStatus::Pending {
            return Err(EngineError::invalid_state(
                self.id,
                OperationStatus::Pending,
                self.status,
            ));
        }
        if let Some(first) = self.stages.first_mut() {
            first.start(now)?;
        }
        self.status = OperationStatus::Running;
        self.started_at = Some(now);
        Ok(())
    }

    pub fn record_tick(&mut self) {
        self.ticks += 1;
    }

    /// Running -> terminal, stamping end time and total duration
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` unless the operation is running, or
    /// `InvalidTransition` if `status` is not terminal.
    pub fn finish(&mut self, status: OperationStatus, now: DateTime<Utc>) -> Result<(), EngineError> {
        if !status.is_terminal() {
            return Err(EngineError::InvalidTransition {
                from: self.status.to_string(),
                to: status.to_string(),
            });
        }
        if self.status != OperationStatus::Running {
            return Err(EngineError::invalid_state(
                self.id,
                OperationStatus::Running,
                self.status,
            ));
        }
        self.status = status;
        self.ended_at = Some(now);
        self.total_duration = self
            .started_at
            .and_then(|started| (now - started).to_std().ok());
        Ok(())
    }
}

/// Criteria for listing operations
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OperationFilter {
    pub status: Option<OperationStatus>,
    pub template_id: Option<String>,
    pub metadata: Option<(String, String)>,
    pub limit: Option<usize>,
}

impl OperationFilter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_status(mut self, status: OperationStatus) -> Self {
        self.status = Some(status);
        self
    }

    #[must_use]
    pub fn with_template(mut self, template_id: impl Into<String>) -> Self {
        self.template_id = Some(template_id.into());
        self
    }

    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata = Some((key.into(), value.into()));
        self
    }

    #[must_use]
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Whether an operation satisfies every set criterion (limit aside)
    #[must_use]
    pub fn matches(&self, operation: &Operation) -> bool {
        if self.status.is_some_and(|status| status != operation.status()) {
            return false;
        }
        if let Some(template_id) = &self.template_id {
            if template_id != operation.template_id() {
                return false;
            }
        }
        if let Some((key, value)) = &self.metadata {
            if operation.metadata().get(key) != Some(value) {
                return false;
            }
        }
        true
    }
}

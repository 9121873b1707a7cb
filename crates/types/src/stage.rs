//! Stage model: one step of an operation

use std::collections::VecDeque;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use stagehand_errors::EngineError;

use crate::StageStatus;

/// One fixed-step progress mark for percentage-driven stages
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Progress value reached at this checkpoint (1-100)
    pub progress: u8,
    /// Log line appended when the checkpoint is reached
    pub message: String,
}

impl Checkpoint {
    #[must_use]
    pub fn new(progress: u8, message: impl Into<String>) -> Self {
        Self {
            progress,
            message: message.into(),
        }
    }
}

/// Append-only stage log with an optional ring-buffer cap
///
/// When a capacity is set, the oldest lines are dropped first and counted in
/// `dropped`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageLog {
    lines: VecDeque<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    capacity: Option<usize>,
    #[serde(default)]
    dropped: u64,
}

impl StageLog {
    #[must_use]
    pub fn new(capacity: Option<usize>) -> Self {
        Self {
            lines: VecDeque::new(),
            capacity,
            dropped: 0,
        }
    }

    pub fn push(&mut self, line: impl Into<String>) {
        if self.capacity == Some(0) {
            self.dropped += 1;
            return;
        }
        self.lines.push_back(line.into());
        if let Some(capacity) = self.capacity {
            while self.lines.len() > capacity {
                self.lines.pop_front();
                self.dropped += 1;
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(String::as_str)
    }

    #[must_use]
    pub fn last(&self) -> Option<&str> {
        self.lines.back().map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Number of lines evicted by the cap so far
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

/// A single step inside an operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stage {
    id: String,
    name: String,
    status: StageStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    progress: Option<u8>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    checkpoints: Vec<Checkpoint>,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
    log: StageLog,
}

impl Stage {
    /// Create a pending stage
    ///
    /// Stages with checkpoints are percentage-driven and start at progress 0;
    /// stages without checkpoints carry no progress value at all.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        checkpoints: Vec<Checkpoint>,
        log_capacity: Option<usize>,
    ) -> Self {
        let progress = if checkpoints.is_empty() { None } else { Some(0) };
        Self {
            id: id.into(),
            name: name.into(),
            status: StageStatus::Pending,
            progress,
            checkpoints,
            started_at: None,
            ended_at: None,
            log: StageLog::new(log_capacity),
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn status(&self) -> StageStatus {
        self.status
    }

    #[must_use]
    pub fn progress(&self) -> Option<u8> {
        self.progress
    }

    #[must_use]
    pub fn checkpoints(&self) -> &[Checkpoint] {
        &self.checkpoints
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
    pub fn log(&self) -> &StageLog {
        &self.log
    }

    /// Whether this stage advances through fixed checkpoints
    #[must_use]
    pub fn is_progress_driven(&self) -> bool {
        !self.checkpoints.is_empty()
    }

    /// The first checkpoint not yet reached
    #[must_use]
    pub fn next_checkpoint(&self) -> Option<&Checkpoint> {
        let current = self.progress?;
        self.checkpoints.iter().find(|cp| cp.progress > current)
    }

    /// Wall-clock time spent running, once the stage has ended
    #[must_use]
    pub fn duration(&self) -> Option<Duration> {
        let started = self.started_at?;
        let ended = self.ended_at?;
        (ended - started).to_std().ok()
    }

    pub fn append_log(&mut self, line: impl Into<String>) {
        self.log.push(line);
    }

    /// Pending -> Running, stamping the start time
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` if the stage is not pending.
    pub fn start(&mut self, now: DateTime<Utc>) -> Result<(), EngineError> {
        self.transition(StageStatus::Running)?;
        self.started_at = Some(now);
        Ok(())
    }

    /// Move to the next checkpoint and return it
    ///
    /// Returns `None` when the stage is not running or has no checkpoint left.
    pub fn reach_next_checkpoint(&mut self) -> Option<Checkpoint> {
        if self.status != StageStatus::Running {
            return None;
        }
        let checkpoint = self.next_checkpoint()?.clone();
        self.progress = Some(checkpoint.progress);
        self.log.push(checkpoint.message.clone());
        Some(checkpoint)
    }

    /// Running -> Succeeded, stamping the end time
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` if the stage is not running.
    pub fn succeed(&mut self, now: DateTime<Utc>) -> Result<(), EngineError> {
        self.finish(StageStatus::Succeeded, now)?;
        if self.progress.is_some() {
            self.progress = Some(100);
        }
        Ok(())
    }

    /// Running -> Failed, stamping the end time
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` if the stage is not running.
    pub fn fail(&mut self, now: DateTime<Utc>) -> Result<(), EngineError> {
        self.finish(StageStatus::Failed, now)
    }

    /// Running -> Cancelled, stamping the end time
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` if the stage is not running.
    pub fn cancel(&mut self, now: DateTime<Utc>) -> Result<(), EngineError> {
        self.finish(StageStatus::Cancelled, now)
    }

    /// Pending -> Skipped; skipped stages never ran and carry no timestamps
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` if the stage is not pending.
    pub fn skip(&mut self) -> Result<(), EngineError> {
        self.transition(StageStatus::Skipped)
    }

    fn finish(&mut self, next: StageStatus, now: DateTime<Utc>) -> Result<(), EngineError> {
        self.transition(next)?;
        self.ended_at = Some(now);
        Ok(())
    }

    fn transition(&mut self, next: StageStatus) -> Result<(), EngineError> {
        if !self.status.can_transition_to(next) {
            return Err(EngineError::InvalidTransition {
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        self.status = next;
        Ok(())
    }
}

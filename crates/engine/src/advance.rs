//! Stage advancement: the state machine applied on every tick
//!
//! Everything here is synchronous and operates on a single `Operation`; the
//! registry owns locking, events and notifications.

use chrono::{DateTime, Utc};
use stagehand_errors::EngineError;
use stagehand_types::{Checkpoint, Operation, OperationStatus, Stage, StageStatus};

use crate::policy::{AdvancePolicy, StageDecision, TickContext};

/// Result of one tick on one operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Nothing moved: the operation is not running or its stage held
    Idle,
    /// A checkpoint was reached or the next stage started
    Advanced,
    /// The operation reached a terminal status on this tick
    Finished(OperationStatus),
}

/// A single stage transition made during a tick, trigger or cancel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageChange {
    Started { index: usize },
    Progressed { index: usize, checkpoint: Checkpoint },
    Succeeded { index: usize },
    Failed { index: usize, reason: String },
    Cancelled { index: usize },
    Skipped { index: usize },
}

impl StageChange {
    #[must_use]
    pub fn index(&self) -> usize {
        match self {
            Self::Started { index }
            | Self::Progressed { index, .. }
            | Self::Succeeded { index }
            | Self::Failed { index, .. }
            | Self::Cancelled { index }
            | Self::Skipped { index } => *index,
        }
    }
}

/// Outcome plus the stage transitions that produced it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickReport {
    pub outcome: TickOutcome,
    pub changes: Vec<StageChange>,
}

impl TickReport {
    fn idle() -> Self {
        Self {
            outcome: TickOutcome::Idle,
            changes: Vec::new(),
        }
    }
}

/// Operation status implied by its stages alone
///
/// All pending is `Pending`. Once every stage is terminal the operation is
/// `Failed` if any stage failed, `Cancelled` if any was cancelled, and
/// `Succeeded` otherwise. Anything in between is `Running`.
#[must_use]
pub fn derive_operation_status(stages: &[Stage]) -> OperationStatus {
    if stages.iter().all(|s| s.status().is_terminal()) {
        if stages.iter().any(|s| s.status() == StageStatus::Failed) {
            OperationStatus::Failed
        } else if stages.iter().any(|s| s.status() == StageStatus::Cancelled) {
            OperationStatus::Cancelled
        } else {
            OperationStatus::Succeeded
        }
    } else if stages.iter().all(|s| s.status() == StageStatus::Pending) {
        OperationStatus::Pending
    } else {
        OperationStatus::Running
    }
}

/// First way `operation` breaks the stage rules, if any
///
/// Operations produced by this module never do; operations read back from
/// a snapshot can.
#[must_use]
pub fn consistency_violation(operation: &Operation) -> Option<String> {
    let stages = operation.stages();
    if stages.is_empty() {
        return Some("operation has no stages".to_string());
    }

    let running = operation.running_count();
    if running > 1 {
        return Some(format!("{running} stages are running at once"));
    }

    // A stage only ever starts after the one before it succeeded
    for (index, pair) in stages.windows(2).enumerate() {
        let started = !matches!(pair[1].status(), StageStatus::Pending | StageStatus::Skipped);
        if started && pair[0].status() != StageStatus::Succeeded {
            return Some(format!(
                "stage {} is {} but stage {} is {}",
                index + 2,
                pair[1].status(),
                index + 1,
                pair[0].status()
            ));
        }
    }

    let status = operation.status();
    match status {
        OperationStatus::Pending if stages.iter().any(|s| s.status() != StageStatus::Pending) => {
            Some("pending operation has started stages".to_string())
        }
        OperationStatus::Running if running == 0 => {
            Some("running operation has no running stage".to_string())
        }
        OperationStatus::Cancelled if running > 0 => {
            Some("cancelled operation still has a running stage".to_string())
        }
        OperationStatus::Succeeded | OperationStatus::Failed => {
            let derived = derive_operation_status(stages);
            (derived != status)
                .then(|| format!("{status} operation has stages that add up to {derived}"))
        }
        _ => None,
    }
}

/// Start a pending operation and its first stage
///
/// # Errors
///
/// Returns `InvalidState` unless the operation is pending.
pub fn begin(operation: &mut Operation, now: DateTime<Utc>) -> Result<Vec<StageChange>, EngineError> {
    operation.begin(now)?;
    let mut changes = Vec::new();
    if let Some(first) = operation.stage_mut(0) {
        first.append_log(starting_line(first));
        changes.push(StageChange::Started { index: 0 });
    }
    Ok(changes)
}

/// Force a running operation into `Cancelled`
///
/// The running stage (if any) becomes `Cancelled`; pending stages stay
/// pending.
///
/// # Errors
///
/// Returns `InvalidState` unless the operation is running.
pub fn cancel(operation: &mut Operation, now: DateTime<Utc>) -> Result<Vec<StageChange>, EngineError> {
    if operation.status() != OperationStatus::Running {
        return Err(EngineError::invalid_state(
            operation.id(),
            OperationStatus::Running,
            operation.status(),
        ));
    }

    let mut changes = Vec::new();
    if let Some(index) = operation.running_stage() {
        if let Some(stage) = operation.stage_mut(index) {
            stage.append_log(format!("{} cancelled", stage.name()));
            stage.cancel(now)?;
            changes.push(StageChange::Cancelled { index });
        }
    }
    operation.finish(OperationStatus::Cancelled, now)?;
    Ok(changes)
}

/// Apply one tick to an operation
///
/// A non-running operation is left untouched. Otherwise the policy decides
/// the fate of the running stage, the next stage is started after a success,
/// remaining stages are skipped after a failure, and the operation status is
/// recomputed from its stages.
///
/// # Errors
///
/// Only returns an error if the stage state machine rejects a transition,
/// which indicates a corrupted operation.
pub fn tick(
    operation: &mut Operation,
    policy: &dyn AdvancePolicy,
    now: DateTime<Utc>,
) -> Result<TickReport, EngineError> {
    if operation.status() != OperationStatus::Running {
        return Ok(TickReport::idle());
    }

    operation.record_tick();
    let mut changes = Vec::new();

    if let Some(index) = operation.running_stage() {
        let ctx = TickContext {
            tick: operation.ticks(),
            stage_index: index,
            now,
        };
        let decision = match operation.stage(index) {
            Some(stage) => policy.decide(stage, &ctx),
            None => StageDecision::Hold,
        };

        match decision {
            StageDecision::Hold => {}
            StageDecision::Advance => advance_stage(operation, index, now, &mut changes)?,
            StageDecision::Fail { reason } => {
                fail_stage(operation, index, &reason, now, &mut changes)?;
            }
        }
    }

    let status = derive_operation_status(operation.stages());
    if status.is_terminal() {
        operation.finish(status, now)?;
        return Ok(TickReport {
            outcome: TickOutcome::Finished(status),
            changes,
        });
    }

    let outcome = if changes.is_empty() {
        TickOutcome::Idle
    } else {
        TickOutcome::Advanced
    };
    Ok(TickReport { outcome, changes })
}

fn advance_stage(
    operation: &mut Operation,
    index: usize,
    now: DateTime<Utc>,
    changes: &mut Vec<StageChange>,
) -> Result<(), EngineError> {
    let Some(stage) = operation.stage_mut(index) else {
        return Ok(());
    };

    if stage.is_progress_driven() {
        if let Some(checkpoint) = stage.reach_next_checkpoint() {
            changes.push(StageChange::Progressed { index, checkpoint });
        }
        if stage.next_checkpoint().is_some() {
            return Ok(());
        }
    }

    stage.append_log(format!("{} completed successfully", stage.name()));
    stage.succeed(now)?;
    changes.push(StageChange::Succeeded { index });

    start_next_stage(operation, index, now, changes)
}

fn start_next_stage(
    operation: &mut Operation,
    completed: usize,
    now: DateTime<Utc>,
    changes: &mut Vec<StageChange>,
) -> Result<(), EngineError> {
    let Some(next) = operation
        .stages()
        .iter()
        .skip(completed + 1)
        .position(|s| s.status() == StageStatus::Pending)
        .map(|offset| completed + 1 + offset)
    else {
        return Ok(());
    };

    // Strictly linear: only start a stage whose predecessor succeeded
    let predecessor_done = operation
        .stage(next - 1)
        .is_some_and(|s| s.status() == StageStatus::Succeeded);
    if !predecessor_done {
        return Ok(());
    }

    if let Some(stage) = operation.stage_mut(next) {
        stage.start(now)?;
        stage.append_log(starting_line(stage));
        changes.push(StageChange::Started { index: next });
    }
    Ok(())
}

fn fail_stage(
    operation: &mut Operation,
    index: usize,
    reason: &str,
    now: DateTime<Utc>,
    changes: &mut Vec<StageChange>,
) -> Result<(), EngineError> {
    if let Some(stage) = operation.stage_mut(index) {
        stage.append_log(format!("{} failed: {reason}", stage.name()));
        stage.fail(now)?;
        changes.push(StageChange::Failed {
            index,
            reason: reason.to_string(),
        });
    }

    let remaining = operation.stages().len();
    for later in index + 1..remaining {
        if let Some(stage) = operation.stage_mut(later) {
            if stage.status() == StageStatus::Pending {
                stage.skip()?;
                changes.push(StageChange::Skipped { index: later });
            }
        }
    }
    Ok(())
}

fn starting_line(stage: &Stage) -> String {
    format!("Starting {}...", stage.name())
}

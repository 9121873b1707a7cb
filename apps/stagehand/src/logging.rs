//! Structured logging integration for events
//!
//! Converts domain events into tracing records with structured fields so the
//! JSON log format carries the same information as the live display.

use stagehand_events::{AppEvent, EventMessage, OperationEvent, SchedulerEvent, StageEvent};
use tracing::{debug, error, info, warn};

/// Log an event through tracing at the level recorded in its metadata
pub fn log_event_with_tracing(message: &EventMessage) {
    let meta = &message.meta;
    let source = meta.source.as_str();
    let correlation = meta.correlation_id.as_deref().unwrap_or("-");

    match &message.event {
        AppEvent::Operation(event) => match event {
            OperationEvent::Created {
                template_id,
                stage_count,
                ..
            } => info!(source, correlation, template_id = %template_id, stage_count, "Operation created"),
            OperationEvent::Started { .. } => info!(source, correlation, "Operation started"),
            OperationEvent::Finished {
                status, duration, ..
            } => {
                let duration_ms = duration.map(|d| d.as_millis());
                info!(source, correlation, status = %status, duration_ms = ?duration_ms, "Operation finished");
            }
            OperationEvent::Cancelled { stage_id, .. } => {
                warn!(source, correlation, stage_id = ?stage_id, "Operation cancelled");
            }
            OperationEvent::Evicted { .. } => debug!(source, correlation, "Operation evicted"),
            OperationEvent::Restored { operations } => {
                info!(source, operations, "Registry restored");
            }
        },

        AppEvent::Stage(event) => match event {
            StageEvent::Started { stage_id, name, .. } => {
                info!(source, correlation, stage_id = %stage_id, name = %name, "Stage started");
            }
            StageEvent::Progressed {
                stage_id,
                progress,
                message,
                ..
            } => debug!(source, correlation, stage_id = %stage_id, progress, message = %message, "Stage progressed"),
            StageEvent::Succeeded {
                stage_id, duration, ..
            } => {
                let duration_ms = duration.map(|d| d.as_millis());
                info!(source, correlation, stage_id = %stage_id, duration_ms = ?duration_ms, "Stage succeeded");
            }
            StageEvent::Failed {
                stage_id, failure, ..
            } => error!(
                source,
                correlation,
                stage_id = %stage_id,
                code = ?failure.code,
                message = %failure.message,
                retryable = failure.retryable,
                "Stage failed"
            ),
            StageEvent::Cancelled { stage_id, .. } => {
                warn!(source, correlation, stage_id = %stage_id, "Stage cancelled");
            }
            StageEvent::Skipped { stage_id, .. } => {
                warn!(source, correlation, stage_id = %stage_id, "Stage skipped");
            }
        },

        AppEvent::Scheduler(event) => match event {
            SchedulerEvent::Started { interval_ms } => {
                info!(source, interval_ms, "Scheduler started");
            }
            SchedulerEvent::Stopped { passes } => info!(source, passes, "Scheduler stopped"),
            SchedulerEvent::Parked => debug!(source, "Scheduler parked"),
            SchedulerEvent::Resumed => debug!(source, "Scheduler resumed"),
            SchedulerEvent::PassCompleted {
                pass,
                ticked,
                finished,
            } => debug!(source, pass, ticked, finished, "Scheduler pass"),
        },

        AppEvent::General(event) => {
            let level = meta.tracing_level();
            if level == tracing::Level::ERROR {
                error!(source, event = ?event, "General error");
            } else if level == tracing::Level::WARN {
                warn!(source, event = ?event, "General warning");
            } else {
                debug!(source, event = ?event, "General event");
            }
        }
    }
}

#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Event system for the stagehand operation engine
//!
//! Every registry mutation and scheduler pass is described by a domain event.
//! Events travel over an unbounded channel wrapped in an [`EventMessage`] that
//! carries correlation metadata, so a consumer can log them through `tracing`
//! or render them however it likes.
//!
//! ## Architecture
//!
//! - **Domain-driven events**: grouped as General, Operation, Stage, Scheduler
//! - **Unified `EventEmitter` trait**: one API whether you hold a raw
//!   `EventSender` or a struct that contains one
//! - **Tracing integration**: every event knows its log level and target

pub mod meta;
pub use meta::{EventLevel, EventMeta, EventSource};

pub mod events;
pub use events::{
    AppEvent, FailureContext, GeneralEvent, OperationEvent, SchedulerEvent, StageEvent,
};

use serde::{Deserialize, Serialize};
use stagehand_types::{OperationId, OperationStatus};
use tokio::sync::mpsc::UnboundedSender;

/// An event plus the metadata captured when it was emitted
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMessage {
    pub meta: EventMeta,
    pub event: AppEvent,
}

impl EventMessage {
    #[must_use]
    pub fn new(meta: EventMeta, event: AppEvent) -> Self {
        Self { meta, event }
    }
}

/// Type alias for the event sender
pub type EventSender = UnboundedSender<EventMessage>;

/// Type alias for the event receiver
pub type EventReceiver = tokio::sync::mpsc::UnboundedReceiver<EventMessage>;

/// Create a new event channel
#[must_use]
pub fn channel() -> (EventSender, EventReceiver) {
    tokio::sync::mpsc::unbounded_channel()
}

fn default_meta(event: &AppEvent) -> EventMeta {
    let level = EventLevel::from(event.log_level());
    let meta = EventMeta::new(level, event.event_source());
    match event.operation_id() {
        Some(operation_id) => meta.for_operation(operation_id),
        None => meta,
    }
}

/// The unified trait for emitting events throughout stagehand
///
/// Implementors only need to expose an optional sender; everything else has a
/// default.
pub trait EventEmitter {
    /// Get the event sender for this emitter
    fn event_sender(&self) -> Option<&EventSender>;

    /// Send an event with explicit metadata
    fn emit_with_meta(&self, meta: EventMeta, event: AppEvent) {
        if let Some(sender) = self.event_sender() {
            // Ignore send errors - if receiver is dropped, we just continue
            let _ = sender.send(EventMessage::new(meta, event));
        }
    }

    /// Emit an event through this emitter
    fn emit(&self, event: AppEvent) {
        self.emit_with_meta(default_meta(&event), event);
    }

    /// Emit a warning event
    fn emit_warning(&self, message: impl Into<String>) {
        self.emit(AppEvent::General(GeneralEvent::warning(message)));
    }

    /// Emit an error event
    fn emit_error(&self, message: impl Into<String>) {
        self.emit(AppEvent::General(GeneralEvent::error(message)));
    }

    /// Emit an operation created event
    fn emit_operation_created(
        &self,
        operation_id: OperationId,
        template_id: impl Into<String>,
        stage_count: usize,
    ) {
        self.emit(AppEvent::Operation(OperationEvent::Created {
            operation_id,
            template_id: template_id.into(),
            stage_count,
        }));
    }

    /// Emit an operation started event
    fn emit_operation_started(&self, operation_id: OperationId) {
        self.emit(AppEvent::Operation(OperationEvent::Started { operation_id }));
    }

    /// Emit an operation finished event
    fn emit_operation_finished(
        &self,
        operation_id: OperationId,
        status: OperationStatus,
        duration: Option<std::time::Duration>,
    ) {
        self.emit(AppEvent::Operation(OperationEvent::Finished {
            operation_id,
            status,
            duration,
        }));
    }
}

/// Implementation of `EventEmitter` for the raw `EventSender`
/// This allows `EventSender` to be used directly where `EventEmitter` is expected
impl EventEmitter for EventSender {
    fn event_sender(&self) -> Option<&EventSender> {
        Some(self)
    }
}

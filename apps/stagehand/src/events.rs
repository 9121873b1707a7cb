//! Live event display

use console::{Style, Term};
use stagehand_events::{AppEvent, EventMessage, GeneralEvent, OperationEvent, StageEvent};

use crate::display::format_duration;
use crate::logging::log_event_with_tracing;

/// Turns event messages into terminal lines
pub struct EventHandler {
    term: Term,
    json_output: bool,
    debug_enabled: bool,
}

impl EventHandler {
    pub fn new(json_output: bool, debug_enabled: bool) -> Self {
        Self {
            term: Term::stderr(),
            json_output,
            debug_enabled,
        }
    }

    pub fn handle_event(&mut self, message: EventMessage) {
        if self.debug_enabled {
            log_event_with_tracing(&message);
        }

        // JSON mode keeps stdout for the final result only
        if self.json_output {
            return;
        }

        if let Some(line) = render_line(&message.event) {
            let _ = self.term.write_line(&line);
        }
    }
}

fn render_line(event: &AppEvent) -> Option<String> {
    let dim = Style::new().dim();
    let ok = Style::new().green();
    let bad = Style::new().red().bold();
    let warn = Style::new().yellow();

    let line = match event {
        AppEvent::Operation(OperationEvent::Started { operation_id }) => {
            format!("▶ operation {operation_id} started")
        }
        AppEvent::Operation(OperationEvent::Finished {
            status, duration, ..
        }) => {
            let took = duration.map(format_duration).unwrap_or_default();
            format!("■ operation {status} {}", dim.apply_to(took))
        }
        AppEvent::Operation(OperationEvent::Cancelled { .. }) => {
            warn.apply_to("■ operation cancelled").to_string()
        }
        AppEvent::Stage(StageEvent::Started { index, name, .. }) => {
            format!("  [{}] {name}...", index + 1)
        }
        AppEvent::Stage(StageEvent::Progressed {
            progress, message, ..
        }) => format!("      {} {message}", dim.apply_to(format!("{progress:>3}%"))),
        AppEvent::Stage(StageEvent::Succeeded {
            stage_id, duration, ..
        }) => {
            let took = duration.map(format_duration).unwrap_or_default();
            format!("  {} {stage_id} {}", ok.apply_to("✔"), dim.apply_to(took))
        }
        AppEvent::Stage(StageEvent::Failed {
            stage_id, failure, ..
        }) => format!("  {} {stage_id}: {}", bad.apply_to("✘"), failure.message),
        AppEvent::Stage(StageEvent::Cancelled { stage_id, .. }) => {
            format!("  {} {stage_id} cancelled", warn.apply_to("⊘"))
        }
        AppEvent::Stage(StageEvent::Skipped { stage_id, .. }) => {
            format!("  {} {stage_id} skipped", dim.apply_to("·"))
        }
        AppEvent::General(GeneralEvent::Warning { message }) => {
            format!("{} {message}", warn.apply_to("warning:"))
        }
        AppEvent::General(GeneralEvent::Error { message }) => {
            format!("{} {message}", bad.apply_to("error:"))
        }
        _ => return None,
    };
    Some(line)
}

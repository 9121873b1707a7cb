//! Output rendering and formatting

use comfy_table::{presets::UTF8_FULL, Attribute, Cell, Color, ContentArrangement, Table};
use stagehand_engine::TemplateCatalog;
use stagehand_types::{Operation, OperationStatus, Stage, StageStatus};
use std::io;
use std::time::Duration;

/// Output renderer for CLI results
#[derive(Clone, Copy)]
pub struct OutputRenderer {
    /// Use JSON output format
    json_output: bool,
}

impl OutputRenderer {
    pub fn new(json_output: bool) -> Self {
        Self { json_output }
    }

    pub fn render_templates(&self, catalog: &TemplateCatalog) -> io::Result<()> {
        if self.json_output {
            let templates: Vec<_> = catalog.iter().collect();
            return print_json(&templates);
        }

        let mut table = new_table(&["Template", "Name", "Stages"]);
        for template in catalog.iter() {
            table.add_row(vec![
                Cell::new(&template.id),
                Cell::new(&template.name),
                Cell::new(template.stage_names().join(" → ")),
            ]);
        }
        println!("{table}");
        Ok(())
    }

    pub fn render_operations(&self, operations: &[Operation]) -> io::Result<()> {
        if self.json_output {
            return print_json(&operations);
        }
        if operations.is_empty() {
            println!("No operations.");
            return Ok(());
        }

        for operation in operations {
            self.render_operation(operation)?;
            println!();
        }
        Ok(())
    }

    pub fn render_operation(&self, operation: &Operation) -> io::Result<()> {
        if self.json_output {
            return print_json(operation);
        }

        println!(
            "{} ({}) {}",
            operation.name(),
            operation.id(),
            operation_status_label(operation.status())
        );
        if !operation.metadata().is_empty() {
            let pairs: Vec<String> = operation
                .metadata()
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect();
            println!("  {}", pairs.join(" "));
        }
        if let Some(total) = operation.total_duration() {
            println!(
                "  {}/{} stages in {}",
                operation.completed_count(),
                operation.stages().len(),
                format_duration(total)
            );
        }

        let mut table = new_table(&["#", "Stage", "Status", "Progress", "Duration", "Last log"]);
        for (index, stage) in operation.stages().iter().enumerate() {
            table.add_row(vec![
                Cell::new(index + 1),
                Cell::new(stage.name()),
                stage_status_cell(stage.status()),
                Cell::new(stage.progress().map_or_else(|| "-".to_string(), |p| format!("{p}%"))),
                Cell::new(stage.duration().map_or_else(|| "-".to_string(), format_duration)),
                Cell::new(last_log(stage)),
            ]);
        }
        println!("{table}");
        Ok(())
    }
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> io::Result<()> {
    let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
    println!("{json}");
    Ok(())
}

fn new_table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(
            headers
                .iter()
                .map(|h| Cell::new(h).add_attribute(Attribute::Bold))
                .collect::<Vec<_>>(),
        );
    table
}

fn stage_status_cell(status: StageStatus) -> Cell {
    let color = match status {
        StageStatus::Pending => Color::DarkGrey,
        StageStatus::Running => Color::Cyan,
        StageStatus::Succeeded => Color::Green,
        StageStatus::Failed => Color::Red,
        StageStatus::Skipped | StageStatus::Cancelled => Color::Yellow,
    };
    Cell::new(status).fg(color)
}

fn operation_status_label(status: OperationStatus) -> String {
    let style = match status {
        OperationStatus::Succeeded => console::Style::new().green().bold(),
        OperationStatus::Failed => console::Style::new().red().bold(),
        OperationStatus::Cancelled => console::Style::new().yellow().bold(),
        OperationStatus::Running => console::Style::new().cyan(),
        OperationStatus::Pending => console::Style::new().dim(),
    };
    style.apply_to(status).to_string()
}

fn last_log(stage: &Stage) -> String {
    stage.log().last().unwrap_or("").to_string()
}

pub fn format_duration(duration: Duration) -> String {
    let millis = duration.as_millis();
    if millis < 1_000 {
        format!("{millis}ms")
    } else if millis < 60_000 {
        format!("{:.1}s", duration.as_secs_f64())
    } else {
        let secs = duration.as_secs();
        format!("{}m{:02}s", secs / 60, secs % 60)
    }
}

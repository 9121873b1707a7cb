//! Command line interface definition

use clap::{Parser, Subcommand};
use stagehand_types::LogFormat;
use std::path::PathBuf;

/// stagehand - staged operation runner
#[derive(Parser)]
#[command(name = "stagehand")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Run and inspect staged operations")]
#[command(long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[command(flatten)]
    pub global: GlobalArgs,
}

/// Global arguments available for all commands
#[derive(Parser)]
pub struct GlobalArgs {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Log line format
    #[arg(long, global = true, value_enum)]
    pub log_format: Option<LogFormat>,

    /// Use alternate config file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Override the scheduler tick interval
    #[arg(long, global = true, value_name = "MS")]
    pub tick_ms: Option<u64>,
}

/// Available commands
#[derive(Subcommand)]
pub enum Commands {
    /// List available operation templates
    #[command(alias = "ls")]
    Templates,

    /// Create, trigger and follow one operation until it finishes
    Run {
        /// Template id (see `stagehand templates`)
        template: String,

        /// Metadata attached to the operation
        #[arg(long = "meta", value_name = "KEY=VALUE", value_parser = parse_key_val)]
        metadata: Vec<(String, String)>,

        /// Per-tick failure probability (overrides config)
        #[arg(long, value_name = "P")]
        failure_probability: Option<f64>,

        /// Seed the advancement policy for a reproducible run
        #[arg(long)]
        seed: Option<u64>,

        /// Cancel the operation after this many milliseconds
        #[arg(long, value_name = "MS")]
        cancel_after: Option<u64>,

        /// Save a registry snapshot here when the run ends
        #[arg(long, value_name = "PATH")]
        snapshot: Option<PathBuf>,
    },

    /// Show operations stored in a snapshot file
    Show {
        /// Snapshot written by `stagehand run --snapshot`
        snapshot: PathBuf,
    },
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{s}'"))?;
    if key.is_empty() {
        return Err(format!("empty key in '{s}'"));
    }
    Ok((key.to_string(), value.to_string()))
}

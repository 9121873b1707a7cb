//! Configuration sections shared across crates

use serde::{Deserialize, Serialize};
use stagehand_types::LogFormat;
use std::time::Duration;

/// General application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    #[serde(default)]
    pub log_format: LogFormat,
    /// `tracing` env-filter directive; `RUST_LOG` wins when set
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_format: LogFormat::Plain,
            log_filter: default_log_filter(),
        }
    }
}

/// Stage advancement and retention settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Per-tick chance that a running pass/fail stage succeeds
    #[serde(default = "default_completion_probability")]
    pub completion_probability: f64,
    /// Per-tick chance that a running stage fails
    #[serde(default)]
    pub failure_probability: f64,
    #[serde(default = "default_max_log_lines")]
    pub max_log_lines: usize, // 0 = unbounded
    #[serde(default = "default_history_limit")]
    pub history_limit: usize, // 0 = unbounded
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            completion_probability: default_completion_probability(),
            failure_probability: 0.0,
            max_log_lines: default_max_log_lines(),
            history_limit: default_history_limit(),
        }
    }
}

impl EngineConfig {
    /// Ring-buffer capacity for stage logs
    #[must_use]
    pub fn log_capacity(&self) -> Option<usize> {
        (self.max_log_lines > 0).then_some(self.max_log_lines)
    }

    /// Number of terminal operations to keep
    #[must_use]
    pub fn history_capacity(&self) -> Option<usize> {
        (self.history_limit > 0).then_some(self.history_limit)
    }
}

/// Scheduler timing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    /// Park the scheduler while nothing is running
    #[serde(default = "default_stop_when_idle")]
    pub stop_when_idle: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            stop_when_idle: default_stop_when_idle(),
        }
    }
}

impl SchedulerConfig {
    #[must_use]
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

// Default value functions for serde
fn default_log_filter() -> String {
    "info".to_string()
}

fn default_completion_probability() -> f64 {
    0.3
}

fn default_max_log_lines() -> usize {
    200
}

fn default_history_limit() -> usize {
    50
}

fn default_tick_interval_ms() -> u64 {
    2000
}

fn default_stop_when_idle() -> bool {
    true
}

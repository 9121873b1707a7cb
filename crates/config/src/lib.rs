#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Configuration management for stagehand
//!
//! This crate handles loading and merging configuration from:
//! - Default values (hard-coded)
//! - Configuration file (~/.config/stagehand/config.toml)
//! - Environment variables
//! - CLI flags (applied by the application)

pub mod constants;
pub mod core;

pub use core::{EngineConfig, GeneralConfig, SchedulerConfig};

use serde::{Deserialize, Serialize};
use stagehand_errors::{ConfigError, Error};
use stagehand_types::{LogFormat, OperationTemplate};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,

    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Extra templates appended to the built-in catalog
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub templates: Vec<OperationTemplate>,
}

impl Config {
    /// Get the default config file path
    ///
    /// # Errors
    ///
    /// Returns an error if the system config directory cannot be determined.
    pub fn default_path() -> Result<PathBuf, Error> {
        let config_dir = dirs::config_dir().ok_or_else(|| ConfigError::NotFound {
            path: "config directory".to_string(),
        })?;
        Ok(config_dir
            .join(constants::CONFIG_DIR_NAME)
            .join(constants::CONFIG_FILE_NAME))
    }

    /// Load configuration from file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or if the file contents
    /// contain invalid TOML syntax that cannot be parsed.
    pub async fn load_from_file(path: &Path) -> Result<Self, Error> {
        let contents = fs::read_to_string(path)
            .await
            .map_err(|_| ConfigError::NotFound {
                path: path.display().to_string(),
            })?;

        tracing::debug!(path = %path.display(), "loading configuration");
        Self::from_toml(&contents)
    }

    /// Parse configuration from a TOML string
    ///
    /// # Errors
    ///
    /// Returns a parse error for invalid TOML or mistyped fields.
    pub fn from_toml(contents: &str) -> Result<Self, Error> {
        toml::from_str(contents)
            .map_err(|e| ConfigError::ParseError {
                message: e.to_string(),
            })
            .map_err(Into::into)
    }

    /// Load configuration with fallback to defaults
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file exists but cannot be read
    /// or contains invalid TOML syntax.
    pub async fn load() -> Result<Self, Error> {
        let config_path = Self::default_path()?;

        if fs::try_exists(&config_path).await.unwrap_or(false) {
            Self::load_from_file(&config_path).await
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from an optional path or use default
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be read or parsed
    pub async fn load_or_default(path: Option<&Path>) -> Result<Self, Error> {
        match path {
            Some(config_path) => Self::load_from_file(config_path).await,
            None => Self::load().await,
        }
    }

    /// Write the configuration as TOML
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails or the file cannot be written.
    pub async fn save_to_file(&self, path: &Path) -> Result<(), Error> {
        let contents = toml::to_string_pretty(self).map_err(|e| ConfigError::SerializeError {
            error: e.to_string(),
        })?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| ConfigError::WriteError {
                    path: parent.display().to_string(),
                    error: e.to_string(),
                })?;
        }

        fs::write(path, contents)
            .await
            .map_err(|e| ConfigError::WriteError {
                path: path.display().to_string(),
                error: e.to_string(),
            })?;
        Ok(())
    }

    /// Merge with environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if environment variables contain invalid values
    /// that cannot be parsed into the expected types.
    pub fn merge_env(&mut self) -> Result<(), Error> {
        // STAGEHAND_TICK_INTERVAL_MS
        if let Ok(interval) = std::env::var(constants::ENV_TICK_INTERVAL_MS) {
            self.scheduler.tick_interval_ms =
                parse_env(constants::ENV_TICK_INTERVAL_MS, interval)?;
        }

        // STAGEHAND_COMPLETION_PROBABILITY
        if let Ok(probability) = std::env::var(constants::ENV_COMPLETION_PROBABILITY) {
            self.engine.completion_probability =
                parse_env(constants::ENV_COMPLETION_PROBABILITY, probability)?;
        }

        // STAGEHAND_FAILURE_PROBABILITY
        if let Ok(probability) = std::env::var(constants::ENV_FAILURE_PROBABILITY) {
            self.engine.failure_probability =
                parse_env(constants::ENV_FAILURE_PROBABILITY, probability)?;
        }

        // STAGEHAND_MAX_LOG_LINES
        if let Ok(lines) = std::env::var(constants::ENV_MAX_LOG_LINES) {
            self.engine.max_log_lines = parse_env(constants::ENV_MAX_LOG_LINES, lines)?;
        }

        // STAGEHAND_LOG_FORMAT
        if let Ok(format) = std::env::var(constants::ENV_LOG_FORMAT) {
            let parsed = match format.as_str() {
                "plain" => Some(LogFormat::Plain),
                "json" => Some(LogFormat::Json),
                _ => None,
            };
            self.general.log_format = parsed.ok_or_else(|| ConfigError::InvalidValue {
                field: constants::ENV_LOG_FORMAT.to_string(),
                value: format,
            })?;
        }

        Ok(())
    }

    /// Reject settings the engine cannot run with
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` for out-of-range probabilities or a
    /// zero tick interval, and `ConfigError::Invalid` for malformed or
    /// duplicate templates and templates reusing a built-in id.
    pub fn validate(&self) -> Result<(), Error> {
        let probability_fields = [
            ("engine.completion_probability", self.engine.completion_probability),
            ("engine.failure_probability", self.engine.failure_probability),
        ];
        for (field, value) in probability_fields {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    value: value.to_string(),
                }
                .into());
            }
        }

        let combined = self.engine.completion_probability + self.engine.failure_probability;
        if combined > 1.0 {
            return Err(ConfigError::Invalid {
                message: format!(
                    "completion and failure probabilities add up to {combined}, above 1"
                ),
            }
            .into());
        }

        if self.scheduler.tick_interval_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "scheduler.tick_interval_ms".to_string(),
                value: "0".to_string(),
            }
            .into());
        }

        let mut seen = HashSet::new();
        for template in &self.templates {
            template.validate().map_err(|e| ConfigError::Invalid {
                message: e.to_string(),
            })?;
            if constants::BUILTIN_TEMPLATE_IDS.contains(&template.id.as_str()) {
                return Err(ConfigError::Invalid {
                    message: format!("template '{}' shadows a built-in template", template.id),
                }
                .into());
            }
            if !seen.insert(template.id.as_str()) {
                return Err(ConfigError::Invalid {
                    message: format!("template '{}' is defined twice", template.id),
                }
                .into());
            }
        }

        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(field: &str, value: String) -> Result<T, Error> {
    value.parse().map_err(|_| {
        ConfigError::InvalidValue {
            field: field.to_string(),
            value,
        }
        .into()
    })
}

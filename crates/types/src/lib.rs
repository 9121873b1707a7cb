#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Core type definitions for the stagehand operation engine
//!
//! This crate provides the data model shared by every other crate: stage and
//! operation status machines, the stage/operation aggregates and the
//! templates they are materialized from.

pub mod operation;
pub mod stage;
pub mod status;
pub mod template;

// Re-export commonly used types
pub use operation::{Metadata, Operation, OperationFilter, OperationId};
pub use stage::{Checkpoint, Stage, StageLog};
pub use status::{OperationStatus, StageStatus};
pub use template::{OperationTemplate, StageSpec};
pub use uuid::Uuid;

use serde::{Deserialize, Serialize};

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Plain,
    Json,
}

// Implement clap::ValueEnum for LogFormat
impl clap::ValueEnum for LogFormat {
    fn value_variants<'a>() -> &'a [Self] {
        &[Self::Plain, Self::Json]
    }

    fn to_possible_value(&self) -> Option<clap::builder::PossibleValue> {
        Some(match self {
            Self::Plain => clap::builder::PossibleValue::new("plain"),
            Self::Json => clap::builder::PossibleValue::new("json"),
        })
    }
}

impl Default for LogFormat {
    fn default() -> Self {
        Self::Plain
    }
}

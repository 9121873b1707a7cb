//! Operation templates: named, ordered stage lists

use serde::{Deserialize, Serialize};
use stagehand_errors::EngineError;

use crate::Checkpoint;

/// Blueprint for one stage of a template
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageSpec {
    pub name: String,
    /// Fixed progress checkpoints; empty for pass/fail stages
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub checkpoints: Vec<Checkpoint>,
}

impl StageSpec {
    /// A pass/fail stage without progress
    #[must_use]
    pub fn discrete(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            checkpoints: Vec::new(),
        }
    }

    /// A percentage-driven stage
    #[must_use]
    pub fn with_checkpoints(name: impl Into<String>, checkpoints: Vec<Checkpoint>) -> Self {
        Self {
            name: name.into(),
            checkpoints,
        }
    }
}

/// Immutable recipe used to materialize a fresh operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationTemplate {
    pub id: String,
    pub name: String,
    pub stages: Vec<StageSpec>,
}

impl OperationTemplate {
    /// Template whose stages are all pass/fail
    pub fn new<I, S>(id: impl Into<String>, name: impl Into<String>, stage_names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id: id.into(),
            name: name.into(),
            stages: stage_names.into_iter().map(StageSpec::discrete).collect(),
        }
    }

    #[must_use]
    pub fn with_stage(mut self, stage: StageSpec) -> Self {
        self.stages.push(stage);
        self
    }

    #[must_use]
    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name.as_str()).collect()
    }

    /// Check the template is usable
    ///
    /// # Errors
    ///
    /// Returns `InvalidTemplate` when the id or a stage name is blank, the
    /// stage list is empty, or checkpoints are not strictly increasing within
    /// 1-100 and ending at 100.
    pub fn validate(&self) -> Result<(), EngineError> {
        let invalid = |reason: String| EngineError::InvalidTemplate {
            template_id: self.id.clone(),
            reason,
        };

        if self.id.trim().is_empty() {
            return Err(invalid("template id is empty".to_string()));
        }
        if self.stages.is_empty() {
            return Err(invalid("template has no stages".to_string()));
        }

        for (index, stage) in self.stages.iter().enumerate() {
            if stage.name.trim().is_empty() {
                return Err(invalid(format!("stage {index} has an empty name")));
            }
            if stage.checkpoints.is_empty() {
                continue;
            }

            let mut previous = 0u8;
            for checkpoint in &stage.checkpoints {
                if checkpoint.progress <= previous || checkpoint.progress > 100 {
                    return Err(invalid(format!(
                        "stage '{}' has checkpoint {} out of order or range",
                        stage.name, checkpoint.progress
                    )));
                }
                previous = checkpoint.progress;
            }
            if previous != 100 {
                return Err(invalid(format!(
                    "stage '{}' checkpoints must end at 100",
                    stage.name
                )));
            }
        }

        Ok(())
    }
}

/// Derive a stage id that stays stable for the life of an operation
#[must_use]
pub fn stage_id(index: usize, name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
        } else if !slug.ends_with('-') {
            slug.push('-');
        }
    }
    let slug = slug.trim_matches('-');
    format!("{}-{}", index + 1, slug)
}

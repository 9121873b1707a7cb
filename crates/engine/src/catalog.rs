//! Template catalog: the read-only set of templates operations are made from

use std::collections::HashMap;

use stagehand_config::Config;
use stagehand_errors::EngineError;
use stagehand_types::{Checkpoint, OperationTemplate, StageSpec};

/// Validated, id-unique templates in registration order
#[derive(Debug, Clone, Default)]
pub struct TemplateCatalog {
    templates: Vec<OperationTemplate>,
    by_id: HashMap<String, usize>,
}

impl TemplateCatalog {
    /// Build a catalog from an explicit template list
    ///
    /// # Errors
    ///
    /// Returns `InvalidTemplate` for a malformed template or
    /// `DuplicateTemplate` when two templates share an id.
    pub fn new(templates: impl IntoIterator<Item = OperationTemplate>) -> Result<Self, EngineError> {
        Self::default().with_templates(templates)
    }

    /// The templates every stagehand process starts with
    #[must_use]
    pub fn builtin() -> Self {
        let mut catalog = Self::default();
        for template in builtin_templates() {
            catalog.by_id.insert(template.id.clone(), catalog.templates.len());
            catalog.templates.push(template);
        }
        catalog
    }

    /// Built-in templates plus any defined in the configuration
    ///
    /// # Errors
    ///
    /// Fails if a configured template is invalid or reuses an existing id.
    pub fn from_config(config: &Config) -> Result<Self, EngineError> {
        Self::builtin().with_templates(config.templates.iter().cloned())
    }

    /// Append templates after validating each one
    ///
    /// # Errors
    ///
    /// Returns `InvalidTemplate` or `DuplicateTemplate`.
    pub fn with_templates(
        mut self,
        templates: impl IntoIterator<Item = OperationTemplate>,
    ) -> Result<Self, EngineError> {
        for template in templates {
            template.validate()?;
            if self.by_id.contains_key(&template.id) {
                return Err(EngineError::DuplicateTemplate {
                    template_id: template.id,
                });
            }
            self.by_id.insert(template.id.clone(), self.templates.len());
            self.templates.push(template);
        }
        Ok(self)
    }

    /// Look up a template by id
    ///
    /// # Errors
    ///
    /// Returns `UnknownTemplate` if no template has this id.
    pub fn get(&self, template_id: &str) -> Result<&OperationTemplate, EngineError> {
        self.by_id
            .get(template_id)
            .and_then(|&index| self.templates.get(index))
            .ok_or_else(|| EngineError::UnknownTemplate {
                template_id: template_id.to_string(),
            })
    }

    #[must_use]
    pub fn contains(&self, template_id: &str) -> bool {
        self.by_id.contains_key(template_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &OperationTemplate> {
        self.templates.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.templates.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

fn builtin_templates() -> Vec<OperationTemplate> {
    vec![
        OperationTemplate::new(
            "react-app",
            "React app pipeline",
            ["Install", "Lint", "Test", "Build", "Deploy", "E2E Tests"],
        ),
        OperationTemplate::new(
            "rust-service",
            "Rust service pipeline",
            ["Fetch", "Clippy", "Test", "Build", "Package"],
        ),
        OperationTemplate::new(
            "static-site",
            "Static site pipeline",
            ["Install", "Build", "Publish"],
        ),
        sync_template(
            "marketplace-sync",
            "Marketplace sync",
            "Sync",
            [
                "Connecting to marketplace",
                "Fetching listings",
                "Reconciling products",
                "Publishing changes",
                "Sync complete",
            ],
        ),
        sync_template(
            "inventory-sync",
            "Inventory sync",
            "Inventory",
            [
                "Loading stock levels",
                "Matching SKUs",
                "Updating quantities",
                "Flagging low stock",
                "Inventory updated",
            ],
        ),
    ]
}

// Single checkpoint stage at 20/40/60/80/100
fn sync_template(id: &str, name: &str, stage: &str, messages: [&str; 5]) -> OperationTemplate {
    let checkpoints = [20u8, 40, 60, 80, 100]
        .into_iter()
        .zip(messages)
        .map(|(progress, message)| Checkpoint::new(progress, message))
        .collect();
    OperationTemplate::new(id, name, Vec::<String>::new())
        .with_stage(StageSpec::with_checkpoints(stage, checkpoints))
}

//! Pipeline builder with upfront validation.
//!
//! Every artifact reference is checked while the definition is assembled,
//! so a dangling input fails construction instead of surfacing mid-run.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use super::spec::{Pipeline, StageSpec};
use crate::core::ArtifactName;
use crate::errors::ConfigurationError;
use crate::store::ArtifactStore;

/// Builder for creating validated pipelines.
#[derive(Debug)]
pub struct PipelineBuilder {
    name: String,
    store: Arc<ArtifactStore>,
    stages: Vec<StageSpec>,
    /// Output artifact -> index of the producing stage.
    produced: HashMap<ArtifactName, usize>,
    action_names: HashSet<String>,
}

impl PipelineBuilder {
    /// Creates a builder for a pipeline owning the given store.
    #[must_use]
    pub fn new(name: impl Into<String>, store: Arc<ArtifactStore>) -> Self {
        Self {
            name: name.into(),
            store,
            stages: Vec::new(),
            produced: HashMap::new(),
            action_names: HashSet::new(),
        }
    }

    /// Adds the next stage.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigurationError`] for an empty stage, a duplicate
    /// stage or action name, a duplicate output artifact, or an input
    /// artifact not produced by an action in an earlier stage.
    pub fn stage(mut self, stage: StageSpec) -> Result<Self, ConfigurationError> {
        if stage.actions.is_empty() {
            return Err(
                ConfigurationError::new(format!("stage '{}' has no actions", stage.name))
                    .with_stages(vec![stage.name]),
            );
        }
        if self.stages.iter().any(|s| s.name == stage.name) {
            return Err(
                ConfigurationError::new(format!("duplicate stage name '{}'", stage.name))
                    .with_stages(vec![stage.name]),
            );
        }

        let stage_index = self.stages.len();
        for action in &stage.actions {
            action.validate()?;

            if !self.action_names.insert(action.name.clone()) {
                return Err(ConfigurationError::new(format!(
                    "duplicate action name '{}'",
                    action.name
                ))
                .with_stages(vec![stage.name.clone()])
                .with_actions(vec![action.name.clone()]));
            }

            for input in &action.inputs {
                match self.produced.get(input) {
                    Some(&producer_stage) if producer_stage < stage_index => {}
                    Some(_) => {
                        return Err(ConfigurationError::new(format!(
                            "action '{}' consumes artifact '{input}' produced in its own stage; \
                             inputs must come from an earlier stage",
                            action.name
                        ))
                        .with_stages(vec![stage.name.clone()])
                        .with_actions(vec![action.name.clone()]));
                    }
                    None => {
                        return Err(ConfigurationError::new(format!(
                            "action '{}' consumes artifact '{input}' which no earlier action produces",
                            action.name
                        ))
                        .with_stages(vec![stage.name.clone()])
                        .with_actions(vec![action.name.clone()]));
                    }
                }
            }

            for output in &action.outputs {
                if self.produced.insert(output.clone(), stage_index).is_some() {
                    return Err(ConfigurationError::new(format!(
                        "artifact '{output}' is produced more than once"
                    ))
                    .with_stages(vec![stage.name.clone()])
                    .with_actions(vec![action.name.clone()]));
                }
            }
        }

        self.stages.push(stage);
        Ok(self)
    }

    /// Builds the validated pipeline.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigurationError`] for an empty name or a pipeline
    /// with no stages.
    pub fn build(self) -> Result<Pipeline, ConfigurationError> {
        if self.name.trim().is_empty() {
            return Err(ConfigurationError::new("pipeline name cannot be empty"));
        }
        if self.stages.is_empty() {
            return Err(ConfigurationError::new("pipeline has no stages"));
        }
        Ok(Pipeline::new(self.name, self.stages, self.store))
    }

    /// Returns the number of stages added so far.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }
}

//! Pipeline and stage specifications.

use std::sync::Arc;

use crate::actions::Action;
use crate::core::{ActionKind, ArtifactName};
use crate::errors::ConfigurationError;
use crate::store::ArtifactStore;

/// Specification for a single action within a stage.
#[derive(Debug, Clone)]
pub struct ActionSpec {
    /// The unique name of the action.
    pub name: String,
    /// The kind of work the action performs.
    pub kind: ActionKind,
    /// Artifacts the action consumes; each must be produced by an action in
    /// an earlier stage.
    pub inputs: Vec<ArtifactName>,
    /// Artifacts the action publishes on success.
    pub outputs: Vec<ArtifactName>,
    /// The action implementation.
    pub runner: Arc<dyn Action>,
}

impl ActionSpec {
    /// Creates a specification around an action implementation.
    ///
    /// Name and kind are taken from the runner.
    #[must_use]
    pub fn new(runner: Arc<dyn Action>) -> Self {
        Self {
            name: runner.name().to_string(),
            kind: runner.kind(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            runner,
        }
    }

    /// Declares an input artifact.
    #[must_use]
    pub fn with_input(mut self, input: impl Into<ArtifactName>) -> Self {
        self.inputs.push(input.into());
        self
    }

    /// Declares an output artifact.
    #[must_use]
    pub fn with_output(mut self, output: impl Into<ArtifactName>) -> Self {
        self.outputs.push(output.into());
        self
    }

    /// Validates the action specification in isolation.
    ///
    /// # Errors
    ///
    /// Returns an error for an empty name or an action consuming its own
    /// output.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.name.trim().is_empty() {
            return Err(ConfigurationError::new("action name cannot be empty"));
        }
        for input in &self.inputs {
            if self.outputs.contains(input) {
                return Err(ConfigurationError::new(format!(
                    "action '{}' cannot consume its own output artifact '{input}'",
                    self.name
                ))
                .with_actions(vec![self.name.clone()]));
            }
        }
        Ok(())
    }
}

/// Specification for a stage: a named set of actions run concurrently.
#[derive(Debug, Clone)]
pub struct StageSpec {
    /// The unique name of the stage.
    pub name: String,
    /// The actions in declaration order.
    pub actions: Vec<ActionSpec>,
}

impl StageSpec {
    /// Creates an empty stage specification.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            actions: Vec::new(),
        }
    }

    /// Adds an action to the stage.
    #[must_use]
    pub fn with_action(mut self, action: ActionSpec) -> Self {
        self.actions.push(action);
        self
    }
}

/// A fully validated pipeline.
///
/// Only obtainable through [`crate::pipeline::PipelineBuilder::build`], so
/// every artifact reference is known to resolve to an earlier stage before
/// the controller starts.
#[derive(Debug)]
pub struct Pipeline {
    name: String,
    stages: Vec<StageSpec>,
    store: Arc<ArtifactStore>,
}

impl Pipeline {
    pub(crate) fn new(name: String, stages: Vec<StageSpec>, store: Arc<ArtifactStore>) -> Self {
        Self {
            name,
            stages,
            store,
        }
    }

    /// Returns the pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the stages in execution order.
    #[must_use]
    pub fn stages(&self) -> &[StageSpec] {
        &self.stages
    }

    /// Returns the pipeline's artifact store.
    #[must_use]
    pub fn store(&self) -> &Arc<ArtifactStore> {
        &self.store
    }

    /// Returns the number of stages.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }
}

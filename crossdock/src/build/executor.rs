//! Build execution against a workspace directory.

use anyhow::Context as _;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use uuid::Uuid;

use super::definition::{match_pattern, BuildDefinition};
use crate::actions::{Action, ActionContext, ActionOutcome};
use crate::core::{ActionKind, ArtifactName, ArtifactRef, Principal};
use crate::errors::{BuildError, ErrorKind};
use crate::store::ArtifactStore;

/// Runs build definitions inside a workspace directory.
#[derive(Debug, Clone)]
pub struct BuildExecutor {
    workspace: PathBuf,
}

impl BuildExecutor {
    /// Creates an executor rooted at the given workspace.
    #[must_use]
    pub fn new(workspace: impl Into<PathBuf>) -> Self {
        Self {
            workspace: workspace.into(),
        }
    }

    /// Returns the workspace root.
    #[must_use]
    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    /// Executes a build definition and publishes its declared outputs.
    ///
    /// Outputs are staged in memory and committed through the store's
    /// all-or-nothing publication, so a failing group or a missing output
    /// file publishes nothing.
    ///
    /// # Errors
    ///
    /// `Failed` on a nonzero command-group exit; `MissingOutput` when a
    /// selection rule matches no produced file; `Publish` when the store
    /// refuses the commit.
    pub async fn execute(
        &self,
        definition: &BuildDefinition,
        store: &ArtifactStore,
        key_id: Uuid,
        principal: &Principal,
    ) -> Result<Vec<ArtifactRef>, BuildError> {
        for (group, commands) in definition.groups() {
            self.run_group(&definition.name, group, commands).await?;
        }

        let staged = self.select_outputs(definition).await?;
        let entries = staged
            .into_iter()
            .map(|(artifact, payload)| (artifact, payload, key_id))
            .collect();
        Ok(store.put_many(entries, principal)?)
    }

    /// Runs one command group through the shell, failing on nonzero exit.
    async fn run_group(
        &self,
        build_name: &str,
        group: &'static str,
        commands: &[String],
    ) -> Result<(), BuildError> {
        let script = commands.join(" && ");
        tracing::debug!(build = build_name, group, "running build group");

        let child = Command::new("sh")
            .arg("-c")
            .arg(&script)
            .current_dir(&self.workspace)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("failed to spawn build group '{group}'"))?;

        let output = child
            .wait_with_output()
            .await
            .with_context(|| format!("failed to wait for build group '{group}'"))?;

        if !output.status.success() {
            let exit_code = output.status.code().unwrap_or(-1);
            tracing::warn!(build = build_name, group, exit_code, "build group failed");
            return Err(BuildError::Failed {
                group: group.to_string(),
                exit_code,
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }

        Ok(())
    }

    /// Resolves every selection rule to a produced file, reading payloads.
    async fn select_outputs(
        &self,
        definition: &BuildDefinition,
    ) -> Result<Vec<(ArtifactName, Vec<u8>)>, BuildError> {
        let base = self.workspace.join(&definition.selection.base_dir);
        let produced = list_files(&base)
            .with_context(|| format!("failed to list build outputs under {}", base.display()))?;

        let mut staged = Vec::with_capacity(definition.selection.rules.len());
        for rule in &definition.selection.rules {
            let file = produced
                .iter()
                .find(|rel| match_pattern(&rule.pattern, rel))
                .ok_or_else(|| BuildError::MissingOutput {
                    artifact: rule.artifact.to_string(),
                    pattern: rule.pattern.clone(),
                })?;
            let payload = tokio::fs::read(base.join(file))
                .await
                .with_context(|| format!("failed to read build output '{file}'"))?;
            staged.push((rule.artifact.clone(), payload));
        }
        Ok(staged)
    }
}

/// Lists files under `dir` as sorted relative paths.
fn list_files(dir: &Path) -> std::io::Result<Vec<String>> {
    let mut files = Vec::new();
    let mut pending = vec![dir.to_path_buf()];

    while let Some(current) = pending.pop() {
        for entry in std::fs::read_dir(&current)? {
            let entry = entry?;
            let path = entry.path();
            if path.is_dir() {
                pending.push(path);
            } else if let Ok(rel) = path.strip_prefix(dir) {
                files.push(rel.to_string_lossy().into_owned());
            }
        }
    }

    files.sort();
    Ok(files)
}

/// A build unit of work inside a stage.
#[derive(Debug)]
pub struct BuildAction {
    name: String,
    definition: BuildDefinition,
    input: Option<ArtifactName>,
    key_id: Uuid,
    principal: Principal,
    executor: BuildExecutor,
}

impl BuildAction {
    /// Creates a build action publishing under the given key.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        definition: BuildDefinition,
        executor: BuildExecutor,
        key_id: Uuid,
        principal: Principal,
    ) -> Self {
        Self {
            name: name.into(),
            definition,
            input: None,
            key_id,
            principal,
            executor,
        }
    }

    /// Declares the input artifact the build consumes.
    ///
    /// The payload is materialized into the workspace under the artifact's
    /// name before any command group runs.
    #[must_use]
    pub fn with_input(mut self, input: ArtifactName) -> Self {
        self.input = Some(input);
        self
    }

    async fn materialize_input(&self, ctx: &ActionContext) -> Result<(), ActionOutcome> {
        let Some(input) = &self.input else {
            return Ok(());
        };

        let Some(artifact) = ctx.store.resolve(input) else {
            return Err(ActionOutcome::failed(
                ErrorKind::NotFound,
                format!("input artifact '{input}' has not been committed"),
            ));
        };
        let payload = ctx
            .store
            .get(&artifact, &self.principal)
            .map_err(|e| ActionOutcome::failed(e.kind(), e.to_string()))?;

        let target = self.executor.workspace().join(input.as_str());
        tokio::fs::write(&target, payload)
            .await
            .map_err(|e| ActionOutcome::failed(ErrorKind::BuildFailed, e.to_string()))
    }
}

#[async_trait]
impl Action for BuildAction {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ActionKind {
        ActionKind::Build
    }

    async fn execute(&self, ctx: &ActionContext) -> ActionOutcome {
        if let Err(outcome) = self.materialize_input(ctx).await {
            return outcome;
        }

        match self
            .executor
            .execute(&self.definition, &ctx.store, self.key_id, &self.principal)
            .await
        {
            Ok(outputs) => ActionOutcome::succeeded(outputs),
            Err(e) => ActionOutcome::failed(e.kind(), e.to_string()),
        }
    }
}

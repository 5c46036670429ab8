//! Build definitions: ordered command groups and the artifact selection rule.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::core::ArtifactName;

/// Maps one declared output artifact to a file selection pattern.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputRule {
    /// The declared output artifact name.
    pub artifact: ArtifactName,
    /// Pattern matched against produced file paths (single `*` wildcard).
    pub pattern: String,
}

/// Which produced files become output artifacts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactSelection {
    /// Directory (relative to the build workspace) to select files from.
    pub base_dir: PathBuf,
    /// One rule per declared output artifact.
    pub rules: Vec<OutputRule>,
}

/// A named build definition.
///
/// Command groups run in declared order; a nonzero exit in any group is
/// fatal for the action and publishes nothing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildDefinition {
    /// The build definition name.
    pub name: String,
    /// Dependency installation commands.
    #[serde(default)]
    pub install: Vec<String>,
    /// Build commands.
    pub build: Vec<String>,
    /// Output artifact selection.
    pub selection: ArtifactSelection,
}

impl BuildDefinition {
    /// Creates a build definition with no install group.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        build: Vec<String>,
        selection: ArtifactSelection,
    ) -> Self {
        Self {
            name: name.into(),
            install: Vec::new(),
            build,
            selection,
        }
    }

    /// Sets the install command group.
    #[must_use]
    pub fn with_install(mut self, install: Vec<String>) -> Self {
        self.install = install;
        self
    }

    /// The command groups in execution order, skipping empty groups.
    #[must_use]
    pub fn groups(&self) -> Vec<(&'static str, &[String])> {
        let mut groups = Vec::new();
        if !self.install.is_empty() {
            groups.push(("install", self.install.as_slice()));
        }
        if !self.build.is_empty() {
            groups.push(("build", self.build.as_slice()));
        }
        groups
    }
}

/// Glob-like pattern matching for produced file paths.
///
/// Supports a single `*` matching any sequence of characters; patterns with
/// more wildcards fall back to exact comparison.
#[must_use]
pub(crate) fn match_pattern(pattern: &str, value: &str) -> bool {
    if pattern == "*" {
        return true;
    }

    if !pattern.contains('*') {
        return pattern == value;
    }

    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 2 {
        let prefix = parts[0];
        let suffix = parts[1];
        return value.starts_with(prefix)
            && value.ends_with(suffix)
            && value.len() >= prefix.len() + suffix.len();
    }

    pattern == value
}

//! Action status and kind enums.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The kind of work an action performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// Pulls a revision from an external source and materializes it as an artifact.
    SourcePull,
    /// Runs a build definition against an input artifact.
    Build,
    /// Applies an infrastructure change in a foreign account.
    Deploy,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SourcePull => write!(f, "source_pull"),
            Self::Build => write!(f, "build"),
            Self::Deploy => write!(f, "deploy"),
        }
    }
}

/// The execution status of an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    /// Action has not started yet.
    Pending,
    /// Action is currently running.
    Running,
    /// Action completed successfully.
    Succeeded,
    /// Action failed.
    Failed,
}

impl Default for ActionStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl ActionStatus {
    /// Returns true if the status represents a terminal state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }

    /// Returns true if the status indicates success.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }
}

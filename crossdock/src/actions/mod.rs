//! Action trait and outcome types.
//!
//! Actions are the units of work inside a stage: source pulls, builds, and
//! deploys all implement [`Action`] and are driven concurrently by the
//! controller.

use async_trait::async_trait;
use std::fmt::Debug;
use std::sync::Arc;
use uuid::Uuid;

use crate::core::{ActionKind, ActionStatus, ArtifactRef};
use crate::errors::ErrorKind;
use crate::events::EventSink;
use crate::store::ArtifactStore;

/// Execution context handed to an action by the controller.
#[derive(Clone)]
pub struct ActionContext {
    /// The id of the pipeline run this action executes in.
    pub run_id: Uuid,
    /// The stage the action belongs to.
    pub stage: String,
    /// The pipeline's artifact store.
    pub store: Arc<ArtifactStore>,
    /// Sink for action-level events.
    pub events: Arc<dyn EventSink>,
}

impl Debug for ActionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionContext")
            .field("run_id", &self.run_id)
            .field("stage", &self.stage)
            .finish()
    }
}

/// The terminal outcome of one action execution.
#[derive(Debug, Clone)]
pub struct ActionOutcome {
    /// Terminal status; always `Succeeded` or `Failed`.
    pub status: ActionStatus,
    /// Failure classification, present iff the action failed.
    pub error: Option<(ErrorKind, String)>,
    /// Artifacts the action published.
    pub outputs: Vec<ArtifactRef>,
}

impl ActionOutcome {
    /// A successful outcome with published artifacts.
    #[must_use]
    pub fn succeeded(outputs: Vec<ArtifactRef>) -> Self {
        Self {
            status: ActionStatus::Succeeded,
            error: None,
            outputs,
        }
    }

    /// A failed outcome with a classified error.
    #[must_use]
    pub fn failed(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            status: ActionStatus::Failed,
            error: Some((kind, message.into())),
            outputs: Vec::new(),
        }
    }

    /// Returns true if the action succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

/// Trait for pipeline actions.
#[async_trait]
pub trait Action: Send + Sync + Debug {
    /// Returns the name of the action.
    fn name(&self) -> &str;

    /// Returns the kind of work this action performs.
    fn kind(&self) -> ActionKind;

    /// Executes the action to a terminal outcome.
    ///
    /// Implementations report failure through the outcome rather than
    /// panicking; the controller treats any failed outcome as fatal for the
    /// stage.
    async fn execute(&self, ctx: &ActionContext) -> ActionOutcome;
}

/// A no-op action for wiring and tests.
#[derive(Debug, Clone)]
pub struct NoOpAction {
    name: String,
    kind: ActionKind,
}

impl NoOpAction {
    /// Creates a new no-op action.
    #[must_use]
    pub fn new(name: impl Into<String>, kind: ActionKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

#[async_trait]
impl Action for NoOpAction {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ActionKind {
        self.kind
    }

    async fn execute(&self, _ctx: &ActionContext) -> ActionOutcome {
        ActionOutcome::succeeded(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::NoOpEventSink;
    use crate::keys::KeyRing;

    fn test_context() -> ActionContext {
        let keys = Arc::new(KeyRing::new());
        ActionContext {
            run_id: Uuid::new_v4(),
            stage: "build".to_string(),
            store: Arc::new(ArtifactStore::new("bucket", keys)),
            events: Arc::new(NoOpEventSink),
        }
    }

    #[tokio::test]
    async fn test_noop_action_succeeds() {
        let action = NoOpAction::new("noop", ActionKind::Build);
        let outcome = action.execute(&test_context()).await;

        assert!(outcome.is_success());
        assert!(outcome.outputs.is_empty());
    }

    #[test]
    fn test_failed_outcome_carries_kind() {
        let outcome = ActionOutcome::failed(ErrorKind::BuildFailed, "exit 1");

        assert!(!outcome.is_success());
        let (kind, message) = outcome.error.unwrap();
        assert_eq!(kind, ErrorKind::BuildFailed);
        assert_eq!(message, "exit 1");
    }
}

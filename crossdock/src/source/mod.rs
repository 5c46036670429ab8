//! Revision sources and the polling trigger.

#[cfg(feature = "remote-source")]
mod http;
mod poll;

#[cfg(feature = "remote-source")]
pub use http::HttpRevisionSource;
pub use poll::{PollingTrigger, RunLauncher};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

use crate::actions::{Action, ActionContext, ActionOutcome};
use crate::core::{ActionKind, ArtifactName, Principal};
use crate::errors::SourceError;

/// Identity of an external revision source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoIdentity {
    /// Repository owner.
    pub owner: String,
    /// Repository name.
    pub repo: String,
    /// Watched branch.
    pub branch: String,
}

impl RepoIdentity {
    /// Creates a new repository identity.
    #[must_use]
    pub fn new(
        owner: impl Into<String>,
        repo: impl Into<String>,
        branch: impl Into<String>,
    ) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
            branch: branch.into(),
        }
    }
}

impl fmt::Display for RepoIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}@{}", self.owner, self.repo, self.branch)
    }
}

/// A revision observed at the head of the watched branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Revision {
    /// Source-assigned revision identifier.
    pub id: String,
    /// The revision snapshot payload.
    pub payload: Vec<u8>,
}

/// Consults an external revision source.
#[async_trait]
pub trait RevisionSource: Send + Sync {
    /// Returns the watched identity.
    fn identity(&self) -> &RepoIdentity;

    /// Fetches the current head revision.
    ///
    /// # Errors
    ///
    /// `Unreachable` / `Auth` / `MissingSecret` per the transport.
    async fn head(&self) -> Result<Revision, SourceError>;
}

/// A source-pull unit of work inside a stage.
///
/// Materializes the current head revision as the pipeline's source
/// artifact.
pub struct SourcePullAction {
    name: String,
    source: Arc<dyn RevisionSource>,
    output: ArtifactName,
    key_id: Uuid,
    principal: Principal,
}

impl SourcePullAction {
    /// Creates a source-pull action publishing under the given key.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        source: Arc<dyn RevisionSource>,
        output: ArtifactName,
        key_id: Uuid,
        principal: Principal,
    ) -> Self {
        Self {
            name: name.into(),
            source,
            output,
            key_id,
            principal,
        }
    }
}

impl fmt::Debug for SourcePullAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourcePullAction")
            .field("name", &self.name)
            .field("identity", self.source.identity())
            .field("output", &self.output)
            .finish()
    }
}

#[async_trait]
impl Action for SourcePullAction {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ActionKind {
        ActionKind::SourcePull
    }

    async fn execute(&self, ctx: &ActionContext) -> ActionOutcome {
        let revision = match self.source.head().await {
            Ok(revision) => revision,
            Err(e) => return ActionOutcome::failed(e.kind(), e.to_string()),
        };

        tracing::debug!(
            identity = %self.source.identity(),
            revision = %revision.id,
            "materializing source revision"
        );

        match ctx
            .store
            .put(&self.output, revision.payload, self.key_id, &self.principal)
        {
            Ok(artifact) => ActionOutcome::succeeded(vec![artifact]),
            Err(e) => ActionOutcome::failed(e.kind(), e.to_string()),
        }
    }
}

//! The deploy action: assume, resolve, submit, wait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
#[cfg(test)]
use mockall::automock;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use super::overrides::ParameterOverrides;
use crate::actions::{Action, ActionContext, ActionOutcome};
use crate::core::{ActionKind, ArtifactLocation, ArtifactName};
use crate::errors::{DeployError, StoreError};
use crate::store::ArtifactStore;
use crate::trust::{RoleHandle, SessionCredentials, TrustBroker, TrustedOperation};

/// The payload submitted to the foreign account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeSet {
    /// The name of the change target (created if missing, updated in place
    /// otherwise).
    pub change_name: String,
    /// Where the template artifact lives; the target reads it itself.
    pub template_location: ArtifactLocation,
    /// Flat parameter-name to value map.
    pub parameters: BTreeMap<String, String>,
}

/// How the target applied the change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeOutcome {
    /// The target did not exist and was created.
    Created,
    /// The target existed and was updated in place.
    Updated,
}

/// A refusal from the foreign account's safety checks.
#[derive(Debug, Clone, Error)]
#[error("{reason}")]
pub struct ChangeRejection {
    /// The target-side refusal reason.
    pub reason: String,
}

impl ChangeRejection {
    /// Creates a new rejection.
    #[must_use]
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// The foreign-account change-apply interface.
///
/// `apply` covers submission and the wait for a terminal state; the deploy
/// action bounds the whole call with its timeout.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ChangeTarget: Send + Sync {
    /// Applies a change with create-or-update semantics, returning once the
    /// operation reaches a terminal state.
    ///
    /// # Errors
    ///
    /// [`ChangeRejection`] when the target's safety checks refuse the change.
    async fn apply(
        &self,
        session: &SessionCredentials,
        change: ChangeSet,
    ) -> Result<ChangeOutcome, ChangeRejection>;
}

/// Result of a completed deploy.
#[derive(Debug, Clone)]
pub struct DeployOutcome {
    /// The change target name.
    pub change_name: String,
    /// Whether the target was created or updated.
    pub outcome: ChangeOutcome,
    /// When the apply call returned.
    pub applied_at: DateTime<Utc>,
}

/// A deploy unit of work inside a stage.
///
/// Holds two independently configured role handles: the execution role that
/// applies the change and the orchestration role that reads staged
/// artifacts across the account boundary. No privilege hierarchy between
/// them is assumed; each assumption is checked on its own.
pub struct DeployAction {
    name: String,
    change_name: String,
    template: ArtifactName,
    overrides: ParameterOverrides,
    execution_role: RoleHandle,
    orchestration_role: RoleHandle,
    broker: Arc<dyn TrustBroker>,
    target: Arc<dyn ChangeTarget>,
    timeout: Duration,
}

impl std::fmt::Debug for DeployAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeployAction")
            .field("name", &self.name)
            .field("change_name", &self.change_name)
            .field("template", &self.template)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl DeployAction {
    /// Default bound on the wait for the foreign-account terminal state.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1800);

    /// Creates a deploy action.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: impl Into<String>,
        change_name: impl Into<String>,
        template: ArtifactName,
        overrides: ParameterOverrides,
        execution_role: RoleHandle,
        orchestration_role: RoleHandle,
        broker: Arc<dyn TrustBroker>,
        target: Arc<dyn ChangeTarget>,
    ) -> Self {
        Self {
            name: name.into(),
            change_name: change_name.into(),
            template,
            overrides,
            execution_role,
            orchestration_role,
            broker,
            target,
            timeout: Self::DEFAULT_TIMEOUT,
        }
    }

    /// Bounds the wait for the foreign-account terminal state.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The template artifact this action reads the location of.
    #[must_use]
    pub fn template(&self) -> &ArtifactName {
        &self.template
    }

    /// The parameter override bindings.
    #[must_use]
    pub fn overrides(&self) -> &ParameterOverrides {
        &self.overrides
    }

    /// Runs the deploy to completion.
    ///
    /// A refused assumption returns before the change target is contacted.
    ///
    /// # Errors
    ///
    /// `Trust` on a refused assumption (fatal, never retried);
    /// `Store` when the template artifact is not committed;
    /// `ChangeRejected` and `Timeout` per the change target's behavior.
    pub async fn deploy(&self, store: &ArtifactStore) -> Result<DeployOutcome, DeployError> {
        let session = self
            .broker
            .assume(
                &self.execution_role,
                &HashSet::from([TrustedOperation::ApplyChange]),
            )
            .await?;
        self.broker
            .assume(
                &self.orchestration_role,
                &HashSet::from([TrustedOperation::ReadArtifacts]),
            )
            .await?;

        // Location only; the template payload never passes through here.
        let template_location = store
            .resolve(&self.template)
            .map(|artifact| artifact.location)
            .ok_or_else(|| {
                DeployError::Store(StoreError::NotFound {
                    key: store.location_of(&self.template).key,
                })
            })?;
        let parameters = self.overrides.resolve(store);

        let change = ChangeSet {
            change_name: self.change_name.clone(),
            template_location,
            parameters,
        };

        tracing::info!(
            change = %self.change_name,
            account = %self.execution_role.account(),
            "submitting change to foreign account"
        );

        let applied = tokio::time::timeout(self.timeout, self.target.apply(&session, change))
            .await
            .map_err(|_| DeployError::Timeout {
                seconds: self.timeout.as_secs(),
            })?
            .map_err(|rejection| DeployError::ChangeRejected {
                reason: rejection.reason,
            })?;

        Ok(DeployOutcome {
            change_name: self.change_name.clone(),
            outcome: applied,
            applied_at: Utc::now(),
        })
    }
}

#[async_trait]
impl Action for DeployAction {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ActionKind {
        ActionKind::Deploy
    }

    async fn execute(&self, ctx: &ActionContext) -> ActionOutcome {
        match self.deploy(&ctx.store).await {
            Ok(outcome) => {
                ctx.events.try_emit(
                    "deploy.applied",
                    Some(serde_json::json!({
                        "change": outcome.change_name,
                        "outcome": format!("{:?}", outcome.outcome),
                    })),
                );
                ActionOutcome::succeeded(Vec::new())
            }
            Err(e) => ActionOutcome::failed(e.kind(), e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Principal;
    use crate::errors::TrustError;
    use crate::keys::{KeyOp, KeyRing};
    use crate::trust::{AccountId, StaticTrustBroker};
    use pretty_assertions::assert_eq;
    use uuid::Uuid;

    const WORKLOAD_ACCOUNT: &str = "222222222222";

    fn broker() -> Arc<StaticTrustBroker> {
        Arc::new(
            StaticTrustBroker::new()
                .with_role(
                    AccountId::new(WORKLOAD_ACCOUNT),
                    "change-execution",
                    [TrustedOperation::ApplyChange],
                )
                .with_role(
                    AccountId::new(WORKLOAD_ACCOUNT),
                    "pipeline-access",
                    [TrustedOperation::ReadArtifacts],
                ),
        )
    }

    fn roles(broker: &StaticTrustBroker) -> (RoleHandle, RoleHandle) {
        let account = AccountId::new(WORKLOAD_ACCOUNT);
        (
            broker.resolve_role(&account, "change-execution").unwrap(),
            broker.resolve_role(&account, "pipeline-access").unwrap(),
        )
    }

    fn store_with_template() -> (Arc<ArtifactStore>, Uuid, Principal) {
        let keys = Arc::new(KeyRing::new());
        let key_id = keys.create_key();
        let builder = Principal::scoped("111111111111", "build-role");
        keys.grant(key_id, &builder, &[KeyOp::Encrypt]);
        let store = Arc::new(ArtifactStore::new("pipeline-bucket", keys));
        store
            .put(
                &ArtifactName::new("template"),
                br#"{"Resources": {}}"#.to_vec(),
                key_id,
                &builder,
            )
            .unwrap();
        (store, key_id, builder)
    }

    fn action(target: Arc<dyn ChangeTarget>) -> (DeployAction, Arc<ArtifactStore>) {
        let b = broker();
        let (execution, orchestration) = roles(&b);
        let (store, _, _) = store_with_template();
        let action = DeployAction::new(
            "apply-change",
            "webapp-stack",
            ArtifactName::new("template"),
            ParameterOverrides::new()
                .artifact_location("BundleLocation", ArtifactName::new("template")),
            execution,
            orchestration,
            b,
            target,
        );
        (action, store)
    }

    #[tokio::test]
    async fn test_deploy_submits_resolved_parameters() {
        let mut target = MockChangeTarget::new();
        target
            .expect_apply()
            .withf(|_, change| {
                change.change_name == "webapp-stack"
                    && change.parameters["BundleLocation"].contains("artifacts/template")
            })
            .times(1)
            .returning(|_, _| Ok(ChangeOutcome::Created));

        let (action, store) = action(Arc::new(target));
        let outcome = action.deploy(&store).await.unwrap();

        assert_eq!(outcome.outcome, ChangeOutcome::Created);
        assert_eq!(outcome.change_name, "webapp-stack");
    }

    #[tokio::test]
    async fn test_trust_denied_never_contacts_target() {
        let mut target = MockChangeTarget::new();
        target.expect_apply().times(0);

        // The execution role only trusts artifact reads, so the ApplyChange
        // request must be refused up front.
        let b = Arc::new(
            StaticTrustBroker::new()
                .with_role(
                    AccountId::new(WORKLOAD_ACCOUNT),
                    "change-execution",
                    [TrustedOperation::ReadArtifacts],
                )
                .with_role(
                    AccountId::new(WORKLOAD_ACCOUNT),
                    "pipeline-access",
                    [TrustedOperation::ReadArtifacts],
                ),
        );
        let account = AccountId::new(WORKLOAD_ACCOUNT);
        let execution = b.resolve_role(&account, "change-execution").unwrap();
        let orchestration = b.resolve_role(&account, "pipeline-access").unwrap();
        let (store, _, _) = store_with_template();

        let action = DeployAction::new(
            "apply-change",
            "webapp-stack",
            ArtifactName::new("template"),
            ParameterOverrides::new(),
            execution,
            orchestration,
            b,
            Arc::new(target),
        );

        let err = action.deploy(&store).await.unwrap_err();
        assert!(matches!(err, DeployError::Trust(TrustError::Denied { .. })));
    }

    #[tokio::test]
    async fn test_change_rejection_is_fatal() {
        let mut target = MockChangeTarget::new();
        target
            .expect_apply()
            .times(1)
            .returning(|_, _| Err(ChangeRejection::new("drift detected")));

        let (action, store) = action(Arc::new(target));
        let err = action.deploy(&store).await.unwrap_err();

        assert!(matches!(err, DeployError::ChangeRejected { ref reason } if reason == "drift detected"));
    }

    /// A target whose apply never reaches a terminal state in time.
    #[derive(Debug)]
    struct StalledTarget;

    #[async_trait]
    impl ChangeTarget for StalledTarget {
        async fn apply(
            &self,
            _session: &SessionCredentials,
            _change: ChangeSet,
        ) -> Result<ChangeOutcome, ChangeRejection> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(ChangeOutcome::Updated)
        }
    }

    #[tokio::test]
    async fn test_apply_timeout_reported_as_failed() {
        let (action, store) = action(Arc::new(StalledTarget));
        let action = action.with_timeout(Duration::from_millis(20));

        let err = action.deploy(&store).await.unwrap_err();
        assert!(matches!(err, DeployError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_missing_template_fails_before_apply() {
        let mut target = MockChangeTarget::new();
        target.expect_apply().times(0);

        let b = broker();
        let (execution, orchestration) = roles(&b);
        let keys = Arc::new(KeyRing::new());
        let empty_store = Arc::new(ArtifactStore::new("pipeline-bucket", keys));

        let action = DeployAction::new(
            "apply-change",
            "webapp-stack",
            ArtifactName::new("template"),
            ParameterOverrides::new(),
            execution,
            orchestration,
            b,
            Arc::new(target),
        );

        let err = action.deploy(&empty_store).await.unwrap_err();
        assert!(matches!(err, DeployError::Store(StoreError::NotFound { .. })));
    }
}

//! Cross-account trust brokering.
//!
//! A [`RoleHandle`] is the only capability object from which a foreign
//! session can be minted, and handles are only obtainable through
//! [`TrustBroker::resolve_role`]. Assumption fails closed: a request for
//! operations outside the handle's trusted set is refused before any
//! contact with the foreign account.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
#[cfg(test)]
use mockall::automock;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use uuid::Uuid;

use crate::core::Principal;
use crate::errors::TrustError;

/// A foreign account identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccountId(String);

impl AccountId {
    /// Creates a new account id.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the account id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An operation a foreign role is trusted to perform.
///
/// `Custom(String)` is an escape hatch for deployment-specific operations.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrustedOperation {
    /// Apply an infrastructure change in the foreign account.
    ApplyChange,
    /// Read staged artifacts on behalf of the foreign account.
    ReadArtifacts,
    /// Drive pipeline orchestration across the account boundary.
    Orchestrate,
    /// A deployment-specific operation.
    Custom(String),
}

impl fmt::Display for TrustedOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ApplyChange => write!(f, "apply_change"),
            Self::ReadArtifacts => write!(f, "read_artifacts"),
            Self::Orchestrate => write!(f, "orchestrate"),
            Self::Custom(op) => write!(f, "custom({op})"),
        }
    }
}

/// A resolved, immutable reference to a foreign-account trusted identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleHandle {
    account: AccountId,
    role_name: String,
    trusted_ops: HashSet<TrustedOperation>,
}

impl RoleHandle {
    /// Returns the foreign account id.
    #[must_use]
    pub fn account(&self) -> &AccountId {
        &self.account
    }

    /// Returns the role name.
    #[must_use]
    pub fn role_name(&self) -> &str {
        &self.role_name
    }

    /// Returns the statically configured trusted operation set.
    #[must_use]
    pub fn trusted_ops(&self) -> &HashSet<TrustedOperation> {
        &self.trusted_ops
    }

    /// Returns the principal this role acts as.
    #[must_use]
    pub fn principal(&self) -> Principal {
        Principal::scoped(&self.account, &self.role_name)
    }
}

/// Short-lived credentials for one deploy invocation.
///
/// Sessions are minted per assumption and never cached across invocations.
#[derive(Debug, Clone)]
pub struct SessionCredentials {
    /// Opaque session token.
    pub session_token: Uuid,
    /// The assumed role's principal identity.
    pub principal: Principal,
    /// The operations this session is scoped to.
    pub scoped_ops: HashSet<TrustedOperation>,
    /// When the session was issued.
    pub issued_at: DateTime<Utc>,
}

/// Resolves foreign-account roles and mints scoped sessions.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait TrustBroker: Send + Sync {
    /// Resolves a role handle from the configured trust table.
    ///
    /// Resolution is pure construction plus a reachability check against
    /// the table; it never contacts the foreign account.
    ///
    /// # Errors
    ///
    /// `UnknownRole` if the account/role pair is not configured.
    fn resolve_role(&self, account: &AccountId, role_name: &str) -> Result<RoleHandle, TrustError>;

    /// Assumes a role for the requested operations.
    ///
    /// # Errors
    ///
    /// `Denied` when `requested` is not a subset of the handle's trusted
    /// set; refused without contacting the foreign account.
    async fn assume(
        &self,
        handle: &RoleHandle,
        requested: &HashSet<TrustedOperation>,
    ) -> Result<SessionCredentials, TrustError>;
}

/// A trust broker backed by a statically configured role table.
///
/// The table is fixed once the broker is constructed; the trust
/// configuration of a pipeline never changes mid-run.
#[derive(Debug, Default)]
pub struct StaticTrustBroker {
    table: HashMap<(AccountId, String), HashSet<TrustedOperation>>,
}

impl StaticTrustBroker {
    /// Creates an empty broker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a trusted role with an explicit operation set.
    #[must_use]
    pub fn with_role(
        mut self,
        account: AccountId,
        role_name: impl Into<String>,
        trusted_ops: impl IntoIterator<Item = TrustedOperation>,
    ) -> Self {
        self.table
            .insert((account, role_name.into()), trusted_ops.into_iter().collect());
        self
    }
}

#[async_trait]
impl TrustBroker for StaticTrustBroker {
    fn resolve_role(&self, account: &AccountId, role_name: &str) -> Result<RoleHandle, TrustError> {
        let trusted_ops = self
            .table
            .get(&(account.clone(), role_name.to_string()))
            .ok_or_else(|| TrustError::UnknownRole {
                account: account.to_string(),
                role: role_name.to_string(),
            })?;
        Ok(RoleHandle {
            account: account.clone(),
            role_name: role_name.to_string(),
            trusted_ops: trusted_ops.clone(),
        })
    }

    async fn assume(
        &self,
        handle: &RoleHandle,
        requested: &HashSet<TrustedOperation>,
    ) -> Result<SessionCredentials, TrustError> {
        // Fail-closed subset check; nothing beyond this point may be
        // reached with an operation outside the trusted set.
        if !requested.is_subset(&handle.trusted_ops) {
            return Err(TrustError::Denied {
                role: handle.role_name.clone(),
                requested: requested.iter().map(ToString::to_string).collect(),
            });
        }

        tracing::debug!(
            account = %handle.account,
            role = %handle.role_name,
            "assumed foreign-account role"
        );

        Ok(SessionCredentials {
            session_token: Uuid::new_v4(),
            principal: handle.principal(),
            scoped_ops: requested.clone(),
            issued_at: Utc::now(),
        })
    }
}

//! Error taxonomy for the crossdock engine.
//!
//! Configuration problems are rejected before any stage runs; everything
//! else is a runtime failure that fails its action, its stage, and the run,
//! with no automatic retry anywhere in the core.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

use crate::core::Principal;

/// The main error type for crossdock operations.
#[derive(Debug, Error)]
pub enum CrossdockError {
    /// The pipeline definition was rejected before execution.
    #[error("{0}")]
    Configuration(#[from] ConfigurationError),

    /// A cross-account trust operation failed.
    #[error("{0}")]
    Trust(#[from] TrustError),

    /// An artifact store operation failed.
    #[error("{0}")]
    Store(#[from] StoreError),

    /// A build failed.
    #[error("{0}")]
    Build(#[from] BuildError),

    /// A deploy failed.
    #[error("{0}")]
    Deploy(#[from] DeployError),

    /// A revision source could not be consulted.
    #[error("{0}")]
    Source(#[from] SourceError),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error raised when a pipeline definition fails validation.
///
/// Always produced before the controller starts the first stage, never
/// mid-run.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ConfigurationError {
    /// The error message.
    pub message: String,
    /// The stages involved in the error.
    pub stages: Vec<String>,
    /// The actions involved in the error.
    pub actions: Vec<String>,
}

impl ConfigurationError {
    /// Creates a new configuration error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stages: Vec::new(),
            actions: Vec::new(),
        }
    }

    /// Sets the stages involved.
    #[must_use]
    pub fn with_stages(mut self, stages: Vec<String>) -> Self {
        self.stages = stages;
        self
    }

    /// Sets the actions involved.
    #[must_use]
    pub fn with_actions(mut self, actions: Vec<String>) -> Self {
        self.actions = actions;
        self
    }
}

/// Errors from the cross-account trust broker.
#[derive(Debug, Clone, Error)]
pub enum TrustError {
    /// The requested operations are not a subset of the role's trusted set.
    ///
    /// Raised without contacting the foreign account.
    #[error("trust denied for role '{role}': requested operations {requested:?} exceed the trusted set")]
    Denied {
        /// The role that refused the assumption.
        role: String,
        /// Display names of the requested operations.
        requested: Vec<String>,
    },

    /// The account/role pair is not present in the configured trust table.
    #[error("unknown role '{role}' in account {account}")]
    UnknownRole {
        /// The foreign account id.
        account: String,
        /// The requested role name.
        role: String,
    },
}

impl TrustError {
    /// Returns the report-facing kind for this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Denied { .. } | Self::UnknownRole { .. } => ErrorKind::TrustDenied,
        }
    }
}

/// Errors from the artifact store.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// The backing location is not accepting writes.
    #[error("artifact store unavailable")]
    Unavailable,

    /// The caller lacks an encrypt grant on the referenced key.
    #[error("principal '{principal}' holds no encrypt grant on key {key_id}")]
    EncryptionUnauthorized {
        /// The referenced key.
        key_id: Uuid,
        /// The denied principal.
        principal: Principal,
    },

    /// The caller lacks a decrypt grant on the artifact's key.
    #[error("principal '{principal}' holds no decrypt grant on key {key_id}")]
    AccessDenied {
        /// The artifact's key.
        key_id: Uuid,
        /// The denied principal.
        principal: Principal,
    },

    /// The key is absent or its artifact has not been committed.
    #[error("no committed artifact at key '{key}'")]
    NotFound {
        /// The store-relative key.
        key: String,
    },
}

impl StoreError {
    /// Returns the report-facing kind for this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Unavailable => ErrorKind::StoreUnavailable,
            Self::EncryptionUnauthorized { .. } => ErrorKind::EncryptionUnauthorized,
            Self::AccessDenied { .. } => ErrorKind::AccessDenied,
            Self::NotFound { .. } => ErrorKind::NotFound,
        }
    }
}

/// Errors from the build executor.
#[derive(Debug, Error)]
pub enum BuildError {
    /// A command group exited nonzero. Nothing was published.
    #[error("build group '{group}' failed with exit code {exit_code}")]
    Failed {
        /// The failing command group name.
        group: String,
        /// The process exit code.
        exit_code: i32,
        /// Captured stderr.
        stderr: String,
    },

    /// A declared output artifact matched no produced file.
    #[error("build produced no file matching output '{artifact}' (pattern '{pattern}')")]
    MissingOutput {
        /// The declared output artifact.
        artifact: String,
        /// The selection pattern that matched nothing.
        pattern: String,
    },

    /// Publishing the output set to the store failed.
    #[error("failed to publish build outputs: {0}")]
    Publish(#[from] StoreError),

    /// Spawning or driving the external command failed.
    #[error("build execution error: {0}")]
    Execution(#[from] anyhow::Error),
}

impl BuildError {
    /// Returns the report-facing kind for this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Failed { .. } | Self::MissingOutput { .. } | Self::Execution(_) => {
                ErrorKind::BuildFailed
            }
            Self::Publish(e) => e.kind(),
        }
    }
}

/// Errors from the deploy action.
#[derive(Debug, Error)]
pub enum DeployError {
    /// Role assumption was refused. Fatal, never retried.
    #[error("{0}")]
    Trust(#[from] TrustError),

    /// The foreign account's safety checks refused the change.
    #[error("change rejected by the target account: {reason}")]
    ChangeRejected {
        /// The target-side refusal reason.
        reason: String,
    },

    /// The change-apply operation did not reach a terminal state in time.
    ///
    /// The foreign-account operation may still be in progress and must be
    /// reconciled out of band, not re-submitted blindly.
    #[error("change apply did not reach a terminal state within {seconds}s")]
    Timeout {
        /// The configured bound in seconds.
        seconds: u64,
    },

    /// Resolving a template or override artifact failed.
    #[error("{0}")]
    Store(#[from] StoreError),
}

impl DeployError {
    /// Returns the report-facing kind for this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Trust(e) => e.kind(),
            Self::ChangeRejected { .. } => ErrorKind::ChangeRejected,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Store(e) => e.kind(),
        }
    }
}

/// Errors from revision sources and their secret collaborators.
#[derive(Debug, Clone, Error)]
pub enum SourceError {
    /// The revision source could not be reached.
    #[error("revision source unreachable: {0}")]
    Unreachable(String),

    /// The revision source rejected the supplied credentials.
    #[error("revision source rejected credentials: {0}")]
    Auth(String),

    /// A required secret was not available.
    #[error("secret '{name}' not available")]
    MissingSecret {
        /// The secret name.
        name: String,
    },
}

impl SourceError {
    /// Returns the report-facing kind for this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Unreachable(_) | Self::Auth(_) | Self::MissingSecret { .. } => {
                ErrorKind::SourceUnavailable
            }
        }
    }
}

/// Report-facing classification of a failure.
///
/// Carried in action reports so external tooling can branch on the failure
/// class without parsing messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Pipeline definition rejected before execution.
    Configuration,
    /// Cross-account assumption refused.
    TrustDenied,
    /// Encrypt grant missing.
    EncryptionUnauthorized,
    /// Decrypt grant missing.
    AccessDenied,
    /// Store refused a write.
    StoreUnavailable,
    /// Artifact absent or uncommitted.
    NotFound,
    /// External build command failed.
    BuildFailed,
    /// Foreign account refused the change.
    ChangeRejected,
    /// Deploy wait exceeded its bound.
    Timeout,
    /// Revision source failure.
    SourceUnavailable,
    /// Anything else.
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Configuration => "configuration",
            Self::TrustDenied => "trust_denied",
            Self::EncryptionUnauthorized => "encryption_unauthorized",
            Self::AccessDenied => "access_denied",
            Self::StoreUnavailable => "store_unavailable",
            Self::NotFound => "not_found",
            Self::BuildFailed => "build_failed",
            Self::ChangeRejected => "change_rejected",
            Self::Timeout => "timeout",
            Self::SourceUnavailable => "source_unavailable",
            Self::Internal => "internal",
        };
        write!(f, "{name}")
    }
}

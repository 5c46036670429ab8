//! Secret lookup for revision-source credentials.
//!
//! Tokens are pulled from a secret source at connection time and never
//! stored in a pipeline definition.

use parking_lot::RwLock;
use std::collections::HashMap;

use crate::errors::SourceError;

/// Provides named secrets to revision sources.
pub trait SecretSource: Send + Sync {
    /// Returns the secret value for `name`.
    ///
    /// # Errors
    ///
    /// `MissingSecret` when the secret is not available.
    fn secret(&self, name: &str) -> Result<String, SourceError>;
}

/// Reads secrets from process environment variables.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvSecretSource;

impl SecretSource for EnvSecretSource {
    fn secret(&self, name: &str) -> Result<String, SourceError> {
        std::env::var(name).map_err(|_| SourceError::MissingSecret {
            name: name.to_string(),
        })
    }
}

/// An in-memory secret source for wiring and tests.
#[derive(Debug, Default)]
pub struct StaticSecretSource {
    secrets: RwLock<HashMap<String, String>>,
}

impl StaticSecretSource {
    /// Creates an empty source.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a secret.
    #[must_use]
    pub fn with_secret(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.secrets.write().insert(name.into(), value.into());
        self
    }
}

impl SecretSource for StaticSecretSource {
    fn secret(&self, name: &str) -> Result<String, SourceError> {
        self.secrets
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| SourceError::MissingSecret {
                name: name.to_string(),
            })
    }
}

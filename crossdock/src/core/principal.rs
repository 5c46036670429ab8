//! Principal identity for grant checks.

use serde::{Deserialize, Serialize};
use std::fmt;

/// An identity that reads or writes artifacts.
///
/// Principals are account-qualified strings (e.g. `"123456789012/deploy-role"`)
/// so the same role name in two accounts never collides in a grant map.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Principal(String);

impl Principal {
    /// Creates a new principal.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Creates an account-qualified principal from an account id and role name.
    #[must_use]
    pub fn scoped(account: impl fmt::Display, role: impl fmt::Display) -> Self {
        Self(format!("{account}/{role}"))
    }

    /// Returns the principal identity as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

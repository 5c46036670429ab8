//! Artifact naming and location types.
//!
//! An artifact's location is derived purely from the store bucket and the
//! artifact name, so it can be computed before the payload is written and
//! stays stable regardless of write timing.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// The declared name of an artifact within a pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ArtifactName(String);

impl ArtifactName {
    /// Creates a new artifact name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ArtifactName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ArtifactName {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Where an artifact lives inside the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactLocation {
    /// The backing bucket.
    pub bucket: String,
    /// The store-relative object key.
    pub key: String,
}

impl ArtifactLocation {
    /// Creates a new location.
    #[must_use]
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    /// Returns an opaque descriptor for this location.
    ///
    /// The descriptor round-trips through [`ArtifactLocation::from_descriptor`]
    /// and is safe to embed in parameter values.
    #[must_use]
    pub fn descriptor(&self) -> String {
        // Serialization of a two-field struct cannot fail.
        let json = serde_json::to_vec(self).unwrap_or_default();
        STANDARD.encode(json)
    }

    /// Decodes a descriptor produced by [`ArtifactLocation::descriptor`].
    #[must_use]
    pub fn from_descriptor(descriptor: &str) -> Option<Self> {
        let bytes = STANDARD.decode(descriptor).ok()?;
        serde_json::from_slice(&bytes).ok()
    }
}

impl fmt::Display for ArtifactLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.bucket, self.key)
    }
}

/// A committed (or committable) reference to a stored artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRef {
    /// The declared artifact name.
    pub name: ArtifactName,
    /// The encryption key the payload is sealed under.
    pub key_id: Uuid,
    /// The resolved location.
    pub location: ArtifactLocation,
}

impl ArtifactRef {
    /// Creates a new artifact reference.
    #[must_use]
    pub fn new(name: ArtifactName, key_id: Uuid, location: ArtifactLocation) -> Self {
        Self {
            name,
            key_id,
            location,
        }
    }
}

//! Parameter overrides derived from artifact locations.
//!
//! Override values bound to an artifact resolve through the store's pure
//! location derivation, never through the payload, so a deploy action does
//! not stream build output bytes through itself.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::core::ArtifactName;
use crate::store::ArtifactStore;

/// A single override value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverrideValue {
    /// A fixed value.
    Literal(String),
    /// The resolved location of a staged artifact, rendered as
    /// `{"bucket": ..., "key": ...}`.
    ArtifactLocation(ArtifactName),
}

/// A template-parameter override map.
///
/// Bindings are ordered by parameter name so resolution is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterOverrides {
    bindings: BTreeMap<String, OverrideValue>,
}

impl ParameterOverrides {
    /// Creates an empty override map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds a parameter to a literal value.
    #[must_use]
    pub fn literal(mut self, parameter: impl Into<String>, value: impl Into<String>) -> Self {
        self.bindings
            .insert(parameter.into(), OverrideValue::Literal(value.into()));
        self
    }

    /// Binds a parameter to an artifact's resolved location.
    #[must_use]
    pub fn artifact_location(
        mut self,
        parameter: impl Into<String>,
        artifact: ArtifactName,
    ) -> Self {
        self.bindings
            .insert(parameter.into(), OverrideValue::ArtifactLocation(artifact));
        self
    }

    /// Returns the artifact names referenced by location bindings.
    #[must_use]
    pub fn referenced_artifacts(&self) -> Vec<&ArtifactName> {
        self.bindings
            .values()
            .filter_map(|v| match v {
                OverrideValue::ArtifactLocation(name) => Some(name),
                OverrideValue::Literal(_) => None,
            })
            .collect()
    }

    /// Resolves every binding to a concrete string value.
    ///
    /// Location bindings use [`ArtifactStore::location_of`], which is stable
    /// whether or not the artifact bytes have been written yet.
    #[must_use]
    pub fn resolve(&self, store: &ArtifactStore) -> BTreeMap<String, String> {
        self.bindings
            .iter()
            .map(|(parameter, value)| {
                let resolved = match value {
                    OverrideValue::Literal(v) => v.clone(),
                    OverrideValue::ArtifactLocation(name) => {
                        let location = store.location_of(name);
                        serde_json::json!({
                            "bucket": location.bucket,
                            "key": location.key,
                        })
                        .to_string()
                    }
                };
                (parameter.clone(), resolved)
            })
            .collect()
    }

    /// Returns the number of bindings.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// Returns true if no parameters are bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Principal;
    use crate::keys::{KeyOp, KeyRing};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn store() -> (ArtifactStore, uuid::Uuid, Principal) {
        let keys = Arc::new(KeyRing::new());
        let key_id = keys.create_key();
        let builder = Principal::scoped("111111111111", "build-role");
        keys.grant(key_id, &builder, &[KeyOp::Encrypt]);
        (ArtifactStore::new("pipeline-bucket", keys), key_id, builder)
    }

    #[test]
    fn test_resolve_literal() {
        let (store, _, _) = store();
        let overrides = ParameterOverrides::new().literal("Environment", "production");

        let resolved = overrides.resolve(&store);
        assert_eq!(resolved["Environment"], "production");
    }

    #[test]
    fn test_resolve_location_before_write_matches_after_write() {
        let (store, key_id, builder) = store();
        let name = ArtifactName::new("webapp-build");
        let overrides =
            ParameterOverrides::new().artifact_location("BundleLocation", name.clone());

        // Resolved before the artifact exists.
        let before = overrides.resolve(&store);

        store.put(&name, b"bundle".to_vec(), key_id, &builder).unwrap();
        let after = overrides.resolve(&store);

        assert_eq!(before, after);
        let value: serde_json::Value = serde_json::from_str(&before["BundleLocation"]).unwrap();
        assert_eq!(value["bucket"], "pipeline-bucket");
        assert_eq!(value["key"], "artifacts/webapp-build");
    }

    #[test]
    fn test_referenced_artifacts() {
        let overrides = ParameterOverrides::new()
            .literal("Environment", "staging")
            .artifact_location("BundleLocation", ArtifactName::new("webapp-build"));

        let referenced = overrides.referenced_artifacts();
        assert_eq!(referenced, vec![&ArtifactName::new("webapp-build")]);
    }

    #[test]
    fn test_serde_round_trip() {
        let overrides = ParameterOverrides::new()
            .literal("Environment", "staging")
            .artifact_location("BundleLocation", ArtifactName::new("webapp-build"));

        let json = serde_json::to_string(&overrides).unwrap();
        let back: ParameterOverrides = serde_json::from_str(&json).unwrap();
        assert_eq!(overrides, back);
    }
}

//! Encrypted artifact staging area.
//!
//! Artifacts become visible to `get` only once their `put` has returned:
//! a record is fully built (payload, digest, timestamp) before the single
//! map insert that publishes it, and multi-artifact commits go through
//! [`ArtifactStore::put_many`], which validates the whole set before
//! publishing any of it.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use uuid::Uuid;

use crate::core::{ArtifactLocation, ArtifactName, ArtifactRef, Principal};
use crate::errors::StoreError;
use crate::keys::{KeyOp, KeyRing};

/// A committed artifact record.
#[derive(Debug, Clone)]
struct StoredArtifact {
    payload: Vec<u8>,
    key_id: Uuid,
    /// Hex sha-256 of the payload.
    digest: String,
    committed_at: DateTime<Utc>,
}

/// The staged-artifact store for a pipeline.
///
/// Readers run concurrently against the backing map; writers of new
/// artifacts are serialized by a write gate so a multi-artifact commit is
/// observed either in full or not at all.
pub struct ArtifactStore {
    bucket: String,
    keys: Arc<KeyRing>,
    objects: DashMap<String, StoredArtifact>,
    available: AtomicBool,
    write_gate: Mutex<()>,
}

impl ArtifactStore {
    /// Creates a store backed by the given bucket name and key ring.
    #[must_use]
    pub fn new(bucket: impl Into<String>, keys: Arc<KeyRing>) -> Self {
        Self {
            bucket: bucket.into(),
            keys,
            objects: DashMap::new(),
            available: AtomicBool::new(true),
            write_gate: Mutex::new(()),
        }
    }

    /// Returns the bucket name.
    #[must_use]
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Returns the key ring shared with this store.
    #[must_use]
    pub fn keys(&self) -> &Arc<KeyRing> {
        &self.keys
    }

    /// Marks the backing location as refusing writes (or accepting again).
    ///
    /// Stand-in for the backing location going away; `put` fails with
    /// [`StoreError::Unavailable`] while unset.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Resolves an artifact's location without materializing any payload.
    ///
    /// The derivation is pure, so the location can be computed before the
    /// artifact is written and stays stable regardless of write timing.
    #[must_use]
    pub fn location_of(&self, name: &ArtifactName) -> ArtifactLocation {
        ArtifactLocation::new(self.bucket.clone(), format!("artifacts/{name}"))
    }

    /// Writes an artifact sealed under `key_id`.
    ///
    /// # Errors
    ///
    /// `Unavailable` if the backing location refuses writes;
    /// `EncryptionUnauthorized` if `principal` holds no encrypt grant.
    pub fn put(
        &self,
        name: &ArtifactName,
        payload: Vec<u8>,
        key_id: Uuid,
        principal: &Principal,
    ) -> Result<ArtifactRef, StoreError> {
        let _gate = self.write_gate.lock();
        self.check_writable(key_id, principal)?;
        Ok(self.commit(name, payload, key_id))
    }

    /// Writes a set of artifacts as one all-or-nothing publication.
    ///
    /// Every entry is validated before any entry is committed, so a failed
    /// grant or an unavailable backing location publishes nothing.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`ArtifactStore::put`], checked for the whole set.
    pub fn put_many(
        &self,
        entries: Vec<(ArtifactName, Vec<u8>, Uuid)>,
        principal: &Principal,
    ) -> Result<Vec<ArtifactRef>, StoreError> {
        let _gate = self.write_gate.lock();
        for (_, _, key_id) in &entries {
            self.check_writable(*key_id, principal)?;
        }
        Ok(entries
            .into_iter()
            .map(|(name, payload, key_id)| self.commit(&name, payload, key_id))
            .collect())
    }

    /// Reads an artifact's payload.
    ///
    /// The decrypt grant is checked before existence so an ungranted caller
    /// cannot probe which keys are populated.
    ///
    /// # Errors
    ///
    /// `AccessDenied` without a decrypt grant on the artifact's key;
    /// `NotFound` if the key is absent or not yet committed.
    pub fn get(&self, artifact: &ArtifactRef, principal: &Principal) -> Result<Vec<u8>, StoreError> {
        if !self.keys.allows(artifact.key_id, principal, KeyOp::Decrypt) {
            return Err(StoreError::AccessDenied {
                key_id: artifact.key_id,
                principal: principal.clone(),
            });
        }
        let record = self
            .objects
            .get(&artifact.location.key)
            .ok_or_else(|| StoreError::NotFound {
                key: artifact.location.key.clone(),
            })?;
        Ok(record.payload.clone())
    }

    /// Reconstructs the reference of a committed artifact by name.
    ///
    /// Returns `None` until the producing action's `put` has returned, so a
    /// consumer can never obtain a reference to an unpublished artifact.
    #[must_use]
    pub fn resolve(&self, name: &ArtifactName) -> Option<ArtifactRef> {
        let location = self.location_of(name);
        let record = self.objects.get(&location.key)?;
        Some(ArtifactRef::new(name.clone(), record.key_id, location))
    }

    /// Returns the committed artifact's content digest, if present.
    #[must_use]
    pub fn digest_of(&self, name: &ArtifactName) -> Option<String> {
        let location = self.location_of(name);
        self.objects.get(&location.key).map(|r| r.digest.clone())
    }

    /// Returns the commit timestamp of an artifact, if present.
    #[must_use]
    pub fn committed_at(&self, name: &ArtifactName) -> Option<DateTime<Utc>> {
        let location = self.location_of(name);
        self.objects.get(&location.key).map(|r| r.committed_at)
    }

    /// Returns whether an artifact with this name has been committed.
    #[must_use]
    pub fn contains(&self, name: &ArtifactName) -> bool {
        self.objects.contains_key(&self.location_of(name).key)
    }

    fn check_writable(&self, key_id: Uuid, principal: &Principal) -> Result<(), StoreError> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable);
        }
        if !self.keys.allows(key_id, principal, KeyOp::Encrypt) {
            return Err(StoreError::EncryptionUnauthorized {
                key_id,
                principal: principal.clone(),
            });
        }
        Ok(())
    }

    fn commit(&self, name: &ArtifactName, payload: Vec<u8>, key_id: Uuid) -> ArtifactRef {
        let location = self.location_of(name);
        let record = StoredArtifact {
            digest: hex::encode(Sha256::digest(&payload)),
            payload,
            key_id,
            committed_at: Utc::now(),
        };
        self.objects.insert(location.key.clone(), record);
        ArtifactRef::new(name.clone(), key_id, location)
    }
}

impl std::fmt::Debug for ArtifactStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArtifactStore")
            .field("bucket", &self.bucket)
            .field("objects", &self.objects.len())
            .field("available", &self.available.load(Ordering::SeqCst))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn fixture() -> (ArtifactStore, Uuid, Principal) {
        let keys = Arc::new(KeyRing::new());
        let key_id = keys.create_key();
        let builder = Principal::scoped("111111111111", "build-role");
        keys.grant(key_id, &builder, &[KeyOp::Encrypt, KeyOp::Decrypt]);
        (ArtifactStore::new("pipeline-bucket", keys), key_id, builder)
    }

    #[test]
    fn test_put_then_get_round_trip() {
        let (store, key_id, builder) = fixture();
        let name = ArtifactName::new("webapp-build");

        let artifact = store
            .put(&name, b"bundle".to_vec(), key_id, &builder)
            .unwrap();
        let payload = store.get(&artifact, &builder).unwrap();

        assert_eq!(payload, b"bundle");
        assert_eq!(artifact.location, store.location_of(&name));
    }

    #[test]
    fn test_put_without_encrypt_grant() {
        let (store, key_id, _) = fixture();
        let stranger = Principal::new("999999999999/nobody");

        let err = store
            .put(&ArtifactName::new("x"), vec![], key_id, &stranger)
            .unwrap_err();

        assert!(matches!(err, StoreError::EncryptionUnauthorized { .. }));
        assert!(!store.contains(&ArtifactName::new("x")));
    }

    #[test]
    fn test_get_without_decrypt_grant_even_when_bytes_exist() {
        let (store, key_id, builder) = fixture();
        let name = ArtifactName::new("webapp-build");
        let artifact = store.put(&name, b"bundle".to_vec(), key_id, &builder).unwrap();

        let foreign = Principal::scoped("222222222222", "deploy-role");
        let err = store.get(&artifact, &foreign).unwrap_err();

        assert!(matches!(err, StoreError::AccessDenied { .. }));
    }

    #[test]
    fn test_get_uncommitted_artifact() {
        let (store, key_id, builder) = fixture();
        let name = ArtifactName::new("never-written");
        let artifact = ArtifactRef::new(name.clone(), key_id, store.location_of(&name));

        let err = store.get(&artifact, &builder).unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[test]
    fn test_unavailable_store_refuses_put() {
        let (store, key_id, builder) = fixture();
        store.set_available(false);

        let err = store
            .put(&ArtifactName::new("x"), vec![], key_id, &builder)
            .unwrap_err();
        assert!(matches!(err, StoreError::Unavailable));
    }

    #[test]
    fn test_location_stable_before_and_after_write() {
        let (store, key_id, builder) = fixture();
        let name = ArtifactName::new("webapp-build");

        let before = store.location_of(&name);
        let artifact = store.put(&name, b"bundle".to_vec(), key_id, &builder).unwrap();

        assert_eq!(before, artifact.location);
        assert_eq!(before, store.location_of(&name));
    }

    #[test]
    fn test_put_many_is_all_or_nothing() {
        let (store, key_id, builder) = fixture();
        let bogus_key = Uuid::new_v4();

        let err = store
            .put_many(
                vec![
                    (ArtifactName::new("a"), b"a".to_vec(), key_id),
                    (ArtifactName::new("b"), b"b".to_vec(), bogus_key),
                ],
                &builder,
            )
            .unwrap_err();

        assert!(matches!(err, StoreError::EncryptionUnauthorized { .. }));
        assert!(!store.contains(&ArtifactName::new("a")));
        assert!(!store.contains(&ArtifactName::new("b")));
    }

    #[test]
    fn test_put_many_commits_full_set() {
        let (store, key_id, builder) = fixture();

        let artifacts = store
            .put_many(
                vec![
                    (ArtifactName::new("a"), b"a".to_vec(), key_id),
                    (ArtifactName::new("b"), b"b".to_vec(), key_id),
                ],
                &builder,
            )
            .unwrap();

        assert_eq!(artifacts.len(), 2);
        assert!(store.contains(&ArtifactName::new("a")));
        assert!(store.contains(&ArtifactName::new("b")));
    }

    #[test]
    fn test_digest_recorded_on_commit() {
        let (store, key_id, builder) = fixture();
        let name = ArtifactName::new("webapp-build");
        store.put(&name, b"bundle".to_vec(), key_id, &builder).unwrap();

        let digest = store.digest_of(&name).unwrap();
        assert_eq!(digest.len(), 64);
        assert!(store.committed_at(&name).is_some());
    }
}

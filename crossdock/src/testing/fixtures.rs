//! Deterministic in-memory stand-ins for external collaborators.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::Arc;
use uuid::Uuid;

use crate::core::Principal;
use crate::deploy::{ChangeOutcome, ChangeRejection, ChangeSet, ChangeTarget};
use crate::errors::SourceError;
use crate::keys::{KeyOp, KeyRing};
use crate::source::{RepoIdentity, Revision, RevisionSource};
use crate::store::ArtifactStore;
use crate::trust::SessionCredentials;

/// A revision source whose head is set programmatically.
#[derive(Debug)]
pub struct StaticRevisionSource {
    identity: RepoIdentity,
    head: RwLock<Revision>,
}

impl StaticRevisionSource {
    /// Creates a source for `acme/webapp@main` with the given head.
    #[must_use]
    pub fn new(id: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            identity: RepoIdentity::new("acme", "webapp", "main"),
            head: RwLock::new(Revision {
                id: id.into(),
                payload,
            }),
        }
    }

    /// Overrides the watched identity.
    #[must_use]
    pub fn with_identity(mut self, identity: RepoIdentity) -> Self {
        self.identity = identity;
        self
    }

    /// Moves the branch head to a new revision.
    pub fn set_head(&self, id: impl Into<String>, payload: Vec<u8>) {
        *self.head.write() = Revision {
            id: id.into(),
            payload,
        };
    }
}

#[async_trait]
impl RevisionSource for StaticRevisionSource {
    fn identity(&self) -> &RepoIdentity {
        &self.identity
    }

    async fn head(&self) -> Result<Revision, SourceError> {
        Ok(self.head.read().clone())
    }
}

/// A change target that records every applied change set.
#[derive(Debug, Default)]
pub struct RecordingChangeTarget {
    applied: RwLock<Vec<ChangeSet>>,
    /// Names of targets that already exist (applied as updates).
    existing: RwLock<Vec<String>>,
}

impl RecordingChangeTarget {
    /// Creates a target with no existing change targets.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every change set applied so far.
    #[must_use]
    pub fn applied(&self) -> Vec<ChangeSet> {
        self.applied.read().clone()
    }

    /// Returns the number of applied change sets.
    #[must_use]
    pub fn apply_count(&self) -> usize {
        self.applied.read().len()
    }
}

#[async_trait]
impl ChangeTarget for RecordingChangeTarget {
    async fn apply(
        &self,
        _session: &SessionCredentials,
        change: ChangeSet,
    ) -> Result<ChangeOutcome, ChangeRejection> {
        let outcome = if self.existing.read().contains(&change.change_name) {
            ChangeOutcome::Updated
        } else {
            self.existing.write().push(change.change_name.clone());
            ChangeOutcome::Created
        };
        self.applied.write().push(change);
        Ok(outcome)
    }
}

/// A store wired to a key ring with one granted producer principal.
#[derive(Debug)]
pub struct StoreFixture {
    /// The artifact store.
    pub store: Arc<ArtifactStore>,
    /// The single created key.
    pub key_id: Uuid,
    /// A principal granted encrypt + decrypt on the key.
    pub producer: Principal,
}

impl StoreFixture {
    /// Creates the fixture with a fresh key ring.
    #[must_use]
    pub fn new() -> Self {
        let keys = Arc::new(KeyRing::new());
        let key_id = keys.create_key();
        let producer = Principal::scoped("111111111111", "build-role");
        keys.grant(key_id, &producer, &[KeyOp::Encrypt, KeyOp::Decrypt]);
        Self {
            store: Arc::new(ArtifactStore::new("pipeline-bucket", keys)),
            key_id,
            producer,
        }
    }

    /// Grants operations on the fixture key to another principal.
    pub fn grant(&self, principal: &Principal, ops: &[KeyOp]) {
        self.store.keys().grant(self.key_id, principal, ops);
    }
}

impl Default for StoreFixture {
    fn default() -> Self {
        Self::new()
    }
}

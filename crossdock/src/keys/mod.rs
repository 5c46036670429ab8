//! Encryption key management and cross-account grants.
//!
//! A [`KeyRing`] owns symmetric keys and their grant maps. Grants are
//! additive for the lifetime of a pipeline: there is no revoke operation,
//! so a principal that could read an artifact at the start of a run can
//! still read it at the end.

use parking_lot::RwLock;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::fmt;
use uuid::Uuid;

use crate::core::Principal;

/// An operation a principal may be granted on a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyOp {
    /// Seal payloads under the key.
    Encrypt,
    /// Open payloads sealed under the key.
    Decrypt,
}

impl fmt::Display for KeyOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Encrypt => write!(f, "encrypt"),
            Self::Decrypt => write!(f, "decrypt"),
        }
    }
}

/// A symmetric key plus its grant map.
#[derive(Debug)]
struct EncryptionKey {
    /// Hex sha-256 fingerprint of the key material.
    fingerprint: String,
    /// Granted operations per principal. Append-only.
    grants: HashMap<Principal, HashSet<KeyOp>>,
}

impl EncryptionKey {
    fn generate() -> Self {
        let mut material = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut material);
        Self {
            fingerprint: hex::encode(Sha256::digest(material)),
            grants: HashMap::new(),
        }
    }
}

/// Owns encryption keys and serializes grant writes.
///
/// Concurrent readers are admitted; writers of new grants are serialized by
/// the interior lock.
#[derive(Debug, Default)]
pub struct KeyRing {
    keys: RwLock<HashMap<Uuid, EncryptionKey>>,
}

impl KeyRing {
    /// Creates an empty key ring.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Generates a new key and returns its id.
    pub fn create_key(&self) -> Uuid {
        let key_id = Uuid::new_v4();
        self.keys.write().insert(key_id, EncryptionKey::generate());
        key_id
    }

    /// Grants operations on a key to a principal.
    ///
    /// Granting is idempotent and additive; existing grants are never
    /// narrowed. Returns false if the key does not exist.
    pub fn grant(&self, key_id: Uuid, principal: &Principal, ops: &[KeyOp]) -> bool {
        let mut keys = self.keys.write();
        let Some(key) = keys.get_mut(&key_id) else {
            return false;
        };
        key.grants
            .entry(principal.clone())
            .or_default()
            .extend(ops.iter().copied());
        true
    }

    /// Returns whether the principal holds the operation on the key.
    #[must_use]
    pub fn allows(&self, key_id: Uuid, principal: &Principal, op: KeyOp) -> bool {
        self.keys
            .read()
            .get(&key_id)
            .and_then(|key| key.grants.get(principal))
            .is_some_and(|ops| ops.contains(&op))
    }

    /// Returns the key's fingerprint, if the key exists.
    #[must_use]
    pub fn fingerprint(&self, key_id: Uuid) -> Option<String> {
        self.keys.read().get(&key_id).map(|k| k.fingerprint.clone())
    }

    /// Returns whether a key exists.
    #[must_use]
    pub fn contains(&self, key_id: Uuid) -> bool {
        self.keys.read().contains_key(&key_id)
    }
}

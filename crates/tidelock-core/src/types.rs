//! Persisted domain records.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Account identifier assigned by the surrounding identity system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub u64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for UserId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// A user's key material as held by the store.
///
/// Exactly one record per user. The master seed is never stored in clear;
/// `encrypted_master_seed` is [`tidelock_crypto::SeedVault`] output bound to
/// `user_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSecretRecord {
    /// Owner of the record.
    pub user_id: UserId,
    /// Vault-encrypted master seed (base64).
    pub encrypted_master_seed: String,
    /// Current session salt (hex text, used verbatim as HKDF salt).
    pub session_salt: String,
    /// When the salt was last rotated.
    pub salt_updated_at_ms: u64,
}

/// A consumed nonce. Unique per `(user_id, nonce)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NonceRecord {
    /// Owner of the nonce.
    pub user_id: UserId,
    /// Client-chosen nonce string.
    pub nonce: String,
    /// When the nonce was first accepted.
    pub created_at_ms: u64,
}

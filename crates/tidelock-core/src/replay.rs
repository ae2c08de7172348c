//! Single-use nonce enforcement.
//!
//! A nonce is consumed by an atomic insert-or-fail on `(user_id, nonce)`.
//! Checking and recording are one storage operation, so two concurrent
//! requests carrying the same nonce can never both pass.

use std::time::Duration;

use tracing::debug;

use crate::{
    policy::SecurityPolicy,
    storage::{Storage, StorageError},
    types::{NonceRecord, UserId},
};

/// Rejects reused nonces and prunes expired ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplayGuard {
    retention: Duration,
}

impl ReplayGuard {
    /// Guard keeping nonces for at least `retention`.
    pub fn new(retention: Duration) -> Self {
        Self { retention }
    }

    /// Guard configured from a policy.
    pub fn from_policy(policy: &SecurityPolicy) -> Self {
        Self::new(policy.nonce_retention)
    }

    /// Minimum time a consumed nonce is kept.
    pub fn retention(&self) -> Duration {
        self.retention
    }

    /// Consume `nonce` for `user_id`.
    ///
    /// Returns `Ok(true)` if the nonce was fresh and is now recorded,
    /// `Ok(false)` if it was already recorded. A nonce that has outlived the
    /// retention but was not pruned yet still counts as used.
    ///
    /// # Errors
    ///
    /// Storage failures other than the duplicate outcome. Callers must treat
    /// these as a rejection.
    pub fn check_and_consume<S: Storage>(
        &self,
        storage: &S,
        user_id: UserId,
        nonce: &str,
        now_ms: u64,
    ) -> Result<bool, StorageError> {
        let record = NonceRecord { user_id, nonce: nonce.to_string(), created_at_ms: now_ms };

        match storage.insert_nonce(&record) {
            Ok(()) => Ok(true),
            Err(StorageError::Duplicate) => {
                debug!(%user_id, "nonce reuse");
                Ok(false)
            },
            Err(e) => Err(e),
        }
    }

    /// Give back a nonce consumed by a request that later failed.
    pub fn release<S: Storage>(
        &self,
        storage: &S,
        user_id: UserId,
        nonce: &str,
    ) -> Result<(), StorageError> {
        storage.remove_nonce(user_id, nonce)
    }

    /// Remove nonces older than the retention. Returns how many were removed.
    pub fn prune<S: Storage>(&self, storage: &S, now_ms: u64) -> Result<usize, StorageError> {
        let cutoff = now_ms.saturating_sub(self.retention.as_millis() as u64);
        storage.prune_nonces(cutoff)
    }
}

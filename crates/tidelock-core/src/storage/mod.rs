//! Storage abstraction for secrets, nonces and rate-limit hits.
//!
//! Trait-based abstraction so the pipeline runs unchanged against memory,
//! fault-injecting and on-disk backends. The trait is synchronous: every
//! operation is a short point lookup or a single-key write.

mod chaotic;
mod error;
mod memory;

pub use chaotic::ChaoticStorage;
pub use error::StorageError;
pub use memory::MemoryStorage;

use crate::types::{NonceRecord, UserId, UserSecretRecord};

/// Storage for per-user secrets, consumed nonces and request hits.
///
/// Must be Clone (shared by the authenticator, issuer and sweeper), Send +
/// Sync (requests for the same user may run concurrently), and synchronous.
/// Implementations share internal state via Arc, so clones access the same
/// underlying storage.
pub trait Storage: Clone + Send + Sync + 'static {
    /// Load a user's secret record. `None` if the user was never issued one.
    fn load_user_secret(&self, user_id: UserId)
    -> Result<Option<UserSecretRecord>, StorageError>;

    /// Create or replace a user's secret record.
    fn store_user_secret(&self, record: &UserSecretRecord) -> Result<(), StorageError>;

    /// Record a nonce, failing if it is already present.
    ///
    /// # Invariants
    ///
    /// - Atomic: of any number of concurrent inserts of the same
    ///   `(user_id, nonce)`, exactly one returns `Ok`
    /// - Returns `StorageError::Duplicate` for the losers and leaves the stored
    ///   record unchanged
    fn insert_nonce(&self, record: &NonceRecord) -> Result<(), StorageError>;

    /// Remove a nonce. Removing an absent nonce is a no-op.
    fn remove_nonce(&self, user_id: UserId, nonce: &str) -> Result<(), StorageError>;

    /// Whether a nonce is currently recorded.
    fn contains_nonce(&self, user_id: UserId, nonce: &str) -> Result<bool, StorageError>;

    /// Delete nonces created strictly before `cutoff_ms`. Returns how many
    /// were removed.
    fn prune_nonces(&self, cutoff_ms: u64) -> Result<usize, StorageError>;

    /// Record one delivered request for a user at `at_ms`.
    fn record_hit(&self, user_id: UserId, at_ms: u64) -> Result<(), StorageError>;

    /// Number of hits for a user with timestamp strictly after `after_ms`.
    fn count_hits_after(&self, user_id: UserId, after_ms: u64) -> Result<u64, StorageError>;

    /// Delete hits recorded strictly before `cutoff_ms`. Returns how many
    /// were removed.
    fn prune_hits(&self, cutoff_ms: u64) -> Result<usize, StorageError>;
}

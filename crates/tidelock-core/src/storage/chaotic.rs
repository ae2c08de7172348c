//! Chaotic storage wrapper for fault injection testing
//!
//! Storage wrapper that randomly fails operations so tests can check that the
//! authentication pipeline fails closed: a storage fault must never turn into
//! an accepted request, a lost nonce or a leaked rate-limit credit.

use std::sync::{
    Arc, Mutex, PoisonError,
    atomic::{AtomicUsize, Ordering},
};

use super::{Storage, StorageError};
use crate::types::{NonceRecord, UserId, UserSecretRecord};

/// Chaotic storage wrapper that randomly injects failures
///
/// Delegates to an underlying storage implementation but fails operations
/// with probability `failure_rate` before they reach it, so an injected
/// failure never leaves a partial write behind.
#[derive(Clone)]
pub struct ChaoticStorage<S: Storage> {
    inner: S,
    /// Failure rate (0.0 = never fail, 1.0 = always fail)
    failure_rate: f64,
    /// RNG state for deterministic chaos
    rng: Arc<Mutex<ChaoticRng>>,
    operation_count: Arc<AtomicUsize>,
    injected_count: Arc<AtomicUsize>,
}

/// Linear congruential generator. Reproducible with the same seed.
struct ChaoticRng {
    state: u64,
}

impl ChaoticRng {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    /// Next value in [0.0, 1.0)
    fn next(&mut self) -> f64 {
        // LCG constants from Numerical Recipes
        const A: u64 = 1_664_525;
        const C: u64 = 1_013_904_223;
        const M: u64 = 1u64 << 32;

        self.state = (A.wrapping_mul(self.state).wrapping_add(C)) % M;
        (self.state as f64) / (M as f64)
    }
}

impl<S: Storage> ChaoticStorage<S> {
    /// Wrap `inner` with the default chaos seed.
    ///
    /// # Panics
    ///
    /// Panics if `failure_rate` is not in [0.0, 1.0]
    pub fn new(inner: S, failure_rate: f64) -> Self {
        Self::with_seed(inner, failure_rate, 0x1234_5678_9ABC_DEF0)
    }

    /// Wrap `inner` with an explicit seed for reproducible chaos.
    ///
    /// # Panics
    ///
    /// Panics if `failure_rate` is not in [0.0, 1.0]
    pub fn with_seed(inner: S, failure_rate: f64, seed: u64) -> Self {
        assert!(
            (0.0..=1.0).contains(&failure_rate),
            "failure_rate must be between 0.0 and 1.0, got {failure_rate}"
        );

        Self {
            inner,
            failure_rate,
            rng: Arc::new(Mutex::new(ChaoticRng::new(seed))),
            operation_count: Arc::new(AtomicUsize::new(0)),
            injected_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Underlying storage, for checking invariants after chaos.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Total number of storage operations attempted.
    pub fn operation_count(&self) -> usize {
        self.operation_count.load(Ordering::Relaxed)
    }

    /// Number of operations that were failed on purpose.
    pub fn injected_failures(&self) -> usize {
        self.injected_count.load(Ordering::Relaxed)
    }

    fn chaos(&self, operation: &str) -> Result<(), StorageError> {
        self.operation_count.fetch_add(1, Ordering::Relaxed);

        let roll = self.rng.lock().unwrap_or_else(PoisonError::into_inner).next();
        if roll < self.failure_rate {
            self.injected_count.fetch_add(1, Ordering::Relaxed);
            return Err(StorageError::Io(format!("injected failure: {operation}")));
        }

        Ok(())
    }
}

impl<S: Storage> Storage for ChaoticStorage<S> {
    fn load_user_secret(
        &self,
        user_id: UserId,
    ) -> Result<Option<UserSecretRecord>, StorageError> {
        self.chaos("load_user_secret")?;
        self.inner.load_user_secret(user_id)
    }

    fn store_user_secret(&self, record: &UserSecretRecord) -> Result<(), StorageError> {
        self.chaos("store_user_secret")?;
        self.inner.store_user_secret(record)
    }

    fn insert_nonce(&self, record: &NonceRecord) -> Result<(), StorageError> {
        self.chaos("insert_nonce")?;
        self.inner.insert_nonce(record)
    }

    fn remove_nonce(&self, user_id: UserId, nonce: &str) -> Result<(), StorageError> {
        self.chaos("remove_nonce")?;
        self.inner.remove_nonce(user_id, nonce)
    }

    fn contains_nonce(&self, user_id: UserId, nonce: &str) -> Result<bool, StorageError> {
        self.chaos("contains_nonce")?;
        self.inner.contains_nonce(user_id, nonce)
    }

    fn prune_nonces(&self, cutoff_ms: u64) -> Result<usize, StorageError> {
        self.chaos("prune_nonces")?;
        self.inner.prune_nonces(cutoff_ms)
    }

    fn record_hit(&self, user_id: UserId, at_ms: u64) -> Result<(), StorageError> {
        self.chaos("record_hit")?;
        self.inner.record_hit(user_id, at_ms)
    }

    fn count_hits_after(&self, user_id: UserId, after_ms: u64) -> Result<u64, StorageError> {
        self.chaos("count_hits_after")?;
        self.inner.count_hits_after(user_id, after_ms)
    }

    fn prune_hits(&self, cutoff_ms: u64) -> Result<usize, StorageError> {
        self.chaos("prune_hits")?;
        self.inner.prune_hits(cutoff_ms)
    }
}

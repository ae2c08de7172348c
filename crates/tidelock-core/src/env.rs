//! Environment abstraction for deterministic testing.
//!
//! Decouples authentication logic from system resources (wall clock,
//! randomness). Production wires in the real clock and OS entropy; tests use
//! [`ManualEnv`] with a hand-driven clock and a seeded RNG so every window
//! boundary and every IV is reproducible.

use std::{
    future::Future,
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;

/// Abstract environment providing time and randomness.
///
/// # Safety
///
/// Implementations MUST guarantee:
///
/// - `random_bytes()` uses cryptographically secure entropy in production
/// - `wall_clock_millis()` is Unix time, because time windows are derived
///   from it and have to agree with the client's clock
pub trait Environment: Clone + Send + Sync + 'static {
    /// Milliseconds since the Unix epoch.
    fn wall_clock_millis(&self) -> u64;

    /// Sleeps for the specified duration.
    ///
    /// Only used by driver code such as the sweeper loop, never by the
    /// authentication pipeline itself.
    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send;

    /// Fills the provided buffer with random bytes.
    ///
    /// # Invariants
    ///
    /// - Given the same RNG seed, this produces the same sequence of bytes
    /// - Uses cryptographically secure RNG
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Fixed-size random array, for IVs and fresh secrets.
    fn random_array<const N: usize>(&self) -> [u8; N] {
        let mut bytes = [0u8; N];
        self.random_bytes(&mut bytes);
        bytes
    }

    /// Generates a random `u64`.
    fn random_u64(&self) -> u64 {
        u64::from_be_bytes(self.random_array())
    }
}

/// Deterministic environment driven by hand.
///
/// The clock only moves when told to (`advance`, `set_millis` or `sleep`).
/// Randomness comes from ChaCha20 seeded at construction. Clones share both
/// the clock and the RNG stream.
#[derive(Clone)]
pub struct ManualEnv {
    now_ms: Arc<AtomicU64>,
    rng: Arc<Mutex<ChaCha20Rng>>,
}

impl ManualEnv {
    /// Start the clock at `start_ms` with an RNG seeded from `seed`.
    pub fn new(start_ms: u64, seed: u64) -> Self {
        Self {
            now_ms: Arc::new(AtomicU64::new(start_ms)),
            rng: Arc::new(Mutex::new(ChaCha20Rng::seed_from_u64(seed))),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        self.now_ms.fetch_add(by.as_millis() as u64, Ordering::SeqCst);
    }

    /// Jump the clock to an absolute time. May move backwards, which is how
    /// tests model client clock skew.
    pub fn set_millis(&self, unix_millis: u64) {
        self.now_ms.store(unix_millis, Ordering::SeqCst);
    }
}

impl Environment for ManualEnv {
    fn wall_clock_millis(&self) -> u64 {
        self.now_ms.load(Ordering::SeqCst)
    }

    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send {
        self.advance(duration);
        std::future::ready(())
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        // The RNG holds no invariant a panicking holder could break.
        self.rng.lock().unwrap_or_else(PoisonError::into_inner).fill_bytes(buffer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_moves_only_when_driven() {
        let env = ManualEnv::new(1_000, 0);
        assert_eq!(env.wall_clock_millis(), 1_000);

        env.advance(Duration::from_secs(30));
        assert_eq!(env.wall_clock_millis(), 31_000);

        env.set_millis(5);
        assert_eq!(env.wall_clock_millis(), 5);
    }

    #[test]
    fn clones_share_clock() {
        let env = ManualEnv::new(0, 0);
        let other = env.clone();
        other.advance(Duration::from_millis(250));
        assert_eq!(env.wall_clock_millis(), 250);
    }

    #[test]
    fn same_seed_same_bytes() {
        let a: [u8; 16] = ManualEnv::new(0, 42).random_array();
        let b: [u8; 16] = ManualEnv::new(0, 42).random_array();
        let c: [u8; 16] = ManualEnv::new(0, 43).random_array();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn successive_draws_differ() {
        let env = ManualEnv::new(0, 7);
        assert_ne!(env.random_u64(), env.random_u64());
    }
}

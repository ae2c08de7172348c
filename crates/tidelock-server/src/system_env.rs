//! Production Environment implementation using system time and RNG.
//!
//! `SystemEnv` is the production implementation of the Environment trait using
//! the real wall clock and cryptographic RNG.
//!
//! # Capabilities
//!
//! - Real Unix time (`std::time::SystemTime`), which window numbers are
//!   computed from
//! - OS cryptographic RNG (getrandom). Truly random, not reproducible
//! - Tokio async sleep for actual wall-clock delays

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tidelock_core::Environment;

/// Production environment using system time and cryptographic RNG.
///
/// # Security
///
/// The RNG uses getrandom which provides OS-level cryptographic randomness
/// (e.g., /dev/urandom on Linux, `BCryptGenRandom` on Windows). Suitable for
/// IVs, master seeds and session salts.
///
/// # Panics
///
/// Panics if the OS RNG fails. A server without functioning cryptographic
/// randomness would issue predictable seeds and reuse IVs, so there is no
/// degraded mode to fall back to.
#[derive(Clone, Default)]
pub struct SystemEnv;

impl SystemEnv {
    /// Create a new system environment.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Environment for SystemEnv {
    fn wall_clock_millis(&self) -> u64 {
        // A clock before 1970 reads as the epoch and fails every window check.
        SystemTime::now().duration_since(UNIX_EPOCH).map_or(0, |d| d.as_millis() as u64)
    }

    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }

    #[allow(clippy::expect_used)]
    fn random_bytes(&self, buffer: &mut [u8]) {
        getrandom::fill(buffer)
            .expect("invariant: OS RNG failure is unrecoverable - server cannot operate securely");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wall_clock_is_unix_millis() {
        let env = SystemEnv::new();

        // 2024-01-01T00:00:00Z
        assert!(env.wall_clock_millis() > 1_704_067_200_000);
    }

    #[test]
    fn random_bytes_are_random() {
        let env = SystemEnv::new();

        let a: [u8; 32] = env.random_array();
        let b: [u8; 32] = env.random_array();

        // Extremely unlikely to be equal if random
        assert_ne!(a, b, "Random bytes should differ");
    }

    #[test]
    fn random_bytes_fill_buffer() {
        let env = SystemEnv::new();

        let mut bytes = [0u8; 64];
        env.random_bytes(&mut bytes);

        let non_zero_count = bytes.iter().filter(|&&b| b != 0).count();
        assert!(non_zero_count > 32, "Most bytes should be non-zero");
    }

    #[tokio::test]
    async fn sleep_waits() {
        let env = SystemEnv::new();

        let start = std::time::Instant::now();
        env.sleep(Duration::from_millis(50)).await;

        assert!(start.elapsed() >= Duration::from_millis(50), "Sleep should wait at least 50ms");
    }
}

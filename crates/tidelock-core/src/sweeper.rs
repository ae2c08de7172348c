//! Housekeeping for expired nonces and rate-limit hits.

use tracing::debug;

use crate::{
    policy::{PolicyError, SecurityPolicy},
    rate_limit::RateLimiter,
    replay::ReplayGuard,
    storage::{Storage, StorageError},
};

/// Rows removed by one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Nonces past their retention.
    pub nonces_removed: usize,
    /// Hits outside the hourly window.
    pub hits_removed: usize,
}

/// Prunes state no check depends on any more.
#[derive(Debug, Clone, Copy)]
pub struct Sweeper {
    replay: ReplayGuard,
    limiter: RateLimiter,
}

impl Sweeper {
    /// Sweeper honoring the policy's retention.
    ///
    /// # Errors
    ///
    /// Rejects an inconsistent policy. A retention shorter than the replay
    /// horizon would prune nonces whose requests can still be replayed.
    pub fn from_policy(policy: &SecurityPolicy) -> Result<Self, PolicyError> {
        policy.validate()?;

        Ok(Self {
            replay: ReplayGuard::from_policy(policy),
            limiter: RateLimiter::from_policy(policy),
        })
    }

    /// One pass over nonces and hits.
    pub fn sweep_once<S: Storage>(
        &self,
        storage: &S,
        now_ms: u64,
    ) -> Result<SweepReport, StorageError> {
        let nonces_removed = self.replay.prune(storage, now_ms)?;
        let hits_removed = self.limiter.prune(storage, now_ms)?;

        debug!(nonces_removed, hits_removed, "sweep complete");

        Ok(SweepReport { nonces_removed, hits_removed })
    }
}

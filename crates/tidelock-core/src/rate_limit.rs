//! Per-user request budgets over trailing minute and hour windows.
//!
//! Counts come from recorded hits, so the limiter itself is stateless and
//! every instance sharing a store enforces the same budget. A check and the
//! later recording are separate operations: concurrent requests may both pass
//! a check at `limit - 1`, which briefly overshoots the budget by at most the
//! number of in-flight requests.

use std::{fmt, time::Duration};

use serde::Serialize;

use crate::{
    policy::SecurityPolicy,
    storage::{Storage, StorageError},
    types::UserId,
};

/// Length of the short budget.
pub const MINUTE: Duration = Duration::from_secs(60);

/// Length of the long budget.
pub const HOUR: Duration = Duration::from_secs(60 * 60);

/// Which budget a decision refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RateScope {
    /// Trailing 60 seconds.
    Minute,
    /// Trailing 3600 seconds.
    Hour,
}

impl fmt::Display for RateScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Minute => f.write_str("minute"),
            Self::Hour => f.write_str("hour"),
        }
    }
}

/// Outcome of a rate check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    /// Under both budgets.
    Allowed,
    /// The named budget is exhausted.
    Limited(RateScope),
}

impl RateDecision {
    /// Whether the request may proceed.
    pub fn is_allowed(self) -> bool {
        matches!(self, Self::Allowed)
    }
}

/// Consumption of one budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WindowUsage {
    /// Hits in the trailing window.
    pub used: u64,
    /// Configured budget.
    pub limit: u64,
    /// `limit - used`, floored at zero.
    pub remaining: u64,
}

impl WindowUsage {
    fn new(used: u64, limit: u32) -> Self {
        let limit = u64::from(limit);
        Self { used, limit, remaining: limit.saturating_sub(used) }
    }
}

/// Usage report for a user across both budgets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateLimitUsage {
    /// Trailing-minute usage.
    pub minute: WindowUsage,
    /// Trailing-hour usage.
    pub hour: WindowUsage,
}

/// Enforces the per-minute and per-hour budgets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimiter {
    minute_limit: u32,
    hour_limit: u32,
}

impl RateLimiter {
    /// Limiter with explicit budgets.
    pub fn new(minute_limit: u32, hour_limit: u32) -> Self {
        Self { minute_limit, hour_limit }
    }

    /// Limiter configured from a policy.
    pub fn from_policy(policy: &SecurityPolicy) -> Self {
        Self::new(policy.minute_limit, policy.hour_limit)
    }

    /// Decide whether `user_id` may make another request at `now_ms`.
    ///
    /// Does not record anything.
    pub fn check<S: Storage>(
        &self,
        storage: &S,
        user_id: UserId,
        now_ms: u64,
    ) -> Result<RateDecision, StorageError> {
        let minute = storage.count_hits_after(user_id, window_start(now_ms, MINUTE))?;
        if minute >= u64::from(self.minute_limit) {
            return Ok(RateDecision::Limited(RateScope::Minute));
        }

        let hour = storage.count_hits_after(user_id, window_start(now_ms, HOUR))?;
        if hour >= u64::from(self.hour_limit) {
            return Ok(RateDecision::Limited(RateScope::Hour));
        }

        Ok(RateDecision::Allowed)
    }

    /// Record one accepted request.
    pub fn record<S: Storage>(
        &self,
        storage: &S,
        user_id: UserId,
        now_ms: u64,
    ) -> Result<(), StorageError> {
        storage.record_hit(user_id, now_ms)
    }

    /// Check and, if allowed, record in one call.
    pub fn try_acquire<S: Storage>(
        &self,
        storage: &S,
        user_id: UserId,
        now_ms: u64,
    ) -> Result<RateDecision, StorageError> {
        let decision = self.check(storage, user_id, now_ms)?;
        if decision.is_allowed() {
            self.record(storage, user_id, now_ms)?;
        }
        Ok(decision)
    }

    /// Current consumption for reporting.
    pub fn usage<S: Storage>(
        &self,
        storage: &S,
        user_id: UserId,
        now_ms: u64,
    ) -> Result<RateLimitUsage, StorageError> {
        let minute = storage.count_hits_after(user_id, window_start(now_ms, MINUTE))?;
        let hour = storage.count_hits_after(user_id, window_start(now_ms, HOUR))?;

        Ok(RateLimitUsage {
            minute: WindowUsage::new(minute, self.minute_limit),
            hour: WindowUsage::new(hour, self.hour_limit),
        })
    }

    /// Remove hits that no budget counts any more.
    pub fn prune<S: Storage>(&self, storage: &S, now_ms: u64) -> Result<usize, StorageError> {
        storage.prune_hits(window_start(now_ms, HOUR))
    }
}

/// Hits strictly after this instant fall inside the trailing window.
fn window_start(now_ms: u64, window: Duration) -> u64 {
    now_ms.saturating_sub(window.as_millis() as u64)
}

//! Security policy: every tunable of the authentication pipeline in one place.

use std::time::Duration;

use thiserror::Error;
use tidelock_crypto::{DEFAULT_WINDOW_SIZE_MS, DEFAULT_WINDOW_TOLERANCE};

/// Default HKDF label. Client and server must agree on it.
pub const DEFAULT_PROTOCOL_LABEL: &str = "tidelock_v1";

/// Default minimum nonce retention.
pub const DEFAULT_NONCE_RETENTION: Duration = Duration::from_secs(5 * 60);

/// Tunables for window validation, replay prevention and rate limiting.
///
/// Construct with [`SecurityPolicy::default`] (or a preset) and adjust
/// fields; [`SecurityPolicy::validate`] rejects combinations that would
/// weaken replay protection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityPolicy {
    /// Window length in milliseconds.
    pub window_size_ms: u64,
    /// Accepted distance, in windows, between declared and current window.
    pub window_tolerance: u32,
    /// Minimum time a consumed nonce is kept before it may be pruned.
    pub nonce_retention: Duration,
    /// Requests allowed per user in any trailing minute.
    pub minute_limit: u32,
    /// Requests allowed per user in any trailing hour.
    pub hour_limit: u32,
    /// Reject envelopes that carry no nonce.
    pub require_nonce: bool,
    /// Longest nonce accepted, in bytes.
    pub max_nonce_len: usize,
    /// HKDF label mixed into every session key.
    pub protocol_label: String,
    /// Headers that must be present (case-insensitive) on every request.
    pub required_headers: Vec<String>,
}

impl Default for SecurityPolicy {
    fn default() -> Self {
        Self {
            window_size_ms: DEFAULT_WINDOW_SIZE_MS,
            window_tolerance: DEFAULT_WINDOW_TOLERANCE,
            nonce_retention: DEFAULT_NONCE_RETENTION,
            minute_limit: 200,
            hour_limit: 10_000,
            require_nonce: true,
            max_nonce_len: 255,
            protocol_label: DEFAULT_PROTOCOL_LABEL.to_string(),
            required_headers: Vec::new(),
        }
    }
}

impl SecurityPolicy {
    /// Tight tolerance and lower limits for sensitive deployments.
    pub fn strict() -> Self {
        Self {
            window_tolerance: 1,
            minute_limit: 60,
            hour_limit: 1_000,
            ..Self::default()
        }
    }

    /// Wide tolerance for clients with poor clocks. Nonces stay mandatory.
    pub fn relaxed() -> Self {
        let base = Self::default();
        let window_tolerance = 6;
        let horizon = base.window_size_ms * (2 * u64::from(window_tolerance) + 1);

        Self {
            window_tolerance,
            nonce_retention: base.nonce_retention.max(Duration::from_millis(horizon)),
            minute_limit: 600,
            hour_limit: 30_000,
            ..base
        }
    }

    /// How long an accepted envelope stays replayable on window grounds.
    ///
    /// An envelope declaring window `current + tolerance` keeps passing the
    /// window check until the clock reaches `declared + tolerance`, so
    /// `2 * tolerance + 1` windows after its first acceptance. Nonces must
    /// outlive this span.
    pub fn replay_horizon(&self) -> Duration {
        let windows = 2 * u64::from(self.window_tolerance) + 1;
        Duration::from_millis(self.window_size_ms.saturating_mul(windows))
    }

    /// Check internal consistency.
    pub fn validate(&self) -> Result<(), PolicyError> {
        if self.window_size_ms == 0 {
            return Err(PolicyError::ZeroWindowSize);
        }

        if self.minute_limit == 0 || self.hour_limit == 0 {
            return Err(PolicyError::ZeroLimit);
        }

        if self.minute_limit > self.hour_limit {
            return Err(PolicyError::LimitsInverted {
                minute: self.minute_limit,
                hour: self.hour_limit,
            });
        }

        if self.max_nonce_len == 0 {
            return Err(PolicyError::ZeroNonceLength);
        }

        if self.protocol_label.is_empty() {
            return Err(PolicyError::EmptyLabel);
        }

        let required = self.replay_horizon();
        if self.nonce_retention < required {
            return Err(PolicyError::RetentionTooShort { retention: self.nonce_retention, required });
        }

        Ok(())
    }
}

/// Inconsistent [`SecurityPolicy`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PolicyError {
    /// Windows must have a positive length.
    #[error("window size must be positive")]
    ZeroWindowSize,

    /// A zero limit would reject every request.
    #[error("rate limits must be positive")]
    ZeroLimit,

    /// The per-minute limit can never bind if it exceeds the hourly one.
    #[error("minute limit {minute} exceeds hour limit {hour}")]
    LimitsInverted {
        /// Configured per-minute limit.
        minute: u32,
        /// Configured per-hour limit.
        hour: u32,
    },

    /// Nonces must be allowed at least one byte.
    #[error("maximum nonce length must be positive")]
    ZeroNonceLength,

    /// The HKDF label must be non-empty.
    #[error("protocol label must not be empty")]
    EmptyLabel,

    /// Nonces would be pruned while their envelopes are still acceptable.
    #[error("nonce retention {retention:?} is shorter than the replay horizon {required:?}")]
    RetentionTooShort {
        /// Configured retention.
        retention: Duration,
        /// Minimum retention for the configured window settings.
        required: Duration,
    },
}

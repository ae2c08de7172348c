//! Authentication error types.
//!
//! Every rejection the pipeline can produce, with the stable machine-readable
//! code and the HTTP-equivalent status the outer surface answers with. The
//! `Display` text is for logs; clients only ever see
//! [`AuthError::public_message`], which never names key material or the
//! internal stage that failed beyond what the code already says.

use thiserror::Error;
use tidelock_crypto::Window;

use crate::{
    envelope::ErrorBody, rate_limit::RateScope, storage::StorageError, types::UserId,
};

/// Errors produced while authenticating a request or sealing a response.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// The body is not a well-formed envelope, or a required header is
    /// missing.
    #[error("malformed envelope: {reason}")]
    MalformedEnvelope {
        /// What was wrong with it.
        reason: String,
    },

    /// The declared window is outside tolerance of the server's window.
    #[error("window {declared} outside tolerance of current window {current}")]
    WindowExpired {
        /// Window claimed by the client.
        declared: Window,
        /// Window computed from the server clock.
        current: Window,
    },

    /// The user's secret record is missing or could not be decrypted.
    ///
    /// Always logged at error level with an alert marker: outside of
    /// unprovisioned users it means store corruption or a vault key mismatch.
    #[error("key derivation failed for user {user_id}: {reason}")]
    KeyDerivationFailed {
        /// Affected user.
        user_id: UserId,
        /// Internal cause.
        reason: String,
    },

    /// The envelope MAC does not match.
    #[error("envelope signature invalid")]
    SignatureInvalid,

    /// The MAC was valid but the payload did not decrypt to a JSON value.
    #[error("payload decryption failed: {reason}")]
    DecryptionFailed {
        /// Internal cause.
        reason: String,
    },

    /// The nonce was already consumed.
    #[error("nonce already used")]
    ReplayDetected,

    /// The user exceeded a request budget.
    #[error("rate limit exceeded for the trailing {scope}")]
    RateLimited {
        /// Which budget ran out.
        scope: RateScope,
    },

    /// Storage failed mid-pipeline. Nothing was accepted.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Response payload could not be serialized.
    #[error("internal error: {reason}")]
    Internal {
        /// Internal cause.
        reason: String,
    },
}

/// Fieldless mirror of [`AuthError`] for matching and metrics labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthErrorKind {
    /// See [`AuthError::MalformedEnvelope`].
    MalformedEnvelope,
    /// See [`AuthError::WindowExpired`].
    WindowExpired,
    /// See [`AuthError::KeyDerivationFailed`].
    KeyDerivationFailed,
    /// See [`AuthError::SignatureInvalid`].
    SignatureInvalid,
    /// See [`AuthError::DecryptionFailed`].
    DecryptionFailed,
    /// See [`AuthError::ReplayDetected`].
    ReplayDetected,
    /// See [`AuthError::RateLimited`].
    RateLimited,
    /// See [`AuthError::Storage`].
    Storage,
    /// See [`AuthError::Internal`].
    Internal,
}

impl AuthError {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedEnvelope { reason: reason.into() }
    }

    /// Kind of this error.
    pub fn kind(&self) -> AuthErrorKind {
        match self {
            Self::MalformedEnvelope { .. } => AuthErrorKind::MalformedEnvelope,
            Self::WindowExpired { .. } => AuthErrorKind::WindowExpired,
            Self::KeyDerivationFailed { .. } => AuthErrorKind::KeyDerivationFailed,
            Self::SignatureInvalid => AuthErrorKind::SignatureInvalid,
            Self::DecryptionFailed { .. } => AuthErrorKind::DecryptionFailed,
            Self::ReplayDetected => AuthErrorKind::ReplayDetected,
            Self::RateLimited { .. } => AuthErrorKind::RateLimited,
            Self::Storage(_) => AuthErrorKind::Storage,
            Self::Internal { .. } => AuthErrorKind::Internal,
        }
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self.kind() {
            AuthErrorKind::MalformedEnvelope => "MALFORMED_ENVELOPE",
            AuthErrorKind::WindowExpired => "WINDOW_EXPIRED",
            AuthErrorKind::KeyDerivationFailed => "KEY_DERIVATION_FAILED",
            AuthErrorKind::SignatureInvalid => "SIGNATURE_INVALID",
            AuthErrorKind::DecryptionFailed => "DECRYPTION_FAILED",
            AuthErrorKind::ReplayDetected => "REPLAY_DETECTED",
            AuthErrorKind::RateLimited => "RATE_LIMITED",
            AuthErrorKind::Storage | AuthErrorKind::Internal => "INTERNAL_ERROR",
        }
    }

    /// HTTP-equivalent status. Never 200.
    pub fn http_status(&self) -> u16 {
        match self.kind() {
            AuthErrorKind::MalformedEnvelope => 400,
            AuthErrorKind::WindowExpired
            | AuthErrorKind::SignatureInvalid
            | AuthErrorKind::DecryptionFailed => 401,
            AuthErrorKind::ReplayDetected => 403,
            AuthErrorKind::RateLimited => 429,
            AuthErrorKind::KeyDerivationFailed | AuthErrorKind::Internal => 500,
            AuthErrorKind::Storage => 503,
        }
    }

    /// Message safe to return to the client.
    pub fn public_message(&self) -> &'static str {
        match self.kind() {
            AuthErrorKind::MalformedEnvelope => "Invalid request format",
            AuthErrorKind::WindowExpired => "Request expired",
            AuthErrorKind::KeyDerivationFailed => "Unable to authenticate request",
            AuthErrorKind::SignatureInvalid => "Invalid request signature",
            AuthErrorKind::DecryptionFailed => "Unable to decrypt request",
            AuthErrorKind::ReplayDetected => "Request already processed",
            AuthErrorKind::RateLimited => "Rate limit exceeded",
            AuthErrorKind::Storage => "Service temporarily unavailable",
            AuthErrorKind::Internal => "Internal error",
        }
    }

    /// Whether the same request may succeed if retried unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), AuthErrorKind::RateLimited | AuthErrorKind::Storage)
    }

    /// Error response body for the client.
    pub fn to_error_body(&self) -> ErrorBody {
        ErrorBody::new(self.code(), self.public_message())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_errors() -> Vec<AuthError> {
        vec![
            AuthError::malformed("x"),
            AuthError::WindowExpired { declared: 1, current: 10 },
            AuthError::KeyDerivationFailed { user_id: UserId(1), reason: "x".into() },
            AuthError::SignatureInvalid,
            AuthError::DecryptionFailed { reason: "x".into() },
            AuthError::ReplayDetected,
            AuthError::RateLimited { scope: RateScope::Minute },
            AuthError::Storage(StorageError::Io("disk".into())),
            AuthError::Internal { reason: "x".into() },
        ]
    }

    #[test]
    fn statuses_are_never_success() {
        for error in all_errors() {
            let status = error.http_status();
            assert!((400..600).contains(&status), "{error:?} -> {status}");
        }
    }

    #[test]
    fn codes_match_taxonomy() {
        let codes: Vec<_> = all_errors().iter().map(AuthError::code).collect();
        assert_eq!(
            codes,
            [
                "MALFORMED_ENVELOPE",
                "WINDOW_EXPIRED",
                "KEY_DERIVATION_FAILED",
                "SIGNATURE_INVALID",
                "DECRYPTION_FAILED",
                "REPLAY_DETECTED",
                "RATE_LIMITED",
                "INTERNAL_ERROR",
                "INTERNAL_ERROR",
            ]
        );
    }

    #[test]
    fn public_message_hides_internals() {
        let error = AuthError::KeyDerivationFailed {
            user_id: UserId(77),
            reason: "vault padding error".into(),
        };
        let body = error.to_error_body();
        assert!(!body.message.contains("77"));
        assert!(!body.message.contains("vault"));
        assert_eq!(body.code, "KEY_DERIVATION_FAILED");
    }

    #[test]
    fn only_transient_errors_are_retryable() {
        assert!(AuthError::RateLimited { scope: RateScope::Hour }.is_retryable());
        assert!(!AuthError::ReplayDetected.is_retryable());
        assert!(!AuthError::SignatureInvalid.is_retryable());
    }
}

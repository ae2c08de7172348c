//! Server error types.

use std::fmt;

use tidelock_core::{AuthError, PolicyError, StorageError, UserId};

/// Errors that can occur in the server runtime and operator commands.
#[derive(Debug)]
pub enum ServerError {
    /// Configuration error (missing or malformed vault key, invalid limits,
    /// etc.).
    ///
    /// These are fatal errors that prevent startup. Fix configuration and
    /// restart.
    Config(String),

    /// Storage error (database cannot be opened, I/O failure, etc.).
    Storage(StorageError),

    /// Authentication error surfaced by an operator command such as `probe`.
    Auth(AuthError),

    /// No credentials were ever issued for this user.
    UnknownUser(UserId),

    /// A self-test request was rejected by the pipeline.
    ProbeRejected {
        /// HTTP-equivalent status of the rejection.
        status: u16,
        /// Error body returned.
        body: String,
    },

    /// Local I/O error (writing command output, signal handling, etc.).
    Io(String),

    /// Internal error (unexpected state, logic bug, etc.).
    ///
    /// Should never happen in correct implementation. Indicates a bug.
    Internal(String),
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "configuration error: {msg}"),
            Self::Storage(err) => write!(f, "storage error: {err}"),
            Self::Auth(err) => write!(f, "authentication error: {err}"),
            Self::UnknownUser(user_id) => write!(f, "no credentials issued for user {user_id}"),
            Self::ProbeRejected { status, body } => write!(f, "probe rejected ({status}): {body}"),
            Self::Io(msg) => write!(f, "I/O error: {msg}"),
            Self::Internal(msg) => write!(f, "internal error: {msg}"),
        }
    }
}

impl std::error::Error for ServerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Storage(err) => Some(err),
            Self::Auth(err) => Some(err),
            _ => None,
        }
    }
}

impl From<StorageError> for ServerError {
    fn from(err: StorageError) -> Self {
        Self::Storage(err)
    }
}

impl From<AuthError> for ServerError {
    fn from(err: AuthError) -> Self {
        Self::Auth(err)
    }
}

impl From<PolicyError> for ServerError {
    fn from(err: PolicyError) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<std::io::Error> for ServerError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

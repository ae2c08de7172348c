//! Storage error types.
//!
//! Defines errors that can occur during storage operations:
//! - `Duplicate`: insert-or-fail hit an existing nonce
//! - `Serialization`: failed to encode/decode a record
//! - `Io`: underlying storage system errors, including injected faults

use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// Nonce already recorded for this user.
    ///
    /// Returned by `insert_nonce` when the `(user_id, nonce)` pair exists.
    /// The existing record is left untouched.
    #[error("nonce already recorded")]
    Duplicate,

    /// Serialization or deserialization failed
    #[error("serialization error: {0}")]
    Serialization(String),

    /// I/O error (file system, database, lock poisoning, etc.)
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::Io(err.to_string())
    }
}

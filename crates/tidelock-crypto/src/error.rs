//! Error types for cryptographic operations.

use thiserror::Error;

/// Errors from vault, cipher and key handling.
///
/// Variants carry diagnostic context for server-side logs only. Callers that
/// answer clients must map these to a generic error kind.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// Input was not valid base64.
    #[error("invalid base64 encoding")]
    InvalidEncoding,

    /// Decoded payload is too short to hold an IV and one cipher block.
    #[error("ciphertext too short: {len} bytes")]
    Truncated {
        /// Decoded length in bytes
        len: usize,
    },

    /// CBC decryption produced invalid padding (wrong key, wrong IV or
    /// corrupted data).
    #[error("cipher padding check failed")]
    Padding,

    /// Key material has the wrong length or encoding.
    #[error("invalid key: expected {expected} bytes, got {got}")]
    InvalidKey {
        /// Required length in bytes
        expected: usize,
        /// Provided length in bytes
        got: usize,
    },

    /// Key text is not valid hex.
    #[error("key is not valid hex")]
    InvalidKeyEncoding,

    /// The vault record's tag does not verify for this user. The record was
    /// written for another user id, under another vault key, or was altered.
    #[error("vault record failed authentication for user {user_id}")]
    RecordMismatch {
        /// User the record was opened for
        user_id: u64,
    },

    /// Vault decryption succeeded structurally but did not yield a well-formed
    /// master seed. Indicates a wrong vault key, a wrong user id or a corrupt
    /// record.
    #[error("vault record for user {user_id} is not a valid master seed")]
    CorruptSeed {
        /// User whose record failed to open
        user_id: u64,
    },
}

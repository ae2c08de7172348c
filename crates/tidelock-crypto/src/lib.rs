//! Tidelock Cryptographic Primitives
//!
//! Cryptographic building blocks for the Tidelock request protocol. Pure
//! functions with deterministic outputs. Callers provide IVs and random bytes
//! so every operation can be tested deterministically.
//!
//! # Key Lifecycle
//!
//! Each user owns a long-term master seed that is stored encrypted under the
//! server's vault key. Every 30 second window, client and server
//! independently derive the same session key from the seed, the per-login
//! session salt and the window index. Nothing derived is ever transmitted.
//!
//! ```text
//! Vault Key + user id
//!        │
//!        ▼
//! SeedVault (AES-256-CBC) → Master Seed
//!        │
//!        ▼
//! HKDF-SHA256 (salt = session salt, info = label_window) → Session Key
//!        │
//!        ▼
//! AES-256-CBC (random IV) → base64(IV || ciphertext)
//!        │
//!        ▼
//! HMAC-SHA256(session key, base64 text) → envelope MAC
//! ```
//!
//! # Security
//!
//! Encrypt-then-MAC:
//! - The MAC covers the exact base64 text carried on the wire
//! - Receivers verify the MAC in constant time before any decryption
//! - A valid MAC implies an intact ciphertext, so padding oracles are closed
//!
//! Window Rotation:
//! - Keys rotate every window; a leaked session key is useless outside its
//!   window and the tolerance around it
//! - Rotating the session salt at login invalidates all earlier keys
//!
//! Key Material Hygiene:
//! - [`VaultKey`], [`MasterSeed`] and [`SessionKey`] zeroize on drop
//! - None of them implement a `Debug` that prints their contents

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod cipher;
mod error;
pub mod kdf;
pub mod mac;
pub mod vault;
pub mod window;

pub use cipher::{IV_LEN, decrypt_payload, encrypt_payload};
pub use error::CryptoError;
pub use kdf::{
    MASTER_SEED_RANDOM_LEN, MasterSeed, SESSION_KEY_LEN, SESSION_SALT_RANDOM_LEN, SessionKey,
    derive_session_key, new_session_salt,
};
pub use mac::{sign_envelope, verify_envelope};
pub use vault::{SeedVault, VaultKey};
pub use window::{
    DEFAULT_WINDOW_SIZE_MS, DEFAULT_WINDOW_TOLERANCE, Window, window_at, within_tolerance,
};

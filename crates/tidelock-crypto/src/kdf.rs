//! Session key derivation using HKDF-SHA256.
//!
//! ```text
//! PRK = HMAC-SHA256(key = session_salt, message = master_seed)
//! OKM = HMAC-SHA256(key = PRK, message = label || "_" || window || 0x01)
//! ```
//!
//! This is exactly HKDF-Extract followed by a single HKDF-Expand block, so the
//! `hkdf` crate computes it directly.

use std::fmt;

use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::Zeroize;

use crate::{error::CryptoError, window::Window};

/// Random bytes behind a freshly generated master seed.
pub const MASTER_SEED_RANDOM_LEN: usize = 64;

/// Random bytes behind a freshly generated session salt.
pub const SESSION_SALT_RANDOM_LEN: usize = 32;

/// Length of a derived session key (AES-256).
pub const SESSION_KEY_LEN: usize = 32;

/// A user's long-term secret.
///
/// Held as lowercase or uppercase hex text because that text, not the raw
/// bytes it encodes, is the input keying material both client and server
/// feed into HKDF.
#[derive(Clone, PartialEq, Eq)]
pub struct MasterSeed {
    hex: String,
}

impl MasterSeed {
    /// Build a seed from caller-provided random bytes.
    ///
    /// Caller MUST provide cryptographically secure random bytes in
    /// production.
    pub fn from_random(random: &[u8; MASTER_SEED_RANDOM_LEN]) -> Self {
        Self { hex: hex::encode(random) }
    }

    /// Parse a seed from its hex text form.
    ///
    /// Rejects empty, odd-length and non-hex input.
    pub fn from_hex(text: impl Into<String>) -> Result<Self, CryptoError> {
        let mut hex = text.into();
        if !is_hex_text(hex.as_bytes()) {
            hex.zeroize();
            return Err(CryptoError::InvalidKeyEncoding);
        }
        Ok(Self { hex })
    }

    /// Seed text as transmitted to the client at issuance.
    pub fn expose_hex(&self) -> &str {
        &self.hex
    }

    /// Input keying material for HKDF.
    pub fn as_bytes(&self) -> &[u8] {
        self.hex.as_bytes()
    }
}

impl Drop for MasterSeed {
    fn drop(&mut self) {
        self.hex.zeroize();
    }
}

impl fmt::Debug for MasterSeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MasterSeed(<redacted>)")
    }
}

/// Build a session salt (hex text) from caller-provided random bytes.
pub fn new_session_salt(random: &[u8; SESSION_SALT_RANDOM_LEN]) -> String {
    hex::encode(random)
}

/// Ephemeral AES-256 key valid for a single window.
#[derive(Clone)]
pub struct SessionKey {
    key: [u8; SESSION_KEY_LEN],
    window: Window,
}

impl SessionKey {
    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8; SESSION_KEY_LEN] {
        &self.key
    }

    /// Window this key was derived for.
    pub fn window(&self) -> Window {
        self.window
    }
}

impl Drop for SessionKey {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

impl fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionKey").field("window", &self.window).finish_non_exhaustive()
    }
}

/// Derive the session key for `(master_seed, session_salt, window)`.
///
/// Deterministic with no hidden state: the same triple (and label) yields
/// the same key on any instance, which is what lets client and server agree
/// without transmitting it.
pub fn derive_session_key(
    master_seed: &MasterSeed,
    session_salt: &[u8],
    label: &str,
    window: Window,
) -> SessionKey {
    let hkdf = Hkdf::<Sha256>::new(Some(session_salt), master_seed.as_bytes());
    let info = format!("{label}_{window}");

    let mut key = [0u8; SESSION_KEY_LEN];
    let Ok(()) = hkdf.expand(info.as_bytes(), &mut key) else {
        unreachable!("32 bytes is a valid HKDF-SHA256 output length");
    };

    SessionKey { key, window }
}

/// Non-empty, even-length ASCII hex.
pub(crate) fn is_hex_text(bytes: &[u8]) -> bool {
    !bytes.is_empty() && bytes.len() % 2 == 0 && bytes.iter().all(u8::is_ascii_hexdigit)
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn test_seed() -> MasterSeed {
        MasterSeed::from_hex("0123456789abcdef".repeat(8)).unwrap()
    }

    fn test_salt() -> Vec<u8> {
        "fedcba9876543210".repeat(4).into_bytes()
    }

    #[test]
    fn known_answer() {
        let key = derive_session_key(&test_seed(), &test_salt(), "tidelock_v1", 57_000_000);
        assert_eq!(
            hex::encode(key.as_bytes()),
            "2543440461dbb470c510fd2f7c5fa0d271a4751068eb62bae6c4887215e63db8"
        );
        assert_eq!(key.window(), 57_000_000);
    }

    #[test]
    fn adjacent_window_known_answer() {
        let key = derive_session_key(&test_seed(), &test_salt(), "tidelock_v1", 57_000_001);
        assert_eq!(
            hex::encode(key.as_bytes()),
            "310564dc0a74838ceabb6dbcc1a2588a6d0aa6b2758a374a31398ac14d38c91d"
        );
    }

    #[test]
    fn different_labels_produce_different_keys() {
        let a = derive_session_key(&test_seed(), &test_salt(), "tidelock_v1", 7);
        let b = derive_session_key(&test_seed(), &test_salt(), "tidelock_v2", 7);
        assert_ne!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn different_salts_produce_different_keys() {
        let a = derive_session_key(&test_seed(), b"aa", "tidelock_v1", 7);
        let b = derive_session_key(&test_seed(), b"bb", "tidelock_v1", 7);
        assert_ne!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn seed_from_random_is_hex_text() {
        let seed = MasterSeed::from_random(&[0xAB; MASTER_SEED_RANDOM_LEN]);
        assert_eq!(seed.expose_hex().len(), MASTER_SEED_RANDOM_LEN * 2);
        assert!(seed.expose_hex().chars().all(|c| c == 'a' || c == 'b'));
    }

    #[test]
    fn session_salt_is_hex_text() {
        let salt = new_session_salt(&[0x01; SESSION_SALT_RANDOM_LEN]);
        assert_eq!(salt, "01".repeat(SESSION_SALT_RANDOM_LEN));
    }

    #[test]
    fn rejects_malformed_seed_text() {
        assert!(MasterSeed::from_hex("").is_err());
        assert!(MasterSeed::from_hex("abc").is_err());
        assert!(MasterSeed::from_hex("zz").is_err());
        assert!(MasterSeed::from_hex("AbCd").is_ok());
    }

    #[test]
    fn debug_does_not_leak() {
        let seed = test_seed();
        assert_eq!(format!("{seed:?}"), "MasterSeed(<redacted>)");

        let key = derive_session_key(&seed, b"salt", "tidelock_v1", 1);
        assert!(!format!("{key:?}").contains(&hex::encode(key.as_bytes())));
    }

    proptest! {
        #[test]
        fn prop_derivation_is_deterministic(
            random in proptest::array::uniform32(any::<u8>()),
            salt in proptest::collection::vec(any::<u8>(), 0..64),
            window in any::<i64>(),
        ) {
            let mut seed_bytes = [0u8; MASTER_SEED_RANDOM_LEN];
            seed_bytes[..32].copy_from_slice(&random);
            let seed = MasterSeed::from_random(&seed_bytes);

            let a = derive_session_key(&seed, &salt, "tidelock_v1", window);
            let b = derive_session_key(&seed, &salt, "tidelock_v1", window);
            prop_assert_eq!(a.as_bytes(), b.as_bytes());
        }

        #[test]
        fn prop_windows_rotate_keys(window in 0i64..i64::MAX) {
            let a = derive_session_key(&test_seed(), &test_salt(), "tidelock_v1", window);
            let b = derive_session_key(&test_seed(), &test_salt(), "tidelock_v1", window - 1);
            prop_assert_ne!(a.as_bytes(), b.as_bytes());
        }
    }
}

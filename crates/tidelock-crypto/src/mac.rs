//! Envelope MAC: HMAC-SHA256 over the base64 `encrypted` text.

use base64::{Engine, engine::general_purpose::STANDARD};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::kdf::SessionKey;

type HmacSha256 = Hmac<Sha256>;

/// HMAC-SHA256 output length.
const TAG_LEN: usize = 32;

/// Compute the envelope MAC as lowercase hex.
pub fn sign_envelope(key: &SessionKey, encrypted: &str) -> String {
    hex::encode(mac_for(key, encrypted).finalize().into_bytes())
}

/// Verify a received MAC in constant time.
///
/// Accepts the tag as 64 hex characters (any case) or as base64 of the raw
/// 32 bytes. Malformed tags are a plain mismatch.
pub fn verify_envelope(key: &SessionKey, encrypted: &str, tag: &str) -> bool {
    let Some(received) = decode_tag(tag) else {
        return false;
    };

    mac_for(key, encrypted).verify_slice(&received).is_ok()
}

fn mac_for(key: &SessionKey, encrypted: &str) -> HmacSha256 {
    let Ok(mut mac) = HmacSha256::new_from_slice(key.as_bytes()) else {
        unreachable!("HMAC accepts keys of any length");
    };
    mac.update(encrypted.as_bytes());
    mac
}

fn decode_tag(tag: &str) -> Option<Vec<u8>> {
    if tag.len() == TAG_LEN * 2 {
        if let Ok(bytes) = hex::decode(tag) {
            return Some(bytes);
        }
    }

    STANDARD.decode(tag).ok().filter(|bytes| bytes.len() == TAG_LEN)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kdf::{MasterSeed, derive_session_key};

    const ENCRYPTED: &str = "BwcHBwcHBwcHBwcHBwcHB9k91hOVVZK26IA9XqFxXU9oTHMnxRXTJgaxShenKSGf";
    const EXPECTED_TAG: &str = "0c57d74ad0f6a5c343c8c76132531533815621ea70d30d738f37506b0c28fb6f";

    fn test_key(window: i64) -> SessionKey {
        let seed = MasterSeed::from_hex("0123456789abcdef".repeat(8)).unwrap();
        derive_session_key(&seed, "fedcba9876543210".repeat(4).as_bytes(), "tidelock_v1", window)
    }

    #[test]
    fn known_answer() {
        assert_eq!(sign_envelope(&test_key(57_000_000), ENCRYPTED), EXPECTED_TAG);
    }

    #[test]
    fn accepts_hex_in_any_case() {
        let key = test_key(57_000_000);
        assert!(verify_envelope(&key, ENCRYPTED, EXPECTED_TAG));
        assert!(verify_envelope(&key, ENCRYPTED, &EXPECTED_TAG.to_uppercase()));
    }

    #[test]
    fn accepts_base64_tag() {
        let key = test_key(57_000_000);
        let tag = STANDARD.encode(hex::decode(EXPECTED_TAG).unwrap());
        assert!(verify_envelope(&key, ENCRYPTED, &tag));
    }

    #[test]
    fn rejects_tampered_ciphertext() {
        let key = test_key(57_000_000);
        let mut tampered = ENCRYPTED.to_string();
        tampered.replace_range(20..21, "A");
        assert_ne!(tampered, ENCRYPTED);
        assert!(!verify_envelope(&key, &tampered, EXPECTED_TAG));
    }

    #[test]
    fn rejects_wrong_window_key() {
        assert!(!verify_envelope(&test_key(57_000_001), ENCRYPTED, EXPECTED_TAG));
    }

    #[test]
    fn rejects_malformed_tags() {
        let key = test_key(57_000_000);
        assert!(!verify_envelope(&key, ENCRYPTED, ""));
        assert!(!verify_envelope(&key, ENCRYPTED, "zz"));
        assert!(!verify_envelope(&key, ENCRYPTED, &EXPECTED_TAG[..62]));
        assert!(!verify_envelope(&key, ENCRYPTED, &"g".repeat(64)));
    }
}

//! At-rest protection of master seeds under a server-held vault key.
//!
//! ```text
//! IV      = first 16 chars of hex(MD5(decimal user id))
//! ct      = AES-256-CBC(vault key, IV, seed hex text)
//! mac key = HKDF-SHA256(ikm = vault key, info = "tidelock_vault_mac")
//! tag     = HMAC-SHA256(mac key, user_id as u64 BE || ct)
//! record  = base64(ct || tag)
//! ```
//!
//! The IV only has to differ between users (each user has exactly one live
//! seed record); it does not hide whether a user's seed changed between two
//! snapshots of the store. The tag binds the record to its user id and is
//! verified before decryption, so opening a record under any other id, or
//! under another vault key, fails cleanly instead of yielding a scrambled
//! seed.
//!
//! The vault key is operator-provided configuration. There is no built-in or
//! fallback key.

use std::fmt;

use base64::{Engine, engine::general_purpose::STANDARD};
use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use md5::{Digest, Md5};
use sha2::Sha256;
use zeroize::{Zeroize, Zeroizing};

use crate::{
    cipher::{IV_LEN, decrypt_cbc, encrypt_cbc},
    error::CryptoError,
    kdf::{MasterSeed, is_hex_text},
};

type HmacSha256 = Hmac<Sha256>;

/// Length of the record tag appended to the ciphertext.
pub const RECORD_TAG_LEN: usize = 32;

const MAC_KEY_INFO: &[u8] = b"tidelock_vault_mac";

/// Server-held AES-256 key protecting master seeds.
pub struct VaultKey {
    key: [u8; 32],
}

impl VaultKey {
    /// Key length in bytes.
    pub const LEN: usize = 32;

    /// Wrap raw key bytes.
    pub fn from_bytes(key: [u8; 32]) -> Self {
        Self { key }
    }

    /// Parse a key from 64 hex characters.
    pub fn from_hex(text: &str) -> Result<Self, CryptoError> {
        let bytes =
            Zeroizing::new(hex::decode(text.trim()).map_err(|_| CryptoError::InvalidKeyEncoding)?);

        if bytes.len() != Self::LEN {
            return Err(CryptoError::InvalidKey { expected: Self::LEN, got: bytes.len() });
        }

        let mut key = [0u8; Self::LEN];
        key.copy_from_slice(&bytes);
        Ok(Self { key })
    }
}

impl Drop for VaultKey {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

impl fmt::Debug for VaultKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("VaultKey(<redacted>)")
    }
}

/// Encrypts and decrypts master seeds for storage.
#[derive(Debug)]
pub struct SeedVault {
    key: VaultKey,
    mac_key: VaultKey,
}

impl SeedVault {
    /// Create a vault around an operator-provided key.
    pub fn new(key: VaultKey) -> Self {
        let hkdf = Hkdf::<Sha256>::new(None, &key.key);
        let mut mac_key = [0u8; VaultKey::LEN];
        let Ok(()) = hkdf.expand(MAC_KEY_INFO, &mut mac_key) else {
            unreachable!("32 bytes is a valid HKDF-SHA256 output length");
        };

        let mac_key = VaultKey::from_bytes(mac_key);
        Self { key, mac_key }
    }

    /// Encrypt a seed for the given user. Output is base64 text.
    pub fn encrypt(&self, seed: &MasterSeed, user_id: u64) -> String {
        let mut record = encrypt_cbc(&self.key.key, &user_iv(user_id), seed.as_bytes());
        let tag = self.record_mac(user_id, &record).finalize().into_bytes();
        record.extend_from_slice(&tag);
        STANDARD.encode(record)
    }

    /// Decrypt a stored seed for the given user.
    ///
    /// # Errors
    ///
    /// - `InvalidEncoding` / `Truncated`: the record is not vault output
    /// - `RecordMismatch`: the record belongs to another user id, was written
    ///   under another vault key, or was altered
    /// - `Padding` / `CorruptSeed`: the tag verified but the content is not a
    ///   seed, which only a writer holding the vault key can produce
    pub fn decrypt(&self, record: &str, user_id: u64) -> Result<MasterSeed, CryptoError> {
        let raw = STANDARD.decode(record.trim()).map_err(|_| CryptoError::InvalidEncoding)?;

        let Some(ct_len) = raw.len().checked_sub(RECORD_TAG_LEN) else {
            return Err(CryptoError::Truncated { len: raw.len() });
        };
        if ct_len == 0 || ct_len % IV_LEN != 0 {
            return Err(CryptoError::Truncated { len: raw.len() });
        }

        let (ciphertext, tag) = raw.split_at(ct_len);
        self.record_mac(user_id, ciphertext)
            .verify_slice(tag)
            .map_err(|_| CryptoError::RecordMismatch { user_id })?;

        let plaintext = Zeroizing::new(decrypt_cbc(&self.key.key, &user_iv(user_id), ciphertext)?);

        if !is_hex_text(&plaintext) {
            return Err(CryptoError::CorruptSeed { user_id });
        }

        let text = String::from_utf8(plaintext.to_vec())
            .map_err(|_| CryptoError::CorruptSeed { user_id })?;
        MasterSeed::from_hex(text).map_err(|_| CryptoError::CorruptSeed { user_id })
    }

    fn record_mac(&self, user_id: u64, ciphertext: &[u8]) -> HmacSha256 {
        let Ok(mut mac) = HmacSha256::new_from_slice(&self.mac_key.key) else {
            unreachable!("HMAC accepts keys of any length");
        };
        mac.update(&user_id.to_be_bytes());
        mac.update(ciphertext);
        mac
    }
}

/// Deterministic per-user IV.
pub fn user_iv(user_id: u64) -> [u8; IV_LEN] {
    let digest = hex::encode(Md5::digest(user_id.to_string().as_bytes()));

    let mut iv = [0u8; IV_LEN];
    iv.copy_from_slice(&digest.as_bytes()[..IV_LEN]);
    iv
}

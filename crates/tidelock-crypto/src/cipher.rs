//! Payload encryption using AES-256-CBC.
//!
//! Wire form is `base64(IV || ciphertext)` with PKCS#7 padding. Integrity is
//! NOT provided here: callers MUST verify the envelope MAC (see
//! [`crate::mac`]) before calling [`decrypt_payload`].
//!
//! All functions are pure - the IV must be provided by the caller.

use base64::{Engine, engine::general_purpose::STANDARD};
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit, block_padding::Pkcs7};

use crate::{error::CryptoError, kdf::SessionKey};

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// AES block and IV size (16 bytes).
pub const IV_LEN: usize = 16;

/// Encrypt `plaintext` under `key` with a caller-provided IV.
///
/// Returns the base64 text that goes into the envelope's `encrypted` field.
///
/// # Security
///
/// - The IV MUST be fresh and random for every message
/// - Output is malleable on its own; always MAC it
pub fn encrypt_payload(plaintext: &[u8], key: &SessionKey, iv: [u8; IV_LEN]) -> String {
    let ciphertext = encrypt_cbc(key.as_bytes(), &iv, plaintext);

    let mut combined = Vec::with_capacity(IV_LEN + ciphertext.len());
    combined.extend_from_slice(&iv);
    combined.extend_from_slice(&ciphertext);

    STANDARD.encode(combined)
}

/// Decrypt base64 `IV || ciphertext` under `key`.
///
/// Never returns partial plaintext.
///
/// # Errors
///
/// - `InvalidEncoding`: not base64
/// - `Truncated`: shorter than IV plus one block, or not block aligned
/// - `Padding`: wrong key or corrupted ciphertext
pub fn decrypt_payload(encoded: &str, key: &SessionKey) -> Result<Vec<u8>, CryptoError> {
    let combined = STANDARD.decode(encoded).map_err(|_| CryptoError::InvalidEncoding)?;

    if combined.len() < IV_LEN * 2 || combined.len() % IV_LEN != 0 {
        return Err(CryptoError::Truncated { len: combined.len() });
    }

    let (iv, ciphertext) = combined.split_at(IV_LEN);
    decrypt_cbc(key.as_bytes(), iv, ciphertext)
}

pub(crate) fn encrypt_cbc(key: &[u8; 32], iv: &[u8; IV_LEN], plaintext: &[u8]) -> Vec<u8> {
    Aes256CbcEnc::new(key.into(), iv.into()).encrypt_padded_vec_mut::<Pkcs7>(plaintext)
}

pub(crate) fn decrypt_cbc(
    key: &[u8; 32],
    iv: &[u8],
    ciphertext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let decryptor = Aes256CbcDec::new_from_slices(key, iv)
        .map_err(|_| CryptoError::InvalidKey { expected: IV_LEN, got: iv.len() })?;

    decryptor.decrypt_padded_vec_mut::<Pkcs7>(ciphertext).map_err(|_| CryptoError::Padding)
}

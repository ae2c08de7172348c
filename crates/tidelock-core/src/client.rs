//! Client half of the protocol.
//!
//! Holds the credentials issued at login and seals requests / opens
//! responses exactly the way [`crate::RequestAuthenticator`] expects. The
//! caller supplies the window, nonce and IV so sessions stay deterministic
//! under test.

use serde::Serialize;
use tidelock_crypto::{
    IV_LEN, MasterSeed, SessionKey, Window, derive_session_key, encrypt_payload, sign_envelope,
    verify_envelope, window_at,
};

use crate::{
    authenticator::open_payload,
    envelope::{RequestEnvelope, ResponseEnvelope, Status},
    error::AuthError,
    issuance::IssuedCredentials,
    policy::SecurityPolicy,
};

/// A client's view of its credentials.
#[derive(Debug, Clone)]
pub struct ClientSession {
    master_seed: MasterSeed,
    session_salt: String,
    protocol_label: String,
    window_size_ms: u64,
}

impl ClientSession {
    /// Session from raw credential parts.
    pub fn new(master_seed: MasterSeed, session_salt: String, policy: &SecurityPolicy) -> Self {
        Self {
            master_seed,
            session_salt,
            protocol_label: policy.protocol_label.clone(),
            window_size_ms: policy.window_size_ms,
        }
    }

    /// Session from what issuance returned.
    pub fn from_credentials(credentials: &IssuedCredentials, policy: &SecurityPolicy) -> Self {
        Self::new(credentials.master_seed.clone(), credentials.session_salt.clone(), policy)
    }

    /// Window for a client-side Unix time.
    pub fn window_at(&self, unix_millis: u64) -> Window {
        window_at(unix_millis, self.window_size_ms)
    }

    /// Session key for `window`.
    pub fn session_key(&self, window: Window) -> SessionKey {
        derive_session_key(
            &self.master_seed,
            self.session_salt.as_bytes(),
            &self.protocol_label,
            window,
        )
    }

    /// Serialize `payload` as JSON and seal it.
    pub fn seal_request<T: Serialize + ?Sized>(
        &self,
        payload: &T,
        window: Window,
        nonce: impl Into<String>,
        iv: [u8; IV_LEN],
    ) -> Result<RequestEnvelope, serde_json::Error> {
        let plaintext = serde_json::to_vec(payload)?;
        Ok(self.seal_bytes(&plaintext, window, Some(nonce.into()), iv))
    }

    /// Seal raw plaintext bytes.
    pub fn seal_bytes(
        &self,
        plaintext: &[u8],
        window: Window,
        nonce: Option<String>,
        iv: [u8; IV_LEN],
    ) -> RequestEnvelope {
        let key = self.session_key(window);
        let encrypted = encrypt_payload(plaintext, &key, iv);
        let hmac = sign_envelope(&key, &encrypted);

        RequestEnvelope { encrypted, window, hmac, nonce }
    }

    /// Verify and decrypt a server response.
    pub fn open_response(&self, response: &ResponseEnvelope) -> Result<serde_json::Value, AuthError> {
        if response.status != Status::Success {
            return Err(AuthError::malformed("response status is not success"));
        }

        let key = self.session_key(response.window);
        if !verify_envelope(&key, &response.encrypted, &response.hmac) {
            return Err(AuthError::SignatureInvalid);
        }

        open_payload(&response.encrypted, &key)
    }
}

//! JSON wire format for requests, responses and error bodies.
//!
//! ```text
//! request:  {"encrypted": "<b64 IV||ct>", "window": 57000000, "hmac": "<hex>", "nonce": "..."}
//! response: {"status": "success", "encrypted": "...", "window": 57000001, "hmac": "..."}
//! error:    {"status": "error", "message": "Request expired", "code": "WINDOW_EXPIRED"}
//! ```

use serde::{Deserialize, Serialize};
use tidelock_crypto::Window;

use crate::{error::AuthError, policy::SecurityPolicy};

/// Outcome marker carried by responses and error bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Authenticated response.
    Success,
    /// Rejected request.
    Error,
}

/// Encrypted, signed request as sent by a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestEnvelope {
    /// base64 of `IV || ciphertext`.
    pub encrypted: String,
    /// Window the client derived its key for.
    pub window: Window,
    /// HMAC-SHA256 over `encrypted`, hex or base64.
    pub hmac: String,
    /// Single-use token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
}

impl RequestEnvelope {
    /// Parse a request body.
    ///
    /// Unknown fields are ignored. The window must be a JSON integer.
    pub fn from_json(body: &[u8]) -> Result<Self, AuthError> {
        serde_json::from_slice(body).map_err(|e| AuthError::malformed(e.to_string()))
    }

    /// Structural checks that need no key material.
    pub fn validate(&self, policy: &SecurityPolicy) -> Result<(), AuthError> {
        if self.encrypted.is_empty() {
            return Err(AuthError::malformed("empty encrypted field"));
        }

        if self.hmac.is_empty() {
            return Err(AuthError::malformed("empty hmac field"));
        }

        match &self.nonce {
            None if policy.require_nonce => Err(AuthError::malformed("missing nonce")),
            None => Ok(()),
            Some(nonce) if nonce.is_empty() => Err(AuthError::malformed("empty nonce")),
            Some(nonce) if nonce.len() > policy.max_nonce_len => Err(AuthError::malformed(
                format!("nonce length {} exceeds {}", nonce.len(), policy.max_nonce_len),
            )),
            Some(_) => Ok(()),
        }
    }

    /// Serialize for sending.
    pub fn to_json(&self) -> String {
        let Ok(json) = serde_json::to_string(self) else {
            unreachable!("envelope fields are plain strings and integers");
        };
        json
    }
}

/// Encrypted, signed response for an authenticated request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    /// Always [`Status::Success`].
    pub status: Status,
    /// base64 of `IV || ciphertext`.
    pub encrypted: String,
    /// Server window at response time.
    pub window: Window,
    /// HMAC-SHA256 over `encrypted`, lowercase hex.
    pub hmac: String,
}

impl ResponseEnvelope {
    /// Parse a response body.
    pub fn from_json(body: &[u8]) -> Result<Self, AuthError> {
        serde_json::from_slice(body).map_err(|e| AuthError::malformed(e.to_string()))
    }

    /// Serialize for sending.
    pub fn to_json(&self) -> String {
        let Ok(json) = serde_json::to_string(self) else {
            unreachable!("envelope fields are plain strings and integers");
        };
        json
    }
}

/// Body returned for every rejected request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Always [`Status::Error`].
    pub status: Status,
    /// Generic, client-safe description.
    pub message: String,
    /// Stable machine-readable code.
    pub code: String,
}

impl ErrorBody {
    /// Build an error body.
    pub fn new(code: &str, message: &str) -> Self {
        Self { status: Status::Error, message: message.to_string(), code: code.to_string() }
    }

    /// Serialize for sending.
    pub fn to_json(&self) -> String {
        let Ok(json) = serde_json::to_string(self) else {
            unreachable!("error body fields are plain strings");
        };
        json
    }
}

//! Credential issuance and session-salt rotation.
//!
//! Run at login: a fresh master seed and session salt replace whatever the
//! user had before, so every key derivable from earlier credentials stops
//! verifying immediately. The seed is returned once, for delivery to the
//! client, and only stored in vault-encrypted form.

use std::sync::Arc;

use tidelock_crypto::{
    MASTER_SEED_RANDOM_LEN, MasterSeed, SESSION_SALT_RANDOM_LEN, SeedVault, new_session_salt,
};
use tracing::info;

use crate::{
    env::Environment,
    storage::{Storage, StorageError},
    types::{UserId, UserSecretRecord},
};

/// Credentials handed to a client at login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedCredentials {
    /// Owner.
    pub user_id: UserId,
    /// Clear master seed. Sent to the client once, never logged.
    pub master_seed: MasterSeed,
    /// Session salt (hex text).
    pub session_salt: String,
    /// Issuance time.
    pub issued_at_ms: u64,
}

/// Issues and rotates user credentials.
pub struct CredentialIssuer<E: Environment> {
    env: E,
    vault: Arc<SeedVault>,
}

impl<E: Environment> CredentialIssuer<E> {
    /// Issuer sealing seeds with `vault`.
    pub fn new(env: E, vault: Arc<SeedVault>) -> Self {
        Self { env, vault }
    }

    /// Generate a new seed and salt for `user_id` and persist them.
    ///
    /// Overwrites any existing record. Nonces and rate-limit history are
    /// untouched.
    pub fn rotate<S: Storage>(
        &self,
        storage: &S,
        user_id: UserId,
    ) -> Result<IssuedCredentials, StorageError> {
        let seed_random: [u8; MASTER_SEED_RANDOM_LEN] = self.env.random_array();
        let salt_random: [u8; SESSION_SALT_RANDOM_LEN] = self.env.random_array();

        let master_seed = MasterSeed::from_random(&seed_random);
        let session_salt = new_session_salt(&salt_random);
        let issued_at_ms = self.env.wall_clock_millis();

        let record = UserSecretRecord {
            user_id,
            encrypted_master_seed: self.vault.encrypt(&master_seed, user_id.0),
            session_salt: session_salt.clone(),
            salt_updated_at_ms: issued_at_ms,
        };
        storage.store_user_secret(&record)?;

        info!(%user_id, "issued credentials");

        Ok(IssuedCredentials { user_id, master_seed, session_salt, issued_at_ms })
    }
}

#[cfg(test)]
mod tests {
    use tidelock_crypto::VaultKey;

    use super::*;
    use crate::{env::ManualEnv, storage::MemoryStorage};

    fn issuer(seed: u64) -> CredentialIssuer<ManualEnv> {
        let vault = Arc::new(SeedVault::new(VaultKey::from_bytes([1; 32])));
        CredentialIssuer::new(ManualEnv::new(1_000, seed), vault)
    }

    #[test]
    fn rotate_persists_encrypted_seed() {
        let storage = MemoryStorage::new();
        let issuer = issuer(1);

        let issued = issuer.rotate(&storage, UserId(5)).unwrap();
        let record = storage.load_user_secret(UserId(5)).unwrap().unwrap();

        assert_eq!(record.session_salt, issued.session_salt);
        assert_eq!(record.salt_updated_at_ms, 1_000);
        assert!(!record.encrypted_master_seed.contains(issued.master_seed.expose_hex()));
        assert_eq!(
            issuer.vault.decrypt(&record.encrypted_master_seed, 5).unwrap(),
            issued.master_seed
        );
    }

    #[test]
    fn generated_material_has_expected_shape() {
        let issued = issuer(2).rotate(&MemoryStorage::new(), UserId(1)).unwrap();
        assert_eq!(issued.master_seed.expose_hex().len(), 128);
        assert_eq!(issued.session_salt.len(), 64);
    }

    #[test]
    fn rotation_replaces_previous_credentials() {
        let storage = MemoryStorage::new();
        let issuer = issuer(3);

        let first = issuer.rotate(&storage, UserId(1)).unwrap();
        let second = issuer.rotate(&storage, UserId(1)).unwrap();

        assert_ne!(first.master_seed, second.master_seed);
        assert_ne!(first.session_salt, second.session_salt);
        assert_eq!(
            storage.load_user_secret(UserId(1)).unwrap().unwrap().session_salt,
            second.session_salt
        );
    }
}

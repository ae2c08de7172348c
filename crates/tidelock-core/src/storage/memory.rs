use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex, MutexGuard},
};

use super::{Storage, StorageError};
use crate::types::{NonceRecord, UserId, UserSecretRecord};

/// In-memory storage implementation for testing and single-process use
///
/// All state is wrapped in Arc<Mutex<>> so clones share it and every trait
/// method is one critical section, which is what makes `insert_nonce`
/// atomic. A poisoned lock surfaces as `StorageError::Io`.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    inner: Arc<Mutex<MemoryStorageInner>>,
}

#[derive(Default)]
struct MemoryStorageInner {
    secrets: HashMap<UserId, UserSecretRecord>,

    /// `(user_id, nonce)` -> `created_at_ms`
    nonces: HashMap<(UserId, String), u64>,

    /// Hit timestamps per user, in recording order
    hits: HashMap<UserId, VecDeque<u64>>,
}

impl MemoryStorage {
    /// Create a new empty `MemoryStorage`
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of recorded nonces across all users.
    pub fn nonce_count(&self) -> Result<usize, StorageError> {
        Ok(self.lock()?.nonces.len())
    }

    /// Total number of recorded hits across all users.
    pub fn hit_count(&self) -> Result<usize, StorageError> {
        Ok(self.lock()?.hits.values().map(VecDeque::len).sum())
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryStorageInner>, StorageError> {
        self.inner.lock().map_err(|_| StorageError::Io("memory storage lock poisoned".into()))
    }
}

impl Storage for MemoryStorage {
    fn load_user_secret(
        &self,
        user_id: UserId,
    ) -> Result<Option<UserSecretRecord>, StorageError> {
        Ok(self.lock()?.secrets.get(&user_id).cloned())
    }

    fn store_user_secret(&self, record: &UserSecretRecord) -> Result<(), StorageError> {
        self.lock()?.secrets.insert(record.user_id, record.clone());
        Ok(())
    }

    fn insert_nonce(&self, record: &NonceRecord) -> Result<(), StorageError> {
        let mut inner = self.lock()?;

        let key = (record.user_id, record.nonce.clone());
        if inner.nonces.contains_key(&key) {
            return Err(StorageError::Duplicate);
        }
        inner.nonces.insert(key, record.created_at_ms);

        Ok(())
    }

    fn remove_nonce(&self, user_id: UserId, nonce: &str) -> Result<(), StorageError> {
        self.lock()?.nonces.remove(&(user_id, nonce.to_string()));
        Ok(())
    }

    fn contains_nonce(&self, user_id: UserId, nonce: &str) -> Result<bool, StorageError> {
        Ok(self.lock()?.nonces.contains_key(&(user_id, nonce.to_string())))
    }

    fn prune_nonces(&self, cutoff_ms: u64) -> Result<usize, StorageError> {
        let mut inner = self.lock()?;

        let before = inner.nonces.len();
        inner.nonces.retain(|_, created_at_ms| *created_at_ms >= cutoff_ms);

        Ok(before - inner.nonces.len())
    }

    fn record_hit(&self, user_id: UserId, at_ms: u64) -> Result<(), StorageError> {
        self.lock()?.hits.entry(user_id).or_default().push_back(at_ms);
        Ok(())
    }

    fn count_hits_after(&self, user_id: UserId, after_ms: u64) -> Result<u64, StorageError> {
        let inner = self.lock()?;

        let count = inner
            .hits
            .get(&user_id)
            .map_or(0, |hits| hits.iter().filter(|&&at_ms| at_ms > after_ms).count());

        Ok(count as u64)
    }

    fn prune_hits(&self, cutoff_ms: u64) -> Result<usize, StorageError> {
        let mut inner = self.lock()?;

        let mut removed = 0;
        for hits in inner.hits.values_mut() {
            let before = hits.len();
            hits.retain(|&at_ms| at_ms >= cutoff_ms);
            removed += before - hits.len();
        }
        inner.hits.retain(|_, hits| !hits.is_empty());

        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nonce(user: u64, nonce: &str, at: u64) -> NonceRecord {
        NonceRecord { user_id: UserId(user), nonce: nonce.to_string(), created_at_ms: at }
    }

    #[test]
    fn secrets_roundtrip_and_overwrite() {
        let storage = MemoryStorage::new();
        assert_eq!(storage.load_user_secret(UserId(1)).unwrap(), None);

        let mut record = UserSecretRecord {
            user_id: UserId(1),
            encrypted_master_seed: "seed".into(),
            session_salt: "aa".into(),
            salt_updated_at_ms: 10,
        };
        storage.store_user_secret(&record).unwrap();
        assert_eq!(storage.load_user_secret(UserId(1)).unwrap(), Some(record.clone()));

        record.session_salt = "bb".into();
        storage.store_user_secret(&record).unwrap();
        assert_eq!(storage.load_user_secret(UserId(1)).unwrap().unwrap().session_salt, "bb");
    }

    #[test]
    fn nonce_insert_is_insert_or_fail() {
        let storage = MemoryStorage::new();
        storage.insert_nonce(&nonce(1, "n", 100)).unwrap();

        assert_eq!(storage.insert_nonce(&nonce(1, "n", 200)), Err(StorageError::Duplicate));
        // Same nonce, different user is independent
        storage.insert_nonce(&nonce(2, "n", 100)).unwrap();

        // The losing insert must not refresh the timestamp
        assert_eq!(storage.prune_nonces(150).unwrap(), 2);
        assert!(!storage.contains_nonce(UserId(1), "n").unwrap());
    }

    #[test]
    fn remove_nonce_is_idempotent() {
        let storage = MemoryStorage::new();
        storage.insert_nonce(&nonce(1, "n", 0)).unwrap();
        storage.remove_nonce(UserId(1), "n").unwrap();
        storage.remove_nonce(UserId(1), "n").unwrap();
        assert!(!storage.contains_nonce(UserId(1), "n").unwrap());
    }

    #[test]
    fn hits_count_strictly_after() {
        let storage = MemoryStorage::new();
        for at in [100, 200, 200, 300] {
            storage.record_hit(UserId(1), at).unwrap();
        }
        storage.record_hit(UserId(2), 250).unwrap();

        assert_eq!(storage.count_hits_after(UserId(1), 99).unwrap(), 4);
        assert_eq!(storage.count_hits_after(UserId(1), 100).unwrap(), 3);
        assert_eq!(storage.count_hits_after(UserId(1), 200).unwrap(), 1);
        assert_eq!(storage.count_hits_after(UserId(3), 0).unwrap(), 0);
    }

    #[test]
    fn prune_hits_keeps_cutoff_and_later() {
        let storage = MemoryStorage::new();
        for at in [100, 200, 300] {
            storage.record_hit(UserId(1), at).unwrap();
        }
        storage.record_hit(UserId(2), 50).unwrap();

        assert_eq!(storage.prune_hits(200).unwrap(), 2);
        assert_eq!(storage.hit_count().unwrap(), 2);
        assert_eq!(storage.count_hits_after(UserId(1), 0).unwrap(), 2);
    }
}

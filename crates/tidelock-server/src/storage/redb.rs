//! Redb-backed durable storage implementation.
//!
//! Uses Redb's ACID transactions with Copy-on-Write for crash safety.
//! Secrets, consumed nonces and rate-limit hits all survive restarts, so a
//! restart can neither reopen a replay window nor reset a user's budget.

use std::{path::Path, sync::Arc};

use redb::{Database, ReadableTable, TableDefinition};
use tidelock_core::{NonceRecord, Storage, StorageError, UserId, UserSecretRecord};

/// Table: user_secrets
/// Key: user_id as big-endian bytes [8 bytes]
/// Value: CBOR-encoded UserSecretRecord
const USER_SECRETS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("user_secrets");

/// Table: nonces
/// Key: user_id (8 bytes BE) + nonce bytes
/// Value: created_at_ms
const NONCES: TableDefinition<&[u8], u64> = TableDefinition::new("nonces");

/// Table: rate_hits
/// Key: (user_id: u64, at_ms: u64) as big-endian bytes [16 bytes]
/// Value: number of hits recorded at that millisecond
const RATE_HITS: TableDefinition<&[u8], u64> = TableDefinition::new("rate_hits");

/// Most keys a single prune write transaction removes.
pub const PRUNE_BATCH: usize = 256;

/// Durable storage backed by Redb.
///
/// Thread-safe through Redb's internal locking. Write transactions are
/// serialized, which is what makes `insert_nonce` atomic across threads.
/// Clone is cheap (Arc).
#[derive(Clone)]
pub struct RedbStorage {
    db: Arc<Database>,
}

impl RedbStorage {
    /// Open or create a Redb database at the given path.
    ///
    /// Creates tables if they don't exist (USER_SECRETS, NONCES, RATE_HITS).
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Io` if the database cannot be opened or created.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let db = Database::create(path.as_ref()).map_err(|e| StorageError::Io(e.to_string()))?;

        let txn = db.begin_write().map_err(|e| StorageError::Io(e.to_string()))?;
        {
            let _ = txn.open_table(USER_SECRETS).map_err(|e| StorageError::Io(e.to_string()))?;
            let _ = txn.open_table(NONCES).map_err(|e| StorageError::Io(e.to_string()))?;
            let _ = txn.open_table(RATE_HITS).map_err(|e| StorageError::Io(e.to_string()))?;
        }
        txn.commit().map_err(|e| StorageError::Io(e.to_string()))?;

        Ok(Self { db: Arc::new(db) })
    }

    /// Remove every entry `expired` selects, returning the summed `weight`
    /// of the removed values.
    ///
    /// Candidates are collected under a read transaction, which does not
    /// block writers. Removal then runs in write transactions of at most
    /// `PRUNE_BATCH` keys, so `insert_nonce` waits for one batch at most
    /// rather than for the whole prune. Each batch re-reads its keys and
    /// skips entries that were removed or rewritten since the scan.
    fn prune_batched(
        &self,
        definition: TableDefinition<'static, &'static [u8], u64>,
        expired: impl Fn(&[u8], u64) -> Result<bool, StorageError>,
        weight: impl Fn(u64) -> u64,
    ) -> Result<usize, StorageError> {
        let candidates = {
            let txn = self.db.begin_read().map_err(|e| StorageError::Io(e.to_string()))?;
            let table = txn.open_table(definition).map_err(|e| StorageError::Io(e.to_string()))?;

            let mut keys = Vec::new();
            for entry in table.iter().map_err(|e| StorageError::Io(e.to_string()))? {
                let (key, value) = entry.map_err(|e| StorageError::Io(e.to_string()))?;
                if expired(key.value(), value.value())? {
                    keys.push(key.value().to_vec());
                }
            }
            keys
        };

        let mut removed: u64 = 0;
        for batch in candidates.chunks(PRUNE_BATCH) {
            let txn = self.db.begin_write().map_err(|e| StorageError::Io(e.to_string()))?;
            {
                let mut table =
                    txn.open_table(definition).map_err(|e| StorageError::Io(e.to_string()))?;

                for key in batch {
                    let current = table
                        .get(key.as_slice())
                        .map_err(|e| StorageError::Io(e.to_string()))?
                        .map(|value| value.value());

                    let Some(value) = current else {
                        continue;
                    };
                    if !expired(key, value)? {
                        continue;
                    }

                    table.remove(key.as_slice()).map_err(|e| StorageError::Io(e.to_string()))?;
                    removed = removed.saturating_add(weight(value));
                }
            }
            txn.commit().map_err(|e| StorageError::Io(e.to_string()))?;
        }

        Ok(usize::try_from(removed).unwrap_or(usize::MAX))
    }
}

impl Storage for RedbStorage {
    fn load_user_secret(
        &self,
        user_id: UserId,
    ) -> Result<Option<UserSecretRecord>, StorageError> {
        let txn = self.db.begin_read().map_err(|e| StorageError::Io(e.to_string()))?;
        let table = txn.open_table(USER_SECRETS).map_err(|e| StorageError::Io(e.to_string()))?;

        let key = encode_user_key(user_id);
        let Some(value) = table.get(key.as_slice()).map_err(|e| StorageError::Io(e.to_string()))?
        else {
            return Ok(None);
        };

        let record: UserSecretRecord = ciborium::from_reader(value.value())
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        Ok(Some(record))
    }

    fn store_user_secret(&self, record: &UserSecretRecord) -> Result<(), StorageError> {
        let mut bytes = Vec::new();
        ciborium::into_writer(record, &mut bytes)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        let txn = self.db.begin_write().map_err(|e| StorageError::Io(e.to_string()))?;
        {
            let mut table =
                txn.open_table(USER_SECRETS).map_err(|e| StorageError::Io(e.to_string()))?;

            let key = encode_user_key(record.user_id);
            table
                .insert(key.as_slice(), bytes.as_slice())
                .map_err(|e| StorageError::Io(e.to_string()))?;
        }
        txn.commit().map_err(|e| StorageError::Io(e.to_string()))?;

        Ok(())
    }

    fn insert_nonce(&self, record: &NonceRecord) -> Result<(), StorageError> {
        let key = encode_nonce_key(record.user_id, &record.nonce);

        let txn = self.db.begin_write().map_err(|e| StorageError::Io(e.to_string()))?;
        {
            let mut table = txn.open_table(NONCES).map_err(|e| StorageError::Io(e.to_string()))?;

            let exists = table
                .get(key.as_slice())
                .map_err(|e| StorageError::Io(e.to_string()))?
                .is_some();

            // Dropping the uncommitted transaction aborts it
            if exists {
                return Err(StorageError::Duplicate);
            }

            table
                .insert(key.as_slice(), record.created_at_ms)
                .map_err(|e| StorageError::Io(e.to_string()))?;
        }
        txn.commit().map_err(|e| StorageError::Io(e.to_string()))?;

        Ok(())
    }

    fn remove_nonce(&self, user_id: UserId, nonce: &str) -> Result<(), StorageError> {
        let key = encode_nonce_key(user_id, nonce);

        let txn = self.db.begin_write().map_err(|e| StorageError::Io(e.to_string()))?;
        {
            let mut table = txn.open_table(NONCES).map_err(|e| StorageError::Io(e.to_string()))?;
            table.remove(key.as_slice()).map_err(|e| StorageError::Io(e.to_string()))?;
        }
        txn.commit().map_err(|e| StorageError::Io(e.to_string()))?;

        Ok(())
    }

    fn contains_nonce(&self, user_id: UserId, nonce: &str) -> Result<bool, StorageError> {
        let txn = self.db.begin_read().map_err(|e| StorageError::Io(e.to_string()))?;
        let table = txn.open_table(NONCES).map_err(|e| StorageError::Io(e.to_string()))?;

        let key = encode_nonce_key(user_id, nonce);
        let found =
            table.get(key.as_slice()).map_err(|e| StorageError::Io(e.to_string()))?.is_some();

        Ok(found)
    }

    fn prune_nonces(&self, cutoff_ms: u64) -> Result<usize, StorageError> {
        self.prune_batched(NONCES, |_, created_at_ms| Ok(created_at_ms < cutoff_ms), |_| 1)
    }

    fn record_hit(&self, user_id: UserId, at_ms: u64) -> Result<(), StorageError> {
        let key = encode_hit_key(user_id, at_ms);

        let txn = self.db.begin_write().map_err(|e| StorageError::Io(e.to_string()))?;
        {
            let mut table =
                txn.open_table(RATE_HITS).map_err(|e| StorageError::Io(e.to_string()))?;

            let current = table
                .get(key.as_slice())
                .map_err(|e| StorageError::Io(e.to_string()))?
                .map_or(0, |count| count.value());

            table
                .insert(key.as_slice(), current + 1)
                .map_err(|e| StorageError::Io(e.to_string()))?;
        }
        txn.commit().map_err(|e| StorageError::Io(e.to_string()))?;

        Ok(())
    }

    fn count_hits_after(&self, user_id: UserId, after_ms: u64) -> Result<u64, StorageError> {
        let Some(from_ms) = after_ms.checked_add(1) else {
            return Ok(0);
        };

        let txn = self.db.begin_read().map_err(|e| StorageError::Io(e.to_string()))?;
        let table = txn.open_table(RATE_HITS).map_err(|e| StorageError::Io(e.to_string()))?;

        let start_key = encode_hit_key(user_id, from_ms);
        let end_key = encode_hit_key(user_id, u64::MAX);

        let mut total = 0;
        for entry in table
            .range(start_key.as_slice()..=end_key.as_slice())
            .map_err(|e| StorageError::Io(e.to_string()))?
        {
            let (_, count) = entry.map_err(|e| StorageError::Io(e.to_string()))?;
            total += count.value();
        }

        Ok(total)
    }

    fn prune_hits(&self, cutoff_ms: u64) -> Result<usize, StorageError> {
        self.prune_batched(
            RATE_HITS,
            |key, _| Ok(decode_hit_key(key)?.1 < cutoff_ms),
            |count| count,
        )
    }
}

fn encode_user_key(user_id: UserId) -> [u8; 8] {
    user_id.0.to_be_bytes()
}

fn encode_nonce_key(user_id: UserId, nonce: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(8 + nonce.len());
    key.extend_from_slice(&user_id.0.to_be_bytes());
    key.extend_from_slice(nonce.as_bytes());
    key
}

fn encode_hit_key(user_id: UserId, at_ms: u64) -> [u8; 16] {
    let mut key = [0u8; 16];
    key[0..8].copy_from_slice(&user_id.0.to_be_bytes());
    key[8..16].copy_from_slice(&at_ms.to_be_bytes());
    key
}

fn decode_hit_key(key: &[u8]) -> Result<(UserId, u64), StorageError> {
    let (Some(user), Some(at)) = (key.get(0..8), key.get(8..16)) else {
        return Err(StorageError::Serialization(format!("hit key of {} bytes", key.len())));
    };

    let mut user_bytes = [0u8; 8];
    let mut at_bytes = [0u8; 8];
    user_bytes.copy_from_slice(user);
    at_bytes.copy_from_slice(at);

    Ok((UserId(u64::from_be_bytes(user_bytes)), u64::from_be_bytes(at_bytes)))
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn hit_keys_sort_by_user_then_time() {
        let a = encode_hit_key(UserId(1), u64::MAX);
        let b = encode_hit_key(UserId(2), 0);
        assert!(a < b);
        assert!(encode_hit_key(UserId(1), 5) < encode_hit_key(UserId(1), 6));
    }

    #[test]
    fn hit_key_roundtrip() {
        let key = encode_hit_key(UserId(7), 1_710_000_000_000);
        assert_eq!(decode_hit_key(&key).unwrap(), (UserId(7), 1_710_000_000_000));
        assert!(decode_hit_key(&key[..9]).is_err());
    }

    #[test]
    fn nonce_keys_do_not_collide_across_users() {
        assert_ne!(encode_nonce_key(UserId(1), "n"), encode_nonce_key(UserId(2), "n"));
    }

    #[test]
    fn same_millisecond_hits_accumulate() {
        let dir = tempdir().unwrap();
        let storage = RedbStorage::open(dir.path().join("hits.redb")).unwrap();

        storage.record_hit(UserId(1), 100).unwrap();
        storage.record_hit(UserId(1), 100).unwrap();
        storage.record_hit(UserId(1), 101).unwrap();

        assert_eq!(storage.count_hits_after(UserId(1), 99).unwrap(), 3);
        assert_eq!(storage.count_hits_after(UserId(1), 100).unwrap(), 1);
        assert_eq!(storage.count_hits_after(UserId(1), u64::MAX).unwrap(), 0);
        assert_eq!(storage.prune_hits(101).unwrap(), 2);
    }
}

//! Storage backends for the server.
//!
//! The [`Storage`] trait and the in-memory and fault-injecting backends live
//! in `tidelock-core`; this module adds the durable redb backend.

mod redb;

pub use tidelock_core::storage::{ChaoticStorage, MemoryStorage, Storage, StorageError};

pub use self::redb::{PRUNE_BATCH, RedbStorage};

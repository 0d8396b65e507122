//! Durable key-value string storage.
//!
//! The account registry only needs `read_string` / `write_string`. Two
//! implementations ship with the crate:
//! - [`Storage`]: redb-backed, ACID, survives restarts
//! - [`MemoryStore`]: in-process map, with a switch to simulate write failures

use crate::error::{CacheError, CacheResult};
use parking_lot::RwLock;
use redb::{Database, ReadableTable, TableDefinition};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Table holding every key-value pair (key: name, value: string blob)
const KV_TABLE: TableDefinition<&str, &str> = TableDefinition::new("kv");

/// Durable string storage used by the account registry
pub trait KeyValueStore: Send + Sync {
    /// Read the value stored under `key`, if any
    fn read_string(&self, key: &str) -> CacheResult<Option<String>>;

    /// Store `value` under `key`, replacing any previous value
    ///
    /// Must not return before the value is durable.
    fn write_string(&self, key: &str, value: &str) -> CacheResult<()>;
}

/// Storage layer using redb for ACID-compliant persistence
#[derive(Clone)]
pub struct Storage {
    db: Arc<RwLock<Database>>,
}

impl Storage {
    /// Create a new storage instance at the given path.
    ///
    /// This will:
    /// - Create the database directory if it doesn't exist
    /// - Initialize the database file
    /// - Create the key-value table
    pub fn new(path: impl AsRef<Path>) -> CacheResult<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = Database::create(path)?;

        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(KV_TABLE)?;
        }
        write_txn.commit()?;

        debug!(?path, "Opened storage");
        Ok(Self {
            db: Arc::new(RwLock::new(db)),
        })
    }

    /// Remove the value stored under `key`
    ///
    /// Returns `Ok(())` even if the key doesn't exist.
    pub fn delete(&self, key: &str) -> CacheResult<()> {
        let db = self.db.read();
        let write_txn = db.begin_write()?;
        {
            let mut table = write_txn.open_table(KV_TABLE)?;
            table.remove(key)?;
        }
        write_txn.commit()?;
        Ok(())
    }
}

impl KeyValueStore for Storage {
    fn read_string(&self, key: &str) -> CacheResult<Option<String>> {
        let db = self.db.read();
        let read_txn = db.begin_read()?;
        let table = read_txn.open_table(KV_TABLE)?;

        Ok(table.get(key)?.map(|v| v.value().to_string()))
    }

    fn write_string(&self, key: &str, value: &str) -> CacheResult<()> {
        let db = self.db.read();
        let write_txn = db.begin_write()?;
        {
            let mut table = write_txn.open_table(KV_TABLE)?;
            table.insert(key, value)?;
        }
        write_txn.commit()?;
        Ok(())
    }
}

/// Ephemeral in-memory key-value store for tests and embedding
///
/// Nothing survives the process. `set_fail_writes(true)` makes every
/// subsequent write fail with [`CacheError::Storage`].
#[derive(Default)]
pub struct MemoryStore {
    values: RwLock<HashMap<String, String>>,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent writes fail (or succeed again)
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

impl KeyValueStore for MemoryStore {
    fn read_string(&self, key: &str) -> CacheResult<Option<String>> {
        Ok(self.values.read().get(key).cloned())
    }

    fn write_string(&self, key: &str, value: &str) -> CacheResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(CacheError::Storage(format!("write to '{}' rejected", key)));
        }
        self.values
            .write()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

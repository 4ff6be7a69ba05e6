//! redb-based partition store
//!
//! One embedded database holding named partitions ("collections"), each a
//! key → blob map. No business logic lives here: callers serialize their
//! own values and [`schema::SchemaManager`] owns which partitions exist.
//!
//! # Durability
//!
//! redb commits with `Durability::Immediate` by default: copy-on-write with
//! an atomic pointer swap, so a failed write never leaves a partial blob
//! visible to subsequent reads. Every operation below runs in its own
//! scoped transaction.
//!
//! Note: redb operations are synchronous for stability.

pub mod schema;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition, TableError, TableHandle};
use thiserror::Error;

/// 存储错误
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] redb::DatabaseError),

    #[error("Transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    #[error("Table error: {0}")]
    Table(#[from] redb::TableError),

    #[error("Storage error: {0}")]
    Storage(#[from] redb::StorageError),

    #[error("Commit error: {0}")]
    Commit(#[from] redb::CommitError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Partition missing: {0}")]
    PartitionMissing(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Table definition for a partition, resolved by runtime name
fn partition_def(name: &str) -> TableDefinition<'_, &'static str, &'static [u8]> {
    TableDefinition::new(name)
}

/// Partition store backed by redb
#[derive(Clone)]
pub struct Store {
    db: Arc<Database>,
    path: Option<PathBuf>,
}

impl Store {
    /// Open or create the database at the given path
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        let db = Database::create(path)?;
        Ok(Self {
            db: Arc::new(db),
            path: Some(path.to_path_buf()),
        })
    }

    /// Open an in-memory database (for testing)
    #[cfg(test)]
    pub fn open_in_memory() -> StoreResult<Self> {
        let db = Database::builder().create_with_backend(redb::backends::InMemoryBackend::new())?;
        Ok(Self {
            db: Arc::new(db),
            path: None,
        })
    }

    /// Path of the backing file, if any
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub(crate) fn database(&self) -> &Database {
        &self.db
    }

    // ========== Blob Operations ==========

    /// Get a blob by key. `Ok(None)` when the key is absent.
    pub fn get(&self, partition: &str, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let read_txn = self.db.begin_read()?;
        let table = match read_txn.open_table(partition_def(partition)) {
            Ok(table) => table,
            Err(TableError::TableDoesNotExist(_)) => {
                return Err(StoreError::PartitionMissing(partition.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        Ok(table.get(key)?.map(|guard| guard.value().to_vec()))
    }

    /// Store a blob under a key, replacing any previous value atomically
    pub fn put(&self, partition: &str, key: &str, blob: &[u8]) -> StoreResult<()> {
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(partition_def(partition))?;
            table.insert(key, blob)?;
        }
        txn.commit()?;
        Ok(())
    }

    /// Get all blobs in a partition, in key order
    pub fn get_all(&self, partition: &str) -> StoreResult<Vec<Vec<u8>>> {
        let read_txn = self.db.begin_read()?;
        let table = match read_txn.open_table(partition_def(partition)) {
            Ok(table) => table,
            Err(TableError::TableDoesNotExist(_)) => {
                return Err(StoreError::PartitionMissing(partition.to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        let mut blobs = Vec::new();
        for result in table.iter()? {
            let (_key, value) = result?;
            blobs.push(value.value().to_vec());
        }
        Ok(blobs)
    }

    /// Delete one key, or clear the whole partition when `key` is `None`
    pub fn delete(&self, partition: &str, key: Option<&str>) -> StoreResult<()> {
        let txn = self.db.begin_write()?;
        match key {
            Some(key) => {
                let mut table = txn.open_table(partition_def(partition))?;
                table.remove(key)?;
                drop(table);
            }
            None => {
                // Drop and recreate in one transaction: an atomic clear
                txn.delete_table(partition_def(partition))?;
                let _ = txn.open_table(partition_def(partition))?;
            }
        }
        txn.commit()?;
        Ok(())
    }

    // ========== Partition Management ==========

    /// Check whether a partition exists
    pub fn has_partition(&self, name: &str) -> StoreResult<bool> {
        Ok(self.partitions()?.iter().any(|p| p == name))
    }

    /// List all partitions
    pub fn partitions(&self) -> StoreResult<Vec<String>> {
        let read_txn = self.db.begin_read()?;
        let names = read_txn
            .list_tables()?
            .map(|handle| handle.name().to_string())
            .collect();
        Ok(names)
    }

    /// Create a partition if it does not exist yet
    pub fn create_partition(&self, name: &str) -> StoreResult<()> {
        let txn = self.db.begin_write()?;
        {
            let _ = txn.open_table(partition_def(name))?;
        }
        txn.commit()?;
        Ok(())
    }
}

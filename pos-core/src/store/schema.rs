//! Schema management for the partition store
//!
//! Owns the partition catalog and a monotonic schema version. Upgrades are
//! additive and driven by an explicit migration table: each migration names
//! the version it establishes and the partitions it adds; no migration ever
//! drops a partition.
//!
//! # Destructive reset
//!
//! If a required partition is still missing after the upgrade path ran
//! (structural drift, e.g. an interrupted prior upgrade), the store file is
//! deleted and recreated. This is the only path that loses data: it is
//! logged as a distinct `store reset` event and surfaced as
//! [`SchemaError::NeedsReload`] so the caller retries initialization once.
//!
//! Opens of the same store path serialize on a process-wide single-flight
//! lock, so concurrent destructive resets cannot interleave.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};

use dashmap::DashMap;
use thiserror::Error;

use super::{Store, StoreError};

// ========== Partition Catalog ==========

/// Utility partition: cache + schema metadata
pub const PARTITION_METADATA: &str = "metadata";
/// Utility partition: verbatim remote payloads, for operator inspection
pub const PARTITION_RAW_DATA: &str = "raw_data";
/// Queue partition: locally captured orders awaiting reconciliation
pub const PARTITION_OFFLINE_ORDERS: &str = "offline_orders";

/// Reference-data models; each has a partition of the same name
pub const REFERENCE_MODELS: &[&str] = &[
    "products",
    "categories",
    "partners",
    "taxes",
    "payment_methods",
    "sessions",
    "users",
    "config",
];

const SCHEMA_VERSION_KEY: &str = "schema_version";

/// One additive schema migration: the version it establishes and the
/// partitions it creates
struct Migration {
    version: u64,
    adds: &'static [&'static str],
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        adds: &[
            PARTITION_METADATA,
            PARTITION_RAW_DATA,
            "products",
            "categories",
            "partners",
            "taxes",
        ],
    },
    Migration {
        version: 2,
        adds: &["payment_methods", "sessions", "users", "config"],
    },
    Migration {
        version: 3,
        adds: &[PARTITION_OFFLINE_ORDERS],
    },
];

/// Latest schema version known to this build
pub const CURRENT_SCHEMA_VERSION: u64 = 3;

/// The set of partitions that must exist before any read or write
#[derive(Debug, Clone)]
pub struct PartitionCatalog {
    required: Vec<&'static str>,
}

impl PartitionCatalog {
    /// Catalog as of a given schema version: the union of everything the
    /// migrations up to that version add
    pub fn at_version(version: u64) -> Self {
        let required = MIGRATIONS
            .iter()
            .filter(|m| m.version <= version)
            .flat_map(|m| m.adds.iter().copied())
            .collect();
        Self { required }
    }

    /// Catalog at [`CURRENT_SCHEMA_VERSION`]
    pub fn current() -> Self {
        Self::at_version(CURRENT_SCHEMA_VERSION)
    }

    /// Required partition names
    pub fn required(&self) -> &[&'static str] {
        &self.required
    }

    pub fn contains(&self, name: &str) -> bool {
        self.required.iter().any(|p| *p == name)
    }
}

// ========== Errors ==========

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("io error during store reset: {0}")]
    Io(#[from] std::io::Error),

    #[error("store was reset after structural drift, retry initialization")]
    NeedsReload,
}

// ========== Single-flight open lock ==========

static OPEN_LOCKS: OnceLock<DashMap<PathBuf, Arc<Mutex<()>>>> = OnceLock::new();

fn open_lock(path: &Path) -> Arc<Mutex<()>> {
    let locks = OPEN_LOCKS.get_or_init(DashMap::new);
    locks
        .entry(path.to_path_buf())
        .or_insert_with(|| Arc::new(Mutex::new(())))
        .clone()
}

// ========== SchemaManager ==========

/// Opens the store at a target schema version, upgrading additively and
/// resetting destructively on structural drift
pub struct SchemaManager;

impl SchemaManager {
    /// Open the store at [`CURRENT_SCHEMA_VERSION`] with the current catalog
    pub fn ensure_current(path: impl AsRef<Path>) -> Result<Store, SchemaError> {
        Self::ensure(path, &PartitionCatalog::current(), CURRENT_SCHEMA_VERSION)
    }

    /// Open the store at `target_version`.
    ///
    /// If the on-disk version is lower, applies the missing migrations
    /// (create-only). If a required catalog partition is still absent
    /// afterwards, deletes the store file and returns
    /// [`SchemaError::NeedsReload`].
    pub fn ensure(
        path: impl AsRef<Path>,
        catalog: &PartitionCatalog,
        target_version: u64,
    ) -> Result<Store, SchemaError> {
        let path = path.as_ref();
        let lock = open_lock(path);
        let _guard = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        let store = Store::open(path)?;
        let stored_version = read_version(&store)?;

        if stored_version < target_version {
            apply_migrations(&store, stored_version, target_version)?;
            tracing::info!(
                path = %path.display(),
                from = stored_version,
                to = target_version,
                "schema upgraded"
            );
        }

        let missing = missing_partitions(&store, catalog)?;
        if missing.is_empty() {
            return Ok(store);
        }

        tracing::error!(
            path = %path.display(),
            ?missing,
            "store reset: required partitions missing after upgrade, deleting store"
        );
        drop(store);
        std::fs::remove_file(path)?;
        Err(SchemaError::NeedsReload)
    }

    /// In-memory store migrated to the current version (for testing)
    #[cfg(test)]
    pub fn ensure_in_memory() -> Result<Store, SchemaError> {
        let store = Store::open_in_memory()?;
        apply_migrations(&store, 0, CURRENT_SCHEMA_VERSION)?;
        Ok(store)
    }

    /// Read the schema version currently stored, 0 when never initialized
    pub fn stored_version(store: &Store) -> Result<u64, SchemaError> {
        read_version(store)
    }
}

fn read_version(store: &Store) -> Result<u64, SchemaError> {
    match store.get(PARTITION_METADATA, SCHEMA_VERSION_KEY) {
        Ok(Some(blob)) => Ok(serde_json::from_slice(&blob).map_err(StoreError::from)?),
        Ok(None) => Ok(0),
        Err(StoreError::PartitionMissing(_)) => Ok(0),
        Err(e) => Err(e.into()),
    }
}

/// Apply all migrations in `(from, to]` and record the new version, in one
/// transaction
fn apply_migrations(store: &Store, from: u64, to: u64) -> Result<(), SchemaError> {
    let txn = store.database().begin_write().map_err(StoreError::from)?;
    {
        for migration in MIGRATIONS
            .iter()
            .filter(|m| m.version > from && m.version <= to)
        {
            for partition in migration.adds {
                let _ = txn
                    .open_table(super::partition_def(partition))
                    .map_err(StoreError::from)?;
            }
            tracing::info!(
                version = migration.version,
                partitions = ?migration.adds,
                "applied schema migration"
            );
        }

        let mut meta = txn
            .open_table(super::partition_def(PARTITION_METADATA))
            .map_err(StoreError::from)?;
        let blob = serde_json::to_vec(&to).map_err(StoreError::from)?;
        meta.insert(SCHEMA_VERSION_KEY, blob.as_slice())
            .map_err(StoreError::from)?;
    }
    txn.commit().map_err(StoreError::from)?;
    Ok(())
}

fn missing_partitions(store: &Store, catalog: &PartitionCatalog) -> Result<Vec<String>, SchemaError> {
    let existing = store.partitions()?;
    Ok(catalog
        .required()
        .iter()
        .copied()
        .filter(|name| !existing.iter().any(|e| e == name))
        .map(str::to_string)
        .collect())
}

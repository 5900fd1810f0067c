//! Ordered key-value storage
//!
//! The session store is written against the [`KeyValueStore`] capability set
//! only, so any backend that keeps items ordered by sort key within a
//! partition can serve it:
//!
//! - [`SledTable`]: embedded `sled` database (default)
//! - [`SqliteTable`]: a single SQLite table keyed on `(pk, sk)`
//! - [`MemoryTable`]: process memory, for tests and throwaway runs
//!
//! Every operation is atomic for a single item only.

use crate::config::{StorageBackend, StorageConfig};
use crate::error::{Result, SessionError};
use async_trait::async_trait;
use directories::ProjectDirs;
use std::path::PathBuf;
use std::sync::Arc;

pub mod item;
pub mod memory_table;
pub mod sled_table;
pub mod sqlite_table;

pub use item::{
    AttributePatch, AttributeValue, Condition, Filter, Item, ItemKey, SortKeyCondition,
    PARTITION_KEY, SORT_KEY,
};
pub use memory_table::MemoryTable;
pub use sled_table::SledTable;
pub use sqlite_table::SqliteTable;

/// Capability set of an ordered key-value backend
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Writes an item, replacing any item with the same key
    async fn put(&self, item: Item) -> Result<()>;

    /// Items of one partition whose sort key satisfies the condition,
    /// ordered by sort key ascending
    async fn query(&self, partition: &str, condition: &SortKeyCondition) -> Result<Vec<Item>>;

    /// Every item in the table matching the filter
    async fn scan(&self, filter: &Filter) -> Result<Vec<Item>>;

    /// Applies a patch to an existing item and returns the updated item
    ///
    /// Returns `Ok(None)` without writing anything when no item has the key.
    async fn update(&self, key: &ItemKey, patch: &AttributePatch) -> Result<Option<Item>>;

    /// Deletes the items with the given keys and returns how many existed
    async fn batch_delete(&self, keys: &[ItemKey]) -> Result<usize>;

    /// Flushes pending writes; the store should not be used afterwards
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Opens the backend selected by the storage configuration
///
/// # Errors
///
/// Returns `SessionError::StoreUnavailable` if the backend cannot be opened
/// and `SessionError::Config` if no default data directory can be found
pub fn open_store(config: &StorageConfig) -> Result<Arc<dyn KeyValueStore>> {
    let store: Arc<dyn KeyValueStore> = match config.backend {
        StorageBackend::Memory => Arc::new(MemoryTable::new()),
        StorageBackend::Sled => {
            let path = resolve_path(config, "sessions.sled")?;
            Arc::new(SledTable::new(path)?)
        }
        StorageBackend::Sqlite => {
            let path = resolve_path(config, "sessions.db")?;
            Arc::new(SqliteTable::new_with_path(path)?)
        }
    };
    tracing::info!(backend = ?config.backend, "Opened session store");
    Ok(store)
}

fn resolve_path(config: &StorageConfig, file_name: &str) -> Result<PathBuf> {
    if let Some(path) = &config.path {
        return Ok(path.clone());
    }

    let proj_dirs = ProjectDirs::from("com", "sessionkeep", "sessionkeep")
        .ok_or_else(|| SessionError::Config("Could not determine data directory".into()))?;
    let data_dir = proj_dirs.data_dir();
    std::fs::create_dir_all(data_dir).map_err(|e| {
        SessionError::StoreUnavailable(format!("Failed to create data directory: {}", e))
    })?;
    Ok(data_dir.join(file_name))
}

/// Maps a join failure of a blocking storage task to a store error
pub(crate) fn join_error(err: tokio::task::JoinError) -> anyhow::Error {
    SessionError::StoreUnavailable(format!("Storage task failed: {}", err)).into()
}

//! Embedded `sled` backend
//!
//! Items are stored under `pk \0 sk`, so sled's byte ordering keeps every
//! partition contiguous and sorted by sort key. Values are the JSON form of
//! the item. sled calls block, so each operation runs on the blocking pool.

use crate::error::{Result, SessionError};
use crate::storage::item::{AttributePatch, Filter, Item, ItemKey, SortKeyCondition};
use crate::storage::{join_error, KeyValueStore};
use async_trait::async_trait;
use sled::Db;
use std::path::Path;

const KEY_SEPARATOR: u8 = 0;

/// Table persisted in an embedded `sled` database
pub struct SledTable {
    db: Db,
}

impl SledTable {
    /// Open or create a table
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the database directory
    ///
    /// # Errors
    ///
    /// Returns `SessionError::StoreUnavailable` if the database cannot be opened
    ///
    /// # Examples
    ///
    /// ```
    /// use sessionkeep::storage::SledTable;
    ///
    /// # fn main() -> sessionkeep::error::Result<()> {
    /// let dir = tempfile::tempdir()?;
    /// let table = SledTable::new(dir.path().join("sessions.sled"))?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let db = sled::open(path).map_err(|e| {
            SessionError::StoreUnavailable(format!("Failed to open database: {}", e))
        })?;
        Ok(Self { db })
    }

    /// Opens a throwaway table that is removed when dropped
    pub fn temporary() -> Result<Self> {
        let db = sled::Config::new().temporary(true).open().map_err(|e| {
            SessionError::StoreUnavailable(format!("Failed to open database: {}", e))
        })?;
        Ok(Self { db })
    }
}

fn encode_key(key: &ItemKey) -> Vec<u8> {
    let mut raw = partition_prefix(&key.pk);
    raw.extend_from_slice(key.sk.as_bytes());
    raw
}

fn partition_prefix(pk: &str) -> Vec<u8> {
    let mut raw = Vec::with_capacity(pk.len() + 1);
    raw.extend_from_slice(pk.as_bytes());
    raw.push(KEY_SEPARATOR);
    raw
}

fn check_key(key: &ItemKey) -> Result<()> {
    if key.pk.as_bytes().contains(&KEY_SEPARATOR) {
        return Err(
            SessionError::Validation("partition key must not contain NUL bytes".into()).into(),
        );
    }
    Ok(())
}

fn encode_item(item: &Item) -> Result<Vec<u8>> {
    serde_json::to_vec(item)
        .map_err(|e| SessionError::StoreUnavailable(format!("Serialization failed: {}", e)).into())
}

fn decode_item(bytes: &[u8]) -> Result<Item> {
    serde_json::from_slice(bytes).map_err(|e| {
        SessionError::StoreUnavailable(format!("Deserialization failed: {}", e)).into()
    })
}

fn flush(db: &Db) -> Result<()> {
    db.flush()
        .map_err(|e| SessionError::StoreUnavailable(format!("Flush failed: {}", e)))?;
    Ok(())
}

#[async_trait]
impl KeyValueStore for SledTable {
    async fn put(&self, item: Item) -> Result<()> {
        let key = item.key()?;
        check_key(&key)?;
        let value = encode_item(&item)?;
        let db = self.db.clone();

        tokio::task::spawn_blocking(move || -> Result<()> {
            db.insert(encode_key(&key), value)
                .map_err(|e| SessionError::StoreUnavailable(format!("Insert failed: {}", e)))?;
            flush(&db)
        })
        .await
        .map_err(join_error)?
    }

    async fn query(&self, partition: &str, condition: &SortKeyCondition) -> Result<Vec<Item>> {
        let db = self.db.clone();
        let mut prefix = partition_prefix(partition);
        if let SortKeyCondition::BeginsWith(sk_prefix) = condition {
            prefix.extend_from_slice(sk_prefix.as_bytes());
        }
        let condition = condition.clone();

        tokio::task::spawn_blocking(move || -> Result<Vec<Item>> {
            let mut items = Vec::new();
            for result in db.scan_prefix(prefix) {
                let (_, value) = result.map_err(|e| {
                    SessionError::StoreUnavailable(format!("Iteration failed: {}", e))
                })?;
                let item = decode_item(&value)?;
                if condition.matches(&item.key()?.sk) {
                    items.push(item);
                }
            }
            Ok(items)
        })
        .await
        .map_err(join_error)?
    }

    async fn scan(&self, filter: &Filter) -> Result<Vec<Item>> {
        let db = self.db.clone();
        let filter = filter.clone();

        tokio::task::spawn_blocking(move || -> Result<Vec<Item>> {
            let mut items = Vec::new();
            for result in db.iter() {
                let (_, value) = result.map_err(|e| {
                    SessionError::StoreUnavailable(format!("Iteration failed: {}", e))
                })?;
                let item = decode_item(&value)?;
                if filter.matches(&item) {
                    items.push(item);
                }
            }
            Ok(items)
        })
        .await
        .map_err(join_error)?
    }

    async fn update(&self, key: &ItemKey, patch: &AttributePatch) -> Result<Option<Item>> {
        check_key(key)?;
        let db = self.db.clone();
        let raw_key = encode_key(key);
        let patch = patch.clone();

        tokio::task::spawn_blocking(move || -> Result<Option<Item>> {
            // Compare-and-swap keeps the read-modify-write atomic for this item
            loop {
                let current = db
                    .get(&raw_key)
                    .map_err(|e| SessionError::StoreUnavailable(format!("Get failed: {}", e)))?;
                let Some(current) = current else {
                    return Ok(None);
                };

                let mut item = decode_item(&current)?;
                patch.apply_to(&mut item);
                let updated = encode_item(&item)?;

                let swapped = db
                    .compare_and_swap(&raw_key, Some(current), Some(updated))
                    .map_err(|e| {
                        SessionError::StoreUnavailable(format!("Update failed: {}", e))
                    })?;
                if swapped.is_ok() {
                    flush(&db)?;
                    return Ok(Some(item));
                }
                tracing::debug!("Concurrent write detected during update, retrying");
            }
        })
        .await
        .map_err(join_error)?
    }

    async fn batch_delete(&self, keys: &[ItemKey]) -> Result<usize> {
        let db = self.db.clone();
        let raw_keys: Vec<Vec<u8>> = keys.iter().map(encode_key).collect();

        tokio::task::spawn_blocking(move || -> Result<usize> {
            let mut batch = sled::Batch::default();
            let mut existing = 0;
            for raw_key in raw_keys {
                let present = db
                    .contains_key(&raw_key)
                    .map_err(|e| SessionError::StoreUnavailable(format!("Get failed: {}", e)))?;
                if present {
                    existing += 1;
                }
                batch.remove(raw_key);
            }
            db.apply_batch(batch).map_err(|e| {
                SessionError::StoreUnavailable(format!("Batch delete failed: {}", e))
            })?;
            flush(&db)?;
            Ok(existing)
        })
        .await
        .map_err(join_error)?
    }

    async fn close(&self) -> Result<()> {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || flush(&db))
            .await
            .map_err(join_error)?
    }
}

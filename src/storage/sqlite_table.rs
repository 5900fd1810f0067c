use crate::error::{Result, SessionError};
use crate::storage::item::{AttributePatch, Filter, Item, ItemKey, SortKeyCondition};
use crate::storage::{join_error, KeyValueStore};
use anyhow::Context;
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::PathBuf;

/// Table stored in a SQLite database file
///
/// Rows are keyed on `(pk, sk)` and hold the JSON form of the item. SQLite's
/// default binary collation orders sort keys byte-wise, which is what the
/// session key scheme relies on.
pub struct SqliteTable {
    db_path: PathBuf,
}

fn store_error(e: anyhow::Error) -> SessionError {
    SessionError::StoreUnavailable(format!("{:#}", e))
}

impl SqliteTable {
    /// Create a new table instance that uses the specified database path.
    ///
    /// The parent directory is created when missing.
    ///
    /// # Examples
    ///
    /// ```
    /// use sessionkeep::storage::SqliteTable;
    ///
    /// let dir = tempfile::tempdir().unwrap();
    /// let table = SqliteTable::new_with_path(dir.path().join("sessions.db")).unwrap();
    /// ```
    pub fn new_with_path<P: Into<PathBuf>>(db_path: P) -> Result<Self> {
        let db_path = db_path.into();

        // Ensure parent directory exists so opening the DB file succeeds.
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .context("Failed to create parent directory for database")
                .map_err(store_error)?;
        }

        let table = Self { db_path };
        table.init()?;
        Ok(table)
    }

    /// Initialize the database schema
    fn init(&self) -> Result<()> {
        let conn = self.open()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS items (
                pk TEXT NOT NULL,
                sk TEXT NOT NULL,
                item JSON NOT NULL,
                PRIMARY KEY (pk, sk)
            )",
            [],
        )
        .context("Failed to create tables")
        .map_err(store_error)?;

        Ok(())
    }

    fn open(&self) -> Result<Connection> {
        Ok(Connection::open(&self.db_path)
            .context("Failed to open database")
            .map_err(store_error)?)
    }

    async fn blocking<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(Connection) -> Result<T> + Send + 'static,
    {
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || -> Result<T> {
            let conn = Connection::open(&db_path)
                .context("Failed to open database")
                .map_err(store_error)?;
            op(conn)
        })
        .await
        .map_err(join_error)?
    }
}

fn decode_row(raw: &str) -> Result<Item> {
    Ok(serde_json::from_str(raw)
        .context("Failed to deserialize item")
        .map_err(store_error)?)
}

fn encode(item: &Item) -> Result<String> {
    Ok(serde_json::to_string(item)
        .context("Failed to serialize item")
        .map_err(store_error)?)
}

#[async_trait]
impl KeyValueStore for SqliteTable {
    async fn put(&self, item: Item) -> Result<()> {
        let key = item.key()?;
        let raw = encode(&item)?;

        self.blocking(move |conn| {
            conn.execute(
                "INSERT INTO items (pk, sk, item) VALUES (?, ?, ?)
                ON CONFLICT (pk, sk) DO UPDATE SET item = excluded.item",
                params![key.pk, key.sk, raw],
            )
            .context("Failed to write item")
            .map_err(store_error)?;
            Ok(())
        })
        .await
    }

    async fn query(&self, partition: &str, condition: &SortKeyCondition) -> Result<Vec<Item>> {
        let partition = partition.to_string();
        let condition = condition.clone();

        self.blocking(move |conn| {
            let mut stmt = conn
                .prepare("SELECT sk, item FROM items WHERE pk = ? ORDER BY sk ASC")
                .context("Failed to prepare statement")
                .map_err(store_error)?;

            let rows = stmt
                .query_map(params![partition], |row| {
                    let sk: String = row.get(0)?;
                    let raw: String = row.get(1)?;
                    Ok((sk, raw))
                })
                .context("Failed to query items")
                .map_err(store_error)?;

            let mut items = Vec::new();
            for row in rows {
                let (sk, raw) = row.context("Failed to read row").map_err(store_error)?;
                if condition.matches(&sk) {
                    items.push(decode_row(&raw)?);
                }
            }
            Ok(items)
        })
        .await
    }

    async fn scan(&self, filter: &Filter) -> Result<Vec<Item>> {
        let filter = filter.clone();

        self.blocking(move |conn| {
            let mut stmt = conn
                .prepare("SELECT item FROM items ORDER BY pk ASC, sk ASC")
                .context("Failed to prepare statement")
                .map_err(store_error)?;

            let rows = stmt
                .query_map([], |row| row.get::<_, String>(0))
                .context("Failed to scan items")
                .map_err(store_error)?;

            let mut items = Vec::new();
            for row in rows {
                let raw = row.context("Failed to read row").map_err(store_error)?;
                let item = decode_row(&raw)?;
                if filter.matches(&item) {
                    items.push(item);
                }
            }
            Ok(items)
        })
        .await
    }

    async fn update(&self, key: &ItemKey, patch: &AttributePatch) -> Result<Option<Item>> {
        let key = key.clone();
        let patch = patch.clone();

        self.blocking(move |mut conn| {
            let tx = conn
                .transaction()
                .context("Failed to start transaction")
                .map_err(store_error)?;

            let current: Option<String> = tx
                .query_row(
                    "SELECT item FROM items WHERE pk = ? AND sk = ?",
                    params![key.pk, key.sk],
                    |row| row.get(0),
                )
                .optional()
                .context("Failed to read item")
                .map_err(store_error)?;

            let Some(current) = current else {
                return Ok(None);
            };

            let mut item = decode_row(&current)?;
            patch.apply_to(&mut item);

            tx.execute(
                "UPDATE items SET item = ? WHERE pk = ? AND sk = ?",
                params![encode(&item)?, key.pk, key.sk],
            )
            .context("Failed to update item")
            .map_err(store_error)?;

            tx.commit()
                .context("Failed to commit transaction")
                .map_err(store_error)?;

            Ok(Some(item))
        })
        .await
    }

    async fn batch_delete(&self, keys: &[ItemKey]) -> Result<usize> {
        let keys = keys.to_vec();

        self.blocking(move |mut conn| {
            let tx = conn
                .transaction()
                .context("Failed to start transaction")
                .map_err(store_error)?;

            let mut deleted = 0;
            for key in &keys {
                deleted += tx
                    .execute(
                        "DELETE FROM items WHERE pk = ? AND sk = ?",
                        params![key.pk, key.sk],
                    )
                    .context("Failed to delete item")
                    .map_err(store_error)?;
            }

            tx.commit()
                .context("Failed to commit transaction")
                .map_err(store_error)?;

            Ok(deleted)
        })
        .await
    }
}

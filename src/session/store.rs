//! Durable session CRUD over a [`KeyValueStore`]
//!
//! All records of a session share the partition `SESSION#{session_id}`: one
//! metadata item and one item per message. Reads of a session go through the
//! metadata item first, so a soft-deleted session is invisible even though
//! its messages remain in place.

use crate::error::{Result, SessionError};
use crate::memory::Turn;
use crate::session::keys::{
    message_sort_key, partition_key, validate_session_id, MessageClock, MESSAGE_SORT_KEY_PREFIX,
    METADATA_SORT_KEY,
};
use crate::session::types::{
    attrs, MessageRecord, MetadataPatch, MetadataPolicy, SessionHandle, SessionMetadata,
    StoredSession,
};
use crate::storage::{
    AttributePatch, AttributeValue, Filter, Item, ItemKey, KeyValueStore, SortKeyCondition,
    SORT_KEY,
};
use chrono::{DateTime, SecondsFormat, Utc};
use std::sync::Arc;

/// Session records in an ordered key-value store
///
/// The store handle is injected and shared; close it once at shutdown with
/// [`SessionStore::close`].
pub struct SessionStore {
    table: Arc<dyn KeyValueStore>,
    clock: MessageClock,
    policy: MetadataPolicy,
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn not_found(session_id: &str) -> anyhow::Error {
    SessionError::NotFound(session_id.to_string()).into()
}

impl SessionStore {
    /// Creates a store using the default metadata policy
    ///
    /// # Examples
    ///
    /// ```
    /// use sessionkeep::memory::Turn;
    /// use sessionkeep::session::SessionStore;
    /// use sessionkeep::storage::MemoryTable;
    /// use std::sync::Arc;
    ///
    /// # #[tokio::main]
    /// # async fn main() -> sessionkeep::error::Result<()> {
    /// let store = SessionStore::new(Arc::new(MemoryTable::new()));
    /// store.append_message("abc", Turn::user("hi"), 42).await?;
    /// let session = store.get_session("abc").await?;
    /// assert_eq!(session.metadata.user_id, 42);
    /// assert_eq!(session.messages, vec![Turn::user("hi")]);
    /// # Ok(())
    /// # }
    /// ```
    pub fn new(table: Arc<dyn KeyValueStore>) -> Self {
        Self::with_policy(table, MetadataPolicy::default())
    }

    /// Creates a store that validates metadata patches against `policy`
    pub fn with_policy(table: Arc<dyn KeyValueStore>, policy: MetadataPolicy) -> Self {
        Self {
            table,
            clock: MessageClock::new(),
            policy,
        }
    }

    /// Policy applied to metadata patches
    pub fn policy(&self) -> &MetadataPolicy {
        &self.policy
    }

    /// Builds a validated patch from a JSON object under this store's policy
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Validation` if the patch is empty or writes a
    /// field that is not mutable
    pub fn patch_from_json(&self, value: &serde_json::Value) -> Result<MetadataPatch> {
        MetadataPatch::from_json(value, &self.policy)
    }

    async fn live_metadata_item(&self, session_id: &str) -> Result<Option<Item>> {
        let items = self
            .table
            .query(
                &partition_key(session_id),
                &SortKeyCondition::Equals(METADATA_SORT_KEY.to_string()),
            )
            .await?;
        Ok(items.into_iter().find(|item| {
            item.get(attrs::IS_DELETED).and_then(AttributeValue::as_bool) == Some(false)
        }))
    }

    async fn messages(&self, session_id: &str) -> Result<Vec<Item>> {
        self.table
            .query(
                &partition_key(session_id),
                &SortKeyCondition::BeginsWith(MESSAGE_SORT_KEY_PREFIX.to_string()),
            )
            .await
    }

    async fn turns(&self, session_id: &str) -> Result<Vec<Turn>> {
        self.messages(session_id)
            .await?
            .iter()
            .map(MessageRecord::turn_from_item)
            .collect()
    }

    fn metadata_item(
        session_id: &str,
        user_id: i64,
        title: Option<&str>,
        created_at: &str,
    ) -> Item {
        let mut item = Item::new(&ItemKey::new(partition_key(session_id), METADATA_SORT_KEY))
            .with(attrs::IS_DELETED, false)
            .with(attrs::USER_ID, user_id)
            .with(attrs::CREATED_AT, created_at);
        if let Some(title) = title {
            item.set(attrs::TITLE, title);
        }
        item
    }

    async fn put_message(&self, session_id: &str, turn: Turn) -> Result<MessageRecord> {
        let at = self.clock.next();
        let sort_key = message_sort_key(at);
        let created_at = timestamp(at);
        let payload = AttributeValue::from_json(&serde_json::to_value(&turn)?)?;

        let item = Item::new(&ItemKey::new(partition_key(session_id), sort_key.clone()))
            .with(attrs::MESSAGE, payload)
            .with(attrs::CREATED_AT, created_at.as_str());
        self.table.put(item).await?;

        tracing::debug!(session_id, sort_key = %sort_key, role = %turn.role, "Wrote message");
        Ok(MessageRecord {
            session_id: session_id.to_string(),
            sort_key,
            message: turn,
            created_at,
        })
    }

    /// Makes sure a non-deleted metadata record exists for the session
    ///
    /// Creates one owned by `user_id` when absent. Two concurrent callers may
    /// both create it; the last write wins.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Validation` for an invalid session id and
    /// `SessionError::StoreUnavailable` if the store fails
    pub async fn ensure_metadata(&self, session_id: &str, user_id: i64) -> Result<SessionMetadata> {
        validate_session_id(session_id)?;

        if let Some(item) = self.live_metadata_item(session_id).await? {
            return SessionMetadata::from_item(&item);
        }

        let item = Self::metadata_item(session_id, user_id, None, &timestamp(Utc::now()));
        self.table.put(item.clone()).await?;
        tracing::info!(session_id, user_id, "Created session metadata");
        SessionMetadata::from_item(&item)
    }

    /// Appends a turn to a session, creating its metadata on first use
    ///
    /// # Arguments
    ///
    /// * `session_id` - Session to append to
    /// * `turn` - Turn to store
    /// * `user_id` - Owner recorded if the metadata has to be created
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Validation` for an empty session id or an
    /// invalid turn, and `SessionError::StoreUnavailable` if the store fails
    pub async fn append_message(
        &self,
        session_id: &str,
        turn: Turn,
        user_id: i64,
    ) -> Result<MessageRecord> {
        validate_session_id(session_id)?;
        if let Err(err) = turn.validate() {
            return Err(SessionError::Validation(err.to_string()).into());
        }

        self.ensure_metadata(session_id, user_id).await?;
        self.put_message(session_id, turn).await
    }

    /// Fetches a session's metadata and turns in append order
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NotFound` unless a non-deleted metadata record
    /// exists
    pub async fn get_session(&self, session_id: &str) -> Result<StoredSession> {
        validate_session_id(session_id)?;

        let item = self
            .live_metadata_item(session_id)
            .await?
            .ok_or_else(|| not_found(session_id))?;
        let metadata = SessionMetadata::from_item(&item)?;
        let messages = self.turns(session_id).await?;

        tracing::debug!(session_id, messages = messages.len(), "Fetched session");
        Ok(StoredSession { metadata, messages })
    }

    async fn scan_metadata(&self, filter: Filter) -> Result<Vec<SessionMetadata>> {
        let filter = filter
            .equals(SORT_KEY, METADATA_SORT_KEY)
            .equals(attrs::IS_DELETED, false);

        let mut sessions: Vec<SessionMetadata> = Vec::new();
        for item in self.table.scan(&filter).await? {
            match SessionMetadata::from_item(&item) {
                Ok(metadata) => sessions.push(metadata),
                Err(e) => tracing::warn!("Skipping malformed metadata record: {}", e),
            }
        }
        sessions.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.session_id.cmp(&b.session_id))
        });
        Ok(sessions)
    }

    /// Every non-deleted session of a user, with its turns
    ///
    /// Sessions are discovered by a full scan and returned oldest first.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NotFound` when the user has no sessions
    pub async fn list_sessions_for_user(&self, user_id: i64) -> Result<Vec<StoredSession>> {
        let metadata = self
            .scan_metadata(Filter::new().equals(attrs::USER_ID, user_id))
            .await?;
        if metadata.is_empty() {
            return Err(SessionError::NotFound(format!("sessions of user {}", user_id)).into());
        }

        let fetches = metadata.into_iter().map(|metadata| async move {
            let messages = self.turns(&metadata.session_id).await?;
            Ok::<_, anyhow::Error>(StoredSession { metadata, messages })
        });
        let sessions = futures::future::try_join_all(fetches).await?;

        tracing::debug!(user_id, sessions = sessions.len(), "Listed sessions");
        Ok(sessions)
    }

    /// Metadata of every non-deleted session, oldest first
    pub async fn list_all_sessions(&self) -> Result<Vec<SessionMetadata>> {
        let sessions = self.scan_metadata(Filter::new()).await?;
        tracing::debug!(sessions = sessions.len(), "Listed all sessions");
        Ok(sessions)
    }

    /// Sets each patch field as an attribute of the session's metadata
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NotFound` unless the session exists and is not
    /// soft-deleted
    pub async fn update_metadata(
        &self,
        session_id: &str,
        patch: &MetadataPatch,
    ) -> Result<SessionMetadata> {
        validate_session_id(session_id)?;
        if self.live_metadata_item(session_id).await?.is_none() {
            return Err(not_found(session_id));
        }

        let key = ItemKey::new(partition_key(session_id), METADATA_SORT_KEY);
        let updated = self
            .table
            .update(&key, &patch.to_attribute_patch())
            .await?
            .ok_or_else(|| not_found(session_id))?;

        tracing::info!(session_id, fields = patch.len(), "Updated session metadata");
        SessionMetadata::from_item(&updated)
    }

    /// Marks a session deleted; its messages stay in the store
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NotFound` unless the session exists and is not
    /// already soft-deleted
    pub async fn soft_delete_session(&self, session_id: &str) -> Result<()> {
        validate_session_id(session_id)?;
        if self.live_metadata_item(session_id).await?.is_none() {
            return Err(not_found(session_id));
        }

        let key = ItemKey::new(partition_key(session_id), METADATA_SORT_KEY);
        let patch = AttributePatch::new().set(attrs::IS_DELETED, true);
        self.table
            .update(&key, &patch)
            .await?
            .ok_or_else(|| not_found(session_id))?;

        tracing::info!(session_id, "Soft-deleted session");
        Ok(())
    }

    /// Deletes every message of a session and returns how many were removed
    ///
    /// Metadata is left untouched, and a session without messages (or
    /// without any records at all) yields zero.
    pub async fn clear_messages(&self, session_id: &str) -> Result<usize> {
        validate_session_id(session_id)?;

        let keys = self
            .messages(session_id)
            .await?
            .iter()
            .map(|item| {
                item.key().map_err(|err| {
                    anyhow::Error::from(SessionError::StoreUnavailable(format!(
                        "malformed message record: {}",
                        err
                    )))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        if keys.is_empty() {
            return Ok(0);
        }

        let deleted = self.table.batch_delete(&keys).await?;
        tracing::info!(session_id, deleted, "Cleared session messages");
        Ok(deleted)
    }

    /// Writes a complete session that must not exist yet
    ///
    /// The metadata record is written first, then each turn in order. A store
    /// failure part way leaves the records written so far in place.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::AlreadyExists` if any record exists under the
    /// session's partition (including a soft-deleted one) and
    /// `SessionError::Validation` if there are no turns or a turn is invalid
    pub async fn create_session(
        &self,
        session_id: &str,
        user_id: i64,
        title: Option<&str>,
        turns: &[Turn],
    ) -> Result<SessionHandle> {
        validate_session_id(session_id)?;
        if turns.is_empty() {
            return Err(SessionError::Validation("messages is required".into()).into());
        }
        for turn in turns {
            if let Err(err) = turn.validate() {
                return Err(SessionError::Validation(err.to_string()).into());
            }
        }

        let existing = self
            .table
            .query(&partition_key(session_id), &SortKeyCondition::Any)
            .await?;
        if !existing.is_empty() {
            return Err(SessionError::AlreadyExists(session_id.to_string()).into());
        }

        let created_at = timestamp(Utc::now());
        self.table
            .put(Self::metadata_item(session_id, user_id, title, &created_at))
            .await?;
        for turn in turns {
            self.put_message(session_id, turn.clone()).await?;
        }

        tracing::info!(session_id, user_id, messages = turns.len(), "Created session");
        Ok(SessionHandle {
            session_id: session_id.to_string(),
            user_id,
            title: title.map(str::to_string),
            message_count: turns.len(),
            created_at,
        })
    }

    /// Flushes and closes the underlying store
    pub async fn close(&self) -> Result<()> {
        self.table.close().await
    }
}

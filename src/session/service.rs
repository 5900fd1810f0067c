//! Save, restore, delete and list use cases
//!
//! `SessionService` ties a live [`ConversationBuffer`] to the durable
//! [`SessionStore`]. A buffer is owned by its caller and passed in by
//! reference for each operation.

use crate::error::Result;
use crate::memory::{ConversationBuffer, Turn};
use crate::session::store::SessionStore;
use crate::session::types::{
    MessageRecord, MetadataPatch, SessionHandle, SessionMetadata, SessionSummary, StoredSession,
};
use std::sync::Arc;

/// Session use cases over a shared store
#[derive(Clone)]
pub struct SessionService {
    store: Arc<SessionStore>,
}

impl SessionService {
    /// Creates a service over `store`
    pub fn new(store: Arc<SessionStore>) -> Self {
        Self { store }
    }

    /// Underlying store
    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Persists the buffer as a new session and clears it
    ///
    /// The session takes the buffer's current session id. After a successful
    /// save the buffer is empty and carries a fresh id, so the next
    /// conversation starts a new session.
    ///
    /// # Arguments
    ///
    /// * `buffer` - Live conversation to persist
    /// * `user_id` - Owner of the new session
    /// * `title` - Optional human-readable title
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Validation` if the buffer holds no turns and
    /// `SessionError::AlreadyExists` if the id is taken; the buffer is left
    /// untouched in both cases
    ///
    /// # Examples
    ///
    /// ```
    /// use sessionkeep::memory::{ConversationBuffer, Preamble, Turn};
    /// use sessionkeep::session::{SessionService, SessionStore};
    /// use sessionkeep::storage::MemoryTable;
    /// use std::sync::Arc;
    ///
    /// # #[tokio::main]
    /// # async fn main() -> sessionkeep::error::Result<()> {
    /// let service = SessionService::new(Arc::new(SessionStore::new(Arc::new(MemoryTable::new()))));
    /// let mut buffer = ConversationBuffer::new(Preamble::default());
    /// buffer.append(Turn::user("hi"))?;
    ///
    /// let handle = service.save_session(&mut buffer, 42, Some("Episode 1")).await?;
    /// assert!(buffer.is_empty());
    ///
    /// let turns = service.restore_session(&handle.session_id, &mut buffer).await?;
    /// assert_eq!(turns.len(), 2);
    /// # Ok(())
    /// # }
    /// ```
    pub async fn save_session(
        &self,
        buffer: &mut ConversationBuffer,
        user_id: i64,
        title: Option<&str>,
    ) -> Result<SessionHandle> {
        let handle = self
            .store
            .create_session(buffer.session_id(), user_id, title, buffer.turns())
            .await?;
        buffer.remove();
        tracing::info!(
            session_id = %handle.session_id,
            messages = handle.message_count,
            "Saved conversation"
        );
        Ok(handle)
    }

    /// Loads a stored session into the buffer, replacing its contents
    ///
    /// The buffer adopts the session id so later appends continue the
    /// restored session.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NotFound` if the session does not exist or was
    /// soft-deleted; the buffer is left untouched in that case
    pub async fn restore_session(
        &self,
        session_id: &str,
        buffer: &mut ConversationBuffer,
    ) -> Result<Vec<Turn>> {
        let session = self.store.get_session(session_id).await?;
        buffer.restore_session(session_id, session.messages.clone());
        tracing::info!(session_id, messages = session.messages.len(), "Restored conversation");
        Ok(session.messages)
    }

    /// Soft-deletes a session
    pub async fn delete_session(&self, session_id: &str) -> Result<()> {
        self.store.soft_delete_session(session_id).await
    }

    /// Summaries of a user's sessions, oldest first
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NotFound` when the user has no sessions
    pub async fn list_sessions(&self, user_id: i64) -> Result<Vec<SessionSummary>> {
        Ok(self
            .store
            .list_sessions_for_user(user_id)
            .await?
            .into_iter()
            .map(SessionSummary::from)
            .collect())
    }

    /// Appends a turn to a stored session
    pub async fn append_message(
        &self,
        session_id: &str,
        turn: Turn,
        user_id: i64,
    ) -> Result<MessageRecord> {
        self.store.append_message(session_id, turn, user_id).await
    }

    /// Fetches a stored session
    pub async fn get_session(&self, session_id: &str) -> Result<StoredSession> {
        self.store.get_session(session_id).await
    }

    /// Applies a metadata patch given as a JSON object
    pub async fn update_metadata(
        &self,
        session_id: &str,
        patch: &serde_json::Value,
    ) -> Result<SessionMetadata> {
        let patch: MetadataPatch = self.store.patch_from_json(patch)?;
        self.store.update_metadata(session_id, &patch).await
    }

    /// Deletes a session's messages
    pub async fn clear_messages(&self, session_id: &str) -> Result<usize> {
        self.store.clear_messages(session_id).await
    }

    /// Metadata of every live session
    pub async fn list_all_sessions(&self) -> Result<Vec<SessionMetadata>> {
        self.store.list_all_sessions().await
    }

    /// Flushes the store
    pub async fn close(&self) -> Result<()> {
        self.store.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{classify, SessionError};
    use crate::memory::Preamble;
    use crate::storage::MemoryTable;
    use serde_json::json;

    fn create_test_service() -> SessionService {
        SessionService::new(Arc::new(SessionStore::new(Arc::new(MemoryTable::new()))))
    }

    fn buffer_with(turns: &[Turn]) -> ConversationBuffer {
        let preamble = Preamble::System("You're a podcast assistant.".into());
        let mut buffer = ConversationBuffer::new(preamble);
        for turn in turns {
            buffer.append(turn.clone()).expect("valid turn");
        }
        buffer
    }

    #[tokio::test]
    async fn test_save_then_restore_round_trips() {
        let service = create_test_service();
        let mut buffer = buffer_with(&[Turn::user("hi"), Turn::assistant("hello")]);
        let saved_id = buffer.session_id().to_string();
        let expected = buffer.snapshot();

        let handle = service.save_session(&mut buffer, 42, None).await.unwrap();
        assert_eq!(handle.session_id, saved_id);
        assert_eq!(handle.message_count, 3);
        assert!(buffer.is_empty());
        assert_ne!(buffer.session_id(), saved_id);

        let turns = service.restore_session(&saved_id, &mut buffer).await.unwrap();
        assert_eq!(turns, expected);
        assert_eq!(buffer.turns(), expected.as_slice());
        assert_eq!(buffer.session_id(), saved_id);
    }

    #[tokio::test]
    async fn test_save_twice_is_already_exists() {
        let service = create_test_service();
        let mut buffer = buffer_with(&[Turn::user("hi")]);
        let id = buffer.session_id().to_string();
        service.save_session(&mut buffer, 42, None).await.unwrap();

        let mut again = buffer_with(&[Turn::user("other")]);
        let before = again.snapshot();
        again.restore_session(id.clone(), before.clone());

        let err = service.save_session(&mut again, 42, None).await.unwrap_err();
        assert!(matches!(classify(&err), Some(SessionError::AlreadyExists(_))));
        assert_eq!(again.snapshot(), before);
        assert_eq!(again.session_id(), id);
    }

    #[tokio::test]
    async fn test_save_empty_buffer_is_rejected() {
        let service = create_test_service();
        let mut buffer = ConversationBuffer::new(Preamble::Default);
        let id = buffer.session_id().to_string();

        let err = service
            .save_session(&mut buffer, 42, Some("empty"))
            .await
            .unwrap_err();
        assert!(matches!(classify(&err), Some(SessionError::Validation(_))));
        assert_eq!(buffer.session_id(), id);

        let err = service.get_session(&id).await.unwrap_err();
        assert!(matches!(classify(&err), Some(SessionError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_restore_missing_leaves_buffer_alone() {
        let service = create_test_service();
        let mut buffer = buffer_with(&[Turn::user("keep me")]);
        let before = buffer.snapshot();

        let err = service
            .restore_session("missing", &mut buffer)
            .await
            .unwrap_err();
        assert!(matches!(classify(&err), Some(SessionError::NotFound(_))));
        assert_eq!(buffer.snapshot(), before);
    }

    #[tokio::test]
    async fn test_restored_buffer_continues_session() {
        let service = create_test_service();
        let mut buffer = buffer_with(&[Turn::user("hi")]);
        let handle = service.save_session(&mut buffer, 42, None).await.unwrap();

        service
            .restore_session(&handle.session_id, &mut buffer)
            .await
            .unwrap();
        let next = Turn::user("more");
        buffer.append(next.clone()).unwrap();
        service
            .append_message(buffer.session_id(), next, 42)
            .await
            .unwrap();

        let session = service.get_session(&handle.session_id).await.unwrap();
        assert_eq!(session.messages, buffer.snapshot());
    }

    #[tokio::test]
    async fn test_delete_then_list() {
        let service = create_test_service();
        let mut first = buffer_with(&[Turn::user("a")]);
        let mut second = buffer_with(&[Turn::user("b"), Turn::user("c")]);
        let kept = service
            .save_session(&mut first, 42, Some("kept"))
            .await
            .unwrap();
        let gone = service.save_session(&mut second, 42, None).await.unwrap();

        service.delete_session(&gone.session_id).await.unwrap();

        let summaries = service.list_sessions(42).await.unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].session_id, kept.session_id);
        assert_eq!(summaries[0].title.as_deref(), Some("kept"));
        assert_eq!(summaries[0].message_count, 2);
    }

    #[tokio::test]
    async fn test_update_metadata_rejects_reserved_field() {
        let service = create_test_service();
        service
            .append_message("abc", Turn::user("hi"), 42)
            .await
            .unwrap();

        let err = service
            .update_metadata("abc", &json!({"is_deleted": true}))
            .await
            .unwrap_err();
        assert!(matches!(classify(&err), Some(SessionError::Validation(_))));
        assert!(service.get_session("abc").await.is_ok());
    }
}

//! In-process conversation buffers
//!
//! Two flavours are provided:
//!
//! - [`ConversationBuffer`] holds a single live conversation and knows the
//!   session id it will be saved under.
//! - [`ConversationMemory`] keeps one turn list per caller identity (for
//!   example one per chat user).
//!
//! Both seed an empty conversation with the configured [`Preamble`] on the
//! first append. Neither is synchronized: callers serialize access per
//! identity.

use crate::error::{Result, SessionError};
use crate::memory::turn::Turn;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

/// System prompt used when no preamble is configured
pub const DEFAULT_SYSTEM_PROMPT: &str = "You're a general assistant.";

/// Turns placed at the head of every new conversation
///
/// Seeding priority follows the variant order: a single turn, a list of
/// turns, a system prompt string, then the default system turn.
///
/// In configuration files the preamble is written as whichever shape is
/// convenient:
///
/// ```yaml
/// preamble: "You're a podcast assistant."
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum Preamble {
    /// A single, fully specified turn
    Turn(Turn),
    /// A list of turns copied verbatim
    Turns(Vec<Turn>),
    /// Content of a system turn
    System(String),
    /// The general-assistant system turn
    #[default]
    Default,
}

impl Preamble {
    /// Turns to seed an empty conversation with
    ///
    /// # Examples
    ///
    /// ```
    /// use sessionkeep::memory::{Preamble, Role};
    ///
    /// let seed = Preamble::System("You're a robot.".into()).seed();
    /// assert_eq!(seed.len(), 1);
    /// assert_eq!(seed[0].role, Role::System);
    /// ```
    pub fn seed(&self) -> Vec<Turn> {
        match self {
            Preamble::Turn(turn) => vec![turn.clone()],
            Preamble::Turns(turns) => turns.clone(),
            Preamble::System(content) => vec![Turn::system(content.clone())],
            Preamble::Default => vec![Turn::system(DEFAULT_SYSTEM_PROMPT)],
        }
    }
}

fn new_session_id() -> String {
    Uuid::new_v4().to_string()
}

/// The single live conversation of one agent
///
/// The buffer owns a session id (a fresh UUID v4) which is the id it will be
/// saved under. Clearing the buffer starts a new session with a new id.
///
/// # Examples
///
/// ```
/// use sessionkeep::memory::{ConversationBuffer, Preamble, Turn};
///
/// let mut buffer = ConversationBuffer::new(Preamble::Default);
/// assert!(buffer.turns().is_empty());
///
/// buffer.append(Turn::user("Hello")).unwrap();
/// assert_eq!(buffer.len(), 2); // preamble + user turn
/// ```
#[derive(Debug, Clone)]
pub struct ConversationBuffer {
    session_id: String,
    turns: Vec<Turn>,
    preamble: Preamble,
}

impl ConversationBuffer {
    /// Creates an empty buffer with a freshly generated session id
    pub fn new(preamble: Preamble) -> Self {
        Self {
            session_id: new_session_id(),
            turns: Vec::new(),
            preamble,
        }
    }

    /// Id of the session this buffer will be saved under
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Appends a turn, seeding the preamble first if the buffer is empty
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidTurn` if the turn is invalid; the buffer
    /// is left unchanged
    pub fn append(&mut self, turn: Turn) -> Result<()> {
        turn.validate()?;
        if self.turns.is_empty() {
            self.turns = self.preamble.seed();
            tracing::debug!(
                session_id = %self.session_id,
                seeded = self.turns.len(),
                "Seeded conversation preamble"
            );
        }
        self.turns.push(turn);
        Ok(())
    }

    /// Turns in append order; empty before the conversation has started
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// Owned copy of the turns
    pub fn snapshot(&self) -> Vec<Turn> {
        self.turns.clone()
    }

    /// Number of turns held
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    /// Whether the conversation has not started yet
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Clears the conversation and starts a new session id
    ///
    /// Calling this on an empty buffer is not an error.
    pub fn remove(&mut self) {
        self.turns.clear();
        self.session_id = new_session_id();
    }

    /// Replaces the contents with the given turns under a new session id
    pub fn restore(&mut self, turns: Vec<Turn>) {
        self.remove();
        self.turns = turns;
    }

    /// Replaces the contents with a stored session's turns and adopts its id
    ///
    /// Subsequent live appends can then target the same durable session.
    pub fn restore_session(&mut self, session_id: impl Into<String>, turns: Vec<Turn>) {
        self.turns = turns;
        self.session_id = session_id.into();
    }
}

impl fmt::Display for ConversationBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Storage: InMemory. Be careful, it will be lost when the program ends."
        )
    }
}

/// Conversation turns for many identities at once
///
/// # Examples
///
/// ```
/// use sessionkeep::memory::{ConversationMemory, Preamble, Turn};
///
/// let mut memory = ConversationMemory::new(Preamble::Default);
/// memory.append("1458", Turn::user("Hello")).unwrap();
/// assert_eq!(memory.get("1458").unwrap().len(), 2);
/// assert!(memory.get("1234").is_err());
/// ```
#[derive(Debug, Clone, Default)]
pub struct ConversationMemory {
    storage: HashMap<String, Vec<Turn>>,
    preamble: Preamble,
}

impl ConversationMemory {
    /// Creates an empty memory with the given preamble
    pub fn new(preamble: Preamble) -> Self {
        Self {
            storage: HashMap::new(),
            preamble,
        }
    }

    /// Appends a turn to an identity's history
    ///
    /// An identity with no turns (never seen, or cleared with
    /// [`remove`](Self::remove)) is seeded with the preamble first.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidTurn` if the turn is invalid; the
    /// identity's history is left unchanged
    pub fn append(&mut self, identity: &str, turn: Turn) -> Result<()> {
        turn.validate()?;
        let turns = self.storage.entry(identity.to_string()).or_default();
        if turns.is_empty() {
            *turns = self.preamble.seed();
            tracing::debug!(identity = %identity, "Seeded conversation preamble");
        }
        turns.push(turn);
        Ok(())
    }

    /// Turns recorded for an identity
    ///
    /// # Errors
    ///
    /// Returns `SessionError::UnknownIdentity` if the identity was never
    /// initialized
    pub fn get(&self, identity: &str) -> Result<&[Turn]> {
        self.storage
            .get(identity)
            .map(Vec::as_slice)
            .ok_or_else(|| {
                SessionError::UnknownIdentity(format!("User {} does not exist.", identity)).into()
            })
    }

    /// Clears an identity's history
    ///
    /// The identity stays known, so [`get`](Self::get) returns an empty
    /// slice afterwards. Removing an unknown identity is a no-op.
    pub fn remove(&mut self, identity: &str) {
        if let Some(turns) = self.storage.get_mut(identity) {
            turns.clear();
        }
    }

    /// Replaces an identity's history with the given turns
    pub fn restore(&mut self, identity: &str, turns: Vec<Turn>) {
        self.storage.insert(identity.to_string(), turns);
    }

    /// Whether the identity has been initialized
    pub fn contains(&self, identity: &str) -> bool {
        self.storage.contains_key(identity)
    }
}

impl fmt::Display for ConversationMemory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Storage: InMemory. Be careful, it will be lost when the program ends."
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::classify;
    use crate::memory::turn::Role;

    fn podcast_prompt() -> Turn {
        Turn::system("You're a podcast assistant.")
    }

    #[test]
    fn test_default_preamble_seed() {
        let seed = Preamble::Default.seed();
        assert_eq!(seed, vec![Turn::system(DEFAULT_SYSTEM_PROMPT)]);
    }

    #[test]
    fn test_preamble_turn_seed() {
        let seed = Preamble::Turn(podcast_prompt()).seed();
        assert_eq!(seed, vec![podcast_prompt()]);
    }

    #[test]
    fn test_preamble_turns_seed() {
        let turns = vec![podcast_prompt(), Turn::assistant("Ready.")];
        assert_eq!(Preamble::Turns(turns.clone()).seed(), turns);
    }

    #[test]
    fn test_preamble_string_seed() {
        let seed = Preamble::System("You're a robot.".into()).seed();
        assert_eq!(seed[0].role, Role::System);
        assert_eq!(seed[0].content, "You're a robot.");
    }

    #[test]
    fn test_preamble_deserializes_each_shape() {
        let string: Preamble = serde_yaml::from_str("\"You're a robot.\"").unwrap();
        assert_eq!(string, Preamble::System("You're a robot.".into()));

        let single: Preamble =
            serde_yaml::from_str("role: system\ncontent: You're a robot.").unwrap();
        assert_eq!(single, Preamble::Turn(Turn::system("You're a robot.")));

        let list: Preamble =
            serde_yaml::from_str("- role: system\n  content: a\n- role: assistant\n  content: b")
                .unwrap();
        assert_eq!(
            list,
            Preamble::Turns(vec![Turn::system("a"), Turn::assistant("b")])
        );
    }

    #[test]
    fn test_buffer_starts_empty() {
        let buffer = ConversationBuffer::new(Preamble::Default);
        assert!(buffer.is_empty());
        assert!(!buffer.session_id().is_empty());
    }

    #[test]
    fn test_buffer_append_seeds_and_keeps_order() {
        let mut buffer = ConversationBuffer::new(Preamble::Turn(podcast_prompt()));
        let turns = vec![
            Turn::user("one"),
            Turn::assistant("two"),
            Turn::user("three"),
        ];
        for turn in &turns {
            buffer.append(turn.clone()).unwrap();
        }

        let mut expected = vec![podcast_prompt()];
        expected.extend(turns);
        assert_eq!(buffer.turns(), expected.as_slice());
    }

    #[test]
    fn test_buffer_invalid_turn_leaves_state_unchanged() {
        let mut buffer = ConversationBuffer::new(Preamble::Default);
        let err = buffer.append(Turn::user("")).unwrap_err();
        assert!(matches!(classify(&err), Some(SessionError::InvalidTurn(_))));
        assert!(buffer.is_empty());

        buffer.append(Turn::user("hi")).unwrap();
        let before = buffer.snapshot();
        assert!(buffer.append(Turn::assistant("")).is_err());
        assert_eq!(buffer.turns(), before.as_slice());
    }

    #[test]
    fn test_buffer_remove_rotates_session_id() {
        let mut buffer = ConversationBuffer::new(Preamble::Default);
        buffer.append(Turn::user("hi")).unwrap();
        let first_id = buffer.session_id().to_string();

        buffer.remove();
        assert!(buffer.is_empty());
        assert_ne!(buffer.session_id(), first_id);

        // Removing twice is fine
        buffer.remove();
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_buffer_restore_replaces_contents() {
        let mut buffer = ConversationBuffer::new(Preamble::Default);
        buffer.append(Turn::user("old")).unwrap();

        let restored = vec![Turn::system("custom"), Turn::user("again")];
        buffer.restore(restored.clone());
        assert_eq!(buffer.turns(), restored.as_slice());

        // A restored conversation is not re-seeded
        buffer.append(Turn::assistant("reply")).unwrap();
        assert_eq!(buffer.turns()[0], Turn::system("custom"));
        assert_eq!(buffer.len(), 3);
    }

    #[test]
    fn test_buffer_restore_session_adopts_id() {
        let mut buffer = ConversationBuffer::new(Preamble::Default);
        buffer.restore_session("abc", vec![Turn::user("hi")]);
        assert_eq!(buffer.session_id(), "abc");
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn test_buffer_display() {
        let buffer = ConversationBuffer::new(Preamble::Default);
        assert_eq!(
            buffer.to_string(),
            "Storage: InMemory. Be careful, it will be lost when the program ends."
        );
    }

    #[test]
    fn test_memory_append_default_initialization() {
        let mut memory = ConversationMemory::default();
        memory.append("1458", Turn::user("Hello, how are you?")).unwrap();
        let turns = memory.get("1458").unwrap();
        assert_eq!(
            turns,
            &[
                Turn::system(DEFAULT_SYSTEM_PROMPT),
                Turn::user("Hello, how are you?")
            ]
        );
    }

    #[test]
    fn test_memory_get_unknown_identity() {
        let mut memory = ConversationMemory::default();
        memory.append("1458", Turn::user("hi")).unwrap();
        let err = memory.get("1234").unwrap_err();
        assert!(matches!(
            classify(&err),
            Some(SessionError::UnknownIdentity(_))
        ));
        assert!(err.to_string().contains("User 1234 does not exist."));
    }

    #[test]
    fn test_memory_remove_clears_history() {
        let mut memory = ConversationMemory::default();
        memory.append("1458", Turn::user("hi")).unwrap();
        memory.remove("1458");
        assert!(memory.get("1458").unwrap().is_empty());

        // Next append seeds again
        memory.append("1458", Turn::user("back")).unwrap();
        assert_eq!(memory.get("1458").unwrap().len(), 2);
    }

    #[test]
    fn test_memory_remove_unknown_identity_is_noop() {
        let mut memory = ConversationMemory::default();
        memory.remove("never-seen");
        assert!(!memory.contains("never-seen"));
    }

    #[test]
    fn test_memory_identities_are_isolated() {
        let mut memory = ConversationMemory::new(Preamble::System("p".into()));
        memory.append("a", Turn::user("from a")).unwrap();
        memory.append("b", Turn::user("from b")).unwrap();
        assert_eq!(memory.get("a").unwrap()[1].content, "from a");
        assert_eq!(memory.get("b").unwrap()[1].content, "from b");
    }

    #[test]
    fn test_memory_invalid_turn_does_not_initialize() {
        let mut memory = ConversationMemory::default();
        assert!(memory.append("1458", Turn::user("")).is_err());
        assert!(!memory.contains("1458"));
    }

    #[test]
    fn test_memory_restore() {
        let mut memory = ConversationMemory::default();
        memory.restore("1458", vec![Turn::user("restored")]);
        assert_eq!(memory.get("1458").unwrap(), &[Turn::user("restored")]);
    }
}

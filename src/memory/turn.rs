//! Role-tagged conversation turns

use crate::error::{Result, SessionError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Who produced a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Instructions that frame the conversation
    System,
    /// A human participant
    User,
    /// The agent's reply
    Assistant,
}

impl Role {
    /// Wire name of the role
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = SessionError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "system" => Ok(Role::System),
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            other => Err(SessionError::InvalidTurn(format!("unknown role '{}'", other))),
        }
    }
}

/// One message in a conversation
///
/// Besides `role` and `content`, a turn may carry arbitrary extra fields
/// (for example the speaker's id); they are kept as-is and survive a trip
/// through the durable store.
///
/// # Examples
///
/// ```
/// use sessionkeep::memory::{Role, Turn};
///
/// let turn = Turn::user("Hello, how are you?");
/// assert_eq!(turn.role, Role::User);
/// assert!(turn.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    /// Role of the message sender
    pub role: Role,
    /// Content of the message
    pub content: String,
    /// Additional fields carried alongside the message
    #[serde(flatten, default, skip_serializing_if = "Map::is_empty")]
    pub extra: Map<String, Value>,
}

impl Turn {
    /// Creates a turn with the given role and content
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            extra: Map::new(),
        }
    }

    /// Creates a new system turn
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// Creates a new user turn
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Creates a new assistant turn
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Attaches an extra field to the turn
    ///
    /// `role` and `content` are not extra fields and are ignored here.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let key = key.into();
        if key != "role" && key != "content" {
            self.extra.insert(key, value.into());
        }
        self
    }

    /// Checks that the turn can be appended
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidTurn` when the content is empty
    pub fn validate(&self) -> Result<()> {
        if self.content.is_empty() {
            return Err(SessionError::InvalidTurn("content must not be empty".into()).into());
        }
        Ok(())
    }

    /// Builds a turn from loosely typed JSON, as handed over by a request layer
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidTurn` when the value is not an object,
    /// when `role` is missing or unknown, or when `content` is missing, not a
    /// string, or empty
    ///
    /// # Examples
    ///
    /// ```
    /// use sessionkeep::memory::Turn;
    /// use serde_json::json;
    ///
    /// let turn = Turn::from_value(json!({"role": "user", "content": "hi"})).unwrap();
    /// assert_eq!(turn.content, "hi");
    /// assert!(Turn::from_value(json!({"content": "hi"})).is_err());
    /// ```
    pub fn from_value(value: Value) -> Result<Self> {
        let Value::Object(mut fields) = value else {
            return Err(SessionError::InvalidTurn("message should be an object".into()).into());
        };

        let role = match fields.remove("role") {
            Some(Value::String(role)) if !role.is_empty() => role.parse::<Role>()?,
            _ => {
                return Err(
                    SessionError::InvalidTurn("both 'role' and 'content' are required".into())
                        .into(),
                )
            }
        };

        let content = match fields.remove("content") {
            Some(Value::String(content)) => content,
            _ => {
                return Err(
                    SessionError::InvalidTurn("both 'role' and 'content' are required".into())
                        .into(),
                )
            }
        };

        let turn = Turn {
            role,
            content,
            extra: fields,
        };
        turn.validate()?;
        Ok(turn)
    }
}

use crate::error::{Result, SessionError};
use crate::memory::Turn;
use crate::session::keys::{session_id_from_partition_key, METADATA_SORT_KEY};
use crate::storage::{AttributePatch, AttributeValue, Item, PARTITION_KEY, SORT_KEY};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::sync::OnceLock;

/// Attribute names of the metadata item
pub mod attrs {
    /// Soft-delete flag
    pub const IS_DELETED: &str = "is_deleted";
    /// Owning user
    pub const USER_ID: &str = "user_id";
    /// Human-readable title
    pub const TITLE: &str = "title";
    /// Creation timestamp (ISO-8601)
    pub const CREATED_AT: &str = "created_at";
    /// Turn payload of a message item
    pub const MESSAGE: &str = "message";
}

/// Attributes no patch may ever write
///
/// `session_id` and `messages` are fields of the rendered session and would
/// collide with the flattened extra attributes.
pub const RESERVED_ATTRIBUTES: [&str; 7] = [
    PARTITION_KEY,
    SORT_KEY,
    attrs::IS_DELETED,
    attrs::USER_ID,
    attrs::CREATED_AT,
    "session_id",
    "messages",
];

/// Metadata record of a stored session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionMetadata {
    /// Session identifier (without the partition prefix)
    pub session_id: String,
    /// Owning user
    pub user_id: i64,
    /// Optional human-readable title
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Soft-delete flag
    pub is_deleted: bool,
    /// When the session was created (ISO-8601)
    pub created_at: String,
    /// Any other attributes set through metadata updates
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SessionMetadata {
    /// Reads a metadata item
    ///
    /// # Errors
    ///
    /// Returns `SessionError::StoreUnavailable` if the item does not have the
    /// shape of a session metadata record
    pub fn from_item(item: &Item) -> Result<Self> {
        let malformed = |what: &str| -> anyhow::Error {
            SessionError::StoreUnavailable(format!("malformed metadata record: {}", what)).into()
        };

        let key = item.key()?;
        if key.sk != METADATA_SORT_KEY {
            return Err(malformed("sort key is not METADATA"));
        }
        let session_id = session_id_from_partition_key(&key.pk)
            .ok_or_else(|| malformed("partition key is not a session"))?
            .to_string();
        let user_id = item
            .get(attrs::USER_ID)
            .and_then(AttributeValue::as_i64)
            .ok_or_else(|| malformed("user_id"))?;
        let is_deleted = item
            .get(attrs::IS_DELETED)
            .and_then(AttributeValue::as_bool)
            .ok_or_else(|| malformed("is_deleted"))?;
        let created_at = item
            .get(attrs::CREATED_AT)
            .and_then(AttributeValue::as_str)
            .unwrap_or_default()
            .to_string();
        let title = item
            .get(attrs::TITLE)
            .and_then(AttributeValue::as_str)
            .map(str::to_string);

        let extra = item
            .iter()
            .filter(|(name, _)| {
                !matches!(
                    name.as_str(),
                    PARTITION_KEY
                        | SORT_KEY
                        | attrs::USER_ID
                        | attrs::IS_DELETED
                        | attrs::CREATED_AT
                        | attrs::TITLE
                )
            })
            .map(|(name, value)| (name.clone(), value.to_json()))
            .collect();

        Ok(Self {
            session_id,
            user_id,
            title,
            is_deleted,
            created_at,
            extra,
        })
    }
}

/// A message item as written by an append
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageRecord {
    /// Session the message belongs to
    pub session_id: String,
    /// Sort key of the message item
    pub sort_key: String,
    /// The turn itself
    pub message: Turn,
    /// When the message was written (ISO-8601)
    pub created_at: String,
}

impl MessageRecord {
    /// Reads the turn payload of a message item
    ///
    /// # Errors
    ///
    /// Returns `SessionError::StoreUnavailable` if the item has no valid
    /// `message` attribute
    pub fn turn_from_item(item: &Item) -> Result<Turn> {
        let payload = item.get(attrs::MESSAGE).map(AttributeValue::to_json).ok_or_else(
            || SessionError::StoreUnavailable("malformed message record: message".into()),
        )?;
        serde_json::from_value(payload).map_err(|e| {
            SessionError::StoreUnavailable(format!("malformed message record: {}", e)).into()
        })
    }
}

/// A session as returned by a fetch: metadata plus ordered turns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredSession {
    /// Metadata record
    pub metadata: SessionMetadata,
    /// Turns in append order
    pub messages: Vec<Turn>,
}

/// Compact description of a stored session for listings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    /// Session identifier
    pub session_id: String,
    /// Optional human-readable title
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// When the session was created
    pub created_at: String,
    /// Number of turns stored
    pub message_count: usize,
    /// Other metadata attributes
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub extra: Map<String, Value>,
}

impl From<StoredSession> for SessionSummary {
    fn from(session: StoredSession) -> Self {
        Self {
            session_id: session.metadata.session_id,
            title: session.metadata.title,
            created_at: session.metadata.created_at,
            message_count: session.messages.len(),
            extra: session.metadata.extra,
        }
    }
}

/// Reference to a session that was just created
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionHandle {
    /// Session identifier
    pub session_id: String,
    /// Owning user
    pub user_id: i64,
    /// Title given at save time
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Number of turns written
    pub message_count: usize,
    /// When the session was created (ISO-8601)
    pub created_at: String,
}

/// Which metadata attributes callers may set
///
/// Reserved attributes (`pk`, `sk`, `is_deleted`, `user_id`, `created_at`)
/// can never be allowed.
#[derive(Debug, Clone, PartialEq)]
pub struct MetadataPolicy {
    allowed: BTreeSet<String>,
}

impl MetadataPolicy {
    /// Creates a policy allowing exactly the given attribute names
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Config` if the list is empty, names a reserved
    /// attribute, or contains a name that is not an identifier
    pub fn new<I, S>(allowed: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let allowed: BTreeSet<String> = allowed.into_iter().map(Into::into).collect();
        if allowed.is_empty() {
            return Err(
                SessionError::Config("mutable metadata fields must not be empty".into()).into(),
            );
        }
        for name in &allowed {
            if RESERVED_ATTRIBUTES.contains(&name.as_str()) {
                return Err(SessionError::Config(format!(
                    "metadata field '{}' is reserved and cannot be mutable",
                    name
                ))
                .into());
            }
            if !is_attribute_name(name) {
                return Err(SessionError::Config(format!(
                    "metadata field '{}' is not a valid attribute name",
                    name
                ))
                .into());
            }
        }
        Ok(Self { allowed })
    }

    /// Whether a field may be written
    pub fn allows(&self, field: &str) -> bool {
        self.allowed.contains(field)
    }

    /// Allowed field names in sorted order
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.allowed.iter().map(String::as_str)
    }
}

impl Default for MetadataPolicy {
    fn default() -> Self {
        Self {
            allowed: default_mutable_fields().into_iter().collect(),
        }
    }
}

/// Metadata fields callers may update unless configured otherwise
pub fn default_mutable_fields() -> Vec<String> {
    ["title", "summary", "tags", "topic", "episode", "language"]
        .into_iter()
        .map(str::to_string)
        .collect()
}

fn is_attribute_name(name: &str) -> bool {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid regex"))
        .is_match(name)
}

/// Validated metadata update
///
/// Every field becomes an attribute of the metadata item (SET semantics,
/// not a merge into a nested map).
///
/// # Examples
///
/// ```
/// use sessionkeep::session::{MetadataPatch, MetadataPolicy};
/// use serde_json::json;
///
/// let policy = MetadataPolicy::default();
/// let patch = MetadataPatch::from_json(&json!({"title": "Episode 1"}), &policy).unwrap();
/// assert_eq!(patch.len(), 1);
///
/// assert!(MetadataPatch::from_json(&json!({"is_deleted": true}), &policy).is_err());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct MetadataPatch {
    fields: Vec<(String, AttributeValue)>,
}

impl MetadataPatch {
    /// Validates field assignments against a policy
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Validation` if the patch is empty, writes a
    /// field outside the policy, sets a non-string title, or carries an
    /// unrepresentable number
    pub fn new<I>(fields: I, policy: &MetadataPolicy) -> Result<Self>
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        let mut validated = Vec::new();
        for (name, value) in fields {
            if !policy.allows(&name) {
                return Err(SessionError::Validation(format!(
                    "metadata field '{}' cannot be updated",
                    name
                ))
                .into());
            }
            if name == attrs::TITLE && !value.is_string() {
                return Err(SessionError::Validation(format!(
                    "metadata field '{}' must be a string",
                    name
                ))
                .into());
            }
            validated.push((name, AttributeValue::from_json(&value)?));
        }
        if validated.is_empty() {
            return Err(SessionError::Validation("Body is required".into()).into());
        }
        Ok(Self { fields: validated })
    }

    /// Validates a JSON object as a patch
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Validation` if the value is not an object or
    /// fails [`MetadataPatch::new`]
    pub fn from_json(value: &Value, policy: &MetadataPolicy) -> Result<Self> {
        let Value::Object(fields) = value else {
            return Err(
                SessionError::Validation("metadata patch must be an object".into()).into(),
            );
        };
        Self::new(
            fields.iter().map(|(k, v)| (k.clone(), v.clone())),
            policy,
        )
    }

    /// Number of fields set
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Always false for a validated patch
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Storage-level patch
    pub fn to_attribute_patch(&self) -> AttributePatch {
        self.fields
            .iter()
            .fold(AttributePatch::new(), |patch, (name, value)| {
                patch.set(name.clone(), value.clone())
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::classify;
    use crate::storage::ItemKey;
    use serde_json::json;

    fn metadata_item() -> Item {
        Item::new(&ItemKey::new("SESSION#abc", METADATA_SORT_KEY))
            .with(attrs::USER_ID, 42i64)
            .with(attrs::IS_DELETED, false)
            .with(attrs::CREATED_AT, "2024-03-09T07:05:01.000042")
            .with(attrs::TITLE, "Episode 1")
            .with("rating", AttributeValue::from_json(&json!(4.5)).unwrap())
    }

    #[test]
    fn test_metadata_from_item() {
        let metadata = SessionMetadata::from_item(&metadata_item()).unwrap();
        assert_eq!(metadata.session_id, "abc");
        assert_eq!(metadata.user_id, 42);
        assert!(!metadata.is_deleted);
        assert_eq!(metadata.title.as_deref(), Some("Episode 1"));
        assert_eq!(metadata.extra.get("rating"), Some(&json!(4.5)));
        assert!(!metadata.extra.contains_key("pk"));
    }

    #[test]
    fn test_metadata_from_item_requires_user_id() {
        let mut item = metadata_item();
        item.remove(attrs::USER_ID);
        let err = SessionMetadata::from_item(&item).unwrap_err();
        assert!(matches!(
            classify(&err),
            Some(SessionError::StoreUnavailable(_))
        ));
    }

    #[test]
    fn test_turn_from_message_item() {
        let turn = Turn::user("hi");
        let item = Item::new(&ItemKey::new("SESSION#abc", "MESSAGE_1")).with(
            attrs::MESSAGE,
            AttributeValue::from_json(&serde_json::to_value(&turn).unwrap()).unwrap(),
        );
        assert_eq!(MessageRecord::turn_from_item(&item).unwrap(), turn);
    }

    #[test]
    fn test_policy_rejects_reserved_fields() {
        for reserved in RESERVED_ATTRIBUTES {
            assert!(MetadataPolicy::new([reserved]).is_err());
        }
    }

    #[test]
    fn test_policy_rejects_empty_and_invalid_names() {
        assert!(MetadataPolicy::new(Vec::<String>::new()).is_err());
        assert!(MetadataPolicy::new(["title = :x"]).is_err());
    }

    #[test]
    fn test_default_policy_allows_title() {
        let policy = MetadataPolicy::default();
        assert!(policy.allows("title"));
        assert!(!policy.allows("is_deleted"));
    }

    #[test]
    fn test_patch_rejects_unlisted_field() {
        let policy = MetadataPolicy::new(["title"]).unwrap();
        let err = MetadataPatch::from_json(&json!({"title": "x", "summary": "y"}), &policy)
            .unwrap_err();
        assert!(matches!(classify(&err), Some(SessionError::Validation(_))));
    }

    #[test]
    fn test_patch_rejects_empty_body() {
        let policy = MetadataPolicy::default();
        assert!(MetadataPatch::from_json(&json!({}), &policy).is_err());
        assert!(MetadataPatch::from_json(&json!("title"), &policy).is_err());
    }

    #[test]
    fn test_patch_rejects_non_string_title() {
        let policy = MetadataPolicy::default();
        for title in [json!(42), json!(null), json!(["a"]), json!({"text": "a"})] {
            let err = MetadataPatch::from_json(&json!({ "title": title }), &policy).unwrap_err();
            assert!(matches!(classify(&err), Some(SessionError::Validation(_))));
        }
        assert!(MetadataPatch::from_json(&json!({"title": "Episode 1"}), &policy).is_ok());
    }

    #[test]
    fn test_policy_rejects_rendered_field_names() {
        assert!(MetadataPolicy::new(["title", "session_id"]).is_err());
        assert!(MetadataPolicy::new(["messages"]).is_err());
    }

    #[test]
    fn test_patch_to_attribute_patch() {
        let policy = MetadataPolicy::default();
        let patch =
            MetadataPatch::from_json(&json!({"title": "Episode 1", "episode": 3}), &policy)
                .unwrap();
        let mut item = metadata_item();
        patch.to_attribute_patch().apply_to(&mut item);
        assert_eq!(item.get("episode").and_then(AttributeValue::as_i64), Some(3));
    }

    #[test]
    fn test_summary_from_stored_session() {
        let session = StoredSession {
            metadata: SessionMetadata::from_item(&metadata_item()).unwrap(),
            messages: vec![Turn::user("a"), Turn::assistant("b")],
        };
        let summary = SessionSummary::from(session);
        assert_eq!(summary.session_id, "abc");
        assert_eq!(summary.message_count, 2);
    }
}

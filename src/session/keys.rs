//! Session key scheme
//!
//! A session lives in the partition `SESSION#{session_id}`. Its metadata is
//! the item with sort key `METADATA`; each message is an item with sort key
//! `MESSAGE_{timestamp}` where the timestamp is fixed-width and
//! most-significant-first, so string order equals chronological order.

use crate::error::{Result, SessionError};
use chrono::{DateTime, Duration, Utc};
use std::sync::Mutex;

/// Prefix of every session partition key
pub const PARTITION_PREFIX: &str = "SESSION#";

/// Sort key of the metadata item
pub const METADATA_SORT_KEY: &str = "METADATA";

/// Prefix of every message sort key
pub const MESSAGE_SORT_KEY_PREFIX: &str = "MESSAGE_";

/// Fixed-width, microsecond-precision timestamp used in message sort keys
const SORTABLE_TIMESTAMP: &str = "%Y%m%d%H%M%S%6f";

/// Partition key of a session
///
/// # Examples
///
/// ```
/// use sessionkeep::session::keys::partition_key;
///
/// assert_eq!(partition_key("abc"), "SESSION#abc");
/// ```
pub fn partition_key(session_id: &str) -> String {
    format!("{}{}", PARTITION_PREFIX, session_id)
}

/// Session id encoded in a partition key, if it is a session partition
pub fn session_id_from_partition_key(pk: &str) -> Option<&str> {
    pk.strip_prefix(PARTITION_PREFIX)
}

/// Sort key for a message appended at `now`
///
/// Two calls within the same microsecond produce the same key; use a
/// [`MessageClock`] to get strictly increasing keys.
///
/// # Examples
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use sessionkeep::session::keys::message_sort_key;
///
/// let now = Utc.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
/// assert_eq!(message_sort_key(now), "MESSAGE_20240309070501000000");
/// ```
pub fn message_sort_key(now: DateTime<Utc>) -> String {
    format!(
        "{}{}",
        MESSAGE_SORT_KEY_PREFIX,
        now.format(SORTABLE_TIMESTAMP)
    )
}

/// Checks a caller-supplied session id
///
/// # Errors
///
/// Returns `SessionError::Validation` if the id is empty or contains
/// control characters
pub fn validate_session_id(session_id: &str) -> Result<()> {
    if session_id.is_empty() {
        return Err(SessionError::Validation("session_id is required".into()).into());
    }
    if session_id.chars().any(char::is_control) {
        return Err(SessionError::Validation(
            "session_id must not contain control characters".into(),
        )
        .into());
    }
    Ok(())
}

/// Source of message timestamps that never repeats within one instance
///
/// Each call reads the wall clock once. If the reading is not later than the
/// previous timestamp handed out, the previous one plus a microsecond is used
/// instead. Instances in different processes are not coordinated.
#[derive(Debug, Default)]
pub struct MessageClock {
    last: Mutex<Option<DateTime<Utc>>>,
}

impl MessageClock {
    /// Creates a clock that has not handed out any timestamp yet
    pub fn new() -> Self {
        Self::default()
    }

    /// Next timestamp, strictly after every earlier one from this clock
    pub fn next(&self) -> DateTime<Utc> {
        self.next_after(Utc::now())
    }

    /// Next message sort key
    pub fn next_sort_key(&self) -> String {
        message_sort_key(self.next())
    }

    fn next_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let mut last = self.last.lock().unwrap_or_else(|e| e.into_inner());
        let next = match *last {
            Some(prev) if now <= prev => {
                tracing::debug!("Clock did not advance, bumping message timestamp");
                prev + Duration::microseconds(1)
            }
            _ => now,
        };
        *last = Some(next);
        next
    }
}

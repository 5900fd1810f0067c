//! Handlers for the session subcommands
//!
//! Each handler drives one [`SessionService`] operation and renders the
//! result either as a table or, with `--json`, as pretty-printed JSON.

use crate::commands::history;
use crate::error::{Result, SessionError};
use crate::memory::{ConversationBuffer, Preamble, Role, Turn};
use crate::session::keys::validate_session_id;
use crate::session::SessionService;
use colored::Colorize;
use serde_json::{Map, Value};
use std::path::Path;

/// Appends one turn to a stored session
pub async fn append(
    service: &SessionService,
    session_id: &str,
    content: String,
    user_id: i64,
    role: &str,
    json: bool,
) -> Result<()> {
    let role: Role = role.parse()?;
    let record = service
        .append_message(session_id, Turn::new(role, content), user_id)
        .await?;

    if json {
        history::print_json(&record)?;
    } else {
        println!(
            "{} {} to session {}",
            "Appended".green(),
            record.sort_key,
            record.session_id.cyan()
        );
    }
    Ok(())
}

/// Shows a session with its turns
pub async fn show(service: &SessionService, session_id: &str, json: bool) -> Result<()> {
    let session = service.get_session(session_id).await?;
    if json {
        history::print_json(&session)?;
    } else {
        history::print_session(&session);
    }
    Ok(())
}

/// Lists the sessions of one user, or every live session when `user_id` is
/// `None`
pub async fn list(service: &SessionService, user_id: Option<i64>, json: bool) -> Result<()> {
    match user_id {
        Some(user_id) => {
            let summaries = service.list_sessions(user_id).await?;
            if json {
                history::print_json(&summaries)?;
            } else {
                history::print_summaries(&summaries);
            }
        }
        None => {
            let sessions = service.list_all_sessions().await?;
            if json {
                history::print_json(&sessions)?;
            } else {
                history::print_metadata(&sessions);
            }
        }
    }
    Ok(())
}

/// Applies `key=value` assignments to a session's metadata
pub async fn update(
    service: &SessionService,
    session_id: &str,
    assignments: &[String],
    json: bool,
) -> Result<()> {
    let patch = parse_assignments(assignments)?;
    let metadata = service.update_metadata(session_id, &patch).await?;

    if json {
        history::print_json(&metadata)?;
    } else {
        println!("{} session {}", "Updated".green(), metadata.session_id.cyan());
    }
    Ok(())
}

/// Soft-deletes a session
pub async fn delete(service: &SessionService, session_id: &str) -> Result<()> {
    service.delete_session(session_id).await?;
    println!("{}", format!("Deleted session {}", session_id).green());
    Ok(())
}

/// Removes every message of a session
pub async fn clear(service: &SessionService, session_id: &str) -> Result<()> {
    let deleted = service.clear_messages(session_id).await?;
    println!(
        "{}",
        format!("Cleared {} message(s) from session {}", deleted, session_id).green()
    );
    Ok(())
}

/// Options of the `save` subcommand
#[derive(Debug, Clone)]
pub struct SaveArgs {
    /// JSON file holding an array of turns
    pub file: std::path::PathBuf,
    /// Owner of the new session
    pub user_id: i64,
    /// Optional title
    pub title: Option<String>,
    /// Session id to save under instead of a generated one
    pub session_id: Option<String>,
    /// Store the turns exactly as given
    pub verbatim: bool,
    /// Print JSON instead of a message
    pub json: bool,
}

/// Builds a conversation from a file and saves it as a new session
///
/// Unless `verbatim` is set the turns are appended to a fresh buffer, so the
/// configured preamble is seeded ahead of them.
pub async fn save(service: &SessionService, preamble: Preamble, args: SaveArgs) -> Result<()> {
    let turns = read_turns(&args.file)?;

    let mut buffer = ConversationBuffer::new(preamble);
    if let Some(session_id) = args.session_id {
        validate_session_id(&session_id)?;
        buffer.restore_session(session_id, Vec::new());
    }
    if args.verbatim {
        let session_id = buffer.session_id().to_string();
        buffer.restore_session(session_id, turns);
    } else {
        for turn in turns {
            buffer.append(turn)?;
        }
    }

    let handle = service
        .save_session(&mut buffer, args.user_id, args.title.as_deref())
        .await?;

    if args.json {
        history::print_json(&handle)?;
    } else {
        println!(
            "{} {} ({} message(s))",
            "Saved session".green(),
            handle.session_id.cyan(),
            handle.message_count
        );
    }
    Ok(())
}

/// Loads a session into a fresh buffer and prints the restored turns
pub async fn restore(
    service: &SessionService,
    preamble: Preamble,
    session_id: &str,
    json: bool,
) -> Result<()> {
    let mut buffer = ConversationBuffer::new(preamble);
    let turns = service.restore_session(session_id, &mut buffer).await?;
    tracing::debug!(
        session_id = buffer.session_id(),
        turns = buffer.len(),
        "Buffer restored"
    );

    if json {
        history::print_json(&turns)?;
    } else {
        println!("{} {}", "Restored session".green(), session_id.cyan());
        history::print_turns(&turns);
    }
    Ok(())
}

/// Parses `key=value` pairs into a JSON object
///
/// Values are parsed as JSON when they can be (`3`, `true`, `["a"]`) and
/// kept as plain strings otherwise.
pub fn parse_assignments(assignments: &[String]) -> Result<Value> {
    let mut fields = Map::new();
    for assignment in assignments {
        let (key, raw) = assignment.split_once('=').ok_or_else(|| {
            SessionError::Validation(format!("expected KEY=VALUE, got '{}'", assignment))
        })?;
        let key = key.trim();
        if key.is_empty() {
            return Err(
                SessionError::Validation(format!("missing key in '{}'", assignment)).into(),
            );
        }
        let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        fields.insert(key.to_string(), value);
    }
    Ok(Value::Object(fields))
}

/// Reads a JSON array of turns from a file
pub fn read_turns(path: &Path) -> Result<Vec<Turn>> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
        SessionError::Validation(format!("Failed to read {}: {}", path.display(), e))
    })?;
    let value: Value = serde_json::from_str(&contents).map_err(|e| {
        SessionError::Validation(format!("Failed to parse {}: {}", path.display(), e))
    })?;
    let Value::Array(items) = value else {
        return Err(SessionError::Validation(format!(
            "{} must contain a JSON array of turns",
            path.display()
        ))
        .into());
    };
    items.into_iter().map(Turn::from_value).collect()
}

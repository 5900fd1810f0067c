//! Terminal rendering of sessions and turns

use crate::error::{Result, SessionError};
use crate::memory::{Role, Turn};
use crate::session::{SessionMetadata, SessionSummary, StoredSession};
use colored::{ColoredString, Colorize};
use prettytable::{format, Table};
use serde::Serialize;

const TITLE_WIDTH: usize = 40;
const CONTENT_WIDTH: usize = 72;

/// Shortens `text` to at most `width` characters, marking the cut with `...`
fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return text.to_string();
    }
    let kept: String = text.chars().take(width.saturating_sub(3)).collect();
    format!("{}...", kept)
}

fn role_label(role: Role) -> ColoredString {
    match role {
        Role::System => role.as_str().magenta(),
        Role::User => role.as_str().green(),
        Role::Assistant => role.as_str().blue(),
    }
}

fn new_table() -> Table {
    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_BORDERS_ONLY);
    table
}

/// Prints any serializable value as pretty JSON
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).map_err(SessionError::Serialization)?;
    println!("{}", json);
    Ok(())
}

/// Prints turns as a numbered table
pub fn print_turns(turns: &[Turn]) {
    if turns.is_empty() {
        println!("{}", "No messages.".yellow());
        return;
    }

    let mut table = new_table();
    table.add_row(prettytable::row!["#".bold(), "Role".bold(), "Content".bold()]);
    for (index, turn) in turns.iter().enumerate() {
        let content = truncate(&turn.content.replace('\n', " "), CONTENT_WIDTH);
        table.add_row(prettytable::row![index + 1, role_label(turn.role), content]);
    }
    table.printstd();
}

/// Prints a session's metadata followed by its turns
pub fn print_session(session: &StoredSession) {
    let metadata = &session.metadata;
    println!();
    println!("{} {}", "Session:".bold(), metadata.session_id.cyan());
    println!("{} {}", "User:".bold(), metadata.user_id);
    if let Some(title) = &metadata.title {
        println!("{} {}", "Title:".bold(), title);
    }
    println!("{} {}", "Created:".bold(), metadata.created_at);
    for (name, value) in &metadata.extra {
        println!("{} {}", format!("{}:", name).bold(), value);
    }
    println!();
    print_turns(&session.messages);
    println!();
}

/// Prints session summaries of one user
pub fn print_summaries(summaries: &[SessionSummary]) {
    if summaries.is_empty() {
        println!("{}", "No sessions found.".yellow());
        return;
    }

    let mut table = new_table();
    table.add_row(prettytable::row![
        "ID".bold(),
        "Title".bold(),
        "Messages".bold(),
        "Created".bold()
    ]);
    for summary in summaries {
        let title = summary
            .title
            .as_deref()
            .map(|t| truncate(t, TITLE_WIDTH))
            .unwrap_or_else(|| "-".to_string());
        table.add_row(prettytable::row![
            summary.session_id.cyan(),
            title,
            summary.message_count,
            summary.created_at
        ]);
    }

    println!("\nSessions:");
    table.printstd();
    println!();
    println!(
        "Use {} to load a session.",
        "sessionkeep restore <ID>".cyan()
    );
    println!();
}

/// Prints metadata of sessions across users
pub fn print_metadata(sessions: &[SessionMetadata]) {
    if sessions.is_empty() {
        println!("{}", "No sessions found.".yellow());
        return;
    }

    let mut table = new_table();
    table.add_row(prettytable::row![
        "ID".bold(),
        "User".bold(),
        "Title".bold(),
        "Created".bold()
    ]);
    for metadata in sessions {
        let title = metadata
            .title
            .as_deref()
            .map(|t| truncate(t, TITLE_WIDTH))
            .unwrap_or_else(|| "-".to_string());
        table.add_row(prettytable::row![
            metadata.session_id.cyan(),
            metadata.user_id,
            title,
            metadata.created_at
        ]);
    }

    println!("\nSessions:");
    table.printstd();
    println!();
}

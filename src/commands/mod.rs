/*!
Command handlers for the CLI

This module provides command handlers invoked by the CLI entrypoint.

- `sessions`: one handler per session subcommand
- `history`: table and JSON rendering of sessions and turns

[`run`] opens the configured store once, dispatches a single command, and
closes the store again before returning.
*/

use crate::cli::Commands;
use crate::config::Config;
use crate::error::Result;
use crate::session::{SessionService, SessionStore};
use crate::storage::open_store;
use std::sync::Arc;

pub mod history;
pub mod sessions;

/// Opens the session service described by the configuration
///
/// # Errors
///
/// Returns error if the metadata policy is invalid or the store cannot be
/// opened
pub fn open_service(config: &Config) -> Result<SessionService> {
    let policy = config.session.policy()?;
    let table = open_store(&config.storage)?;
    Ok(SessionService::new(Arc::new(SessionStore::with_policy(
        table, policy,
    ))))
}

/// Execute one CLI command against the configured store
///
/// # Arguments
///
/// * `config` - Validated configuration
/// * `command` - Parsed subcommand
///
/// # Errors
///
/// Returns the command's error; the store is closed in either case
pub async fn run(config: Config, command: Commands) -> Result<()> {
    let service = open_service(&config)?;
    let result = dispatch(&service, config, command).await;

    if let Err(e) = service.close().await {
        tracing::warn!("Failed to close session store: {}", e);
    }
    result
}

async fn dispatch(service: &SessionService, config: Config, command: Commands) -> Result<()> {
    match command {
        Commands::Append {
            session_id,
            content,
            user_id,
            role,
            json,
        } => {
            tracing::debug!("Appending {} turn to session {}", role, session_id);
            sessions::append(service, &session_id, content, user_id, &role, json).await
        }
        Commands::Show { session_id, json } => sessions::show(service, &session_id, json).await,
        Commands::List { user_id, all, json } => {
            if all {
                tracing::debug!("Listing every session");
            }
            sessions::list(service, user_id, json).await
        }
        Commands::Update {
            session_id,
            set,
            json,
        } => sessions::update(service, &session_id, &set, json).await,
        Commands::Delete { session_id } => sessions::delete(service, &session_id).await,
        Commands::Clear { session_id } => sessions::clear(service, &session_id).await,
        Commands::Save {
            file,
            user_id,
            title,
            session_id,
            verbatim,
            json,
        } => {
            tracing::debug!("Saving conversation from {}", file.display());
            let args = sessions::SaveArgs {
                file,
                user_id,
                title,
                session_id,
                verbatim,
                json,
            };
            sessions::save(service, config.buffer.preamble, args).await
        }
        Commands::Restore { session_id, json } => {
            sessions::restore(service, config.buffer.preamble, &session_id, json).await
        }
    }
}

//! Command-line interface definition for sessionkeep
//!
//! This module defines the CLI structure using clap's derive API. Each
//! subcommand maps onto one session operation.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// sessionkeep - durable conversation sessions
///
/// Append turns to stored sessions, inspect them, and save or restore whole
/// conversations.
#[derive(Parser, Debug, Clone)]
#[command(name = "sessionkeep")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(
        short,
        long,
        env = "SESSIONKEEP_CONFIG",
        default_value = "config/config.yaml"
    )]
    pub config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub json_logs: bool,

    /// Override the storage location from the config file
    #[arg(long)]
    pub storage_path: Option<PathBuf>,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for sessionkeep
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Append a turn to a session, creating it on first use
    Append {
        /// Session identifier
        session_id: String,

        /// Turn content
        content: String,

        /// Owner recorded when the session is created
        #[arg(short, long)]
        user_id: i64,

        /// Turn role (system, user, assistant)
        #[arg(short, long, default_value = "user")]
        role: String,

        /// Print the written record as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show a session's metadata and turns
    Show {
        /// Session identifier
        session_id: String,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// List sessions of a user, or every session
    List {
        /// Only sessions owned by this user
        #[arg(short, long, required_unless_present = "all", conflicts_with = "all")]
        user_id: Option<i64>,

        /// Every live session regardless of owner
        #[arg(long)]
        all: bool,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Set metadata attributes of a session
    Update {
        /// Session identifier
        session_id: String,

        /// Attribute assignment as key=value; the value is parsed as JSON
        /// when possible and kept as a string otherwise
        #[arg(short, long = "set", value_name = "KEY=VALUE", required = true)]
        set: Vec<String>,

        /// Print the updated metadata as JSON
        #[arg(long)]
        json: bool,
    },

    /// Soft-delete a session
    Delete {
        /// Session identifier
        session_id: String,
    },

    /// Delete every message of a session, keeping its metadata
    Clear {
        /// Session identifier
        session_id: String,
    },

    /// Save a conversation read from a JSON file as a new session
    Save {
        /// JSON file holding an array of turns
        #[arg(short, long)]
        file: PathBuf,

        /// Owner of the new session
        #[arg(short, long)]
        user_id: i64,

        /// Session title
        #[arg(short, long)]
        title: Option<String>,

        /// Session identifier; a fresh one is generated when omitted
        #[arg(long)]
        session_id: Option<String>,

        /// Store the turns as given instead of seeding the configured preamble
        #[arg(long)]
        verbatim: bool,

        /// Print the session handle as JSON
        #[arg(long)]
        json: bool,
    },

    /// Load a stored session into a conversation buffer and print its turns
    Restore {
        /// Session identifier
        session_id: String,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
}

impl Cli {
    /// Parse command line arguments
    ///
    /// # Returns
    ///
    /// Returns the parsed CLI structure
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

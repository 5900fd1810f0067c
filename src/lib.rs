//! sessionkeep - conversation memory and durable sessions
//!
//! This library lets a conversational agent keep a running dialogue both in
//! process memory and in a partitioned key-value store, so a conversation can
//! be paused and resumed across restarts.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `memory`: role-tagged turns and in-process conversation buffers
//! - `storage`: ordered key-value backends (sled, SQLite, memory)
//! - `session`: key scheme, durable session store, and save/restore service
//! - `config`: Configuration management and validation
//! - `error`: Error types and result aliases
//! - `cli` / `commands`: the operator command-line interface
//!
//! # Example
//!
//! ```
//! use sessionkeep::memory::{ConversationBuffer, Preamble, Turn};
//! use sessionkeep::session::{SessionService, SessionStore};
//! use sessionkeep::storage::MemoryTable;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = SessionStore::new(Arc::new(MemoryTable::new()));
//!     let service = SessionService::new(Arc::new(store));
//!
//!     let mut buffer = ConversationBuffer::new(Preamble::default());
//!     buffer.append(Turn::user("Hello"))?;
//!     let handle = service.save_session(&mut buffer, 42, Some("Greeting")).await?;
//!
//!     service.restore_session(&handle.session_id, &mut buffer).await?;
//!     assert_eq!(buffer.len(), 2);
//!     service.close().await?;
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod memory;
pub mod session;
pub mod storage;

// Re-export commonly used types
pub use config::Config;
pub use error::{Result, SessionError};
pub use memory::{ConversationBuffer, ConversationMemory, Preamble, Role, Turn};
pub use session::{SessionService, SessionStore};

#[cfg(test)]
pub mod test_utils;

//! Ephemeral conversation memory
//!
//! Turns and the in-process buffers that hold a live conversation. Nothing
//! here touches the durable store; see [`crate::session`] for that.

pub mod buffer;
pub mod turn;

pub use buffer::{ConversationBuffer, ConversationMemory, Preamble, DEFAULT_SYSTEM_PROMPT};
pub use turn::{Role, Turn};

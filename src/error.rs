//! Error types for Sessionkeep
//!
//! This module defines all error types used throughout the crate,
//! using `thiserror` for ergonomic error handling.
//!
//! Operations return [`Result`], an `anyhow::Result` whose error carries a
//! [`SessionError`]. Callers that need to tell client faults from server
//! faults recover it with `downcast_ref::<SessionError>()` or [`classify`].

use thiserror::Error;

/// Main error type for Sessionkeep operations
///
/// Covers buffer misuse, request validation, missing or colliding sessions,
/// backend failures, and the ambient configuration/serialization errors.
#[derive(Error, Debug)]
pub enum SessionError {
    /// Malformed or missing required fields (caller's fault, never retried)
    #[error("Validation error: {0}")]
    Validation(String),

    /// No matching non-deleted session or metadata record
    #[error("Session not found: {0}")]
    NotFound(String),

    /// A save collided with a session that already has records
    #[error("Session already exists: {0}")]
    AlreadyExists(String),

    /// Transient backend failure (database operations)
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// A turn without a usable role or content was handed to a buffer
    #[error("Invalid turn: {0}")]
    InvalidTurn(String),

    /// The multi-identity buffer was asked for an identity it never saw
    #[error("Unknown identity: {0}")]
    UnknownIdentity(String),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl SessionError {
    /// Whether the failure was caused by the caller (4xx-style) rather than
    /// by the service or its store (5xx-style)
    ///
    /// # Examples
    ///
    /// ```
    /// use sessionkeep::error::SessionError;
    ///
    /// assert!(SessionError::NotFound("abc".into()).is_client_fault());
    /// assert!(!SessionError::StoreUnavailable("disk".into()).is_client_fault());
    /// ```
    pub fn is_client_fault(&self) -> bool {
        matches!(
            self,
            SessionError::Validation(_)
                | SessionError::NotFound(_)
                | SessionError::AlreadyExists(_)
                | SessionError::InvalidTurn(_)
                | SessionError::UnknownIdentity(_)
                | SessionError::Config(_)
                | SessionError::Yaml(_)
        )
    }

    /// Message that is safe to show to an end user
    ///
    /// Client faults carry their own description. Server faults collapse to
    /// a generic message so internal error text never leaks.
    pub fn public_message(&self) -> String {
        match self {
            SessionError::NotFound(_) => "The specified resource was not found.".to_string(),
            SessionError::AlreadyExists(_) => {
                "Session already exists. You can't save it again. You can only update metadata."
                    .to_string()
            }
            err if err.is_client_fault() => err.to_string(),
            _ => "Internal server error.".to_string(),
        }
    }
}

/// Find the [`SessionError`] inside an `anyhow` error chain, if any
pub fn classify(err: &anyhow::Error) -> Option<&SessionError> {
    err.chain().find_map(|cause| cause.downcast_ref::<SessionError>())
}

/// Result type alias for Sessionkeep operations
///
/// This is a convenience alias that uses `anyhow::Error` as the error type,
/// allowing for rich error context and easy error propagation.
pub type Result<T> = anyhow::Result<T>;

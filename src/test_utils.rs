//! Test utilities for sessionkeep
//!
//! This module provides common test utilities including temporary files,
//! ready-made stores, and assertion helpers.

use crate::config::Config;
use crate::error::{classify, SessionError};
use crate::session::{SessionService, SessionStore};
use crate::storage::MemoryTable;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

/// Create a temporary directory for testing
///
/// # Returns
///
/// Returns a TempDir that will be cleaned up when dropped
pub fn temp_dir() -> TempDir {
    TempDir::new().expect("Failed to create temporary directory")
}

/// Write `contents` to a file inside a fresh temporary directory
///
/// # Returns
///
/// Returns the directory guard and the file path; the file disappears when
/// the guard is dropped
pub fn temp_config_file(contents: &str) -> (TempDir, PathBuf) {
    let dir = temp_dir();
    let path = dir.path().join("config.yaml");
    std::fs::write(&path, contents).expect("Failed to write test file");
    (dir, path)
}

/// Session service over a fresh in-memory table
pub fn memory_service() -> SessionService {
    SessionService::new(Arc::new(SessionStore::new(Arc::new(MemoryTable::new()))))
}

/// Assert that an error carries the expected [`SessionError`] variant
///
/// # Panics
///
/// Panics if the result is Ok or if the error chain holds no matching
/// `SessionError`
pub fn assert_session_error<T: std::fmt::Debug>(
    result: crate::error::Result<T>,
    matches: impl Fn(&SessionError) -> bool,
) {
    match result {
        Ok(value) => panic!("Expected a session error but got Ok({:?})", value),
        Err(err) => {
            let found = classify(&err);
            assert!(
                found.is_some_and(|e| matches(e)),
                "Unexpected error: {:#}",
                err
            );
        }
    }
}

/// Create a test configuration backed by process memory
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.storage.backend = crate::config::StorageBackend::Memory;
    config
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_temp_config_file() {
        let (_dir, path) = temp_config_file("storage:\n  backend: memory\n");
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("memory"));
    }

    #[test]
    fn test_assert_session_error_success() {
        let result: crate::error::Result<()> =
            Err(SessionError::NotFound("abc".to_string()).into());
        assert_session_error(result, |e| matches!(e, SessionError::NotFound(_)));
    }

    #[test]
    #[should_panic(expected = "Expected a session error")]
    fn test_assert_session_error_ok() {
        assert_session_error(Ok(()), |_| true);
    }

    #[test]
    fn test_test_config() {
        let config = test_config();
        assert!(config.validate().is_ok());
    }
}

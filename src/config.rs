//! Configuration management for sessionkeep
//!
//! This module handles loading, parsing, validating, and managing
//! configuration from files, environment variables, and CLI overrides.

use crate::error::{Result, SessionError};
use crate::memory::Preamble;
use crate::session::{default_mutable_fields, MetadataPolicy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Main configuration structure for sessionkeep
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Where sessions are persisted
    #[serde(default)]
    pub storage: StorageConfig,
    /// Live conversation buffer settings
    #[serde(default)]
    pub buffer: BufferConfig,
    /// Session store behavior
    #[serde(default)]
    pub session: SessionConfig,
}

/// Storage backend selection
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Backend to open
    #[serde(default)]
    pub backend: StorageBackend,
    /// Database location; a per-user data directory is used when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

/// Available key-value backends
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Embedded sled database
    #[default]
    Sled,
    /// SQLite database file
    Sqlite,
    /// Process memory, lost on exit
    Memory,
}

impl StorageBackend {
    /// Every accepted backend name
    pub const NAMES: [&'static str; 3] = ["sled", "sqlite", "memory"];

    /// Configuration name of the backend
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageBackend::Sled => "sled",
            StorageBackend::Sqlite => "sqlite",
            StorageBackend::Memory => "memory",
        }
    }
}

impl fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StorageBackend {
    type Err = SessionError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sled" => Ok(StorageBackend::Sled),
            "sqlite" => Ok(StorageBackend::Sqlite),
            "memory" => Ok(StorageBackend::Memory),
            other => Err(SessionError::Config(format!(
                "Invalid storage backend: {}. Must be one of: {}",
                other,
                Self::NAMES.join(", ")
            ))),
        }
    }
}

/// Conversation buffer configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BufferConfig {
    /// Turns placed at the head of every new conversation
    #[serde(default)]
    pub preamble: Preamble,
}

/// Session store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Metadata fields callers are allowed to update
    #[serde(default = "default_mutable_fields")]
    pub mutable_metadata_fields: Vec<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            mutable_metadata_fields: default_mutable_fields(),
        }
    }
}

impl SessionConfig {
    /// Metadata policy built from the configured allow-list
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Config` if the allow-list is empty or names a
    /// reserved attribute
    pub fn policy(&self) -> Result<MetadataPolicy> {
        MetadataPolicy::new(self.mutable_metadata_fields.iter().cloned())
    }
}

impl Config {
    /// Load configuration from file with environment and CLI overrides
    ///
    /// # Arguments
    ///
    /// * `path` - Path to configuration file
    /// * `cli` - CLI arguments for overrides
    ///
    /// # Returns
    ///
    /// Returns the loaded and merged configuration
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or parsed, or if an
    /// environment override is invalid
    pub fn load(path: &str, cli: &crate::cli::Cli) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            Self::from_file(path)?
        } else {
            tracing::warn!("Config file not found at {}, using defaults", path);
            Self::default()
        };

        config.apply_env_vars()?;
        config.apply_cli_overrides(cli);

        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| SessionError::Config(format!("Failed to read config file: {}", e)))?;
        serde_yaml::from_str(&contents)
            .map_err(|e| SessionError::Config(format!("Failed to parse config: {}", e)).into())
    }

    fn apply_env_vars(&mut self) -> Result<()> {
        if let Ok(backend) = std::env::var("SESSIONKEEP_STORAGE_BACKEND") {
            self.storage.backend = backend.parse()?;
        }

        if let Ok(path) = std::env::var("SESSIONKEEP_STORAGE_PATH") {
            if path.is_empty() {
                tracing::warn!("Ignoring empty SESSIONKEEP_STORAGE_PATH");
            } else {
                self.storage.path = Some(PathBuf::from(path));
            }
        }

        if let Ok(prompt) = std::env::var("SESSIONKEEP_SYSTEM_PROMPT") {
            self.buffer.preamble = Preamble::System(prompt);
        }

        Ok(())
    }

    fn apply_cli_overrides(&mut self, cli: &crate::cli::Cli) {
        if cli.verbose {
            tracing::debug!("Verbose mode enabled");
        }

        if let Some(path) = &cli.storage_path {
            tracing::debug!("Using storage path override from CLI: {}", path.display());
            self.storage.path = Some(path.clone());
        }
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns error if the preamble contains an invalid turn or the mutable
    /// metadata allow-list is empty or names a reserved attribute
    pub fn validate(&self) -> Result<()> {
        for turn in self.buffer.preamble.seed() {
            turn.validate().map_err(|e| {
                SessionError::Config(format!("buffer.preamble contains an invalid turn: {}", e))
            })?;
        }

        self.session.policy()?;

        if let Some(path) = &self.storage.path {
            if path.as_os_str().is_empty() {
                return Err(SessionError::Config("storage.path cannot be empty".to_string()).into());
            }
        }

        Ok(())
    }
}

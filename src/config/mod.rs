//! Configuration system for taskwatch
//!
//! Supports loading configuration from:
//! 1. CLI --config argument
//! 2. ~/.config/taskwatch/config.json
//! 3. Default values
//!
//! Environment variables override config file values:
//! - TASKWATCH_DB_PATH
//! - TASKWATCH_CACHE_RETENTION_SECS

use crate::cache::DEFAULT_RETENTION_SECS;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse config JSON: {0}")]
    ParseError(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path of the SQLite database holding tasks and signals
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// How long unevicted progress cache entries stay alive
    #[serde(default = "default_cache_retention_secs")]
    pub cache_retention_secs: u64,

    /// Maximum number of main tasks returned by list queries
    #[serde(default = "default_list_limit")]
    pub list_limit: i64,
}

fn default_database_path() -> PathBuf {
    if let Some(data_dir) = dirs::data_dir() {
        data_dir.join("taskwatch").join("taskwatch.db")
    } else {
        PathBuf::from("taskwatch.db")
    }
}

fn default_cache_retention_secs() -> u64 {
    DEFAULT_RETENTION_SECS
}

fn default_list_limit() -> i64 {
    100
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            cache_retention_secs: default_cache_retention_secs(),
            list_limit: default_list_limit(),
        }
    }
}

impl AppConfig {
    /// Load configuration with default priority
    pub fn load(explicit_path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match explicit_path {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_config_path() {
                Some(path) if path.exists() => Self::from_file(&path)?,
                _ => Self::default(),
            },
        };

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a specific file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("taskwatch").join("config.json"))
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("TASKWATCH_DB_PATH") {
            self.database_path = PathBuf::from(path);
        }
        if let Ok(retention) = std::env::var("TASKWATCH_CACHE_RETENTION_SECS") {
            if let Ok(secs) = retention.parse() {
                self.cache_retention_secs = secs;
            }
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache_retention_secs == 0 {
            return Err(ConfigError::ValidationError(
                "cache_retention_secs must be greater than zero".to_string(),
            ));
        }
        if self.list_limit <= 0 {
            return Err(ConfigError::ValidationError(
                "list_limit must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

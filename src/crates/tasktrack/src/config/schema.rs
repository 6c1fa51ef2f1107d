//! Configuration schema for tasktrack

use crate::db::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Directory under the home directory that holds user-level state
pub const APP_DIR: &str = ".tasktrack";

/// Main tasktrack configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct TaskTrackConfig {
    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Contention retry configuration
    #[serde(default)]
    pub retry: RetryConfig,

    /// Change notification configuration
    #[serde(default)]
    pub events: EventsConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Database configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Database file path (relative to ~/.tasktrack or absolute)
    pub path: String,

    /// Maximum pooled connections
    pub max_connections: u32,

    /// How long SQLite itself waits on a lock before reporting busy
    pub busy_timeout_ms: u64,

    /// Optional schema file executed once at startup
    pub schema_path: Option<PathBuf>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "tasks.db".to_string(),
            max_connections: 5,
            busy_timeout_ms: 5000,
            schema_path: None,
        }
    }
}

impl DatabaseConfig {
    /// Get the resolved database path
    ///
    /// If path is relative, resolves it relative to ~/.tasktrack
    pub fn resolved_path(&self) -> PathBuf {
        let path = PathBuf::from(&self.path);

        if path.is_absolute() {
            return path;
        }

        match dirs::home_dir() {
            Some(home) => home.join(APP_DIR).join(path),
            None => path,
        }
    }
}

/// Contention retry configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the first attempt on busy/locked errors
    pub max_retries: usize,

    /// Fixed delay between attempts in milliseconds
    pub delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            delay_ms: 50,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, Duration::from_millis(self.delay_ms))
    }
}

/// Change notification configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    /// Broadcast channel capacity; slow subscribers lag past this
    pub capacity: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self { capacity: 256 }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error"
    pub level: String,

    /// Log format: "compact", "pretty", "json"
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "compact".to_string(),
        }
    }
}

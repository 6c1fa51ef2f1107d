//! Configuration loader with layered sources
//!
//! Loads configuration from:
//! 1. Default values
//! 2. User-level config: ~/.tasktrack/tasktrack.toml
//! 3. Project-level config: ./.tasktrack/tasktrack.toml
//! 4. Environment overrides (`TASKTRACK_DB_PATH`, `TASKTRACK_LOG`)
//!
//! Later layers override only the keys they set.

use crate::config::schema::{TaskTrackConfig, APP_DIR};
use crate::error::{Result, TaskError};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

/// Config file name in both the user and project directories
pub const CONFIG_FILE: &str = "tasktrack.toml";

/// Environment variable overriding `database.path`
pub const ENV_DB_PATH: &str = "TASKTRACK_DB_PATH";

/// Environment variable overriding `logging.level`
pub const ENV_LOG_LEVEL: &str = "TASKTRACK_LOG";

/// Configuration loader that handles user, project and explicit files
pub struct ConfigLoader {
    user_config_path: Option<PathBuf>,
    project_config_path: Option<PathBuf>,
    extra_config_path: Option<PathBuf>,
}

impl ConfigLoader {
    /// Create a loader for the standard user and project locations
    pub fn new() -> Self {
        Self {
            user_config_path: dirs::home_dir().map(|home| home.join(APP_DIR).join(CONFIG_FILE)),
            project_config_path: std::env::current_dir()
                .ok()
                .map(|cwd| cwd.join(APP_DIR).join(CONFIG_FILE)),
            extra_config_path: None,
        }
    }

    /// Add an explicit config file that overrides the standard locations.
    ///
    /// Unlike the standard locations, this file must exist.
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.extra_config_path = Some(path.into());
        self
    }

    /// Load and merge every layer, then apply environment overrides
    pub async fn load(&self) -> Result<TaskTrackConfig> {
        let mut merged = toml::Table::new();
        info!("Loading configuration with defaults");

        for path in [&self.user_config_path, &self.project_config_path]
            .into_iter()
            .flatten()
        {
            if !path.exists() {
                debug!(path = %path.display(), "Config file not found, skipping");
                continue;
            }
            let table = Self::read_table(path).await?;
            debug!(path = %path.display(), "Loaded config layer");
            merge_tables(&mut merged, table);
        }

        if let Some(path) = &self.extra_config_path {
            if !path.exists() {
                return Err(TaskError::Config(format!(
                    "Config file not found: {}",
                    path.display()
                )));
            }
            merge_tables(&mut merged, Self::read_table(path).await?);
        }

        let mut config: TaskTrackConfig = toml::Value::Table(merged)
            .try_into()
            .map_err(|e| TaskError::Config(format!("Invalid configuration: {}", e)))?;

        apply_env_overrides(&mut config, |key| std::env::var(key).ok());

        info!("Configuration loaded successfully");
        Ok(config)
    }

    async fn read_table(path: &Path) -> Result<toml::Table> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| TaskError::Config(format!("Failed to read config: {}", e)))?;

        content.parse::<toml::Table>().map_err(|e| {
            TaskError::Config(format!("Failed to parse config {}: {}", path.display(), e))
        })
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Recursively merge `overlay` into `base`; overlay wins on leaf keys
fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(base_table)), toml::Value::Table(overlay_table)) => {
                merge_tables(base_table, overlay_table);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

/// Apply environment overrides using `lookup` to read variables
pub fn apply_env_overrides(config: &mut TaskTrackConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(path) = lookup(ENV_DB_PATH).filter(|v| !v.is_empty()) {
        config.database.path = path;
    }
    if let Some(level) = lookup(ENV_LOG_LEVEL).filter(|v| !v.is_empty()) {
        config.logging.level = level;
    }
}

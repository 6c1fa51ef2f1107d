//! Configuration management for tasktrack
//!
//! Supports layered configuration:
//! - User-level: ~/.tasktrack/tasktrack.toml
//! - Project-level: ./.tasktrack/tasktrack.toml
//! - Environment overrides
//!
//! Project-level config overrides user-level config.

mod loader;
mod schema;

pub use loader::{apply_env_overrides, ConfigLoader, CONFIG_FILE, ENV_DB_PATH, ENV_LOG_LEVEL};
pub use schema::{
    DatabaseConfig, EventsConfig, LoggingConfig, RetryConfig, TaskTrackConfig, APP_DIR,
};

use crate::Result;

/// Load configuration from the standard locations
pub async fn load_config() -> Result<TaskTrackConfig> {
    ConfigLoader::new().load().await
}

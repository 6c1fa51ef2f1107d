//! First-time setup
//!
//! Creates the tasktrack home directory and a commented default
//! configuration file. The database itself is created and migrated by
//! [`Database::initialize`](crate::db::Database::initialize).

use crate::config::{APP_DIR, CONFIG_FILE};
use crate::error::{Result, TaskError};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Get the tasktrack home directory (~/.tasktrack)
pub fn get_home() -> Result<PathBuf> {
    dirs::home_dir()
        .map(|home| home.join(APP_DIR))
        .ok_or_else(|| TaskError::Config("Could not determine home directory".to_string()))
}

/// Create `home` and write the default configuration into it.
///
/// An existing configuration is kept unless `force` is set. Returns the
/// configuration file path.
pub fn initialize(home: &Path, force: bool) -> Result<PathBuf> {
    info!(path = %home.display(), "Initializing tasktrack");

    if !home.exists() {
        fs::create_dir_all(home)
            .map_err(|e| TaskError::Config(format!("Failed to create directory: {}", e)))?;
        info!(path = %home.display(), "Created home directory");
    }

    let config_path = home.join(CONFIG_FILE);
    if !config_path.exists() || force {
        create_default_config(&config_path)?;
        info!(path = %config_path.display(), "Created default configuration");
    } else {
        warn!(path = %config_path.display(), "Configuration already exists (use --force to overwrite)");
    }

    Ok(config_path)
}

fn create_default_config(path: &Path) -> Result<()> {
    let default_config = r#"# tasktrack configuration
#
# User-level settings. Project-specific overrides can be placed in
# ./.tasktrack/tasktrack.toml

[database]
# Database file path (relative to ~/.tasktrack, or absolute)
path = "tasks.db"

# Maximum pooled connections
max_connections = 5

# How long SQLite waits on a lock before reporting busy (milliseconds)
busy_timeout_ms = 5000

# Optional schema file executed at startup
# schema_path = "./schema/database_schema.sql"

[retry]
# Extra attempts after a busy/locked failure
max_retries = 3

# Fixed delay between attempts (milliseconds)
delay_ms = 50

[events]
# Change notifications buffered per subscriber
capacity = 256

[logging]
# Log level: "trace", "debug", "info", "warn", "error"
level = "info"

# Log format: "compact", "pretty", "json"
format = "compact"
"#;

    fs::write(path, default_config)
        .map_err(|e| TaskError::Config(format!("Failed to write configuration: {}", e)))?;

    Ok(())
}

//! Database management and schema bootstrap
//!
//! Wraps the embedded SQLite store: opens the pool in WAL mode, runs the
//! embedded migrations plus an optional schema file, and hands out
//! [`Session`]s that carry the contention retry policy.

pub mod retry;
pub mod session;

pub use retry::{is_contention, RetryPolicy};
pub use session::{Session, SqlValue, Statement, TransactionScope};

use crate::config::DatabaseConfig;
use crate::error::{Result, TaskError};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::Executor;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

/// Type alias for the database connection pool
pub type DatabasePool = SqlitePool;

/// Database connection wrapper
#[derive(Clone, Debug)]
pub struct Database {
    pool: DatabasePool,
    retry: RetryPolicy,
}

impl Database {
    /// Open the store at `config.path` in WAL mode.
    ///
    /// Creates the parent directory and the database file if missing.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let path = config.resolved_path();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    TaskError::Connection(format!("Failed to create database directory: {}", e))
                })?;
            }
        }

        let path_str = path
            .to_str()
            .ok_or_else(|| TaskError::Connection("Invalid database path".to_string()))?;
        let database_url = format!("sqlite:{}", path_str);
        debug!(url = %database_url, "Connecting to database");

        let options = SqliteConnectOptions::from_str(&database_url)
            .map_err(|e| TaskError::Connection(format!("Invalid database url: {}", e)))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_millis(config.busy_timeout_ms));

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await
            .map_err(|e| TaskError::Connection(format!("Failed to connect to database: {}", e)))?;

        info!(path = %path.display(), "Database connection established");

        Ok(Self {
            pool,
            retry: RetryPolicy::default(),
        })
    }

    /// Connect, run the embedded migrations, then the configured schema file
    pub async fn initialize(config: &DatabaseConfig) -> Result<Self> {
        let db = Self::connect(config).await?;
        db.run_migrations().await?;
        if let Some(schema_path) = &config.schema_path {
            db.apply_schema_file(schema_path).await?;
        }
        Ok(db)
    }

    /// Replace the contention retry policy
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &DatabasePool {
        &self.pool
    }

    /// Start an autocommit session
    pub fn session(&self) -> Session {
        Session::new(self.pool.clone(), self.retry.clone())
    }

    /// Run the embedded migrations in ./migrations
    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations");

        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| TaskError::SchemaExecution(format!("Migration failed: {}", e)))?;

        info!("Database migrations completed successfully");
        Ok(())
    }

    /// Execute a schema definition file if it exists.
    ///
    /// A missing file is skipped; a file that fails to execute is fatal.
    pub async fn apply_schema_file(&self, schema_path: impl AsRef<Path>) -> Result<()> {
        let schema_path = schema_path.as_ref();
        if !schema_path.exists() {
            debug!(path = %schema_path.display(), "No schema file, skipping");
            return Ok(());
        }

        let schema = tokio::fs::read_to_string(schema_path).await.map_err(|e| {
            TaskError::SchemaExecution(format!(
                "Failed to read schema {}: {}",
                schema_path.display(),
                e
            ))
        })?;

        self.pool
            .execute(schema.as_str())
            .await
            .map_err(|e| TaskError::SchemaExecution(format!("Failed to execute schema: {}", e)))?;

        info!(path = %schema_path.display(), "Schema file applied");
        Ok(())
    }

    /// Perform a health check by running a simple query
    pub async fn health_check(&self) -> Result<()> {
        self.session()
            .query(&Statement::new("SELECT 1"))
            .await
            .map_err(|e| TaskError::database("Health check failed", e))?;
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.pool.is_closed()
    }

    /// Checkpoint the WAL and close every connection.
    ///
    /// Calling this on an already closed database is a no-op.
    pub async fn close(&self) -> Result<()> {
        if self.pool.is_closed() {
            return Ok(());
        }

        self.pool
            .execute("PRAGMA wal_checkpoint(TRUNCATE)")
            .await
            .map_err(|e| TaskError::Connection(format!("Failed to close database: {}", e)))?;

        self.pool.close().await;
        info!("Database connection closed");
        Ok(())
    }
}

//! Common test utilities and setup

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tasktrack::{Database, DatabaseConfig, RetryPolicy, TaskService};
use tempfile::TempDir;

static TEST_DB_COUNTER: AtomicUsize = AtomicUsize::new(0);

/// Database config pointing at a unique file inside `dir`
pub fn test_config(dir: &TempDir) -> DatabaseConfig {
    let counter = TEST_DB_COUNTER.fetch_add(1, Ordering::SeqCst);
    let db_path = dir.path().join(format!("test_{}.db", counter));

    DatabaseConfig {
        path: db_path.to_string_lossy().into_owned(),
        ..Default::default()
    }
}

/// Create a migrated test database
pub async fn setup_test_db() -> (TempDir, Database) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let db = Database::initialize(&test_config(&temp_dir))
        .await
        .expect("Failed to create test database");

    (temp_dir, db)
}

/// Create a migrated database where SQLite never waits on a lock itself,
/// so contention surfaces straight to the retry policy
pub async fn setup_contended_db(retry: RetryPolicy) -> (TempDir, Database) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let config = DatabaseConfig {
        busy_timeout_ms: 0,
        ..test_config(&temp_dir)
    };
    let db = Database::initialize(&config)
        .await
        .expect("Failed to create test database")
        .with_retry_policy(retry);

    (temp_dir, db)
}

/// Create a task service over a fresh database
pub async fn setup_test_service() -> (TempDir, TaskService) {
    let (temp_dir, db) = setup_test_db().await;
    (temp_dir, TaskService::new(db))
}

/// Retry policy with the standard budget
pub fn standard_retry() -> RetryPolicy {
    RetryPolicy::new(3, Duration::from_millis(50))
}

//! Error types for tasktrack
//!
//! Provides a unified error type for storage, validation, hierarchy and
//! state-machine failures.

use crate::models::TaskStatus;
use thiserror::Error;

/// Result type alias for tasktrack operations
pub type Result<T> = std::result::Result<T, TaskError>;

/// Main error type for tasktrack operations
#[derive(Debug, Error)]
pub enum TaskError {
    /// The store could not be opened, or could not be closed cleanly
    #[error("Database connection error: {0}")]
    Connection(String),

    /// Schema bootstrap (migrations or schema file) failed
    #[error("Schema execution failed: {0}")]
    SchemaExecution(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Caller supplied an invalid value
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The task being read or mutated does not exist
    #[error("Task not found: {0}")]
    TaskNotFound(i64),

    /// The referenced parent task does not exist
    #[error("Parent task not found: {0}")]
    ParentTaskNotFound(i64),

    /// Re-parenting would introduce a cycle
    #[error("Circular dependency: {0}")]
    CircularDependency(String),

    /// Transition not allowed by the task state machine
    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: TaskStatus, to: TaskStatus },

    /// Storage failure with operation context
    #[error("{context}: {source}")]
    Database {
        context: String,
        #[source]
        source: sqlx::Error,
    },

    /// Storage failure surfaced unchanged (contention after the retry budget)
    #[error(transparent)]
    Storage(sqlx::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The store lives on a read-only file system
    #[error("File system is read-only: {0}")]
    FileSystemReadOnly(String),

    /// The store ran out of disk space
    #[error("Disk is full: {0}")]
    DiskFull(String),
}

impl TaskError {
    /// Wrap a storage error with the operation that produced it.
    ///
    /// Contention errors are kept as-is so callers see the familiar
    /// busy/locked error once the retry budget is spent.
    pub fn database(context: impl Into<String>, source: sqlx::Error) -> Self {
        if crate::db::retry::is_contention(&source) {
            TaskError::Storage(source)
        } else {
            TaskError::Database {
                context: context.into(),
                source,
            }
        }
    }

    /// Check if the underlying storage error is a busy/locked condition
    pub fn is_contention(&self) -> bool {
        match self {
            TaskError::Storage(err) | TaskError::Database { source: err, .. } => {
                crate::db::retry::is_contention(err)
            }
            _ => false,
        }
    }

    /// Check if this is a task or parent-task not found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, TaskError::TaskNotFound(_) | TaskError::ParentTaskNotFound(_))
    }
}

impl From<sqlx::Error> for TaskError {
    fn from(err: sqlx::Error) -> Self {
        TaskError::Storage(err)
    }
}

impl From<sqlx::migrate::MigrateError> for TaskError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        TaskError::SchemaExecution(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_kinds_are_distinct() {
        let task = TaskError::TaskNotFound(7);
        let parent = TaskError::ParentTaskNotFound(7);

        assert!(task.is_not_found());
        assert!(parent.is_not_found());
        assert_eq!(task.to_string(), "Task not found: 7");
        assert_eq!(parent.to_string(), "Parent task not found: 7");
    }

    #[test]
    fn test_transition_message() {
        let err = TaskError::InvalidStateTransition {
            from: TaskStatus::Completed,
            to: TaskStatus::InProgress,
        };
        assert_eq!(
            err.to_string(),
            "Invalid state transition from COMPLETED to IN_PROGRESS"
        );
    }

    #[test]
    fn test_database_error_keeps_context() {
        let err = TaskError::database("Failed to create task", sqlx::Error::RowNotFound);
        assert!(err.to_string().starts_with("Failed to create task: "));
        assert!(!err.is_contention());
    }
}

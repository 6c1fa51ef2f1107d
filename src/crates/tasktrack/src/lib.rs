//! # tasktrack - Background Task Lifecycle Tracking
//!
//! Persistence-backed bookkeeping for long-running background work such as
//! playlist imports and video downloads. Work executors register tasks,
//! report progress and finish them; tasktrack enforces the lifecycle state
//! machine, keeps parent tasks aggregated from their children, and
//! notifies subscribers of every committed change.
//!
//! ## Features
//!
//! - **SQLite Store** - WAL journaling, embedded migrations, bounded retry on busy/locked
//! - **Explicit Transactions** - [`Session`] threads an open transaction through nested calls
//! - **State Machine** - illegal transitions are rejected before any write
//! - **Parent Aggregation** - a parent's progress and final status follow its children
//! - **Change Notifications** - [`TaskEvent`] snapshots over a broadcast channel
//! - **Layered Config** - user-level and project-level TOML plus env overrides
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tasktrack::{Database, DatabaseConfig, NewTask, TaskService, TaskStatus, TaskType};
//!
//! # async fn example() -> tasktrack::Result<()> {
//! let db = Database::initialize(&DatabaseConfig::default()).await?;
//! let service = TaskService::new(db);
//! service.resume_unfinished_tasks().await?;
//!
//! let import = service
//!     .create_task(NewTask::new(TaskType::ImportPlaylist, "Road trip mix"))
//!     .await?;
//! service.update_task_progress(import.id, 0.5).await?;
//! service.update_task_status(import.id, TaskStatus::Completed).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Startup
//!
//! Hosts bootstrap the schema once with [`Database::initialize`], then call
//! [`TaskService::resume_unfinished_tasks`] once before any executor starts
//! reporting.

pub mod config;
pub mod db;
pub mod events;
pub mod init;
pub mod logging;
pub mod models;
pub mod repositories;
pub mod services;

mod error;

// Error types
pub use error::{Result, TaskError};

// Re-export database and config types
pub use config::{load_config, ConfigLoader, DatabaseConfig, TaskTrackConfig};
pub use db::{Database, RetryPolicy, Session, Statement, TransactionScope};

// Re-export models
pub use models::{NewTask, Task, TaskStatus, TaskType, TaskUpdate};

// Re-export repositories and services
pub use repositories::TaskRepository;
pub use services::{TaskCache, TaskService};

// Re-export event types
pub use events::{EventPublisher, TaskEvent};

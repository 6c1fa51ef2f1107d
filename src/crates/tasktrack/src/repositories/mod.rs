//! Database repositories
//!
//! Row shaping for the `background_tasks` table. Business rules live in
//! the services.

pub mod task_repository;

pub use task_repository::{encode_timestamp, task_from_row, TaskRepository};

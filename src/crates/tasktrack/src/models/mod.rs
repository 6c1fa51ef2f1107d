//! Domain models for tasktrack

pub mod task;

pub use task::{NewTask, Task, TaskStatus, TaskType, TaskUpdate};

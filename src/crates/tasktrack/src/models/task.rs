//! Background task model and lifecycle state machine

use crate::error::{Result, TaskError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of work a task tracks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskType {
    /// Import every item of a remote playlist
    ImportPlaylist,
    /// Download a single video
    DownloadVideo,
    /// Re-sync an already imported playlist
    RefreshPlaylist,
}

impl TaskType {
    pub const ALL: [TaskType; 3] = [
        TaskType::ImportPlaylist,
        TaskType::DownloadVideo,
        TaskType::RefreshPlaylist,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ImportPlaylist => "IMPORT_PLAYLIST",
            Self::DownloadVideo => "DOWNLOAD_VIDEO",
            Self::RefreshPlaylist => "REFRESH_PLAYLIST",
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskType {
    type Err = TaskError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| TaskError::InvalidInput(format!("Invalid task type: {}", s)))
    }
}

/// Lifecycle status of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Queued,
    InProgress,
    Completed,
    Failed,
    Cancelled,
    CompletedWithErrors,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 6] = [
        TaskStatus::Queued,
        TaskStatus::InProgress,
        TaskStatus::Completed,
        TaskStatus::Failed,
        TaskStatus::Cancelled,
        TaskStatus::CompletedWithErrors,
    ];

    /// Statuses with no outgoing transitions
    pub const TERMINAL: [TaskStatus; 4] = [
        TaskStatus::Completed,
        TaskStatus::Failed,
        TaskStatus::Cancelled,
        TaskStatus::CompletedWithErrors,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "QUEUED",
            Self::InProgress => "IN_PROGRESS",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::Cancelled => "CANCELLED",
            Self::CompletedWithErrors => "COMPLETED_WITH_ERRORS",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Queued | Self::InProgress)
    }

    /// Terminal statuses that make a parent finish with errors
    pub fn is_unsuccessful(&self) -> bool {
        matches!(
            self,
            Self::Failed | Self::Cancelled | Self::CompletedWithErrors
        )
    }

    /// Legal next statuses. Terminal statuses have none.
    pub fn allowed_transitions(&self) -> &'static [TaskStatus] {
        match self {
            Self::Queued => &[
                Self::InProgress,
                Self::Cancelled,
                Self::Failed,
                Self::Completed,
            ],
            Self::InProgress => &[
                Self::Completed,
                Self::Failed,
                Self::Cancelled,
                Self::CompletedWithErrors,
            ],
            Self::Completed | Self::Failed | Self::Cancelled | Self::CompletedWithErrors => &[],
        }
    }

    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        self.allowed_transitions().contains(&next)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = TaskError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| TaskError::InvalidInput(format!("Invalid task status: {}", s)))
    }
}

/// A persisted unit of trackable background work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Store-assigned identifier
    pub id: i64,

    /// Parent task, if this task is part of a larger unit of work
    pub parent_id: Option<i64>,

    pub task_type: TaskType,

    pub title: String,

    pub status: TaskStatus,

    /// Fraction of work done, in [0.0, 1.0]
    pub progress: f64,

    /// Caller-defined metadata, never inspected by this crate
    pub details: Option<serde_json::Value>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,

    /// Set exactly when `status` is terminal
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Input for creating a task.
///
/// `status` and `progress` fall back to `QUEUED` and `0.0` when unset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTask {
    pub task_type: TaskType,
    pub title: String,
    #[serde(default)]
    pub parent_id: Option<i64>,
    #[serde(default)]
    pub details: Option<serde_json::Value>,
    #[serde(default)]
    pub status: Option<TaskStatus>,
    #[serde(default)]
    pub progress: Option<f64>,
}

impl NewTask {
    pub fn new(task_type: TaskType, title: impl Into<String>) -> Self {
        Self {
            task_type,
            title: title.into(),
            parent_id: None,
            details: None,
            status: None,
            progress: None,
        }
    }

    /// Builder method to attach the task to a parent
    pub fn with_parent(mut self, parent_id: i64) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    /// Builder method to set caller metadata
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// Partial update of a task row. `None` leaves the column untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskUpdate {
    pub status: Option<TaskStatus>,
    pub progress: Option<f64>,
    pub parent_id: Option<Option<i64>>,
    pub title: Option<String>,
    pub details: Option<Option<serde_json::Value>>,
}

impl TaskUpdate {
    pub fn status(status: TaskStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn progress(progress: f64) -> Self {
        Self {
            progress: Some(progress),
            ..Default::default()
        }
    }

    pub fn parent(parent_id: Option<i64>) -> Self {
        Self {
            parent_id: Some(parent_id),
            ..Default::default()
        }
    }

    pub fn with_progress(mut self, progress: f64) -> Self {
        self.progress = Some(progress);
        self
    }
}

//! Task change notifications
//!
//! Every committed create, status change, progress tick, re-parent, and
//! parent re-aggregation publishes a [`TaskEvent`] carrying the full task as
//! it was after the mutation. Consumers treat the stream as snapshots.

use crate::models::{Task, TaskStatus};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Event published after a task mutation commits
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "task", rename_all = "snake_case")]
pub enum TaskEvent {
    /// A task was created or changed
    Changed(Task),
}

impl TaskEvent {
    /// Get the task snapshot carried by the event
    pub fn task(&self) -> &Task {
        match self {
            TaskEvent::Changed(task) => task,
        }
    }

    pub fn task_id(&self) -> i64 {
        self.task().id
    }

    pub fn status(&self) -> TaskStatus {
        self.task().status
    }

    /// Get a human-readable description of the event
    pub fn description(&self) -> String {
        let task = self.task();
        format!(
            "Task {} ({}) is {} at {:.0}%",
            task.id,
            task.title,
            task.status,
            task.progress * 100.0
        )
    }
}

/// Fan-out publisher for [`TaskEvent`]s
#[derive(Debug, Clone)]
pub struct EventPublisher {
    sender: broadcast::Sender<TaskEvent>,
}

impl EventPublisher {
    /// Create a publisher whose subscribers lag after `capacity` unread events
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.sender.subscribe()
    }

    /// Publish an event. Having no subscribers is not an error.
    pub fn publish(&self, event: TaskEvent) {
        tracing::trace!(
            task_id = event.task_id(),
            status = %event.status(),
            subscribers = self.sender.receiver_count(),
            "Publishing: {}",
            event.description()
        );
        let _ = self.sender.send(event);
    }
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new(256)
    }
}

//! In-memory view of not-yet-finished tasks
//!
//! The cache is advisory. It is refreshed after commits and read by
//! lookups, but no state-machine or hierarchy check ever trusts it; those
//! always re-read the stored row inside their transaction.

use crate::models::Task;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Shared cache of non-terminal tasks keyed by ID
#[derive(Debug, Clone, Default)]
pub struct TaskCache {
    tasks: Arc<RwLock<HashMap<i64, Task>>>,
}

impl TaskCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: i64) -> Option<Task> {
        self.tasks.read().get(&id).cloned()
    }

    /// Store `task` if it is still active, otherwise evict it
    pub fn apply(&self, task: Task) {
        let mut tasks = self.tasks.write();
        if task.is_terminal() {
            tasks.remove(&task.id);
        } else {
            tasks.insert(task.id, task);
        }
    }

    /// Drop every entry and load `tasks` in their place
    pub fn replace_all(&self, tasks: impl IntoIterator<Item = Task>) {
        let mut cached = self.tasks.write();
        cached.clear();
        cached.extend(
            tasks
                .into_iter()
                .filter(|task| !task.is_terminal())
                .map(|task| (task.id, task)),
        );
    }

    /// Cached tasks ordered by ID
    pub fn values(&self) -> Vec<Task> {
        let mut tasks: Vec<Task> = self.tasks.read().values().cloned().collect();
        tasks.sort_by_key(|task| task.id);
        tasks
    }

    pub fn len(&self) -> usize {
        self.tasks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.read().is_empty()
    }
}

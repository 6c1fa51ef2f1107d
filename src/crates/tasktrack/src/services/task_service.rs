//! Task lifecycle service
//!
//! Owns the state machine, the parent/child rules, and the cache of
//! unfinished tasks. Every mutation runs in one storage transaction
//! together with the parent re-aggregation it causes. Cache refreshes and
//! change events are deferred until that transaction commits.
//!
//! Each mutating operation has an `*_in` form that takes the caller's
//! [`Session`]. If the session is already inside a transaction the
//! operation joins it instead of opening its own.

use crate::db::{Database, Session, TransactionScope};
use crate::error::{Result, TaskError};
use crate::events::{EventPublisher, TaskEvent};
use crate::models::{NewTask, Task, TaskStatus, TaskUpdate};
use crate::repositories::TaskRepository;
use crate::services::TaskCache;
use std::collections::HashSet;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Service for creating and advancing background tasks
#[derive(Clone, Debug)]
pub struct TaskService {
    db: Database,
    repository: TaskRepository,
    cache: TaskCache,
    events: EventPublisher,
}

impl TaskService {
    /// Create a new task service with the default event capacity
    pub fn new(db: Database) -> Self {
        Self::with_events(db, EventPublisher::default())
    }

    /// Create a new task service publishing through `events`
    pub fn with_events(db: Database, events: EventPublisher) -> Self {
        Self {
            db,
            repository: TaskRepository::new(),
            cache: TaskCache::new(),
            events,
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Subscribe to change notifications
    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.events.subscribe()
    }

    /// Register a new task in `QUEUED` with progress `0.0`
    pub async fn create_task(&self, task: NewTask) -> Result<Task> {
        let mut session = self.db.session();
        self.create_task_in(&mut session, task).await
    }

    /// Same as [`Self::create_task`], joining the caller's open transaction if there is one
    pub async fn create_task_in(&self, session: &mut Session, task: NewTask) -> Result<Task> {
        if task.title.trim().is_empty() {
            debug!("Rejected task with empty title");
            return Err(TaskError::InvalidInput(
                "Task title cannot be empty".to_string(),
            ));
        }

        let task = NewTask {
            status: None,
            progress: None,
            ..task
        };

        let mut scope = self.begin(session).await?;

        if let Some(parent_id) = task.parent_id {
            if self.repository.get_by_id(&mut scope, parent_id).await?.is_none() {
                debug!(parent_id, "Rejected task with unknown parent");
                return Err(TaskError::ParentTaskNotFound(parent_id));
            }
        }

        let created = self.repository.create(&mut scope, &task).await?;
        info!(
            task_id = created.id,
            task_type = %created.task_type,
            parent_id = ?created.parent_id,
            "Task created"
        );

        self.notify(&mut scope, created.clone());
        self.sync_parents(&mut scope, created.parent_id).await?;

        commit(scope).await?;
        Ok(created)
    }

    /// Move a task to `status`.
    ///
    /// Asking for the status the task already has succeeds without writing.
    pub async fn update_task_status(&self, id: i64, status: TaskStatus) -> Result<Task> {
        let mut session = self.db.session();
        self.update_task_status_in(&mut session, id, status).await
    }

    /// Same as [`Self::update_task_status`], joining the caller's open transaction if there is one
    pub async fn update_task_status_in(
        &self,
        session: &mut Session,
        id: i64,
        status: TaskStatus,
    ) -> Result<Task> {
        let mut scope = self.begin(session).await?;

        let current = self
            .repository
            .get_by_id(&mut scope, id)
            .await?
            .ok_or(TaskError::TaskNotFound(id))?;

        if current.status == status {
            debug!(task_id = id, status = %status, "Status unchanged");
            commit(scope).await?;
            return Ok(current);
        }

        if !current.status.can_transition_to(status) {
            debug!(task_id = id, from = %current.status, to = %status, "Rejected transition");
            return Err(TaskError::InvalidStateTransition {
                from: current.status,
                to: status,
            });
        }

        let updated = self
            .repository
            .update(&mut scope, id, &TaskUpdate::status(status))
            .await?
            .ok_or(TaskError::TaskNotFound(id))?;

        info!(task_id = id, from = %current.status, to = %status, "Task status changed");

        self.notify(&mut scope, updated.clone());
        self.sync_parents(&mut scope, updated.parent_id).await?;

        commit(scope).await?;
        Ok(updated)
    }

    /// Record progress in `[0.0, 1.0]`.
    ///
    /// A `QUEUED` task reporting progress strictly between 0 and 1 is
    /// promoted to `IN_PROGRESS` in the same write. A terminal task only
    /// accepts exactly `1.0`.
    pub async fn update_task_progress(&self, id: i64, progress: f64) -> Result<Task> {
        let mut session = self.db.session();
        self.update_task_progress_in(&mut session, id, progress).await
    }

    /// Same as [`Self::update_task_progress`], joining the caller's open transaction if there is one
    pub async fn update_task_progress_in(
        &self,
        session: &mut Session,
        id: i64,
        progress: f64,
    ) -> Result<Task> {
        if !progress.is_finite() || !(0.0..=1.0).contains(&progress) {
            debug!(task_id = id, progress, "Rejected progress value");
            return Err(TaskError::InvalidInput(format!(
                "Progress must be between 0.0 and 1.0, got {}",
                progress
            )));
        }

        let mut scope = self.begin(session).await?;

        let current = self
            .repository
            .get_by_id(&mut scope, id)
            .await?
            .ok_or(TaskError::TaskNotFound(id))?;

        if current.is_terminal() && progress < 1.0 {
            debug!(task_id = id, status = %current.status, progress, "Rejected progress on finished task");
            return Err(TaskError::InvalidStateTransition {
                from: current.status,
                to: TaskStatus::InProgress,
            });
        }

        let update = if current.status == TaskStatus::Queued && progress > 0.0 && progress < 1.0 {
            TaskUpdate::status(TaskStatus::InProgress).with_progress(progress)
        } else {
            TaskUpdate::progress(progress)
        };

        let updated = self
            .repository
            .update(&mut scope, id, &update)
            .await?
            .ok_or(TaskError::TaskNotFound(id))?;

        if update.status.is_some() {
            info!(task_id = id, from = %current.status, to = %updated.status, "Task started by progress report");
        }
        debug!(task_id = id, progress, "Task progress updated");

        self.notify(&mut scope, updated.clone());
        self.sync_parents(&mut scope, updated.parent_id).await?;

        commit(scope).await?;
        Ok(updated)
    }

    /// Look a task up, serving active tasks from the cache.
    ///
    /// A task loaded from storage is cached only if it is not terminal.
    pub async fn get_task(&self, id: i64) -> Result<Option<Task>> {
        if let Some(task) = self.cache.get(id) {
            return Ok(Some(task));
        }

        let mut session = self.db.session();
        let task = self.repository.get_by_id(&mut session, id).await?;
        if let Some(task) = &task {
            if !task.is_terminal() {
                self.cache.apply(task.clone());
            }
        }
        Ok(task)
    }

    /// Every task currently held in the unfinished-task cache
    pub fn get_unfinished_tasks(&self) -> Vec<Task> {
        self.cache.values()
    }

    /// All stored tasks, read from storage
    pub async fn list_tasks(&self) -> Result<Vec<Task>> {
        let mut session = self.db.session();
        self.repository.list(&mut session).await
    }

    /// Rebuild the cache from the stored set of unfinished tasks.
    ///
    /// Returns how many tasks were resumed.
    pub async fn resume_unfinished_tasks(&self) -> Result<usize> {
        let mut session = self.db.session();
        let tasks = self.repository.get_unfinished_tasks(&mut session).await?;

        self.cache.replace_all(tasks);
        let count = self.cache.len();
        info!(count, "Resumed unfinished tasks");
        Ok(count)
    }

    /// Attach `task_id` under `new_parent_id`, or detach it with `None`.
    ///
    /// Rejects self-parenting and any move that would make the task its
    /// own ancestor. Both old and new parents are re-aggregated.
    pub async fn update_task_parent(&self, task_id: i64, new_parent_id: Option<i64>) -> Result<Task> {
        let mut session = self.db.session();
        self.update_task_parent_in(&mut session, task_id, new_parent_id)
            .await
    }

    /// Same as [`Self::update_task_parent`], joining the caller's open transaction if there is one
    pub async fn update_task_parent_in(
        &self,
        session: &mut Session,
        task_id: i64,
        new_parent_id: Option<i64>,
    ) -> Result<Task> {
        if new_parent_id == Some(task_id) {
            debug!(task_id, "Rejected self-parenting");
            return Err(TaskError::CircularDependency(format!(
                "Task {} cannot be its own parent",
                task_id
            )));
        }

        let mut scope = self.begin(session).await?;

        let task = self
            .repository
            .get_by_id(&mut scope, task_id)
            .await?
            .ok_or(TaskError::TaskNotFound(task_id))?;

        if let Some(parent_id) = new_parent_id {
            let parent = self
                .repository
                .get_by_id(&mut scope, parent_id)
                .await?
                .ok_or(TaskError::ParentTaskNotFound(parent_id))?;
            self.ensure_not_ancestor(&mut scope, task_id, parent).await?;
        }

        if task.parent_id == new_parent_id {
            commit(scope).await?;
            return Ok(task);
        }

        let updated = self
            .repository
            .update(&mut scope, task_id, &TaskUpdate::parent(new_parent_id))
            .await?
            .ok_or(TaskError::TaskNotFound(task_id))?;

        info!(
            task_id,
            from = ?task.parent_id,
            to = ?new_parent_id,
            "Task parent changed"
        );

        self.notify(&mut scope, updated.clone());
        self.sync_parents(&mut scope, task.parent_id).await?;
        self.sync_parents(&mut scope, new_parent_id).await?;

        commit(scope).await?;
        Ok(updated)
    }

    /// Walk up from `start` and fail if `task_id` is among its ancestors
    async fn ensure_not_ancestor(
        &self,
        session: &mut Session,
        task_id: i64,
        start: Task,
    ) -> Result<()> {
        let mut visited = HashSet::new();
        let mut current = Some(start);

        while let Some(node) = current {
            if node.id == task_id {
                debug!(task_id, "Rejected circular parent");
                return Err(TaskError::CircularDependency(format!(
                    "Task {} is already an ancestor of the new parent",
                    task_id
                )));
            }
            if !visited.insert(node.id) {
                warn!(task_id = node.id, "Existing parent chain loops, stopping walk");
                break;
            }
            current = match node.parent_id {
                Some(parent_id) => self.repository.get_by_id(session, parent_id).await?,
                None => None,
            };
        }

        Ok(())
    }

    /// Re-aggregate `parent_id` from its children, then its ancestors for as
    /// long as each one becomes terminal as a result.
    ///
    /// Progress is the fraction of terminal children and is always written.
    /// Once every child is terminal an active parent finishes as
    /// `COMPLETED`, or `COMPLETED_WITH_ERRORS` if any child did not succeed.
    /// The status of a parent that is already terminal is never changed.
    async fn sync_parents(&self, session: &mut Session, parent_id: Option<i64>) -> Result<()> {
        let mut visited = HashSet::new();
        let mut next = parent_id;

        while let Some(parent_id) = next.take() {
            if !visited.insert(parent_id) {
                warn!(task_id = parent_id, "Parent chain loops, stopping aggregation");
                break;
            }

            let Some(parent) = self.repository.get_by_id(session, parent_id).await? else {
                break;
            };

            let children = self.repository.get_child_tasks(session, parent_id).await?;
            if children.is_empty() {
                break;
            }

            let finished = children.iter().filter(|child| child.is_terminal()).count();
            let mut update = TaskUpdate::progress(finished as f64 / children.len() as f64);
            if !parent.is_terminal() && finished == children.len() {
                let failed = children.iter().any(|child| child.status.is_unsuccessful());
                update.status = Some(if failed {
                    TaskStatus::CompletedWithErrors
                } else {
                    TaskStatus::Completed
                });
            }

            let updated = self
                .repository
                .update(session, parent_id, &update)
                .await?
                .ok_or(TaskError::TaskNotFound(parent_id))?;

            debug!(
                task_id = parent_id,
                finished,
                children = children.len(),
                progress = updated.progress,
                "Parent task aggregated"
            );

            if updated.status != parent.status || updated.progress != parent.progress {
                self.notify(session, updated.clone());
            }

            if updated.is_terminal() && !parent.is_terminal() {
                info!(task_id = parent_id, status = %updated.status, "Parent task finished");
                next = updated.parent_id;
            }
        }

        Ok(())
    }

    async fn begin<'s>(&self, session: &'s mut Session) -> Result<TransactionScope<'s>> {
        let mut scope = session
            .transaction()
            .await
            .map_err(|e| TaskError::database("Failed to begin transaction", e))?;

        if scope.is_owner() {
            self.repository.reserve_write(&mut scope).await?;
        }
        Ok(scope)
    }

    /// Refresh the cache and publish `task` once the transaction commits
    fn notify(&self, session: &mut Session, task: Task) {
        let cache = self.cache.clone();
        let events = self.events.clone();
        session.on_commit(move || {
            cache.apply(task.clone());
            events.publish(TaskEvent::Changed(task));
        });
    }
}

async fn commit(scope: TransactionScope<'_>) -> Result<()> {
    scope
        .commit()
        .await
        .map_err(|e| TaskError::database("Failed to commit transaction", e))
}

//! Task repository for database operations
//!
//! Every method takes the [`Session`] it runs on, so the same call works
//! on an autocommit session or inside a caller's open transaction.

use crate::db::{Session, SqlValue, Statement};
use crate::error::{Result, TaskError};
use crate::models::{NewTask, Task, TaskStatus, TaskUpdate};
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use std::str::FromStr;

/// Repository for background task rows
#[derive(Clone, Debug, Default)]
pub struct TaskRepository;

impl TaskRepository {
    /// Create a new task repository
    pub fn new() -> Self {
        Self
    }

    /// Insert a task and return the row the store produced.
    ///
    /// `status` and `progress` default to `QUEUED` and `0.0`.
    pub async fn create(&self, session: &mut Session, task: &NewTask) -> Result<Task> {
        let now = encode_timestamp(&Utc::now());
        let status = task.status.unwrap_or(TaskStatus::Queued);
        let completed_at = status.is_terminal().then(|| now.clone());

        let stmt = Statement::new(
            "INSERT INTO background_tasks (parent_id, task_type, title, status, progress,
                                           details, created_at, updated_at, completed_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
             RETURNING *",
        )
        .bind(task.parent_id)
        .bind(task.task_type.as_str())
        .bind(task.title.as_str())
        .bind(status.as_str())
        .bind(task.progress.unwrap_or(0.0))
        .bind(encode_details(task.details.as_ref())?)
        .bind(now.as_str())
        .bind(now.as_str())
        .bind(completed_at);

        let row = session
            .query_one(&stmt)
            .await
            .map_err(|e| TaskError::database("Failed to create task", e))?
            .ok_or_else(|| {
                TaskError::database("Failed to create task", sqlx::Error::RowNotFound)
            })?;

        task_from_row(&row)
    }

    /// Load a task by ID
    pub async fn get_by_id(&self, session: &mut Session, id: i64) -> Result<Option<Task>> {
        let stmt = Statement::new("SELECT * FROM background_tasks WHERE id = ?").bind(id);

        session
            .query_one(&stmt)
            .await
            .map_err(|e| TaskError::database("Failed to load task", e))?
            .map(|row| task_from_row(&row))
            .transpose()
    }

    /// All tasks whose status is not terminal, oldest first
    pub async fn get_unfinished_tasks(&self, session: &mut Session) -> Result<Vec<Task>> {
        let placeholders = vec!["?"; TaskStatus::TERMINAL.len()].join(", ");
        let stmt = TaskStatus::TERMINAL.iter().fold(
            Statement::new(format!(
                "SELECT * FROM background_tasks WHERE status NOT IN ({}) ORDER BY id",
                placeholders
            )),
            |stmt, status| stmt.bind(status.as_str()),
        );

        let rows = session
            .query(&stmt)
            .await
            .map_err(|e| TaskError::database("Failed to load unfinished tasks", e))?;

        rows.iter().map(task_from_row).collect()
    }

    /// Apply a partial update and return the updated row.
    ///
    /// Always stamps `updated_at`. Setting a terminal status stamps
    /// `completed_at`; setting a non-terminal one clears it. Returns
    /// `None` when no row has this ID.
    pub async fn update(
        &self,
        session: &mut Session,
        id: i64,
        update: &TaskUpdate,
    ) -> Result<Option<Task>> {
        let now = encode_timestamp(&Utc::now());
        let mut columns: Vec<&str> = Vec::new();
        let mut values: Vec<SqlValue> = Vec::new();

        if let Some(status) = update.status {
            columns.push("status");
            values.push(status.as_str().into());
            columns.push("completed_at");
            values.push(status.is_terminal().then(|| now.clone()).into());
        }
        if let Some(progress) = update.progress {
            columns.push("progress");
            values.push(progress.into());
        }
        if let Some(parent_id) = update.parent_id {
            columns.push("parent_id");
            values.push(parent_id.into());
        }
        if let Some(title) = &update.title {
            columns.push("title");
            values.push(title.as_str().into());
        }
        if let Some(details) = &update.details {
            columns.push("details");
            values.push(encode_details(details.as_ref())?.into());
        }
        columns.push("updated_at");
        values.push(now.into());

        let assignments = columns
            .iter()
            .map(|column| format!("{} = ?", column))
            .collect::<Vec<_>>()
            .join(", ");

        let stmt = values.into_iter().fold(
            Statement::new(format!(
                "UPDATE background_tasks SET {} WHERE id = ? RETURNING *",
                assignments
            )),
            |stmt, value| stmt.bind(value),
        )
        .bind(id);

        session
            .query_one(&stmt)
            .await
            .map_err(|e| TaskError::database("Failed to update task", e))?
            .map(|row| task_from_row(&row))
            .transpose()
    }

    /// Direct children of `parent_id`, oldest first
    pub async fn get_child_tasks(&self, session: &mut Session, parent_id: i64) -> Result<Vec<Task>> {
        let stmt =
            Statement::new("SELECT * FROM background_tasks WHERE parent_id = ? ORDER BY id")
                .bind(parent_id);

        let rows = session
            .query(&stmt)
            .await
            .map_err(|e| TaskError::database("Failed to load child tasks", e))?;

        rows.iter().map(task_from_row).collect()
    }

    /// List all tasks ordered by ID
    pub async fn list(&self, session: &mut Session) -> Result<Vec<Task>> {
        let rows = session
            .query(&Statement::new("SELECT * FROM background_tasks ORDER BY id"))
            .await
            .map_err(|e| TaskError::database("Failed to list tasks", e))?;

        rows.iter().map(task_from_row).collect()
    }

    /// Take the store's write lock for the current transaction.
    ///
    /// SQLite transactions start deferred; a transaction that reads first
    /// and writes later fails with a busy snapshot error if another writer
    /// committed in between. Issuing a write up front makes competing
    /// writers wait on the lock instead.
    pub async fn reserve_write(&self, session: &mut Session) -> Result<()> {
        session
            .execute(&Statement::new(
                "UPDATE background_tasks SET id = id WHERE 0",
            ))
            .await
            .map_err(|e| TaskError::database("Failed to acquire write lock", e))?;
        Ok(())
    }
}

/// Wire form for timestamps: RFC 3339 UTC with microseconds
pub fn encode_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn encode_details(details: Option<&serde_json::Value>) -> Result<Option<String>> {
    details
        .map(serde_json::to_string)
        .transpose()
        .map_err(TaskError::from)
}

fn column_error(column: &str, source: impl std::error::Error + Send + Sync + 'static) -> TaskError {
    TaskError::database(
        "Failed to decode task row",
        sqlx::Error::ColumnDecode {
            index: column.to_string(),
            source: Box::new(source),
        },
    )
}

fn decode_timestamp(row: &SqliteRow, column: &str) -> Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row
        .try_get(column)
        .map_err(|e| TaskError::database("Failed to decode task row", e))?;

    raw.map(|s| {
        DateTime::parse_from_rfc3339(&s)
            .map(|ts| ts.with_timezone(&Utc))
            .map_err(|e| column_error(column, e))
    })
    .transpose()
}

fn decode_enum<T>(row: &SqliteRow, column: &str) -> Result<T>
where
    T: FromStr<Err = TaskError>,
{
    let raw: String = row
        .try_get(column)
        .map_err(|e| TaskError::database("Failed to decode task row", e))?;
    raw.parse().map_err(|e| column_error(column, e))
}

/// Map a `background_tasks` row to a [`Task`]
pub fn task_from_row(row: &SqliteRow) -> Result<Task> {
    let get = |e| TaskError::database("Failed to decode task row", e);

    let details: Option<String> = row.try_get("details").map_err(get)?;
    let details = details
        .map(|raw| serde_json::from_str(&raw))
        .transpose()
        .map_err(|e| column_error("details", e))?;

    let created_at = decode_timestamp(row, "created_at")?
        .ok_or_else(|| column_error("created_at", TaskError::InvalidInput("null timestamp".into())))?;
    let updated_at = decode_timestamp(row, "updated_at")?
        .ok_or_else(|| column_error("updated_at", TaskError::InvalidInput("null timestamp".into())))?;

    Ok(Task {
        id: row.try_get("id").map_err(get)?,
        parent_id: row.try_get("parent_id").map_err(get)?,
        task_type: decode_enum(row, "task_type")?,
        title: row.try_get("title").map_err(get)?,
        status: decode_enum(row, "status")?,
        progress: row.try_get("progress").map_err(get)?,
        details,
        created_at,
        updated_at,
        completed_at: decode_timestamp(row, "completed_at")?,
    })
}

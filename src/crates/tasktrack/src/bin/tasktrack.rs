//! tasktrack CLI - inspect and drive background task bookkeeping
//!
//! Main entry point for the tasktrack command-line tool.

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tasktrack::config::{ConfigLoader, TaskTrackConfig};
use tasktrack::{Database, EventPublisher, NewTask, TaskService, TaskStatus, TaskType};

#[derive(Parser)]
#[command(name = "tasktrack")]
#[command(about = "tasktrack - Background task lifecycle tracking", long_about = None)]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Extra config file layered over the user and project configs
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the default configuration and bootstrap the database
    Init {
        /// Overwrite an existing configuration file
        #[arg(short, long)]
        force: bool,
    },

    /// List unfinished tasks
    List {
        /// Include finished tasks
        #[arg(short, long)]
        all: bool,
    },

    /// Show task details
    Show {
        /// Task ID
        id: i64,
    },

    /// Register a new task
    Create {
        /// Task type: IMPORT_PLAYLIST, DOWNLOAD_VIDEO, REFRESH_PLAYLIST
        task_type: String,
        /// Task title
        title: String,
        /// Parent task ID
        #[arg(short, long)]
        parent: Option<i64>,
        /// JSON details stored with the task
        #[arg(short, long)]
        details: Option<String>,
    },

    /// Move a task to a new status
    Status {
        /// Task ID
        id: i64,
        /// QUEUED, IN_PROGRESS, COMPLETED, FAILED, CANCELLED, COMPLETED_WITH_ERRORS
        status: String,
    },

    /// Report task progress between 0.0 and 1.0
    Progress {
        /// Task ID
        id: i64,
        /// Fraction of work done
        progress: f64,
    },

    /// Attach a task to a new parent, or detach it when no parent is given
    Reparent {
        /// Task ID
        id: i64,
        /// New parent task ID
        parent: Option<i64>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut loader = ConfigLoader::new();
    if let Some(path) = &cli.config {
        loader = loader.with_file(path);
    }
    let config = loader.load().await.context("Failed to load configuration")?;

    tasktrack::logging::init(&config.logging);

    if let Commands::Init { force } = cli.command {
        let home = tasktrack::init::get_home()?;
        let config_path = tasktrack::init::initialize(&home, force)?;
        let db = open_database(&config).await?;
        println!("Configuration: {}", config_path.display());
        println!("Database: {}", config.database.resolved_path().display());
        db.close().await?;
        return Ok(());
    }

    let db = open_database(&config).await?;
    let service = TaskService::with_events(db.clone(), EventPublisher::new(config.events.capacity));
    service.resume_unfinished_tasks().await?;

    let result = run(&service, cli.command).await;
    db.close().await?;
    result
}

/// Bootstrap the schema and apply the configured retry policy
async fn open_database(config: &TaskTrackConfig) -> anyhow::Result<Database> {
    let db = Database::initialize(&config.database)
        .await
        .context("Failed to open task database")?;
    Ok(db.with_retry_policy(config.retry.policy()))
}

async fn run(service: &TaskService, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Init { .. } => Ok(()),
        Commands::List { all } => {
            let tasks = if all {
                service.list_tasks().await?
            } else {
                service.get_unfinished_tasks()
            };
            print_json(&tasks)
        }
        Commands::Show { id } => {
            let task = service
                .get_task(id)
                .await?
                .ok_or_else(|| anyhow::anyhow!("Task not found: {}", id))?;
            print_json(&task)
        }
        Commands::Create {
            task_type,
            title,
            parent,
            details,
        } => {
            let task_type: TaskType = task_type.parse()?;
            let mut new_task = NewTask::new(task_type, title);
            if let Some(parent_id) = parent {
                new_task = new_task.with_parent(parent_id);
            }
            if let Some(details) = details {
                let details: serde_json::Value =
                    serde_json::from_str(&details).context("Details must be valid JSON")?;
                new_task = new_task.with_details(details);
            }
            print_json(&service.create_task(new_task).await?)
        }
        Commands::Status { id, status } => {
            let status: TaskStatus = status.parse()?;
            print_json(&service.update_task_status(id, status).await?)
        }
        Commands::Progress { id, progress } => {
            print_json(&service.update_task_progress(id, progress).await?)
        }
        Commands::Reparent { id, parent } => {
            print_json(&service.update_task_parent(id, parent).await?)
        }
    }
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

//! Integration tests for busy/locked handling against a real SQLite file
//!
//! The contended databases disable SQLite's own busy handler, so a second
//! writer fails immediately and only the session retry policy can save it.

mod common;

use common::{setup_contended_db, setup_test_service, standard_retry};
use std::time::{Duration, Instant};
use tasktrack::models::{NewTask, TaskStatus, TaskType};
use tasktrack::{RetryPolicy, TaskRepository};

#[tokio::test]
async fn test_writer_retries_until_lock_released() {
    let (_dir, db) = setup_contended_db(standard_retry()).await;
    let repo = TaskRepository::new();

    let mut holder = db.session();
    let mut held = holder.transaction().await.unwrap();
    repo.reserve_write(&mut held).await.unwrap();

    let mut writer = db.session();
    let late = NewTask::new(TaskType::DownloadVideo, "late");
    let release = async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        held.commit().await.unwrap();
    };
    let write = repo.create(&mut writer, &late);

    let ((), created) = tokio::join!(release, write);

    let created = created.unwrap();
    assert_eq!(created.status, TaskStatus::Queued);
}

#[tokio::test]
async fn test_exhausted_retries_surface_contention_error() {
    let (_dir, db) = setup_contended_db(standard_retry()).await;
    let repo = TaskRepository::new();

    let mut holder = db.session();
    let mut held = holder.transaction().await.unwrap();
    repo.reserve_write(&mut held).await.unwrap();

    let mut writer = db.session();
    let started = Instant::now();
    let release = async {
        tokio::time::sleep(Duration::from_millis(500)).await;
        held.rollback().await.unwrap();
    };
    let write = async {
        let result = repo
            .create(&mut writer, &NewTask::new(TaskType::DownloadVideo, "never"))
            .await;
        (result, started.elapsed())
    };

    let ((), (result, elapsed)) = tokio::join!(release, write);

    let err = result.unwrap_err();
    assert!(err.is_contention(), "unexpected error: {}", err);
    // Three fixed 50ms delays before giving up
    assert!(elapsed >= Duration::from_millis(150), "gave up after {:?}", elapsed);
    assert!(elapsed < Duration::from_millis(500), "gave up after {:?}", elapsed);
}

#[tokio::test]
async fn test_without_retries_contention_fails_fast() {
    let (_dir, db) = setup_contended_db(RetryPolicy::none()).await;
    let repo = TaskRepository::new();

    let mut holder = db.session();
    let mut held = holder.transaction().await.unwrap();
    repo.reserve_write(&mut held).await.unwrap();

    let err = repo
        .create(&mut db.session(), &NewTask::new(TaskType::DownloadVideo, "blocked"))
        .await
        .unwrap_err();
    assert!(err.is_contention());

    held.rollback().await.unwrap();
}

#[tokio::test]
async fn test_readers_not_blocked_by_writer() {
    let (_dir, db) = setup_contended_db(RetryPolicy::none()).await;
    let repo = TaskRepository::new();

    let existing = repo
        .create(&mut db.session(), &NewTask::new(TaskType::ImportPlaylist, "visible"))
        .await
        .unwrap();

    let mut holder = db.session();
    let mut held = holder.transaction().await.unwrap();
    repo.reserve_write(&mut held).await.unwrap();
    repo.create(&mut held, &NewTask::new(TaskType::DownloadVideo, "pending"))
        .await
        .unwrap();

    let tasks = repo.list(&mut db.session()).await.unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].id, existing.id);

    held.commit().await.unwrap();
    assert_eq!(repo.list(&mut db.session()).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_concurrent_sibling_updates_aggregate_once_each() {
    let (_dir, service) = setup_test_service().await;

    let parent = service
        .create_task(NewTask::new(TaskType::ImportPlaylist, "playlist"))
        .await
        .unwrap();
    let mut children = Vec::new();
    for i in 0..4 {
        children.push(
            service
                .create_task(
                    NewTask::new(TaskType::DownloadVideo, format!("video {}", i))
                        .with_parent(parent.id),
                )
                .await
                .unwrap(),
        );
    }

    let handles: Vec<_> = children
        .iter()
        .map(|child| {
            let service = service.clone();
            let id = child.id;
            tokio::spawn(async move {
                service.update_task_status(id, TaskStatus::InProgress).await?;
                service.update_task_progress(id, 0.5).await?;
                service.update_task_status(id, TaskStatus::Completed).await
            })
        })
        .collect();

    for result in futures::future::join_all(handles).await {
        result.unwrap().unwrap();
    }

    let parent = TaskRepository::new()
        .get_by_id(&mut service.database().session(), parent.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(parent.status, TaskStatus::Completed);
    assert_eq!(parent.progress, 1.0);
    assert!(parent.completed_at.is_some());
}

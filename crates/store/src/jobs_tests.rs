// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::test_db;
use crate::StoreError;
use chrono::Duration;
use mm_core::{InstallRequest, LogLevel};

fn pending_job(model: &str) -> Job {
    Job::new(InstallRequest::new(model), Utc::now())
}

#[tokio::test]
async fn create_and_get_roundtrip() {
    let (store, _dir) = test_db::open().await;

    let job = pending_job("Qwen/Qwen2.5-0.5B");
    store.create_job(&job).await.unwrap();

    let got = store.get_job(job.id.as_str()).await.unwrap();
    assert_eq!(got.payload.hf_model_id, "Qwen/Qwen2.5-0.5B");
    assert_eq!(got.status, JobStatus::Pending);
    assert_eq!(got.stage, "queued");
}

#[tokio::test]
async fn duplicate_create_conflicts() {
    let (store, _dir) = test_db::open().await;

    let job = pending_job("a/b");
    store.create_job(&job).await.unwrap();
    let err = store.create_job(&job).await.unwrap_err();
    assert!(matches!(err, StoreError::Conflict(_)));
}

#[tokio::test]
async fn get_missing_is_not_found() {
    let (store, _dir) = test_db::open().await;
    assert!(matches!(store.get_job("job-nope").await, Err(StoreError::NotFound)));
}

#[tokio::test]
async fn update_stamps_updated_at_and_preserves_created_at() {
    let (store, _dir) = test_db::open().await;

    let mut job = pending_job("a/b");
    job.created_at = Utc::now() - Duration::hours(1);
    job.updated_at = job.created_at;
    store.create_job(&job).await.unwrap();

    job.status = JobStatus::Running;
    job.progress = 30;
    let updated = store.update_job(&job).await.unwrap();

    let got = store.get_job(job.id.as_str()).await.unwrap();
    assert_eq!(got.status, JobStatus::Running);
    assert_eq!(got.progress, 30);
    assert!(got.updated_at > got.created_at);
    assert_eq!(updated.updated_at, got.updated_at);
    // created_at is immutable across updates
    assert_eq!(
        got.created_at.timestamp_micros(),
        job.created_at.timestamp_micros()
    );
}

#[tokio::test]
async fn append_log_is_ordered() {
    let (store, _dir) = test_db::open().await;

    let job = pending_job("a/b");
    store.create_job(&job).await.unwrap();

    for (i, stage) in ["preparing", "downloading", "finalizing"].iter().enumerate() {
        let entry = mm_core::JobLogEntry {
            timestamp: Utc::now(),
            level: LogLevel::Info,
            stage: stage.to_string(),
            message: format!("step {i}"),
        };
        store.append_job_log(job.id.as_str(), &entry).await.unwrap();
    }

    let got = store.get_job(job.id.as_str()).await.unwrap();
    assert_eq!(got.logs.len(), 3);
    assert_eq!(got.logs[0].stage, "preparing");
    assert_eq!(got.logs[2].stage, "finalizing");
}

#[tokio::test]
async fn cancel_pending_sets_cancelled_at() {
    let (store, _dir) = test_db::open().await;

    let job = pending_job("a/b");
    store.create_job(&job).await.unwrap();

    let cancelled = store.cancel_job(job.id.as_str()).await.unwrap();
    assert_eq!(cancelled.status, JobStatus::Cancelled);
    assert!(cancelled.cancelled_at.is_some());
}

#[tokio::test]
async fn cancel_terminal_is_invalid() {
    let (store, _dir) = test_db::open().await;

    let mut job = pending_job("a/b");
    job.status = JobStatus::Completed;
    store.create_job(&job).await.unwrap();

    let err = store.cancel_job(job.id.as_str()).await.unwrap_err();
    assert!(matches!(err, StoreError::Invalid(_)));
}

#[tokio::test]
async fn retry_reopens_and_increments_attempt() {
    let (store, _dir) = test_db::open().await;

    let mut job = pending_job("a/b");
    job.status = JobStatus::Failed;
    job.max_attempts = 2;
    job.progress = 80;
    job.error = Some("download exploded".to_string());
    store.create_job(&job).await.unwrap();

    let retried = store.retry_job(job.id.as_str()).await.unwrap();
    assert_eq!(retried.status, JobStatus::Pending);
    assert_eq!(retried.attempt, 1);
    assert_eq!(retried.progress, 0);
    assert!(retried.error.is_none());
    assert_eq!(retried.stage, "queued");
}

#[tokio::test]
async fn retry_guards_non_terminal_and_budget() {
    let (store, _dir) = test_db::open().await;

    let mut running = pending_job("a/b");
    running.status = JobStatus::Running;
    store.create_job(&running).await.unwrap();
    assert!(matches!(
        store.retry_job(running.id.as_str()).await,
        Err(StoreError::Conflict(_))
    ));

    let mut spent = pending_job("c/d");
    spent.status = JobStatus::Failed;
    spent.attempt = 1;
    spent.max_attempts = 1;
    store.create_job(&spent).await.unwrap();
    assert!(matches!(
        store.retry_job(spent.id.as_str()).await,
        Err(StoreError::Conflict(_))
    ));
}

#[tokio::test]
async fn list_jobs_filters() {
    let (store, _dir) = test_db::open().await;

    let mut a = pending_job("org/alpha");
    a.status = JobStatus::Completed;
    store.create_job(&a).await.unwrap();
    let b = pending_job("org/beta");
    store.create_job(&b).await.unwrap();

    let all = store.list_jobs(&JobFilter::default()).await.unwrap();
    assert_eq!(all.len(), 2);

    let completed = store
        .list_jobs(&JobFilter { status: Some(JobStatus::Completed), ..Default::default() })
        .await
        .unwrap();
    assert_eq!(completed.len(), 1);
    assert_eq!(completed[0].id, a.id);

    let by_model = store
        .list_jobs(&JobFilter { model_id: Some("org/beta".to_string()), ..Default::default() })
        .await
        .unwrap();
    assert_eq!(by_model.len(), 1);
    assert_eq!(by_model[0].id, b.id);

    let limited = store
        .list_jobs(&JobFilter { limit: Some(1), ..Default::default() })
        .await
        .unwrap();
    assert_eq!(limited.len(), 1);
}

#[tokio::test]
async fn count_by_status_groups() {
    let (store, _dir) = test_db::open().await;

    store.create_job(&pending_job("a/1")).await.unwrap();
    store.create_job(&pending_job("a/2")).await.unwrap();
    let mut failed = pending_job("a/3");
    failed.status = JobStatus::Failed;
    store.create_job(&failed).await.unwrap();

    let counts = store.count_jobs_by_status().await.unwrap();
    assert_eq!(counts.get("pending"), Some(&2));
    assert_eq!(counts.get("failed"), Some(&1));
}

#[tokio::test]
async fn cleanup_only_touches_listed_statuses() {
    let (store, _dir) = test_db::open().await;

    let mut done = pending_job("a/done");
    done.status = JobStatus::Completed;
    store.create_job(&done).await.unwrap();
    let running = {
        let mut j = pending_job("a/run");
        j.status = JobStatus::Running;
        j
    };
    store.create_job(&running).await.unwrap();

    let cutoff = Utc::now() + Duration::seconds(1);
    let purged = store
        .cleanup_jobs_before(
            cutoff,
            &[JobStatus::Completed, JobStatus::Failed, JobStatus::Cancelled],
        )
        .await
        .unwrap();
    assert_eq!(purged, 1);

    // The running job survives even though it predates the cutoff.
    assert!(store.get_job(running.id.as_str()).await.is_ok());
    assert!(matches!(store.get_job(done.id.as_str()).await, Err(StoreError::NotFound)));
}

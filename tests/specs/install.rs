// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end install scenarios: store + bus + weight manager + engine.

use mm_broker::EventBus;
use mm_core::{EventType, InstallRequest, JobStatus};
use mm_engine::{Engine, EngineSettings};
use mm_store::Store;
use mm_weights::{FakeDownloader, WeightStore};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

struct World {
    engine: Engine,
    store: Store,
    bus: EventBus,
    downloader: FakeDownloader,
    dir: TempDir,
}

async fn world() -> World {
    let dir = TempDir::new().unwrap();
    let store = Store::open(&format!("sqlite://{}/state.db", dir.path().display()))
        .await
        .unwrap();
    let bus = EventBus::new();
    let downloader = FakeDownloader::new();
    let weights = WeightStore::new(dir.path().join("mnt/models"), Arc::new(downloader.clone()));
    let engine = Engine::new(
        store.clone(),
        bus.clone(),
        None,
        Arc::new(weights),
        EngineSettings {
            install_timeout: Duration::from_secs(60),
            pvc_name: "venus-model-storage".to_string(),
            inference_model_root: "/mnt/models".to_string(),
        },
        CancellationToken::new(),
    );
    World { engine, store, bus, downloader, dir }
}

fn qwen_request() -> InstallRequest {
    InstallRequest::new("Qwen/Qwen2.5-0.5B")
        .target("qwen2.5-0.5b")
        .files(vec!["config.json".to_string()])
}

#[tokio::test]
async fn install_happy_path_with_ordered_event_stream() {
    let w = world().await;
    let (mut rx, _sub) = w.bus.subscribe();

    let (job, paths) = w.engine.submit(qwen_request()).await.unwrap();
    assert_eq!(paths.storage_uri, "pvc://venus-model-storage/qwen2.5-0.5b");
    assert_eq!(paths.inference_model_path, "/mnt/models/qwen2.5-0.5b");

    // The in-process worker task drives the job to completion.
    let mut done = None;
    for _ in 0..300 {
        let current = w.store.get_job(job.id.as_str()).await.unwrap();
        if current.status == JobStatus::Completed {
            done = Some(current);
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let done = done.expect("job completed");
    assert_eq!(done.progress, 100);
    let result = done.result.unwrap();
    assert_eq!(result.storage_uri, "pvc://venus-model-storage/qwen2.5-0.5b");
    assert_eq!(result.inference_model_path, "/mnt/models/qwen2.5-0.5b");

    // History carries the terminal audit record.
    let history = w.store.list_history(20, 0).await.unwrap();
    assert!(history
        .iter()
        .any(|h| h.event == "weight_install_completed" && h.metadata["jobId"] == job.id.as_str()));

    // Event stream order: pending, running.., log.., completed — all for
    // this job (scenario 6).
    let mut lifecycle = Vec::new();
    while let Ok(evt) = rx.try_recv() {
        match evt.event_type {
            EventType::JobPending | EventType::JobRunning | EventType::JobCompleted => {
                assert_eq!(evt.data["id"], job.id.as_str());
                lifecycle.push(evt.event_type);
            }
            EventType::JobLog => {
                assert_eq!(evt.data["jobId"], job.id.as_str());
            }
            _ => {}
        }
    }
    assert_eq!(lifecycle.first(), Some(&EventType::JobPending));
    assert!(lifecycle.contains(&EventType::JobRunning));
    assert_eq!(lifecycle.last(), Some(&EventType::JobCompleted));
}

#[tokio::test]
async fn repeat_install_without_overwrite_fails_with_conflict() {
    let w = world().await;

    let job = w.engine.create(qwen_request()).await.unwrap();
    w.engine.execute(job.id.as_str(), &job.payload).await.unwrap();

    let second = w.engine.create(qwen_request()).await.unwrap();
    w.engine.execute(second.id.as_str(), &second.payload).await.unwrap();

    let failed = w.store.get_job(second.id.as_str()).await.unwrap();
    assert_eq!(failed.status, JobStatus::Failed);
    assert!(failed.error.unwrap().contains("already exist"));
}

#[tokio::test]
async fn cancel_mid_flight_leaves_only_staging_remnants() {
    let w = world().await;
    w.downloader.delay_per_file(Duration::from_millis(300));

    let job = w.engine.create(qwen_request()).await.unwrap();
    let engine = w.engine.clone();
    let (id, payload) = (job.id.to_string(), job.payload.clone());
    let task = tokio::spawn(async move { engine.execute(&id, &payload).await });

    for _ in 0..100 {
        if w.store.get_job(job.id.as_str()).await.unwrap().status == JobStatus::Running {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    let cancelled = w.engine.cancel(job.id.as_str()).await.unwrap();
    assert_eq!(cancelled.status, JobStatus::Cancelled);
    assert!(cancelled.cancelled_at.is_some());
    task.await.unwrap().unwrap();

    // No final target directory exists on disk (scenario 3).
    assert!(!w.dir.path().join("mnt/models/qwen2.5-0.5b").exists());
}

#[tokio::test]
async fn retry_round_trip_reopens_and_increments_attempt() {
    let w = world().await;
    w.downloader.fail_with("hub 500");

    let job = w.engine.create(qwen_request()).await.unwrap();
    let mut budgeted = w.store.get_job(job.id.as_str()).await.unwrap();
    budgeted.max_attempts = 2;
    w.store.update_job(&budgeted).await.unwrap();
    w.engine.execute(job.id.as_str(), &job.payload).await.unwrap();
    assert_eq!(
        w.store.get_job(job.id.as_str()).await.unwrap().status,
        JobStatus::Failed
    );

    *w.downloader.handle().fail_with.lock() = None;
    let reopened = w.engine.retry(job.id.as_str()).await.unwrap();
    assert_eq!(reopened.status, JobStatus::Pending);
    assert_eq!(reopened.attempt, 1);
    assert!(reopened.error.is_none());

    for _ in 0..300 {
        let current = w.store.get_job(job.id.as_str()).await.unwrap();
        if current.status == JobStatus::Completed {
            assert_eq!(current.attempt, 1);
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("retried job never completed");
}

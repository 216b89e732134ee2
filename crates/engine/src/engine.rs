// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The job engine: create, enqueue, execute, cancel, retry.

use chrono::Utc;
use mm_broker::{EventBus, JobQueue};
use mm_core::history::events as history_events;
use mm_core::{
    Classify, Event, EventType, HistoryEntry, InstallRequest, Job, JobLogEntry, JobResult,
    JobStatus, LogLevel,
};
use mm_store::Store;
use mm_weights::DownloadProgress;
use parking_lot::Mutex;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::{EngineError, WeightInstaller};

/// Fixed points of the install progress curve: preparation ends at 20,
/// download occupies the next 70, finalization the rest.
const PROGRESS_PREPARED: u8 = 20;
const PROGRESS_DOWNLOAD_SPAN: u64 = 70;

/// Engine construction settings.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Ambient deadline for one install run.
    pub install_timeout: Duration,
    /// PVC name used to derive `pvc://` storage URIs.
    pub pvc_name: String,
    /// Mount root used to derive inference model paths.
    pub inference_model_root: String,
}

/// Derived locations for an install request, echoed in the 202 response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallPaths {
    pub target: String,
    pub storage_uri: String,
    pub inference_model_path: String,
}

/// The job engine. Cheap to clone; all clones share the running-job map.
#[derive(Clone)]
pub struct Engine {
    store: Store,
    bus: EventBus,
    queue: Option<JobQueue>,
    weights: Arc<dyn WeightInstaller>,
    settings: EngineSettings,
    running: Arc<Mutex<HashMap<String, CancellationToken>>>,
    shutdown: CancellationToken,
}

impl Engine {
    pub fn new(
        store: Store,
        bus: EventBus,
        queue: Option<JobQueue>,
        weights: Arc<dyn WeightInstaller>,
        settings: EngineSettings,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            store,
            bus,
            queue,
            weights,
            settings,
            running: Arc::new(Mutex::new(HashMap::new())),
            shutdown,
        }
    }

    /// Derived target and URIs for a request.
    pub fn install_paths(&self, req: &InstallRequest) -> Result<InstallPaths, EngineError> {
        let target = self.weights.target_for(req)?;
        Ok(InstallPaths {
            storage_uri: format!("pvc://{}/{}", self.settings.pvc_name, target),
            inference_model_path: format!(
                "{}/{}",
                self.settings.inference_model_root.trim_end_matches('/'),
                target
            ),
            target,
        })
    }

    /// Create a pending job and emit `job.pending`.
    pub async fn create(&self, req: InstallRequest) -> Result<Job, EngineError> {
        if req.hf_model_id.trim().is_empty() {
            return Err(EngineError::Invalid("hfModelId is required".to_string()));
        }
        // Surface bad targets at submission time, not inside the worker.
        self.weights.target_for(&req)?;

        let job = Job::new(req, Utc::now());
        self.store.create_job(&job).await?;
        self.emit_job(&job).await;
        Ok(job)
    }

    /// Hand a pending job to the queue, or run it in-process when no queue
    /// is configured.
    pub fn enqueue(&self, job: &Job) -> Result<(), EngineError> {
        match &self.queue {
            Some(queue) => {
                let queue = queue.clone();
                let job_id = job.id.to_string();
                let request = job.payload.clone();
                let engine = self.clone();
                tokio::spawn(async move {
                    if let Err(e) = queue.enqueue(&job_id, &request).await {
                        tracing::error!(%job_id, error = %e, "enqueue failed, failing job");
                        let _ = engine.fail_job(&job_id, format!("enqueue failed: {e}")).await;
                    }
                });
            }
            None => {
                let engine = self.clone();
                let job_id = job.id.to_string();
                let request = job.payload.clone();
                tokio::spawn(async move {
                    if let Err(e) = engine.execute(&job_id, &request).await {
                        tracing::error!(%job_id, error = %e, "in-process execution failed");
                    }
                });
            }
        }
        Ok(())
    }

    /// Create + enqueue, returning the job and its derived paths.
    pub async fn submit(&self, req: InstallRequest) -> Result<(Job, InstallPaths), EngineError> {
        let paths = self.install_paths(&req)?;
        let job = self.create(req).await?;
        self.enqueue(&job)?;
        Ok((job, paths))
    }

    /// Run one claimed job to completion. Invoked by the queue worker (or an
    /// in-process task), never concurrently for the same job.
    pub async fn execute(&self, job_id: &str, req: &InstallRequest) -> Result<(), EngineError> {
        let mut job = self.store.get_job(job_id).await?;
        if job.status != JobStatus::Pending {
            tracing::info!(%job_id, status = %job.status, "skipping claim, job is not pending");
            return Ok(());
        }

        let cancel = self.shutdown.child_token();
        self.running.lock().insert(job_id.to_string(), cancel.clone());

        job.status = JobStatus::Running;
        job.stage = "preparing".to_string();
        job.message = "preparing installation".to_string();
        job = self.store.update_job(&job).await?;
        self.emit_job(&job).await;
        self.append_log(job_id, LogLevel::Info, "preparing", "claimed by worker").await?;

        // Bridge the downloader's synchronous progress callbacks into store
        // writes without blocking the transfer.
        let (tick_tx, mut tick_rx) = tokio::sync::mpsc::unbounded_channel::<DownloadProgress>();
        let updater = {
            let engine = self.clone();
            let job_id = job_id.to_string();
            tokio::spawn(async move {
                while let Some(tick) = tick_rx.recv().await {
                    engine.apply_progress(&job_id, tick).await;
                }
            })
        };

        let progress = move |tick: DownloadProgress| {
            let _ = tick_tx.send(tick);
        };
        let outcome =
            tokio::time::timeout(self.settings.install_timeout, self.weights.install(&cancel, req, &progress))
                .await;
        // Dropping the callback closes the tick channel; the updater drains
        // whatever is left and exits before the terminal write below.
        drop(progress);
        let _ = updater.await;
        self.running.lock().remove(job_id);

        match outcome {
            Ok(Ok(info)) => {
                let paths = self.install_paths(req)?;
                let mut job = self.store.get_job(job_id).await?;
                if job.status != JobStatus::Running {
                    // A racing cancel won; the terminal state stands.
                    tracing::info!(%job_id, status = %job.status, "install finished after terminal transition");
                    return Ok(());
                }
                job.status = JobStatus::Completed;
                job.progress = 100;
                job.stage = "completed".to_string();
                job.message = "installation complete".to_string();
                job.result = Some(JobResult {
                    name: info.name.clone(),
                    path: info.path.clone(),
                    size_bytes: info.size_bytes,
                    storage_uri: paths.storage_uri,
                    inference_model_path: paths.inference_model_path,
                });
                let job = self.store.update_job(&job).await?;
                self.emit_job(&job).await;
                self.record_history(
                    history_events::WEIGHT_INSTALL_COMPLETED,
                    Some(info.name),
                    json!({"jobId": job_id, "sizeBytes": info.size_bytes}),
                )
                .await;
                Ok(())
            }
            Ok(Err(e)) if cancel.is_cancelled() || e.class() == mm_core::ErrorClass::Cancelled => {
                self.finish_cancelled(job_id).await
            }
            Ok(Err(e)) => self.fail_job(job_id, e.to_string()).await,
            Err(_elapsed) => {
                cancel.cancel();
                self.fail_job(job_id, "timeout".to_string()).await
            }
        }
    }

    /// Cancel a pending or running job. Running workers observe the
    /// token and exit promptly.
    pub async fn cancel(&self, job_id: &str) -> Result<Job, EngineError> {
        let job = self.store.cancel_job(job_id).await?;

        let was_running = {
            let running = self.running.lock();
            if let Some(token) = running.get(job_id) {
                token.cancel();
                true
            } else {
                false
            }
        };
        self.emit_job(&job).await;
        if !was_running {
            // No executor will observe this job; write its audit entry here.
            self.record_history(
                history_events::WEIGHT_INSTALL_CANCELLED,
                None,
                json!({"jobId": job_id}),
            )
            .await;
        }
        Ok(job)
    }

    /// Re-open a terminal job and put it back on the queue.
    pub async fn retry(&self, job_id: &str) -> Result<Job, EngineError> {
        let job = self.store.retry_job(job_id).await?;
        self.emit_job(&job).await;
        self.enqueue(&job)?;
        Ok(job)
    }

    /// Append one log entry and emit `job.log`.
    pub async fn append_log(
        &self,
        job_id: &str,
        level: LogLevel,
        stage: &str,
        message: &str,
    ) -> Result<(), EngineError> {
        let entry = JobLogEntry {
            timestamp: Utc::now(),
            level,
            stage: stage.to_string(),
            message: message.to_string(),
        };
        self.store.append_job_log(job_id, &entry).await?;
        self.emit(EventType::JobLog, json!({"jobId": job_id, "log": entry})).await;
        Ok(())
    }

    /// Apply one progress tick: file counts move the progress needle, byte
    /// counts only refresh the message.
    async fn apply_progress(&self, job_id: &str, tick: DownloadProgress) {
        let result: Result<(), EngineError> = async {
            let mut job = self.store.get_job(job_id).await?;
            if job.status != JobStatus::Running {
                return Ok(());
            }
            match tick {
                DownloadProgress::Files { completed, total } => {
                    let pct = PROGRESS_PREPARED as u64
                        + PROGRESS_DOWNLOAD_SPAN * completed / total.max(1);
                    job.progress = job.clamped_progress(pct.min(100) as u8);
                    job.stage = "downloading".to_string();
                    job.message = format!("downloaded {completed}/{total} files");
                }
                DownloadProgress::Bytes { downloaded, total } => {
                    job.stage = "downloading".to_string();
                    job.message = match total {
                        Some(total) => format!("downloaded {downloaded}/{total} bytes"),
                        None => format!("downloaded {downloaded} bytes"),
                    };
                }
            }
            let message = job.message.clone();
            let job = self.store.update_job(&job).await?;
            self.emit_job(&job).await;
            self.append_log(job_id, LogLevel::Info, "downloading", &message).await?;
            Ok(())
        }
        .await;
        if let Err(e) = result {
            tracing::warn!(%job_id, error = %e, "progress update failed");
        }
    }

    /// Terminal failure: record the error, preserve progress.
    async fn fail_job(&self, job_id: &str, error: String) -> Result<(), EngineError> {
        let mut job = self.store.get_job(job_id).await?;
        if job.status.is_terminal() {
            return Ok(());
        }
        job.status = JobStatus::Failed;
        job.stage = "failed".to_string();
        job.message = error.clone();
        job.error = Some(error.clone());
        let job = self.store.update_job(&job).await?;
        self.emit_job(&job).await;
        self.record_history(
            history_events::WEIGHT_INSTALL_FAILED,
            None,
            json!({"jobId": job_id, "error": error}),
        )
        .await;
        Ok(())
    }

    /// Terminal cancellation observed by the executor.
    async fn finish_cancelled(&self, job_id: &str) -> Result<(), EngineError> {
        let job = self.store.get_job(job_id).await?;
        if job.status != JobStatus::Cancelled {
            // Shutdown or downloader-side abort without an API cancel.
            let job = self.store.cancel_job(job_id).await?;
            self.emit_job(&job).await;
        }
        self.record_history(
            history_events::WEIGHT_INSTALL_CANCELLED,
            None,
            json!({"jobId": job_id}),
        )
        .await;
        Ok(())
    }

    /// Publish `job.<status>` carrying the full job.
    async fn emit_job(&self, job: &Job) {
        let event_type = EventType::for_job_status(job.status);
        let data = serde_json::to_value(job).unwrap_or_else(|_| json!({"id": job.id.as_str()}));
        self.emit(event_type, data).await;
    }

    /// Publish, logging failures; event loss never fails an operation.
    async fn emit(&self, event_type: EventType, data: serde_json::Value) {
        if let Err(e) = self.bus.publish(Event::new(event_type, data)).await {
            tracing::warn!(event = %event_type, error = %e, "event publish failed");
        }
    }

    /// History durability is best-effort; the bus is the subscriber-facing
    /// source of truth.
    async fn record_history(
        &self,
        event: &str,
        model_id: Option<String>,
        metadata: serde_json::Value,
    ) {
        let entry = HistoryEntry::new(event, model_id, metadata);
        if let Err(e) = self.store.append_history(&entry).await {
            tracing::warn!(event, error = %e, "history write failed");
        }
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;

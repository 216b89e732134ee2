// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job record and state machine predicates.
//!
//! The Job Engine exclusively owns state transitions; this module defines the
//! record plus the predicates the engine and datastore enforce:
//!
//! - status is monotonic into terminal states
//! - progress is non-decreasing while running
//! - `attempt <= max_attempts`
//! - terminal jobs re-open only through retry, which increments `attempt`

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

crate::define_id! {
    /// Unique identifier for a job.
    ///
    /// Assigned at creation and used as the datastore primary key, the queue
    /// message key, and the `data.id` field of `job.*` events.
    pub struct JobId("job-");
}

/// Job lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

crate::simple_display! {
    JobStatus {
        Pending => "pending",
        Running => "running",
        Completed => "completed",
        Failed => "failed",
        Cancelled => "cancelled",
    }
}

impl JobStatus {
    /// Terminal states admit no further transition except retry.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled)
    }

    /// Parse the snake_case wire form.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(JobStatus::Pending),
            "running" => Some(JobStatus::Running),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            "cancelled" => Some(JobStatus::Cancelled),
            _ => None,
        }
    }
}

/// Kind of work a job performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    WeightInstall,
}

crate::simple_display! {
    JobType {
        WeightInstall => "weight_install",
    }
}

/// Severity of a job log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

crate::simple_display! {
    LogLevel {
        Info => "info",
        Warn => "warn",
        Error => "error",
    }
}

/// One entry in a job's ordered, append-only log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobLogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub stage: String,
    pub message: String,
}

/// Request parameters for a weight installation job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallRequest {
    pub hf_model_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,
    /// Target directory relative to the storage root. Derived from the model
    /// id when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    /// File allow-list passed to the downloader. Empty means everything.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<String>,
    #[serde(default)]
    pub overwrite: bool,
    /// Forward-compatible extension payload.
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub extra: serde_json::Value,
}

impl InstallRequest {
    pub fn new(hf_model_id: impl Into<String>) -> Self {
        Self { hf_model_id: hf_model_id.into(), ..Self::default() }
    }

    crate::setters! {
        set {
            files: Vec<String>,
            overwrite: bool,
        }
        option {
            target: String,
            revision: String,
        }
    }

    /// Revision to download, defaulting to `main`.
    pub fn revision_or_default(&self) -> &str {
        self.revision.as_deref().unwrap_or("main")
    }
}

/// Terminal outputs of a successful installation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobResult {
    /// Install name relative to the storage root.
    pub name: String,
    /// Absolute on-disk path of the installation.
    pub path: String,
    pub size_bytes: u64,
    /// `pvc://<pvc>/<name>` URI consumed by activation.
    pub storage_uri: String,
    /// Path the inference runtime mounts the weights at.
    pub inference_model_path: String,
}

/// A durable job record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: JobId,
    #[serde(rename = "type")]
    pub job_type: JobType,
    pub status: JobStatus,
    /// Free-form stage marker (`queued`, `preparing`, `downloading`, ...).
    pub stage: String,
    /// Percent complete, clamped to 0..=100.
    pub progress: u8,
    pub message: String,
    pub payload: InstallRequest,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<JobResult>,
    pub attempt: u32,
    pub max_attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancelled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub logs: Vec<JobLogEntry>,
}

impl Job {
    /// Create a fresh pending job for an install request.
    pub fn new(payload: InstallRequest, now: DateTime<Utc>) -> Self {
        Self {
            id: JobId::new(),
            job_type: JobType::WeightInstall,
            status: JobStatus::Pending,
            stage: "queued".to_string(),
            progress: 0,
            message: String::new(),
            payload,
            result: None,
            attempt: 0,
            max_attempts: 1,
            error: None,
            cancelled_at: None,
            created_at: now,
            updated_at: now,
            logs: Vec::new(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Cancel is valid only from pending or running.
    pub fn can_cancel(&self) -> bool {
        matches!(self.status, JobStatus::Pending | JobStatus::Running)
    }

    /// Retry is valid from failed or cancelled with attempts left.
    pub fn can_retry(&self) -> bool {
        matches!(self.status, JobStatus::Failed | JobStatus::Cancelled)
            && self.attempt < self.max_attempts
    }

    /// Clamp a reported progress value into range without ever moving it
    /// backwards within a run.
    pub fn clamped_progress(&self, reported: u8) -> u8 {
        reported.min(100).max(self.progress)
    }
}

crate::builder! {
    pub struct JobBuilder => Job {
        into {
            stage: String = "queued",
            message: String = "",
        }
        set {
            id: JobId = JobId::new(),
            job_type: JobType = JobType::WeightInstall,
            status: JobStatus = JobStatus::Pending,
            progress: u8 = 0,
            payload: InstallRequest = InstallRequest::new("org/model"),
            attempt: u32 = 0,
            max_attempts: u32 = 1,
            logs: Vec<JobLogEntry> = Vec::new(),
        }
        option {
            result: JobResult = None,
            error: String = None,
            cancelled_at: DateTime<Utc> = None,
        }
        computed {
            created_at: DateTime<Utc> = Utc::now(),
            updated_at: DateTime<Utc> = Utc::now(),
        }
    }
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;

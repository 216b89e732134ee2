// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event envelope published on the bus and the broker channel.
//!
//! The wire form is `{"id", "type", "timestamp", "data"}` on a single
//! channel; `type` is a dotted namespace and `data` varies per type, so the
//! payload stays a JSON value and subscribers down-cast what they need.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::job::JobStatus;

crate::define_id! {
    /// Unique identifier stamped on every published event.
    pub struct EventId("evt-");
}

/// Known event types on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    #[serde(rename = "job.pending")]
    JobPending,
    #[serde(rename = "job.running")]
    JobRunning,
    #[serde(rename = "job.completed")]
    JobCompleted,
    #[serde(rename = "job.failed")]
    JobFailed,
    #[serde(rename = "job.cancelled")]
    JobCancelled,
    #[serde(rename = "job.log")]
    JobLog,
    #[serde(rename = "model.activation.started")]
    ActivationStarted,
    #[serde(rename = "model.activation.completed")]
    ActivationCompleted,
    #[serde(rename = "model.activation.failed")]
    ActivationFailed,
    #[serde(rename = "model.deactivation.completed")]
    DeactivationCompleted,
    #[serde(rename = "model.deactivation.failed")]
    DeactivationFailed,
    #[serde(rename = "model.status.updated")]
    StatusUpdated,
    #[serde(rename = "hf.refresh.started")]
    HfRefreshStarted,
    #[serde(rename = "hf.refresh.completed")]
    HfRefreshCompleted,
    #[serde(rename = "hf.refresh.failed")]
    HfRefreshFailed,
}

crate::simple_display! {
    EventType {
        JobPending => "job.pending",
        JobRunning => "job.running",
        JobCompleted => "job.completed",
        JobFailed => "job.failed",
        JobCancelled => "job.cancelled",
        JobLog => "job.log",
        ActivationStarted => "model.activation.started",
        ActivationCompleted => "model.activation.completed",
        ActivationFailed => "model.activation.failed",
        DeactivationCompleted => "model.deactivation.completed",
        DeactivationFailed => "model.deactivation.failed",
        StatusUpdated => "model.status.updated",
        HfRefreshStarted => "hf.refresh.started",
        HfRefreshCompleted => "hf.refresh.completed",
        HfRefreshFailed => "hf.refresh.failed",
    }
}

impl EventType {
    /// The `job.<status>` event for a status transition.
    pub fn for_job_status(status: JobStatus) -> Self {
        match status {
            JobStatus::Pending => EventType::JobPending,
            JobStatus::Running => EventType::JobRunning,
            JobStatus::Completed => EventType::JobCompleted,
            JobStatus::Failed => EventType::JobFailed,
            JobStatus::Cancelled => EventType::JobCancelled,
        }
    }
}

/// A published event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub timestamp: DateTime<Utc>,
    pub data: serde_json::Value,
}

impl Event {
    /// Build an event with a fresh id and the current timestamp.
    pub fn new(event_type: EventType, data: serde_json::Value) -> Self {
        Self { id: EventId::new(), event_type, timestamp: Utc::now(), data }
    }

    /// Fill in missing auto-assigned fields before publishing.
    pub fn ensure_defaults(&mut self) {
        if self.id.is_empty() {
            self.id = EventId::new();
        }
        if self.timestamp.timestamp() == 0 {
            self.timestamp = Utc::now();
        }
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;

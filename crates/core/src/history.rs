// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Append-only audit records for lifecycle outcomes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

crate::define_id! {
    /// Unique identifier for a history entry.
    pub struct HistoryId("hist-");
}

/// Well-known history event names.
pub mod events {
    pub const WEIGHT_INSTALL_COMPLETED: &str = "weight_install_completed";
    pub const WEIGHT_INSTALL_FAILED: &str = "weight_install_failed";
    pub const WEIGHT_INSTALL_CANCELLED: &str = "weight_install_cancelled";
    pub const WEIGHT_DELETED: &str = "weight_deleted";
    pub const MODEL_ACTIVATION_COMPLETED: &str = "model_activation_completed";
    pub const MODEL_ACTIVATION_FAILED: &str = "model_activation_failed";
    pub const MODEL_DEACTIVATION_COMPLETED: &str = "model_deactivation_completed";
    pub const MODEL_TEST: &str = "model_test";
}

/// One audit record. Written for every lifecycle outcome; TTL-purged by the
/// automation loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub id: HistoryId,
    pub event: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl HistoryEntry {
    pub fn new(event: impl Into<String>, model_id: Option<String>, metadata: serde_json::Value) -> Self {
        Self {
            id: HistoryId::new(),
            event: event.into(),
            model_id,
            metadata,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn entry_serializes_with_model_id() {
        let e = HistoryEntry::new(
            events::WEIGHT_INSTALL_COMPLETED,
            Some("qwen2.5-0.5b".to_string()),
            json!({"jobId": "job-1"}),
        );
        let v = serde_json::to_value(&e).unwrap();
        assert_eq!(v["event"], "weight_install_completed");
        assert_eq!(v["modelId"], "qwen2.5-0.5b");
        assert_eq!(v["metadata"]["jobId"], "job-1");
    }

    #[test]
    fn null_metadata_is_omitted() {
        let e = HistoryEntry::new(events::MODEL_TEST, None, serde_json::Value::Null);
        let v = serde_json::to_value(&e).unwrap();
        assert!(v.get("metadata").is_none());
        assert!(v.get("modelId").is_none());
    }
}

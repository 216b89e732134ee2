// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Weight installation records and sidecar metadata.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Name of the sidecar metadata file that marks a directory as a managed
/// installation.
pub const SIDECAR_FILE: &str = ".model-manager";

/// Sidecar metadata written at the root of every successful installation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SidecarMeta {
    pub model_id: String,
    pub revision: String,
    pub installed_at: DateTime<Utc>,
}

/// One discovered installation under the storage root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeightInfo {
    /// Relative slash-path under the storage root.
    pub name: String,
    /// Absolute on-disk path.
    pub path: String,
    pub size_bytes: u64,
    pub file_count: u64,
    pub modified_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hf_model_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub installed_at: Option<DateTime<Utc>>,
}

/// Totals for the storage volume plus per-install sizes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageStats {
    pub total_size_bytes: u64,
    pub install_count: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub installs: Vec<WeightInfo>,
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Catalog model definitions loaded from disk.
//!
//! Ids are unique and case-sensitive. Kubernetes passthrough fields
//! (tolerations, volumes, volume mounts) stay untyped JSON: they are copied
//! verbatim into the manifest and validated by the API server, not by us.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// An environment variable injected into the inference container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvVar {
    pub name: String,
    pub value: String,
}

/// vLLM runtime flags for a model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VllmConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tensor_parallel_size: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dtype: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpu_memory_utilization: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_model_len: Option<i64>,
    #[serde(default)]
    pub trust_remote_code: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_args: Vec<String>,
}

/// Container resource requests and limits, keyed by resource name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resources {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub requests: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub limits: BTreeMap<String, String>,
}

/// A catalog entry describing one servable model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogModel {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hf_model_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub served_model_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<EnvVar>,
    #[serde(default)]
    pub vllm: VllmConfig,
    #[serde(default)]
    pub resources: Resources,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub node_selector: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tolerations: Vec<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volume_mounts: Vec<serde_json::Value>,
}

impl CatalogModel {
    /// Display name, defaulting to the id.
    pub fn display_name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.id)
    }

    /// Condensed listing form.
    pub fn summary(&self) -> ModelSummary {
        ModelSummary {
            id: self.id.clone(),
            display_name: self.display_name().to_string(),
            hf_model_id: self.hf_model_id.clone(),
            runtime: self.runtime.clone(),
        }
    }
}

/// Listing row for `GET /models`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelSummary {
    pub id: String,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hf_model_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_name_defaults_to_id() {
        let m = CatalogModel { id: "qwen2.5-0.5b".to_string(), ..Default::default() };
        assert_eq!(m.display_name(), "qwen2.5-0.5b");

        let named = CatalogModel {
            id: "qwen2.5-0.5b".to_string(),
            display_name: Some("Qwen 2.5 0.5B".to_string()),
            ..Default::default()
        };
        assert_eq!(named.display_name(), "Qwen 2.5 0.5B");
    }

    #[test]
    fn model_roundtrips_through_json() {
        let json = r#"{
            "id": "qwen2.5-0.5b",
            "hfModelId": "Qwen/Qwen2.5-0.5B",
            "vllm": {"tensorParallelSize": 2, "dtype": "bfloat16", "extraArgs": ["--foo"]},
            "resources": {"requests": {"nvidia.com/gpu": "1"}, "limits": {"nvidia.com/gpu": "1"}}
        }"#;
        let m: CatalogModel = serde_json::from_str(json).unwrap();
        assert_eq!(m.vllm.tensor_parallel_size, Some(2));
        assert_eq!(m.resources.requests.get("nvidia.com/gpu").map(String::as_str), Some("1"));

        let back = serde_json::to_value(&m).unwrap();
        let again: CatalogModel = serde_json::from_value(back).unwrap();
        assert_eq!(again, m);
    }

    #[test]
    fn summary_carries_defaulted_display_name() {
        let m = CatalogModel { id: "a".to_string(), ..Default::default() };
        assert_eq!(m.summary().display_name, "a");
    }
}

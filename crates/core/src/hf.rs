// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Hugging Face metadata records and derived insights.
//!
//! The canonical cache key for a model is its lowercased id.

use serde::{Deserialize, Serialize};

use crate::catalog::CatalogModel;

/// Subset of a model's `config.json` the control plane inspects.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HfModelConfig {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub architectures: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub torch_dtype: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_position_embeddings: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,
    /// Everything else in the config rides along untyped.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// A repository file listed by the HF API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HfSibling {
    pub rfilename: String,
}

/// Hugging Face model metadata as cached by discovery.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HuggingFaceModel {
    #[serde(alias = "id")]
    pub model_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default)]
    pub downloads: u64,
    #[serde(default)]
    pub likes: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pipeline_tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<HfModelConfig>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub siblings: Vec<HfSibling>,
}

impl HuggingFaceModel {
    /// Canonical cache key.
    pub fn cache_key(&self) -> String {
        self.model_id.to_lowercase()
    }

    /// License from the `license:*` tag, falling back to the config field.
    pub fn license(&self) -> Option<String> {
        self.tags
            .iter()
            .find_map(|t| t.strip_prefix("license:").map(str::to_string))
            .or_else(|| self.config.as_ref().and_then(|c| c.license.clone()))
    }
}

/// Discovery verdict for one model: metadata, vLLM compatibility, and a
/// suggested catalog entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelInsight {
    pub hf_model: HuggingFaceModel,
    pub compatible: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub matched_architectures: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_catalog: Option<CatalogModel>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub recommended_files: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
}

/// Options for a discovery search.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pipeline_tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<String>,
    #[serde(default)]
    pub limit: usize,
}

/// Hard cap on search result size.
pub const SEARCH_LIMIT_MAX: usize = 25;

impl SearchOptions {
    /// Effective limit, clamped to `1..=SEARCH_LIMIT_MAX`.
    pub fn clamped_limit(&self) -> usize {
        if self.limit == 0 {
            SEARCH_LIMIT_MAX
        } else {
            self.limit.min(SEARCH_LIMIT_MAX)
        }
    }

    /// Deterministic cache key derived from every field.
    pub fn cache_key(&self) -> String {
        format!(
            "search|{}|{}|{}|{}|{}|{}|{}|{}",
            self.query.as_deref().unwrap_or(""),
            self.pipeline_tag.as_deref().unwrap_or(""),
            self.author.as_deref().unwrap_or(""),
            self.license.as_deref().unwrap_or(""),
            self.tags.join(","),
            self.sort.as_deref().unwrap_or(""),
            self.direction.as_deref().unwrap_or(""),
            self.clamped_limit(),
        )
        .to_lowercase()
    }
}

#[cfg(test)]
#[path = "hf_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Compatibility analysis and catalog suggestions.

use mm_core::{CatalogModel, HuggingFaceModel, ModelInsight, Resources, SearchOptions, VllmConfig};
use std::collections::HashSet;

/// Architectures that need `--trust-remote-code` to load.
const TRUST_REMOTE_CODE_MARKERS: &[&str] = &["Qwen", "ChatGLM", "InternLM", "Baichuan", "Yi"];

/// Default runtime for suggested entries.
const DEFAULT_RUNTIME: &str = "vllm-runtime";

const GPU_RESOURCE: &str = "nvidia.com/gpu";

/// Assemble the full insight for a model against the vLLM module set.
pub(crate) fn build_insight(
    model: HuggingFaceModel,
    modules: &HashSet<String>,
    auto_detect: bool,
) -> ModelInsight {
    let matched = matched_architectures(&model, modules);
    let compatible = !matched.is_empty();

    let mut notes = Vec::new();
    let architectures = model
        .config
        .as_ref()
        .map(|c| c.architectures.clone())
        .unwrap_or_default();
    if architectures.is_empty() {
        notes.push("model publishes no config.architectures; compatibility unknown".to_string());
    } else if !compatible {
        notes.push(format!(
            "no vLLM module matches architectures {}",
            architectures.join(", ")
        ));
    }
    if architectures.iter().any(needs_trust_remote_code) {
        notes.push("architecture requires trust-remote-code".to_string());
    }

    let suggested = suggest_catalog(&model, auto_detect);
    let recommended_files = recommended_files(&model);

    ModelInsight {
        hf_model: model,
        compatible,
        matched_architectures: matched,
        suggested_catalog: Some(suggested),
        recommended_files,
        notes,
    }
}

/// Lowercase-substring match of each declared architecture against the vLLM
/// module name set.
fn matched_architectures(model: &HuggingFaceModel, modules: &HashSet<String>) -> Vec<String> {
    let Some(config) = &model.config else { return Vec::new() };
    config
        .architectures
        .iter()
        .filter(|arch| {
            let arch_lc = arch.to_lowercase();
            modules.iter().any(|m| m.contains(&arch_lc) || arch_lc.contains(m.as_str()))
        })
        .cloned()
        .collect()
}

fn needs_trust_remote_code(arch: &String) -> bool {
    TRUST_REMOTE_CODE_MARKERS.iter().any(|marker| arch.contains(marker))
}

/// Build a draft catalog entry: normalized id, display name from the segment
/// after `/`, vllm-runtime defaults, one GPU.
pub fn suggest_catalog(model: &HuggingFaceModel, auto_detect: bool) -> CatalogModel {
    let tail = model.model_id.rsplit('/').next().unwrap_or(&model.model_id);
    let id = normalize_id(tail);

    let mut resources = Resources::default();
    resources.requests.insert(GPU_RESOURCE.to_string(), "1".to_string());
    resources.limits.insert(GPU_RESOURCE.to_string(), "1".to_string());

    CatalogModel {
        id,
        display_name: Some(tail.to_string()),
        hf_model_id: Some(model.model_id.clone()),
        runtime: Some(DEFAULT_RUNTIME.to_string()),
        vllm: if auto_detect { detect_vllm_settings(model) } else { VllmConfig::default() },
        resources,
        ..Default::default()
    }
}

/// Heuristics mapping HF config onto vLLM flags.
pub fn detect_vllm_settings(model: &HuggingFaceModel) -> VllmConfig {
    let Some(config) = &model.config else { return VllmConfig::default() };

    let trust_remote_code = config.architectures.iter().any(needs_trust_remote_code);
    let dtype = config.torch_dtype.as_deref().and_then(|d| match d {
        "float16" | "half" => Some("float16".to_string()),
        "bfloat16" => Some("bfloat16".to_string()),
        "float32" => Some("float32".to_string()),
        _ => None,
    });

    VllmConfig {
        dtype,
        max_model_len: config.max_position_embeddings,
        trust_remote_code,
        ..Default::default()
    }
}

/// Lowercase, map everything outside `[a-z0-9._-]` to `-`, collapse runs.
fn normalize_id(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut prev_dash = false;
    for c in raw.to_lowercase().chars() {
        let mapped = if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') { c } else { '-' };
        if mapped == '-' {
            if !prev_dash {
                out.push('-');
            }
            prev_dash = true;
        } else {
            out.push(mapped);
            prev_dash = false;
        }
    }
    out.trim_matches('-').to_string()
}

/// Config, tokenizer, and weight files worth pulling for a minimal install.
fn recommended_files(model: &HuggingFaceModel) -> Vec<String> {
    model
        .siblings
        .iter()
        .map(|s| s.rfilename.clone())
        .filter(|name| {
            name == "config.json"
                || name == "generation_config.json"
                || name.starts_with("tokenizer")
                || name.ends_with(".safetensors")
        })
        .collect()
}

/// Client-side filters the HF API cannot express: license and required tags.
pub(crate) fn apply_search_filters(
    models: Vec<HuggingFaceModel>,
    opts: &SearchOptions,
) -> Vec<HuggingFaceModel> {
    models
        .into_iter()
        .filter(|m| {
            if let Some(want) = &opts.license {
                if m.license().as_deref() != Some(want.as_str()) {
                    return false;
                }
            }
            opts.tags.iter().all(|tag| m.tags.contains(tag))
        })
        .take(opts.clamped_limit())
        .collect()
}

#[cfg(test)]
#[path = "insight_tests.rs"]
mod tests;

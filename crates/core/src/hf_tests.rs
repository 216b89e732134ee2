// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn model(id: &str) -> HuggingFaceModel {
    HuggingFaceModel { model_id: id.to_string(), ..Default::default() }
}

#[test]
fn cache_key_lowercases() {
    assert_eq!(model("Qwen/Qwen2.5-0.5B").cache_key(), "qwen/qwen2.5-0.5b");
}

#[test]
fn license_prefers_tag_over_config() {
    let mut m = model("a/b");
    m.tags = vec!["text-generation".to_string(), "license:apache-2.0".to_string()];
    m.config = Some(HfModelConfig { license: Some("mit".to_string()), ..Default::default() });
    assert_eq!(m.license().as_deref(), Some("apache-2.0"));

    m.tags.clear();
    assert_eq!(m.license().as_deref(), Some("mit"));
}

#[test]
fn hf_api_id_alias_deserializes() {
    let m: HuggingFaceModel =
        serde_json::from_str(r#"{"id": "Qwen/Qwen2.5-0.5B", "downloads": 5}"#).unwrap();
    assert_eq!(m.model_id, "Qwen/Qwen2.5-0.5B");
    assert_eq!(m.downloads, 5);
}

#[test]
fn config_preserves_unknown_fields() {
    let cfg: HfModelConfig = serde_json::from_str(
        r#"{"architectures": ["Qwen2ForCausalLM"], "torch_dtype": "bfloat16", "rope_theta": 10000}"#,
    )
    .unwrap();
    assert_eq!(cfg.architectures, vec!["Qwen2ForCausalLM"]);
    assert_eq!(cfg.extra.get("rope_theta").and_then(|v| v.as_i64()), Some(10000));
}

#[test]
fn search_limit_clamps() {
    let opts = SearchOptions { limit: 0, ..Default::default() };
    assert_eq!(opts.clamped_limit(), SEARCH_LIMIT_MAX);
    let opts = SearchOptions { limit: 100, ..Default::default() };
    assert_eq!(opts.clamped_limit(), 25);
    let opts = SearchOptions { limit: 7, ..Default::default() };
    assert_eq!(opts.clamped_limit(), 7);
}

#[test]
fn search_cache_key_is_deterministic_and_case_insensitive() {
    let a = SearchOptions {
        query: Some("Llama".to_string()),
        pipeline_tag: Some("text-generation".to_string()),
        tags: vec!["gguf".to_string()],
        limit: 10,
        ..Default::default()
    };
    let b = SearchOptions { query: Some("llama".to_string()), ..a.clone() };
    assert_eq!(a.cache_key(), b.cache_key());

    let c = SearchOptions { limit: 11, ..a.clone() };
    assert_ne!(a.cache_key(), c.cache_key());
}

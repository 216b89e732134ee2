// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Activation manifest scenarios (no cluster required: manifest building is
//! pure).

use mm_core::{CatalogModel, VllmConfig};
use mm_kube::{build_args, build_manifest, MODEL_ID_ANNOTATION};

/// The literal catalog entry from the activation scenario: tensor parallel
/// 2, bfloat16, and extra args that need sanitizing.
fn scenario_model() -> CatalogModel {
    CatalogModel {
        id: "qwen2.5-0.5b".to_string(),
        hf_model_id: Some("Qwen/Qwen2.5-0.5B".to_string()),
        served_model_name: Some("qwen2.5-0.5b".to_string()),
        vllm: VllmConfig {
            tensor_parallel_size: Some(2),
            dtype: Some("bfloat16".to_string()),
            extra_args: vec![
                "--speculative-decoding".to_string(),
                "eagle".to_string(),
                "".to_string(),
                "--served-model-name bad".to_string(),
                "--custom-flag=1".to_string(),
            ],
            ..Default::default()
        },
        ..Default::default()
    }
}

#[test]
fn activation_args_match_scenario_exactly() {
    assert_eq!(
        build_args(&scenario_model()),
        vec![
            "--tensor-parallel-size",
            "2",
            "--dtype",
            "bfloat16",
            "--served-model-name",
            "qwen2.5-0.5b",
            "--speculative-decoding",
            "eagle",
            "--custom-flag=1",
        ]
    );
}

#[test]
fn manifest_annotation_matches_model_id() {
    // The annotation always carries the activated model's id.
    let obj = build_manifest("venus-model", "serving", &scenario_model());
    assert_eq!(
        obj.metadata.annotations.unwrap().get(MODEL_ID_ANNOTATION).map(String::as_str),
        Some("qwen2.5-0.5b")
    );
    // Args land in the predictor model spec verbatim.
    let args = &obj.data["spec"]["predictor"]["model"]["args"];
    assert_eq!(args[0], "--tensor-parallel-size");
    assert_eq!(args[1], "2");
}

#[test]
fn build_args_is_pure() {
    // Identical inputs, identical outputs.
    let model = scenario_model();
    assert_eq!(build_args(&model), build_args(&model.clone()));
}

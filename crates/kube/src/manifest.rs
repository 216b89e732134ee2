// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Deterministic InferenceService manifest construction.
//!
//! `build_args` is a pure function of the model's vLLM config, hf model id,
//! and served-model name: identical inputs always produce the identical
//! argument vector, so repeated activations of the same catalog entry are
//! no-op updates at the API server.

use kube::api::{ApiResource, DynamicObject};
use kube::core::GroupVersionKind;
use mm_core::CatalogModel;
use serde_json::{json, Map, Value};

/// Annotation carrying the catalog id of the activated model.
pub const MODEL_ID_ANNOTATION: &str = "model-manager/model-id";

/// Annotation flipping the storage initializer to read-write for
/// `pvc://` URIs.
pub const STORAGE_READONLY_ANNOTATION: &str = "storage.kserve.io/readonly";

/// Runtime used when a model does not name one.
const DEFAULT_RUNTIME: &str = "vllm-runtime";

/// The InferenceService custom resource type.
pub fn inference_service_resource() -> ApiResource {
    ApiResource::from_gvk(&GroupVersionKind::gvk(
        "serving.kserve.io",
        "v1beta1",
        "InferenceService",
    ))
}

/// Storage URI for a model: explicit, else `hf://<hfModelId>`, else none.
pub fn resolve_storage_uri(model: &CatalogModel) -> Option<String> {
    if let Some(uri) = &model.storage_uri {
        if !uri.is_empty() {
            return Some(uri.clone());
        }
    }
    model
        .hf_model_id
        .as_ref()
        .filter(|id| !id.is_empty())
        .map(|id| format!("hf://{id}"))
}

/// Deterministic CLI args for the vLLM container.
pub fn build_args(model: &CatalogModel) -> Vec<String> {
    let vllm = &model.vllm;
    let mut args = Vec::new();

    if let Some(tp) = vllm.tensor_parallel_size {
        args.push("--tensor-parallel-size".to_string());
        args.push(tp.to_string());
    }
    if let Some(dtype) = &vllm.dtype {
        args.push("--dtype".to_string());
        args.push(dtype.clone());
    }
    if let Some(util) = vllm.gpu_memory_utilization {
        args.push("--gpu-memory-utilization".to_string());
        args.push(util.to_string());
    }
    if let Some(len) = vllm.max_model_len {
        args.push("--max-model-len".to_string());
        args.push(len.to_string());
    }
    if vllm.trust_remote_code {
        args.push("--trust-remote-code".to_string());
    }
    if let Some(served) = model.served_model_name.as_ref().or(model.hf_model_id.as_ref()) {
        if !served.is_empty() {
            args.push("--served-model-name".to_string());
            args.push(served.clone());
        }
    }
    args.extend(sanitize_extra_args(&vllm.extra_args));
    args
}

/// Trim, drop empties, and drop any entry that tries to smuggle in a
/// `--served-model-name` (that flag is reserved for the controller).
pub fn sanitize_extra_args(extra: &[String]) -> Vec<String> {
    extra
        .iter()
        .map(|arg| arg.trim())
        .filter(|arg| !arg.is_empty())
        .filter(|arg| {
            arg.split_whitespace().next() != Some("--served-model-name")
        })
        .map(str::to_string)
        .collect()
}

/// Build the full custom resource for a model.
pub fn build_manifest(name: &str, namespace: &str, model: &CatalogModel) -> DynamicObject {
    let storage_uri = resolve_storage_uri(model);

    let mut annotations = Map::new();
    annotations.insert(MODEL_ID_ANNOTATION.to_string(), Value::String(model.id.clone()));
    if storage_uri.as_deref().is_some_and(|uri| uri.starts_with("pvc://")) {
        annotations
            .insert(STORAGE_READONLY_ANNOTATION.to_string(), Value::String("false".to_string()));
    }

    let mut model_spec = Map::new();
    model_spec.insert("modelFormat".to_string(), json!({"name": "custom"}));
    model_spec.insert(
        "runtime".to_string(),
        Value::String(model.runtime.clone().unwrap_or_else(|| DEFAULT_RUNTIME.to_string())),
    );
    if let Some(uri) = &storage_uri {
        model_spec.insert("storageUri".to_string(), Value::String(uri.clone()));
    }
    let args = build_args(model);
    if !args.is_empty() {
        model_spec.insert("args".to_string(), json!(args));
    }
    if !model.env.is_empty() {
        model_spec.insert("env".to_string(), json!(model.env));
    }
    let resources = json!(model.resources);
    if resources.as_object().is_some_and(|o| !o.is_empty()) {
        model_spec.insert("resources".to_string(), resources);
    }
    if !model.volume_mounts.is_empty() {
        model_spec.insert("volumeMounts".to_string(), json!(model.volume_mounts));
    }

    let mut predictor = Map::new();
    predictor.insert("model".to_string(), Value::Object(model_spec));
    if !model.node_selector.is_empty() {
        predictor.insert("nodeSelector".to_string(), json!(model.node_selector));
    }
    if !model.tolerations.is_empty() {
        predictor.insert("tolerations".to_string(), json!(model.tolerations));
    }
    if !model.volumes.is_empty() {
        predictor.insert("volumes".to_string(), json!(model.volumes));
    }

    let body = json!({
        "apiVersion": "serving.kserve.io/v1beta1",
        "kind": "InferenceService",
        "metadata": {
            "name": name,
            "namespace": namespace,
            "annotations": annotations,
        },
        "spec": {
            "predictor": predictor,
        },
    });

    let mut obj = DynamicObject::new(name, &inference_service_resource());
    obj.metadata.namespace = Some(namespace.to_string());
    obj.metadata.annotations = Some(
        annotations_to_btree(&body["metadata"]["annotations"]),
    );
    obj.data = json!({"spec": body["spec"].clone()});
    obj
}

fn annotations_to_btree(value: &Value) -> std::collections::BTreeMap<String, String> {
    value
        .as_object()
        .map(|map| {
            map.iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
#[path = "manifest_tests.rs"]
mod tests;

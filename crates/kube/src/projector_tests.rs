// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serde_json::json;
use yare::parameterized;

fn isvc_fixture(ready: &str) -> DynamicObject {
    serde_json::from_value(json!({
        "apiVersion": "serving.kserve.io/v1beta1",
        "kind": "InferenceService",
        "metadata": {"name": "venus-model", "namespace": "serving"},
        "status": {
            "url": "http://venus-model.serving.example.com",
            "conditions": [
                {"type": "PredictorReady", "status": "True"},
                {"type": "Ready", "status": ready, "reason": "Deploying", "message": "rolling out"}
            ]
        }
    }))
    .unwrap()
}

#[test]
fn inference_service_projects_ready_and_url() {
    let status = project_inference_service(&isvc_fixture("True"));
    assert_eq!(status.name, "venus-model");
    assert!(status.ready);
    assert_eq!(status.url.as_deref(), Some("http://venus-model.serving.example.com"));
    assert_eq!(status.conditions.len(), 2);
}

#[test]
fn inference_service_not_ready_when_condition_false() {
    let status = project_inference_service(&isvc_fixture("False"));
    assert!(!status.ready);
    let ready = status.conditions.iter().find(|c| c.condition_type == "Ready").unwrap();
    assert_eq!(ready.reason.as_deref(), Some("Deploying"));
}

#[test]
fn inference_service_without_status_block() {
    let obj: DynamicObject = serde_json::from_value(json!({
        "apiVersion": "serving.kserve.io/v1beta1",
        "kind": "InferenceService",
        "metadata": {"name": "venus-model"}
    }))
    .unwrap();
    let status = project_inference_service(&obj);
    assert!(!status.ready);
    assert!(status.conditions.is_empty());
    assert!(status.url.is_none());
}

#[test]
fn deployment_projects_replica_counters() {
    let deployment: Deployment = serde_json::from_value(json!({
        "metadata": {"name": "venus-model-predictor"},
        "status": {
            "replicas": 2,
            "readyReplicas": 1,
            "availableReplicas": 1,
            "conditions": [
                {"type": "Available", "status": "True", "lastTransitionTime": "2026-07-01T10:00:00Z"}
            ]
        }
    }))
    .unwrap();
    let projected = project_deployment(&deployment);
    assert_eq!(projected.name, "venus-model-predictor");
    assert_eq!(projected.replicas, 2);
    assert_eq!(projected.ready_replicas, 1);
    assert_eq!(projected.available_replicas, 1);
    assert_eq!(projected.conditions[0].condition_type, "Available");
    assert!(projected.conditions[0].last_transition_time.is_some());
}

fn pod_fixture() -> Pod {
    serde_json::from_value(json!({
        "metadata": {"name": "venus-model-predictor-0"},
        "spec": {
            "containers": [
                {
                    "name": "kserve-container",
                    "resources": {
                        "requests": {"cpu": "2", "nvidia.com/gpu": "2"},
                        "limits": {"nvidia.com/gpu": "2"}
                    }
                },
                {
                    "name": "sidecar",
                    "resources": {"requests": {"amd.com/gpu": "1"}}
                }
            ]
        },
        "status": {
            "phase": "Running",
            "startTime": "2026-07-01T10:00:00Z",
            "conditions": [{"type": "Ready", "status": "True"}],
            "containerStatuses": [
                {
                    "name": "kserve-container",
                    "ready": true,
                    "restartCount": 3,
                    "image": "vllm", "imageID": "", "containerID": "",
                    "state": {"running": {"startedAt": "2026-07-01T10:00:00Z"}}
                },
                {
                    "name": "sidecar",
                    "ready": false,
                    "restartCount": 1,
                    "image": "sidecar", "imageID": "", "containerID": "",
                    "state": {"waiting": {"reason": "CrashLoopBackOff"}}
                }
            ]
        }
    }))
    .unwrap()
}

#[test]
fn pod_projects_containers_and_gpus() {
    let projected = project_pod(&pod_fixture());
    assert_eq!(projected.phase, "Running");
    assert_eq!(projected.ready_containers, 1);
    assert_eq!(projected.total_containers, 2);
    assert_eq!(projected.restarts, 4);
    assert_eq!(projected.gpu_requests.get("nvidia.com/gpu"), Some(&2));
    assert_eq!(projected.gpu_requests.get("amd.com/gpu"), Some(&1));
    assert_eq!(projected.gpu_limits.get("nvidia.com/gpu"), Some(&2));
    // CPU is not a GPU resource.
    assert!(!projected.gpu_requests.contains_key("cpu"));
    assert!(projected.start_time.is_some());

    let states: Vec<&str> = projected.containers.iter().map(|c| c.state.as_str()).collect();
    assert_eq!(states, vec!["running", "waiting:CrashLoopBackOff"]);
}

#[parameterized(
    plain = { "2", 2 },
    padded = { " 4 ", 4 },
    suffixed = { "1k", 1 },
    garbage = { "lots", 0 },
)]
fn quantity_parsing(raw: &str, want: i64) {
    assert_eq!(parse_quantity(&Quantity(raw.to_string())), want);
}

#[test]
fn labels_match_requires_exact_name() {
    let mut labels = BTreeMap::new();
    labels.insert(ISVC_LABEL.to_string(), "venus-model".to_string());
    assert!(labels_match(Some(&labels), "venus-model"));
    assert!(!labels_match(Some(&labels), "other"));
    assert!(!labels_match(None, "venus-model"));
}

#[tokio::test]
async fn snapshot_is_a_deep_copy_and_sums_gpus() {
    let bus = mm_broker::EventBus::new();
    // Client construction needs no live cluster for snapshot-only use.
    let config = kube::Config::new("http://localhost:8080".parse().unwrap());
    let client = kube::Client::try_from(config).unwrap();
    let projector = StatusProjector::new(client, "serving", "venus-model", bus);

    let mut pod = pod_fixture();
    pod.metadata.labels = Some({
        let mut l = BTreeMap::new();
        l.insert(ISVC_LABEL.to_string(), "venus-model".to_string());
        l
    });
    projector.apply_pod(&pod);

    let snapshot = projector.snapshot();
    assert_eq!(snapshot.pods.len(), 1);
    // Allocations are the element-wise sum of pod requests.
    assert_eq!(snapshot.gpu_allocations.get("nvidia.com/gpu"), Some(&2));
    assert_eq!(snapshot.gpu_allocations.get("amd.com/gpu"), Some(&1));

    // Mutating the returned snapshot never touches projector state.
    let mut copy = snapshot;
    copy.pods.clear();
    assert_eq!(projector.snapshot().pods.len(), 1);

    // Pod deletion clears the allocations.
    projector.remove_pod("venus-model-predictor-0");
    assert!(projector.snapshot().gpu_allocations.is_empty());
}

#[tokio::test]
async fn unlabeled_resources_are_ignored() {
    let bus = mm_broker::EventBus::new();
    let config = kube::Config::new("http://localhost:8080".parse().unwrap());
    let client = kube::Client::try_from(config).unwrap();
    let projector = StatusProjector::new(client, "serving", "venus-model", bus);

    // No label: the pod belongs to something else.
    projector.apply_pod(&pod_fixture());
    assert!(projector.snapshot().pods.is_empty());
}

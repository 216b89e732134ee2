// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Runtime status projector.
//!
//! Three watch streams (the InferenceService custom resource, its
//! deployments, and its pods) feed one RwLock-guarded snapshot. Handlers do
//! no blocking I/O; the only lock is held for the map mutation. Every change
//! publishes `model.status.updated` with the full snapshot (best-effort:
//! slow subscribers drop).

use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use kube::api::{Api, DynamicObject, ListParams};
use kube::runtime::watcher;
use kube::Client;
use mm_broker::EventBus;
use mm_core::{
    Condition, ContainerStatus, DeploymentStatus, Event, EventType, InferenceServiceStatus,
    PodStatus, RuntimeStatus,
};
use parking_lot::RwLock;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::{KubeError, StatusProvider};

/// Label linking deployments and pods back to the InferenceService.
const ISVC_LABEL: &str = "serving.kserve.io/inferenceservice";

struct ProjectorState {
    inference_service: Option<InferenceServiceStatus>,
    deployments: BTreeMap<String, DeploymentStatus>,
    pods: BTreeMap<String, PodStatus>,
    updated_at: DateTime<Utc>,
}

impl Default for ProjectorState {
    fn default() -> Self {
        Self {
            inference_service: None,
            deployments: BTreeMap::new(),
            pods: BTreeMap::new(),
            updated_at: Utc::now(),
        }
    }
}

/// The projector. Clone freely; all clones share the snapshot.
#[derive(Clone)]
pub struct StatusProjector {
    client: Client,
    namespace: String,
    name: String,
    bus: EventBus,
    state: Arc<RwLock<ProjectorState>>,
}

impl StatusProvider for StatusProjector {
    fn current_status(&self) -> RuntimeStatus {
        self.snapshot()
    }
}

impl StatusProjector {
    pub fn new(
        client: Client,
        namespace: impl Into<String>,
        name: impl Into<String>,
        bus: EventBus,
    ) -> Self {
        Self {
            client,
            namespace: namespace.into(),
            name: name.into(),
            bus,
            state: Arc::new(RwLock::new(ProjectorState::default())),
        }
    }

    /// Deep copy of the current snapshot.
    pub fn snapshot(&self) -> RuntimeStatus {
        let state = self.state.read();
        let mut status = RuntimeStatus {
            inference_service: state.inference_service.clone(),
            deployments: state.deployments.values().cloned().collect(),
            pods: state.pods.values().cloned().collect(),
            gpu_allocations: BTreeMap::new(),
            updated_at: state.updated_at,
        };
        drop(state);
        status.recompute_gpu_allocations();
        status
    }

    /// Seed the snapshot with initial lists, then watch until cancelled.
    ///
    /// The initial list is the cache sync; if it fails the projector cannot
    /// start and the error is fatal to the caller.
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), KubeError> {
        let isvc_api: Api<DynamicObject> = Api::namespaced_with(
            self.client.clone(),
            &self.namespace,
            &crate::manifest::inference_service_resource(),
        );
        let deploy_api: Api<Deployment> = Api::namespaced(self.client.clone(), &self.namespace);
        let pod_api: Api<Pod> = Api::namespaced(self.client.clone(), &self.namespace);

        let selector = format!("{}={}", ISVC_LABEL, self.name);
        let lp = ListParams::default().labels(&selector);

        // Mandatory cache sync.
        if let Some(obj) = isvc_api.get_opt(&self.name).await? {
            self.apply_isvc(&obj);
        }
        for deployment in deploy_api.list(&lp).await? {
            self.apply_deployment(&deployment);
        }
        for pod in pod_api.list(&lp).await? {
            self.apply_pod(&pod);
        }
        self.publish_snapshot().await;

        let isvc_cfg =
            watcher::Config::default().fields(&format!("metadata.name={}", self.name));
        let labeled_cfg = watcher::Config::default().labels(&selector);

        let isvc_task = {
            let projector = self.clone();
            let cancel = cancel.clone();
            let stream = watcher::watcher(isvc_api, isvc_cfg);
            tokio::spawn(async move {
                projector
                    .consume(stream, cancel, |p, ev| match ev {
                        ResourceEvent::Apply(obj) => p.apply_isvc(&obj),
                        ResourceEvent::Delete(_) => p.clear_isvc(),
                    })
                    .await;
            })
        };
        let deploy_task = {
            let projector = self.clone();
            let cancel = cancel.clone();
            let stream = watcher::watcher(deploy_api, labeled_cfg.clone());
            tokio::spawn(async move {
                projector
                    .consume(stream, cancel, |p, ev| match ev {
                        ResourceEvent::Apply(d) => p.apply_deployment(&d),
                        ResourceEvent::Delete(d) => p.remove_deployment(&resource_name(d.metadata.name)),
                    })
                    .await;
            })
        };
        let pod_task = {
            let projector = self.clone();
            let cancel = cancel.clone();
            let stream = watcher::watcher(pod_api, labeled_cfg);
            tokio::spawn(async move {
                projector
                    .consume(stream, cancel, |p, ev| match ev {
                        ResourceEvent::Apply(pod) => p.apply_pod(&pod),
                        ResourceEvent::Delete(pod) => p.remove_pod(&resource_name(pod.metadata.name)),
                    })
                    .await;
            })
        };

        let _ = tokio::join!(isvc_task, deploy_task, pod_task);
        Ok(())
    }

    /// Drive one watcher stream, mapping its events into state mutations and
    /// publishing after each change.
    async fn consume<K>(
        &self,
        stream: impl futures_util::Stream<Item = Result<watcher::Event<K>, watcher::Error>>,
        cancel: CancellationToken,
        mut handle: impl FnMut(&Self, ResourceEvent<K>),
    ) where
        K: Clone + std::fmt::Debug + Send + 'static,
    {
        let mut stream = Box::pin(stream);
        loop {
            let item = tokio::select! {
                _ = cancel.cancelled() => return,
                item = stream.next() => item,
            };
            match item {
                Some(Ok(event)) => {
                    let changed = match event {
                        watcher::Event::Apply(obj) | watcher::Event::InitApply(obj) => {
                            handle(self, ResourceEvent::Apply(obj));
                            true
                        }
                        watcher::Event::Delete(obj) => {
                            handle(self, ResourceEvent::Delete(obj));
                            true
                        }
                        watcher::Event::Init | watcher::Event::InitDone => false,
                    };
                    if changed {
                        self.publish_snapshot().await;
                    }
                }
                Some(Err(e)) => {
                    // The watcher restarts itself; just surface the gap.
                    tracing::warn!(error = %e, "watch stream error");
                }
                None => return,
            }
        }
    }

    fn apply_isvc(&self, obj: &DynamicObject) {
        let projected = project_inference_service(obj);
        let mut state = self.state.write();
        state.inference_service = Some(projected);
        state.updated_at = Utc::now();
    }

    fn clear_isvc(&self) {
        let mut state = self.state.write();
        state.inference_service = None;
        state.updated_at = Utc::now();
    }

    fn apply_deployment(&self, deployment: &Deployment) {
        if !labels_match(deployment.metadata.labels.as_ref(), &self.name) {
            return;
        }
        let projected = project_deployment(deployment);
        let mut state = self.state.write();
        state.deployments.insert(projected.name.clone(), projected);
        state.updated_at = Utc::now();
    }

    fn remove_deployment(&self, name: &str) {
        let mut state = self.state.write();
        state.deployments.remove(name);
        state.updated_at = Utc::now();
    }

    fn apply_pod(&self, pod: &Pod) {
        if !labels_match(pod.metadata.labels.as_ref(), &self.name) {
            return;
        }
        let projected = project_pod(pod);
        let mut state = self.state.write();
        state.pods.insert(projected.name.clone(), projected);
        state.updated_at = Utc::now();
    }

    fn remove_pod(&self, name: &str) {
        let mut state = self.state.write();
        state.pods.remove(name);
        state.updated_at = Utc::now();
    }

    async fn publish_snapshot(&self) {
        let snapshot = self.snapshot();
        let data = serde_json::to_value(&snapshot).unwrap_or_else(|_| json!({}));
        if let Err(e) = self.bus.publish(Event::new(EventType::StatusUpdated, data)).await {
            tracing::warn!(error = %e, "status event publish failed");
        }
    }
}

enum ResourceEvent<K> {
    Apply(K),
    Delete(K),
}

fn resource_name(name: Option<String>) -> String {
    name.unwrap_or_default()
}

fn labels_match(labels: Option<&BTreeMap<String, String>>, name: &str) -> bool {
    labels.is_some_and(|l| l.get(ISVC_LABEL).map(String::as_str) == Some(name))
}

/// Project the custom resource's status block.
pub(crate) fn project_inference_service(obj: &DynamicObject) -> InferenceServiceStatus {
    let status = &obj.data["status"];
    let conditions: Vec<Condition> =
        serde_json::from_value(status["conditions"].clone()).unwrap_or_default();
    let ready = conditions
        .iter()
        .any(|c| c.condition_type == "Ready" && c.status == "True");
    InferenceServiceStatus {
        name: obj.metadata.name.clone().unwrap_or_default(),
        ready,
        url: status["url"].as_str().map(str::to_string),
        conditions,
    }
}

/// Project replica counters and conditions from a deployment.
pub(crate) fn project_deployment(deployment: &Deployment) -> DeploymentStatus {
    let status = deployment.status.as_ref();
    let conditions = status
        .and_then(|s| s.conditions.as_ref())
        .map(|conditions| {
            conditions
                .iter()
                .map(|c| Condition {
                    condition_type: c.type_.clone(),
                    status: c.status.clone(),
                    reason: c.reason.clone(),
                    message: c.message.clone(),
                    last_transition_time: c.last_transition_time.as_ref().map(|t| t.0),
                })
                .collect()
        })
        .unwrap_or_default();

    DeploymentStatus {
        name: deployment.metadata.name.clone().unwrap_or_default(),
        replicas: status.and_then(|s| s.replicas).unwrap_or_default(),
        ready_replicas: status.and_then(|s| s.ready_replicas).unwrap_or_default(),
        available_replicas: status.and_then(|s| s.available_replicas).unwrap_or_default(),
        conditions,
    }
}

/// Project phase, containers, and GPU quantities from a pod.
pub(crate) fn project_pod(pod: &Pod) -> PodStatus {
    let status = pod.status.as_ref();
    let spec = pod.spec.as_ref();

    let conditions = status
        .and_then(|s| s.conditions.as_ref())
        .map(|conditions| {
            conditions
                .iter()
                .map(|c| Condition {
                    condition_type: c.type_.clone(),
                    status: c.status.clone(),
                    reason: c.reason.clone(),
                    message: c.message.clone(),
                    last_transition_time: c.last_transition_time.as_ref().map(|t| t.0),
                })
                .collect()
        })
        .unwrap_or_default();

    let containers: Vec<ContainerStatus> = status
        .and_then(|s| s.container_statuses.as_ref())
        .map(|statuses| {
            statuses
                .iter()
                .map(|c| ContainerStatus {
                    name: c.name.clone(),
                    ready: c.ready,
                    restart_count: c.restart_count,
                    state: condense_container_state(c),
                })
                .collect()
        })
        .unwrap_or_default();

    let mut gpu_requests = BTreeMap::new();
    let mut gpu_limits = BTreeMap::new();
    if let Some(spec) = spec {
        for container in &spec.containers {
            let Some(resources) = &container.resources else { continue };
            collect_gpu_quantities(resources.requests.as_ref(), &mut gpu_requests);
            collect_gpu_quantities(resources.limits.as_ref(), &mut gpu_limits);
        }
    }

    PodStatus {
        name: pod.metadata.name.clone().unwrap_or_default(),
        phase: status.and_then(|s| s.phase.clone()).unwrap_or_default(),
        reason: status.and_then(|s| s.reason.clone()),
        message: status.and_then(|s| s.message.clone()),
        conditions,
        ready_containers: containers.iter().filter(|c| c.ready).count() as i32,
        total_containers: spec.map(|s| s.containers.len()).unwrap_or_default() as i32,
        restarts: containers.iter().map(|c| c.restart_count).sum(),
        containers,
        gpu_requests,
        gpu_limits,
        start_time: status.and_then(|s| s.start_time.as_ref()).map(|t| t.0),
    }
}

fn condense_container_state(c: &k8s_openapi::api::core::v1::ContainerStatus) -> String {
    let Some(state) = &c.state else { return String::new() };
    if state.running.is_some() {
        return "running".to_string();
    }
    if let Some(waiting) = &state.waiting {
        return format!("waiting:{}", waiting.reason.clone().unwrap_or_default());
    }
    if let Some(terminated) = &state.terminated {
        return format!("terminated:{}", terminated.reason.clone().unwrap_or_default());
    }
    String::new()
}

/// Accumulate quantities for any resource whose name mentions a GPU.
fn collect_gpu_quantities(
    quantities: Option<&BTreeMap<String, Quantity>>,
    out: &mut BTreeMap<String, i64>,
) {
    let Some(quantities) = quantities else { return };
    for (resource, quantity) in quantities {
        if resource.to_lowercase().contains("gpu") {
            *out.entry(resource.clone()).or_insert(0) += parse_quantity(quantity);
        }
    }
}

/// GPU quantities are whole device counts; anything unparseable counts zero.
fn parse_quantity(quantity: &Quantity) -> i64 {
    quantity.0.trim().parse::<i64>().unwrap_or_else(|_| {
        let digits: String = quantity.0.chars().take_while(|c| c.is_ascii_digit()).collect();
        digits.parse().unwrap_or(0)
    })
}

#[cfg(test)]
#[path = "projector_tests.rs"]
mod tests;

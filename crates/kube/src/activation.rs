// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Activation controller: create/update/delete the single active
//! InferenceService.
//!
//! Overlapping activations race and last-writer-wins at the custom-resource
//! level; the API server serializes the writes. The controller never queues.

use kube::api::{Api, DeleteParams, DynamicObject, Patch, PatchParams, PostParams};
use kube::Client;
use mm_broker::EventBus;
use mm_core::history::events as history_events;
use mm_core::{CatalogModel, Event, EventType, HistoryEntry};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use crate::manifest::{build_manifest, inference_service_resource, MODEL_ID_ANNOTATION};
use crate::{KubeError, StatusProvider};

/// Field manager for server-side operations.
const FIELD_MANAGER: &str = "model-manager";

/// What an activation or deactivation did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationOutcome {
    Created,
    Updated,
    Deleted,
    AlreadyDeleted,
}

mm_core::simple_display! {
    ActivationOutcome {
        Created => "created",
        Updated => "updated",
        Deleted => "deleted",
        AlreadyDeleted => "already_deleted",
    }
}

/// The contention scan behind [`ActivationController::detect_gpu_contention`].
pub(crate) fn scan_gpu_contention(status: &mm_core::RuntimeStatus) -> GpuContention {
    for pod in &status.pods {
        if pod.phase != "Pending" {
            continue;
        }
        let message = pod.message.clone().unwrap_or_default();
        if message.to_lowercase().contains("gpu") {
            return GpuContention { busy: true, reason: message };
        }
    }
    GpuContention { busy: false, reason: String::new() }
}

/// GPU contention verdict from pending-pod scheduler messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GpuContention {
    pub busy: bool,
    pub reason: String,
}

/// The controller. One per daemon.
pub struct ActivationController {
    client: Client,
    namespace: String,
    name: String,
    bus: EventBus,
    status: Arc<dyn StatusProvider>,
    history: Option<mm_store::Store>,
    http: reqwest::Client,
}

impl ActivationController {
    pub fn new(
        client: Client,
        namespace: impl Into<String>,
        name: impl Into<String>,
        bus: EventBus,
        status: Arc<dyn StatusProvider>,
        history: Option<mm_store::Store>,
    ) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap_or_default();
        Self {
            client,
            namespace: namespace.into(),
            name: name.into(),
            bus,
            status,
            history,
            http,
        }
    }

    fn api(&self) -> Api<DynamicObject> {
        Api::namespaced_with(self.client.clone(), &self.namespace, &inference_service_resource())
    }

    /// Apply a model as the active InferenceService.
    pub async fn activate(&self, model: &CatalogModel) -> Result<ActivationOutcome, KubeError> {
        self.emit(EventType::ActivationStarted, json!({"modelId": model.id})).await;

        let outcome = self.apply(model).await;
        match outcome {
            Ok(action) => {
                self.emit(
                    EventType::ActivationCompleted,
                    json!({"modelId": model.id, "action": action.to_string()}),
                )
                .await;
                self.record(
                    history_events::MODEL_ACTIVATION_COMPLETED,
                    Some(model.id.clone()),
                    json!({"action": action.to_string()}),
                )
                .await;
                Ok(action)
            }
            Err(e) => {
                self.emit(
                    EventType::ActivationFailed,
                    json!({"modelId": model.id, "error": e.to_string()}),
                )
                .await;
                self.record(
                    history_events::MODEL_ACTIVATION_FAILED,
                    Some(model.id.clone()),
                    json!({"error": e.to_string()}),
                )
                .await;
                Err(e)
            }
        }
    }

    async fn apply(&self, model: &CatalogModel) -> Result<ActivationOutcome, KubeError> {
        let api = self.api();
        let manifest = build_manifest(&self.name, &self.namespace, model);

        match api.get_opt(&self.name).await? {
            None => {
                api.create(&PostParams::default(), &manifest).await?;
                Ok(ActivationOutcome::Created)
            }
            Some(_) => {
                let params = PatchParams::apply(FIELD_MANAGER).force();
                api.patch(&self.name, &params, &Patch::Apply(&manifest)).await?;
                Ok(ActivationOutcome::Updated)
            }
        }
    }

    /// Delete the active resource. Absent is success, not an error.
    pub async fn deactivate(&self) -> Result<ActivationOutcome, KubeError> {
        let api = self.api();
        match api.delete(&self.name, &DeleteParams::default()).await {
            Ok(_) => {
                self.emit(EventType::DeactivationCompleted, json!({"action": "deleted"})).await;
                self.record(
                    history_events::MODEL_DEACTIVATION_COMPLETED,
                    None,
                    json!({"action": "deleted"}),
                )
                .await;
                Ok(ActivationOutcome::Deleted)
            }
            Err(kube::Error::Api(ae)) if ae.code == 404 => {
                self.emit(EventType::DeactivationCompleted, json!({"action": "already_deleted"}))
                    .await;
                Ok(ActivationOutcome::AlreadyDeleted)
            }
            Err(e) => {
                self.emit(EventType::DeactivationFailed, json!({"error": e.to_string()})).await;
                Err(e.into())
            }
        }
    }

    /// Build and validate a manifest without mutating anything.
    pub async fn dry_run(&self, model: &CatalogModel) -> Result<DynamicObject, KubeError> {
        let api = self.api();
        let manifest = build_manifest(&self.name, &self.namespace, model);

        match api.get_opt(&self.name).await? {
            None => {
                let params = PostParams { dry_run: true, ..Default::default() };
                api.create(&params, &manifest).await?;
            }
            Some(_) => {
                let mut params = PatchParams::apply(FIELD_MANAGER).force();
                params.dry_run = true;
                api.patch(&self.name, &params, &Patch::Apply(&manifest)).await?;
            }
        }
        Ok(manifest)
    }

    /// Blue/green convenience: verify the current annotation, then activate.
    ///
    /// Not atomic: there is a brief window during rollover.
    pub async fn promote(
        &self,
        candidate: &CatalogModel,
        current_id: Option<&str>,
    ) -> Result<ActivationOutcome, KubeError> {
        if let Some(expected) = current_id {
            let api = self.api();
            let live = api.get_opt(&self.name).await?;
            let actual = live
                .as_ref()
                .and_then(|obj| obj.metadata.annotations.as_ref())
                .and_then(|a| a.get(MODEL_ID_ANNOTATION))
                .cloned();
            if actual.as_deref() != Some(expected) {
                return Err(KubeError::Conflict(format!(
                    "expected active model {expected:?}, found {actual:?}"
                )));
            }
        }
        self.activate(candidate).await
    }

    /// Probe a readiness URL after activation. Non-2xx is a soft warning;
    /// the activation never rolls back.
    pub async fn probe_readiness(&self, url: &str) -> bool {
        match self.http.get(url).send().await {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                tracing::warn!(url, status = response.status().as_u16(), "readiness probe non-2xx");
                false
            }
            Err(e) => {
                tracing::warn!(url, error = %e, "readiness probe failed");
                false
            }
        }
    }

    /// Scan pending pods for scheduler messages mentioning GPUs.
    pub fn detect_gpu_contention(&self) -> GpuContention {
        scan_gpu_contention(&self.status.current_status())
    }

    async fn emit(&self, event_type: EventType, data: serde_json::Value) {
        if let Err(e) = self.bus.publish(Event::new(event_type, data)).await {
            tracing::warn!(event = %event_type, error = %e, "event publish failed");
        }
    }

    async fn record(&self, event: &str, model_id: Option<String>, metadata: serde_json::Value) {
        let Some(store) = &self.history else { return };
        let entry = HistoryEntry::new(event, model_id, metadata);
        if let Err(e) = store.append_history(&entry).await {
            tracing::warn!(event, error = %e, "history write failed");
        }
    }
}

#[cfg(test)]
#[path = "activation_tests.rs"]
mod tests;

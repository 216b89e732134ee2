// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP/JSON facade over the core components, plus the `/events` SSE stream.

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use futures_util::Stream;
use mm_core::history::events as history_events;
use mm_core::{Classify, ErrorClass, HistoryEntry, InstallRequest, JobStatus, RuntimeStatus};
use mm_store::JobFilter;
use serde::Deserialize;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::convert::Infallible;
use std::sync::Arc;

use crate::App;

/// Error envelope every handler returns on failure.
pub struct ApiError {
    class: ErrorClass,
    message: String,
}

impl ApiError {
    fn new(class: ErrorClass, message: impl Into<String>) -> Self {
        Self { class, message: message.into() }
    }

    fn unavailable(what: &str) -> Self {
        Self::new(ErrorClass::Upstream, format!("{what} is not available"))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.class.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(json!({"error": self.message}))).into_response()
    }
}

/// Lift any component error into the HTTP envelope.
fn err(e: impl Classify + std::fmt::Display) -> ApiError {
    ApiError::new(e.class(), e.to_string())
}

type ApiResult<T> = Result<T, ApiError>;

/// Build the full router.
pub fn router(app: Arc<App>) -> Router {
    Router::new()
        .route("/models", get(list_models))
        .route("/models/activate", post(activate_model))
        .route("/models/deactivate", post(deactivate_model))
        .route("/models/promote", post(promote_model))
        .route("/models/dry-run", post(dry_run_model))
        .route("/models/status", get(model_status))
        .route("/models/{id}", get(get_model))
        .route("/active", get(active))
        .route("/weights", get(list_weights).delete(delete_weights))
        .route("/weights/install", post(install_weights))
        .route("/weights/stats", get(weight_stats))
        .route("/jobs", get(list_jobs))
        .route("/jobs/stats", get(job_stats))
        .route("/jobs/{id}", get(get_job))
        .route("/jobs/{id}/logs", get(job_logs))
        .route("/jobs/{id}/cancel", post(cancel_job))
        .route("/jobs/{id}/retry", post(retry_job))
        .route("/history", get(list_history))
        .route("/hf/models/{*id}", get(describe_hf_model))
        .route("/hf/search", get(search_hf))
        .route("/events", get(events))
        .with_state(app)
}

/// Bearer check for mutating endpoints. Disabled unless `API_TOKEN` is set;
/// stored tokens (sha256 of the cleartext) are accepted alongside it.
async fn authorize(app: &App, headers: &HeaderMap) -> ApiResult<()> {
    let Some(required) = &app.config.api_token else { return Ok(()) };

    let presented = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(|| ApiError::new(ErrorClass::Unauthorized, "missing bearer token"))?;

    if presented == required {
        return Ok(());
    }

    let hash = format!("{:x}", Sha256::digest(presented.as_bytes()));
    match app.store.find_token(&hash).await {
        Ok(Some(token)) if !token.is_expired(chrono::Utc::now()) => {
            if let Err(e) = app.store.touch_token(&token.id).await {
                tracing::debug!(error = %e, "token touch failed");
            }
            Ok(())
        }
        Ok(_) => Err(ApiError::new(ErrorClass::Unauthorized, "invalid token")),
        Err(e) => Err(err(e)),
    }
}

// -- models --

async fn list_models(State(app): State<Arc<App>>) -> Json<Value> {
    Json(json!({"models": app.catalog.list(), "count": app.catalog.count()}))
}

async fn get_model(
    State(app): State<Arc<App>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let model = app.catalog.get(&id).map_err(err)?;
    Ok(Json(json!(model)))
}

#[derive(Deserialize)]
struct ActivateBody {
    id: String,
}

async fn activate_model(
    State(app): State<Arc<App>>,
    headers: HeaderMap,
    Json(body): Json<ActivateBody>,
) -> ApiResult<Json<Value>> {
    authorize(&app, &headers).await?;
    let controller = app.controller.as_ref().ok_or_else(|| ApiError::unavailable("kubernetes"))?;
    let model = app.catalog.get(&body.id).map_err(err)?;
    let outcome = controller.activate(&model).await.map_err(err)?;
    spawn_readiness_probe(&app);
    Ok(Json(json!({"action": outcome.to_string(), "modelId": model.id})))
}

/// Soft readiness check against the projected service URL; warnings only,
/// never a rollback.
fn spawn_readiness_probe(app: &Arc<App>) {
    let (Some(controller), Some(projector)) = (app.controller.clone(), app.projector.clone())
    else {
        return;
    };
    tokio::spawn(async move {
        if let Some(url) =
            projector.snapshot().inference_service.and_then(|isvc| isvc.url)
        {
            controller.probe_readiness(&url).await;
        }
    });
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromoteBody {
    candidate_id: String,
    #[serde(default)]
    current_id: Option<String>,
}

async fn promote_model(
    State(app): State<Arc<App>>,
    headers: HeaderMap,
    Json(body): Json<PromoteBody>,
) -> ApiResult<Json<Value>> {
    authorize(&app, &headers).await?;
    let controller = app.controller.as_ref().ok_or_else(|| ApiError::unavailable("kubernetes"))?;
    let candidate = app.catalog.get(&body.candidate_id).map_err(err)?;
    let outcome =
        controller.promote(&candidate, body.current_id.as_deref()).await.map_err(err)?;
    Ok(Json(json!({"action": outcome.to_string(), "modelId": candidate.id})))
}

async fn dry_run_model(
    State(app): State<Arc<App>>,
    headers: HeaderMap,
    Json(body): Json<ActivateBody>,
) -> ApiResult<Json<Value>> {
    authorize(&app, &headers).await?;
    let controller = app.controller.as_ref().ok_or_else(|| ApiError::unavailable("kubernetes"))?;
    let model = app.catalog.get(&body.id).map_err(err)?;
    let manifest = controller.dry_run(&model).await.map_err(err)?;
    Ok(Json(json!({"valid": true, "manifest": manifest})))
}

async fn deactivate_model(
    State(app): State<Arc<App>>,
    headers: HeaderMap,
) -> ApiResult<Json<Value>> {
    authorize(&app, &headers).await?;
    let controller = app.controller.as_ref().ok_or_else(|| ApiError::unavailable("kubernetes"))?;
    let outcome = controller.deactivate().await.map_err(err)?;
    Ok(Json(json!({"action": outcome.to_string()})))
}

async fn model_status(State(app): State<Arc<App>>) -> Json<RuntimeStatus> {
    Json(app.projector.as_ref().map(|p| p.snapshot()).unwrap_or_default())
}

async fn active(State(app): State<Arc<App>>) -> Json<Value> {
    let snapshot = app.projector.as_ref().map(|p| p.snapshot()).unwrap_or_default();
    match snapshot.inference_service {
        Some(isvc) => Json(json!({"status": "active", "inferenceservice": isvc})),
        None => Json(json!({"status": "none"})),
    }
}

// -- weights --

async fn install_weights(
    State(app): State<Arc<App>>,
    headers: HeaderMap,
    Json(body): Json<InstallRequest>,
) -> ApiResult<Response> {
    authorize(&app, &headers).await?;
    let (job, paths) = app.engine.submit(body).await.map_err(err)?;
    let body = json!({
        "job": job,
        "target": paths.target,
        "storageUri": paths.storage_uri,
        "inferenceModelPath": paths.inference_model_path,
    });
    Ok((StatusCode::ACCEPTED, Json(body)).into_response())
}

async fn list_weights(State(app): State<Arc<App>>) -> ApiResult<Json<Value>> {
    let installs = app.weights.list().map_err(err)?;
    Ok(Json(json!({"weights": installs})))
}

#[derive(Deserialize)]
struct DeleteWeightsBody {
    name: String,
}

async fn delete_weights(
    State(app): State<Arc<App>>,
    headers: HeaderMap,
    Json(body): Json<DeleteWeightsBody>,
) -> ApiResult<Json<Value>> {
    authorize(&app, &headers).await?;
    app.weights.delete(&body.name).map_err(err)?;
    let entry = HistoryEntry::new(
        history_events::WEIGHT_DELETED,
        Some(body.name.clone()),
        json!({"name": body.name}),
    );
    if let Err(e) = app.store.append_history(&entry).await {
        tracing::warn!(error = %e, "history write failed");
    }
    Ok(Json(json!({"deleted": body.name})))
}

async fn weight_stats(State(app): State<Arc<App>>) -> ApiResult<Json<Value>> {
    let stats = app.weights.stats().map_err(err)?;
    Ok(Json(json!(stats)))
}

// -- jobs --

#[derive(Deserialize)]
struct JobsQuery {
    limit: Option<usize>,
    status: Option<String>,
    #[serde(rename = "type")]
    job_type: Option<String>,
    #[serde(rename = "modelId")]
    model_id: Option<String>,
}

async fn list_jobs(
    State(app): State<Arc<App>>,
    Query(query): Query<JobsQuery>,
) -> ApiResult<Json<Value>> {
    let status = match query.status.as_deref() {
        Some(raw) => Some(
            JobStatus::parse(raw)
                .ok_or_else(|| ApiError::new(ErrorClass::Invalid, format!("unknown status {raw:?}")))?,
        ),
        None => None,
    };
    let job_type = match query.job_type.as_deref() {
        None => None,
        Some("weight_install") => Some(mm_core::JobType::WeightInstall),
        Some(other) => {
            return Err(ApiError::new(ErrorClass::Invalid, format!("unknown type {other:?}")))
        }
    };
    let filter = JobFilter { limit: query.limit, status, job_type, model_id: query.model_id };
    let jobs = app.store.list_jobs(&filter).await.map_err(err)?;
    Ok(Json(json!({"jobs": jobs})))
}

/// Per-status counts plus the approximate queue depth (the gauge inputs).
async fn job_stats(State(app): State<Arc<App>>) -> ApiResult<Json<Value>> {
    let counts = app.store.count_jobs_by_status().await.map_err(err)?;
    let queue_depth = match &app.queue {
        Some(queue) => queue.depth().await.ok(),
        None => None,
    };
    Ok(Json(json!({"byStatus": counts, "queueDepth": queue_depth})))
}

async fn get_job(State(app): State<Arc<App>>, Path(id): Path<String>) -> ApiResult<Json<Value>> {
    let job = app.store.get_job(&id).await.map_err(err)?;
    Ok(Json(json!(job)))
}

async fn job_logs(State(app): State<Arc<App>>, Path(id): Path<String>) -> ApiResult<Json<Value>> {
    let job = app.store.get_job(&id).await.map_err(err)?;
    Ok(Json(json!({"jobId": id, "logs": job.logs})))
}

async fn cancel_job(
    State(app): State<Arc<App>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    authorize(&app, &headers).await?;
    let job = app.engine.cancel(&id).await.map_err(err)?;
    Ok(Json(json!(job)))
}

async fn retry_job(
    State(app): State<Arc<App>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    authorize(&app, &headers).await?;
    let job = app.engine.retry(&id).await.map_err(err)?;
    Ok(Json(json!(job)))
}

// -- history --

#[derive(Deserialize)]
struct HistoryQuery {
    limit: Option<usize>,
    offset: Option<usize>,
}

async fn list_history(
    State(app): State<Arc<App>>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Json<Value>> {
    let entries = app
        .store
        .list_history(query.limit.unwrap_or(50), query.offset.unwrap_or(0))
        .await
        .map_err(err)?;
    Ok(Json(json!({"history": entries})))
}

// -- discovery --

#[derive(Deserialize)]
struct DescribeQuery {
    #[serde(default, rename = "autoDetect")]
    auto_detect: bool,
}

async fn describe_hf_model(
    State(app): State<Arc<App>>,
    Path(id): Path<String>,
    Query(query): Query<DescribeQuery>,
) -> ApiResult<Json<Value>> {
    let insight = app.discovery.describe(&id, query.auto_detect).await.map_err(err)?;
    Ok(Json(json!(insight)))
}

async fn search_hf(
    State(app): State<Arc<App>>,
    Query(opts): Query<mm_core::SearchOptions>,
) -> ApiResult<Json<Value>> {
    let insights = app.discovery.search(&opts).await.map_err(err)?;
    Ok(Json(json!({"results": insights})))
}

// -- events --

/// Server-sent events: one frame per bus event, `event:`/`id:`/`data:`.
async fn events(
    State(app): State<Arc<App>>,
) -> Sse<impl Stream<Item = Result<SseEvent, Infallible>>> {
    let (rx, guard) = app.bus.subscribe();
    let stream = futures_util::stream::unfold((rx, guard), |(mut rx, guard)| async move {
        let event = rx.recv().await?;
        let frame = SseEvent::default()
            .event(event.event_type.to_string())
            .id(event.id.to_string())
            .data(event.data.to_string());
        Some((Ok(frame), (rx, guard)))
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}

#[cfg(test)]
#[path = "api_tests.rs"]
mod tests;

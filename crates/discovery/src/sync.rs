// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Periodic Hugging Face refresh.
//!
//! Each cycle fans out over the configured query set, merges by lowercased
//! model id, and hands the de-duplicated set to the cache's `save`.
//! Individual query failures are logged and skipped; the cycle fails only
//! when no query produced anything.

use mm_broker::EventBus;
use mm_core::{Event, EventType, HuggingFaceModel, SearchOptions};
use serde_json::json;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use crate::Discovery;

/// Query set a refresh cycle walks.
#[derive(Debug, Clone)]
pub struct SyncQueries {
    /// Pipeline tags fetched individually (e.g. `text-generation`).
    pub pipeline_tags: Vec<String>,
    /// Free-text search terms fetched individually.
    pub search_terms: Vec<String>,
}

impl Default for SyncQueries {
    fn default() -> Self {
        Self {
            pipeline_tags: vec!["text-generation".to_string()],
            search_terms: Vec::new(),
        }
    }
}

/// The refresh service.
pub struct SyncService {
    discovery: Discovery,
    bus: EventBus,
    interval: Duration,
    queries: SyncQueries,
}

impl SyncService {
    pub fn new(
        discovery: Discovery,
        bus: EventBus,
        interval: Duration,
        queries: SyncQueries,
    ) -> Self {
        Self { discovery, bus, interval, queries }
    }

    /// Tick until cancelled. The first cycle runs after one full interval so
    /// startup is not serialized behind Hugging Face.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        ticker.tick().await; // immediate first tick

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = ticker.tick() => {}
            }
            if cancel.is_cancelled() {
                return;
            }
            self.run_once().await;
        }
    }

    /// One refresh cycle.
    pub async fn run_once(&self) {
        let started = Instant::now();
        self.emit(EventType::HfRefreshStarted, json!({})).await;

        let mut merged: HashMap<String, HuggingFaceModel> = HashMap::new();
        for opts in self.query_set() {
            match self.discovery.search_models(&opts).await {
                Ok(models) => {
                    for model in models {
                        merged.insert(model.cache_key(), model);
                    }
                }
                Err(e) => {
                    tracing::warn!(query = %opts.cache_key(), error = %e, "refresh query failed");
                }
            }
        }

        let elapsed_ms = started.elapsed().as_millis() as u64;
        if merged.is_empty() {
            tracing::warn!(elapsed_ms, "hf refresh produced no models");
            self.emit(
                EventType::HfRefreshFailed,
                json!({"durationMs": elapsed_ms, "error": "no models produced"}),
            )
            .await;
            return;
        }

        let models: Vec<HuggingFaceModel> = merged.into_values().collect();
        let count = models.len();
        if let Err(e) = self.discovery.save(&models).await {
            tracing::warn!(error = %e, "refresh save failed");
            self.emit(
                EventType::HfRefreshFailed,
                json!({"durationMs": elapsed_ms, "error": e.to_string()}),
            )
            .await;
            return;
        }

        tracing::info!(count, elapsed_ms, "hf refresh completed");
        self.emit(
            EventType::HfRefreshCompleted,
            json!({"count": count, "durationMs": elapsed_ms}),
        )
        .await;
    }

    /// Global top-downloads plus one query per pipeline tag and search term.
    fn query_set(&self) -> Vec<SearchOptions> {
        let mut set = vec![SearchOptions {
            sort: Some("downloads".to_string()),
            direction: Some("-1".to_string()),
            ..Default::default()
        }];
        for tag in &self.queries.pipeline_tags {
            set.push(SearchOptions {
                pipeline_tag: Some(tag.clone()),
                sort: Some("downloads".to_string()),
                ..Default::default()
            });
        }
        for term in &self.queries.search_terms {
            set.push(SearchOptions { query: Some(term.clone()), ..Default::default() });
        }
        set
    }

    async fn emit(&self, event_type: EventType, data: serde_json::Value) {
        if let Err(e) = self.bus.publish(Event::new(event_type, data)).await {
            tracing::warn!(event = %event_type, error = %e, "refresh event publish failed");
        }
    }
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! mm-discovery: Hugging Face / vLLM discovery with a layered TTL cache,
//! plus the periodic refresh service.
//!
//! Reads go local map → broker KV → datastore fallback → upstream; writes go
//! to every layer. Cached values are owned clones on both sides of the
//! boundary, so no caller ever aliases cache-internal state.

mod cache;
mod hf_api;
mod insight;
mod sync;
mod vllm;

pub use cache::ModelCache;
pub use hf_api::HfClient;
pub use insight::{detect_vllm_settings, suggest_catalog};
pub use sync::{SyncQueries, SyncService};
pub use vllm::VllmCatalog;

use async_trait::async_trait;
use mm_core::{Classify, ErrorClass, HuggingFaceModel, ModelInsight, SearchOptions};
use std::sync::Arc;
use thiserror::Error;

/// Discovery errors.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("model not found: {0}")]
    NotFound(String),

    #[error("upstream returned {status}: {snippet}")]
    Upstream { status: u16, snippet: String },

    #[error("http: {0}")]
    Http(#[from] reqwest::Error),

    #[error("encoding: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("fallback store: {0}")]
    Fallback(String),
}

impl Classify for DiscoveryError {
    fn class(&self) -> ErrorClass {
        match self {
            DiscoveryError::NotFound(_) => ErrorClass::NotFound,
            DiscoveryError::Upstream { .. } | DiscoveryError::Http(_) => ErrorClass::Upstream,
            DiscoveryError::Encoding(_) | DiscoveryError::Fallback(_) => ErrorClass::Storage,
        }
    }
}

/// Durable fallback tier for cached HF metadata (the datastore's HF table).
#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn save_models(&self, models: &[HuggingFaceModel]) -> Result<(), DiscoveryError>;
    async fn get_model(&self, key: &str) -> Result<Option<HuggingFaceModel>, DiscoveryError>;
}

#[async_trait]
impl MetadataStore for mm_store::Store {
    async fn save_models(&self, models: &[HuggingFaceModel]) -> Result<(), DiscoveryError> {
        self.save_hf_models(models).await.map_err(|e| DiscoveryError::Fallback(e.to_string()))
    }

    async fn get_model(&self, key: &str) -> Result<Option<HuggingFaceModel>, DiscoveryError> {
        self.get_hf_model(key).await.map_err(|e| DiscoveryError::Fallback(e.to_string()))
    }
}

/// The discovery service: HF metadata, vLLM compatibility, suggestions.
#[derive(Clone)]
pub struct Discovery {
    hf: HfClient,
    vllm: VllmCatalog,
    cache: ModelCache,
    fallback: Option<Arc<dyn MetadataStore>>,
}

impl Discovery {
    pub fn new(
        hf: HfClient,
        vllm: VllmCatalog,
        cache: ModelCache,
        fallback: Option<Arc<dyn MetadataStore>>,
    ) -> Self {
        Self { hf, vllm, cache, fallback }
    }

    /// Full insight for one model.
    pub async fn describe(
        &self,
        model_id: &str,
        auto_detect: bool,
    ) -> Result<ModelInsight, DiscoveryError> {
        let model = self.fetch_model(model_id).await?;
        self.insight_for(model, auto_detect).await
    }

    /// Search Hugging Face and return insights. Results are cached under a
    /// deterministic key derived from every option field.
    pub async fn search(&self, opts: &SearchOptions) -> Result<Vec<ModelInsight>, DiscoveryError> {
        let models = self.search_models(opts).await?;
        let mut insights = Vec::with_capacity(models.len());
        for model in models {
            insights.push(self.insight_for(model, false).await?);
        }
        Ok(insights)
    }

    /// Search returning raw models (the sync service consumes this form).
    pub async fn search_models(
        &self,
        opts: &SearchOptions,
    ) -> Result<Vec<HuggingFaceModel>, DiscoveryError> {
        let key = opts.cache_key();
        if let Some(cached) = self.cache.get_list(&key).await {
            return Ok(cached);
        }

        let fetched = match self.hf.search(opts).await {
            Ok(models) => models,
            Err(e) => {
                tracing::warn!(error = %e, "hf search failed with cold cache");
                return Err(e);
            }
        };
        let filtered = insight::apply_search_filters(fetched, opts);
        self.cache.put_list(&key, &filtered).await;
        Ok(filtered)
    }

    /// Build the suggested catalog entry for a model.
    pub async fn suggest(
        &self,
        model_id: &str,
        auto_detect: bool,
    ) -> Result<mm_core::CatalogModel, DiscoveryError> {
        let model = self.fetch_model(model_id).await?;
        Ok(suggest_catalog(&model, auto_detect))
    }

    /// Persist models through every cache layer.
    pub async fn save(&self, models: &[HuggingFaceModel]) -> Result<(), DiscoveryError> {
        self.cache.save(models).await;
        if let Some(fallback) = &self.fallback {
            fallback.save_models(models).await?;
        }
        Ok(())
    }

    /// Read-through fetch: cache layers, then upstream, then the datastore
    /// when upstream is down.
    async fn fetch_model(&self, model_id: &str) -> Result<HuggingFaceModel, DiscoveryError> {
        let key = model_id.to_lowercase();
        if let Some(cached) = self.cache.get_model(&key).await {
            return Ok(cached);
        }

        match self.hf.get_model(model_id).await {
            Ok(model) => {
                self.cache.put_model(&model).await;
                Ok(model)
            }
            Err(e) => {
                if let Some(fallback) = &self.fallback {
                    if let Some(stale) = fallback.get_model(&key).await? {
                        tracing::warn!(model_id, error = %e, "serving datastore copy, upstream down");
                        return Ok(stale);
                    }
                }
                Err(e)
            }
        }
    }

    async fn insight_for(
        &self,
        model: HuggingFaceModel,
        auto_detect: bool,
    ) -> Result<ModelInsight, DiscoveryError> {
        let modules = self.vllm.architectures().await.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "vllm architecture set unavailable");
            Arc::new(Default::default())
        });
        Ok(insight::build_insight(model, &modules, auto_detect))
    }
}

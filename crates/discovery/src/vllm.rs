// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! vLLM supported-architecture set, fetched from the model registry source
//! and cached with its own TTL.

use parking_lot::Mutex;
use regex::Regex;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::hf_api::check_status;
use crate::DiscoveryError;

const REGISTRY_URL: &str =
    "https://raw.githubusercontent.com/vllm-project/vllm/main/vllm/model_executor/models/registry.py";

/// Cached set of architecture class names vLLM can serve, lowercased.
#[derive(Clone)]
pub struct VllmCatalog {
    http: reqwest::Client,
    url: String,
    token: Option<String>,
    ttl: Duration,
    cached: Arc<Mutex<Option<(Instant, Arc<HashSet<String>>)>>>,
}

impl VllmCatalog {
    pub fn new(token: Option<String>, ttl: Duration) -> Self {
        Self::with_url(REGISTRY_URL, token, ttl)
    }

    pub fn with_url(url: impl Into<String>, token: Option<String>, ttl: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("model-manager/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_default();
        Self { http, url: url.into(), token, ttl, cached: Arc::new(Mutex::new(None)) }
    }

    /// The architecture set, refreshed when the TTL lapses. A stale copy is
    /// served if the refresh fails.
    pub async fn architectures(&self) -> Result<Arc<HashSet<String>>, DiscoveryError> {
        if let Some((at, set)) = self.cached.lock().clone() {
            if at.elapsed() < self.ttl {
                return Ok(set);
            }
        }

        match self.fetch().await {
            Ok(set) => {
                let set = Arc::new(set);
                *self.cached.lock() = Some((Instant::now(), Arc::clone(&set)));
                Ok(set)
            }
            Err(e) => {
                if let Some((_, stale)) = self.cached.lock().clone() {
                    tracing::warn!(error = %e, "serving stale vllm architecture set");
                    return Ok(stale);
                }
                Err(e)
            }
        }
    }

    async fn fetch(&self) -> Result<HashSet<String>, DiscoveryError> {
        let mut builder = self.http.get(&self.url);
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token);
        }
        let response = check_status(builder.send().await?).await?;
        let body = response.text().await?;
        Ok(parse_registry(&body))
    }
}

/// Extract architecture class names from vLLM's `registry.py`.
///
/// Entries look like `"Qwen2ForCausalLM": ("qwen2", "Qwen2ForCausalLM"),`
/// inside the `_*_MODELS` dictionaries.
pub(crate) fn parse_registry(source: &str) -> HashSet<String> {
    // Dict keys at line start, quoted, followed by a colon.
    let Ok(re) = Regex::new(r#"(?m)^\s*"([A-Za-z0-9_]+)"\s*:"#) else {
        return HashSet::new();
    };
    re.captures_iter(source)
        .map(|caps| caps[1].to_lowercase())
        .collect()
}

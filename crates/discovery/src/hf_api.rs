// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Thin Hugging Face API client.

use mm_core::{HuggingFaceModel, SearchOptions};
use std::time::Duration;

use crate::DiscoveryError;

const DEFAULT_BASE: &str = "https://huggingface.co";

/// Client for `huggingface.co/api/models`.
#[derive(Clone)]
pub struct HfClient {
    http: reqwest::Client,
    base: String,
    token: Option<String>,
}

impl HfClient {
    pub fn new(token: Option<String>) -> Self {
        Self::with_base(DEFAULT_BASE, token)
    }

    /// Point at a different API host (tests use a local server).
    pub fn with_base(base: impl Into<String>, token: Option<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("model-manager/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_default();
        Self { http, base: base.into(), token }
    }

    /// Fetch one model's metadata.
    pub async fn get_model(&self, model_id: &str) -> Result<HuggingFaceModel, DiscoveryError> {
        let url = format!("{}/api/models/{}", self.base, model_id);
        let response = self.request(&url, &[]).await?;
        if response.status().as_u16() == 404 {
            return Err(DiscoveryError::NotFound(model_id.to_string()));
        }
        let response = check_status(response).await?;
        Ok(response.json().await?)
    }

    /// Bulk search. Server-side parameters only; tag/license filters that the
    /// API cannot express are applied by the caller.
    pub async fn search(
        &self,
        opts: &SearchOptions,
    ) -> Result<Vec<HuggingFaceModel>, DiscoveryError> {
        let url = format!("{}/api/models", self.base);
        let limit = opts.clamped_limit().to_string();
        let mut params: Vec<(&str, &str)> = vec![("limit", &limit), ("full", "true"), ("config", "true")];
        if let Some(query) = opts.query.as_deref() {
            params.push(("search", query));
        }
        if let Some(author) = opts.author.as_deref() {
            params.push(("author", author));
        }
        if let Some(tag) = opts.pipeline_tag.as_deref() {
            params.push(("pipeline_tag", tag));
        }
        if let Some(sort) = opts.sort.as_deref() {
            params.push(("sort", sort));
        }
        if let Some(direction) = opts.direction.as_deref() {
            params.push(("direction", direction));
        }

        let response = check_status(self.request(&url, &params).await?).await?;
        Ok(response.json().await?)
    }

    async fn request(
        &self,
        url: &str,
        params: &[(&str, &str)],
    ) -> Result<reqwest::Response, DiscoveryError> {
        let mut builder = self.http.get(url).query(params);
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token);
        }
        Ok(builder.send().await?)
    }
}

/// Surface a non-2xx as `Upstream` with a body snippet.
pub(crate) async fn check_status(
    response: reqwest::Response,
) -> Result<reqwest::Response, DiscoveryError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let snippet: String = response
        .text()
        .await
        .unwrap_or_default()
        .chars()
        .take(200)
        .collect();
    Err(DiscoveryError::Upstream { status: status.as_u16(), snippet })
}

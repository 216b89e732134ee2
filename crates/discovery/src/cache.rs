// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Two-tier TTL cache: in-process map plus broker key-value store.
//!
//! Keys are lowercased model ids for single entries and the deterministic
//! search key for lists. Broker failures degrade to the local tier with a
//! log line; they never fail a read.

use chrono::{DateTime, Utc};
use mm_broker::Broker;
use mm_core::HuggingFaceModel;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

const MODEL_KEY_PREFIX: &str = "hf:model:";
const LIST_KEY_PREFIX: &str = "hf:list:";

/// Key of the most recent bulk snapshot.
pub const BULK_LIST_KEY: &str = "all";

struct Entry {
    at: DateTime<Utc>,
    json: String,
}

/// The layered cache handle. Cheap to clone.
#[derive(Clone)]
pub struct ModelCache {
    ttl: Duration,
    local: Arc<Mutex<HashMap<String, Entry>>>,
    broker: Option<Broker>,
}

impl ModelCache {
    pub fn new(ttl: Duration, broker: Option<Broker>) -> Self {
        Self { ttl, local: Arc::new(Mutex::new(HashMap::new())), broker }
    }

    /// Read one model. Checks the local tier, then the broker.
    pub async fn get_model(&self, key: &str) -> Option<HuggingFaceModel> {
        self.get_json(&format!("{MODEL_KEY_PREFIX}{key}")).await
    }

    /// Write one model to both tiers.
    pub async fn put_model(&self, model: &HuggingFaceModel) {
        self.put_json(&format!("{MODEL_KEY_PREFIX}{}", model.cache_key()), model).await;
    }

    /// Read a cached list (search result or bulk snapshot).
    pub async fn get_list(&self, key: &str) -> Option<Vec<HuggingFaceModel>> {
        self.get_json(&format!("{LIST_KEY_PREFIX}{key}")).await
    }

    /// Write a cached list to both tiers.
    pub async fn put_list(&self, key: &str, models: &[HuggingFaceModel]) {
        self.put_json(&format!("{LIST_KEY_PREFIX}{key}"), &models.to_vec()).await;
    }

    /// Persist a bulk refresh: every model individually plus the list key.
    pub async fn save(&self, models: &[HuggingFaceModel]) {
        for model in models {
            self.put_model(model).await;
        }
        self.put_list(BULK_LIST_KEY, models).await;
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, full_key: &str) -> Option<T> {
        {
            let local = self.local.lock();
            if let Some(entry) = local.get(full_key) {
                if Utc::now() - entry.at
                    < chrono::Duration::from_std(self.ttl).unwrap_or_default()
                {
                    // Deserializing the stored JSON yields an owned value,
                    // never a reference into the cache.
                    if let Ok(value) = serde_json::from_str(&entry.json) {
                        return Some(value);
                    }
                }
            }
        }

        let broker = self.broker.as_ref()?;
        match broker.kv_get(full_key).await {
            Ok(Some(json)) => match serde_json::from_str(&json) {
                Ok(value) => {
                    self.local
                        .lock()
                        .insert(full_key.to_string(), Entry { at: Utc::now(), json });
                    Some(value)
                }
                Err(e) => {
                    tracing::warn!(key = %full_key, error = %e, "undecodable broker cache entry");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                tracing::debug!(key = %full_key, error = %e, "broker cache read failed");
                None
            }
        }
    }

    async fn put_json<T: serde::Serialize>(&self, full_key: &str, value: &T) {
        let json = match serde_json::to_string(value) {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!(key = %full_key, error = %e, "cache encode failed");
                return;
            }
        };
        self.local
            .lock()
            .insert(full_key.to_string(), Entry { at: Utc::now(), json: json.clone() });
        if let Some(broker) = &self.broker {
            if let Err(e) = broker.kv_set(full_key, &json, self.ttl).await {
                tracing::debug!(key = %full_key, error = %e, "broker cache write failed");
            }
        }
    }
}

#[cfg(test)]
#[path = "cache_tests.rs"]
mod tests;

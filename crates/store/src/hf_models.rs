// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Hugging Face metadata rows, the datastore tier of the discovery cache.

use chrono::Utc;
use mm_core::HuggingFaceModel;
use sqlx::Row;

use crate::{fmt_ts, Store, StoreError};

impl Store {
    /// Upsert a batch of HF models, keyed by lowercased model id.
    pub async fn save_hf_models(&self, models: &[HuggingFaceModel]) -> Result<(), StoreError> {
        let mut tx = self.pool().begin().await?;
        let sql = self.rebind(
            "INSERT INTO hf_models (model_id, data, updated_at) VALUES (?, ?, ?) \
             ON CONFLICT (model_id) DO UPDATE SET data = excluded.data, \
             updated_at = excluded.updated_at",
        );
        let now = fmt_ts(Utc::now());
        for model in models {
            sqlx::query(&sql)
                .bind(model.cache_key())
                .bind(serde_json::to_string(model)?)
                .bind(&now)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Fetch one cached model by lowercased id.
    pub async fn get_hf_model(&self, key: &str) -> Result<Option<HuggingFaceModel>, StoreError> {
        let sql = self.rebind("SELECT data FROM hf_models WHERE model_id = ?");
        let row = sqlx::query(&sql)
            .bind(key.to_lowercase())
            .fetch_optional(self.pool())
            .await?;
        match row {
            Some(row) => {
                let raw: String = row.try_get("data")?;
                Ok(Some(serde_json::from_str(&raw)?))
            }
            None => Ok(None),
        }
    }

    /// All cached HF models.
    pub async fn list_hf_models(&self) -> Result<Vec<HuggingFaceModel>, StoreError> {
        let rows = sqlx::query("SELECT data FROM hf_models ORDER BY model_id")
            .fetch_all(self.pool())
            .await?;
        rows.into_iter()
            .map(|row| {
                let raw: String = row.try_get("data")?;
                Ok(serde_json::from_str(&raw)?)
            })
            .collect()
    }
}

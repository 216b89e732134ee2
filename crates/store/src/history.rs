// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Append-only history rows.

use chrono::{DateTime, Utc};
use mm_core::{HistoryEntry, HistoryId};
use sqlx::Row;

use crate::{fmt_ts, parse_ts, Store, StoreError};

impl Store {
    pub async fn append_history(&self, entry: &HistoryEntry) -> Result<(), StoreError> {
        let sql = self.rebind(
            "INSERT INTO history (id, event, model_id, metadata, created_at) VALUES (?, ?, ?, ?, ?)",
        );
        sqlx::query(&sql)
            .bind(entry.id.as_str())
            .bind(&entry.event)
            .bind(entry.model_id.as_deref())
            .bind(serde_json::to_string(&entry.metadata)?)
            .bind(fmt_ts(entry.created_at))
            .execute(self.pool())
            .await?;
        Ok(())
    }

    /// Newest-first page of history entries.
    pub async fn list_history(
        &self,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<HistoryEntry>, StoreError> {
        let sql = self
            .rebind("SELECT * FROM history ORDER BY created_at DESC LIMIT ? OFFSET ?");
        let rows = sqlx::query(&sql)
            .bind(limit as i64)
            .bind(offset as i64)
            .fetch_all(self.pool())
            .await?;

        rows.into_iter()
            .map(|row| {
                let metadata_raw: String = row.try_get("metadata")?;
                let created_raw: String = row.try_get("created_at")?;
                Ok(HistoryEntry {
                    id: HistoryId::from_string(row.try_get::<String, _>("id")?),
                    event: row.try_get("event")?,
                    model_id: row.try_get("model_id")?,
                    metadata: serde_json::from_str(&metadata_raw)?,
                    created_at: parse_ts(&created_raw)?,
                })
            })
            .collect()
    }

    /// Purge history entries older than `cutoff`. Returns the number purged.
    pub async fn cleanup_history_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let sql = self.rebind("DELETE FROM history WHERE created_at < ?");
        Ok(sqlx::query(&sql).bind(fmt_ts(cutoff)).execute(self.pool()).await?.rows_affected())
    }
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Single-row catalog snapshot.
//!
//! Caches the full catalog so a cold start serves models before the git
//! sidecar has populated the disk.

use chrono::{DateTime, Utc};
use mm_core::CatalogModel;
use sqlx::Row;

use crate::{fmt_ts, parse_ts, Store, StoreError};

impl Store {
    /// Replace the snapshot row with the given catalog.
    pub async fn save_catalog_snapshot(&self, models: &[CatalogModel]) -> Result<(), StoreError> {
        let sql = self.rebind(
            "INSERT INTO catalog_snapshot (id, snapshot, updated_at) VALUES (1, ?, ?) \
             ON CONFLICT (id) DO UPDATE SET snapshot = excluded.snapshot, \
             updated_at = excluded.updated_at",
        );
        sqlx::query(&sql)
            .bind(serde_json::to_string(models)?)
            .bind(fmt_ts(Utc::now()))
            .execute(self.pool())
            .await?;
        Ok(())
    }

    /// Load the snapshot, if one has ever been written.
    pub async fn load_catalog_snapshot(
        &self,
    ) -> Result<Option<(Vec<CatalogModel>, DateTime<Utc>)>, StoreError> {
        let row = sqlx::query("SELECT snapshot, updated_at FROM catalog_snapshot WHERE id = 1")
            .fetch_optional(self.pool())
            .await?;
        match row {
            Some(row) => {
                let raw: String = row.try_get("snapshot")?;
                let updated_raw: String = row.try_get("updated_at")?;
                Ok(Some((serde_json::from_str(&raw)?, parse_ts(&updated_raw)?)))
            }
            None => Ok(None),
        }
    }
}

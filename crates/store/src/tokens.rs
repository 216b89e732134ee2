// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! API token rows.
//!
//! The daemon accepts either the static `API_TOKEN` or a stored token row;
//! `last_used_at` is stamped on every successful check.

use chrono::{DateTime, Utc};
use sqlx::Row;

use crate::{fmt_ts, opt_ts, parse_ts, Store, StoreError};

/// A stored API token (hash only; the cleartext never persists).
#[derive(Debug, Clone, PartialEq)]
pub struct TokenRecord {
    pub id: String,
    pub name: String,
    pub token_hash: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub last_used_at: Option<DateTime<Utc>>,
}

impl TokenRecord {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|t| t < now)
    }
}

impl Store {
    pub async fn create_token(
        &self,
        id: &str,
        name: &str,
        token_hash: &str,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError> {
        let sql = self.rebind(
            "INSERT INTO tokens (id, name, token_hash, created_at, expires_at) VALUES (?, ?, ?, ?, ?)",
        );
        sqlx::query(&sql)
            .bind(id)
            .bind(name)
            .bind(token_hash)
            .bind(fmt_ts(Utc::now()))
            .bind(expires_at.map(fmt_ts))
            .execute(self.pool())
            .await?;
        Ok(())
    }

    pub async fn find_token(&self, token_hash: &str) -> Result<Option<TokenRecord>, StoreError> {
        let sql = self.rebind("SELECT * FROM tokens WHERE token_hash = ?");
        let row = sqlx::query(&sql).bind(token_hash).fetch_optional(self.pool()).await?;
        match row {
            Some(row) => {
                let created_raw: String = row.try_get("created_at")?;
                Ok(Some(TokenRecord {
                    id: row.try_get("id")?,
                    name: row.try_get("name")?,
                    token_hash: row.try_get("token_hash")?,
                    created_at: parse_ts(&created_raw)?,
                    expires_at: opt_ts(&row, "expires_at")?,
                    last_used_at: opt_ts(&row, "last_used_at")?,
                }))
            }
            None => Ok(None),
        }
    }

    pub async fn touch_token(&self, id: &str) -> Result<(), StoreError> {
        let sql = self.rebind("UPDATE tokens SET last_used_at = ? WHERE id = ?");
        sqlx::query(&sql).bind(fmt_ts(Utc::now())).bind(id).execute(self.pool()).await?;
        Ok(())
    }
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Additive schema migrations, run on every open.
//!
//! The schema only ever grows: CREATE TABLE IF NOT EXISTS plus guarded
//! ALTER TABLE ADD COLUMN, one statement per step. Columns added after the
//! initial release (`attempt`, `max_attempts`, `cancelled_at`, `logs`,
//! token `expires_at`/`last_used_at`) stay separate steps so existing
//! deployments upgrade in place. Never fold them into the CREATE at head.

use crate::{Store, StoreError};

const CREATE_JOBS: &str = "CREATE TABLE IF NOT EXISTS jobs (
    id TEXT PRIMARY KEY,
    job_type TEXT NOT NULL,
    status TEXT NOT NULL,
    stage TEXT NOT NULL DEFAULT '',
    progress INTEGER NOT NULL DEFAULT 0,
    message TEXT NOT NULL DEFAULT '',
    payload TEXT NOT NULL,
    result TEXT,
    error TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
)";

const CREATE_HISTORY: &str = "CREATE TABLE IF NOT EXISTS history (
    id TEXT PRIMARY KEY,
    event TEXT NOT NULL,
    model_id TEXT,
    metadata TEXT NOT NULL DEFAULT '{}',
    created_at TEXT NOT NULL
)";

const CREATE_HF_MODELS: &str = "CREATE TABLE IF NOT EXISTS hf_models (
    model_id TEXT PRIMARY KEY,
    data TEXT NOT NULL,
    updated_at TEXT NOT NULL
)";

const CREATE_CATALOG_SNAPSHOT: &str = "CREATE TABLE IF NOT EXISTS catalog_snapshot (
    id INTEGER PRIMARY KEY,
    snapshot TEXT NOT NULL,
    updated_at TEXT NOT NULL
)";

const CREATE_TOKENS: &str = "CREATE TABLE IF NOT EXISTS tokens (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    token_hash TEXT NOT NULL,
    created_at TEXT NOT NULL
)";

/// Later-added columns: (table, column, definition).
const ADD_COLUMNS: &[(&str, &str, &str)] = &[
    ("jobs", "attempt", "INTEGER NOT NULL DEFAULT 0"),
    ("jobs", "max_attempts", "INTEGER NOT NULL DEFAULT 1"),
    ("jobs", "cancelled_at", "TEXT"),
    ("jobs", "logs", "TEXT NOT NULL DEFAULT '[]'"),
    ("tokens", "expires_at", "TEXT"),
    ("tokens", "last_used_at", "TEXT"),
];

const CREATE_INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_jobs_status ON jobs (status)",
    "CREATE INDEX IF NOT EXISTS idx_jobs_updated_at ON jobs (updated_at)",
    "CREATE INDEX IF NOT EXISTS idx_history_created_at ON history (created_at)",
];

impl Store {
    pub(crate) async fn migrate(&self) -> Result<(), StoreError> {
        for stmt in [CREATE_JOBS, CREATE_HISTORY, CREATE_HF_MODELS, CREATE_CATALOG_SNAPSHOT, CREATE_TOKENS]
        {
            sqlx::query(stmt).execute(self.pool()).await?;
        }

        for (table, column, definition) in ADD_COLUMNS {
            self.add_column(table, column, definition).await?;
        }

        for stmt in CREATE_INDEXES {
            sqlx::query(stmt).execute(self.pool()).await?;
        }

        tracing::debug!("schema migrations applied");
        Ok(())
    }

    /// `ALTER TABLE ADD COLUMN IF NOT EXISTS`, portably.
    ///
    /// SQLite has no IF NOT EXISTS for columns, so the statement runs
    /// unconditionally and a duplicate-column error is treated as done.
    async fn add_column(&self, table: &str, column: &str, definition: &str) -> Result<(), StoreError> {
        let stmt = format!("ALTER TABLE {table} ADD COLUMN {column} {definition}");
        match sqlx::query(&stmt).execute(self.pool()).await {
            Ok(_) => Ok(()),
            Err(e) if is_duplicate_column(&e) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

fn is_duplicate_column(e: &sqlx::Error) -> bool {
    let msg = e.to_string().to_lowercase();
    msg.contains("duplicate column") || msg.contains("already exists")
}

#[cfg(test)]
#[path = "migrate_tests.rs"]
mod tests;

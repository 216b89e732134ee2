// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! mm-store: the durable datastore.
//!
//! One relational database hosts every durable record: jobs and their logs,
//! history, the Hugging Face metadata snapshot, the catalog snapshot, and API
//! tokens. SQLite serves single-node deployments, Postgres multi-node; both
//! run behind a single `sqlx` Any pool selected by DSN.
//!
//! All timestamps are stored as RFC 3339 UTC text. Queries are written with
//! `?` placeholders and rebound for Postgres.

mod hf_models;
mod history;
mod jobs;
mod migrate;
mod snapshot;
mod tokens;

pub use jobs::JobFilter;
pub use tokens::TokenRecord;

use chrono::{DateTime, Utc};
use mm_core::{Classify, ErrorClass};
use sqlx::any::{AnyPoolOptions, AnyRow};
use sqlx::{AnyPool, Row};
use thiserror::Error;

/// Datastore errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found")]
    NotFound,

    #[error("invalid: {0}")]
    Invalid(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("storage: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("encoding: {0}")]
    Encoding(#[from] serde_json::Error),
}

impl Classify for StoreError {
    fn class(&self) -> ErrorClass {
        match self {
            StoreError::NotFound => ErrorClass::NotFound,
            StoreError::Invalid(_) => ErrorClass::Invalid,
            StoreError::Conflict(_) => ErrorClass::Conflict,
            StoreError::Storage(_) | StoreError::Encoding(_) => ErrorClass::Storage,
        }
    }
}

/// Which SQL backend the pool speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Sqlite,
    Postgres,
}

/// The datastore handle. Cheap to clone; all methods take `&self`.
#[derive(Clone)]
pub struct Store {
    pool: AnyPool,
    backend: Backend,
}

impl Store {
    /// Open (creating if necessary) the database at `dsn` and run migrations.
    pub async fn open(dsn: &str) -> Result<Self, StoreError> {
        sqlx::any::install_default_drivers();

        let backend = if dsn.starts_with("postgres") {
            Backend::Postgres
        } else {
            Backend::Sqlite
        };
        let dsn = normalize_dsn(dsn, backend);

        let mut options = AnyPoolOptions::new().max_connections(8);
        if backend == Backend::Sqlite {
            options = options.after_connect(|conn, _meta| {
                Box::pin(async move {
                    // WAL keeps readers off the writer's back; the busy
                    // timeout covers writer contention across connections.
                    sqlx::query("PRAGMA journal_mode = WAL").execute(&mut *conn).await?;
                    sqlx::query("PRAGMA busy_timeout = 5000").execute(&mut *conn).await?;
                    sqlx::query("PRAGMA foreign_keys = ON").execute(&mut *conn).await?;
                    Ok(())
                })
            });
        }

        let pool = options.connect(&dsn).await?;
        let store = Self { pool, backend };
        store.migrate().await?;
        Ok(store)
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    pub(crate) fn pool(&self) -> &AnyPool {
        &self.pool
    }

    /// Rewrite placeholders for this pool's backend.
    pub(crate) fn rebind(&self, sql: &str) -> String {
        rebind_sql(self.backend, sql)
    }
}

/// Rewrite `?` placeholders as `$1..$n` for Postgres; SQLite takes them
/// verbatim.
pub(crate) fn rebind_sql(backend: Backend, sql: &str) -> String {
    match backend {
        Backend::Sqlite => sql.to_string(),
        Backend::Postgres => {
            let mut out = String::with_capacity(sql.len() + 8);
            let mut n = 0;
            for ch in sql.chars() {
                if ch == '?' {
                    n += 1;
                    out.push('$');
                    out.push_str(&n.to_string());
                } else {
                    out.push(ch);
                }
            }
            out
        }
    }
}

/// Ensure a sqlite DSN creates the database file on first open.
fn normalize_dsn(dsn: &str, backend: Backend) -> String {
    if backend == Backend::Sqlite && !dsn.contains('?') && !dsn.contains(":memory:") {
        format!("{dsn}?mode=rwc")
    } else {
        dsn.to_string()
    }
}

/// Format a timestamp for storage.
pub(crate) fn fmt_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
}

/// Parse a stored timestamp.
pub(crate) fn parse_ts(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Invalid(format!("bad timestamp {raw:?}: {e}")))
}

/// Read a nullable timestamp column.
pub(crate) fn opt_ts(row: &AnyRow, col: &str) -> Result<Option<DateTime<Utc>>, StoreError> {
    let raw: Option<String> = row.try_get(col)?;
    raw.map(|s| parse_ts(&s)).transpose()
}


#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;

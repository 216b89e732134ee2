// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job persistence and guarded state transitions.
//!
//! The store validates the transition guards (cancel only from open states,
//! retry only from terminal with budget left) so a racing caller cannot
//! resurrect a terminal job by accident. Monotonic progress within a run is
//! the engine's job; the store does not reject it.

use chrono::{DateTime, Utc};
use mm_core::{InstallRequest, Job, JobLogEntry, JobResult, JobStatus, JobType};
use sqlx::any::AnyRow;
use sqlx::Row;
use std::collections::BTreeMap;

use crate::{fmt_ts, opt_ts, parse_ts, Store, StoreError};

/// Filters for [`Store::list_jobs`].
#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    pub limit: Option<usize>,
    pub status: Option<JobStatus>,
    pub job_type: Option<JobType>,
    /// Matches the `hfModelId` inside the payload.
    pub model_id: Option<String>,
}

impl Store {
    /// Insert a new job row. The id is the primary key, so a duplicate
    /// create surfaces as a conflict.
    pub async fn create_job(&self, job: &Job) -> Result<(), StoreError> {
        let sql = self.rebind(
            "INSERT INTO jobs (id, job_type, status, stage, progress, message, payload, result, \
             error, attempt, max_attempts, cancelled_at, logs, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        );
        let result = sqlx::query(&sql)
            .bind(job.id.as_str())
            .bind(job.job_type.to_string())
            .bind(job.status.to_string())
            .bind(&job.stage)
            .bind(job.progress as i64)
            .bind(&job.message)
            .bind(serde_json::to_string(&job.payload)?)
            .bind(job.result.as_ref().map(serde_json::to_string).transpose()?)
            .bind(job.error.as_deref())
            .bind(job.attempt as i64)
            .bind(job.max_attempts as i64)
            .bind(job.cancelled_at.map(fmt_ts))
            .bind(serde_json::to_string(&job.logs)?)
            .bind(fmt_ts(job.created_at))
            .bind(fmt_ts(job.updated_at))
            .execute(self.pool())
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => {
                Err(StoreError::Conflict(format!("job {} already exists", job.id)))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn get_job(&self, id: &str) -> Result<Job, StoreError> {
        let sql = self.rebind("SELECT * FROM jobs WHERE id = ?");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or(StoreError::NotFound)?;
        job_from_row(&row)
    }

    /// Update everything except `created_at`; stamps `updated_at` to now.
    pub async fn update_job(&self, job: &Job) -> Result<Job, StoreError> {
        let now = Utc::now();
        let sql = self.rebind(
            "UPDATE jobs SET job_type = ?, status = ?, stage = ?, progress = ?, message = ?, \
             payload = ?, result = ?, error = ?, attempt = ?, max_attempts = ?, cancelled_at = ?, \
             logs = ?, updated_at = ? WHERE id = ?",
        );
        let result = sqlx::query(&sql)
            .bind(job.job_type.to_string())
            .bind(job.status.to_string())
            .bind(&job.stage)
            .bind(job.progress as i64)
            .bind(&job.message)
            .bind(serde_json::to_string(&job.payload)?)
            .bind(job.result.as_ref().map(serde_json::to_string).transpose()?)
            .bind(job.error.as_deref())
            .bind(job.attempt as i64)
            .bind(job.max_attempts as i64)
            .bind(job.cancelled_at.map(fmt_ts))
            .bind(serde_json::to_string(&job.logs)?)
            .bind(fmt_ts(now))
            .bind(job.id.as_str())
            .execute(self.pool())
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        let mut updated = job.clone();
        updated.updated_at = now;
        Ok(updated)
    }

    /// Atomically append one entry to a job's ordered log list.
    pub async fn append_job_log(&self, id: &str, entry: &JobLogEntry) -> Result<(), StoreError> {
        let mut tx = self.pool().begin().await?;

        let sql = self.rebind("SELECT logs FROM jobs WHERE id = ?");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(StoreError::NotFound)?;
        let raw: String = row.try_get("logs")?;
        let mut logs: Vec<JobLogEntry> = serde_json::from_str(&raw)?;
        logs.push(entry.clone());

        let sql = self.rebind("UPDATE jobs SET logs = ?, updated_at = ? WHERE id = ?");
        sqlx::query(&sql)
            .bind(serde_json::to_string(&logs)?)
            .bind(fmt_ts(Utc::now()))
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Transition to `cancelled` iff the current status is pending or
    /// running; stamps `cancelled_at`.
    pub async fn cancel_job(&self, id: &str) -> Result<Job, StoreError> {
        let now = Utc::now();
        let sql = self.rebind(
            "UPDATE jobs SET status = 'cancelled', cancelled_at = ?, updated_at = ? \
             WHERE id = ? AND status IN ('pending', 'running')",
        );
        let result = sqlx::query(&sql)
            .bind(fmt_ts(now))
            .bind(fmt_ts(now))
            .bind(id)
            .execute(self.pool())
            .await?;

        if result.rows_affected() == 0 {
            // Distinguish a missing job from a bad transition.
            let job = self.get_job(id).await?;
            return Err(StoreError::Invalid(format!(
                "cannot cancel job in status {}",
                job.status
            )));
        }
        self.get_job(id).await
    }

    /// Re-open a terminal job: reset status/progress/message/error and
    /// increment `attempt`. Fails with a conflict when the job is not
    /// terminal or its attempt budget is exhausted.
    pub async fn retry_job(&self, id: &str) -> Result<Job, StoreError> {
        let mut tx = self.pool().begin().await?;

        let sql = self.rebind("SELECT * FROM jobs WHERE id = ?");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(StoreError::NotFound)?;
        let job = job_from_row(&row)?;

        if !job.status.is_terminal() {
            return Err(StoreError::Conflict(format!(
                "cannot retry job in status {}",
                job.status
            )));
        }
        if job.attempt >= job.max_attempts {
            return Err(StoreError::Conflict(format!(
                "attempt budget exhausted ({}/{})",
                job.attempt, job.max_attempts
            )));
        }

        let sql = self.rebind(
            "UPDATE jobs SET status = 'pending', stage = 'queued', progress = 0, message = '', \
             error = NULL, cancelled_at = NULL, attempt = attempt + 1, updated_at = ? WHERE id = ?",
        );
        sqlx::query(&sql).bind(fmt_ts(Utc::now())).bind(id).execute(&mut *tx).await?;
        tx.commit().await?;

        self.get_job(id).await
    }

    /// Newest-first listing with optional filters.
    pub async fn list_jobs(&self, filter: &JobFilter) -> Result<Vec<Job>, StoreError> {
        let mut sql = String::from("SELECT * FROM jobs WHERE 1 = 1");
        if filter.status.is_some() {
            sql.push_str(" AND status = ?");
        }
        if filter.job_type.is_some() {
            sql.push_str(" AND job_type = ?");
        }
        if filter.model_id.is_some() {
            sql.push_str(" AND payload LIKE ?");
        }
        sql.push_str(" ORDER BY created_at DESC LIMIT ?");
        let sql = self.rebind(&sql);

        let mut query = sqlx::query(&sql);
        if let Some(status) = filter.status {
            query = query.bind(status.to_string());
        }
        if let Some(job_type) = filter.job_type {
            query = query.bind(job_type.to_string());
        }
        if let Some(model_id) = &filter.model_id {
            query = query.bind(format!("%\"hfModelId\":\"{model_id}\"%"));
        }
        query = query.bind(filter.limit.unwrap_or(100) as i64);

        let rows = query.fetch_all(self.pool()).await?;
        rows.iter().map(job_from_row).collect()
    }

    /// Count of jobs per status for the queue-depth gauge.
    pub async fn count_jobs_by_status(&self) -> Result<BTreeMap<String, i64>, StoreError> {
        let rows = sqlx::query("SELECT status, COUNT(*) AS n FROM jobs GROUP BY status")
            .fetch_all(self.pool())
            .await?;
        let mut counts = BTreeMap::new();
        for row in rows {
            let status: String = row.try_get("status")?;
            let n: i64 = row.try_get("n")?;
            counts.insert(status, n);
        }
        Ok(counts)
    }

    /// Delete jobs last updated before `cutoff` whose status is in
    /// `statuses`. Returns the number purged.
    pub async fn cleanup_jobs_before(
        &self,
        cutoff: DateTime<Utc>,
        statuses: &[JobStatus],
    ) -> Result<u64, StoreError> {
        if statuses.is_empty() {
            return Ok(0);
        }
        let placeholders = vec!["?"; statuses.len()].join(", ");
        let sql = self.rebind(&format!(
            "DELETE FROM jobs WHERE updated_at < ? AND status IN ({placeholders})"
        ));
        let mut query = sqlx::query(&sql).bind(fmt_ts(cutoff));
        for status in statuses {
            query = query.bind(status.to_string());
        }
        Ok(query.execute(self.pool()).await?.rows_affected())
    }
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    let msg = e.to_string().to_lowercase();
    msg.contains("unique") || msg.contains("duplicate key")
}

fn job_from_row(row: &AnyRow) -> Result<Job, StoreError> {
    let status_raw: String = row.try_get("status")?;
    let status = JobStatus::parse(&status_raw)
        .ok_or_else(|| StoreError::Invalid(format!("unknown job status {status_raw:?}")))?;

    let payload_raw: String = row.try_get("payload")?;
    let payload: InstallRequest = serde_json::from_str(&payload_raw)?;

    let result_raw: Option<String> = row.try_get("result")?;
    let result: Option<JobResult> =
        result_raw.as_deref().map(serde_json::from_str).transpose()?;

    let logs_raw: String = row.try_get("logs")?;
    let logs: Vec<JobLogEntry> = serde_json::from_str(&logs_raw)?;

    let created_raw: String = row.try_get("created_at")?;
    let updated_raw: String = row.try_get("updated_at")?;

    Ok(Job {
        id: mm_core::JobId::from_string(row.try_get::<String, _>("id")?),
        job_type: JobType::WeightInstall,
        status,
        stage: row.try_get("stage")?,
        progress: row.try_get::<i64, _>("progress")?.clamp(0, 100) as u8,
        message: row.try_get("message")?,
        payload,
        result,
        attempt: row.try_get::<i64, _>("attempt")?.max(0) as u32,
        max_attempts: row.try_get::<i64, _>("max_attempts")?.max(0) as u32,
        error: row.try_get("error")?,
        cancelled_at: opt_ts(row, "cancelled_at")?,
        created_at: parse_ts(&created_raw)?,
        updated_at: parse_ts(&updated_raw)?,
        logs,
    })
}

#[cfg(test)]
#[path = "jobs_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! TTL automation loop: purge old jobs, history, and cached weights.

use chrono::Utc;
use mm_core::JobStatus;
use mm_store::Store;
use mm_weights::WeightStore;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Terminal statuses eligible for the job sweep. Non-terminal jobs are never
/// deleted regardless of age.
const SWEEPABLE: [JobStatus; 3] = [JobStatus::Completed, JobStatus::Failed, JobStatus::Cancelled];

/// Sweep configuration. A zero TTL disables that sweep.
#[derive(Debug, Clone)]
pub struct AutomationSettings {
    pub interval: Duration,
    pub job_ttl: Duration,
    pub history_ttl: Duration,
    pub weight_ttl: Duration,
}

impl Default for AutomationSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            job_ttl: Duration::ZERO,
            history_ttl: Duration::ZERO,
            weight_ttl: Duration::ZERO,
        }
    }
}

pub struct AutomationLoop {
    store: Store,
    weights: WeightStore,
    settings: AutomationSettings,
}

impl AutomationLoop {
    pub fn new(store: Store, weights: WeightStore, settings: AutomationSettings) -> Self {
        Self { store, weights, settings }
    }

    /// Tick until cancelled.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.settings.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = ticker.tick() => {}
            }
            if cancel.is_cancelled() {
                return;
            }
            self.run_once().await;
        }
    }

    /// One pass over the three sweeps, in order.
    pub async fn run_once(&self) {
        if !self.settings.job_ttl.is_zero() {
            let cutoff = Utc::now()
                - chrono::Duration::from_std(self.settings.job_ttl).unwrap_or_default();
            match self.store.cleanup_jobs_before(cutoff, &SWEEPABLE).await {
                Ok(count) if count > 0 => tracing::info!(count, "purged terminal jobs"),
                Ok(_) => {}
                Err(e) => tracing::warn!(error = %e, "job sweep failed"),
            }
        }

        if !self.settings.history_ttl.is_zero() {
            let cutoff = Utc::now()
                - chrono::Duration::from_std(self.settings.history_ttl).unwrap_or_default();
            match self.store.cleanup_history_before(cutoff).await {
                Ok(count) if count > 0 => tracing::info!(count, "purged history entries"),
                Ok(_) => {}
                Err(e) => tracing::warn!(error = %e, "history sweep failed"),
            }
        }

        if !self.settings.weight_ttl.is_zero() {
            match self.weights.prune_older_than(self.settings.weight_ttl) {
                Ok(pruned) if !pruned.is_empty() => {
                    tracing::info!(count = pruned.len(), ?pruned, "pruned cached weights");
                }
                Ok(_) => {}
                Err(e) => tracing::warn!(error = %e, "weight sweep failed"),
            }
        }
    }
}

#[cfg(test)]
#[path = "automation_tests.rs"]
mod tests;

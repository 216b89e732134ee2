// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Queue worker: sequential blocking reads, one job per message.
//!
//! Horizontal scale comes from running more workers in the same consumer
//! group, not from concurrency inside one worker.

use mm_broker::JobQueue;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::Engine;

pub struct Worker {
    engine: Engine,
    queue: JobQueue,
}

impl Worker {
    pub fn new(engine: Engine, queue: JobQueue) -> Self {
        Self { engine, queue }
    }

    /// Read and execute until cancelled.
    pub async fn run(&self, cancel: CancellationToken) {
        if let Err(e) = self.queue.ensure_group().await {
            tracing::error!(error = %e, "worker could not ensure consumer group");
        }

        loop {
            if cancel.is_cancelled() {
                return;
            }
            let next = tokio::select! {
                _ = cancel.cancelled() => return,
                next = self.queue.next() => next,
            };
            match next {
                Ok(Some((msg, msg_id))) => {
                    tracing::info!(job_id = %msg.job_id, %msg_id, "claimed job");
                    if let Err(e) = self.engine.execute(&msg.job_id, &msg.request).await {
                        tracing::error!(job_id = %msg.job_id, error = %e, "job execution errored");
                    }
                    if let Err(e) = self.queue.ack(&msg_id).await {
                        tracing::warn!(%msg_id, error = %e, "ack failed");
                    }
                }
                Ok(None) => {} // block timeout, normal idle
                Err(e) => {
                    tracing::warn!(error = %e, "queue read failed, backing off");
                    tokio::select! {
                        _ = cancel.cancelled() => return,
                        _ = tokio::time::sleep(Duration::from_secs(1)) => {}
                    }
                }
            }
        }
    }
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! mm-engine: the per-job state machine and the TTL automation loop.
//!
//! ```text
//! [create]──►pending──(claim)──►running──►completed     (terminal)
//!                        │          │
//!                        │          ├─►failed           (terminal)
//!                        │          └─►cancelled        (terminal)
//!                        └──(cancel)──►cancelled
//! [retry] on terminal ──────────────────► pending
//! ```
//!
//! Exactly one worker runs a job at a time: consumer-group delivery hands
//! each queue message to one consumer, and the claim step rejects any job
//! that is no longer pending. Every state change publishes `job.<status>`;
//! terminal transitions also write a history entry.

mod automation;
mod engine;
mod worker;

pub use automation::{AutomationLoop, AutomationSettings};
pub use engine::{Engine, EngineSettings, InstallPaths};
pub use worker::Worker;

use async_trait::async_trait;
use mm_broker::BrokerError;
use mm_core::{Classify, ErrorClass, InstallRequest, WeightInfo};
use mm_store::StoreError;
use mm_weights::{ProgressFn, WeightError, WeightStore};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Engine errors.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid request: {0}")]
    Invalid(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Weights(#[from] WeightError),

    #[error("queue: {0}")]
    Queue(#[from] BrokerError),
}

impl Classify for EngineError {
    fn class(&self) -> ErrorClass {
        match self {
            EngineError::Invalid(_) => ErrorClass::Invalid,
            EngineError::Store(e) => e.class(),
            EngineError::Weights(e) => e.class(),
            EngineError::Queue(e) => e.class(),
        }
    }
}

/// The slice of the weight manager the engine consumes.
///
/// An interface seam rather than the concrete store, so engine tests and
/// alternative backends slot in without touching the state machine.
#[async_trait]
pub trait WeightInstaller: Send + Sync {
    /// Normalized install target for a request.
    fn target_for(&self, req: &InstallRequest) -> Result<String, WeightError>;

    /// Perform the installation.
    async fn install(
        &self,
        cancel: &CancellationToken,
        req: &InstallRequest,
        progress: &ProgressFn,
    ) -> Result<WeightInfo, WeightError>;
}

#[async_trait]
impl WeightInstaller for WeightStore {
    fn target_for(&self, req: &InstallRequest) -> Result<String, WeightError> {
        WeightStore::target_for(self, req)
    }

    async fn install(
        &self,
        cancel: &CancellationToken,
        req: &InstallRequest,
        progress: &ProgressFn,
    ) -> Result<WeightInfo, WeightError> {
        WeightStore::install(self, cancel, req, progress).await
    }
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! mm-kube: the activation controller and the runtime status projector.
//!
//! The controller owns the single named InferenceService custom resource in
//! the configured namespace; the projector owns the thread-safe runtime
//! snapshot assembled from watch streams. Nothing else in the system talks
//! to the API server.

mod activation;
mod manifest;
mod projector;

pub use activation::{ActivationController, ActivationOutcome, GpuContention};
pub use manifest::{
    build_args, build_manifest, inference_service_resource, resolve_storage_uri,
    sanitize_extra_args, MODEL_ID_ANNOTATION, STORAGE_READONLY_ANNOTATION,
};
pub use projector::StatusProjector;

use mm_core::{Classify, ErrorClass, RuntimeStatus};
use thiserror::Error;

/// Errors from the Kubernetes-facing components.
#[derive(Debug, Error)]
pub enum KubeError {
    #[error("api server: {0}")]
    Api(#[from] kube::Error),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("invalid manifest: {0}")]
    Invalid(String),

    #[error("encoding: {0}")]
    Encoding(#[from] serde_json::Error),
}

impl Classify for KubeError {
    fn class(&self) -> ErrorClass {
        match self {
            KubeError::Api(_) => ErrorClass::Upstream,
            KubeError::Conflict(_) => ErrorClass::Conflict,
            KubeError::Invalid(_) => ErrorClass::Invalid,
            KubeError::Encoding(_) => ErrorClass::Storage,
        }
    }
}

/// Read access to the projected runtime snapshot.
///
/// The activation controller consumes this rather than the concrete
/// projector, which keeps the two components decoupled.
pub trait StatusProvider: Send + Sync {
    fn current_status(&self) -> RuntimeStatus;
}

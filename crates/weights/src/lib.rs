// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! mm-weights: the weight manager.
//!
//! Owns the shared storage root. Installations are materialized into a
//! `.tmp` sibling, renamed atomically on success, and marked with a
//! `.model-manager` sidecar. The actual byte transfer happens behind the
//! [`Downloader`] trait so the production CLI invocation and in-memory test
//! fakes interchange.

mod downloader;
mod paths;
mod store;

pub use downloader::{DownloadProgress, DownloadRequest, Downloader, ProgressFn};
#[cfg(any(test, feature = "test-support"))]
pub use downloader::{FakeDownloader, FakeDownloaderHandle};
pub use paths::canonical_target;
pub use store::WeightStore;

use mm_core::{Classify, ErrorClass};
use thiserror::Error;

/// Weight manager errors.
#[derive(Debug, Error)]
pub enum WeightError {
    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("installation not found: {0}")]
    NotFound(String),

    #[error("weights already exist at {0} (set overwrite to replace)")]
    AlreadyExists(String),

    #[error("download cancelled")]
    Cancelled,

    #[error("download failed: {0}")]
    Download(String),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("sidecar encoding: {0}")]
    Encoding(#[from] serde_json::Error),
}

impl Classify for WeightError {
    fn class(&self) -> ErrorClass {
        match self {
            WeightError::InvalidPath(_) => ErrorClass::Invalid,
            WeightError::NotFound(_) => ErrorClass::NotFound,
            WeightError::AlreadyExists(_) => ErrorClass::Conflict,
            WeightError::Cancelled => ErrorClass::Cancelled,
            WeightError::Download(_) => ErrorClass::Upstream,
            WeightError::Io(_) | WeightError::Encoding(_) => ErrorClass::Storage,
        }
    }
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The download seam between the weight manager and the transfer tool.
//!
//! The production implementation shells out to the Hugging Face download
//! CLI; tests use [`FakeDownloader`]. Both granularities of progress exist
//! on the wire, per-file counts and per-byte counts, and a downloader
//! drives whichever it has.

use async_trait::async_trait;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

use crate::WeightError;

/// What to download and where to put it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    pub model_id: String,
    pub revision: String,
    /// File allow-list. Empty means the whole repository.
    pub files: Vec<String>,
    /// Destination directory (the `.tmp` staging dir).
    pub dest: PathBuf,
}

/// A progress tick from the downloader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadProgress {
    /// Files completed out of a known total.
    Files { completed: u64, total: u64 },
    /// Bytes transferred; total is unknown for some endpoints.
    Bytes { downloaded: u64, total: Option<u64> },
}

/// Progress callback. Must be cheap and non-blocking.
pub type ProgressFn = dyn Fn(DownloadProgress) + Send + Sync;

/// Transfers model weights into a staging directory.
#[async_trait]
pub trait Downloader: Send + Sync {
    /// Download into `req.dest`, reporting progress and honoring
    /// cancellation. In-flight I/O must abort promptly once `cancel` fires.
    async fn download(
        &self,
        cancel: &CancellationToken,
        req: &DownloadRequest,
        progress: &ProgressFn,
    ) -> Result<(), WeightError>;
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeDownloader, FakeDownloaderHandle};

#[cfg(any(test, feature = "test-support"))]
mod fake {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;
    use std::time::Duration;

    /// Shared control surface for a [`FakeDownloader`].
    #[derive(Default)]
    pub struct FakeDownloaderHandle {
        pub requests: Mutex<Vec<DownloadRequest>>,
        pub fail_with: Mutex<Option<String>>,
        pub delay_per_file: Mutex<Duration>,
    }

    /// In-memory downloader: writes one small file per allow-list entry
    /// (or a default set), ticking file progress between writes.
    #[derive(Clone, Default)]
    pub struct FakeDownloader {
        handle: Arc<FakeDownloaderHandle>,
    }

    impl FakeDownloader {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn handle(&self) -> Arc<FakeDownloaderHandle> {
            Arc::clone(&self.handle)
        }

        /// Make every subsequent download fail with `message`.
        pub fn fail_with(&self, message: impl Into<String>) {
            *self.handle.fail_with.lock() = Some(message.into());
        }

        /// Slow each file down, leaving room for cancellation mid-flight.
        pub fn delay_per_file(&self, delay: Duration) {
            *self.handle.delay_per_file.lock() = delay;
        }
    }

    #[async_trait]
    impl Downloader for FakeDownloader {
        async fn download(
            &self,
            cancel: &CancellationToken,
            req: &DownloadRequest,
            progress: &ProgressFn,
        ) -> Result<(), WeightError> {
            self.handle.requests.lock().push(req.clone());

            if let Some(message) = self.handle.fail_with.lock().clone() {
                return Err(WeightError::Download(message));
            }

            let files = if req.files.is_empty() {
                vec!["config.json".to_string(), "model.safetensors".to_string()]
            } else {
                req.files.clone()
            };
            let delay = *self.handle.delay_per_file.lock();
            let total = files.len() as u64;

            std::fs::create_dir_all(&req.dest)?;
            for (i, file) in files.iter().enumerate() {
                if cancel.is_cancelled() {
                    return Err(WeightError::Cancelled);
                }
                if !delay.is_zero() {
                    tokio::select! {
                        _ = cancel.cancelled() => return Err(WeightError::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                let path = req.dest.join(file);
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::write(&path, format!("fake weights for {}\n", req.model_id))?;
                progress(DownloadProgress::Files { completed: i as u64 + 1, total });
            }
            progress(DownloadProgress::Bytes {
                downloaded: total * 32,
                total: Some(total * 32),
            });
            Ok(())
        }
    }
}

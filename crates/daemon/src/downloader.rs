// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Production [`Downloader`]: shells out to the Hugging Face download CLI.
//!
//! The tool streams files into the staging directory; coarse byte progress
//! comes from sampling the directory size while the process runs. A cancel
//! kills the child, leaving cleanup to the weight manager.

use async_trait::async_trait;
use mm_weights::{DownloadProgress, DownloadRequest, Downloader, ProgressFn, WeightError};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

/// How often the staging directory is sized for byte progress.
const SAMPLE_INTERVAL: Duration = Duration::from_secs(2);

pub struct HfCliDownloader {
    binary: String,
    token: Option<String>,
    cache_dir: PathBuf,
}

impl HfCliDownloader {
    pub fn new(token: Option<String>, cache_dir: impl Into<PathBuf>) -> Self {
        let binary =
            std::env::var("HF_DOWNLOAD_BIN").unwrap_or_else(|_| "huggingface-cli".to_string());
        Self { binary, token, cache_dir: cache_dir.into() }
    }
}

#[async_trait]
impl Downloader for HfCliDownloader {
    async fn download(
        &self,
        cancel: &CancellationToken,
        req: &DownloadRequest,
        progress: &ProgressFn,
    ) -> Result<(), WeightError> {
        let mut command = Command::new(&self.binary);
        command
            .arg("download")
            .arg(&req.model_id)
            .args(&req.files)
            .arg("--revision")
            .arg(&req.revision)
            .arg("--local-dir")
            .arg(&req.dest)
            .env("HF_HUB_CACHE", &self.cache_dir)
            .kill_on_drop(true);
        if let Some(token) = &self.token {
            command.env("HF_TOKEN", token);
        }

        tracing::info!(model_id = %req.model_id, revision = %req.revision,
            dest = %req.dest.display(), "starting hf download");

        let mut child = command
            .spawn()
            .map_err(|e| WeightError::Download(format!("spawn {}: {e}", self.binary)))?;

        let total_files = if req.files.is_empty() { None } else { Some(req.files.len() as u64) };
        let mut ticker = tokio::time::interval(SAMPLE_INTERVAL);
        ticker.tick().await;

        // Child::wait is cancel-safe, so the loop re-creates the future each
        // pass and the arms stay free of child borrows.
        let exit = loop {
            tokio::select! {
                _ = cancel.cancelled() => break None,
                _ = ticker.tick() => {
                    progress(DownloadProgress::Bytes {
                        downloaded: dir_size(&req.dest),
                        total: None,
                    });
                }
                status = child.wait() => break Some(status),
            }
        };

        let Some(status) = exit else {
            if let Err(e) = child.kill().await {
                tracing::warn!(error = %e, "failed to kill download process");
            }
            return Err(WeightError::Cancelled);
        };
        let status = status.map_err(|e| WeightError::Download(format!("wait: {e}")))?;
        if !status.success() {
            return Err(WeightError::Download(format!("{} exited with {status}", self.binary)));
        }

        if let Some(total) = total_files {
            progress(DownloadProgress::Files { completed: total, total });
        }
        let final_size = dir_size(&req.dest);
        progress(DownloadProgress::Bytes { downloaded: final_size, total: Some(final_size) });
        Ok(())
    }
}

fn dir_size(dir: &Path) -> u64 {
    let mut size = 0;
    let mut stack = vec![dir.to_path_buf()];
    while let Some(current) = stack.pop() {
        let Ok(entries) = std::fs::read_dir(&current) else { continue };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else if let Ok(meta) = entry.metadata() {
                size += meta.len();
            }
        }
    }
    size
}

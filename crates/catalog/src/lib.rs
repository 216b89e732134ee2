// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! mm-catalog: the in-memory catalog store.
//!
//! Models load from a directory of JSON files (one `<id>.json` per model,
//! synced by an external git sidecar). A missing directory is the
//! well-typed "still warming up" sentinel, not a failure. Every successful
//! non-empty load or restore writes through to the datastore snapshot so a
//! cold start can serve the catalog before the sidecar catches up.

use mm_core::{CatalogModel, Classify, ErrorClass, ModelSummary};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// Catalog errors.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// The models directory does not exist yet (git sync warming up).
    #[error("catalog directory {0} does not exist yet")]
    DirMissing(PathBuf),

    #[error("model not found: {0}")]
    NotFound(String),

    #[error("duplicate model id {0}")]
    DuplicateId(String),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("model file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl Classify for CatalogError {
    fn class(&self) -> ErrorClass {
        match self {
            CatalogError::NotFound(_) => ErrorClass::NotFound,
            CatalogError::DuplicateId(_) | CatalogError::Parse { .. } => ErrorClass::Invalid,
            CatalogError::DirMissing(_) | CatalogError::Io(_) => ErrorClass::Storage,
        }
    }
}

/// Write-through sink for catalog snapshots (implemented by the datastore).
#[async_trait::async_trait]
pub trait SnapshotSink: Send + Sync {
    async fn save_snapshot(&self, models: &[CatalogModel]);
}

/// The catalog store. Cheap to clone; reads take a shared lock.
#[derive(Clone)]
pub struct CatalogStore {
    dir: PathBuf,
    models: Arc<RwLock<HashMap<String, CatalogModel>>>,
    sink: Option<Arc<dyn SnapshotSink>>,
}

impl CatalogStore {
    pub fn new(dir: impl Into<PathBuf>, sink: Option<Arc<dyn SnapshotSink>>) -> Self {
        Self { dir: dir.into(), models: Arc::new(RwLock::new(HashMap::new())), sink }
    }

    /// Load the catalog from disk, replacing the in-memory map atomically.
    /// Returns the number of models loaded.
    pub async fn load(&self) -> Result<usize, CatalogError> {
        let loaded = read_dir_models(&self.dir)?;
        let count = loaded.len();
        *self.models.write() = loaded;
        if count > 0 {
            self.write_through().await;
        }
        tracing::info!(count, dir = %self.dir.display(), "catalog loaded");
        Ok(count)
    }

    /// Alias for [`CatalogStore::load`]; the swap is atomic either way.
    pub async fn reload(&self) -> Result<usize, CatalogError> {
        self.load().await
    }

    /// Replace the catalog from a datastore snapshot (cold start).
    pub async fn restore(&self, models: Vec<CatalogModel>) {
        let count = models.len();
        let map: HashMap<String, CatalogModel> =
            models.into_iter().map(|m| (m.id.clone(), m)).collect();
        *self.models.write() = map;
        if count > 0 {
            self.write_through().await;
        }
        tracing::info!(count, "catalog restored from snapshot");
    }

    /// Listing summaries, sorted by id.
    pub fn list(&self) -> Vec<ModelSummary> {
        let models = self.models.read();
        let mut summaries: Vec<ModelSummary> = models.values().map(CatalogModel::summary).collect();
        summaries.sort_by(|a, b| a.id.cmp(&b.id));
        summaries
    }

    /// Full model by id (case-sensitive).
    pub fn get(&self, id: &str) -> Result<CatalogModel, CatalogError> {
        self.models
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| CatalogError::NotFound(id.to_string()))
    }

    /// Deep copies of every model, sorted by id.
    pub fn all(&self) -> Vec<CatalogModel> {
        let models = self.models.read();
        let mut all: Vec<CatalogModel> = models.values().cloned().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    pub fn count(&self) -> usize {
        self.models.read().len()
    }

    async fn write_through(&self) {
        let Some(sink) = &self.sink else { return };
        let models = self.all();
        sink.save_snapshot(&models).await;
    }
}

/// Read every `*.json` in the directory into a map keyed by model id.
fn read_dir_models(dir: &Path) -> Result<HashMap<String, CatalogModel>, CatalogError> {
    if !dir.exists() {
        return Err(CatalogError::DirMissing(dir.to_path_buf()));
    }

    let mut models = HashMap::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let raw = std::fs::read_to_string(&path)?;
        let model: CatalogModel = serde_json::from_str(&raw)
            .map_err(|source| CatalogError::Parse { path: path.clone(), source })?;
        if model.id.is_empty() {
            return Err(CatalogError::Parse {
                path,
                source: serde::de::Error::custom("missing id"),
            });
        }
        let id = model.id.clone();
        if models.insert(id.clone(), model).is_some() {
            return Err(CatalogError::DuplicateId(id));
        }
    }
    Ok(models)
}

#[cfg(test)]
#[path = "catalog_tests.rs"]
mod tests;

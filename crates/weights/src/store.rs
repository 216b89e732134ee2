// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The storage-root owner: install, discover, delete, prune.

use chrono::{DateTime, Utc};
use mm_core::{InstallRequest, SidecarMeta, StorageStats, WeightInfo, SIDECAR_FILE};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::downloader::{DownloadRequest, Downloader, ProgressFn};
use crate::paths::{canonical_target, is_reserved_entry, validate_relpath};
use crate::WeightError;

/// The weight manager. Cheap to clone.
#[derive(Clone)]
pub struct WeightStore {
    root: PathBuf,
    downloader: Arc<dyn Downloader>,
}

impl WeightStore {
    pub fn new(root: impl Into<PathBuf>, downloader: Arc<dyn Downloader>) -> Self {
        Self { root: root.into(), downloader }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Normalized install target for a request.
    pub fn target_for(&self, req: &InstallRequest) -> Result<String, WeightError> {
        canonical_target(&req.hf_model_id, req.target.as_deref().unwrap_or(""))
    }

    /// Install weights from Hugging Face into the storage root.
    ///
    /// Stages into `<target>.tmp`, renames atomically, writes the sidecar.
    /// On any failure the staging dir is removed; a cancelled download never
    /// leaves a final `<target>` directory behind.
    pub async fn install(
        &self,
        cancel: &CancellationToken,
        req: &InstallRequest,
        progress: &ProgressFn,
    ) -> Result<WeightInfo, WeightError> {
        let target = self.target_for(req)?;
        let final_dir = self.root.join(&target);
        let tmp_dir = self.root.join(format!("{target}.tmp"));

        if final_dir.exists() {
            if !req.overwrite {
                return Err(WeightError::AlreadyExists(target));
            }
            fs::remove_dir_all(&final_dir)?;
        }
        if tmp_dir.exists() {
            fs::remove_dir_all(&tmp_dir)?;
        }
        if let Some(parent) = final_dir.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::create_dir_all(&tmp_dir)?;

        let download_req = DownloadRequest {
            model_id: req.hf_model_id.clone(),
            revision: req.revision_or_default().to_string(),
            files: req.files.clone(),
            dest: tmp_dir.clone(),
        };

        let result = self.downloader.download(cancel, &download_req, progress).await;
        let result = match result {
            Ok(()) if cancel.is_cancelled() => Err(WeightError::Cancelled),
            other => other,
        };
        if let Err(e) = result {
            if let Err(cleanup) = fs::remove_dir_all(&tmp_dir) {
                tracing::warn!(dir = %tmp_dir.display(), error = %cleanup,
                    "failed to remove staging dir after aborted install");
            }
            return Err(e);
        }

        fs::rename(&tmp_dir, &final_dir)?;

        let meta = SidecarMeta {
            model_id: req.hf_model_id.clone(),
            revision: req.revision_or_default().to_string(),
            installed_at: Utc::now(),
        };
        fs::write(final_dir.join(SIDECAR_FILE), serde_json::to_vec_pretty(&meta)?)?;

        self.describe(&target, &final_dir, Some(meta))
    }

    /// Discover installations by walking for sidecar files. When none exist
    /// anywhere, every top-level directory counts as an installation.
    /// Sorted by size, largest first.
    pub fn list(&self) -> Result<Vec<WeightInfo>, WeightError> {
        let mut found = Vec::new();
        self.walk_sidecars(&self.root, &mut found);

        if found.is_empty() {
            found = self.list_top_level();
        }

        let mut infos: Vec<WeightInfo> = Vec::new();
        for (name, path, meta) in found {
            match self.describe(&name, &path, meta) {
                Ok(info) => infos.push(info),
                Err(e) => {
                    tracing::warn!(install = %name, error = %e, "skipping unreadable installation");
                }
            }
        }
        infos.sort_by(|a, b| b.size_bytes.cmp(&a.size_bytes));
        Ok(infos)
    }

    /// Delete an installation, sweep now-empty parents, and purge the
    /// download-tool cache for its model.
    pub fn delete(&self, name: &str) -> Result<(), WeightError> {
        validate_relpath(name)?;
        let dir = self.root.join(name);
        if !dir.is_dir() {
            return Err(WeightError::NotFound(name.to_string()));
        }

        let model_id = read_sidecar(&dir).map(|m| m.model_id);
        fs::remove_dir_all(&dir)?;

        // Walk empty parents up to (but never past) the storage root.
        let mut parent = dir.parent().map(Path::to_path_buf);
        while let Some(p) = parent {
            if p == self.root || !is_empty_dir(&p) {
                break;
            }
            if let Err(e) = fs::remove_dir(&p) {
                tracing::debug!(dir = %p.display(), error = %e, "leaving non-removable parent");
                break;
            }
            parent = p.parent().map(Path::to_path_buf);
        }

        if let Some(model_id) = model_id {
            self.purge_hf_cache(&model_id);
        }
        Ok(())
    }

    /// Delete installations whose newest file predates `now - age`.
    /// Returns the names pruned.
    pub fn prune_older_than(&self, age: Duration) -> Result<Vec<String>, WeightError> {
        let age = chrono::Duration::from_std(age).unwrap_or_else(|_| chrono::Duration::days(36500));
        let cutoff = Utc::now() - age;
        let mut pruned = Vec::new();
        for info in self.list()? {
            if info.modified_time < cutoff {
                match self.delete(&info.name) {
                    Ok(()) => pruned.push(info.name),
                    Err(e) => {
                        tracing::warn!(install = %info.name, error = %e, "prune failed");
                    }
                }
            }
        }
        Ok(pruned)
    }

    /// Filesystem totals plus per-install sizes.
    pub fn stats(&self) -> Result<StorageStats, WeightError> {
        let installs = self.list()?;
        let total_size_bytes = installs.iter().map(|i| i.size_bytes).sum();
        Ok(StorageStats { total_size_bytes, install_count: installs.len(), installs })
    }

    fn describe(
        &self,
        name: &str,
        path: &Path,
        meta: Option<SidecarMeta>,
    ) -> Result<WeightInfo, WeightError> {
        let meta = meta.or_else(|| read_sidecar(path));
        let (size_bytes, file_count, modified_time) = measure_dir(path)?;
        Ok(WeightInfo {
            name: name.to_string(),
            path: path.display().to_string(),
            size_bytes,
            file_count,
            modified_time,
            hf_model_id: meta.as_ref().map(|m| m.model_id.clone()),
            revision: meta.as_ref().map(|m| m.revision.clone()),
            installed_at: meta.map(|m| m.installed_at),
        })
    }

    /// Collect `(relative name, absolute path, sidecar)` for every directory
    /// holding a sidecar file. Unreadable entries are logged and skipped.
    fn walk_sidecars(&self, dir: &Path, out: &mut Vec<(String, PathBuf, Option<SidecarMeta>)>) {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(dir = %dir.display(), error = %e, "walk skipped unreadable dir");
                return;
            }
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let entry_name = entry.file_name().to_string_lossy().to_string();
            // Dot-dirs and staging dirs are skipped at any depth; the other
            // reserved names only matter directly under the root.
            if entry_name.starts_with('.')
                || entry_name.ends_with(".tmp")
                || (dir == self.root && is_reserved_entry(&entry_name))
            {
                continue;
            }
            if path.join(SIDECAR_FILE).is_file() {
                if let Ok(rel) = path.strip_prefix(&self.root) {
                    let name = rel.to_string_lossy().replace('\\', "/");
                    out.push((name, path.clone(), read_sidecar(&path)));
                }
                // A managed install never nests another one.
                continue;
            }
            self.walk_sidecars(&path, out);
        }
    }

    fn list_top_level(&self) -> Vec<(String, PathBuf, Option<SidecarMeta>)> {
        let mut out = Vec::new();
        let Ok(entries) = fs::read_dir(&self.root) else { return out };
        for entry in entries.flatten() {
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().to_string();
            if path.is_dir() && !is_reserved_entry(&name) {
                out.push((name, path, None));
            }
        }
        out
    }

    /// Best-effort removal of hub-cache entries for a model id.
    fn purge_hf_cache(&self, model_id: &str) {
        let cache = self.root.join(".hf-cache");
        let needle = format!("models--{}", model_id.replace('/', "--"));
        let Ok(entries) = fs::read_dir(&cache) else { return };
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().to_string();
            if name == needle {
                if let Err(e) = fs::remove_dir_all(entry.path()) {
                    tracing::debug!(entry = %name, error = %e, "hf cache purge failed");
                }
            }
        }
    }
}

fn read_sidecar(dir: &Path) -> Option<SidecarMeta> {
    let raw = fs::read_to_string(dir.join(SIDECAR_FILE)).ok()?;
    serde_json::from_str(&raw).ok()
}

fn is_empty_dir(path: &Path) -> bool {
    fs::read_dir(path).map(|mut entries| entries.next().is_none()).unwrap_or(false)
}

/// Total bytes, file count, and newest mtime under a directory.
fn measure_dir(dir: &Path) -> Result<(u64, u64, DateTime<Utc>), WeightError> {
    let mut size = 0u64;
    let mut files = 0u64;
    let mut newest: DateTime<Utc> = DateTime::<Utc>::MIN_UTC;

    let mut stack = vec![dir.to_path_buf()];
    while let Some(current) = stack.pop() {
        for entry in fs::read_dir(&current)?.flatten() {
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
                continue;
            }
            let meta = match entry.metadata() {
                Ok(meta) => meta,
                Err(e) => {
                    tracing::warn!(file = %path.display(), error = %e, "stat failed, skipping");
                    continue;
                }
            };
            size += meta.len();
            files += 1;
            if let Ok(modified) = meta.modified() {
                let ts: DateTime<Utc> = modified.into();
                if ts > newest {
                    newest = ts;
                }
            }
        }
    }

    if newest == DateTime::<Utc>::MIN_UTC {
        newest = Utc::now();
    }
    Ok((size, files, newest))
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;

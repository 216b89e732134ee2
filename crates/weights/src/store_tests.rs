// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::downloader::{DownloadProgress, FakeDownloader};
use parking_lot::Mutex;
use tempfile::TempDir;

fn store() -> (WeightStore, FakeDownloader, TempDir) {
    let dir = TempDir::new().unwrap();
    let downloader = FakeDownloader::new();
    let store = WeightStore::new(dir.path(), Arc::new(downloader.clone()));
    (store, downloader, dir)
}

fn req(model: &str) -> InstallRequest {
    InstallRequest::new(model)
}

fn no_progress() -> Box<ProgressFn> {
    Box::new(|_| {})
}

#[tokio::test]
async fn install_writes_sidecar_and_is_discoverable() {
    let (store, _dl, _dir) = store();
    let cancel = CancellationToken::new();

    let info = store.install(&cancel, &req("Qwen/Qwen2.5-0.5B"), &no_progress()).await.unwrap();
    assert_eq!(info.name, "qwen/qwen2.5-0.5b");
    assert_eq!(info.hf_model_id.as_deref(), Some("Qwen/Qwen2.5-0.5B"));
    assert_eq!(info.revision.as_deref(), Some("main"));
    assert!(info.size_bytes > 0);

    // The sidecar marks the directory as an installation.
    let sidecar = std::path::Path::new(&info.path).join(SIDECAR_FILE);
    assert!(sidecar.is_file());

    let listed = store.list().unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].name, "qwen/qwen2.5-0.5b");
}

#[tokio::test]
async fn install_reports_file_progress() {
    let (store, _dl, _dir) = store();
    let cancel = CancellationToken::new();
    let ticks: Arc<Mutex<Vec<DownloadProgress>>> = Arc::new(Mutex::new(Vec::new()));

    let sink = Arc::clone(&ticks);
    let progress: Box<ProgressFn> = Box::new(move |p| sink.lock().push(p));
    let mut request = req("a/b");
    request.files = vec!["config.json".to_string(), "tokenizer.json".to_string()];
    store.install(&cancel, &request, &progress).await.unwrap();

    let ticks = ticks.lock();
    assert!(ticks.contains(&DownloadProgress::Files { completed: 1, total: 2 }));
    assert!(ticks.contains(&DownloadProgress::Files { completed: 2, total: 2 }));
}

#[tokio::test]
async fn install_conflicts_without_overwrite() {
    let (store, _dl, _dir) = store();
    let cancel = CancellationToken::new();

    store.install(&cancel, &req("a/b"), &no_progress()).await.unwrap();
    let err = store.install(&cancel, &req("a/b"), &no_progress()).await.unwrap_err();
    assert!(matches!(err, WeightError::AlreadyExists(_)));
    assert!(err.to_string().contains("already exist"));

    // With overwrite set the install replaces the directory.
    let mut over = req("a/b");
    over.overwrite = true;
    store.install(&cancel, &over, &no_progress()).await.unwrap();
}

#[tokio::test]
async fn failed_download_leaves_no_directories() {
    let (store, dl, dir) = store();
    let cancel = CancellationToken::new();
    dl.fail_with("403 from hub");

    let err = store.install(&cancel, &req("a/b"), &no_progress()).await.unwrap_err();
    assert!(matches!(err, WeightError::Download(_)));

    assert!(!dir.path().join("a/b").exists());
    assert!(!dir.path().join("a/b.tmp").exists());
}

#[tokio::test]
async fn cancelled_download_leaves_no_final_directory() {
    let (store, dl, dir) = store();
    let cancel = CancellationToken::new();
    cancel.cancel();
    dl.delay_per_file(std::time::Duration::from_millis(50));

    let err = store.install(&cancel, &req("a/b"), &no_progress()).await.unwrap_err();
    assert!(matches!(err, WeightError::Cancelled));
    assert!(!dir.path().join("a/b").exists());
}

#[tokio::test]
async fn list_sorts_by_size_descending() {
    let (store, _dl, dir) = store();
    let cancel = CancellationToken::new();

    store.install(&cancel, &req("org/small"), &no_progress()).await.unwrap();
    store.install(&cancel, &req("org/big"), &no_progress()).await.unwrap();
    // Grow the second install after the fact.
    std::fs::write(dir.path().join("org/big/extra.bin"), vec![0u8; 4096]).unwrap();

    let listed = store.list().unwrap();
    assert_eq!(listed[0].name, "org/big");
    assert_eq!(listed[1].name, "org/small");
}

#[test]
fn list_falls_back_to_top_level_dirs() {
    let (store, _dl, dir) = store();

    // Unmanaged directories without sidecars.
    std::fs::create_dir_all(dir.path().join("legacy-model")).unwrap();
    std::fs::write(dir.path().join("legacy-model/weights.bin"), b"x").unwrap();
    std::fs::create_dir_all(dir.path().join(".hf-cache")).unwrap();

    let listed = store.list().unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].name, "legacy-model");
    assert!(listed[0].hf_model_id.is_none());
}

#[tokio::test]
async fn delete_removes_install_and_empty_parents() {
    let (store, _dl, dir) = store();
    let cancel = CancellationToken::new();

    store.install(&cancel, &req("org/only-child"), &no_progress()).await.unwrap();
    store.delete("org/only-child").unwrap();

    assert!(!dir.path().join("org/only-child").exists());
    // The now-empty parent goes too, but never the root.
    assert!(!dir.path().join("org").exists());
    assert!(dir.path().exists());
}

#[tokio::test]
async fn delete_keeps_nonempty_parents() {
    let (store, _dl, dir) = store();
    let cancel = CancellationToken::new();

    store.install(&cancel, &req("org/a"), &no_progress()).await.unwrap();
    store.install(&cancel, &req("org/b"), &no_progress()).await.unwrap();
    store.delete("org/a").unwrap();

    assert!(dir.path().join("org/b").exists());
}

#[tokio::test]
async fn delete_purges_hub_cache_entry() {
    let (store, _dl, dir) = store();
    let cancel = CancellationToken::new();

    store.install(&cancel, &req("Org/Model"), &no_progress()).await.unwrap();
    let cache_entry = dir.path().join(".hf-cache/models--Org--Model");
    std::fs::create_dir_all(&cache_entry).unwrap();

    store.delete("org/model").unwrap();
    assert!(!cache_entry.exists());
}

#[test]
fn delete_rejects_traversal_and_missing() {
    let (store, _dl, _dir) = store();
    assert!(matches!(store.delete("../escape"), Err(WeightError::InvalidPath(_))));
    assert!(matches!(store.delete("nope"), Err(WeightError::NotFound(_))));
}

#[tokio::test]
async fn prune_respects_age() {
    let (store, _dl, _dir) = store();
    let cancel = CancellationToken::new();

    store.install(&cancel, &req("org/fresh"), &no_progress()).await.unwrap();

    // Nothing is older than an hour.
    let pruned = store.prune_older_than(std::time::Duration::from_secs(3600)).unwrap();
    assert!(pruned.is_empty());

    // Everything is older than zero seconds.
    let pruned = store.prune_older_than(std::time::Duration::ZERO).unwrap();
    assert_eq!(pruned, vec!["org/fresh".to_string()]);
    assert!(store.list().unwrap().is_empty());
}

#[tokio::test]
async fn stats_totals_match_installs() {
    let (store, _dl, _dir) = store();
    let cancel = CancellationToken::new();

    store.install(&cancel, &req("a/one"), &no_progress()).await.unwrap();
    store.install(&cancel, &req("a/two"), &no_progress()).await.unwrap();

    let stats = store.stats().unwrap();
    assert_eq!(stats.install_count, 2);
    assert_eq!(stats.total_size_bytes, stats.installs.iter().map(|i| i.size_bytes).sum::<u64>());
}

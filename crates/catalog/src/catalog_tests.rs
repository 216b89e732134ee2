// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use parking_lot::Mutex;
use tempfile::TempDir;

struct RecordingSink {
    snapshots: Mutex<Vec<Vec<CatalogModel>>>,
}

#[async_trait::async_trait]
impl SnapshotSink for RecordingSink {
    async fn save_snapshot(&self, models: &[CatalogModel]) {
        self.snapshots.lock().push(models.to_vec());
    }
}

fn write_model(dir: &Path, id: &str) {
    let body = serde_json::json!({"id": id, "hfModelId": format!("org/{id}")});
    std::fs::write(dir.join(format!("{id}.json")), body.to_string()).unwrap();
}

#[tokio::test]
async fn load_reads_models_from_disk() {
    let dir = TempDir::new().unwrap();
    write_model(dir.path(), "alpha");
    write_model(dir.path(), "beta");
    std::fs::write(dir.path().join("README.md"), "not a model").unwrap();

    let store = CatalogStore::new(dir.path(), None);
    assert_eq!(store.load().await.unwrap(), 2);
    assert_eq!(store.count(), 2);

    let summaries = store.list();
    assert_eq!(summaries.len(), 2);
    assert_eq!(summaries[0].id, "alpha");
    assert_eq!(summaries[1].id, "beta");

    let model = store.get("alpha").unwrap();
    assert_eq!(model.hf_model_id.as_deref(), Some("org/alpha"));
}

#[tokio::test]
async fn missing_dir_is_the_warming_up_sentinel() {
    let dir = TempDir::new().unwrap();
    let store = CatalogStore::new(dir.path().join("not-yet"), None);
    let err = store.load().await.unwrap_err();
    assert!(matches!(err, CatalogError::DirMissing(_)));
}

#[tokio::test]
async fn get_is_case_sensitive() {
    let dir = TempDir::new().unwrap();
    write_model(dir.path(), "Alpha");
    let store = CatalogStore::new(dir.path(), None);
    store.load().await.unwrap();

    assert!(store.get("Alpha").is_ok());
    assert!(matches!(store.get("alpha"), Err(CatalogError::NotFound(_))));
}

#[tokio::test]
async fn reload_swaps_atomically() {
    let dir = TempDir::new().unwrap();
    write_model(dir.path(), "old");
    let store = CatalogStore::new(dir.path(), None);
    store.load().await.unwrap();

    std::fs::remove_file(dir.path().join("old.json")).unwrap();
    write_model(dir.path(), "new");
    store.reload().await.unwrap();

    assert!(store.get("old").is_err());
    assert!(store.get("new").is_ok());
    assert_eq!(store.count(), 1);
}

#[tokio::test]
async fn bad_json_names_the_file() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("broken.json"), "{nope").unwrap();
    let store = CatalogStore::new(dir.path(), None);
    let err = store.load().await.unwrap_err();
    match err {
        CatalogError::Parse { path, .. } => assert!(path.ends_with("broken.json")),
        other => panic!("unexpected error {other:?}"),
    }
}

#[tokio::test]
async fn all_returns_deep_copies() {
    let dir = TempDir::new().unwrap();
    write_model(dir.path(), "alpha");
    let store = CatalogStore::new(dir.path(), None);
    store.load().await.unwrap();

    let mut copies = store.all();
    copies[0].id = "mutated".to_string();
    assert!(store.get("alpha").is_ok());
}

#[tokio::test]
async fn successful_load_writes_through_to_sink() {
    let dir = TempDir::new().unwrap();
    write_model(dir.path(), "alpha");
    let sink = Arc::new(RecordingSink { snapshots: Mutex::new(Vec::new()) });
    let store = CatalogStore::new(dir.path(), Some(sink.clone()));

    store.load().await.unwrap();
    assert_eq!(sink.snapshots.lock().len(), 1);
    assert_eq!(sink.snapshots.lock()[0][0].id, "alpha");
}

#[tokio::test]
async fn empty_load_skips_write_through() {
    let dir = TempDir::new().unwrap();
    let sink = Arc::new(RecordingSink { snapshots: Mutex::new(Vec::new()) });
    let store = CatalogStore::new(dir.path(), Some(sink.clone()));

    store.load().await.unwrap();
    assert!(sink.snapshots.lock().is_empty());
}

#[tokio::test]
async fn restore_replaces_and_writes_through() {
    let dir = TempDir::new().unwrap();
    let sink = Arc::new(RecordingSink { snapshots: Mutex::new(Vec::new()) });
    let store = CatalogStore::new(dir.path().join("not-yet"), Some(sink.clone()));

    store
        .restore(vec![CatalogModel { id: "from-snapshot".to_string(), ..Default::default() }])
        .await;

    assert_eq!(store.count(), 1);
    assert!(store.get("from-snapshot").is_ok());
    assert_eq!(sink.snapshots.lock().len(), 1);
}

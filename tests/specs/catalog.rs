// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Catalog snapshot round-trips between the disk store and the datastore.

use mm_catalog::{CatalogStore, SnapshotSink};
use mm_core::CatalogModel;
use mm_store::Store;
use std::sync::Arc;
use tempfile::TempDir;

struct StoreSink(Store);

#[async_trait::async_trait]
impl SnapshotSink for StoreSink {
    async fn save_snapshot(&self, models: &[CatalogModel]) {
        self.0.save_catalog_snapshot(models).await.unwrap();
    }
}

async fn open_store(dir: &TempDir) -> Store {
    Store::open(&format!("sqlite://{}/state.db", dir.path().display()))
        .await
        .unwrap()
}

fn write_model(dir: &std::path::Path, id: &str) {
    std::fs::write(
        dir.join(format!("{id}.json")),
        serde_json::json!({"id": id, "hfModelId": format!("org/{id}")}).to_string(),
    )
    .unwrap();
}

#[tokio::test]
async fn snapshot_save_then_load_returns_same_set() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;

    let mut models = vec![
        CatalogModel { id: "b".to_string(), ..Default::default() },
        CatalogModel { id: "a".to_string(), ..Default::default() },
    ];
    store.save_catalog_snapshot(&models).await.unwrap();

    let (mut loaded, _at) = store.load_catalog_snapshot().await.unwrap().unwrap();
    // Order-independent equality.
    models.sort_by(|x, y| x.id.cmp(&y.id));
    loaded.sort_by(|x, y| x.id.cmp(&y.id));
    assert_eq!(loaded, models);
}

#[tokio::test]
async fn disk_load_writes_snapshot_and_restore_survives_cold_start() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;

    // First boot: the sidecar has populated the disk.
    let models_dir = dir.path().join("catalog");
    std::fs::create_dir_all(&models_dir).unwrap();
    write_model(&models_dir, "alpha");
    write_model(&models_dir, "beta");

    let catalog = CatalogStore::new(&models_dir, Some(Arc::new(StoreSink(store.clone()))));
    assert_eq!(catalog.load().await.unwrap(), 2);

    // Second boot: the disk is gone (fresh pod, git sync still warming up),
    // but the snapshot restores the catalog.
    let cold = CatalogStore::new(dir.path().join("missing"), None);
    assert!(matches!(
        cold.load().await,
        Err(mm_catalog::CatalogError::DirMissing(_))
    ));

    let (snapshot, _at) = store.load_catalog_snapshot().await.unwrap().unwrap();
    cold.restore(snapshot).await;
    assert_eq!(cold.count(), 2);
    assert!(cold.get("alpha").is_ok());
    assert!(cold.get("beta").is_ok());
}

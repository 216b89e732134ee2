// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use mm_core::{CatalogModel, HistoryEntry, HuggingFaceModel};
use serde_json::json;

#[test]
fn rebind_rewrites_placeholders_per_backend() {
    let sql = "SELECT * FROM jobs WHERE id = ? AND status = ?";
    assert_eq!(rebind_sql(Backend::Sqlite, sql), sql);
    assert_eq!(
        rebind_sql(Backend::Postgres, sql),
        "SELECT * FROM jobs WHERE id = $1 AND status = $2"
    );
    assert_eq!(rebind_sql(Backend::Postgres, "NO PARAMS"), "NO PARAMS");
}

#[test]
fn timestamps_roundtrip() {
    let now = Utc::now();
    let parsed = parse_ts(&fmt_ts(now)).unwrap();
    // RFC 3339 with micros loses sub-microsecond precision only.
    assert!((now - parsed).num_microseconds().unwrap_or(0).abs() < 2);
}

#[test]
fn parse_ts_rejects_garbage() {
    assert!(parse_ts("not-a-time").is_err());
}

#[tokio::test]
async fn catalog_snapshot_roundtrips() {
    let (store, _dir) = test_db::open().await;

    assert!(store.load_catalog_snapshot().await.unwrap().is_none());

    let models = vec![
        CatalogModel { id: "a".to_string(), ..Default::default() },
        CatalogModel { id: "b".to_string(), ..Default::default() },
    ];
    store.save_catalog_snapshot(&models).await.unwrap();

    let (loaded, _at) = store.load_catalog_snapshot().await.unwrap().unwrap();
    assert_eq!(loaded, models);

    // Overwrite replaces, never appends.
    let smaller = vec![CatalogModel { id: "c".to_string(), ..Default::default() }];
    store.save_catalog_snapshot(&smaller).await.unwrap();
    let (loaded, _at) = store.load_catalog_snapshot().await.unwrap().unwrap();
    assert_eq!(loaded, smaller);
}

#[tokio::test]
async fn hf_models_upsert_by_lowercased_id() {
    let (store, _dir) = test_db::open().await;

    let mut model = HuggingFaceModel { model_id: "Qwen/Qwen2.5-0.5B".to_string(), ..Default::default() };
    model.downloads = 10;
    store.save_hf_models(std::slice::from_ref(&model)).await.unwrap();

    let got = store.get_hf_model("qwen/qwen2.5-0.5b").await.unwrap().unwrap();
    assert_eq!(got.downloads, 10);

    // Mixed-case lookup hits the same row.
    assert!(store.get_hf_model("Qwen/Qwen2.5-0.5B").await.unwrap().is_some());

    model.downloads = 20;
    store.save_hf_models(std::slice::from_ref(&model)).await.unwrap();
    let got = store.get_hf_model("qwen/qwen2.5-0.5b").await.unwrap().unwrap();
    assert_eq!(got.downloads, 20);
    assert_eq!(store.list_hf_models().await.unwrap().len(), 1);
}

#[tokio::test]
async fn history_appends_and_purges() {
    let (store, _dir) = test_db::open().await;

    for i in 0..3 {
        let entry = HistoryEntry::new("weight_install_completed", None, json!({"i": i}));
        store.append_history(&entry).await.unwrap();
    }

    let page = store.list_history(2, 0).await.unwrap();
    assert_eq!(page.len(), 2);
    let rest = store.list_history(2, 2).await.unwrap();
    assert_eq!(rest.len(), 1);

    let purged = store.cleanup_history_before(Utc::now() + chrono::Duration::seconds(1)).await.unwrap();
    assert_eq!(purged, 3);
    assert!(store.list_history(10, 0).await.unwrap().is_empty());
}

#[tokio::test]
async fn tokens_find_and_touch() {
    let (store, _dir) = test_db::open().await;

    store.create_token("tok-1", "ci", "hash123", None).await.unwrap();
    let tok = store.find_token("hash123").await.unwrap().unwrap();
    assert_eq!(tok.name, "ci");
    assert!(tok.last_used_at.is_none());
    assert!(!tok.is_expired(Utc::now()));

    store.touch_token("tok-1").await.unwrap();
    let tok = store.find_token("hash123").await.unwrap().unwrap();
    assert!(tok.last_used_at.is_some());

    assert!(store.find_token("missing").await.unwrap().is_none());
}

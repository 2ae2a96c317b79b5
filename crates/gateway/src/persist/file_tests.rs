// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde_json::json;

use super::*;

fn backend() -> (tempfile::TempDir, FilePersistence) {
    let dir = tempfile::tempdir().expect("tempdir");
    let persistence = FilePersistence::new(dir.path());
    (dir, persistence)
}

// ── entity streams ────────────────────────────────────────────────────

#[tokio::test]
async fn read_missing_entity_returns_none() {
    let (_dir, p) = backend();
    assert_eq!(p.read("acc", "conversations", "sess").await.unwrap(), None);
    assert!(!p.exists("acc", "conversations", "sess").await.unwrap());
}

#[tokio::test]
async fn append_creates_and_extends() {
    let (_dir, p) = backend();
    p.append("acc", "conversations", "sess", "user:hello").await.unwrap();
    p.append("acc", "conversations", "sess", "\nagent:hi").await.unwrap();
    assert_eq!(
        p.read("acc", "conversations", "sess").await.unwrap(),
        Some("user:hello\nagent:hi".to_owned())
    );
}

#[tokio::test]
async fn appends_are_prefix_preserving() {
    let (_dir, p) = backend();
    let mut previous = String::new();
    for chunk in ["user:a", "bc", "\nagent:d", "e"] {
        p.append("acc", "conversations", "sess", chunk).await.unwrap();
        let now = p.read("acc", "conversations", "sess").await.unwrap().unwrap();
        assert!(now.starts_with(&previous), "{now:?} does not extend {previous:?}");
        previous = now;
    }
}

#[tokio::test]
async fn overwrite_replaces_contents() {
    let (_dir, p) = backend();
    p.overwrite("acc", "sessions", "sess", "{\"a\":1}").await.unwrap();
    p.overwrite("acc", "sessions", "sess", "{\"a\":2}").await.unwrap();
    assert_eq!(p.read("acc", "sessions", "sess").await.unwrap(), Some("{\"a\":2}".to_owned()));
}

#[tokio::test]
async fn delete_is_idempotent() {
    let (_dir, p) = backend();
    p.overwrite("acc", "sessions", "sess", "x").await.unwrap();
    p.delete("acc", "sessions", "sess").await.unwrap();
    p.delete("acc", "sessions", "sess").await.unwrap();
    assert!(!p.exists("acc", "sessions", "sess").await.unwrap());
}

#[tokio::test]
async fn unsafe_key_components_are_rejected() {
    let (_dir, p) = backend();
    assert!(p.read("../acc", "sessions", "sess").await.is_err());
    assert!(p.overwrite("acc", "sessions", "..", "x").await.is_err());
    assert!(p.append("acc", "a/b", "sess", "x").await.is_err());
}

// ── record tables ─────────────────────────────────────────────────────

#[tokio::test]
async fn insert_and_read_record() {
    let (_dir, p) = backend();
    p.insert("accounts", json!({"account_id": "a1", "key": "k1"})).await.unwrap();
    p.insert("accounts", json!({"account_id": "a2", "key": "k2"})).await.unwrap();

    let record = p.read_record("accounts", json!({"account_id": "a2"})).await.unwrap();
    assert_eq!(record.unwrap()["key"], "k2");

    let missing = p.read_record("accounts", json!({"account_id": "a3"})).await.unwrap();
    assert!(missing.is_none());
}

#[tokio::test]
async fn update_merges_matching_records() {
    let (_dir, p) = backend();
    p.insert("accounts", json!({"account_id": "a1", "key": "k1"})).await.unwrap();
    p.update("accounts", json!({"key": "k9"}), json!({"account_id": "a1"})).await.unwrap();

    let record = p.read_record("accounts", json!({"account_id": "a1"})).await.unwrap();
    assert_eq!(record.unwrap()["key"], "k9");
}

#[tokio::test]
async fn delete_record_filters_matches() {
    let (_dir, p) = backend();
    p.insert("accounts", json!({"account_id": "a1"})).await.unwrap();
    p.insert("accounts", json!({"account_id": "a2"})).await.unwrap();
    p.delete_record("accounts", json!({"account_id": "a1"})).await.unwrap();

    assert!(p.read_record("accounts", json!({"account_id": "a1"})).await.unwrap().is_none());
    assert!(p.read_record("accounts", json!({"account_id": "a2"})).await.unwrap().is_some());
}

// ── usage accounting ──────────────────────────────────────────────────

#[tokio::test]
async fn usage_sum_filters_account_and_window() {
    let (_dir, p) = backend();
    p.insert("usage", json!({"account_id": "a1", "ts_ms": 100, "total_tokens": 10}))
        .await
        .unwrap();
    p.insert("usage", json!({"account_id": "a1", "ts_ms": 200, "total_tokens": 20}))
        .await
        .unwrap();
    p.insert("usage", json!({"account_id": "a2", "ts_ms": 150, "total_tokens": 99}))
        .await
        .unwrap();

    let all = p.usage_sum("a1", None, None).await.unwrap().unwrap();
    assert_eq!(all.total_tokens, 30);

    let windowed = p.usage_sum("a1", Some(150), Some(250)).await.unwrap().unwrap();
    assert_eq!(windowed.total_tokens, 20);

    assert!(p.usage_sum("a3", None, None).await.unwrap().is_none());
    assert!(p.usage_sum("a1", Some(300), None).await.unwrap().is_none());
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serde_json::json;

async fn repo() -> SqlToolRepository {
    let db = Db::in_memory().await.expect("in-memory db");
    SqlToolRepository::new(db)
}

#[tokio::test]
async fn resolve_by_name_and_id() {
    let repo = repo().await;
    let id = repo
        .upsert(&"acme".into(), "search", true, json!({"depth": 1}))
        .await
        .unwrap();

    let by_name = repo.resolve(&["acme".into()], "search").await.unwrap().unwrap();
    assert_eq!(by_name.id, id);
    assert_eq!(by_name.config["depth"], 1);

    let by_id = repo.resolve(&["acme".into()], &id.to_string()).await.unwrap().unwrap();
    assert_eq!(by_id.name, "search");
}

#[tokio::test]
async fn resolution_is_group_scoped() {
    let repo = repo().await;
    repo.upsert(&"acme".into(), "search", true, json!({})).await.unwrap();

    assert!(repo.resolve(&["globex".into()], "search").await.unwrap().is_none());
    assert!(matches!(
        repo.resolve(&[], "search").await.unwrap_err(),
        StorageError::MissingGroupFilter
    ));
}

#[tokio::test]
async fn upsert_overwrites_config() {
    let repo = repo().await;
    repo.upsert(&"acme".into(), "search", true, json!({"depth": 1})).await.unwrap();
    repo.upsert(&"acme".into(), "search", false, json!({"depth": 2})).await.unwrap();

    let tool = repo.resolve(&["acme".into()], "search").await.unwrap().unwrap();
    assert!(!tool.enabled);
    assert_eq!(tool.config["depth"], 2);
}

#[tokio::test]
async fn unknown_reference_is_none() {
    let repo = repo().await;
    assert!(repo.resolve(&["acme".into()], "missing").await.unwrap().is_none());
    assert!(repo.resolve(&["acme".into()], "9999").await.unwrap().is_none());
}

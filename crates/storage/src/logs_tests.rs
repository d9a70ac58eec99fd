// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use chrono::Utc;

async fn repo() -> SqlLogRepository {
    let db = Db::in_memory().await.expect("in-memory db");
    SqlLogRepository::new(db)
}

fn line(job_id: &str, content: &str) -> LogLine {
    LogLine {
        job_id: job_id.into(),
        content: content.into(),
        timestamp: Utc::now(),
        group_id: "acme".into(),
        group_email: "alice@acme.com".into(),
    }
}

#[tokio::test]
async fn append_and_list_in_order() {
    let repo = repo().await;
    repo.append_batch(&[line("j1", "first"), line("j1", "second")]).await.unwrap();
    repo.append_batch(&[line("j1", "third")]).await.unwrap();

    let lines = repo.list(&[GroupId::new("acme")], &"j1".into(), 100, 0).await.unwrap();
    let contents: Vec<_> = lines.iter().map(|l| l.content.as_str()).collect();
    assert_eq!(contents, ["first", "second", "third"]);
}

#[tokio::test]
async fn logs_are_group_scoped() {
    let repo = repo().await;
    repo.append_batch(&[line("j1", "secret")]).await.unwrap();

    assert!(repo
        .list(&[GroupId::new("globex")], &"j1".into(), 100, 0)
        .await
        .unwrap()
        .is_empty());
    assert!(matches!(
        repo.list(&[], &"j1".into(), 100, 0).await.unwrap_err(),
        StorageError::MissingGroupFilter
    ));
}

#[tokio::test]
async fn delete_under_job() {
    let repo = repo().await;
    repo.append_batch(&[line("j1", "a"), line("j1", "b"), line("j2", "c")]).await.unwrap();
    assert_eq!(repo.delete_for_job(&[GroupId::new("acme")], &"j1".into()).await.unwrap(), 2);
    assert_eq!(repo.list(&[GroupId::new("acme")], &"j2".into(), 100, 0).await.unwrap().len(), 1);
}

#[tokio::test]
async fn empty_batch_is_noop() {
    let repo = repo().await;
    assert_eq!(repo.append_batch(&[]).await.unwrap(), 0);
}

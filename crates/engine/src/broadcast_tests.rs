// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use kasal_core::{ErrorKind, EventType, Execution, GroupRole, Membership};
use kasal_storage::fake::InMemoryExecutionRepository;

fn ctx(email: &str, group: &str) -> GroupContext {
    GroupContext::resolve(
        email,
        &[Membership { group_id: group.into(), role: GroupRole::Editor }],
        None,
    )
    .unwrap()
}

async fn seeded_repo(job_id: &str, group: &str) -> InMemoryExecutionRepository {
    let repo = InMemoryExecutionRepository::new();
    repo.insert(&Execution::builder().job_id(job_id).group_id(group).build())
        .await
        .unwrap();
    repo
}

#[tokio::test]
async fn subscribe_and_receive() {
    let repo = seeded_repo("j1", "acme").await;
    let broadcaster = Broadcaster::new();
    let (tx, mut rx) = mpsc::channel::<Value>(8);

    broadcaster
        .subscribe(&"j1".into(), &ctx("alice@acme.com", "acme"), &repo, Arc::new(tx))
        .await
        .unwrap();
    assert_eq!(broadcaster.subscriber_count(&"j1".into()), 1);

    broadcaster.broadcast(&"j1".into(), json!({"type": "log"})).await;
    assert_eq!(rx.recv().await.unwrap()["type"], "log");
}

#[tokio::test]
async fn cross_tenant_subscribe_rejected() {
    let repo = seeded_repo("j1", "acme").await;
    let broadcaster = Broadcaster::new();
    let (tx, _rx) = mpsc::channel::<Value>(8);

    let err = broadcaster
        .subscribe(&"j1".into(), &ctx("bob@globex.com", "globex"), &repo, Arc::new(tx))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(broadcaster.subscriber_count(&"j1".into()), 0);
}

#[tokio::test]
async fn dead_subscriber_pruned_silently() {
    let repo = seeded_repo("j1", "acme").await;
    let broadcaster = Broadcaster::new();

    let (dead_tx, dead_rx) = mpsc::channel::<Value>(1);
    drop(dead_rx);
    let (live_tx, mut live_rx) = mpsc::channel::<Value>(8);

    let ctx = ctx("alice@acme.com", "acme");
    broadcaster.subscribe(&"j1".into(), &ctx, &repo, Arc::new(dead_tx)).await.unwrap();
    broadcaster.subscribe(&"j1".into(), &ctx, &repo, Arc::new(live_tx)).await.unwrap();

    broadcaster.broadcast(&"j1".into(), json!({"n": 1})).await;
    assert_eq!(live_rx.recv().await.unwrap()["n"], 1);
    assert_eq!(broadcaster.subscriber_count(&"j1".into()), 1);
}

#[tokio::test]
async fn broadcast_without_subscribers_is_noop() {
    let broadcaster = Broadcaster::new();
    broadcaster.broadcast(&"j1".into(), json!({})).await;
}

#[test]
fn task_status_frame_shape() {
    let event = TraceEvent::new(
        "j1".into(),
        EventType::TaskCompleted,
        "Task[t1]",
        "acme".into(),
        "alice@acme.com",
        chrono::Utc::now(),
    )
    .event_context("research task")
    .output("done")
    .task_id("t1");

    let frame = frames::task_status(&event);
    assert_eq!(frame["type"], "task_status_update");
    assert_eq!(frame["event_type"], "task_completed");
    assert_eq!(frame["task_id"], "t1");
    assert_eq!(frame["task_name"], "research task");
    assert_eq!(frame["output"], "done");
}

#[test]
fn log_batch_frame_shape() {
    let lines = vec![LogLine {
        job_id: "j1".into(),
        content: "line".into(),
        timestamp: chrono::Utc::now(),
        group_id: "acme".into(),
        group_email: "alice@acme.com".into(),
    }];
    let frame = frames::log_batch(&"j1".into(), &lines);
    assert_eq!(frame["type"], "log");
    assert_eq!(frame["execution_id"], "j1");
    assert_eq!(frame["entries"].as_array().unwrap().len(), 1);
    assert_eq!(frame["entries"][0]["content"], "line");
}

#[test]
fn terminal_frame_shape() {
    let ok = frames::terminal(&"j1".into(), kasal_core::ExecutionStatus::Completed, None);
    assert_eq!(ok["type"], "execution_complete");
    assert_eq!(ok["status"], "completed");
    assert!(ok.get("error").is_none());

    let failed =
        frames::terminal(&"j1".into(), kasal_core::ExecutionStatus::Failed, Some("boom"));
    assert_eq!(failed["error"], "boom");
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Submit → pending → running → completed, with traces and the
//! terminal WebSocket frame.

use crate::prelude::*;
use kasal_core::{EventType, ExecutionStatus, GroupRole};
use serial_test::serial;
use std::sync::Arc;

#[tokio::test]
#[serial]
async fn crew_runs_to_completion_with_traces() {
    let world = world().await;
    let ctx = world.member("alice@acme.com", "acme", GroupRole::Editor).await;

    let job_id = world.service.start(research_job("j1"), ctx.clone()).await.unwrap();
    assert_eq!(job_id.as_str(), "j1");

    let row = world.wait_status(&ctx, "j1", ExecutionStatus::Completed).await;
    assert_eq!(row.group_id.as_str(), "acme");
    assert!(row.started_at.is_some());
    assert!(row.completed_at.is_some());
    assert!(row.result.unwrap()["content"]["tasks"].is_array());

    world.wait_traces(&ctx, "j1", 2).await;
    let traces = world.traces_for(&ctx, "j1").await;
    let types: Vec<_> = traces.iter().map(|t| t.event_type).collect();
    assert!(types.contains(&EventType::CrewStarted));
    assert!(types.contains(&EventType::CrewCompleted));
    assert!(traces.iter().all(|t| t.group_id.as_str() == "acme"));
}

#[tokio::test]
#[serial]
async fn terminal_frame_reaches_subscribers() {
    let world = world().await;
    let ctx = world.member("alice@acme.com", "acme", GroupRole::Editor).await;

    world.service.start(research_job("j1"), ctx.clone()).await.unwrap();

    // Subscribe while the job is live; the pending row already exists.
    let (tx, mut rx) = tokio::sync::mpsc::channel(64);
    world
        .service
        .broadcaster()
        .subscribe(&"j1".into(), &ctx, &world.executions, Arc::new(tx))
        .await
        .unwrap();

    loop {
        let frame = tokio::time::timeout(std::time::Duration::from_secs(5), rx.recv())
            .await
            .expect("frame before timeout")
            .expect("channel open until terminal frame");
        if frame["type"] == "execution_complete" {
            assert_eq!(frame["status"], "completed");
            break;
        }
    }
}

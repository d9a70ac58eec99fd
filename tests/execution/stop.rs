// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Graceful and forced stop semantics.

use crate::prelude::*;
use kasal_adapters::FakeCrewEngine;
use kasal_core::{EventType, ExecutionStatus, GroupRole};
use kasal_engine::{StopRequest, StopType};
use serial_test::serial;
use std::time::Duration;

fn stop(stop_type: StopType, reason: Option<&str>) -> StopRequest {
    StopRequest {
        stop_type,
        reason: reason.map(str::to_string),
        preserve_partial_results: true,
    }
}

#[tokio::test]
#[serial]
async fn graceful_stop_preserves_partials_and_reason() {
    let world = world_with(
        FakeCrewEngine::new().with_task_delay(Duration::from_secs(30)),
        spec_settings(),
    )
    .await;
    let ctx = world.member("alice@acme.com", "acme", GroupRole::Editor).await;

    world.service.start(research_job("j2"), ctx.clone()).await.unwrap();
    world.wait_status(&ctx, "j2", ExecutionStatus::Running).await;

    let response = world
        .service
        .stop(&ctx, &"j2".into(), stop(StopType::Graceful, Some("user_cancel")))
        .await
        .unwrap();
    assert!(matches!(
        response.status,
        ExecutionStatus::Stopping | ExecutionStatus::Stopped
    ));

    let row = world.wait_status(&ctx, "j2", ExecutionStatus::Stopped).await;
    assert_eq!(row.stop_reason.as_deref(), Some("user_cancel"));
    assert!(row.partial_results.is_some());
    assert!(row.completed_at.is_some());

    // A stopped run never records crew_completed.
    tokio::time::sleep(Duration::from_millis(100)).await;
    let traces = world.traces_for(&ctx, "j2").await;
    assert!(traces.iter().any(|t| t.event_type == EventType::CrewStarted));
    assert!(!traces.iter().any(|t| t.event_type == EventType::CrewCompleted));
}

#[tokio::test]
#[serial]
async fn repeated_stop_requests_are_idempotent() {
    let world = world_with(
        FakeCrewEngine::new().with_task_delay(Duration::from_secs(30)),
        spec_settings(),
    )
    .await;
    let ctx = world.member("alice@acme.com", "acme", GroupRole::Editor).await;

    world.service.start(research_job("j2"), ctx.clone()).await.unwrap();
    world.wait_status(&ctx, "j2", ExecutionStatus::Running).await;

    world
        .service
        .stop(&ctx, &"j2".into(), stop(StopType::Graceful, Some("first")))
        .await
        .unwrap();
    // The second request must not error and must not clobber the
    // recorded reason.
    let second = world
        .service
        .stop(&ctx, &"j2".into(), stop(StopType::Graceful, Some("second")))
        .await;
    assert!(second.is_ok() || second.unwrap_err().kind() == kasal_core::ErrorKind::NotFound);

    let row = world.wait_status(&ctx, "j2", ExecutionStatus::Stopped).await;
    assert_eq!(row.stop_reason.as_deref(), Some("first"));
}

#[tokio::test]
#[serial]
async fn force_stop_terminates_without_waiting() {
    let world = world_with(
        FakeCrewEngine::new().with_task_delay(Duration::from_secs(30)),
        spec_settings(),
    )
    .await;
    let ctx = world.member("alice@acme.com", "acme", GroupRole::Editor).await;

    world.service.start(research_job("j9"), ctx.clone()).await.unwrap();
    world.wait_status(&ctx, "j9", ExecutionStatus::Running).await;

    world
        .service
        .stop(&ctx, &"j9".into(), stop(StopType::Force, Some("operator")))
        .await
        .unwrap();

    let row = world.wait_status(&ctx, "j9", ExecutionStatus::Stopped).await;
    assert_eq!(row.stop_reason.as_deref(), Some("operator"));
}

#[tokio::test]
#[serial]
async fn timeout_is_cancel_with_reason_timeout() {
    let mut settings = spec_settings();
    settings.default_timeout_secs = 1;
    let world = world_with(
        FakeCrewEngine::new().with_task_delay(Duration::from_secs(30)),
        settings,
    )
    .await;
    let ctx = world.member("alice@acme.com", "acme", GroupRole::Editor).await;

    let config = research_job("j-slow").config;
    let job = kasal_core::ExecutionJob::new("j-slow", config).build();
    world.service.start(job, ctx.clone()).await.unwrap();

    let row = world.wait_status(&ctx, "j-slow", ExecutionStatus::Failed).await;
    assert_eq!(row.error.as_deref(), Some("timeout"));
    assert!(row.completed_at.is_some());
}

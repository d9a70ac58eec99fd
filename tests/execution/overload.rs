// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bounded concurrency: submissions over the cap fail fast.

use crate::prelude::*;
use kasal_adapters::FakeCrewEngine;
use kasal_core::{ErrorKind, ExecutionStatus, GroupRole};
use kasal_engine::{StopRequest, StopType};
use kasal_storage::ExecutionFilter;
use serial_test::serial;
use std::time::Duration;

#[tokio::test]
#[serial]
async fn over_cap_submission_fails_fast_with_no_row() {
    let mut settings = spec_settings();
    settings.max_concurrent = 2;
    let world = world_with(
        FakeCrewEngine::new().with_task_delay(Duration::from_secs(30)),
        settings,
    )
    .await;
    let ctx = world.member("alice@acme.com", "acme", GroupRole::Editor).await;

    world.service.start(research_job("j5"), ctx.clone()).await.unwrap();
    world.service.start(research_job("j6"), ctx.clone()).await.unwrap();

    let err = world.service.start(research_job("j7"), ctx.clone()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Overloaded);

    // No execution row was left behind for the rejected submission.
    let err = world.service.get(&ctx, &"j7".into()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    // Nothing is running except the two live jobs.
    let running = world
        .service
        .list(
            &ctx,
            &ExecutionFilter { status: Some(ExecutionStatus::Running), ..Default::default() },
        )
        .await
        .unwrap();
    assert!(running.len() <= 2);

    // Free a slot; the next submission succeeds.
    world
        .service
        .stop(
            &ctx,
            &"j5".into(),
            StopRequest {
                stop_type: StopType::Force,
                reason: None,
                preserve_partial_results: false,
            },
        )
        .await
        .unwrap();
    world.wait_status(&ctx, "j5", ExecutionStatus::Stopped).await;

    let mut accepted = false;
    for _ in 0..200 {
        match world.service.start(research_job("j8"), ctx.clone()).await {
            Ok(_) => {
                accepted = true;
                break;
            }
            Err(e) if e.kind() == ErrorKind::Overloaded => {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    assert!(accepted, "slot must free once a worker leaves the pool");
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tenant isolation: two groups submit jobs; neither sees the other's.

use crate::prelude::*;
use kasal_core::{ErrorKind, ExecutionStatus, GroupId, GroupRole};
use kasal_storage::ExecutionFilter;
use serial_test::serial;
use std::sync::Arc;

#[tokio::test]
#[serial]
async fn groups_never_see_each_others_executions() {
    let world = world().await;
    let acme = world.member("alice@acme.com", "acme", GroupRole::Editor).await;
    let globex = world.member("bob@globex.com", "globex", GroupRole::Editor).await;

    world.service.start(research_job("j3"), acme.clone()).await.unwrap();
    world.service.start(research_job("j4"), globex.clone()).await.unwrap();

    world.wait_status(&acme, "j3", ExecutionStatus::Completed).await;
    world.wait_status(&globex, "j4", ExecutionStatus::Completed).await;

    // list(acme) returns exactly {j3}
    let listed = world.service.list(&acme, &ExecutionFilter::default()).await.unwrap();
    let ids: Vec<_> = listed.iter().map(|e| e.job_id.as_str().to_string()).collect();
    assert_eq!(ids, ["j3"]);

    // get(j4) under acme is NotFound
    let err = world.service.get(&acme, &"j4".into()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    // Trace rows are tagged with their owning group only.
    world.wait_traces(&acme, "j3", 2).await;
    assert!(world.traces_for(&globex, "j3").await.is_empty());
}

#[tokio::test]
#[serial]
async fn same_job_id_is_isolated_per_group() {
    let world = world().await;
    let acme = world.member("alice@acme.com", "acme", GroupRole::Editor).await;
    let globex = world.member("bob@globex.com", "globex", GroupRole::Editor).await;

    world.service.start(research_job("shared-id"), acme.clone()).await.unwrap();
    world.wait_status(&acme, "shared-id", ExecutionStatus::Completed).await;

    // The same external key is free in another group.
    world.service.start(research_job("shared-id"), globex.clone()).await.unwrap();
    world.wait_status(&globex, "shared-id", ExecutionStatus::Completed).await;
}

#[tokio::test]
#[serial]
async fn cross_tenant_subscription_rejected() {
    let world = world().await;
    let acme = world.member("alice@acme.com", "acme", GroupRole::Editor).await;
    let globex = world.member("bob@globex.com", "globex", GroupRole::Editor).await;

    world.service.start(research_job("j1"), acme.clone()).await.unwrap();

    let (tx, _rx) = tokio::sync::mpsc::channel(4);
    let err = world
        .service
        .broadcaster()
        .subscribe(&"j1".into(), &globex, &world.executions, Arc::new(tx))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    world.wait_status(&acme, "j1", ExecutionStatus::Completed).await;
}

#[tokio::test]
#[serial]
async fn personal_workspace_selector_is_validated() {
    let world = world().await;
    world.member("alice@acme.com", "acme", GroupRole::Admin).await;

    // Alice can select her own personal workspace...
    let personal = world
        .service
        .resolve_context(
            "alice@acme.com",
            Some(&GroupId::new("user_alice_acme_com")),
            None,
        )
        .await
        .unwrap();
    assert_eq!(personal.primary_group_id().as_str(), "user_alice_acme_com");
    // ...with her strongest role carried for authorization.
    assert_eq!(personal.user_role(), Some(GroupRole::Admin));

    // Bob cannot select Alice's.
    world.member("bob@acme.com", "acme", GroupRole::Editor).await;
    let err = world
        .service
        .resolve_context(
            "bob@acme.com",
            Some(&GroupId::new("user_alice_acme_com")),
            None,
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);
}

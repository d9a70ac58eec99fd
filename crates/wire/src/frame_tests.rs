// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::{read_frame, write_frame};
use chrono::Utc;
use kasal_core::{EventType, TraceEvent};

fn group() -> WorkerGroupContext {
    WorkerGroupContext {
        group_id: "acme".into(),
        group_email: "alice@acme.com".into(),
        email_domain: "acme.com".into(),
        user_id: None,
        access_token: None,
    }
}

#[tokio::test]
async fn frame_demux_roundtrip() {
    let mut buffer = Vec::new();
    let group = group();

    write_frame(&mut buffer, &Frame::log("j1".into(), "line one", Utc::now(), &group))
        .await
        .unwrap();
    write_frame(
        &mut buffer,
        &Frame::Trace(TraceEvent::new(
            "j1".into(),
            EventType::CrewStarted,
            "Crew[research]",
            group.group_id.clone(),
            &group.group_email,
            Utc::now(),
        )),
    )
    .await
    .unwrap();
    write_frame(
        &mut buffer,
        &Frame::Result(WorkerResult::ok(serde_json::json!({"content": "done"}))),
    )
    .await
    .unwrap();

    let mut cursor = std::io::Cursor::new(buffer);
    let first: Frame = read_frame(&mut cursor).await.unwrap();
    let second: Frame = read_frame(&mut cursor).await.unwrap();
    let third: Frame = read_frame(&mut cursor).await.unwrap();

    match first {
        Frame::Log(line) => {
            assert_eq!(line.content, "line one");
            assert_eq!(line.group_id.as_str(), "acme");
        }
        other => panic!("expected log frame, got {other:?}"),
    }
    match second {
        Frame::Trace(event) => assert_eq!(event.event_type, EventType::CrewStarted),
        other => panic!("expected trace frame, got {other:?}"),
    }
    match third {
        Frame::Result(result) => {
            assert!(result.success);
            assert_eq!(result.result.unwrap()["content"], "done");
        }
        other => panic!("expected result frame, got {other:?}"),
    }
}

#[test]
fn worker_init_serializes_primitives_only() {
    let init = WorkerInit {
        job_id: "j1".into(),
        group: group(),
        config: serde_json::json!({"agents": {}, "tasks": {}}),
        flow: None,
        memory: None,
        inputs: serde_json::json!({"topic": "ai"}),
        debug_tracing: false,
        env: vec![("OPENAI_API_KEY".into(), "sk-test".into())],
        log_file: "/tmp/kasal/logs/acme_crew_ab12cd34.log".into(),
        memory_dir: "/tmp/kasal/memory".into(),
    };
    let json = serde_json::to_string(&init).unwrap();
    let back: WorkerInit = serde_json::from_str(&json).unwrap();
    assert_eq!(back.job_id, init.job_id);
    assert_eq!(back.group.group_id, init.group.group_id);
    assert_eq!(back.env.len(), 1);
}

#[test]
fn result_error_constructor_sets_failure() {
    let result = WorkerResult::err("crew kickoff failed")
        .with_partial(serde_json::json!({"tasks_completed": 1}));
    assert!(!result.success);
    assert_eq!(result.error.as_deref(), Some("crew kickoff failed"));
    assert!(result.partial.is_some());
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn vocabulary_is_closed() {
    assert_eq!(EventType::ALL.len(), 18);
    assert_eq!(EventType::parse("crew_started"), Some(EventType::CrewStarted));
    assert_eq!(EventType::parse("debug_whatever"), None);
    assert_eq!(EventType::parse("CREW_STARTED"), None);
}

#[test]
fn parse_round_trips_every_variant() {
    for event in EventType::ALL {
        assert_eq!(EventType::parse(&event.to_string()), Some(event));
    }
}

#[test]
fn debug_only_subset() {
    let debug_only: Vec<_> = EventType::ALL.iter().filter(|e| e.is_debug_only()).collect();
    assert_eq!(debug_only.len(), 9);
    assert!(EventType::MemoryRetrieval.is_debug_only());
    assert!(EventType::LlmGuardrail.is_debug_only());
    assert!(!EventType::CrewCompleted.is_debug_only());
    assert!(!EventType::TaskFailed.is_debug_only());
}

#[test]
fn task_events_broadcast() {
    assert!(EventType::TaskStarted.is_task_event());
    assert!(EventType::TaskCompleted.is_task_event());
    assert!(EventType::TaskFailed.is_task_event());
    assert!(!EventType::CrewStarted.is_task_event());
    assert!(!EventType::AgentExecution.is_task_event());
}

#[test]
fn trace_event_builder_chain() {
    let event = TraceEvent::new(
        "j1".into(),
        EventType::TaskStarted,
        "Task[t1]",
        "acme".into(),
        "alice@acme.com",
        chrono::Utc::now(),
    )
    .event_context("research task")
    .output("starting")
    .task_id("t1");

    assert_eq!(event.job_id.as_str(), "j1");
    assert_eq!(event.task_id.as_deref(), Some("t1"));
    assert_eq!(event.event_context, "research task");
}

#[test]
fn trace_event_serde_snake_case() {
    let event = TraceEvent::new(
        "j1".into(),
        EventType::KnowledgeRetrievalStarted,
        "Knowledge[docs]",
        "acme".into(),
        "alice@acme.com",
        chrono::Utc::now(),
    );
    let json = serde_json::to_value(&event).unwrap();
    assert_eq!(json["event_type"], "knowledge_retrieval_started");
    assert_eq!(json["group_id"], "acme");
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Trace event vocabulary and envelopes.
//!
//! The persisted vocabulary is closed: the trace writer drops anything
//! it cannot parse into [`EventType`]. A subset is debug-only and is
//! additionally suppressed unless the engine's debug-tracing flag is on.

use crate::id::{GroupId, JobId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Closed vocabulary of persisted trace event types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    CrewStarted,
    CrewCompleted,
    TaskStarted,
    TaskCompleted,
    TaskFailed,
    AgentExecution,
    ToolUsage,
    ToolError,
    LlmCall,
    LlmGuardrail,
    MemoryWrite,
    MemoryRetrieval,
    MemoryWriteStarted,
    MemoryRetrievalStarted,
    KnowledgeRetrieval,
    KnowledgeRetrievalStarted,
    AgentReasoning,
    AgentReasoningError,
}

crate::simple_display! {
    EventType {
        CrewStarted => "crew_started",
        CrewCompleted => "crew_completed",
        TaskStarted => "task_started",
        TaskCompleted => "task_completed",
        TaskFailed => "task_failed",
        AgentExecution => "agent_execution",
        ToolUsage => "tool_usage",
        ToolError => "tool_error",
        LlmCall => "llm_call",
        LlmGuardrail => "llm_guardrail",
        MemoryWrite => "memory_write",
        MemoryRetrieval => "memory_retrieval",
        MemoryWriteStarted => "memory_write_started",
        MemoryRetrievalStarted => "memory_retrieval_started",
        KnowledgeRetrieval => "knowledge_retrieval",
        KnowledgeRetrievalStarted => "knowledge_retrieval_started",
        AgentReasoning => "agent_reasoning",
        AgentReasoningError => "agent_reasoning_error",
    }
}

impl EventType {
    pub const ALL: [EventType; 18] = [
        EventType::CrewStarted,
        EventType::CrewCompleted,
        EventType::TaskStarted,
        EventType::TaskCompleted,
        EventType::TaskFailed,
        EventType::AgentExecution,
        EventType::ToolUsage,
        EventType::ToolError,
        EventType::LlmCall,
        EventType::LlmGuardrail,
        EventType::MemoryWrite,
        EventType::MemoryRetrieval,
        EventType::MemoryWriteStarted,
        EventType::MemoryRetrievalStarted,
        EventType::KnowledgeRetrieval,
        EventType::KnowledgeRetrievalStarted,
        EventType::AgentReasoning,
        EventType::AgentReasoningError,
    ];

    /// Parse a persisted name. Unknown values are not in the vocabulary
    /// and must be dropped by the writer.
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.iter().find(|e| e.to_string() == s).copied()
    }

    /// Verbose events suppressed when `crewai_debug_tracing` is off.
    pub fn is_debug_only(&self) -> bool {
        matches!(
            self,
            EventType::MemoryWrite
                | EventType::MemoryRetrieval
                | EventType::MemoryWriteStarted
                | EventType::MemoryRetrievalStarted
                | EventType::KnowledgeRetrieval
                | EventType::KnowledgeRetrievalStarted
                | EventType::AgentReasoning
                | EventType::AgentReasoningError
                | EventType::LlmGuardrail
        )
    }

    /// Task lifecycle events are also broadcast to WebSocket subscribers.
    pub fn is_task_event(&self) -> bool {
        matches!(
            self,
            EventType::TaskStarted | EventType::TaskCompleted | EventType::TaskFailed
        )
    }
}

/// One structured event in the life of a job, as enqueued by producers
/// and persisted by the trace writer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceEvent {
    pub job_id: JobId,
    /// Logical emitter, e.g. `Agent[Researcher]`, `Task[t1]`.
    pub event_source: String,
    /// Free-text context, e.g. the task name.
    pub event_context: String,
    pub event_type: EventType,
    pub output: String,
    #[serde(default)]
    pub trace_metadata: serde_json::Value,
    pub group_id: GroupId,
    pub group_email: String,
    /// Task identifier for `task_*` events (carried into the WebSocket
    /// status frame).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl TraceEvent {
    pub fn new(
        job_id: JobId,
        event_type: EventType,
        event_source: impl Into<String>,
        group_id: GroupId,
        group_email: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            job_id,
            event_source: event_source.into(),
            event_context: String::new(),
            event_type,
            output: String::new(),
            trace_metadata: serde_json::Value::Null,
            group_id,
            group_email: group_email.into(),
            task_id: None,
            created_at,
        }
    }

    crate::setters! {
        into {
            event_context: String,
            output: String,
        }
        set {
            trace_metadata: serde_json::Value,
        }
        option {
            task_id: String,
        }
    }
}

/// One unstructured log line emitted from a worker process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogLine {
    pub job_id: JobId,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub group_id: GroupId,
    pub group_email: String,
}

#[cfg(test)]
#[path = "events_tests.rs"]
mod tests;

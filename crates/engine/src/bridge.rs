// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event listener adapter: orchestration-library events → trace events.
//!
//! Subscribed to the engine's event channel at worker startup. Every
//! envelope is tagged with the ambient job and group; translation
//! failures are swallowed and logged; a bad event must never crash the
//! orchestrator.

use kasal_adapters::EngineEvent;
use kasal_core::{EventType, JobId, TraceEvent, WorkerGroupContext};
use serde_json::json;
use tokio::sync::mpsc;

pub struct EventBridge {
    job_id: JobId,
    group: WorkerGroupContext,
    /// When off, debug-only events are not emitted at all (the writer
    /// would filter them anyway; suppressing at the source keeps them
    /// off the wire).
    debug_tracing: bool,
}

impl EventBridge {
    pub fn new(job_id: JobId, group: WorkerGroupContext, debug_tracing: bool) -> Self {
        Self { job_id, group, debug_tracing }
    }

    /// Consume engine events, translating each into a trace event
    /// handed to `emit`. Runs until the engine drops its sender.
    pub fn spawn<F>(
        self,
        mut rx: mpsc::Receiver<EngineEvent>,
        emit: F,
    ) -> tokio::task::JoinHandle<()>
    where
        F: Fn(TraceEvent) + Send + 'static,
    {
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if let Some(trace) = self.translate(event) {
                    emit(trace);
                }
            }
        })
    }

    /// Translate one library event. `None` means "not traced" (debug
    /// event with tracing off).
    pub fn translate(&self, event: EngineEvent) -> Option<TraceEvent> {
        let base = |event_type: EventType, source: String| {
            TraceEvent::new(
                self.job_id.clone(),
                event_type,
                source,
                self.group.group_id.clone(),
                self.group.group_email.clone(),
                chrono::Utc::now(),
            )
        };

        let trace = match event {
            EngineEvent::CrewStarted { crew_name } => {
                base(EventType::CrewStarted, format!("Crew[{crew_name}]"))
                    .event_context(crew_name)
            }
            EngineEvent::CrewCompleted { crew_name, output } => {
                base(EventType::CrewCompleted, format!("Crew[{crew_name}]"))
                    .event_context(crew_name)
                    .output(output.to_string())
                    .trace_metadata(output)
            }
            EngineEvent::TaskStarted { task_id, task_name, description } => {
                base(EventType::TaskStarted, format!("Task[{task_id}]"))
                    .event_context(task_name)
                    .output(description)
                    .task_id(task_id)
            }
            EngineEvent::TaskCompleted { task_id, task_name, output } => {
                base(EventType::TaskCompleted, format!("Task[{task_id}]"))
                    .event_context(task_name)
                    .output(output)
                    .task_id(task_id)
            }
            EngineEvent::TaskFailed { task_id, task_name, error } => {
                base(EventType::TaskFailed, format!("Task[{task_id}]"))
                    .event_context(task_name)
                    .output(error)
                    .task_id(task_id)
            }
            EngineEvent::AgentExecution { role, output } => {
                base(EventType::AgentExecution, format!("Agent[{role}]")).output(output)
            }
            EngineEvent::ToolUsage { tool_name, args, result } => {
                base(EventType::ToolUsage, format!("Tool[{tool_name}]"))
                    .output(result)
                    .trace_metadata(json!({"args": args}))
            }
            EngineEvent::ToolError { tool_name, args, error } => {
                base(EventType::ToolError, format!("Tool[{tool_name}]"))
                    .output(error)
                    .trace_metadata(json!({"args": args}))
            }
            EngineEvent::LlmCall { role, prompt, response } => {
                base(EventType::LlmCall, format!("Agent[{role}]"))
                    .event_context(prompt)
                    .output(response)
            }
            EngineEvent::LlmGuardrail { guardrail, verdict } => {
                base(EventType::LlmGuardrail, format!("Guardrail[{guardrail}]")).output(verdict)
            }
            EngineEvent::KnowledgeRetrieval { source, query, hits, started } => {
                let event_type = if started {
                    EventType::KnowledgeRetrievalStarted
                } else {
                    EventType::KnowledgeRetrieval
                };
                base(event_type, format!("Knowledge[{source}]"))
                    .event_context(query)
                    .output(hits)
            }
            EngineEvent::AgentReasoning { role, chain, error } => match error {
                Some(error) => base(EventType::AgentReasoningError, format!("Agent[{role}]"))
                    .event_context(chain)
                    .output(error),
                None => base(EventType::AgentReasoning, format!("Agent[{role}]")).output(chain),
            },
        };

        if trace.event_type.is_debug_only() && !self.debug_tracing {
            return None;
        }
        Some(trace)
    }
}

#[cfg(test)]
#[path = "bridge_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Contract to the embedded crew orchestration library.
//!
//! The core builds a [`CrewPlan`], hands it to a [`CrewEngine`], and
//! observes [`EngineEvent`]s on the event channel until `kickoff`
//! resolves. The engine's internal task graph is its own business; we
//! contract only to the entry point, the event bus, and cooperative
//! cancellation.

use crate::llm::LlmBinding;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Errors from a crew engine run.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Cooperative cancel honored; carries whatever output existed.
    #[error("crew execution cancelled")]
    Cancelled { partial: Option<Value> },
    /// LLM / tool / storage backend failure.
    #[error("upstream failure: {0}")]
    Upstream(String),
    /// The plan was not executable.
    #[error("invalid crew plan: {0}")]
    Invalid(String),
}

/// One concrete tool attached to an agent. Adapters that fan out (MCP)
/// contribute several handles from one reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolHandle {
    pub name: String,
    #[serde(default)]
    pub config: Value,
}

/// A knowledge source attached to an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum KnowledgeSource {
    /// `catalog.schema.volume` plus the file path inside the volume.
    DatabricksVolume { volume: String, file_path: String },
    /// Anything else degrades to a plain path.
    Path { path: String },
}

/// A fully-materialized agent: tools resolved, LLM bound.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentPlan {
    pub key: String,
    pub role: String,
    pub goal: String,
    pub backstory: String,
    pub llm: LlmBinding,
    pub tools: Vec<ToolHandle>,
    pub knowledge_sources: Vec<KnowledgeSource>,
    /// Always false: code execution is disabled by policy regardless of
    /// the submitted config.
    pub allow_code_execution: bool,
    pub max_iter: Option<u32>,
}

/// A fully-materialized task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskPlan {
    pub key: String,
    pub name: String,
    pub description: String,
    pub expected_output: String,
    pub agent_key: Option<String>,
    pub tools: Vec<ToolHandle>,
    pub async_execution: bool,
}

/// Flow topology for flow executions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowPlan {
    pub name: String,
    pub starting_points: Vec<Value>,
    pub listeners: Vec<Value>,
    pub actions: Vec<Value>,
}

/// What `kickoff` consumes: the orchestration-library objects in
/// engine-neutral form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrewPlan {
    /// Deterministic crew identity (memory + log key).
    pub crew_id: String,
    pub name: String,
    pub agents: Vec<AgentPlan>,
    pub tasks: Vec<TaskPlan>,
    pub flow: Option<FlowPlan>,
    pub planning: bool,
    pub reasoning: bool,
    /// False when custom memory stores are attached, so the library's
    /// default store does not also run.
    pub library_memory: bool,
    pub inputs: Value,
}

/// Normalized output of a crew run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrewOutput {
    pub content: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_usage: Option<Value>,
}

/// Events the orchestration library emits during a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    CrewStarted { crew_name: String },
    CrewCompleted { crew_name: String, output: Value },
    TaskStarted { task_id: String, task_name: String, description: String },
    TaskCompleted { task_id: String, task_name: String, output: String },
    TaskFailed { task_id: String, task_name: String, error: String },
    AgentExecution { role: String, output: String },
    ToolUsage { tool_name: String, args: Value, result: String },
    ToolError { tool_name: String, args: Value, error: String },
    LlmCall { role: String, prompt: String, response: String },
    LlmGuardrail { guardrail: String, verdict: String },
    KnowledgeRetrieval { source: String, query: String, hits: String, started: bool },
    AgentReasoning { role: String, chain: String, error: Option<String> },
}

/// The orchestration library's entry point.
#[async_trait]
pub trait CrewEngine: Send + Sync + 'static {
    /// Run the crew to completion.
    ///
    /// Lifecycle events go out on `events` as they happen (dropped
    /// receivers must not fail the run). A triggered `cancel` token asks
    /// for cooperative shutdown; engines that honor it return
    /// [`EngineError::Cancelled`] with any partial output.
    async fn kickoff(
        &self,
        plan: CrewPlan,
        events: mpsc::Sender<EngineEvent>,
        cancel: CancellationToken,
    ) -> Result<CrewOutput, EngineError>;
}

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
#[path = "crew_fake.rs"]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeCrewEngine;

#[cfg(test)]
#[path = "crew_tests.rs"]
mod tests;

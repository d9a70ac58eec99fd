// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Crew and flow configuration model.
//!
//! This is the validated shape of what the API layer submits: agent and
//! task maps (insertion-ordered), optional flow topology, model binding
//! hints. Agent/task map values may arrive as JSON strings (frontend
//! quirk the original tolerates); [`CrewConfig::from_value`] normalizes
//! both forms.

use crate::error::CoreError;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Whether a submission runs a single crew or a flow of crews.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionType {
    #[default]
    Crew,
    Flow,
}

crate::simple_display! {
    ExecutionType {
        Crew => "crew",
        Flow => "flow",
    }
}

/// One agent definition inside a crew.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct AgentConfig {
    pub role: String,
    #[serde(default)]
    pub goal: String,
    #[serde(default)]
    pub backstory: String,
    /// Model binding: a model name string, a full LLM config object, or
    /// absent (engine default applies).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub llm: Option<Value>,
    /// Temperature on the 0–100 scale the frontend uses; divided by 100
    /// when the binding is resolved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Tool references: repository ids or tool names.
    #[serde(default)]
    pub tools: Vec<String>,
    /// Per-agent tool config overrides, keyed by tool name; merged over
    /// the group tool's stored config.
    #[serde(default)]
    pub tool_configs: IndexMap<String, Value>,
    #[serde(default)]
    pub knowledge_sources: Vec<Value>,
    /// Ignored at build time: code execution is disabled by policy.
    #[serde(default)]
    pub allow_code_execution: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_iter: Option<u32>,
}

/// One task definition inside a crew.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct TaskConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub description: String,
    #[serde(default)]
    pub expected_output: String,
    /// Key of the agent assigned to this task.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
    #[serde(default)]
    pub tools: Vec<String>,
    #[serde(default)]
    pub async_execution: bool,
}

impl TaskConfig {
    /// Stable identifier used for hashing and trace sources: the task
    /// name, falling back to the first 50 characters of the description.
    pub fn identifier(&self) -> String {
        match &self.name {
            Some(name) if !name.is_empty() => name.clone(),
            _ => self.description.chars().take(50).collect(),
        }
    }
}

/// Crew execution configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CrewConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub agents: IndexMap<String, AgentConfig>,
    pub tasks: IndexMap<String, TaskConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default)]
    pub planning: bool,
    #[serde(default)]
    pub reasoning: bool,
    #[serde(default)]
    pub execution_type: ExecutionType,
    /// Explicit crew identity override; skips the derived hash.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crew_id: Option<String>,
    /// Persisted crew record id, used as `crew_db_{id}` identity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_crew_id: Option<i64>,
}

impl CrewConfig {
    /// Parse a raw submission value, tolerating agent/task map entries
    /// that arrive as JSON strings instead of objects.
    pub fn from_value(value: Value) -> Result<Self, CoreError> {
        let Value::Object(mut map) = value else {
            return Err(CoreError::invalid_config("crew config must be an object"));
        };

        let agents_raw = map
            .remove("agents")
            .or_else(|| map.remove("agents_yaml"))
            .ok_or_else(|| CoreError::invalid_config("missing agents configuration"))?;
        let tasks_raw = map
            .remove("tasks")
            .or_else(|| map.remove("tasks_yaml"))
            .ok_or_else(|| CoreError::invalid_config("missing tasks configuration"))?;

        let agents = lenient_map::<AgentConfig>(agents_raw, "agent")?;
        let tasks = lenient_map::<TaskConfig>(tasks_raw, "task")?;

        for (key, agent) in &agents {
            if agent.role.is_empty() {
                return Err(CoreError::invalid_config(format!(
                    "agent {key} is missing a role"
                )));
            }
        }
        for (key, task) in &tasks {
            if task.description.is_empty() {
                return Err(CoreError::invalid_config(format!(
                    "task {key} is missing a description"
                )));
            }
        }

        let rest = Value::Object(map);
        let get_str = |k: &str| rest.get(k).and_then(Value::as_str).map(str::to_string);
        let get_bool = |k: &str| rest.get(k).and_then(Value::as_bool).unwrap_or(false);

        let execution_type = match rest.get("execution_type").and_then(Value::as_str) {
            Some("flow") => ExecutionType::Flow,
            _ => ExecutionType::Crew,
        };

        Ok(Self {
            name: get_str("name"),
            agents,
            tasks,
            model: get_str("model"),
            planning: get_bool("planning"),
            reasoning: get_bool("reasoning"),
            execution_type,
            crew_id: get_str("crew_id"),
            database_crew_id: rest.get("database_crew_id").and_then(Value::as_i64),
        })
    }
}

/// Parse a map whose values may be objects or JSON strings.
fn lenient_map<T: serde::de::DeserializeOwned>(
    raw: Value,
    what: &str,
) -> Result<IndexMap<String, T>, CoreError> {
    let Value::Object(entries) = raw else {
        return Err(CoreError::invalid_config(format!(
            "{what} configuration must be a dictionary"
        )));
    };

    let mut out = IndexMap::with_capacity(entries.len());
    for (key, value) in entries {
        let value = match value {
            Value::String(s) => serde_json::from_str(&s).map_err(|_| {
                CoreError::invalid_config(format!(
                    "{what} configuration for {key} is not a valid JSON string"
                ))
            })?,
            other => other,
        };
        let parsed: T = serde_json::from_value(value).map_err(|e| {
            CoreError::invalid_config(format!("invalid {what} configuration for {key}: {e}"))
        })?;
        out.insert(key, parsed);
    }
    Ok(out)
}

/// Flow orchestration configuration: a DAG of crews/tasks with
/// event-driven transitions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct FlowConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub listeners: Vec<Value>,
    #[serde(default)]
    pub actions: Vec<Value>,
    #[serde(default, rename = "startingPoints")]
    pub starting_points: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "crewName")]
    pub crew_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "crewRef")]
    pub crew_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl FlowConfig {
    pub fn has_starting_points(&self) -> bool {
        !self.starting_points.is_empty()
    }
}

#[cfg(test)]
#[path = "crew_tests.rs"]
mod tests;

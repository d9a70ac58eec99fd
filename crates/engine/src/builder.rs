// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Crew builder: materializes a validated configuration into the
//! engine-neutral [`CrewPlan`].
//!
//! Tool references resolve through the group-scoped tool repository
//! (ids or names), per-agent overrides merge over the stored config,
//! and multi-tool adapters fan out into several concrete handles. LLM
//! bindings resolve through the LLM manager with the 0–100 temperature
//! scale divided down. Code execution is disabled by policy no matter
//! what the submitted config says.

use kasal_adapters::{
    AgentPlan, CrewPlan, FlowPlan, KnowledgeSource, LlmBinding, LlmManager, TaskPlan, ToolHandle,
};
use kasal_core::{AgentConfig, CoreError, CrewConfig, ExecutionType, FlowConfig, GroupId};
use kasal_storage::ToolRepository;
use serde_json::Value;

const DEFAULT_MODEL: &str = "gpt-4o";

/// Volume paths look like `/Volumes/catalog/schema/volume/path/to/file`.
const VOLUME_PREFIX: &str = "/Volumes/";

pub struct CrewBuilder<'a> {
    tools: &'a dyn ToolRepository,
    llm: &'a dyn LlmManager,
    group_ids: &'a [GroupId],
}

impl<'a> CrewBuilder<'a> {
    pub fn new(
        tools: &'a dyn ToolRepository,
        llm: &'a dyn LlmManager,
        group_ids: &'a [GroupId],
    ) -> Self {
        Self { tools, llm, group_ids }
    }

    /// Build the plan.
    ///
    /// `flow_override` is the request's in-flight flow config; it takes
    /// precedence over `persisted_flow` when both are present. A flow
    /// execution that ends up with zero starting points is a
    /// configuration error.
    pub async fn build(
        &self,
        config: &CrewConfig,
        crew_id: String,
        inputs: Value,
        flow_override: Option<&FlowConfig>,
        persisted_flow: Option<&FlowConfig>,
    ) -> Result<CrewPlan, CoreError> {
        let default_model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);

        let mut agents = Vec::with_capacity(config.agents.len());
        for (key, agent) in &config.agents {
            agents.push(self.build_agent(key, agent, default_model).await?);
        }

        let mut tasks = Vec::with_capacity(config.tasks.len());
        for (key, task) in &config.tasks {
            if let Some(agent_key) = &task.agent {
                if !config.agents.contains_key(agent_key) {
                    return Err(CoreError::invalid_config(format!(
                        "task {key} references unknown agent {agent_key}"
                    )));
                }
            }
            tasks.push(TaskPlan {
                key: key.clone(),
                name: task.identifier(),
                description: task.description.clone(),
                expected_output: task.expected_output.clone(),
                agent_key: task.agent.clone(),
                tools: self.resolve_tools(&task.tools, None).await?,
                async_execution: task.async_execution,
            });
        }

        let flow = match config.execution_type {
            ExecutionType::Crew => None,
            ExecutionType::Flow => {
                let chosen = match (flow_override, persisted_flow) {
                    (Some(over), _) => {
                        tracing::info!(flow = %over.name, "using request flow config over persisted record");
                        over
                    }
                    (None, Some(persisted)) => persisted,
                    (None, None) => {
                        return Err(CoreError::invalid_config(
                            "flow execution without a flow configuration",
                        ))
                    }
                };
                if !chosen.has_starting_points() {
                    return Err(CoreError::invalid_config(format!(
                        "flow {} has no starting points",
                        chosen.name
                    )));
                }
                Some(FlowPlan {
                    name: chosen.name.clone(),
                    starting_points: chosen.starting_points.clone(),
                    listeners: chosen.listeners.clone(),
                    actions: chosen.actions.clone(),
                })
            }
        };

        Ok(CrewPlan {
            crew_id,
            name: config.name.clone().unwrap_or_else(|| "unnamed_crew".to_string()),
            agents,
            tasks,
            flow,
            planning: config.planning,
            reasoning: config.reasoning,
            library_memory: true,
            inputs,
        })
    }

    async fn build_agent(
        &self,
        key: &str,
        agent: &AgentConfig,
        default_model: &str,
    ) -> Result<AgentPlan, CoreError> {
        let llm = self.resolve_llm(key, agent, default_model).await?;
        let tools = self.resolve_tools(&agent.tools, Some(agent)).await?;
        let knowledge_sources =
            agent.knowledge_sources.iter().map(parse_knowledge_source).collect();

        Ok(AgentPlan {
            key: key.to_string(),
            role: agent.role.clone(),
            goal: agent.goal.clone(),
            backstory: agent.backstory.clone(),
            llm,
            tools,
            knowledge_sources,
            allow_code_execution: false,
            max_iter: agent.max_iter,
        })
    }

    async fn resolve_llm(
        &self,
        key: &str,
        agent: &AgentConfig,
        default_model: &str,
    ) -> Result<LlmBinding, CoreError> {
        // Frontend temperature is 0–100.
        let temperature = agent.temperature.map(|t| t / 100.0);

        let binding = match &agent.llm {
            None => self.llm.configure(default_model, temperature).await,
            Some(Value::String(model)) => self.llm.configure(model, temperature).await,
            Some(Value::Object(map)) => {
                let model = map
                    .get("model")
                    .and_then(Value::as_str)
                    .unwrap_or(default_model);
                let configured = self.llm.configure(model, temperature).await;
                configured.map(|mut binding| {
                    if let Some(t) = map.get("temperature").and_then(Value::as_f64) {
                        binding.temperature = Some(t);
                    }
                    if let Some(base) = map.get("api_base").and_then(Value::as_str) {
                        binding.api_base = Some(base.to_string());
                    }
                    if let Some(max) = map.get("max_tokens").and_then(Value::as_u64) {
                        binding.max_tokens = Some(max as u32);
                    }
                    // Re-apply the family wrapper after the overlay.
                    binding.normalized()
                })
            }
            Some(other) => {
                return Err(CoreError::invalid_config(format!(
                    "agent {key} llm must be a model name or config object, got {other}"
                )))
            }
        };

        binding.map_err(|e| CoreError::invalid_config(format!("agent {key}: {e}")))
    }

    /// Resolve tool references into concrete handles. `agent` supplies
    /// per-agent config overrides keyed by tool name.
    async fn resolve_tools(
        &self,
        refs: &[String],
        agent: Option<&AgentConfig>,
    ) -> Result<Vec<ToolHandle>, CoreError> {
        let mut handles = Vec::with_capacity(refs.len());
        for reference in refs {
            let record = self
                .tools
                .resolve(self.group_ids, reference)
                .await
                .map_err(CoreError::from)?
                .ok_or_else(|| {
                    CoreError::invalid_config(format!("unresolvable tool {reference}"))
                })?;

            if !record.enabled {
                tracing::warn!(tool = %record.name, "skipping disabled tool");
                continue;
            }

            let mut config = match &record.config {
                Value::Object(map) => map.clone(),
                _ => serde_json::Map::new(),
            };
            if let Some(overrides) = agent.and_then(|a| a.tool_configs.get(&record.name)) {
                if let Value::Object(extra) = overrides {
                    for (k, v) in extra {
                        config.insert(k.clone(), v.clone());
                    }
                }
            }
            let config = Value::Object(config);

            // Multi-tool adapters (MCP) expose their concrete tools
            // under a `tools` array; each contributes its own handle.
            let fanout: Vec<ToolHandle> = config
                .get("tools")
                .and_then(Value::as_array)
                .map(|concrete| {
                    concrete
                        .iter()
                        .map(|entry| ToolHandle {
                            name: entry
                                .get("name")
                                .and_then(Value::as_str)
                                .unwrap_or(record.name.as_str())
                                .to_string(),
                            config: entry.get("config").cloned().unwrap_or(Value::Null),
                        })
                        .collect()
                })
                .unwrap_or_default();

            if fanout.is_empty() {
                handles.push(ToolHandle { name: record.name.clone(), config });
            } else {
                handles.extend(fanout);
            }
        }
        Ok(handles)
    }
}

/// Classify one knowledge source entry.
fn parse_knowledge_source(source: &Value) -> KnowledgeSource {
    let path = match source {
        Value::String(s) => s.as_str(),
        Value::Object(map) => {
            let declared_volume =
                map.get("type").and_then(Value::as_str) == Some("databricks_volume");
            let path = map
                .get("source_path")
                .or_else(|| map.get("path"))
                .and_then(Value::as_str)
                .unwrap_or_default();
            if declared_volume || path.starts_with(VOLUME_PREFIX) {
                return parse_volume_path(path);
            }
            return KnowledgeSource::Path { path: path.to_string() };
        }
        other => {
            tracing::warn!(source = %other, "unknown knowledge source format");
            return KnowledgeSource::Path { path: other.to_string() };
        }
    };

    if path.starts_with(VOLUME_PREFIX) {
        parse_volume_path(path)
    } else {
        KnowledgeSource::Path { path: path.to_string() }
    }
}

/// `/Volumes/catalog/schema/volume/rest...` → volume + file path. The
/// first three segments identify catalog.schema.volume; anything
/// shorter degrades to a plain path.
fn parse_volume_path(path: &str) -> KnowledgeSource {
    let Some(stripped) = path.strip_prefix(VOLUME_PREFIX) else {
        return KnowledgeSource::Path { path: path.to_string() };
    };
    let segments: Vec<&str> = stripped.split('/').filter(|s| !s.is_empty()).collect();
    if segments.len() < 4 {
        tracing::warn!(path, "invalid volume path format");
        return KnowledgeSource::Path { path: path.to_string() };
    }
    KnowledgeSource::DatabricksVolume {
        volume: segments[..3].join("."),
        file_path: segments[3..].join("/"),
    }
}

#[cfg(test)]
#[path = "builder_tests.rs"]
mod tests;

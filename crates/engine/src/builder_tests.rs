// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use kasal_adapters::StaticLlmManager;
use kasal_core::ErrorKind;
use kasal_storage::fake::InMemoryToolRepository;
use serde_json::json;

struct Fixture {
    tools: InMemoryToolRepository,
    llm: StaticLlmManager,
    groups: Vec<GroupId>,
}

impl Fixture {
    fn new() -> Self {
        Self {
            tools: InMemoryToolRepository::new(),
            llm: StaticLlmManager::new(),
            groups: vec![GroupId::new("acme")],
        }
    }

    fn builder(&self) -> CrewBuilder<'_> {
        CrewBuilder::new(&self.tools, &self.llm, &self.groups)
    }

    async fn build(&self, config: &CrewConfig) -> Result<CrewPlan, CoreError> {
        self.builder()
            .build(config, "acme_crew_ab12cd34".into(), json!({}), None, None)
            .await
    }
}

fn config(value: serde_json::Value) -> CrewConfig {
    CrewConfig::from_value(value).unwrap()
}

#[tokio::test]
async fn builds_minimal_crew_plan() {
    let f = Fixture::new();
    let plan = f
        .build(&config(json!({
            "name": "research crew",
            "agents": {"researcher": {"role": "Researcher", "goal": "find"}},
            "tasks": {"t1": {"description": "research the topic", "agent": "researcher"}},
            "model": "gpt-4o",
        })))
        .await
        .unwrap();

    assert_eq!(plan.crew_id, "acme_crew_ab12cd34");
    assert_eq!(plan.name, "research crew");
    assert_eq!(plan.agents.len(), 1);
    assert_eq!(plan.agents[0].llm.model, "gpt-4o");
    assert_eq!(plan.tasks.len(), 1);
    assert_eq!(plan.tasks[0].agent_key.as_deref(), Some("researcher"));
    assert!(plan.flow.is_none());
    assert!(plan.library_memory);
}

#[tokio::test]
async fn code_execution_disabled_by_policy() {
    let f = Fixture::new();
    let plan = f
        .build(&config(json!({
            "agents": {"hacker": {"role": "Hacker", "allow_code_execution": true}},
            "tasks": {"t1": {"description": "x"}},
        })))
        .await
        .unwrap();
    assert!(!plan.agents[0].allow_code_execution);
}

#[tokio::test]
async fn temperature_scales_from_percent() {
    let f = Fixture::new();
    let plan = f
        .build(&config(json!({
            "agents": {"a": {"role": "A", "temperature": 55}},
            "tasks": {"t1": {"description": "x"}},
        })))
        .await
        .unwrap();
    assert_eq!(plan.agents[0].llm.temperature, Some(0.55));
}

#[tokio::test]
async fn llm_as_name_and_as_object() {
    let f = Fixture::new();
    let plan = f
        .build(&config(json!({
            "agents": {
                "named": {"role": "A", "llm": "databricks/claude"},
                "dict": {"role": "B", "llm": {"model": "gpt-4o", "api_base": "http://proxy", "max_tokens": 2048}},
            },
            "tasks": {"t1": {"description": "x"}},
        })))
        .await
        .unwrap();

    let named = plan.agents.iter().find(|a| a.key == "named").unwrap();
    assert_eq!(named.llm.model, "databricks/claude");

    let dict = plan.agents.iter().find(|a| a.key == "dict").unwrap();
    assert_eq!(dict.llm.api_base.as_deref(), Some("http://proxy"));
    assert_eq!(dict.llm.max_tokens, Some(2048));
}

#[tokio::test]
async fn gpt5_dict_overlay_keeps_wrapper() {
    let f = Fixture::new();
    let plan = f
        .build(&config(json!({
            "agents": {"a": {"role": "A", "llm": {"model": "gpt-5-mini", "max_tokens": 1024}}},
            "tasks": {"t1": {"description": "x"}},
        })))
        .await
        .unwrap();
    let llm = &plan.agents[0].llm;
    assert_eq!(llm.max_tokens, None);
    assert_eq!(llm.max_completion_tokens, Some(1024));
    assert_eq!(llm.temperature, Some(1.0));
}

#[tokio::test]
async fn invalid_llm_shape_rejected() {
    let f = Fixture::new();
    let err = f
        .build(&config(json!({
            "agents": {"a": {"role": "A", "llm": 42}},
            "tasks": {"t1": {"description": "x"}},
        })))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidConfig);
}

#[tokio::test]
async fn tools_resolve_by_id_and_name_with_override_merge() {
    let f = Fixture::new();
    let id = f
        .tools
        .upsert(&"acme".into(), "search", true, json!({"depth": 1, "lang": "en"}))
        .await
        .unwrap();

    let plan = f
        .build(&config(json!({
            "agents": {"a": {
                "role": "A",
                "tools": [id.to_string()],
                "tool_configs": {"search": {"depth": 5}},
            }},
            "tasks": {"t1": {"description": "x", "tools": ["search"]}},
        })))
        .await
        .unwrap();

    let handle = &plan.agents[0].tools[0];
    assert_eq!(handle.name, "search");
    // Override wins, untouched keys survive.
    assert_eq!(handle.config["depth"], 5);
    assert_eq!(handle.config["lang"], "en");

    // Task tools resolve without agent overrides.
    assert_eq!(plan.tasks[0].tools[0].config["depth"], 1);
}

#[tokio::test]
async fn unresolvable_tool_is_invalid_config() {
    let f = Fixture::new();
    let err = f
        .build(&config(json!({
            "agents": {"a": {"role": "A", "tools": ["missing"]}},
            "tasks": {"t1": {"description": "x"}},
        })))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidConfig);
    assert!(err.message().contains("missing"));
}

#[tokio::test]
async fn disabled_tool_is_skipped() {
    let f = Fixture::new();
    f.tools.upsert(&"acme".into(), "legacy", false, json!({})).await.unwrap();
    let plan = f
        .build(&config(json!({
            "agents": {"a": {"role": "A", "tools": ["legacy"]}},
            "tasks": {"t1": {"description": "x"}},
        })))
        .await
        .unwrap();
    assert!(plan.agents[0].tools.is_empty());
}

#[tokio::test]
async fn mcp_adapter_fans_out_concrete_tools() {
    let f = Fixture::new();
    f.tools
        .upsert(
            &"acme".into(),
            "mcp-suite",
            true,
            json!({"tools": [
                {"name": "mcp_read", "config": {"root": "/data"}},
                {"name": "mcp_write"},
            ]}),
        )
        .await
        .unwrap();

    let plan = f
        .build(&config(json!({
            "agents": {"a": {"role": "A", "tools": ["mcp-suite"]}},
            "tasks": {"t1": {"description": "x"}},
        })))
        .await
        .unwrap();

    let names: Vec<_> = plan.agents[0].tools.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, ["mcp_read", "mcp_write"]);
    assert_eq!(plan.agents[0].tools[0].config["root"], "/data");
}

#[tokio::test]
async fn cross_group_tool_is_unresolvable() {
    let f = Fixture::new();
    f.tools.upsert(&"globex".into(), "secret", true, json!({})).await.unwrap();
    let err = f
        .build(&config(json!({
            "agents": {"a": {"role": "A", "tools": ["secret"]}},
            "tasks": {"t1": {"description": "x"}},
        })))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidConfig);
}

#[test]
fn knowledge_source_volume_parsing() {
    let source = parse_knowledge_source(&json!(
        "/Volumes/main/research/docs/papers/attention.pdf"
    ));
    match source {
        KnowledgeSource::DatabricksVolume { volume, file_path } => {
            assert_eq!(volume, "main.research.docs");
            assert_eq!(file_path, "papers/attention.pdf");
        }
        other => panic!("expected volume source, got {other:?}"),
    }

    // Too few segments degrades to a plain path.
    let source = parse_knowledge_source(&json!("/Volumes/main/research"));
    assert!(matches!(source, KnowledgeSource::Path { .. }));

    let source = parse_knowledge_source(&json!("./local/notes.md"));
    match source {
        KnowledgeSource::Path { path } => assert_eq!(path, "./local/notes.md"),
        other => panic!("expected path source, got {other:?}"),
    }

    let source = parse_knowledge_source(&json!({
        "type": "databricks_volume",
        "source_path": "/Volumes/main/research/docs/readme.md",
    }));
    assert!(matches!(source, KnowledgeSource::DatabricksVolume { .. }));
}

#[tokio::test]
async fn flow_override_takes_precedence() {
    let f = Fixture::new();
    let mut flow_config = config(json!({
        "agents": {"a": {"role": "A"}},
        "tasks": {"t1": {"description": "x"}},
        "execution_type": "flow",
    }));
    flow_config.execution_type = ExecutionType::Flow;

    let persisted: FlowConfig = serde_json::from_value(json!({
        "name": "persisted",
        "startingPoints": [{"id": "old"}],
    }))
    .unwrap();
    let override_flow: FlowConfig = serde_json::from_value(json!({
        "name": "edited",
        "startingPoints": [{"id": "new"}],
    }))
    .unwrap();

    let plan = f
        .builder()
        .build(
            &flow_config,
            "crew".into(),
            json!({}),
            Some(&override_flow),
            Some(&persisted),
        )
        .await
        .unwrap();
    let flow = plan.flow.unwrap();
    assert_eq!(flow.name, "edited");
    assert_eq!(flow.starting_points[0]["id"], "new");
}

#[tokio::test]
async fn flow_without_starting_points_rejected() {
    let f = Fixture::new();
    let flow_config = config(json!({
        "agents": {"a": {"role": "A"}},
        "tasks": {"t1": {"description": "x"}},
        "execution_type": "flow",
    }));
    let empty_flow: FlowConfig =
        serde_json::from_value(json!({"name": "empty"})).unwrap();

    let err = f
        .builder()
        .build(&flow_config, "crew".into(), json!({}), Some(&empty_flow), None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidConfig);
    assert!(err.message().contains("starting points"));
}

#[tokio::test]
async fn flow_execution_without_any_flow_rejected() {
    let f = Fixture::new();
    let flow_config = config(json!({
        "agents": {"a": {"role": "A"}},
        "tasks": {"t1": {"description": "x"}},
        "execution_type": "flow",
    }));
    let err = f
        .builder()
        .build(&flow_config, "crew".into(), json!({}), None, None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidConfig);
}

#[tokio::test]
async fn task_referencing_unknown_agent_rejected() {
    let f = Fixture::new();
    let err = f
        .build(&config(json!({
            "agents": {"a": {"role": "A"}},
            "tasks": {"t1": {"description": "x", "agent": "ghost"}},
        })))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidConfig);
}

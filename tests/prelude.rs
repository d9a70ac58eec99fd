// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixture for the scenario specs.

use async_trait::async_trait;
use kasal_adapters::{launcher::LocalWorker, FakeCrewEngine, LocalLauncher, StaticLlmManager};
use kasal_core::{
    CoreSettings, CrewConfig, ExecutionJob, ExecutionStatus, GroupContext, GroupId, GroupRole,
    SystemClock,
};
use kasal_engine::worker::{run_local, WorkerDeps};
use kasal_engine::{ExecutionService, Repositories};
use kasal_storage::{
    Db, SqlEngineConfigRepository, SqlExecutionRepository, SqlLogRepository, SqlToolRepository,
    SqlTraceRepository, SqlUserGroupRepository, TraceRepository, UserGroupRepository,
};
use kasal_wire::{Frame, WorkerInit, WorkerResult};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Runs the real worker runtime in-process against the fake engine.
pub struct EngineWorker {
    deps: WorkerDeps<FakeCrewEngine>,
}

#[async_trait]
impl LocalWorker for EngineWorker {
    async fn run(
        &self,
        init: WorkerInit,
        frames: mpsc::Sender<Frame>,
        cancel: CancellationToken,
    ) -> WorkerResult {
        run_local(&self.deps, init, frames, cancel).await
    }
}

pub type SpecService = Arc<ExecutionService<LocalLauncher<EngineWorker>, SystemClock>>;

pub struct World {
    pub service: SpecService,
    pub executions: SqlExecutionRepository,
    pub traces: SqlTraceRepository,
    pub users: SqlUserGroupRepository,
}

/// Build a full stack over an in-memory database.
pub async fn world_with(engine: FakeCrewEngine, settings: CoreSettings) -> World {
    let db = Db::in_memory().await.expect("in-memory database");
    let executions = SqlExecutionRepository::new(db.clone());
    let traces = SqlTraceRepository::new(db.clone());
    let users = SqlUserGroupRepository::new(db.clone());

    let repos = Repositories {
        executions: Arc::new(executions.clone()),
        traces: Arc::new(traces.clone()),
        logs: Arc::new(SqlLogRepository::new(db.clone())),
        engine_config: Arc::new(SqlEngineConfigRepository::new(db.clone())),
        tools: Arc::new(SqlToolRepository::new(db.clone())),
        users: Arc::new(users.clone()),
    };

    let launcher = Arc::new(LocalLauncher::new(Arc::new(EngineWorker {
        deps: WorkerDeps { engine: Arc::new(engine), vector_client: None },
    })));
    let service = ExecutionService::new(
        settings,
        repos,
        launcher,
        Arc::new(StaticLlmManager::new()),
        SystemClock,
    );

    World { service, executions, traces, users }
}

pub async fn world() -> World {
    world_with(FakeCrewEngine::new(), spec_settings()).await
}

pub fn spec_settings() -> CoreSettings {
    CoreSettings {
        trace_poll_ms: 10,
        termination_grace_secs: 2,
        memory_dir: std::env::temp_dir().join("kasal-specs-memory"),
        log_dir: std::env::temp_dir().join("kasal-specs-logs"),
        ..Default::default()
    }
}

impl World {
    /// Seed a membership and resolve the member's context.
    pub async fn member(&self, email: &str, group: &str, role: GroupRole) -> GroupContext {
        self.users
            .add_membership(&GroupId::new(group), group, email, role)
            .await
            .expect("seed membership");
        self.service
            .resolve_context(email, None, None)
            .await
            .expect("resolve context")
    }

    pub async fn wait_status(
        &self,
        ctx: &GroupContext,
        job_id: &str,
        status: ExecutionStatus,
    ) -> kasal_core::Execution {
        for _ in 0..600 {
            if let Ok(row) = self.service.get(ctx, &job_id.into()).await {
                if row.status == status {
                    return row;
                }
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("execution {job_id} never reached {status}");
    }

    pub async fn traces_for(&self, ctx: &GroupContext, job_id: &str) -> Vec<kasal_core::TraceEvent> {
        self.traces
            .list(ctx.group_ids(), &job_id.into(), 1000, 0)
            .await
            .expect("list traces")
            .into_iter()
            .map(|row| row.event)
            .collect()
    }

    pub async fn wait_traces(&self, ctx: &GroupContext, job_id: &str, min: usize) {
        for _ in 0..600 {
            if self.traces_for(ctx, job_id).await.len() >= min {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

/// A one-agent, one-task research crew submission.
pub fn research_job(job_id: &str) -> ExecutionJob {
    let config = CrewConfig::from_value(serde_json::json!({
        "name": "research crew",
        "agents": {"researcher": {"role": "Researcher", "goal": "find things"}},
        "tasks": {"t1": {"description": "research the topic", "agent": "researcher"}},
        "model": "gpt-4o",
    }))
    .expect("valid crew config");
    ExecutionJob::new(job_id, config)
        .inputs(serde_json::json!({"topic": "ai"}))
        .timeout(Duration::from_secs(60))
        .build()
}

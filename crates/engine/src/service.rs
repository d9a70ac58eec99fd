// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Execution service: the façade the API layer calls.
//!
//! `start` turns a validated submission into a pending row and a
//! spawned worker, then returns; a driver task owns the job until its
//! terminal transition. `stop` coordinates in-flight termination with
//! partial-result preservation. The two background writers are started
//! lazily under a mutex the first time a job is kicked off.

use crate::broadcast::Broadcaster;
use crate::builder::CrewBuilder;
use crate::log_writer::LogWriter;
use crate::pool::{PoolMetrics, PoolOutcome, ProcessPool};
use crate::queues::{self, LogQueue, TraceQueue};
use crate::status::{ExecutionStatusService, TerminalOutcome};
use crate::trace_writer::TraceWriter;
use kasal_adapters::{LlmManager, WorkerLauncher};
use kasal_core::{
    crew_identity, Clock, CoreError, CoreSettings, Execution, ExecutionJob, ExecutionStatus,
    GroupContext, GroupId, JobId, LogLine, TraceEvent,
};
use kasal_storage::{
    EngineConfigRepository, ExecutionFilter, ExecutionRepository, LogRepository, ToolRepository,
    TraceRepository, UserGroupRepository,
};
use kasal_wire::WorkerInit;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Everything the service persists through.
#[derive(Clone)]
pub struct Repositories {
    pub executions: Arc<dyn ExecutionRepository>,
    pub traces: Arc<dyn TraceRepository>,
    pub logs: Arc<dyn LogRepository>,
    pub engine_config: Arc<dyn EngineConfigRepository>,
    pub tools: Arc<dyn ToolRepository>,
    pub users: Arc<dyn UserGroupRepository>,
}

/// Stop operation flavor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StopType {
    Graceful,
    Force,
}

fn default_preserve() -> bool {
    true
}

/// API stop request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StopRequest {
    pub stop_type: StopType,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default = "default_preserve")]
    pub preserve_partial_results: bool,
}

/// API stop response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StopResponse {
    pub execution_id: JobId,
    pub status: ExecutionStatus,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partial_results: Option<serde_json::Value>,
}

struct WriterHandles {
    trace: tokio::task::JoinHandle<()>,
    log: tokio::task::JoinHandle<()>,
}

pub struct ExecutionService<L: WorkerLauncher, C: Clock + 'static> {
    settings: CoreSettings,
    repos: Repositories,
    status: Arc<ExecutionStatusService<C>>,
    pool: Arc<ProcessPool<L>>,
    broadcaster: Arc<Broadcaster>,
    llm: Arc<dyn LlmManager>,
    clock: C,
    trace_queue: TraceQueue,
    log_queue: LogQueue,
    /// Receivers parked here until the writers start.
    pending_receivers: Mutex<Option<(mpsc::Receiver<TraceEvent>, mpsc::Receiver<LogLine>)>>,
    writers: Mutex<Option<WriterHandles>>,
    shutdown: CancellationToken,
}

impl<L: WorkerLauncher, C: Clock + 'static> ExecutionService<L, C> {
    pub fn new(
        settings: CoreSettings,
        repos: Repositories,
        launcher: Arc<L>,
        llm: Arc<dyn LlmManager>,
        clock: C,
    ) -> Arc<Self> {
        let broadcaster = Arc::new(Broadcaster::new());
        let (trace_queue, trace_rx) = queues::trace_queue(settings.trace_queue_capacity);
        let (log_queue, log_rx) = queues::log_queue(settings.log_queue_capacity);
        let pool = Arc::new(ProcessPool::new(
            launcher,
            settings.max_concurrent,
            settings.termination_grace(),
            trace_queue.clone(),
            log_queue.clone(),
        ));
        let status = Arc::new(ExecutionStatusService::new(
            repos.executions.clone(),
            broadcaster.clone(),
            clock.clone(),
        ));

        Arc::new(Self {
            settings,
            repos,
            status,
            pool,
            broadcaster,
            llm,
            clock,
            trace_queue,
            log_queue,
            pending_receivers: Mutex::new(Some((trace_rx, log_rx))),
            writers: Mutex::new(None),
            shutdown: CancellationToken::new(),
        })
    }

    pub fn broadcaster(&self) -> Arc<Broadcaster> {
        self.broadcaster.clone()
    }

    pub fn trace_queue(&self) -> TraceQueue {
        self.trace_queue.clone()
    }

    pub fn log_queue(&self) -> LogQueue {
        self.log_queue.clone()
    }

    pub fn metrics(&self) -> PoolMetrics {
        self.pool.metrics()
    }

    /// Resolve a request's tenant identity per the group rules:
    /// auto-create the user, fetch memberships, validate any explicit
    /// group selector.
    pub async fn resolve_context(
        &self,
        email: &str,
        requested_group: Option<&GroupId>,
        access_token: Option<&str>,
    ) -> Result<GroupContext, CoreError> {
        let user = self
            .repos
            .users
            .get_or_create_user(email)
            .await
            .map_err(CoreError::from)?;
        let memberships = self
            .repos
            .users
            .memberships(email)
            .await
            .map_err(CoreError::from)?;
        let mut ctx = GroupContext::resolve(email, &memberships, requested_group)?
            .with_user_id(user.id.to_string());
        if let Some(token) = access_token {
            ctx = ctx.with_access_token(token);
        }
        Ok(ctx)
    }

    /// Start the two singleton writers if they are not running yet.
    fn ensure_writers_started(self: &Arc<Self>) {
        let mut writers = self.writers.lock();
        if writers.is_some() {
            return;
        }
        let Some((trace_rx, log_rx)) = self.pending_receivers.lock().take() else {
            return;
        };

        tracing::info!("starting trace and log writers");
        let trace = TraceWriter::new(
            self.repos.executions.clone(),
            self.repos.traces.clone(),
            self.repos.engine_config.clone(),
            self.broadcaster.clone(),
            &self.settings,
            self.clock.clone(),
        )
        .spawn(trace_rx, self.shutdown.clone());
        let log = LogWriter::new(
            self.repos.logs.clone(),
            self.broadcaster.clone(),
            self.settings.trace_poll_interval(),
        )
        .spawn(log_rx, self.shutdown.clone());

        *writers = Some(WriterHandles { trace, log });
    }

    /// Submit a job. Returns once the pending row exists and the worker
    /// slot is reserved; a driver task carries the job to its terminal
    /// state.
    pub async fn start(
        self: &Arc<Self>,
        job: ExecutionJob,
        ctx: GroupContext,
    ) -> Result<JobId, CoreError> {
        self.ensure_writers_started();

        let job_id = job.job_id.clone();
        let group_id = ctx.primary_group_id().clone();

        // Capacity gate before any row exists: over-cap submissions
        // fail fast and leave nothing behind.
        self.pool.reserve(&job_id)?;

        if let Err(e) = self.status.create(&job, &ctx).await {
            self.pool.release(&job_id);
            return Err(e);
        }

        let init = match self.prepare_init(&job, &ctx).await {
            Ok(init) => init,
            Err(e) => {
                self.pool.release(&job_id);
                let _ = self
                    .status
                    .mark_terminal(
                        &group_id,
                        &job_id,
                        TerminalOutcome::Failed { error: e.to_string(), partial: None },
                    )
                    .await;
                return Err(e);
            }
        };

        let timeout = job.timeout.unwrap_or_else(|| self.settings.default_timeout());
        let service = self.clone();
        let driver_job = job_id.clone();
        tokio::spawn(async move {
            service.drive(init, group_id, driver_job, timeout).await;
        });

        Ok(job_id)
    }

    /// Build the worker init payload: plan, memory config, forwarded
    /// env.
    async fn prepare_init(
        &self,
        job: &ExecutionJob,
        ctx: &GroupContext,
    ) -> Result<WorkerInit, CoreError> {
        let crew_id =
            crew_identity(&job.config, ctx.primary_group_id(), job.run_name.as_deref());

        let builder = CrewBuilder::new(&*self.repos.tools, &*self.llm, ctx.group_ids());
        let plan = builder
            .build(&job.config, crew_id.clone(), job.inputs.clone(), job.flow.as_ref(), None)
            .await?;

        let memory = self
            .repos
            .engine_config
            .memory_backend(ctx.group_ids())
            .await
            .map_err(CoreError::from)?;

        let debug_tracing = match job.debug_tracing {
            Some(flag) => flag,
            None => self
                .repos
                .engine_config
                .debug_tracing()
                .await
                .ok()
                .flatten()
                .unwrap_or(self.settings.debug_tracing),
        };

        // Forward only the key material the plan's bindings name.
        let mut env = Vec::new();
        for agent in &plan.agents {
            if let Some(key_env) = &agent.llm.api_key_env {
                if let Ok(value) = std::env::var(key_env) {
                    env.push((key_env.clone(), value));
                }
            }
        }
        env.sort();
        env.dedup();

        Ok(WorkerInit {
            job_id: job.job_id.clone(),
            group: ctx.to_worker(),
            config: serde_json::to_value(&plan)
                .map_err(|e| CoreError::internal(format!("plan serialization: {e}")))?,
            flow: None,
            memory: memory
                .map(|m| serde_json::to_value(&m))
                .transpose()
                .map_err(|e| CoreError::internal(format!("memory serialization: {e}")))?,
            inputs: job.inputs.clone(),
            debug_tracing,
            env,
            log_file: self.settings.log_dir.join(format!("{crew_id}.log")),
            memory_dir: self.settings.memory_dir.clone(),
        })
    }

    /// Own the job from spawn to terminal state.
    async fn drive(
        self: Arc<Self>,
        init: WorkerInit,
        group_id: GroupId,
        job_id: JobId,
        timeout: std::time::Duration,
    ) {
        if let Err(e) = self.pool.start(init).await {
            tracing::error!(%job_id, error = %e, "worker spawn failed");
            let _ = self
                .status
                .mark_terminal(
                    &group_id,
                    &job_id,
                    TerminalOutcome::Failed { error: e.to_string(), partial: None },
                )
                .await;
            return;
        }

        if let Err(e) = self.status.mark_running(&group_id, &job_id).await {
            tracing::error!(%job_id, error = %e, "mark_running failed");
        }

        let outcome = match self.pool.wait(&job_id, timeout).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(%job_id, error = %e, "pool wait failed");
                PoolOutcome::Died
            }
        };

        let stopping = self
            .status
            .get(std::slice::from_ref(&group_id), &job_id)
            .await
            .map(|row| row.status == ExecutionStatus::Stopping || row.is_stopping)
            .unwrap_or(false);

        let terminal = match outcome {
            PoolOutcome::Result(result) if result.success => TerminalOutcome::Completed {
                result: result.result.unwrap_or(serde_json::Value::Null),
            },
            PoolOutcome::Result(result) => {
                if stopping {
                    TerminalOutcome::Stopped { reason: None, partial: result.partial, error: None }
                } else {
                    TerminalOutcome::Failed {
                        error: result
                            .error
                            .unwrap_or_else(|| "worker reported failure".to_string()),
                        partial: result.partial,
                    }
                }
            }
            PoolOutcome::TimedOut => {
                TerminalOutcome::Failed { error: "timeout".to_string(), partial: None }
            }
            PoolOutcome::Died => {
                if stopping {
                    TerminalOutcome::Stopped { reason: None, partial: None, error: None }
                } else {
                    TerminalOutcome::Failed {
                        error: "worker exited without posting a result".to_string(),
                        partial: None,
                    }
                }
            }
        };

        match self.status.mark_terminal(&group_id, &job_id, terminal).await {
            Ok(true) => {}
            Ok(false) => tracing::debug!(%job_id, "terminal state already recorded"),
            Err(e) => tracing::error!(%job_id, error = %e, "terminal transition failed"),
        }

        self.broadcaster.remove_job(&job_id);
    }

    /// Stop an in-flight execution.
    pub async fn stop(
        &self,
        ctx: &GroupContext,
        job_id: &JobId,
        request: StopRequest,
    ) -> Result<StopResponse, CoreError> {
        let execution = self.status.get(ctx.group_ids(), job_id).await?;

        if execution.is_terminal() {
            return Ok(StopResponse {
                execution_id: job_id.clone(),
                status: execution.status,
                message: "execution already finished".to_string(),
                partial_results: request
                    .preserve_partial_results
                    .then(|| execution.partial_results.clone())
                    .flatten(),
            });
        }

        let group_id = execution.group_id.clone();
        let execution = self
            .status
            .request_stop(&group_id, job_id, request.reason.as_deref())
            .await?;

        let force = request.stop_type == StopType::Force;
        let terminated = self.pool.terminate(job_id, force).await;
        if !terminated {
            if execution.status.is_running() {
                // Row says running but this node has no worker for it.
                return Err(CoreError::not_found(format!(
                    "no live worker for execution {job_id} on this node"
                )));
            }
        } else if force {
            // Give the kill a moment to land before declaring it failed.
            let mut alive = self.pool.worker_alive(job_id);
            for _ in 0..10 {
                if !alive {
                    break;
                }
                tokio::time::sleep(std::time::Duration::from_millis(50)).await;
                alive = self.pool.worker_alive(job_id);
            }
            if alive {
                // The kill did not take; record the stop anyway and
                // leave the leaked worker to orphan cleanup.
                tracing::error!(%job_id, "force stop failed, worker leaked");
                let _ = self
                    .status
                    .mark_terminal(
                        &group_id,
                        job_id,
                        TerminalOutcome::Stopped {
                            reason: None,
                            partial: None,
                            error: Some("force_stop_failed".to_string()),
                        },
                    )
                    .await;
            }
        }

        let current = self.status.get(ctx.group_ids(), job_id).await?;
        Ok(StopResponse {
            execution_id: job_id.clone(),
            status: current.status,
            message: "execution stop requested".to_string(),
            partial_results: request
                .preserve_partial_results
                .then(|| current.partial_results.clone())
                .flatten(),
        })
    }

    pub async fn get(&self, ctx: &GroupContext, job_id: &JobId) -> Result<Execution, CoreError> {
        self.status.get(ctx.group_ids(), job_id).await
    }

    pub async fn list(
        &self,
        ctx: &GroupContext,
        filter: &ExecutionFilter,
    ) -> Result<Vec<Execution>, CoreError> {
        self.status.list(ctx.group_ids(), filter).await
    }

    /// Admin delete: the execution row plus its traces and logs.
    pub async fn delete(&self, ctx: &GroupContext, job_id: &JobId) -> Result<(), CoreError> {
        let execution = self.status.get(ctx.group_ids(), job_id).await?;
        if execution.status.is_running() {
            self.pool.terminate(job_id, true).await;
        }
        let groups = ctx.group_ids();
        self.repos.traces.delete_for_job(groups, job_id).await.map_err(CoreError::from)?;
        self.repos.logs.delete_for_job(groups, job_id).await.map_err(CoreError::from)?;
        self.repos.executions.delete(groups, job_id).await.map_err(CoreError::from)?;
        self.broadcaster.remove_job(job_id);
        Ok(())
    }

    /// Drain the writers and kill every live worker.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let handles = self.writers.lock().take();
        if let Some(handles) = handles {
            let _ = handles.trace.await;
            let _ = handles.log.await;
        }
        self.pool.shutdown().await;
    }
}

#[cfg(test)]
#[path = "service_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Execution status store.
//!
//! Single-writer discipline: this service is the only component that
//! transitions an Execution row. Transitions are serialized per job by
//! a keyed async mutex, and guarded again at the row level by the
//! repository's compare-and-set, so a racing writer on another node
//! still loses cleanly. Terminal transitions broadcast the
//! `execution_complete` frame.

use crate::broadcast::{frames, Broadcaster};
use kasal_core::{
    Clock, CoreError, Execution, ExecutionJob, ExecutionStatus, GroupContext, GroupId, JobId,
    SystemClock,
};
use kasal_storage::{ExecutionFilter, ExecutionRepository, TransitionUpdate};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Outcome payload for a terminal transition.
#[derive(Debug, Clone)]
pub enum TerminalOutcome {
    Completed { result: serde_json::Value },
    Failed { error: String, partial: Option<serde_json::Value> },
    Stopped {
        reason: Option<String>,
        partial: Option<serde_json::Value>,
        /// Set when termination itself failed (e.g. `force_stop_failed`)
        /// and the worker is treated as leaked.
        error: Option<String>,
    },
}

impl TerminalOutcome {
    fn status(&self) -> ExecutionStatus {
        match self {
            TerminalOutcome::Completed { .. } => ExecutionStatus::Completed,
            TerminalOutcome::Failed { .. } => ExecutionStatus::Failed,
            TerminalOutcome::Stopped { .. } => ExecutionStatus::Stopped,
        }
    }
}

pub struct ExecutionStatusService<C: Clock = SystemClock> {
    executions: Arc<dyn ExecutionRepository>,
    broadcaster: Arc<Broadcaster>,
    clock: C,
    /// Per-job transition locks. Entries are removed on terminal
    /// transitions to keep the map bounded.
    locks: Mutex<HashMap<JobId, Arc<tokio::sync::Mutex<()>>>>,
}

impl<C: Clock> ExecutionStatusService<C> {
    pub fn new(
        executions: Arc<dyn ExecutionRepository>,
        broadcaster: Arc<Broadcaster>,
        clock: C,
    ) -> Self {
        Self { executions, broadcaster, clock, locks: Mutex::new(HashMap::new()) }
    }

    fn job_lock(&self, job_id: &JobId) -> Arc<tokio::sync::Mutex<()>> {
        self.locks.lock().entry(job_id.clone()).or_default().clone()
    }

    fn drop_job_lock(&self, job_id: &JobId) {
        self.locks.lock().remove(job_id);
    }

    /// Insert the `pending` row for a submission.
    pub async fn create(
        &self,
        job: &ExecutionJob,
        ctx: &GroupContext,
    ) -> Result<Execution, CoreError> {
        let execution = Execution::pending(job, ctx, &self.clock);
        self.executions.insert(&execution).await.map_err(|e| {
            if e.is_duplicate() {
                CoreError::already_exists(format!(
                    "execution {} already exists in group {}",
                    job.job_id,
                    ctx.primary_group_id()
                ))
            } else {
                CoreError::from(e)
            }
        })?;
        Ok(execution)
    }

    /// `pending → running`. Idempotent: a second call (or a call after
    /// the job already finished) is a no-op.
    pub async fn mark_running(&self, group_id: &GroupId, job_id: &JobId) -> Result<(), CoreError> {
        let lock = self.job_lock(job_id);
        let _guard = lock.lock().await;

        let mut update =
            TransitionUpdate::new(vec![ExecutionStatus::Pending], ExecutionStatus::Running);
        update.started_at = Some(self.clock.timestamp_utc());
        let won = self.executions.apply_transition(group_id, job_id, &update).await?;
        if !won {
            // Already past pending; make sure the row actually exists.
            self.require(group_id, job_id).await?;
        }
        Ok(())
    }

    /// `{running, stopping} → terminal` (`pending` may also fail
    /// directly when the worker never started). First writer wins;
    /// losers get `Ok(false)`.
    pub async fn mark_terminal(
        &self,
        group_id: &GroupId,
        job_id: &JobId,
        outcome: TerminalOutcome,
    ) -> Result<bool, CoreError> {
        let lock = self.job_lock(job_id);
        let won = {
            let _guard = lock.lock().await;

            let status = outcome.status();
            let from = match status {
                // A submission can fail before it ever ran.
                ExecutionStatus::Failed => vec![
                    ExecutionStatus::Pending,
                    ExecutionStatus::Running,
                    ExecutionStatus::Stopping,
                ],
                _ => vec![ExecutionStatus::Running, ExecutionStatus::Stopping],
            };
            let mut update = TransitionUpdate::new(from, status);
            update.completed_at = Some(self.clock.timestamp_utc());
            update.is_stopping = Some(false);
            match outcome {
                TerminalOutcome::Completed { result } => update.result = Some(result),
                TerminalOutcome::Failed { error, partial } => {
                    update.error = Some(error);
                    update.partial_results = partial;
                }
                TerminalOutcome::Stopped { reason, partial, error } => {
                    update.stop_reason = reason;
                    update.partial_results = partial;
                    update.error = error;
                }
            }

            let won = self.executions.apply_transition(group_id, job_id, &update).await?;
            if !won {
                let existing = self.require(group_id, job_id).await?;
                if !existing.is_terminal() {
                    return Err(CoreError::invalid_transition(format!(
                        "execution {job_id} is {} and cannot become {status}",
                        existing.status
                    )));
                }
            }
            won
        };

        if won {
            let row = self.require(group_id, job_id).await?;
            self.broadcaster
                .broadcast(job_id, frames::terminal(job_id, row.status, row.error.as_deref()))
                .await;
            self.drop_job_lock(job_id);
        }
        Ok(won)
    }

    /// `running → stopping`, recording the reason. Idempotent.
    pub async fn request_stop(
        &self,
        group_id: &GroupId,
        job_id: &JobId,
        reason: Option<&str>,
    ) -> Result<Execution, CoreError> {
        let lock = self.job_lock(job_id);
        let _guard = lock.lock().await;

        let mut update =
            TransitionUpdate::new(vec![ExecutionStatus::Running], ExecutionStatus::Stopping);
        update.is_stopping = Some(true);
        update.stop_reason = reason.map(str::to_string);
        self.executions.apply_transition(group_id, job_id, &update).await?;
        // Idempotent: already-stopping and already-terminal rows pass
        // through unchanged; the caller inspects the returned status.
        self.require(group_id, job_id).await
    }

    /// Fetch within the caller's groups; `NotFound` otherwise.
    pub async fn get(&self, group_ids: &[GroupId], job_id: &JobId) -> Result<Execution, CoreError> {
        self.executions
            .get(group_ids, job_id)
            .await
            .map_err(CoreError::from)?
            .ok_or_else(|| CoreError::not_found(format!("execution {job_id}")))
    }

    pub async fn list(
        &self,
        group_ids: &[GroupId],
        filter: &ExecutionFilter,
    ) -> Result<Vec<Execution>, CoreError> {
        self.executions.list(group_ids, filter).await.map_err(CoreError::from)
    }

    async fn require(&self, group_id: &GroupId, job_id: &JobId) -> Result<Execution, CoreError> {
        self.get(std::slice::from_ref(group_id), job_id).await
    }
}

#[cfg(test)]
#[path = "status_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The authoritative record of one job, and the submission config that
//! creates it.

use crate::clock::Clock;
use crate::crew::{CrewConfig, ExecutionType, FlowConfig};
use crate::group::GroupContext;
use crate::id::{GroupId, JobId};
use crate::status::ExecutionStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Validated submission handed to the execution service by the API
/// layer. The group context travels separately.
#[derive(Debug, Clone)]
pub struct ExecutionJob {
    /// Caller-supplied external key; generated when absent.
    pub job_id: JobId,
    pub config: CrewConfig,
    /// In-flight flow edits from the request; takes precedence over the
    /// persisted flow record when present.
    pub flow: Option<FlowConfig>,
    pub inputs: serde_json::Value,
    pub run_name: Option<String>,
    pub timeout: Option<Duration>,
    /// Per-run override of the engine's debug-tracing flag.
    pub debug_tracing: Option<bool>,
}

impl ExecutionJob {
    pub fn new(job_id: impl Into<JobId>, config: CrewConfig) -> ExecutionJobBuilder {
        ExecutionJobBuilder {
            job_id: job_id.into(),
            config,
            flow: None,
            inputs: serde_json::Value::Null,
            run_name: None,
            timeout: None,
            debug_tracing: None,
        }
    }

    pub fn execution_type(&self) -> ExecutionType {
        self.config.execution_type
    }
}

pub struct ExecutionJobBuilder {
    job_id: JobId,
    config: CrewConfig,
    flow: Option<FlowConfig>,
    inputs: serde_json::Value,
    run_name: Option<String>,
    timeout: Option<Duration>,
    debug_tracing: Option<bool>,
}

impl ExecutionJobBuilder {
    crate::setters! {
        set {
            inputs: serde_json::Value,
        }
        option {
            flow: FlowConfig,
            run_name: String,
            timeout: Duration,
            debug_tracing: bool,
        }
    }

    pub fn build(self) -> ExecutionJob {
        ExecutionJob {
            job_id: self.job_id,
            config: self.config,
            flow: self.flow,
            inputs: self.inputs,
            run_name: self.run_name,
            timeout: self.timeout,
            debug_tracing: self.debug_tracing,
        }
    }
}

/// The authoritative lifecycle record of one job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Execution {
    /// Monotonic internal identity (database row id); `None` before the
    /// first insert.
    pub id: Option<i64>,
    /// Primary external key, unique within a group.
    pub job_id: JobId,
    pub group_id: GroupId,
    pub group_email: String,
    pub status: ExecutionStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// True while a stop request is coordinating worker termination.
    pub is_stopping: bool,
    pub stop_reason: Option<String>,
    pub inputs: serde_json::Value,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub partial_results: Option<serde_json::Value>,
    pub run_name: String,
    pub created_by_email: Option<String>,
    pub trigger_type: String,
    pub execution_type: ExecutionType,
}

impl Execution {
    /// Build the initial `pending` row for a submission.
    pub fn pending(job: &ExecutionJob, ctx: &GroupContext, clock: &impl Clock) -> Self {
        Self {
            id: None,
            job_id: job.job_id.clone(),
            group_id: ctx.primary_group_id().clone(),
            group_email: ctx.group_email().to_string(),
            status: ExecutionStatus::Pending,
            created_at: clock.timestamp_utc(),
            started_at: None,
            completed_at: None,
            is_stopping: false,
            stop_reason: None,
            inputs: job.inputs.clone(),
            result: None,
            error: None,
            partial_results: None,
            run_name: job
                .run_name
                .clone()
                .unwrap_or_else(|| format!("Run {}", job.job_id.short(8))),
            created_by_email: Some(ctx.group_email().to_string()),
            trigger_type: "api".to_string(),
            execution_type: job.execution_type(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Invariant check: `completed_at` is set iff the status is terminal.
    pub fn timestamps_consistent(&self) -> bool {
        self.completed_at.is_some() == self.status.is_terminal()
    }
}

crate::builder! {
    pub struct ExecutionBuilder => Execution {
        into {
            job_id: JobId = "test-exec-1",
            group_id: GroupId = "acme",
            group_email: String = "alice@acme.com",
            run_name: String = "test run",
            trigger_type: String = "api",
        }
        set {
            status: ExecutionStatus = ExecutionStatus::Pending,
            is_stopping: bool = false,
            inputs: serde_json::Value = serde_json::Value::Null,
            execution_type: ExecutionType = ExecutionType::Crew,
        }
        option {
            id: i64 = None,
            started_at: DateTime<Utc> = None,
            completed_at: DateTime<Utc> = None,
            stop_reason: String = None,
            result: serde_json::Value = None,
            error: String = None,
            partial_results: serde_json::Value = None,
            created_by_email: String = Some("alice@acme.com".to_string()),
        }
        computed {
            created_at: DateTime<Utc> = Utc::now(),
        }
    }
}

#[cfg(test)]
#[path = "execution_tests.rs"]
mod tests;

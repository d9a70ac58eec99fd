// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed frames crossing the worker process boundary.

use chrono::{DateTime, Utc};
use kasal_core::{JobId, LogLine, TraceEvent, WorkerGroupContext};
use serde::{Deserialize, Serialize};

/// Init payload the parent feeds to the worker's stdin.
///
/// Only primitives cross the boundary: the worker reconstructs its
/// ambient group context from `group` and never sees headers, sessions,
/// or pool handles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerInit {
    pub job_id: JobId,
    pub group: WorkerGroupContext,
    /// Raw crew/flow configuration, pre-validated by the submitter.
    pub config: serde_json::Value,
    /// In-flight flow override from the request, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flow: Option<serde_json::Value>,
    /// Resolved memory backend config for the group, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<serde_json::Value>,
    pub inputs: serde_json::Value,
    pub debug_tracing: bool,
    /// Environment the worker needs for LLM and memory backends.
    #[serde(default)]
    pub env: Vec<(String, String)>,
    /// Per-crew log file the worker appends to.
    pub log_file: std::path::PathBuf,
    /// Base directory for per-crew memory storage.
    pub memory_dir: std::path::PathBuf,
}

/// Terminal result posted exactly once by every worker, success or not.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Partial output collected before a stop or failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partial: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flow_id: Option<String>,
}

impl WorkerResult {
    pub fn ok(result: serde_json::Value) -> Self {
        Self { success: true, result: Some(result), error: None, partial: None, flow_id: None }
    }

    pub fn err(error: impl Into<String>) -> Self {
        Self {
            success: false,
            result: None,
            error: Some(error.into()),
            partial: None,
            flow_id: None,
        }
    }

    pub fn with_partial(mut self, partial: serde_json::Value) -> Self {
        self.partial = Some(partial);
        self
    }
}

/// Frames the worker writes to its stdout, demuxed by the parent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Frame {
    /// One log line for the log queue.
    Log(LogLine),
    /// One structured event for the trace queue.
    Trace(TraceEvent),
    /// The terminal result; the worker exits after writing it.
    Result(WorkerResult),
}

impl Frame {
    pub fn log(
        job_id: JobId,
        content: impl Into<String>,
        timestamp: DateTime<Utc>,
        group: &WorkerGroupContext,
    ) -> Self {
        Frame::Log(LogLine {
            job_id,
            content: content.into(),
            timestamp,
            group_id: group.group_id.clone(),
            group_email: group.group_email.clone(),
        })
    }
}

#[cfg(test)]
#[path = "frame_tests.rs"]
mod tests;

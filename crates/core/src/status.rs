// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Execution lifecycle state machine.
//!
//! ```text
//!         create                 mark_running           mark_terminal(success)
//! [∅] ──────────► pending ─────────────────► running ─────────────────────► completed
//!                   │                         │  │
//!                   │       mark_terminal     │  │     mark_terminal(failure)
//!                   └──────────────(failed)◄──┘  └──────────────────────► failed
//!                                               request_stop │
//!                                               ▼            │ mark_terminal(stopped)
//!                                             stopping ──────────────────► stopped
//! ```
//!
//! `Stopping` is a sub-state of running: the worker is still alive while
//! termination is coordinated, so `is_running()` covers it and a
//! stopping job may still finish `completed` or `failed` on its own.

use serde::{Deserialize, Serialize};

/// Status of one execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Row inserted, worker not yet started
    Pending,
    /// Worker is executing the crew
    Running,
    /// Stop requested, worker termination in flight
    Stopping,
    /// Crew finished successfully
    Completed,
    /// Crew failed or timed out
    Failed,
    /// Terminated on request
    Stopped,
}

crate::simple_display! {
    ExecutionStatus {
        Pending => "pending",
        Running => "running",
        Stopping => "stopping",
        Completed => "completed",
        Failed => "failed",
        Stopped => "stopped",
    }
}

impl ExecutionStatus {
    /// Terminal states accept no further writes.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Stopped)
    }

    /// Whether a worker process may exist for this status.
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running | Self::Stopping)
    }

    /// Whether the status store accepts the given transition.
    ///
    /// Idempotent self-transitions (`running → running`,
    /// `stopping → stopping`) are allowed so repeated `mark_running` /
    /// `request_stop` calls are no-ops rather than errors.
    pub fn can_transition_to(&self, next: ExecutionStatus) -> bool {
        use ExecutionStatus::*;
        match (self, next) {
            (Pending, Running) | (Pending, Failed) => true,
            (Running, Running) => true,
            (Running, Completed) | (Running, Failed) => true,
            (Running, Stopping) | (Running, Stopped) => true,
            (Stopping, Stopping) => true,
            (Stopping, Completed) | (Stopping, Failed) | (Stopping, Stopped) => true,
            _ => false,
        }
    }

    /// Parse a persisted status string.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "stopping" => Some(Self::Stopping),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "stopped" => Some(Self::Stopped),
            _ => None,
        }
    }
}

#[cfg(test)]
#[path = "status_tests.rs"]
mod tests;

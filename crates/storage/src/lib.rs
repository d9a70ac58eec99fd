// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! kasal-storage: repositories over the execution database.
//!
//! Every read filters by the caller's group IDs and every insert stamps
//! a group ID; a call without a tenant filter is rejected before any
//! SQL runs. Workers never get a handle to anything in this crate;
//! all worker-originated writes arrive via the parent's queue writers.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod db;
mod engine_config;
mod error;
mod executions;
mod groups;
mod logs;
mod tools;
mod traces;

#[cfg(any(test, feature = "test-support"))]
pub mod fake;

pub use db::Db;
pub use engine_config::{EngineConfigRepository, SqlEngineConfigRepository};
pub use error::StorageError;
pub use executions::{
    ExecutionFilter, ExecutionRepository, SqlExecutionRepository, TransitionUpdate,
};
pub use groups::{SqlUserGroupRepository, UserGroupRepository, UserRecord};
pub use logs::{LogRepository, SqlLogRepository};
pub use tools::{SqlToolRepository, ToolRecord, ToolRepository};
pub use traces::{SqlTraceRepository, TraceRepository, TraceRow};

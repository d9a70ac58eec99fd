// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory fake repositories for other crates' tests.
//!
//! Same contracts as the SQL implementations, backed by locked maps.
//! Handy where a test wants to inspect rows synchronously or run
//! without a database pool.

use crate::engine_config::EngineConfigRepository;
use crate::error::StorageError;
use crate::executions::{ExecutionFilter, ExecutionRepository, TransitionUpdate};
use crate::groups::{UserGroupRepository, UserRecord};
use crate::logs::LogRepository;
use crate::tools::{ToolRecord, ToolRepository};
use crate::traces::{TraceRepository, TraceRow};
use async_trait::async_trait;
use kasal_core::{
    Execution, GroupId, GroupRole, JobId, LogLine, Membership, MemoryBackendConfig, TraceEvent,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Default, Clone)]
pub struct InMemoryExecutionRepository {
    inner: Arc<Mutex<ExecState>>,
}

#[derive(Default)]
struct ExecState {
    rows: Vec<Execution>,
    next_id: i64,
}

impl InMemoryExecutionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every row, for assertions.
    pub fn all(&self) -> Vec<Execution> {
        self.inner.lock().rows.clone()
    }
}

#[async_trait]
impl ExecutionRepository for InMemoryExecutionRepository {
    async fn insert(&self, execution: &Execution) -> Result<i64, StorageError> {
        let mut state = self.inner.lock();
        if state
            .rows
            .iter()
            .any(|r| r.group_id == execution.group_id && r.job_id == execution.job_id)
        {
            return Err(StorageError::Duplicate(format!(
                "execution {} in group {}",
                execution.job_id, execution.group_id
            )));
        }
        state.next_id += 1;
        let mut row = execution.clone();
        row.id = Some(state.next_id);
        state.rows.push(row);
        Ok(state.next_id)
    }

    async fn get(
        &self,
        group_ids: &[GroupId],
        job_id: &JobId,
    ) -> Result<Option<Execution>, StorageError> {
        if group_ids.is_empty() {
            return Err(StorageError::MissingGroupFilter);
        }
        Ok(self
            .inner
            .lock()
            .rows
            .iter()
            .find(|r| r.job_id == *job_id && group_ids.contains(&r.group_id))
            .cloned())
    }

    async fn list(
        &self,
        group_ids: &[GroupId],
        filter: &ExecutionFilter,
    ) -> Result<Vec<Execution>, StorageError> {
        if group_ids.is_empty() {
            return Err(StorageError::MissingGroupFilter);
        }
        let state = self.inner.lock();
        let mut rows: Vec<Execution> = state
            .rows
            .iter()
            .filter(|r| group_ids.contains(&r.group_id))
            .filter(|r| filter.status.map_or(true, |s| r.status == s))
            .cloned()
            .collect();
        rows.reverse();
        let offset = filter.offset.unwrap_or(0) as usize;
        let limit = filter.limit.unwrap_or(100) as usize;
        Ok(rows.into_iter().skip(offset).take(limit).collect())
    }

    async fn apply_transition(
        &self,
        group_id: &GroupId,
        job_id: &JobId,
        update: &TransitionUpdate,
    ) -> Result<bool, StorageError> {
        let mut state = self.inner.lock();
        let Some(row) = state
            .rows
            .iter_mut()
            .find(|r| r.group_id == *group_id && r.job_id == *job_id)
        else {
            return Ok(false);
        };
        if !update.from.contains(&row.status) {
            return Ok(false);
        }
        row.status = update.to;
        if let Some(v) = update.started_at {
            row.started_at = Some(v);
        }
        if let Some(v) = update.completed_at {
            row.completed_at = Some(v);
        }
        if let Some(v) = update.is_stopping {
            row.is_stopping = v;
        }
        if let Some(v) = &update.stop_reason {
            row.stop_reason = Some(v.clone());
        }
        if let Some(v) = &update.result {
            row.result = Some(v.clone());
        }
        if let Some(v) = &update.error {
            row.error = Some(v.clone());
        }
        if let Some(v) = &update.partial_results {
            row.partial_results = Some(v.clone());
        }
        Ok(true)
    }

    async fn delete(&self, group_ids: &[GroupId], job_id: &JobId) -> Result<bool, StorageError> {
        if group_ids.is_empty() {
            return Err(StorageError::MissingGroupFilter);
        }
        let mut state = self.inner.lock();
        let before = state.rows.len();
        state
            .rows
            .retain(|r| !(r.job_id == *job_id && group_ids.contains(&r.group_id)));
        Ok(state.rows.len() < before)
    }
}

#[derive(Default, Clone)]
pub struct InMemoryTraceRepository {
    inner: Arc<Mutex<TraceState>>,
}

#[derive(Default)]
struct TraceState {
    rows: Vec<TraceRow>,
    next_id: i64,
}

impl InMemoryTraceRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> Vec<TraceRow> {
        self.inner.lock().rows.clone()
    }
}

#[async_trait]
impl TraceRepository for InMemoryTraceRepository {
    async fn insert_batch(&self, events: &[TraceEvent]) -> Result<usize, StorageError> {
        let mut state = self.inner.lock();
        for event in events {
            state.next_id += 1;
            let id = state.next_id;
            state.rows.push(TraceRow { id, event: event.clone() });
        }
        Ok(events.len())
    }

    async fn list(
        &self,
        group_ids: &[GroupId],
        job_id: &JobId,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<TraceRow>, StorageError> {
        if group_ids.is_empty() {
            return Err(StorageError::MissingGroupFilter);
        }
        Ok(self
            .inner
            .lock()
            .rows
            .iter()
            .filter(|r| r.event.job_id == *job_id && group_ids.contains(&r.event.group_id))
            .skip(offset as usize)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn delete_for_job(
        &self,
        group_ids: &[GroupId],
        job_id: &JobId,
    ) -> Result<u64, StorageError> {
        if group_ids.is_empty() {
            return Err(StorageError::MissingGroupFilter);
        }
        let mut state = self.inner.lock();
        let before = state.rows.len();
        state
            .rows
            .retain(|r| !(r.event.job_id == *job_id && group_ids.contains(&r.event.group_id)));
        Ok((before - state.rows.len()) as u64)
    }
}

#[derive(Default, Clone)]
pub struct InMemoryLogRepository {
    inner: Arc<Mutex<Vec<LogLine>>>,
}

impl InMemoryLogRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> Vec<LogLine> {
        self.inner.lock().clone()
    }
}

#[async_trait]
impl LogRepository for InMemoryLogRepository {
    async fn append_batch(&self, lines: &[LogLine]) -> Result<usize, StorageError> {
        self.inner.lock().extend_from_slice(lines);
        Ok(lines.len())
    }

    async fn list(
        &self,
        group_ids: &[GroupId],
        job_id: &JobId,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<LogLine>, StorageError> {
        if group_ids.is_empty() {
            return Err(StorageError::MissingGroupFilter);
        }
        Ok(self
            .inner
            .lock()
            .iter()
            .filter(|l| l.job_id == *job_id && group_ids.contains(&l.group_id))
            .skip(offset as usize)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn delete_for_job(
        &self,
        group_ids: &[GroupId],
        job_id: &JobId,
    ) -> Result<u64, StorageError> {
        if group_ids.is_empty() {
            return Err(StorageError::MissingGroupFilter);
        }
        let mut lines = self.inner.lock();
        let before = lines.len();
        lines.retain(|l| !(l.job_id == *job_id && group_ids.contains(&l.group_id)));
        Ok((before - lines.len()) as u64)
    }
}

#[derive(Default, Clone)]
pub struct InMemoryEngineConfigRepository {
    debug_tracing: Arc<Mutex<Option<bool>>>,
    memory: Arc<Mutex<HashMap<GroupId, MemoryBackendConfig>>>,
}

impl InMemoryEngineConfigRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EngineConfigRepository for InMemoryEngineConfigRepository {
    async fn debug_tracing(&self) -> Result<Option<bool>, StorageError> {
        Ok(*self.debug_tracing.lock())
    }

    async fn set_debug_tracing(&self, enabled: bool) -> Result<(), StorageError> {
        *self.debug_tracing.lock() = Some(enabled);
        Ok(())
    }

    async fn memory_backend(
        &self,
        group_ids: &[GroupId],
    ) -> Result<Option<MemoryBackendConfig>, StorageError> {
        if group_ids.is_empty() {
            return Err(StorageError::MissingGroupFilter);
        }
        let memory = self.memory.lock();
        Ok(group_ids.iter().find_map(|g| memory.get(g).cloned()))
    }

    async fn set_memory_backend(
        &self,
        group_id: &GroupId,
        config: &MemoryBackendConfig,
    ) -> Result<(), StorageError> {
        self.memory.lock().insert(group_id.clone(), config.clone());
        Ok(())
    }
}

#[derive(Default, Clone)]
pub struct InMemoryToolRepository {
    inner: Arc<Mutex<Vec<ToolRecord>>>,
}

impl InMemoryToolRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ToolRepository for InMemoryToolRepository {
    async fn resolve(
        &self,
        group_ids: &[GroupId],
        reference: &str,
    ) -> Result<Option<ToolRecord>, StorageError> {
        if group_ids.is_empty() {
            return Err(StorageError::MissingGroupFilter);
        }
        let tools = self.inner.lock();
        let by_id = reference.parse::<i64>().ok();
        Ok(tools
            .iter()
            .find(|t| {
                group_ids.contains(&t.group_id)
                    && match by_id {
                        Some(id) => t.id == id,
                        None => t.name == reference,
                    }
            })
            .cloned())
    }

    async fn upsert(
        &self,
        group_id: &GroupId,
        name: &str,
        enabled: bool,
        config: serde_json::Value,
    ) -> Result<i64, StorageError> {
        let mut tools = self.inner.lock();
        if let Some(existing) =
            tools.iter_mut().find(|t| t.group_id == *group_id && t.name == name)
        {
            existing.enabled = enabled;
            existing.config = config;
            return Ok(existing.id);
        }
        let id = tools.len() as i64 + 1;
        tools.push(ToolRecord {
            id,
            name: name.to_string(),
            group_id: group_id.clone(),
            enabled,
            config,
        });
        Ok(id)
    }
}

#[derive(Default, Clone)]
pub struct InMemoryUserGroupRepository {
    users: Arc<Mutex<Vec<UserRecord>>>,
    memberships: Arc<Mutex<Vec<(String, Membership)>>>,
}

impl InMemoryUserGroupRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserGroupRepository for InMemoryUserGroupRepository {
    async fn get_or_create_user(&self, email: &str) -> Result<UserRecord, StorageError> {
        let mut users = self.users.lock();
        if let Some(user) = users.iter().find(|u| u.email == email) {
            return Ok(user.clone());
        }
        let user = UserRecord { id: users.len() as i64 + 1, email: email.to_string() };
        users.push(user.clone());
        Ok(user)
    }

    async fn memberships(&self, email: &str) -> Result<Vec<Membership>, StorageError> {
        Ok(self
            .memberships
            .lock()
            .iter()
            .filter(|(e, _)| e == email)
            .map(|(_, m)| m.clone())
            .collect())
    }

    async fn add_membership(
        &self,
        group_id: &GroupId,
        _group_name: &str,
        email: &str,
        role: GroupRole,
    ) -> Result<(), StorageError> {
        let mut memberships = self.memberships.lock();
        memberships.retain(|(e, m)| !(e == email && m.group_id == *group_id));
        memberships
            .push((email.to_string(), Membership { group_id: group_id.clone(), role }));
        Ok(())
    }
}

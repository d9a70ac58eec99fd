// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Execution rows: the authoritative lifecycle records.
//!
//! Lifecycle transitions go through [`apply_transition`], a
//! compare-and-set keyed on the allowed source statuses. Concurrent
//! writers race safely: exactly one update matches, losers see
//! `Ok(false)`.
//!
//! [`apply_transition`]: ExecutionRepository::apply_transition

use crate::db::{placeholders, Db};
use crate::error::StorageError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use kasal_core::crew::ExecutionType;
use kasal_core::{Execution, ExecutionStatus, GroupId, JobId};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

/// Filters for listing executions within a group.
#[derive(Debug, Clone, Default)]
pub struct ExecutionFilter {
    pub status: Option<ExecutionStatus>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// A guarded status transition. Fields set to `Some` are written;
/// `None` leaves the column untouched.
#[derive(Debug, Clone)]
pub struct TransitionUpdate {
    /// Statuses the row must currently be in for the update to apply.
    pub from: Vec<ExecutionStatus>,
    pub to: ExecutionStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub is_stopping: Option<bool>,
    pub stop_reason: Option<String>,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub partial_results: Option<serde_json::Value>,
}

impl TransitionUpdate {
    pub fn new(from: Vec<ExecutionStatus>, to: ExecutionStatus) -> Self {
        Self {
            from,
            to,
            started_at: None,
            completed_at: None,
            is_stopping: None,
            stop_reason: None,
            result: None,
            error: None,
            partial_results: None,
        }
    }
}

#[async_trait]
pub trait ExecutionRepository: Send + Sync {
    /// Insert a fresh `pending` row; fails with a duplicate error when
    /// `(group_id, job_id)` already exists.
    async fn insert(&self, execution: &Execution) -> Result<i64, StorageError>;

    /// Fetch one execution visible to the given groups.
    async fn get(
        &self,
        group_ids: &[GroupId],
        job_id: &JobId,
    ) -> Result<Option<Execution>, StorageError>;

    /// List executions visible to the given groups, newest first.
    async fn list(
        &self,
        group_ids: &[GroupId],
        filter: &ExecutionFilter,
    ) -> Result<Vec<Execution>, StorageError>;

    /// Compare-and-set lifecycle transition. Returns `true` when this
    /// caller won the update.
    async fn apply_transition(
        &self,
        group_id: &GroupId,
        job_id: &JobId,
        update: &TransitionUpdate,
    ) -> Result<bool, StorageError>;

    /// Delete one execution. Traces and logs are deleted by their own
    /// repositories under the same job.
    async fn delete(&self, group_ids: &[GroupId], job_id: &JobId) -> Result<bool, StorageError>;
}

/// SQL-backed implementation.
#[derive(Clone)]
pub struct SqlExecutionRepository {
    db: Db,
}

impl SqlExecutionRepository {
    pub fn new(db: Db) -> Self {
        Self { db }
    }
}

fn require_groups(group_ids: &[GroupId]) -> Result<(), StorageError> {
    if group_ids.is_empty() {
        return Err(StorageError::MissingGroupFilter);
    }
    Ok(())
}

fn json_column(value: &Option<serde_json::Value>) -> Result<Option<String>, StorageError> {
    value.as_ref().map(|v| serde_json::to_string(v).map_err(Into::into)).transpose()
}

fn row_to_execution(row: &SqliteRow) -> Result<Execution, StorageError> {
    let status_text: String = row.try_get("status")?;
    let status = ExecutionStatus::parse(&status_text)
        .ok_or_else(|| StorageError::CorruptRow(format!("unknown status {status_text:?}")))?;

    let execution_type = match row.try_get::<String, _>("execution_type")?.as_str() {
        "flow" => ExecutionType::Flow,
        _ => ExecutionType::Crew,
    };

    let parse_json = |text: Option<String>| -> Result<Option<serde_json::Value>, StorageError> {
        text.map(|t| serde_json::from_str(&t).map_err(Into::into)).transpose()
    };

    let inputs: String = row.try_get("inputs")?;

    Ok(Execution {
        id: Some(row.try_get("id")?),
        job_id: JobId::new(row.try_get::<String, _>("job_id")?),
        group_id: GroupId::new(row.try_get::<String, _>("group_id")?),
        group_email: row.try_get("group_email")?,
        status,
        created_at: row.try_get("created_at")?,
        started_at: row.try_get("started_at")?,
        completed_at: row.try_get("completed_at")?,
        is_stopping: row.try_get::<i64, _>("is_stopping")? != 0,
        stop_reason: row.try_get("stop_reason")?,
        inputs: serde_json::from_str(&inputs)?,
        result: parse_json(row.try_get("result")?)?,
        error: row.try_get("error")?,
        partial_results: parse_json(row.try_get("partial_results")?)?,
        run_name: row.try_get("run_name")?,
        created_by_email: row.try_get("created_by_email")?,
        trigger_type: row.try_get("trigger_type")?,
        execution_type,
    })
}

#[async_trait]
impl ExecutionRepository for SqlExecutionRepository {
    async fn insert(&self, execution: &Execution) -> Result<i64, StorageError> {
        let inputs = serde_json::to_string(&execution.inputs)?;
        let result = sqlx::query(
            r#"
            INSERT INTO executions (
                job_id, group_id, group_email, status, created_at, started_at,
                completed_at, is_stopping, stop_reason, inputs, result, error,
                partial_results, run_name, created_by_email, trigger_type, execution_type
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(execution.job_id.as_str())
        .bind(execution.group_id.as_str())
        .bind(&execution.group_email)
        .bind(execution.status.to_string())
        .bind(execution.created_at)
        .bind(execution.started_at)
        .bind(execution.completed_at)
        .bind(execution.is_stopping as i64)
        .bind(&execution.stop_reason)
        .bind(inputs)
        .bind(json_column(&execution.result)?)
        .bind(&execution.error)
        .bind(json_column(&execution.partial_results)?)
        .bind(&execution.run_name)
        .bind(&execution.created_by_email)
        .bind(&execution.trigger_type)
        .bind(execution.execution_type.to_string())
        .execute(self.db.pool())
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => StorageError::Duplicate(
                format!("execution {} in group {}", execution.job_id, execution.group_id),
            ),
            _ => StorageError::Sqlx(e),
        })?;

        Ok(result.last_insert_rowid())
    }

    async fn get(
        &self,
        group_ids: &[GroupId],
        job_id: &JobId,
    ) -> Result<Option<Execution>, StorageError> {
        require_groups(group_ids)?;
        let sql = format!(
            "SELECT * FROM executions WHERE job_id = ? AND group_id IN ({})",
            placeholders(group_ids.len())
        );
        let mut query = sqlx::query(&sql).bind(job_id.as_str());
        for group in group_ids {
            query = query.bind(group.as_str());
        }
        let row = query.fetch_optional(self.db.pool()).await?;
        row.as_ref().map(row_to_execution).transpose()
    }

    async fn list(
        &self,
        group_ids: &[GroupId],
        filter: &ExecutionFilter,
    ) -> Result<Vec<Execution>, StorageError> {
        require_groups(group_ids)?;
        let mut sql = format!(
            "SELECT * FROM executions WHERE group_id IN ({})",
            placeholders(group_ids.len())
        );
        if filter.status.is_some() {
            sql.push_str(" AND status = ?");
        }
        sql.push_str(" ORDER BY id DESC LIMIT ? OFFSET ?");

        let mut query = sqlx::query(&sql);
        for group in group_ids {
            query = query.bind(group.as_str());
        }
        if let Some(status) = filter.status {
            query = query.bind(status.to_string());
        }
        query = query.bind(filter.limit.unwrap_or(100)).bind(filter.offset.unwrap_or(0));

        let rows = query.fetch_all(self.db.pool()).await?;
        rows.iter().map(row_to_execution).collect()
    }

    async fn apply_transition(
        &self,
        group_id: &GroupId,
        job_id: &JobId,
        update: &TransitionUpdate,
    ) -> Result<bool, StorageError> {
        if update.from.is_empty() {
            return Ok(false);
        }
        let sql = format!(
            r#"
            UPDATE executions SET
                status = ?,
                started_at = COALESCE(?, started_at),
                completed_at = COALESCE(?, completed_at),
                is_stopping = COALESCE(?, is_stopping),
                stop_reason = COALESCE(?, stop_reason),
                result = COALESCE(?, result),
                error = COALESCE(?, error),
                partial_results = COALESCE(?, partial_results)
            WHERE group_id = ? AND job_id = ? AND status IN ({})
            "#,
            placeholders(update.from.len())
        );

        let mut query = sqlx::query(&sql)
            .bind(update.to.to_string())
            .bind(update.started_at)
            .bind(update.completed_at)
            .bind(update.is_stopping.map(|b| b as i64))
            .bind(&update.stop_reason)
            .bind(json_column(&update.result)?)
            .bind(&update.error)
            .bind(json_column(&update.partial_results)?)
            .bind(group_id.as_str())
            .bind(job_id.as_str());
        for status in &update.from {
            query = query.bind(status.to_string());
        }

        let result = query.execute(self.db.pool()).await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete(&self, group_ids: &[GroupId], job_id: &JobId) -> Result<bool, StorageError> {
        require_groups(group_ids)?;
        let sql = format!(
            "DELETE FROM executions WHERE job_id = ? AND group_id IN ({})",
            placeholders(group_ids.len())
        );
        let mut query = sqlx::query(&sql).bind(job_id.as_str());
        for group in group_ids {
            query = query.bind(group.as_str());
        }
        let result = query.execute(self.db.pool()).await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
#[path = "executions_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Execution trace rows.
//!
//! Rows are written only by the trace writer, in insertion order per
//! job, one transaction per batch. They are never mutated; deletion
//! happens only as a batch under the parent job.

use crate::db::{placeholders, Db};
use crate::error::StorageError;
use async_trait::async_trait;
use kasal_core::{EventType, GroupId, JobId, TraceEvent};
use sqlx::Row;

/// A persisted trace row: the event plus its monotonic row id.
#[derive(Debug, Clone)]
pub struct TraceRow {
    pub id: i64,
    pub event: TraceEvent,
}

#[async_trait]
pub trait TraceRepository: Send + Sync {
    /// Insert a batch in one transaction, preserving slice order.
    async fn insert_batch(&self, events: &[TraceEvent]) -> Result<usize, StorageError>;

    /// List traces for a job, insertion order.
    async fn list(
        &self,
        group_ids: &[GroupId],
        job_id: &JobId,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<TraceRow>, StorageError>;

    /// Delete all traces under a job. Returns the number removed.
    async fn delete_for_job(
        &self,
        group_ids: &[GroupId],
        job_id: &JobId,
    ) -> Result<u64, StorageError>;
}

#[derive(Clone)]
pub struct SqlTraceRepository {
    db: Db,
}

impl SqlTraceRepository {
    pub fn new(db: Db) -> Self {
        Self { db }
    }
}

#[async_trait]
impl TraceRepository for SqlTraceRepository {
    async fn insert_batch(&self, events: &[TraceEvent]) -> Result<usize, StorageError> {
        if events.is_empty() {
            return Ok(0);
        }
        let mut tx = self.db.pool().begin().await?;
        for event in events {
            let metadata = if event.trace_metadata.is_null() {
                None
            } else {
                Some(serde_json::to_string(&event.trace_metadata)?)
            };
            sqlx::query(
                r#"
                INSERT INTO execution_trace (
                    job_id, event_source, event_context, event_type, output,
                    trace_metadata, group_id, group_email, created_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(event.job_id.as_str())
            .bind(&event.event_source)
            .bind(&event.event_context)
            .bind(event.event_type.to_string())
            .bind(&event.output)
            .bind(metadata)
            .bind(event.group_id.as_str())
            .bind(&event.group_email)
            .bind(event.created_at)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
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
        let sql = format!(
            r#"
            SELECT id, job_id, event_source, event_context, event_type, output,
                   trace_metadata, group_id, group_email, created_at
            FROM execution_trace
            WHERE job_id = ? AND group_id IN ({})
            ORDER BY id ASC LIMIT ? OFFSET ?
            "#,
            placeholders(group_ids.len())
        );
        let mut query = sqlx::query(&sql).bind(job_id.as_str());
        for group in group_ids {
            query = query.bind(group.as_str());
        }
        query = query.bind(limit).bind(offset);

        let rows = query.fetch_all(self.db.pool()).await?;
        rows.iter()
            .map(|row| {
                let event_type_text: String = row.try_get("event_type")?;
                let event_type = EventType::parse(&event_type_text).ok_or_else(|| {
                    StorageError::CorruptRow(format!("unknown event_type {event_type_text:?}"))
                })?;
                let metadata: Option<String> = row.try_get("trace_metadata")?;
                let trace_metadata = match metadata {
                    Some(text) => serde_json::from_str(&text)?,
                    None => serde_json::Value::Null,
                };
                Ok(TraceRow {
                    id: row.try_get("id")?,
                    event: TraceEvent {
                        job_id: JobId::new(row.try_get::<String, _>("job_id")?),
                        event_source: row.try_get("event_source")?,
                        event_context: row.try_get("event_context")?,
                        event_type,
                        output: row.try_get("output")?,
                        trace_metadata,
                        group_id: GroupId::new(row.try_get::<String, _>("group_id")?),
                        group_email: row.try_get("group_email")?,
                        task_id: None,
                        created_at: row.try_get("created_at")?,
                    },
                })
            })
            .collect()
    }

    async fn delete_for_job(
        &self,
        group_ids: &[GroupId],
        job_id: &JobId,
    ) -> Result<u64, StorageError> {
        if group_ids.is_empty() {
            return Err(StorageError::MissingGroupFilter);
        }
        let sql = format!(
            "DELETE FROM execution_trace WHERE job_id = ? AND group_id IN ({})",
            placeholders(group_ids.len())
        );
        let mut query = sqlx::query(&sql).bind(job_id.as_str());
        for group in group_ids {
            query = query.bind(group.as_str());
        }
        Ok(query.execute(self.db.pool()).await?.rows_affected())
    }
}

#[cfg(test)]
#[path = "traces_tests.rs"]
mod tests;

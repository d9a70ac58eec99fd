// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Execution log rows: append-only unstructured lines from workers.

use crate::db::{placeholders, Db};
use crate::error::StorageError;
use async_trait::async_trait;
use kasal_core::{GroupId, JobId, LogLine};
use sqlx::Row;

#[async_trait]
pub trait LogRepository: Send + Sync {
    /// Append a batch of lines in one transaction.
    async fn append_batch(&self, lines: &[LogLine]) -> Result<usize, StorageError>;

    /// List lines for a job in append order.
    async fn list(
        &self,
        group_ids: &[GroupId],
        job_id: &JobId,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<LogLine>, StorageError>;

    /// Delete all lines under a job.
    async fn delete_for_job(
        &self,
        group_ids: &[GroupId],
        job_id: &JobId,
    ) -> Result<u64, StorageError>;
}

#[derive(Clone)]
pub struct SqlLogRepository {
    db: Db,
}

impl SqlLogRepository {
    pub fn new(db: Db) -> Self {
        Self { db }
    }
}

#[async_trait]
impl LogRepository for SqlLogRepository {
    async fn append_batch(&self, lines: &[LogLine]) -> Result<usize, StorageError> {
        if lines.is_empty() {
            return Ok(0);
        }
        let mut tx = self.db.pool().begin().await?;
        for line in lines {
            sqlx::query(
                r#"
                INSERT INTO execution_logs (execution_id, content, timestamp, group_id, group_email)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(line.job_id.as_str())
            .bind(&line.content)
            .bind(line.timestamp)
            .bind(line.group_id.as_str())
            .bind(&line.group_email)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
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
        let sql = format!(
            r#"
            SELECT execution_id, content, timestamp, group_id, group_email
            FROM execution_logs
            WHERE execution_id = ? AND group_id IN ({})
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
                Ok(LogLine {
                    job_id: JobId::new(row.try_get::<String, _>("execution_id")?),
                    content: row.try_get("content")?,
                    timestamp: row.try_get("timestamp")?,
                    group_id: GroupId::new(row.try_get::<String, _>("group_id")?),
                    group_email: row.try_get("group_email")?,
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
            "DELETE FROM execution_logs WHERE execution_id = ? AND group_id IN ({})",
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
#[path = "logs_tests.rs"]
mod tests;

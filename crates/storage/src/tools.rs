// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Group-scoped tool registry.
//!
//! Agent configs reference tools either by repository id (a numeric
//! string) or by name; [`ToolRepository::resolve`] accepts both.

use crate::db::{placeholders, Db};
use crate::error::StorageError;
use async_trait::async_trait;
use kasal_core::GroupId;
use sqlx::Row;

/// A stored tool definition.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolRecord {
    pub id: i64,
    pub name: String,
    pub group_id: GroupId,
    pub enabled: bool,
    /// Stored configuration merged under any per-agent override.
    pub config: serde_json::Value,
}

#[async_trait]
pub trait ToolRepository: Send + Sync {
    /// Resolve a tool reference (numeric id or name) within the groups.
    async fn resolve(
        &self,
        group_ids: &[GroupId],
        reference: &str,
    ) -> Result<Option<ToolRecord>, StorageError>;

    /// Register a tool for a group (admin seam for tests and seeding).
    async fn upsert(
        &self,
        group_id: &GroupId,
        name: &str,
        enabled: bool,
        config: serde_json::Value,
    ) -> Result<i64, StorageError>;
}

#[derive(Clone)]
pub struct SqlToolRepository {
    db: Db,
}

impl SqlToolRepository {
    pub fn new(db: Db) -> Self {
        Self { db }
    }
}

fn row_to_tool(row: &sqlx::sqlite::SqliteRow) -> Result<ToolRecord, StorageError> {
    let config: Option<String> = row.try_get("config")?;
    Ok(ToolRecord {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        group_id: GroupId::new(row.try_get::<String, _>("group_id")?),
        enabled: row.try_get::<i64, _>("enabled")? != 0,
        config: match config {
            Some(text) => serde_json::from_str(&text)?,
            None => serde_json::Value::Null,
        },
    })
}

#[async_trait]
impl ToolRepository for SqlToolRepository {
    async fn resolve(
        &self,
        group_ids: &[GroupId],
        reference: &str,
    ) -> Result<Option<ToolRecord>, StorageError> {
        if group_ids.is_empty() {
            return Err(StorageError::MissingGroupFilter);
        }
        let in_list = placeholders(group_ids.len());
        let (sql, by_id) = match reference.parse::<i64>() {
            Ok(_) => (
                format!("SELECT * FROM tools WHERE id = ? AND group_id IN ({in_list})"),
                true,
            ),
            Err(_) => (
                format!("SELECT * FROM tools WHERE name = ? AND group_id IN ({in_list})"),
                false,
            ),
        };

        let mut query = sqlx::query(&sql);
        if by_id {
            // parse checked above; re-parse to keep the bind typed
            query = query.bind(reference.parse::<i64>().unwrap_or_default());
        } else {
            query = query.bind(reference);
        }
        for group in group_ids {
            query = query.bind(group.as_str());
        }

        let row = query.fetch_optional(self.db.pool()).await?;
        row.as_ref().map(row_to_tool).transpose()
    }

    async fn upsert(
        &self,
        group_id: &GroupId,
        name: &str,
        enabled: bool,
        config: serde_json::Value,
    ) -> Result<i64, StorageError> {
        let config_text = serde_json::to_string(&config)?;
        let result = sqlx::query(
            r#"
            INSERT INTO tools (name, group_id, enabled, config) VALUES (?, ?, ?, ?)
            ON CONFLICT (group_id, name) DO UPDATE SET enabled = excluded.enabled, config = excluded.config
            "#,
        )
        .bind(name)
        .bind(group_id.as_str())
        .bind(enabled as i64)
        .bind(config_text)
        .execute(self.db.pool())
        .await?;
        Ok(result.last_insert_rowid())
    }
}

#[cfg(test)]
#[path = "tools_tests.rs"]
mod tests;

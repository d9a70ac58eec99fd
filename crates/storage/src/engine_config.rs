// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Engine configuration flags and memory backend profiles.

use crate::db::{placeholders, Db};
use crate::error::StorageError;
use async_trait::async_trait;
use kasal_core::{GroupId, MemoryBackendConfig};
use sqlx::Row;

#[async_trait]
pub trait EngineConfigRepository: Send + Sync {
    /// The `crewai_debug_tracing` flag; `None` when no row exists.
    async fn debug_tracing(&self) -> Result<Option<bool>, StorageError>;

    /// Set the `crewai_debug_tracing` flag.
    async fn set_debug_tracing(&self, enabled: bool) -> Result<(), StorageError>;

    /// The active memory backend config for the first group that has
    /// one, or `None`.
    async fn memory_backend(
        &self,
        group_ids: &[GroupId],
    ) -> Result<Option<MemoryBackendConfig>, StorageError>;

    /// Store a group's active memory backend config.
    async fn set_memory_backend(
        &self,
        group_id: &GroupId,
        config: &MemoryBackendConfig,
    ) -> Result<(), StorageError>;
}

#[derive(Clone)]
pub struct SqlEngineConfigRepository {
    db: Db,
}

impl SqlEngineConfigRepository {
    pub fn new(db: Db) -> Self {
        Self { db }
    }
}

const ENGINE: &str = "crewai";
const DEBUG_TRACING_KEY: &str = "debug_tracing";

#[async_trait]
impl EngineConfigRepository for SqlEngineConfigRepository {
    async fn debug_tracing(&self) -> Result<Option<bool>, StorageError> {
        let row = sqlx::query(
            "SELECT config_value FROM engine_config WHERE engine = ? AND config_key = ?",
        )
        .bind(ENGINE)
        .bind(DEBUG_TRACING_KEY)
        .fetch_optional(self.db.pool())
        .await?;

        Ok(row
            .map(|r| r.try_get::<String, _>("config_value"))
            .transpose()?
            .map(|v| matches!(v.as_str(), "true" | "1")))
    }

    async fn set_debug_tracing(&self, enabled: bool) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            INSERT INTO engine_config (engine, config_key, config_value) VALUES (?, ?, ?)
            ON CONFLICT (engine, config_key) DO UPDATE SET config_value = excluded.config_value
            "#,
        )
        .bind(ENGINE)
        .bind(DEBUG_TRACING_KEY)
        .bind(if enabled { "true" } else { "false" })
        .execute(self.db.pool())
        .await?;
        Ok(())
    }

    async fn memory_backend(
        &self,
        group_ids: &[GroupId],
    ) -> Result<Option<MemoryBackendConfig>, StorageError> {
        if group_ids.is_empty() {
            return Err(StorageError::MissingGroupFilter);
        }
        let sql = format!(
            "SELECT config FROM memory_backend_config WHERE active = 1 AND group_id IN ({}) LIMIT 1",
            placeholders(group_ids.len())
        );
        let mut query = sqlx::query(&sql);
        for group in group_ids {
            query = query.bind(group.as_str());
        }
        let row = query.fetch_optional(self.db.pool()).await?;
        row.map(|r| {
            let text: String = r.try_get("config")?;
            serde_json::from_str(&text).map_err(Into::into)
        })
        .transpose()
    }

    async fn set_memory_backend(
        &self,
        group_id: &GroupId,
        config: &MemoryBackendConfig,
    ) -> Result<(), StorageError> {
        let text = serde_json::to_string(config)?;
        sqlx::query(
            r#"
            INSERT INTO memory_backend_config (group_id, active, config) VALUES (?, 1, ?)
            ON CONFLICT (group_id) DO UPDATE SET active = 1, config = excluded.config
            "#,
        )
        .bind(group_id.as_str())
        .bind(text)
        .execute(self.db.pool())
        .await?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "engine_config_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Users, groups, and memberships.
//!
//! Identity arrives pre-authenticated from the proxy (forwarded email
//! header), so unknown users are auto-created on first sight.

use crate::db::Db;
use crate::error::StorageError;
use async_trait::async_trait;
use kasal_core::{GroupId, GroupRole, Membership};
use sqlx::Row;

/// A user row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub id: i64,
    pub email: String,
}

#[async_trait]
pub trait UserGroupRepository: Send + Sync {
    /// Fetch the user by email, creating the row on first sight.
    async fn get_or_create_user(&self, email: &str) -> Result<UserRecord, StorageError>;

    /// The user's group memberships with roles, in membership order.
    async fn memberships(&self, email: &str) -> Result<Vec<Membership>, StorageError>;

    /// Create a group and add a member (admin seam for tests and the
    /// group management service).
    async fn add_membership(
        &self,
        group_id: &GroupId,
        group_name: &str,
        email: &str,
        role: GroupRole,
    ) -> Result<(), StorageError>;
}

#[derive(Clone)]
pub struct SqlUserGroupRepository {
    db: Db,
}

impl SqlUserGroupRepository {
    pub fn new(db: Db) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserGroupRepository for SqlUserGroupRepository {
    async fn get_or_create_user(&self, email: &str) -> Result<UserRecord, StorageError> {
        sqlx::query("INSERT OR IGNORE INTO users (email, created_at) VALUES (?, ?)")
            .bind(email)
            .bind(chrono::Utc::now())
            .execute(self.db.pool())
            .await?;

        let row = sqlx::query("SELECT id, email FROM users WHERE email = ?")
            .bind(email)
            .fetch_one(self.db.pool())
            .await?;
        Ok(UserRecord { id: row.try_get("id")?, email: row.try_get("email")? })
    }

    async fn memberships(&self, email: &str) -> Result<Vec<Membership>, StorageError> {
        let rows = sqlx::query(
            "SELECT group_id, role FROM group_memberships WHERE user_email = ? ORDER BY rowid ASC",
        )
        .bind(email)
        .fetch_all(self.db.pool())
        .await?;

        rows.iter()
            .map(|row| {
                let role_text: String = row.try_get("role")?;
                let role = GroupRole::parse(&role_text).ok_or_else(|| {
                    StorageError::CorruptRow(format!("unknown role {role_text:?}"))
                })?;
                Ok(Membership {
                    group_id: GroupId::new(row.try_get::<String, _>("group_id")?),
                    role,
                })
            })
            .collect()
    }

    async fn add_membership(
        &self,
        group_id: &GroupId,
        group_name: &str,
        email: &str,
        role: GroupRole,
    ) -> Result<(), StorageError> {
        sqlx::query("INSERT OR IGNORE INTO groups (id, name) VALUES (?, ?)")
            .bind(group_id.as_str())
            .bind(group_name)
            .execute(self.db.pool())
            .await?;
        sqlx::query(
            "INSERT OR REPLACE INTO group_memberships (group_id, user_email, role) VALUES (?, ?, ?)",
        )
        .bind(group_id.as_str())
        .bind(email)
        .bind(role.to_string())
        .execute(self.db.pool())
        .await?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "groups_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Storage errors and their mapping onto the core taxonomy.

use kasal_core::CoreError;
use thiserror::Error;

/// Errors from repository operations.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// A read or delete was issued without any group IDs. This is a bug
    /// in the caller, never a user condition.
    #[error("repository call without a group filter")]
    MissingGroupFilter,

    #[error("duplicate key: {0}")]
    Duplicate(String),

    #[error("corrupt row: {0}")]
    CorruptRow(String),
}

impl StorageError {
    /// Whether the underlying sqlx error is a unique-constraint breach.
    pub fn is_duplicate(&self) -> bool {
        match self {
            StorageError::Duplicate(_) => true,
            StorageError::Sqlx(sqlx::Error::Database(db)) => db.is_unique_violation(),
            _ => false,
        }
    }
}

impl From<StorageError> for CoreError {
    fn from(err: StorageError) -> Self {
        match &err {
            StorageError::MissingGroupFilter => CoreError::security(err.to_string()),
            StorageError::Duplicate(_) => CoreError::already_exists(err.to_string()),
            _ if err.is_duplicate() => CoreError::already_exists(err.to_string()),
            _ => CoreError::internal(err.to_string()),
        }
    }
}

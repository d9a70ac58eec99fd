// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Database handle and schema bootstrap.
//!
//! Schema migration tooling lives outside the core; `ensure_schema`
//! creates the tables idempotently so fresh databases (and the
//! in-memory test database) are usable immediately.

use crate::error::StorageError;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

/// Pooled database handle shared by the repositories.
#[derive(Clone)]
pub struct Db {
    pool: SqlitePool,
}

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS executions (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        job_id TEXT NOT NULL,
        group_id TEXT NOT NULL,
        group_email TEXT NOT NULL,
        status TEXT NOT NULL,
        created_at TEXT NOT NULL,
        started_at TEXT,
        completed_at TEXT,
        is_stopping INTEGER NOT NULL DEFAULT 0,
        stop_reason TEXT,
        inputs TEXT NOT NULL,
        result TEXT,
        error TEXT,
        partial_results TEXT,
        run_name TEXT NOT NULL,
        created_by_email TEXT,
        trigger_type TEXT NOT NULL DEFAULT 'api',
        execution_type TEXT NOT NULL DEFAULT 'crew',
        UNIQUE (group_id, job_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS execution_trace (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        job_id TEXT NOT NULL,
        event_source TEXT NOT NULL,
        event_context TEXT NOT NULL,
        event_type TEXT NOT NULL,
        output TEXT NOT NULL,
        trace_metadata TEXT,
        group_id TEXT NOT NULL,
        group_email TEXT NOT NULL,
        created_at TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_execution_trace_job ON execution_trace (job_id)",
    r#"
    CREATE TABLE IF NOT EXISTS execution_logs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        execution_id TEXT NOT NULL,
        content TEXT NOT NULL,
        timestamp TEXT NOT NULL,
        group_id TEXT NOT NULL,
        group_email TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_execution_logs_execution ON execution_logs (execution_id)",
    r#"
    CREATE TABLE IF NOT EXISTS users (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        email TEXT NOT NULL UNIQUE,
        created_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS groups (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS group_memberships (
        group_id TEXT NOT NULL,
        user_email TEXT NOT NULL,
        role TEXT NOT NULL,
        PRIMARY KEY (group_id, user_email)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS tools (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        group_id TEXT NOT NULL,
        enabled INTEGER NOT NULL DEFAULT 1,
        config TEXT,
        UNIQUE (group_id, name)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS engine_config (
        engine TEXT NOT NULL,
        config_key TEXT NOT NULL,
        config_value TEXT NOT NULL,
        PRIMARY KEY (engine, config_key)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS memory_backend_config (
        group_id TEXT PRIMARY KEY,
        active INTEGER NOT NULL DEFAULT 1,
        config TEXT NOT NULL
    )
    "#,
];

impl Db {
    /// Connect to a database URL (e.g. `sqlite:/var/lib/kasal/core.db`).
    pub async fn connect(url: &str) -> Result<Self, StorageError> {
        let pool = SqlitePoolOptions::new().max_connections(8).connect(url).await?;
        Ok(Self { pool })
    }

    /// A private in-memory database for tests.
    ///
    /// Capped at one connection: every connection to `:memory:` is a
    /// different database.
    pub async fn in_memory() -> Result<Self, StorageError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        let db = Self { pool };
        db.ensure_schema().await?;
        Ok(db)
    }

    /// Idempotently create all tables.
    pub async fn ensure_schema(&self) -> Result<(), StorageError> {
        for ddl in SCHEMA {
            sqlx::query(ddl).execute(&self.pool).await?;
        }
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Build a `?,?,...` placeholder list for an `IN` clause.
pub(crate) fn placeholders(n: usize) -> String {
    let mut s = String::with_capacity(n * 2);
    for i in 0..n {
        if i > 0 {
            s.push(',');
        }
        s.push('?');
    }
    s
}

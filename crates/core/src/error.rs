// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error taxonomy shared across the execution core.
//!
//! The API layer maps `NotFound`, `Forbidden`, `InvalidConfig` and
//! `Overloaded` to distinct responses; everything else surfaces as a
//! 5xx with the job marked failed.

use thiserror::Error;

/// Category of a core failure, independent of where it was raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Unknown job_id or missing config.
    NotFound,
    /// Requested group is not one of the user's memberships.
    Forbidden,
    /// A repository call was issued without a tenant filter, or a row
    /// crossed a tenant boundary.
    SecurityViolation,
    /// Malformed crew/flow configuration.
    InvalidConfig,
    /// Status store rejected a lifecycle transition.
    InvalidTransition,
    /// Duplicate (group_id, job_id).
    AlreadyExists,
    /// Process pool at capacity.
    Overloaded,
    /// Job exceeded its timeout.
    Timeout,
    /// LLM / tool / storage backend returned an error.
    Upstream,
    /// Writer or builder crashed.
    Internal,
}

crate::simple_display! {
    ErrorKind {
        NotFound => "not_found",
        Forbidden => "forbidden",
        SecurityViolation => "security_violation",
        InvalidConfig => "invalid_config",
        InvalidTransition => "invalid_transition",
        AlreadyExists => "already_exists",
        Overloaded => "overloaded",
        Timeout => "timeout",
        Upstream => "upstream",
        Internal => "internal",
    }
}

/// A categorized core error with a human-readable message.
#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct CoreError {
    kind: ErrorKind,
    message: String,
}

impl CoreError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Forbidden, message)
    }

    pub fn security(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::SecurityViolation, message)
    }

    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidConfig, message)
    }

    pub fn invalid_transition(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidTransition, message)
    }

    pub fn already_exists(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::AlreadyExists, message)
    }

    pub fn overloaded(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Overloaded, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    pub fn upstream(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Upstream, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Whether the execution should end up `failed` rather than be
    /// rejected before it started.
    pub fn fails_execution(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::Timeout | ErrorKind::Upstream | ErrorKind::Internal
        )
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Core runtime settings.
//!
//! Loaded once at service startup from TOML (with environment
//! overrides for the knobs deployments actually tune) and passed by
//! value into the components that need them.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// What the trace writer does with an event whose job row does not
/// exist yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode")]
pub enum OrphanPolicy {
    /// Re-check for the parent row a bounded number of times before
    /// dropping the event. Default: the parent insert usually commits
    /// within one poll interval.
    WaitRetry { attempts: u32 },
    /// Create a minimal running execution row under the event's group.
    /// Matches the historical behavior; accepts events with no
    /// client-visible parent.
    AutoCreate,
}

impl Default for OrphanPolicy {
    fn default() -> Self {
        OrphanPolicy::WaitRetry { attempts: 3 }
    }
}

fn default_max_concurrent() -> usize {
    4
}

fn default_queue_capacity() -> usize {
    1000
}

fn default_trace_batch_size() -> usize {
    10
}

fn default_trace_poll_ms() -> u64 {
    100
}

fn default_grace_secs() -> u64 {
    5
}

fn default_timeout_secs() -> u64 {
    3600
}

/// Settings for the execution core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreSettings {
    /// Cap on concurrently live worker processes.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    /// Bounded capacity of the trace queue; producers drop on overflow.
    #[serde(default = "default_queue_capacity")]
    pub trace_queue_capacity: usize,
    /// Bounded capacity of the log queue; producers drop on overflow.
    #[serde(default = "default_queue_capacity")]
    pub log_queue_capacity: usize,
    /// Maximum trace events written per writer iteration.
    #[serde(default = "default_trace_batch_size")]
    pub trace_batch_size: usize,
    /// Writer poll timeout in milliseconds.
    #[serde(default = "default_trace_poll_ms")]
    pub trace_poll_ms: u64,
    /// Grace window between SIGTERM and SIGKILL.
    #[serde(default = "default_grace_secs")]
    pub termination_grace_secs: u64,
    /// Default job timeout when the submission does not carry one.
    #[serde(default = "default_timeout_secs")]
    pub default_timeout_secs: u64,
    #[serde(default)]
    pub orphan_policy: OrphanPolicy,
    /// Fallback for the engine debug-tracing flag when no config row
    /// exists.
    #[serde(default)]
    pub debug_tracing: bool,
    /// Command line used to spawn worker processes. The embedding binary
    /// exposes the worker entry point; empty means "current executable,
    /// `worker` subcommand".
    #[serde(default)]
    pub worker_command: Vec<String>,
    /// Base directory for per-crew memory storage.
    #[serde(default = "default_memory_dir")]
    pub memory_dir: PathBuf,
    /// Base directory for per-crew log files written by workers.
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
}

fn default_memory_dir() -> PathBuf {
    PathBuf::from("/tmp/kasal/memory")
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("/tmp/kasal/logs")
}

impl Default for CoreSettings {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            trace_queue_capacity: default_queue_capacity(),
            log_queue_capacity: default_queue_capacity(),
            trace_batch_size: default_trace_batch_size(),
            trace_poll_ms: default_trace_poll_ms(),
            termination_grace_secs: default_grace_secs(),
            default_timeout_secs: default_timeout_secs(),
            orphan_policy: OrphanPolicy::default(),
            debug_tracing: false,
            worker_command: Vec::new(),
            memory_dir: default_memory_dir(),
            log_dir: default_log_dir(),
        }
    }
}

impl CoreSettings {
    /// Parse settings from a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }

    /// Apply environment overrides for the commonly tuned knobs.
    pub fn apply_env(mut self) -> Self {
        if let Some(n) = env_usize("KASAL_MAX_CONCURRENT") {
            self.max_concurrent = n;
        }
        if let Some(n) = env_usize("KASAL_TRACE_QUEUE_CAPACITY") {
            self.trace_queue_capacity = n;
        }
        if let Ok(v) = std::env::var("KASAL_DEBUG_TRACING") {
            self.debug_tracing = matches!(v.as_str(), "1" | "true" | "yes");
        }
        self
    }

    pub fn trace_poll_interval(&self) -> Duration {
        Duration::from_millis(self.trace_poll_ms)
    }

    pub fn termination_grace(&self) -> Duration {
        Duration::from_secs(self.termination_grace_secs)
    }

    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.default_timeout_secs)
    }
}

fn env_usize(key: &str) -> Option<usize> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

/// Kind of memory backend a group has configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MemoryBackendType {
    /// Library-default local storage, optionally with a custom embedder.
    #[default]
    Default,
    /// Databricks Vector Search collections.
    Databricks,
}

crate::simple_display! {
    MemoryBackendType {
        Default => "default",
        Databricks => "databricks",
    }
}

/// A group's active memory backend configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct MemoryBackendConfig {
    pub backend_type: MemoryBackendType,
    #[serde(default)]
    pub enable_short_term: bool,
    #[serde(default)]
    pub enable_long_term: bool,
    #[serde(default)]
    pub enable_entity: bool,
    /// Custom embedder configuration for the default backend.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedder: Option<serde_json::Value>,
    /// Vector Search endpoint for the Databricks backend.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

impl MemoryBackendConfig {
    /// The explicit "disabled" profile: a config row exists but every
    /// memory type is off. Treated as "attach nothing, let the library
    /// default apply".
    pub fn is_disabled_profile(&self) -> bool {
        !self.enable_short_term && !self.enable_long_term && !self.enable_entity
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;

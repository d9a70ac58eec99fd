// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! LLM manager contract: resolve a model name into a bound client
//! configuration.
//!
//! The chat/embedding clients themselves live outside the core; what
//! crosses this seam is the [`LlmBinding`] the orchestration library
//! needs to construct one. The GPT-5 family takes a different parameter
//! wrapper, applied in [`LlmBinding::normalized`].

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("unknown model: {0}")]
    UnknownModel(String),
    #[error("model resolution failed: {0}")]
    Resolution(String),
}

/// Parameters for constructing a chat client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct LlmBinding {
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    /// 0–1 scale (agent configs carry 0–100; the builder divides).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_base: Option<String>,
    /// Name of the environment variable carrying the key; never the key
    /// itself.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// GPT-5 wrapper field; populated by `normalized`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_completion_tokens: Option<u32>,
}

/// Whether a model belongs to the GPT-5 family (with or without a
/// provider prefix).
pub fn is_gpt5_family(model: &str) -> bool {
    let bare = model.rsplit('/').next().unwrap_or(model);
    bare.starts_with("gpt-5")
}

impl LlmBinding {
    pub fn new(model: impl Into<String>) -> Self {
        Self { model: model.into(), ..Default::default() }
    }

    /// Apply the family-specific parameter wrapper.
    ///
    /// GPT-5 models reject `max_tokens` (use `max_completion_tokens`)
    /// and only accept the default temperature.
    pub fn normalized(mut self) -> Self {
        if is_gpt5_family(&self.model) {
            if let Some(max) = self.max_tokens.take() {
                self.max_completion_tokens = Some(max);
            }
            self.temperature = Some(1.0);
        }
        self
    }
}

/// Resolve model name → bound client configuration.
#[async_trait]
pub trait LlmManager: Send + Sync + 'static {
    /// `temperature` is on the resolved 0–1 scale.
    async fn configure(
        &self,
        model: &str,
        temperature: Option<f64>,
    ) -> Result<LlmBinding, LlmError>;
}

/// Table-driven manager: bindings registered at startup from the model
/// config, falling back to a bare binding for unknown names.
#[derive(Default)]
pub struct StaticLlmManager {
    models: RwLock<HashMap<String, LlmBinding>>,
    /// When true, unknown model names resolve to a bare binding instead
    /// of failing; the engine surface decides whether to accept it.
    pub allow_unregistered: bool,
}

impl StaticLlmManager {
    pub fn new() -> Self {
        Self { models: RwLock::new(HashMap::new()), allow_unregistered: true }
    }

    pub fn register(&self, name: impl Into<String>, binding: LlmBinding) {
        self.models.write().insert(name.into(), binding);
    }
}

#[async_trait]
impl LlmManager for StaticLlmManager {
    async fn configure(
        &self,
        model: &str,
        temperature: Option<f64>,
    ) -> Result<LlmBinding, LlmError> {
        let mut binding = match self.models.read().get(model) {
            Some(binding) => binding.clone(),
            None if self.allow_unregistered => LlmBinding::new(model),
            None => return Err(LlmError::UnknownModel(model.to_string())),
        };
        if temperature.is_some() {
            binding.temperature = temperature;
        }
        Ok(binding.normalized())
    }
}

#[cfg(test)]
#[path = "llm_tests.rs"]
mod tests;

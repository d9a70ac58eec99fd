// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[parameterized(
    plain = { "gpt-5", true },
    mini = { "gpt-5-mini", true },
    prefixed = { "openai/gpt-5-nano", true },
    gpt4 = { "gpt-4o", false },
    claude = { "databricks/claude-sonnet", false },
)]
fn gpt5_family_detection(model: &str, expected: bool) {
    assert_eq!(is_gpt5_family(model), expected);
}

#[test]
fn gpt5_normalization_moves_max_tokens() {
    let binding = LlmBinding {
        model: "gpt-5-mini".into(),
        max_tokens: Some(4096),
        temperature: Some(0.2),
        ..Default::default()
    }
    .normalized();

    assert_eq!(binding.max_tokens, None);
    assert_eq!(binding.max_completion_tokens, Some(4096));
    // GPT-5 only accepts the default temperature.
    assert_eq!(binding.temperature, Some(1.0));
}

#[test]
fn non_gpt5_normalization_is_identity() {
    let binding = LlmBinding {
        model: "gpt-4o".into(),
        max_tokens: Some(4096),
        temperature: Some(0.2),
        ..Default::default()
    };
    assert_eq!(binding.clone().normalized(), binding);
}

#[tokio::test]
async fn configure_uses_registered_binding() {
    let manager = StaticLlmManager::new();
    manager.register(
        "gpt-4o",
        LlmBinding {
            model: "gpt-4o".into(),
            provider: Some("openai".into()),
            api_key_env: Some("OPENAI_API_KEY".into()),
            ..Default::default()
        },
    );

    let binding = manager.configure("gpt-4o", Some(0.55)).await.unwrap();
    assert_eq!(binding.provider.as_deref(), Some("openai"));
    assert_eq!(binding.temperature, Some(0.55));
}

#[tokio::test]
async fn configure_unregistered_falls_back_when_allowed() {
    let manager = StaticLlmManager::new();
    let binding = manager.configure("some-new-model", None).await.unwrap();
    assert_eq!(binding.model, "some-new-model");
    assert_eq!(binding.temperature, None);
}

#[tokio::test]
async fn configure_unregistered_fails_when_strict() {
    let manager = StaticLlmManager { allow_unregistered: false, ..Default::default() };
    let err = manager.configure("mystery", None).await.unwrap_err();
    assert!(matches!(err, LlmError::UnknownModel(_)));
}

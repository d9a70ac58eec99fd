// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scripted crew engine for tests.

use super::{CrewEngine, CrewOutput, CrewPlan, EngineError, EngineEvent};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// A crew engine that walks the plan's tasks in order, emitting the
/// same event sequence the real library would, with scripted outcomes.
#[derive(Clone, Default)]
pub struct FakeCrewEngine {
    inner: Arc<Mutex<Script>>,
}

#[derive(Default)]
struct Script {
    /// Delay before each task completes.
    task_delay: Duration,
    /// Task keys that fail, with their error text.
    failing_tasks: HashMap<String, String>,
    /// Extra scripted events emitted after the tasks, before completion.
    extra_events: Vec<EngineEvent>,
    /// Fail kickoff before any task runs.
    kickoff_error: Option<String>,
    /// Plans seen by `kickoff`, for assertions.
    kickoffs: Vec<CrewPlan>,
}

impl FakeCrewEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_task_delay(self, delay: Duration) -> Self {
        self.inner.lock().task_delay = delay;
        self
    }

    pub fn failing_task(self, task_key: impl Into<String>, error: impl Into<String>) -> Self {
        self.inner.lock().failing_tasks.insert(task_key.into(), error.into());
        self
    }

    pub fn with_event(self, event: EngineEvent) -> Self {
        self.inner.lock().extra_events.push(event);
        self
    }

    pub fn failing_kickoff(self, error: impl Into<String>) -> Self {
        self.inner.lock().kickoff_error = Some(error.into());
        self
    }

    /// Plans that were kicked off, for assertions.
    pub fn kickoffs(&self) -> Vec<CrewPlan> {
        self.inner.lock().kickoffs.clone()
    }
}

#[async_trait]
impl CrewEngine for FakeCrewEngine {
    async fn kickoff(
        &self,
        plan: CrewPlan,
        events: mpsc::Sender<EngineEvent>,
        cancel: CancellationToken,
    ) -> Result<CrewOutput, EngineError> {
        let (delay, failing, extra, kickoff_error) = {
            let mut script = self.inner.lock();
            script.kickoffs.push(plan.clone());
            (
                script.task_delay,
                script.failing_tasks.clone(),
                script.extra_events.clone(),
                script.kickoff_error.clone(),
            )
        };

        if let Some(error) = kickoff_error {
            return Err(EngineError::Upstream(error));
        }

        let _ = events.send(EngineEvent::CrewStarted { crew_name: plan.name.clone() }).await;

        let mut completed: Vec<Value> = Vec::new();
        for task in &plan.tasks {
            let _ = events
                .send(EngineEvent::TaskStarted {
                    task_id: task.key.clone(),
                    task_name: task.name.clone(),
                    description: task.description.clone(),
                })
                .await;

            if !delay.is_zero() {
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = cancel.cancelled() => {
                        return Err(EngineError::Cancelled {
                            partial: Some(json!({"tasks_completed": completed})),
                        });
                    }
                }
            } else if cancel.is_cancelled() {
                return Err(EngineError::Cancelled {
                    partial: Some(json!({"tasks_completed": completed})),
                });
            }

            if let Some(error) = failing.get(&task.key) {
                let _ = events
                    .send(EngineEvent::TaskFailed {
                        task_id: task.key.clone(),
                        task_name: task.name.clone(),
                        error: error.clone(),
                    })
                    .await;
                return Err(EngineError::Upstream(error.clone()));
            }

            let output = format!("output of {}", task.name);
            let _ = events
                .send(EngineEvent::TaskCompleted {
                    task_id: task.key.clone(),
                    task_name: task.name.clone(),
                    output: output.clone(),
                })
                .await;
            if let Some(agent_key) = &task.agent_key {
                if let Some(agent) = plan.agents.iter().find(|a| a.key == *agent_key) {
                    let _ = events
                        .send(EngineEvent::AgentExecution {
                            role: agent.role.clone(),
                            output: output.clone(),
                        })
                        .await;
                }
            }
            completed.push(json!({"task": task.key, "output": output}));
        }

        for event in extra {
            let _ = events.send(event).await;
        }

        let content = json!({"tasks": completed});
        let _ = events
            .send(EngineEvent::CrewCompleted {
                crew_name: plan.name.clone(),
                output: content.clone(),
            })
            .await;

        Ok(CrewOutput { content, token_usage: Some(json!({"total_tokens": 128})) })
    }
}

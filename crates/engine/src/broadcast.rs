// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! WebSocket broadcast table.
//!
//! Maps `job_id → subscribers`. Subscription is rejected unless the job
//! is visible to the subscriber's group. Broadcasts are fire-and-forget:
//! a sink that fails to accept a frame is removed silently, and no
//! backpressure ever reaches a producer.

use async_trait::async_trait;
use kasal_core::{CoreError, GroupContext, JobId, LogLine, TraceEvent};
use kasal_storage::ExecutionRepository;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

/// One subscriber connection.
#[async_trait]
pub trait FrameSink: Send + Sync {
    /// Deliver a frame; `false` means the sink is dead and should be
    /// dropped from the table.
    async fn send(&self, frame: &Value) -> bool;
}

/// Channel-backed sink: what the router layer bridges actual sockets
/// through, and what tests subscribe with.
#[async_trait]
impl FrameSink for mpsc::Sender<Value> {
    async fn send(&self, frame: &Value) -> bool {
        mpsc::Sender::send(self, frame.clone()).await.is_ok()
    }
}

/// Process-wide subscription table.
#[derive(Default)]
pub struct Broadcaster {
    subscribers: Mutex<HashMap<JobId, Vec<Arc<dyn FrameSink>>>>,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe a sink to a job's frames.
    ///
    /// Fails with `NotFound` unless the job exists within the
    /// subscriber's groups: a cross-tenant job id is indistinguishable
    /// from an absent one.
    pub async fn subscribe(
        &self,
        job_id: &JobId,
        ctx: &GroupContext,
        executions: &dyn ExecutionRepository,
        sink: Arc<dyn FrameSink>,
    ) -> Result<(), CoreError> {
        let execution = executions
            .get(ctx.group_ids(), job_id)
            .await
            .map_err(CoreError::from)?;
        if execution.is_none() {
            return Err(CoreError::not_found(format!("execution {job_id}")));
        }
        self.subscribers.lock().entry(job_id.clone()).or_default().push(sink);
        Ok(())
    }

    /// Number of live subscribers for a job.
    pub fn subscriber_count(&self, job_id: &JobId) -> usize {
        self.subscribers.lock().get(job_id).map_or(0, Vec::len)
    }

    /// Drop all subscribers of a job (terminal cleanup).
    pub fn remove_job(&self, job_id: &JobId) {
        self.subscribers.lock().remove(job_id);
    }

    /// Fan a frame out to every subscriber of the job. Dead sinks are
    /// pruned; producers never block on a slow consumer.
    pub async fn broadcast(&self, job_id: &JobId, frame: Value) {
        let sinks = match self.subscribers.lock().get(job_id) {
            Some(sinks) if !sinks.is_empty() => sinks.clone(),
            _ => return,
        };

        let mut dead = Vec::new();
        for (idx, sink) in sinks.iter().enumerate() {
            if !sink.send(&frame).await {
                dead.push(idx);
            }
        }

        if !dead.is_empty() {
            let mut table = self.subscribers.lock();
            if let Some(live) = table.get_mut(job_id) {
                let mut idx = 0usize;
                live.retain(|_| {
                    let drop_it = dead.contains(&idx);
                    idx += 1;
                    !drop_it
                });
            }
        }
    }
}

/// Frame constructors for the wire shapes the frontend consumes.
pub mod frames {
    use super::*;

    /// `{type: "task_status_update", ...}` for task lifecycle events.
    pub fn task_status(event: &TraceEvent) -> Value {
        json!({
            "type": "task_status_update",
            "event_type": event.event_type.to_string(),
            "task_id": event.task_id,
            "task_name": event.event_context,
            "timestamp": event.created_at,
            "output": event.output,
        })
    }

    /// `{type: "log", execution_id, entries: [...]}` for buffered lines.
    pub fn log_batch(job_id: &JobId, entries: &[LogLine]) -> Value {
        json!({
            "type": "log",
            "execution_id": job_id.as_str(),
            "entries": entries
                .iter()
                .map(|l| json!({"content": l.content, "timestamp": l.timestamp}))
                .collect::<Vec<_>>(),
        })
    }

    /// `{type: "execution_complete", ...}` terminal frame.
    pub fn terminal(job_id: &JobId, status: kasal_core::ExecutionStatus, error: Option<&str>) -> Value {
        let mut frame = json!({
            "type": "execution_complete",
            "execution_id": job_id.as_str(),
            "status": status.to_string(),
        });
        if let Some(error) = error {
            frame["error"] = json!(error);
        }
        frame
    }
}

/// WebSocket sink over a tungstenite stream, for the router layer.
#[cfg(feature = "ws")]
pub mod ws {
    use super::FrameSink;
    use async_trait::async_trait;
    use futures_util::stream::SplitSink;
    use futures_util::SinkExt;
    use serde_json::Value;
    use tokio::io::{AsyncRead, AsyncWrite};
    use tokio::sync::Mutex;
    use tokio_tungstenite::tungstenite::Message;
    use tokio_tungstenite::WebSocketStream;

    /// Write half of an accepted WebSocket connection.
    pub struct WsSink<S> {
        sink: Mutex<SplitSink<WebSocketStream<S>, Message>>,
    }

    impl<S> WsSink<S> {
        pub fn new(sink: SplitSink<WebSocketStream<S>, Message>) -> Self {
            Self { sink: Mutex::new(sink) }
        }
    }

    #[async_trait]
    impl<S> FrameSink for WsSink<S>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + Sync,
    {
        async fn send(&self, frame: &Value) -> bool {
            let text = frame.to_string();
            self.sink.lock().await.send(Message::text(text)).await.is_ok()
        }
    }
}

#[cfg(test)]
#[path = "broadcast_tests.rs"]
mod tests;

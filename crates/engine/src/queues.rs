// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bounded in-process queues feeding the background writers.
//!
//! Publishing never blocks and never back-pressures the executor: on a
//! full queue the item is dropped and a counter incremented. Traces and
//! logs are best-effort observability, not state.

use kasal_core::{EventType, LogLine, TraceEvent};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Non-blocking bounded publisher handle.
pub struct QueueSender<T> {
    tx: mpsc::Sender<T>,
    dropped: Arc<AtomicU64>,
    what: &'static str,
}

impl<T> Clone for QueueSender<T> {
    fn clone(&self) -> Self {
        Self { tx: self.tx.clone(), dropped: self.dropped.clone(), what: self.what }
    }
}

impl<T> QueueSender<T> {
    fn bounded(capacity: usize, what: &'static str) -> (Self, mpsc::Receiver<T>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx, dropped: Arc::new(AtomicU64::new(0)), what }, rx)
    }

    /// Enqueue without blocking; drops (and counts) on overflow or
    /// after the writer shut down.
    pub fn publish(&self, item: T) {
        if let Err(e) = self.tx.try_send(item) {
            let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            match e {
                mpsc::error::TrySendError::Full(_) => {
                    tracing::warn!(queue = self.what, dropped, "queue full, dropping item");
                }
                mpsc::error::TrySendError::Closed(_) => {
                    tracing::debug!(queue = self.what, dropped, "queue closed, dropping item");
                }
            }
        }
    }

    /// Items dropped since creation.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Publisher for structured trace events.
pub type TraceQueue = QueueSender<TraceEvent>;

/// Publisher for unstructured worker log lines.
pub type LogQueue = QueueSender<LogLine>;

/// Create the trace queue and its writer-side receiver.
pub fn trace_queue(capacity: usize) -> (TraceQueue, mpsc::Receiver<TraceEvent>) {
    QueueSender::bounded(capacity, "trace")
}

/// Create the log queue and its writer-side receiver.
pub fn log_queue(capacity: usize) -> (LogQueue, mpsc::Receiver<LogLine>) {
    QueueSender::bounded(capacity, "log")
}

impl TraceQueue {
    /// Ingest an untyped event from outside the process boundary.
    ///
    /// This is the closed-vocabulary gate: values whose `event_type` is
    /// not in the vocabulary are dropped here and never reach the
    /// writer.
    pub fn publish_raw(&self, raw: serde_json::Value) {
        let event_type = raw.get("event_type").and_then(|v| v.as_str()).unwrap_or_default();
        if EventType::parse(event_type).is_none() {
            tracing::debug!(event_type, "dropping event outside the vocabulary");
            return;
        }
        match serde_json::from_value::<TraceEvent>(raw) {
            Ok(event) => self.publish(event),
            Err(e) => tracing::debug!(error = %e, "dropping malformed trace event"),
        }
    }
}

#[cfg(test)]
#[path = "queues_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Background trace writer.
//!
//! Single consumer of the trace queue. Each iteration pulls a small
//! batch, verifies parent jobs (caching confirmations for its
//! lifetime), applies the debug-event filter against the engine config
//! flag (fetched once), broadcasts task lifecycle frames, and persists
//! the batch in one transaction. Failures are logged and skipped:
//! traces are never retried indefinitely and never back-pressure the
//! executor. On shutdown the queue is drained to empty before exit.

use crate::broadcast::{frames, Broadcaster};
use kasal_core::{
    Clock, CoreSettings, Execution, ExecutionStatus, OrphanPolicy, SystemClock, TraceEvent,
};
use kasal_storage::{EngineConfigRepository, ExecutionRepository, TraceRepository};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub struct TraceWriter<C: Clock = SystemClock> {
    executions: Arc<dyn ExecutionRepository>,
    traces: Arc<dyn TraceRepository>,
    engine_config: Arc<dyn EngineConfigRepository>,
    broadcaster: Arc<Broadcaster>,
    batch_size: usize,
    poll: Duration,
    orphan_policy: OrphanPolicy,
    debug_default: bool,
    clock: C,
}

impl<C: Clock + 'static> TraceWriter<C> {
    pub fn new(
        executions: Arc<dyn ExecutionRepository>,
        traces: Arc<dyn TraceRepository>,
        engine_config: Arc<dyn EngineConfigRepository>,
        broadcaster: Arc<Broadcaster>,
        settings: &CoreSettings,
        clock: C,
    ) -> Self {
        Self {
            executions,
            traces,
            engine_config,
            broadcaster,
            batch_size: settings.trace_batch_size.max(1),
            poll: settings.trace_poll_interval(),
            orphan_policy: settings.orphan_policy,
            debug_default: settings.debug_tracing,
            clock,
        }
    }

    /// Spawn the writer loop. It exits once `shutdown` fires and the
    /// queue has been drained, or when every producer handle is gone.
    pub fn spawn(
        self,
        rx: mpsc::Receiver<TraceEvent>,
        shutdown: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run(rx, shutdown))
    }

    async fn run(
        self,
        mut rx: mpsc::Receiver<TraceEvent>,
        shutdown: CancellationToken,
    ) {
        tracing::info!("trace writer started");
        let mut confirmed: HashSet<kasal_core::JobId> = HashSet::new();
        // The debug-tracing flag is fetched once per writer lifetime.
        let mut debug_enabled: Option<bool> = None;
        let mut batches: u64 = 0;
        let mut written: u64 = 0;

        loop {
            let mut batch = Vec::with_capacity(self.batch_size);

            tokio::select! {
                _ = shutdown.cancelled() => {
                    // Drain whatever made it into the queue before the
                    // shutdown signal, then exit.
                    while let Ok(event) = rx.try_recv() {
                        batch.push(event);
                        if batch.len() >= self.batch_size {
                            written += self
                                .process_batch(std::mem::take(&mut batch), &mut confirmed, &mut debug_enabled)
                                .await;
                        }
                    }
                    written += self.process_batch(batch, &mut confirmed, &mut debug_enabled).await;
                    break;
                }
                first = rx.recv() => {
                    match first {
                        Some(event) => batch.push(event),
                        None => break,
                    }
                }
            }

            // Top the batch up within one poll interval.
            while batch.len() < self.batch_size {
                match tokio::time::timeout(self.poll, rx.recv()).await {
                    Ok(Some(event)) => batch.push(event),
                    Ok(None) | Err(_) => break,
                }
            }

            batches += 1;
            written += self.process_batch(batch, &mut confirmed, &mut debug_enabled).await;
        }

        tracing::info!(batches, written, "trace writer stopped");
    }

    /// Returns the number of events persisted.
    async fn process_batch(
        &self,
        batch: Vec<TraceEvent>,
        confirmed: &mut HashSet<kasal_core::JobId>,
        debug_enabled: &mut Option<bool>,
    ) -> u64 {
        if batch.is_empty() {
            return 0;
        }

        let mut accepted = Vec::with_capacity(batch.len());
        for event in batch {
            if event.job_id.is_empty() {
                tracing::warn!("skipping trace with empty job_id");
                continue;
            }

            if event.event_type.is_debug_only() {
                let enabled = match *debug_enabled {
                    Some(enabled) => enabled,
                    None => {
                        let enabled = match self.engine_config.debug_tracing().await {
                            Ok(flag) => flag.unwrap_or(self.debug_default),
                            Err(e) => {
                                tracing::debug!(error = %e, "debug tracing flag unavailable, using default");
                                self.debug_default
                            }
                        };
                        *debug_enabled = Some(enabled);
                        enabled
                    }
                };
                if !enabled {
                    continue;
                }
            }

            if !confirmed.contains(&event.job_id) {
                if self.confirm_job(&event).await {
                    confirmed.insert(event.job_id.clone());
                } else {
                    tracing::warn!(
                        job_id = %event.job_id,
                        event_type = %event.event_type,
                        "dropping trace for unknown job"
                    );
                    continue;
                }
            }

            if event.event_type.is_task_event() {
                self.broadcaster
                    .broadcast(&event.job_id, frames::task_status(&event))
                    .await;
            }

            accepted.push(event);
        }

        if accepted.is_empty() {
            return 0;
        }
        match self.traces.insert_batch(&accepted).await {
            Ok(n) => n as u64,
            Err(e) => {
                tracing::error!(error = %e, count = accepted.len(), "failed to store trace batch");
                0
            }
        }
    }

    /// Verify the event's parent job exists under the event's group.
    async fn confirm_job(&self, event: &TraceEvent) -> bool {
        let group = std::slice::from_ref(&event.group_id);
        match self.executions.get(group, &event.job_id).await {
            Ok(Some(_)) => return true,
            Ok(None) => {}
            Err(e) => {
                tracing::error!(job_id = %event.job_id, error = %e, "job lookup failed");
                return false;
            }
        }

        match self.orphan_policy {
            OrphanPolicy::WaitRetry { attempts } => {
                // The parent insert usually commits within a poll
                // interval of the first worker event.
                for _ in 0..attempts {
                    tokio::time::sleep(self.poll).await;
                    match self.executions.get(group, &event.job_id).await {
                        Ok(Some(_)) => return true,
                        Ok(None) => {}
                        Err(e) => {
                            tracing::error!(job_id = %event.job_id, error = %e, "job lookup failed");
                            return false;
                        }
                    }
                }
                false
            }
            OrphanPolicy::AutoCreate => {
                let placeholder = Execution {
                    id: None,
                    job_id: event.job_id.clone(),
                    group_id: event.group_id.clone(),
                    group_email: event.group_email.clone(),
                    status: ExecutionStatus::Running,
                    created_at: self.clock.timestamp_utc(),
                    started_at: Some(self.clock.timestamp_utc()),
                    completed_at: None,
                    is_stopping: false,
                    stop_reason: None,
                    inputs: serde_json::json!({"auto_created": true}),
                    result: None,
                    error: None,
                    partial_results: None,
                    run_name: format!("Auto-created for {}", event.event_type),
                    created_by_email: Some(event.group_email.clone()),
                    trigger_type: "api".to_string(),
                    execution_type: kasal_core::crew::ExecutionType::Crew,
                };
                match self.executions.insert(&placeholder).await {
                    Ok(_) => {
                        tracing::info!(job_id = %event.job_id, "auto-created execution for orphan trace");
                        true
                    }
                    // Lost the race with the real insert: fine.
                    Err(e) if e.is_duplicate() => true,
                    Err(e) => {
                        tracing::error!(job_id = %event.job_id, error = %e, "auto-create failed");
                        false
                    }
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "trace_writer_tests.rs"]
mod tests;

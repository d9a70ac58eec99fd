// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process pool: one freshly-spawned worker per job, bounded
//! concurrency, graceful and forced termination.
//!
//! The pool keeps per-job tables for the worker handle, its terminal
//! result future, and its frame forwarder into the shared trace and
//! log queues. Submissions over `max_concurrent` fail fast with
//! `Overloaded`; they never queue.

use crate::queues::{LogQueue, TraceQueue};
use kasal_core::{CoreError, JobId};
use kasal_adapters::{WorkerHandle, WorkerLauncher};
use kasal_wire::{Frame, WorkerInit, WorkerResult};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

/// Execution counters, mirrored into service health endpoints.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolMetrics {
    pub total_executions: u64,
    pub successful_executions: u64,
    pub failed_executions: u64,
    pub terminated_executions: u64,
}

/// How a waited-on job left the pool.
#[derive(Debug)]
pub enum PoolOutcome {
    /// The worker posted its terminal result.
    Result(WorkerResult),
    /// The job exceeded its timeout; the worker has been terminated.
    TimedOut,
    /// The worker died (or was killed) without posting a result.
    Died,
}

struct Entry {
    handle: Option<Arc<WorkerHandle>>,
    result: Option<oneshot::Receiver<WorkerResult>>,
    forwarder: Option<tokio::task::JoinHandle<()>>,
    terminating: Arc<AtomicBool>,
}

pub struct ProcessPool<L: WorkerLauncher> {
    launcher: Arc<L>,
    max_concurrent: usize,
    grace: Duration,
    active: Mutex<HashMap<JobId, Entry>>,
    metrics: Mutex<PoolMetrics>,
    trace_queue: TraceQueue,
    log_queue: LogQueue,
}

impl<L: WorkerLauncher> ProcessPool<L> {
    pub fn new(
        launcher: Arc<L>,
        max_concurrent: usize,
        grace: Duration,
        trace_queue: TraceQueue,
        log_queue: LogQueue,
    ) -> Self {
        Self {
            launcher,
            max_concurrent: max_concurrent.max(1),
            grace,
            active: Mutex::new(HashMap::new()),
            metrics: Mutex::new(PoolMetrics::default()),
            trace_queue,
            log_queue,
        }
    }

    pub fn metrics(&self) -> PoolMetrics {
        *self.metrics.lock()
    }

    /// Number of reserved or live workers.
    pub fn active_count(&self) -> usize {
        self.active.lock().len()
    }

    /// Reserve a slot for a job before its row is created, enforcing
    /// the concurrency cap atomically.
    pub fn reserve(&self, job_id: &JobId) -> Result<(), CoreError> {
        let mut active = self.active.lock();
        if active.contains_key(job_id) {
            return Err(CoreError::already_exists(format!("job {job_id} already submitted")));
        }
        if active.len() >= self.max_concurrent {
            return Err(CoreError::overloaded(format!(
                "pool at capacity ({} live workers)",
                self.max_concurrent
            )));
        }
        active.insert(
            job_id.clone(),
            Entry {
                handle: None,
                result: None,
                forwarder: None,
                terminating: Arc::new(AtomicBool::new(false)),
            },
        );
        Ok(())
    }

    /// Release a reservation (or a finished job's tables).
    pub fn release(&self, job_id: &JobId) {
        self.active.lock().remove(job_id);
    }

    /// Spawn the worker for a reserved job and start its frame
    /// forwarder.
    pub async fn start(&self, init: WorkerInit) -> Result<(), CoreError> {
        let job_id = init.job_id.clone();

        // Frames from the worker fan into the shared bounded queues;
        // the forwarder drains until the worker's streams close so no
        // late log line is lost.
        let (frames_tx, mut frames_rx) = mpsc::channel::<Frame>(256);
        let trace_queue = self.trace_queue.clone();
        let log_queue = self.log_queue.clone();
        let forwarder = tokio::spawn(async move {
            while let Some(frame) = frames_rx.recv().await {
                match frame {
                    Frame::Log(line) => log_queue.publish(line),
                    Frame::Trace(event) => trace_queue.publish(event),
                    // Results travel on the dedicated result future.
                    Frame::Result(_) => {}
                }
            }
        });

        let mut handle = match self.launcher.spawn(init, frames_tx).await {
            Ok(handle) => handle,
            Err(e) => {
                self.release(&job_id);
                forwarder.abort();
                self.metrics.lock().failed_executions += 1;
                return Err(CoreError::internal(format!("worker spawn failed: {e}")));
            }
        };
        let result = handle.take_result();

        let mut active = self.active.lock();
        match active.get_mut(&job_id) {
            Some(entry) => {
                entry.handle = Some(Arc::new(handle));
                entry.result = result;
                entry.forwarder = Some(forwarder);
                self.metrics.lock().total_executions += 1;
                Ok(())
            }
            None => {
                // Reservation vanished (released concurrently); tear the
                // worker down.
                drop(active);
                self.launcher.kill(&handle);
                forwarder.abort();
                Err(CoreError::internal(format!("job {job_id} was not reserved")))
            }
        }
    }

    /// Await the job's terminal result, enforcing its timeout. Always
    /// drains the frame forwarder before returning so no log is lost.
    pub async fn wait(&self, job_id: &JobId, timeout: Duration) -> Result<PoolOutcome, CoreError> {
        let (result_rx, terminating) = {
            let mut active = self.active.lock();
            let entry = active
                .get_mut(job_id)
                .ok_or_else(|| CoreError::not_found(format!("job {job_id} not in pool")))?;
            (
                entry.result.take().ok_or_else(|| {
                    CoreError::internal(format!("result future for {job_id} already taken"))
                })?,
                entry.terminating.clone(),
            )
        };

        let outcome = tokio::select! {
            result = result_rx => match result {
                Ok(result) => {
                    let mut metrics = self.metrics.lock();
                    if result.success {
                        metrics.successful_executions += 1;
                    } else {
                        metrics.failed_executions += 1;
                    }
                    PoolOutcome::Result(result)
                }
                Err(_) => {
                    if terminating.load(Ordering::SeqCst) {
                        self.metrics.lock().terminated_executions += 1;
                    } else {
                        self.metrics.lock().failed_executions += 1;
                    }
                    PoolOutcome::Died
                }
            },
            _ = tokio::time::sleep(timeout) => {
                tracing::warn!(%job_id, timeout_secs = timeout.as_secs(), "job timed out");
                self.terminate(job_id, false).await;
                self.metrics.lock().failed_executions += 1;
                PoolOutcome::TimedOut
            }
        };

        self.cleanup(job_id).await;
        Ok(outcome)
    }

    /// Terminate a job's worker. Graceful first (cooperative cancel /
    /// SIGTERM with a grace window), then SIGKILL. Idempotent; returns
    /// false when the job has no live worker.
    pub async fn terminate(&self, job_id: &JobId, force: bool) -> bool {
        let (handle, terminating) = {
            let active = self.active.lock();
            match active.get(job_id) {
                Some(entry) => match &entry.handle {
                    Some(handle) => (handle.clone(), entry.terminating.clone()),
                    None => return false,
                },
                None => return false,
            }
        };
        terminating.store(true, Ordering::SeqCst);

        if force {
            self.launcher.kill(&handle);
            return true;
        }

        self.launcher.signal_stop(&handle);
        let deadline = tokio::time::Instant::now() + self.grace;
        while tokio::time::Instant::now() < deadline {
            if !self.launcher.is_alive(&handle) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        tracing::warn!(%job_id, "worker survived the grace window, killing");
        self.launcher.kill(&handle);
        true
    }

    /// Whether a live worker still exists for the job.
    pub fn worker_alive(&self, job_id: &JobId) -> bool {
        let handle = self.active.lock().get(job_id).and_then(|entry| entry.handle.clone());
        handle.map_or(false, |handle| self.launcher.is_alive(&handle))
    }

    /// Remove the job's tables, draining the forwarder first.
    async fn cleanup(&self, job_id: &JobId) {
        let entry = self.active.lock().remove(job_id);
        if let Some(entry) = entry {
            if let Some(forwarder) = entry.forwarder {
                // The forwarder ends when the worker's streams close;
                // bound the wait so a wedged stream cannot hang cleanup.
                if tokio::time::timeout(Duration::from_secs(2), forwarder).await.is_err() {
                    tracing::debug!(%job_id, "frame forwarder still draining at cleanup");
                }
            }
        }
    }

    /// Kill every live worker and clean up orphans from previous runs.
    pub async fn shutdown(&self) {
        let entries: Vec<(JobId, Arc<WorkerHandle>)> = {
            let mut active = self.active.lock();
            active
                .drain()
                .filter_map(|(job_id, entry)| entry.handle.map(|h| (job_id, h)))
                .collect()
        };
        for (job_id, handle) in entries {
            tracing::info!(%job_id, "killing worker at pool shutdown");
            self.launcher.kill(&handle);
        }
        let orphans = kasal_adapters::launcher::kill_orphan_workers();
        if orphans > 0 {
            tracing::warn!(orphans, "killed orphan workers from a previous run");
        }
    }
}

#[cfg(test)]
#[path = "pool_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Background log writer.
//!
//! Single consumer of the log queue. Workers never write the database
//! themselves (SQLite corrupts under cross-process writes); every line
//! crosses the IPC boundary and lands here, where it is batch-inserted
//! and fanned out to WebSocket subscribers per job.

use crate::broadcast::{frames, Broadcaster};
use kasal_core::{JobId, LogLine};
use kasal_storage::LogRepository;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

const LOG_BATCH_SIZE: usize = 50;

pub struct LogWriter {
    logs: Arc<dyn LogRepository>,
    broadcaster: Arc<Broadcaster>,
    poll: Duration,
}

impl LogWriter {
    pub fn new(logs: Arc<dyn LogRepository>, broadcaster: Arc<Broadcaster>, poll: Duration) -> Self {
        Self { logs, broadcaster, poll }
    }

    /// Spawn the writer loop; exits after draining on shutdown.
    pub fn spawn(
        self,
        rx: mpsc::Receiver<LogLine>,
        shutdown: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run(rx, shutdown))
    }

    async fn run(self, mut rx: mpsc::Receiver<LogLine>, shutdown: CancellationToken) {
        tracing::info!("log writer started");
        let mut written: u64 = 0;

        loop {
            let mut batch = Vec::with_capacity(LOG_BATCH_SIZE);

            tokio::select! {
                _ = shutdown.cancelled() => {
                    while let Ok(line) = rx.try_recv() {
                        batch.push(line);
                        if batch.len() >= LOG_BATCH_SIZE {
                            written += self.flush(std::mem::take(&mut batch)).await;
                        }
                    }
                    written += self.flush(batch).await;
                    break;
                }
                first = rx.recv() => {
                    match first {
                        Some(line) => batch.push(line),
                        None => break,
                    }
                }
            }

            while batch.len() < LOG_BATCH_SIZE {
                match tokio::time::timeout(self.poll, rx.recv()).await {
                    Ok(Some(line)) => batch.push(line),
                    Ok(None) | Err(_) => break,
                }
            }

            written += self.flush(batch).await;
        }

        tracing::info!(written, "log writer stopped");
    }

    async fn flush(&self, batch: Vec<LogLine>) -> u64 {
        if batch.is_empty() {
            return 0;
        }

        let stored = match self.logs.append_batch(&batch).await {
            Ok(n) => n as u64,
            Err(e) => {
                tracing::error!(error = %e, count = batch.len(), "failed to store log batch");
                0
            }
        };

        // One frame per job with its buffered lines.
        let mut by_job: HashMap<JobId, Vec<LogLine>> = HashMap::new();
        for line in batch {
            by_job.entry(line.job_id.clone()).or_default().push(line);
        }
        for (job_id, lines) in by_job {
            self.broadcaster.broadcast(&job_id, frames::log_batch(&job_id, &lines)).await;
        }

        stored
    }
}

#[cfg(test)]
#[path = "log_writer_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-process worker launcher for tests.
//!
//! Runs the worker body as a tokio task instead of an OS process:
//! `signal_stop` trips the cancel token, `kill` aborts the task, and a
//! killed worker never posts a result, exactly the failure surface the
//! pool sees with real processes.

use super::{LauncherError, WorkerHandle, WorkerLauncher};
use async_trait::async_trait;
use kasal_wire::{Frame, WorkerInit, WorkerResult};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

/// The worker body a [`LocalLauncher`] runs for each spawn.
#[async_trait]
pub trait LocalWorker: Send + Sync + 'static {
    async fn run(
        &self,
        init: WorkerInit,
        frames: mpsc::Sender<Frame>,
        cancel: CancellationToken,
    ) -> WorkerResult;
}

pub struct LocalLauncher<W> {
    worker: std::sync::Arc<W>,
}

impl<W: LocalWorker> LocalLauncher<W> {
    pub fn new(worker: std::sync::Arc<W>) -> Self {
        Self { worker }
    }
}

#[async_trait]
impl<W: LocalWorker> WorkerLauncher for LocalLauncher<W> {
    async fn spawn(
        &self,
        init: WorkerInit,
        frames: mpsc::Sender<Frame>,
    ) -> Result<WorkerHandle, LauncherError> {
        let job_id = init.job_id.clone();
        let cancel = CancellationToken::new();
        let (result_tx, result_rx) = oneshot::channel();

        let worker = self.worker.clone();
        let task_cancel = cancel.clone();
        let join = tokio::spawn(async move {
            let result = worker.run(init, frames, task_cancel).await;
            let _ = result_tx.send(result);
        });

        Ok(WorkerHandle {
            job_id,
            pid: None,
            cancel,
            result: Some(result_rx),
            abort: Some(join.abort_handle()),
        })
    }

    fn signal_stop(&self, handle: &WorkerHandle) {
        handle.cancel.cancel();
    }

    fn kill(&self, handle: &WorkerHandle) {
        if let Some(abort) = &handle.abort {
            abort.abort();
        }
    }

    fn is_alive(&self, handle: &WorkerHandle) -> bool {
        handle.abort.as_ref().is_some_and(|a| !a.is_finished())
    }
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker process launching and termination.
//!
//! Each job runs in a freshly-spawned worker process. Spawn, never
//! fork: the orchestration library installs process-wide event-bus
//! state and the parent's pool handles cannot survive a fork. The
//! parent writes one [`WorkerInit`] frame to the worker's stdin and
//! demuxes [`Frame`]s from its stdout; stderr lines (anything that
//! escaped the worker's logging redirect) are forwarded as log frames.

use async_trait::async_trait;
use kasal_core::JobId;
use kasal_wire::{read_frame, write_frame, Frame, WorkerInit, WorkerResult};
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

/// Marker argument carried by every worker process, used by the orphan
/// scan to find workers left behind by a previous interpreter.
pub const WORKER_MARKER_ARG: &str = "--kasal-worker";

#[derive(Debug, Error)]
pub enum LauncherError {
    #[error("spawn failed: {0}")]
    SpawnFailed(String),
    #[error("worker I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("protocol error: {0}")]
    Protocol(#[from] kasal_wire::ProtocolError),
}

/// Handle to a live worker.
pub struct WorkerHandle {
    pub job_id: JobId,
    /// OS pid for process workers; `None` for in-process test workers.
    pub pid: Option<u32>,
    cancel: CancellationToken,
    result: Option<oneshot::Receiver<WorkerResult>>,
    abort: Option<tokio::task::AbortHandle>,
}

impl WorkerHandle {
    /// Take the terminal-result future. Yields `None` after the first
    /// call; the channel erroring means the worker died without posting.
    pub fn take_result(&mut self) -> Option<oneshot::Receiver<WorkerResult>> {
        self.result.take()
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }
}

/// Spawns and terminates workers.
#[async_trait]
pub trait WorkerLauncher: Send + Sync + 'static {
    /// Start a worker for `init`. Log and trace frames are forwarded to
    /// `frames` as they arrive; the terminal result resolves the
    /// handle's result future.
    async fn spawn(
        &self,
        init: WorkerInit,
        frames: mpsc::Sender<Frame>,
    ) -> Result<WorkerHandle, LauncherError>;

    /// Request cooperative shutdown (SIGTERM / cancel token).
    fn signal_stop(&self, handle: &WorkerHandle);

    /// Kill immediately (SIGKILL / task abort).
    fn kill(&self, handle: &WorkerHandle);

    /// Whether the worker still exists.
    fn is_alive(&self, handle: &WorkerHandle) -> bool;
}

/// Production launcher: one OS process per job.
pub struct ProcessLauncher {
    /// Worker command line; empty means "current executable, `worker`
    /// subcommand" (the embedding binary exposes the worker entry
    /// point).
    worker_command: Vec<String>,
}

impl ProcessLauncher {
    pub fn new(worker_command: Vec<String>) -> Self {
        Self { worker_command }
    }

    fn argv(&self) -> Result<Vec<String>, LauncherError> {
        if !self.worker_command.is_empty() {
            return Ok(self.worker_command.clone());
        }
        let exe = std::env::current_exe()
            .map_err(|e| LauncherError::SpawnFailed(format!("current_exe: {e}")))?;
        Ok(vec![exe.display().to_string(), "worker".to_string()])
    }
}

#[async_trait]
impl WorkerLauncher for ProcessLauncher {
    async fn spawn(
        &self,
        init: WorkerInit,
        frames: mpsc::Sender<Frame>,
    ) -> Result<WorkerHandle, LauncherError> {
        let argv = self.argv()?;
        let Some((program, args)) = argv.split_first() else {
            return Err(LauncherError::SpawnFailed("empty worker command".into()));
        };

        let mut command = Command::new(program);
        command
            .args(args)
            .arg(WORKER_MARKER_ARG)
            .arg(init.job_id.as_str())
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true);
        for (key, value) in &init.env {
            command.env(key, value);
        }

        let mut child = command
            .spawn()
            .map_err(|e| LauncherError::SpawnFailed(format!("{program}: {e}")))?;
        let pid = child.id();

        // Hand over the init payload and close stdin: the worker reads
        // exactly one frame.
        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| LauncherError::SpawnFailed("worker stdin unavailable".into()))?;
        write_frame(&mut stdin, &init).await?;
        drop(stdin);

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| LauncherError::SpawnFailed("worker stdout unavailable".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| LauncherError::SpawnFailed("worker stderr unavailable".into()))?;

        // Stray stderr (output that escaped the worker's logging
        // redirect) becomes log lines so nothing is lost.
        let stderr_frames = frames.clone();
        let stderr_group = init.group.clone();
        let stderr_job = init.job_id.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let frame =
                    Frame::log(stderr_job.clone(), line, chrono::Utc::now(), &stderr_group);
                if stderr_frames.send(frame).await.is_err() {
                    break;
                }
            }
        });

        let (result_tx, result_rx) = oneshot::channel();
        let job_id = init.job_id.clone();
        let reader_job = job_id.clone();
        tokio::spawn(async move {
            let mut stdout = stdout;
            let mut result_tx = Some(result_tx);
            loop {
                match read_frame::<_, Frame>(&mut stdout).await {
                    Ok(Frame::Result(result)) => {
                        if let Some(tx) = result_tx.take() {
                            let _ = tx.send(result);
                        }
                        break;
                    }
                    Ok(frame) => {
                        if frames.send(frame).await.is_err() {
                            break;
                        }
                    }
                    Err(kasal_wire::ProtocolError::Closed) => break,
                    Err(e) => {
                        tracing::warn!(job_id = %reader_job, error = %e, "worker stream error");
                        break;
                    }
                }
            }
            // Reap the child so no zombie outlives the job.
            match child.wait().await {
                Ok(status) => {
                    tracing::debug!(job_id = %reader_job, %status, "worker exited")
                }
                Err(e) => tracing::warn!(job_id = %reader_job, error = %e, "worker wait failed"),
            }
        });

        Ok(WorkerHandle {
            job_id,
            pid,
            cancel: CancellationToken::new(),
            result: Some(result_rx),
            abort: None,
        })
    }

    fn signal_stop(&self, handle: &WorkerHandle) {
        handle.cancel.cancel();
        if let Some(pid) = handle.pid {
            if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
                tracing::debug!(job_id = %handle.job_id, pid, error = %e, "SIGTERM failed");
            }
        }
    }

    fn kill(&self, handle: &WorkerHandle) {
        if let Some(pid) = handle.pid {
            if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGKILL) {
                tracing::debug!(job_id = %handle.job_id, pid, error = %e, "SIGKILL failed");
            }
        }
    }

    fn is_alive(&self, handle: &WorkerHandle) -> bool {
        match handle.pid {
            Some(pid) => kill(Pid::from_raw(pid as i32), None).is_ok(),
            None => false,
        }
    }
}

/// Kill worker processes left behind by a previous interpreter.
///
/// Scans the OS process table for command lines carrying the worker
/// marker and sends SIGKILL. Returns the number of processes killed.
pub fn kill_orphan_workers() -> usize {
    let Ok(entries) = std::fs::read_dir("/proc") else {
        return 0;
    };
    let own_pid = std::process::id();
    let mut killed = 0;
    for entry in entries.flatten() {
        let Some(pid) = entry.file_name().to_str().and_then(|n| n.parse::<u32>().ok()) else {
            continue;
        };
        if pid == own_pid {
            continue;
        }
        let Ok(cmdline) = std::fs::read(entry.path().join("cmdline")) else {
            continue;
        };
        let cmdline = String::from_utf8_lossy(&cmdline);
        if cmdline.split('\0').any(|arg| arg == WORKER_MARKER_ARG)
            && kill(Pid::from_raw(pid as i32), Signal::SIGKILL).is_ok()
        {
            tracing::warn!(pid, "killed orphan worker");
            killed += 1;
        }
    }
    killed
}

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
#[path = "launcher_local.rs"]
mod local;
#[cfg(any(test, feature = "test-support"))]
pub use local::{LocalLauncher, LocalWorker};

#[cfg(test)]
#[path = "launcher_tests.rs"]
mod tests;

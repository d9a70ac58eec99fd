// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker-side runtime.
//!
//! Runs inside the spawned worker process. Initialization order is
//! load-bearing: signal handling, then the logging redirect, then the
//! verbosity env flags, then the ambient group context, all before the
//! orchestrator is constructed. Stdout belongs to the frame protocol;
//! anything a library prints there would corrupt it, so the logging
//! redirect happens before any third-party code runs.
//!
//! Every failure path still posts a terminal result frame: the worker
//! never exits silently.

use crate::bridge::EventBridge;
use crate::memory::MemoryFactory;
use kasal_adapters::{CrewEngine, CrewOutput, CrewPlan, EngineError, TraceSink, TraceTag, VectorSearchClient};
use kasal_core::{CoreError, MemoryBackendConfig, WorkerGroupContext};
use kasal_wire::{read_frame, write_frame, Frame, WorkerInit, WorkerResult};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

tokio::task_local! {
    static AMBIENT_GROUP: WorkerGroupContext;
}

/// The ambient tenant identity of the current worker task, if bound.
pub fn ambient_group() -> Option<WorkerGroupContext> {
    AMBIENT_GROUP.try_with(Clone::clone).ok()
}

/// What the embedding binary wires into the worker entry point.
pub struct WorkerDeps<E> {
    pub engine: Arc<E>,
    /// Vector Search client for Databricks-backed memory; absent means
    /// the memory factory degrades to the library default.
    pub vector_client: Option<Arc<dyn VectorSearchClient>>,
}

/// Run one job to its terminal result, emitting frames along the way.
///
/// This is the whole work of the worker minus process plumbing; the
/// in-process test launcher calls it directly, `run_stdio` wraps it
/// with stdin/stdout framing and signal handling.
pub async fn run_local<E: CrewEngine>(
    deps: &WorkerDeps<E>,
    init: WorkerInit,
    frames: mpsc::Sender<Frame>,
    cancel: CancellationToken,
) -> WorkerResult {
    // Suppress third-party chatter before any library code runs.
    std::env::set_var("CREWAI_VERBOSE", "false");

    let group = init.group.clone();
    AMBIENT_GROUP
        .scope(group, run_inner(deps, init, frames, cancel))
        .await
}

async fn run_inner<E: CrewEngine>(
    deps: &WorkerDeps<E>,
    init: WorkerInit,
    frames: mpsc::Sender<Frame>,
    cancel: CancellationToken,
) -> WorkerResult {
    let mut plan: CrewPlan = match serde_json::from_value(init.config.clone()) {
        Ok(plan) => plan,
        Err(e) => {
            return WorkerResult::err(format!("invalid crew plan: {e}"));
        }
    };

    // Memory attachment. The hooks publish trace frames, subject to the
    // run's debug flag.
    let memory_config: Option<MemoryBackendConfig> = match &init.memory {
        Some(raw) => match serde_json::from_value(raw.clone()) {
            Ok(config) => Some(config),
            Err(e) => {
                tracing::warn!(error = %e, "ignoring malformed memory backend config");
                None
            }
        },
        None => None,
    };
    let trace_hooks = init.debug_tracing.then(|| {
        let sink_frames = frames.clone();
        let sink: TraceSink = Arc::new(move |event| {
            let _ = sink_frames.try_send(Frame::Trace(event));
        });
        let tag = TraceTag {
            job_id: init.job_id.clone(),
            group_id: init.group.group_id.clone(),
            group_email: init.group.group_email.clone(),
        };
        (sink, tag)
    });
    let factory = MemoryFactory::new(init.memory_dir.clone(), deps.vector_client.clone());
    let attachment = factory.attach(&plan.crew_id, memory_config.as_ref(), trace_hooks);
    plan.library_memory = attachment.library_memory;
    // Stores stay alive (and the storage dir env bound) for the run.
    let _attachment = attachment;

    // Event listener: orchestrator events → trace frames.
    let (events_tx, events_rx) = mpsc::channel(256);
    let bridge = EventBridge::new(init.job_id.clone(), init.group.clone(), init.debug_tracing);
    let bridge_frames = frames.clone();
    let bridge_task = bridge.spawn(events_rx, move |trace| {
        let _ = bridge_frames.try_send(Frame::Trace(trace));
    });

    // Run the crew on its own task so an engine panic is contained and
    // still produces a result frame.
    let engine = deps.engine.clone();
    let kickoff_cancel = cancel.clone();
    let kickoff =
        tokio::spawn(async move { engine.kickoff(plan, events_tx, kickoff_cancel).await });

    let result = match kickoff.await {
        Ok(Ok(output)) => WorkerResult::ok(normalize_output(output)),
        Ok(Err(EngineError::Cancelled { partial })) => {
            let mut result = WorkerResult::err("execution cancelled");
            result.partial = partial;
            result
        }
        Ok(Err(e)) => WorkerResult::err(e.to_string()),
        Err(join_error) if join_error.is_panic() => {
            WorkerResult::err("crew engine panicked".to_string())
        }
        Err(join_error) => WorkerResult::err(format!("crew engine aborted: {join_error}")),
    };

    // The engine dropped its sender; let the bridge finish translating.
    let _ = bridge_task.await;
    result
}

/// Normalize whatever the orchestrator returned (dict / structured
/// object / string) into `{content, token_usage?}`.
fn normalize_output(output: CrewOutput) -> Value {
    let mut normalized = match output.content {
        Value::Object(map) if map.contains_key("content") => Value::Object(map),
        Value::String(s) => json!({"content": s}),
        other => json!({"content": other}),
    };
    if let Some(usage) = output.token_usage {
        normalized["token_usage"] = usage;
    }
    normalized
}

/// Process entry point for the embedding binary's `worker` mode.
///
/// Reads the init payload from stdin, owns stdout for the frame
/// protocol, redirects all logging to the crew log file plus log
/// frames, binds SIGTERM to cooperative cancellation, and always posts
/// a terminal result.
pub async fn run_stdio<E: CrewEngine>(deps: WorkerDeps<E>) -> Result<(), CoreError> {
    let mut stdin = tokio::io::stdin();
    let init: WorkerInit = read_frame(&mut stdin)
        .await
        .map_err(|e| CoreError::internal(format!("reading worker init: {e}")))?;

    // Single writer owns stdout so frames never interleave.
    let (frames_tx, mut frames_rx) = mpsc::channel::<Frame>(1024);
    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(frame) = frames_rx.recv().await {
            if write_frame(&mut stdout, &frame).await.is_err() {
                break;
            }
        }
    });

    logging::install(&init, frames_tx.clone());

    // SIGTERM → cooperative cancel; the engine gets a chance to post
    // partial results before the parent's grace window expires.
    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
        Ok(mut sigterm) => {
            tokio::spawn(async move {
                sigterm.recv().await;
                tracing::info!("SIGTERM received, cancelling crew");
                signal_cancel.cancel();
            });
        }
        Err(e) => tracing::warn!(error = %e, "could not install SIGTERM handler"),
    }

    let result = run_local(&deps, init, frames_tx.clone(), cancel).await;

    if frames_tx.send(Frame::Result(result)).await.is_err() {
        tracing::error!("stdout writer gone before the terminal result");
    }
    drop(frames_tx);
    let _ = writer.await;
    Ok(())
}

/// Worker-side logging: a file handler for the crew log plus a handler
/// that forwards every line to the parent as log frames. Console
/// handlers are never installed; stdout is the protocol channel.
mod logging {
    use super::*;
    use std::io::Write;
    use tracing_subscriber::fmt::MakeWriter;
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    pub(super) fn install(init: &WorkerInit, frames: mpsc::Sender<Frame>) {
        let forward = FrameMakeWriter {
            frames,
            job_id: init.job_id.clone(),
            group: init.group.clone(),
        };
        let forward_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_target(false)
            .with_writer(forward);

        let file_layer = init.log_file.parent().and_then(|dir| {
            std::fs::create_dir_all(dir).ok()?;
            let file_name = init.log_file.file_name()?.to_owned();
            let appender = tracing_appender::rolling::never(dir, file_name);
            Some(tracing_subscriber::fmt::layer().with_ansi(false).with_writer(appender))
        });

        // try_init: the in-process test launcher may have a subscriber
        // already; the real worker process never does.
        let _ = tracing_subscriber::registry()
            .with(tracing_subscriber::EnvFilter::from_default_env())
            .with(file_layer)
            .with(forward_layer)
            .try_init();
    }

    /// `MakeWriter` that turns formatted log lines into log frames.
    #[derive(Clone)]
    pub(super) struct FrameMakeWriter {
        frames: mpsc::Sender<Frame>,
        job_id: kasal_core::JobId,
        group: WorkerGroupContext,
    }

    impl<'a> MakeWriter<'a> for FrameMakeWriter {
        type Writer = FrameLineWriter;

        fn make_writer(&'a self) -> Self::Writer {
            FrameLineWriter { inner: self.clone(), buf: Vec::new() }
        }
    }

    pub(super) struct FrameLineWriter {
        inner: FrameMakeWriter,
        buf: Vec<u8>,
    }

    impl Write for FrameLineWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.buf.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            let text = String::from_utf8_lossy(&self.buf);
            for line in text.lines().filter(|l| !l.trim().is_empty()) {
                let frame = Frame::log(
                    self.inner.job_id.clone(),
                    line,
                    chrono::Utc::now(),
                    &self.inner.group,
                );
                // Never block the logger on the protocol channel.
                let _ = self.inner.frames.try_send(frame);
            }
            self.buf.clear();
            Ok(())
        }
    }

    impl Drop for FrameLineWriter {
        fn drop(&mut self) {
            let _ = self.flush();
        }
    }
}

#[cfg(test)]
#[path = "worker_tests.rs"]
mod tests;

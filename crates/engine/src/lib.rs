// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! kasal-engine: the execution core.
//!
//! Turns a validated submission into a running, observable, cancellable
//! unit of work: status store, process pool, trace/log pipeline,
//! WebSocket broadcast, crew builder, memory attachment, and the
//! worker-side runtime.

pub mod bridge;
pub mod broadcast;
pub mod builder;
pub mod log_writer;
pub mod memory;
pub mod pool;
pub mod queues;
pub mod service;
pub mod status;
pub mod trace_writer;
pub mod worker;

pub use bridge::EventBridge;
pub use broadcast::{frames, Broadcaster, FrameSink};
pub use builder::CrewBuilder;
pub use log_writer::LogWriter;
pub use memory::{MemoryAttachment, MemoryDirGuard, MemoryFactory};
pub use pool::{PoolMetrics, PoolOutcome, ProcessPool};
pub use queues::{LogQueue, TraceQueue};
pub use service::{ExecutionService, Repositories, StopRequest, StopResponse, StopType};
pub use status::{ExecutionStatusService, TerminalOutcome};
pub use trace_writer::TraceWriter;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! IPC protocol between the executor and its worker processes.
//!
//! Wire format: 4-byte length prefix (big-endian) + JSON payload.
//!
//! The parent feeds a single [`WorkerInit`] frame to the worker's stdin
//! and demuxes [`Frame`]s from its stdout: log lines into the log
//! queue, trace events into the trace queue, and exactly one terminal
//! [`WorkerResult`]. Workers never touch the database; every side
//! effect crosses this boundary.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod frame;
mod wire;

pub use frame::{Frame, WorkerInit, WorkerResult};
pub use wire::{decode, encode, read_frame, read_message, write_frame, write_message, ProtocolError, MAX_FRAME_LEN};

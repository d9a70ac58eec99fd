// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workspace-level scenario specs.
//!
//! These run the whole execution core (SQL repositories over an
//! in-memory database, the status store, both writers, the process
//! pool) with only the crew engine and the OS process boundary faked.

mod prelude;

mod execution {
    mod happy_path;
    mod overload;
    mod stop;
    mod tenancy;
}

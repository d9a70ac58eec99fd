// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[parameterized(
    pending = { ExecutionStatus::Pending, false },
    running = { ExecutionStatus::Running, false },
    stopping = { ExecutionStatus::Stopping, false },
    completed = { ExecutionStatus::Completed, true },
    failed = { ExecutionStatus::Failed, true },
    stopped = { ExecutionStatus::Stopped, true },
)]
fn terminal_states(status: ExecutionStatus, terminal: bool) {
    assert_eq!(status.is_terminal(), terminal);
}

#[test]
fn pending_starts_or_fails() {
    use ExecutionStatus::*;
    assert!(Pending.can_transition_to(Running));
    assert!(Pending.can_transition_to(Failed));
    assert!(!Pending.can_transition_to(Completed));
    assert!(!Pending.can_transition_to(Stopped));
    assert!(!Pending.can_transition_to(Stopping));
}

#[test]
fn running_reaches_every_terminal() {
    use ExecutionStatus::*;
    for next in [Completed, Failed, Stopped, Stopping] {
        assert!(Running.can_transition_to(next), "running -> {next}");
    }
}

#[test]
fn stopping_may_still_complete() {
    use ExecutionStatus::*;
    assert!(Stopping.can_transition_to(Completed));
    assert!(Stopping.can_transition_to(Failed));
    assert!(Stopping.can_transition_to(Stopped));
    assert!(!Stopping.can_transition_to(Running));
}

#[test]
fn terminal_accepts_nothing() {
    use ExecutionStatus::*;
    for from in [Completed, Failed, Stopped] {
        for next in [Pending, Running, Stopping, Completed, Failed, Stopped] {
            assert!(!from.can_transition_to(next), "{from} -> {next} must be rejected");
        }
    }
}

#[test]
fn idempotent_self_transitions() {
    use ExecutionStatus::*;
    assert!(Running.can_transition_to(Running));
    assert!(Stopping.can_transition_to(Stopping));
    assert!(!Pending.can_transition_to(Pending));
}

#[test]
fn display_round_trips_through_parse() {
    use ExecutionStatus::*;
    for status in [Pending, Running, Stopping, Completed, Failed, Stopped] {
        assert_eq!(ExecutionStatus::parse(&status.to_string()), Some(status));
    }
    assert_eq!(ExecutionStatus::parse("debug_whatever"), None);
}

#[test]
fn running_covers_stopping() {
    assert!(ExecutionStatus::Stopping.is_running());
    assert!(ExecutionStatus::Running.is_running());
    assert!(!ExecutionStatus::Pending.is_running());
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[parameterized(
    not_found = { ErrorKind::NotFound, "not_found" },
    forbidden = { ErrorKind::Forbidden, "forbidden" },
    security = { ErrorKind::SecurityViolation, "security_violation" },
    invalid_config = { ErrorKind::InvalidConfig, "invalid_config" },
    overloaded = { ErrorKind::Overloaded, "overloaded" },
    timeout = { ErrorKind::Timeout, "timeout" },
)]
fn kind_display(kind: ErrorKind, expected: &str) {
    assert_eq!(kind.to_string(), expected);
}

#[test]
fn error_carries_kind_and_message() {
    let err = CoreError::forbidden("group mismatch");
    assert_eq!(err.kind(), ErrorKind::Forbidden);
    assert_eq!(err.to_string(), "forbidden: group mismatch");
}

#[test]
fn only_runtime_failures_fail_execution() {
    assert!(CoreError::timeout("t").fails_execution());
    assert!(CoreError::upstream("u").fails_execution());
    assert!(CoreError::internal("i").fails_execution());
    assert!(!CoreError::overloaded("o").fails_execution());
    assert!(!CoreError::not_found("n").fails_execution());
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::{GroupId, JobId};

#[test]
fn job_id_display() {
    let id = JobId::new("test-job");
    assert_eq!(id.to_string(), "test-job");
}

#[test]
fn job_id_equality() {
    let id1 = JobId::new("job-1");
    let id2 = JobId::new("job-1");
    let id3 = JobId::new("job-2");

    assert_eq!(id1, id2);
    assert_ne!(id1, id3);
}

#[test]
fn job_id_from_str() {
    let id: JobId = "test".into();
    assert_eq!(id.as_str(), "test");
}

#[test]
fn job_id_accepts_uuid_length() {
    // Caller-supplied job ids are often UUIDs; no length cap applies.
    let id = JobId::new("ab6bb11e-dd21-4da8-b379-bd7b0bbd1dca");
    assert_eq!(id.as_str().len(), 36);
}

#[test]
fn job_id_serde() {
    let id = JobId::new("my-job");
    let json = serde_json::to_string(&id).unwrap();
    assert_eq!(json, "\"my-job\"");

    let parsed: JobId = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, id);
}

#[test]
fn generated_ids_carry_prefix_and_differ() {
    let a = JobId::generate();
    let b = JobId::generate();
    assert!(a.as_str().starts_with("exec-"));
    assert_ne!(a, b);
}

#[test]
fn group_id_borrow_matches_str() {
    use std::collections::HashMap;
    let mut map: HashMap<GroupId, u32> = HashMap::new();
    map.insert(GroupId::new("acme"), 1);
    assert_eq!(map.get("acme"), Some(&1));
}

#[test]
fn short_truncates() {
    assert_eq!(short("abcdef", 3), "abc");
    assert_eq!(short("ab", 3), "ab");
    let id = JobId::new("abcdefgh");
    assert_eq!(id.short(4), "abcd");
}

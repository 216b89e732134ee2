// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::short;
use crate::job::JobId;

#[test]
fn generated_ids_carry_prefix_and_are_unique() {
    let a = JobId::new();
    let b = JobId::new();
    assert!(a.as_str().starts_with("job-"));
    assert_ne!(a, b);
}

#[test]
fn id_roundtrips_through_serde() {
    let id = JobId::from_string("job-fixed");
    let json = serde_json::to_string(&id).unwrap();
    assert_eq!(json, "\"job-fixed\"");
    let parsed: JobId = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, id);
}

#[test]
fn id_compares_against_str() {
    let id = JobId::from_string("job-1");
    assert_eq!(id, "job-1");
    assert_ne!(id, "job-2");
}

#[test]
fn short_truncates() {
    assert_eq!(short("abcdef", 4), "abcd");
    assert_eq!(short("ab", 4), "ab");
}

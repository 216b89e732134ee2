// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[parameterized(
    hf_id = { "Qwen/Qwen2.5-0.5B", "", "qwen/qwen2.5-0.5b" },
    explicit_target = { "Qwen/Qwen2.5-0.5B", "qwen2.5-0.5b", "qwen2.5-0.5b" },
    spaces_become_dashes = { "My Org/My Model", "", "my-org/my-model" },
    consecutive_junk_collapses = { "a//b", "", "a/b" },
    unicode_flattens = { "oré/modèle", "", "or/mod-le" },
    underscores_kept = { "org/model_v2.1", "", "org/model_v2.1" },
)]
fn canonical_target_normalizes(model_id: &str, override_target: &str, want: &str) {
    assert_eq!(canonical_target(model_id, override_target).unwrap(), want);
}

#[test]
fn canonical_target_is_idempotent() {
    for input in ["Qwen/Qwen2.5-0.5B", "My Org/My Model", "a//b", "UPPER"] {
        let once = canonical_target(input, "").unwrap();
        let twice = canonical_target(&once, "").unwrap();
        assert_eq!(once, twice, "input {input:?}");
    }
}

#[parameterized(
    empty = { "" },
    all_junk = { "///" },
    dot = { "." },
    dotdot = { ".." },
)]
fn canonical_target_rejects(input: &str) {
    assert!(canonical_target(input, "").is_err());
}

#[parameterized(
    traversal = { "../etc" },
    nested_traversal = { "a/../b" },
    absolute = { "/mnt/models" },
    dot_leaf = { ".hidden" },
    hf_cache = { ".hf-cache" },
    modules = { "modules" },
    lost_found = { "lost+found" },
    nested_reserved = { "a/modules" },
    backslash = { "a\\b" },
)]
fn validate_relpath_rejects(name: &str) {
    assert!(validate_relpath(name).is_err());
}

#[parameterized(
    simple = { "qwen2.5-0.5b" },
    nested = { "org/model" },
    dots_inside = { "v1.2.3" },
)]
fn validate_relpath_accepts(name: &str) {
    assert!(validate_relpath(name).is_ok());
}

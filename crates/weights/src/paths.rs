// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Path normalization and traversal checks for the storage root.

use crate::WeightError;

/// Leaves the storage root reserves for itself.
const RESERVED_LEAVES: &[&str] = &[".hf-cache", "modules", "lost+found"];

/// Derive the normalized relative slash-path for an installation.
///
/// Uses `override_target` when non-empty, otherwise the model id. Each
/// segment is lowercased and every character outside `[a-z0-9._-]` becomes
/// `-`; consecutive separators collapse and empty segments are stripped.
/// Idempotent: applying it to its own output returns the same string.
pub fn canonical_target(model_id: &str, override_target: &str) -> Result<String, WeightError> {
    let raw = if override_target.trim().is_empty() { model_id } else { override_target };

    let mut segments = Vec::new();
    for segment in raw.split('/') {
        let cleaned: String = segment
            .to_lowercase()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') { c } else { '-' })
            .collect();
        let cleaned = collapse_dashes(&cleaned);
        if cleaned.is_empty() {
            continue;
        }
        segments.push(cleaned);
    }

    if segments.is_empty() {
        return Err(WeightError::InvalidPath(format!("empty target from {raw:?}")));
    }
    let target = segments.join("/");
    validate_relpath(&target)?;
    Ok(target)
}

fn collapse_dashes(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_dash = false;
    for c in s.chars() {
        if c == '-' {
            if !prev_dash {
                out.push(c);
            }
            prev_dash = true;
        } else {
            out.push(c);
            prev_dash = false;
        }
    }
    out.trim_matches('-').to_string()
}

/// Reject absolute paths, traversal, dot-leaves, and reserved names.
pub fn validate_relpath(name: &str) -> Result<(), WeightError> {
    if name.is_empty() {
        return Err(WeightError::InvalidPath("empty name".to_string()));
    }
    if name.starts_with('/') || name.contains('\\') {
        return Err(WeightError::InvalidPath(name.to_string()));
    }
    for segment in name.split('/') {
        if segment.is_empty() || segment == "." || segment == ".." {
            return Err(WeightError::InvalidPath(name.to_string()));
        }
        if segment.starts_with('.') {
            return Err(WeightError::InvalidPath(format!("reserved segment {segment:?}")));
        }
        if RESERVED_LEAVES.contains(&segment) {
            return Err(WeightError::InvalidPath(format!("reserved segment {segment:?}")));
        }
    }
    Ok(())
}

/// True when a directory entry name is internal to the storage root and must
/// be skipped by discovery.
pub(crate) fn is_reserved_entry(name: &str) -> bool {
    name.starts_with('.') || RESERVED_LEAVES.contains(&name) || name.ends_with(".tmp")
}

#[cfg(test)]
#[path = "paths_tests.rs"]
mod tests;

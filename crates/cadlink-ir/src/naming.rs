//! Deterministic, file-system and XML safe names.

use std::collections::BTreeSet;

/// Sanitize a CAD-authored name.
///
/// ASCII alphanumerics, `-` and `_` are kept; every other run of characters
/// collapses to a single `_`. Leading/trailing `_` are trimmed and an empty
/// result becomes `"unnamed"`.
pub fn sanitize(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut pending_sep = false;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
            if pending_sep && !out.is_empty() {
                out.push('_');
            }
            pending_sep = false;
            out.push(c);
        } else {
            pending_sep = true;
        }
    }
    let trimmed = out.trim_matches('_');
    if trimmed.is_empty() {
        "unnamed".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Hands out unique names: the first request for a base gets it verbatim,
/// later ones get `-2`, `-3`, ... suffixes.
///
/// Uniqueness is only deterministic when requests are made in a
/// deterministic order.
#[derive(Debug, Default, Clone)]
pub struct UniqueNames {
    taken: BTreeSet<String>,
}

impl UniqueNames {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve `name` as-is so later allocations avoid it.
    pub fn reserve(&mut self, name: &str) {
        self.taken.insert(name.to_string());
    }

    /// Sanitize `raw` and make the result unique.
    pub fn allocate(&mut self, raw: &str) -> String {
        let base = sanitize(raw);
        if self.taken.insert(base.clone()) {
            return base;
        }
        let mut n = 2;
        loop {
            let candidate = format!("{base}-{n}");
            if self.taken.insert(candidate.clone()) {
                return candidate;
            }
            n += 1;
        }
    }

    /// Whether `name` is already taken.
    pub fn contains(&self, name: &str) -> bool {
        self.taken.contains(name)
    }
}

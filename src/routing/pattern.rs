//! URL pattern matching.
//!
//! # Responsibilities
//! - Compile descriptor URL patterns once
//! - Decide whether a pattern matches an application-relative path
//!
//! # Design Decisions
//! - A bare `/` matches every path
//! - `*` matches any run of characters, including `/`
//! - Anything else is an exact, case-sensitive comparison
//! - No regex: matching is a linear scan over the pattern's literal parts

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
enum PatternKind {
    MatchAll,
    Exact,
    /// Literal parts between the `*` wildcards; always at least two entries.
    Glob(Vec<String>),
}

/// A compiled URL pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlPattern {
    raw: String,
    kind: PatternKind,
}

impl UrlPattern {
    pub fn new(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let kind = if raw == "/" {
            PatternKind::MatchAll
        } else if raw.contains('*') {
            PatternKind::Glob(raw.split('*').map(str::to_string).collect())
        } else {
            PatternKind::Exact
        };
        Self { raw, kind }
    }

    /// The pattern text as declared.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Length used to rank competing matches.
    pub fn specificity(&self) -> usize {
        self.raw.len()
    }

    pub fn matches(&self, path: &str) -> bool {
        match &self.kind {
            PatternKind::MatchAll => true,
            PatternKind::Exact => self.raw == path,
            PatternKind::Glob(parts) => glob_matches(parts, path),
        }
    }
}

impl fmt::Display for UrlPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Anchored wildcard match: first part is a prefix, last part a suffix,
/// middle parts appear in order in between.
fn glob_matches(parts: &[String], text: &str) -> bool {
    let Some((first, rest)) = parts.split_first() else {
        return false;
    };
    let Some(mut remaining) = text.strip_prefix(first.as_str()) else {
        return false;
    };
    let Some((last, middle)) = rest.split_last() else {
        return remaining.is_empty();
    };
    for part in middle {
        match remaining.find(part.as_str()) {
            Some(index) => remaining = &remaining[index + part.len()..],
            None => return false,
        }
    }
    remaining.ends_with(last.as_str())
}

//! SQL text as it moves through the pipeline.
//!
//! [`CandidateSql`] is whatever the translator produced and is never trusted.
//! [`ValidatedSql`] can only be built by [`SqlSanitizer`] and is the only form
//! the executor accepts.

mod sanitizer;

pub use sanitizer::{validate, SqlSanitizer, FORBIDDEN_KEYWORDS};

use std::fmt;

/// Raw translator output, possibly wrapped in a markdown fence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateSql(String);

impl CandidateSql {
    pub fn new(sql: impl Into<String>) -> Self {
        Self(sql.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Fence-stripped, trimmed text. Presentation only; not a safety check.
    pub fn cleaned(&self) -> &str {
        strip_fences(&self.0)
    }
}

impl fmt::Display for CandidateSql {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// SQL that passed the security gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedSql(String);

impl ValidatedSql {
    pub(crate) fn new(sql: impl Into<String>) -> Self {
        Self(sql.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ValidatedSql {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Remove markdown code fences (```` ``` ```` or ```` ```sql ````) and surrounding
/// whitespace. Repeats until nothing changes, so it is idempotent.
pub fn strip_fences(sql: &str) -> &str {
    let mut current = sql.trim();
    loop {
        let next = strip_fence_once(current);
        if next.len() == current.len() {
            return next;
        }
        current = next;
    }
}

fn strip_fence_once(sql: &str) -> &str {
    let trimmed = sql.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = strip_sql_tag(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

fn strip_sql_tag(rest: &str) -> &str {
    match rest.get(..3) {
        Some(tag) if tag.eq_ignore_ascii_case("sql") => {
            let after = &rest[3..];
            if after.is_empty() || after.starts_with(char::is_whitespace) {
                after
            } else {
                rest
            }
        }
        _ => rest,
    }
}

//! Read-only security gate.
//!
//! The lexical rules (leading `SELECT`, no forbidden keyword anywhere) always
//! apply and are authoritative. Strict mode adds a structural check on text the
//! parser understands: exactly one query statement with no `INTO` target. MySQL
//! the parser cannot read is let through on the lexical verdict alone.

use super::{strip_fences, CandidateSql, ValidatedSql};
use crate::error::{PipelineError, Result, SecurityViolation};
use lazy_static::lazy_static;
use regex::Regex;
use sqlparser::ast::{SetExpr, Statement};
use sqlparser::dialect::{Dialect, GenericDialect, MySqlDialect};
use sqlparser::parser::Parser;
use tracing::{debug, warn};

pub const FORBIDDEN_KEYWORDS: [&str; 12] = [
    "INSERT", "UPDATE", "DELETE", "DROP", "ALTER", "CREATE", "REPLACE", "TRUNCATE", "GRANT",
    "REVOKE", "COMMIT", "ROLLBACK",
];

lazy_static! {
    static ref SELECT_PREFIX: Regex = Regex::new(r"(?i)^\s*select\b").expect("valid regex");
    static ref FORBIDDEN: Regex = Regex::new(&format!(
        r"(?i)\b({})\b",
        FORBIDDEN_KEYWORDS.join("|")
    ))
    .expect("valid regex");
}

/// Lexical check on fence-stripped SQL. Succeeds silently or names the violation.
pub fn validate(sql: &str) -> std::result::Result<(), SecurityViolation> {
    let sql = strip_fences(sql);

    if !SELECT_PREFIX.is_match(sql) {
        return Err(SecurityViolation::NotSelect);
    }
    if let Some(found) = FORBIDDEN.find(sql) {
        return Err(SecurityViolation::ForbiddenKeyword(
            found.as_str().to_uppercase(),
        ));
    }
    Ok(())
}

fn check_single_query(sql: &str) -> std::result::Result<(), SecurityViolation> {
    // MySQL first so double-quoted literals parse as strings; generic as fallback.
    let dialects: [&dyn Dialect; 2] = [&MySqlDialect {}, &GenericDialect {}];

    let mut last_error = None;
    let mut statements = None;
    for dialect in dialects {
        match Parser::parse_sql(dialect, sql) {
            Ok(parsed) => {
                statements = Some(parsed);
                break;
            }
            Err(e) => last_error = Some(e.to_string()),
        }
    }

    let statements = match statements {
        Some(statements) => statements,
        None => {
            return Err(SecurityViolation::Unparseable(
                last_error.unwrap_or_default(),
            ))
        }
    };

    if statements.len() != 1 {
        return Err(SecurityViolation::StatementCount(statements.len()));
    }
    match &statements[0] {
        Statement::Query(query) => match query.body.as_ref() {
            SetExpr::Select(select) if select.into.is_some() => Err(SecurityViolation::SelectInto),
            _ => Ok(()),
        },
        _ => Err(SecurityViolation::NotAQuery),
    }
}

#[derive(Debug, Clone)]
pub struct SqlSanitizer {
    strict: bool,
}

impl SqlSanitizer {
    pub fn new(strict: bool) -> Self {
        Self { strict }
    }

    pub fn validate(&self, sql: &str) -> Result<()> {
        let result = validate(sql).and_then(|_| {
            if !self.strict {
                return Ok(());
            }
            match check_single_query(strip_fences(sql)) {
                Err(SecurityViolation::Unparseable(reason)) => {
                    warn!("Structural check skipped, parser failed: {}", reason);
                    Ok(())
                }
                other => other,
            }
        });

        if let Err(ref violation) = result {
            warn!("SQL rejected: {}", violation);
        }
        result.map_err(PipelineError::from)
    }

    /// Validate a candidate and return the cleaned text in its executable form.
    pub fn approve(&self, candidate: &CandidateSql) -> Result<ValidatedSql> {
        self.validate(candidate.as_str())?;
        let cleaned = candidate.cleaned();
        debug!("SQL approved: {}", cleaned);
        Ok(ValidatedSql::new(cleaned))
    }
}

impl Default for SqlSanitizer {
    fn default() -> Self {
        Self::new(true)
    }
}

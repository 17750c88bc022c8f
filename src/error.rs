use std::fmt;
use thiserror::Error;

/// Pipeline stage a failure originated from. Only used for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Schema,
    Translate,
    Sanitize,
    Execute,
    Format,
    Respond,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Schema => write!(f, "schema"),
            Stage::Translate => write!(f, "translate"),
            Stage::Sanitize => write!(f, "sanitize"),
            Stage::Execute => write!(f, "execute"),
            Stage::Format => write!(f, "format"),
            Stage::Respond => write!(f, "respond"),
        }
    }
}

/// Failure talking to the external language model.
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Model config error: {0}")]
    Config(String),

    #[error("Model API call failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Model API error: {status} - {body}")]
    Status { status: u16, body: String },

    #[error("Failed to parse model response: {0}")]
    Decode(String),
}

/// Reason the security gate rejected a statement.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SecurityViolation {
    #[error("Only SELECT queries are allowed")]
    NotSelect,

    #[error("Query contains forbidden keyword: {0}")]
    ForbiddenKeyword(String),

    #[error("Query must be exactly one statement, found {0}")]
    StatementCount(usize),

    #[error("Query root is not a SELECT")]
    NotAQuery,

    #[error("SELECT ... INTO is not allowed")]
    SelectInto,

    #[error("Query could not be parsed: {0}")]
    Unparseable(String),
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Schema load error: {0}")]
    SchemaLoad(String),

    #[error("Translation error: {0}")]
    Translation(#[source] ModelError),

    #[error("Security validation error: {0}")]
    SecurityValidation(#[from] SecurityViolation),

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("Query timeout exceeded after {timeout_ms}ms")]
    ExecutionTimeout { timeout_ms: u64 },

    #[error("Formatting error: {0}")]
    Formatting(#[source] ModelError),

    #[error("Malformed output: {0}")]
    Malformed(String),
}

impl PipelineError {
    /// Stage the error is attributed to in operator logs.
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::SchemaLoad(_) => Stage::Schema,
            PipelineError::Translation(_) => Stage::Translate,
            PipelineError::SecurityValidation(_) => Stage::Sanitize,
            PipelineError::Execution(_) | PipelineError::ExecutionTimeout { .. } => Stage::Execute,
            PipelineError::Formatting(_) => Stage::Format,
            PipelineError::Malformed(_) => Stage::Respond,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, PipelineError::ExecutionTimeout { .. })
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_attribution() {
        let err = PipelineError::ExecutionTimeout { timeout_ms: 10 };
        assert_eq!(err.stage(), Stage::Execute);
        assert!(err.is_timeout());

        let err = PipelineError::from(SecurityViolation::NotSelect);
        assert_eq!(err.stage(), Stage::Sanitize);
        assert!(!err.is_timeout());
    }

    #[test]
    fn test_status_message_includes_body() {
        let err = PipelineError::Translation(ModelError::Status {
            status: 503,
            body: "overloaded".to_string(),
        });
        assert_eq!(
            err.to_string(),
            "Translation error: Model API error: 503 - overloaded"
        );
    }
}

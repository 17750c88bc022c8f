//! Pipeline controller.
//!
//! Runs Schema → Translate → Sanitize → Execute → Format for one question and
//! turns every failure into the same user-facing message.

use crate::config::PipelineSettings;
use crate::db::Database;
use crate::error::{PipelineError, Result};
use crate::executor::QueryExecutor;
use crate::formatter::ResponseFormatter;
use crate::llm::ModelClient;
use crate::markup::sanitize_fragment;
use crate::schema::SchemaProvider;
use crate::sql::SqlSanitizer;
use crate::translator::QueryTranslator;
use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, info_span, Instrument};
use uuid::Uuid;

pub const GENERIC_ERROR_MESSAGE: &str = "Oops, something went wrong. Try again!";
pub const HTML_PLACEHOLDER: &str = "View formatted results below";

lazy_static! {
    static ref MARKUP: Regex = Regex::new(r"<[^>]*>").expect("valid regex");
    static ref BACK_REFERENCE: Regex = Regex::new(r"^\$\d+").expect("valid regex");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    SchemaLoaded,
    SqlGenerated,
    SqlValidated,
    Executed,
    Formatted,
    Done,
    Failed,
}

impl PipelineState {
    /// The only state reachable from `self` on success.
    pub fn successor(self) -> Option<PipelineState> {
        use PipelineState::*;
        match self {
            Idle => Some(SchemaLoaded),
            SchemaLoaded => Some(SqlGenerated),
            SqlGenerated => Some(SqlValidated),
            SqlValidated => Some(Executed),
            Executed => Some(Formatted),
            Formatted => Some(Done),
            Done | Failed => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, PipelineState::Done | PipelineState::Failed)
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Forward-only state tracker for one pipeline run.
#[derive(Debug)]
pub struct PipelineRun {
    state: PipelineState,
    started: Instant,
    stage_started: Instant,
}

impl PipelineRun {
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            state: PipelineState::Idle,
            started: now,
            stage_started: now,
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Move to `next`, which must be the successor of the current state.
    pub fn advance(&mut self, next: PipelineState) -> Result<()> {
        if self.state.successor() != Some(next) {
            return Err(PipelineError::Malformed(format!(
                "illegal transition {} -> {}",
                self.state, next
            )));
        }
        debug!(
            "{} -> {} in {}ms",
            self.state,
            next,
            self.stage_started.elapsed().as_millis()
        );
        self.state = next;
        self.stage_started = Instant::now();
        Ok(())
    }

    pub fn fail(&mut self) {
        self.state = PipelineState::Failed;
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

impl Default for PipelineRun {
    fn default() -> Self {
        Self::new()
    }
}

/// What the UI layer receives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResponse {
    pub response: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub html_response: Option<String>,
}

impl QueryResponse {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            response: text.into(),
            html_response: None,
        }
    }

    pub fn html(html: impl Into<String>) -> Self {
        Self {
            response: HTML_PLACEHOLDER.to_string(),
            html_response: Some(html.into()),
        }
    }

    pub fn generic_error() -> Self {
        Self::text(GENERIC_ERROR_MESSAGE)
    }

    pub fn is_error(&self) -> bool {
        self.response == GENERIC_ERROR_MESSAGE && self.html_response.is_none()
    }
}

/// Decide how formatted content reaches the user.
pub fn build_response(content: &str) -> Result<QueryResponse> {
    if MARKUP.is_match(content) {
        return Ok(QueryResponse::html(sanitize_fragment(content)));
    }
    if BACK_REFERENCE.is_match(content) {
        return Err(PipelineError::Malformed(format!(
            "formatter returned a back-reference token: {}",
            content.chars().take(16).collect::<String>()
        )));
    }
    Ok(QueryResponse::text(content))
}

pub struct QueryPipeline {
    schema: Arc<SchemaProvider>,
    translator: QueryTranslator,
    sanitizer: SqlSanitizer,
    executor: QueryExecutor,
    formatter: ResponseFormatter,
    query_timeout: Duration,
}

impl QueryPipeline {
    pub fn new(
        settings: &PipelineSettings,
        schema: Arc<SchemaProvider>,
        model: Arc<dyn ModelClient>,
        db: Arc<dyn Database>,
    ) -> Self {
        Self {
            schema,
            translator: QueryTranslator::new(Arc::clone(&model)),
            sanitizer: SqlSanitizer::new(settings.strict_parse),
            executor: QueryExecutor::new(db),
            formatter: ResponseFormatter::new(model, settings),
            query_timeout: settings.query_timeout,
        }
    }

    /// Answer a question. Never fails: any stage error becomes the generic message.
    pub async fn process_user_query(&self, question: &str) -> QueryResponse {
        let span = info_span!("query", id = %Uuid::new_v4());
        async {
            info!("Starting query: {:?}", question);
            let mut run = PipelineRun::new();

            match self.run(question, &mut run).await {
                Ok(response) => {
                    info!("Query done in {}ms", run.elapsed().as_millis());
                    response
                }
                Err(e) => {
                    run.fail();
                    error!(
                        stage = %e.stage(),
                        timeout = e.is_timeout(),
                        "Query failed after {}ms: {}",
                        run.elapsed().as_millis(),
                        e
                    );
                    QueryResponse::generic_error()
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn run(&self, question: &str, run: &mut PipelineRun) -> Result<QueryResponse> {
        let schema = self.schema.load().await?;
        run.advance(PipelineState::SchemaLoaded)?;

        let candidate = self.translator.translate(question, &schema).await?;
        info!("Raw SQL: {}", candidate);
        run.advance(PipelineState::SqlGenerated)?;

        let sql = self.sanitizer.approve(&candidate)?;
        run.advance(PipelineState::SqlValidated)?;

        let rows = self.executor.execute(&sql, self.query_timeout).await?;
        run.advance(PipelineState::Executed)?;

        let content = self.formatter.format(question, &rows).await?;
        run.advance(PipelineState::Formatted)?;

        let response = build_response(&content)?;
        run.advance(PipelineState::Done)?;
        Ok(response)
    }
}

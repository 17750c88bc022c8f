use crate::db::{Database, ResultSet};
use crate::error::{PipelineError, Result};
use crate::sql::ValidatedSql;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info};

/// Runs validated SQL against the shared database with a hard deadline.
#[derive(Clone)]
pub struct QueryExecutor {
    db: Arc<dyn Database>,
}

impl QueryExecutor {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self { db }
    }

    /// Whichever finishes first wins: the query or the timer. The timer is
    /// dropped with the race, so nothing outlives a completed query.
    pub async fn execute(&self, sql: &ValidatedSql, timeout: Duration) -> Result<ResultSet> {
        let started = Instant::now();

        match tokio::time::timeout(timeout, self.db.fetch_all(sql.as_str())).await {
            Ok(Ok(rows)) => {
                info!(
                    "SQL executed in {}ms, rows returned: {}",
                    started.elapsed().as_millis(),
                    rows.len()
                );
                Ok(rows)
            }
            Ok(Err(e)) => Err(e),
            Err(_) => {
                let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
                error!("Query timeout exceeded after {}ms", timeout_ms);
                Err(PipelineError::ExecutionTimeout { timeout_ms })
            }
        }
    }
}

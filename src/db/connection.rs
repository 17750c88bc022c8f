//! MySQL pool setup.

use sqlx::mysql::{MySqlPool, MySqlPoolOptions};
use std::time::{Duration, Instant};
use tracing::info;

pub type DbPool = MySqlPool;

#[derive(Debug, Clone)]
pub struct PoolSettings {
    pub max_connections: u32,
    pub acquire_timeout: Duration,
    pub idle_timeout: Option<Duration>,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_connections: 10,
            acquire_timeout: Duration::from_secs(30),
            idle_timeout: Some(Duration::from_secs(600)),
        }
    }
}

/// Connection string with the password replaced, for logs.
pub fn redact_url(database_url: &str) -> String {
    let Some((scheme, rest)) = database_url.split_once("://") else {
        return database_url.to_string();
    };
    let Some((credentials, host)) = rest.rsplit_once('@') else {
        return database_url.to_string();
    };
    match credentials.split_once(':') {
        Some((user, _)) => format!("{}://{}:***@{}", scheme, user, host),
        None => database_url.to_string(),
    }
}

/// Open the pool and make sure the server answers before handing it out.
pub async fn init_pool(database_url: &str, settings: &PoolSettings) -> Result<DbPool, sqlx::Error> {
    let started = Instant::now();
    let pool = MySqlPoolOptions::new()
        .max_connections(settings.max_connections)
        .acquire_timeout(settings.acquire_timeout)
        .idle_timeout(settings.idle_timeout)
        .connect(database_url)
        .await?;

    sqlx::query("SELECT 1").execute(&pool).await?;

    info!(
        "Connected to {} in {}ms (max {} connections)",
        redact_url(database_url),
        started.elapsed().as_millis(),
        settings.max_connections
    );
    Ok(pool)
}

//! Model configuration and pipeline settings.

use crate::error::ModelError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Environment variable that overrides the `apiKey` field of the model config file.
pub const API_KEY_ENV: &str = "ASKDB_API_KEY";

fn default_request_timeout_ms() -> u64 {
    30_000
}

/// Connection settings for the external language model (`aiConfig.json`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelConfig {
    pub api_endpoint: String,
    #[serde(default)]
    pub api_key: String,
    pub model: String,
    #[serde(default)]
    pub generation: GenerationSettings,
    /// Transport timeout for a single model call.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl ModelConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationSettings {
    pub temperature: f32,
    pub max_output_tokens: u32,
    pub thinking_budget: u32,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            temperature: 0.1,
            max_output_tokens: 2048,
            thinking_budget: 0,
        }
    }
}

/// Read and parse the model config file, applying the API key override.
pub async fn load_model_config(path: &Path) -> std::result::Result<ModelConfig, ModelError> {
    info!("Loading model config from: {}", path.display());

    let data = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| ModelError::Config(format!("{}: {}", path.display(), e)))?;
    let mut config: ModelConfig = serde_json::from_str(&data)
        .map_err(|e| ModelError::Config(format!("{}: {}", path.display(), e)))?;

    if let Ok(key) = std::env::var(API_KEY_ENV) {
        if !key.is_empty() {
            config.api_key = key;
        }
    }

    if config.api_key.is_empty() {
        return Err(ModelError::Config(format!(
            "no API key in {} and {} is not set",
            path.display(),
            API_KEY_ENV
        )));
    }

    info!(
        "Model config loaded: model={}, endpoint={}",
        config.model, config.api_endpoint
    );
    Ok(config)
}

/// Per-process knobs for the query pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSettings {
    pub query_timeout: Duration,
    pub max_result_rows: usize,
    pub max_field_chars: usize,
    /// Require the statement to parse as exactly one query.
    pub strict_parse: bool,
    /// Render fixed HTML for simple template questions instead of calling the model.
    pub template_formatting: bool,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            query_timeout: Duration::from_millis(15_000),
            max_result_rows: 50,
            max_field_chars: 100,
            strict_parse: true,
            template_formatting: false,
        }
    }
}

impl PipelineSettings {
    /// Defaults overridden by `ASKDB_*` environment variables where set and well formed.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut settings = Self::default();

        if let Some(ms) = lookup("ASKDB_QUERY_TIMEOUT_MS").and_then(|v| v.parse::<u64>().ok()) {
            settings.query_timeout = Duration::from_millis(ms);
        }
        if let Some(rows) = lookup("ASKDB_MAX_ROWS").and_then(|v| v.parse::<usize>().ok()) {
            settings.max_result_rows = rows;
        }
        if let Some(strict) = lookup("ASKDB_STRICT_SQL").and_then(|v| parse_flag(&v)) {
            settings.strict_parse = strict;
        }
        if let Some(fast) = lookup("ASKDB_TEMPLATE_FORMATTING").and_then(|v| parse_flag(&v)) {
            settings.template_formatting = fast;
        }

        settings
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

use crate::cache::OnceCache;
use crate::config::{load_model_config, ModelConfig};
use crate::error::ModelError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

/// One request/response exchange with an external language model.
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, ModelError>;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
    thinking_config: ThinkingConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ThinkingConfig {
    thinking_budget: u32,
}

#[derive(Debug, Default, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

impl GenerateResponse {
    /// Text of the first part of the first candidate; empty when absent.
    fn into_text(self) -> String {
        self.candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .and_then(|c| c.parts.into_iter().next())
            .and_then(|p| p.text)
            .unwrap_or_default()
    }
}

enum ConfigSource {
    File(PathBuf),
    Fixed(Arc<ModelConfig>),
}

/// Gemini `generateContent` client. The config file is read on the first call
/// and reused for the life of the client.
pub struct GeminiClient {
    http: reqwest::Client,
    source: ConfigSource,
    config: OnceCache<ModelConfig>,
}

impl GeminiClient {
    pub fn from_config_file(path: impl Into<PathBuf>) -> Self {
        Self {
            http: reqwest::Client::new(),
            source: ConfigSource::File(path.into()),
            config: OnceCache::new(),
        }
    }

    pub fn new(config: ModelConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            source: ConfigSource::Fixed(Arc::new(config)),
            config: OnceCache::new(),
        }
    }

    /// Use a preconfigured HTTP client (proxies, TLS roots, connection limits).
    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    async fn config(&self) -> Result<Arc<ModelConfig>, ModelError> {
        match &self.source {
            ConfigSource::Fixed(config) => Ok(Arc::clone(config)),
            ConfigSource::File(path) => {
                self.config
                    .get_or_try_load(|| load_model_config(path))
                    .await
            }
        }
    }
}

fn endpoint_url(config: &ModelConfig) -> String {
    format!(
        "{}/models/{}:generateContent",
        config.api_endpoint.trim_end_matches('/'),
        config.model
    )
}

#[async_trait]
impl ModelClient for GeminiClient {
    async fn generate(&self, prompt: &str) -> Result<String, ModelError> {
        let config = self.config().await?;
        let url = endpoint_url(&config);
        let started = Instant::now();
        info!("Calling model {} at {}?key=***", config.model, url);

        let body = GenerateRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![Part { text: prompt }],
            }],
            generation_config: GenerationConfig {
                temperature: config.generation.temperature,
                max_output_tokens: config.generation.max_output_tokens,
                thinking_config: ThinkingConfig {
                    thinking_budget: config.generation.thinking_budget,
                },
            },
        };

        let response = self
            .http
            .post(&url)
            .query(&[("key", config.api_key.as_str())])
            .timeout(config.request_timeout())
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("Model API error response: {} - {}", status, body);
            return Err(ModelError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| ModelError::Decode(e.to_string()))?;
        let text = parsed.into_text();

        info!(
            "Model response received in {}ms, length: {}",
            started.elapsed().as_millis(),
            text.len()
        );
        Ok(text)
    }
}

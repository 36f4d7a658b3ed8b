//! Model invocation — resilient text generation over the Gemini API.
//!
//! Split into two layers behind traits:
//! - [`ModelTransport`] — one attempt against one named model
//!   ([`GeminiTransport`] is the production implementation)
//! - [`TextGenerator`] — what the orchestrator consumes;
//!   [`ResilientModelClient`] implements it with timeout classification,
//!   an ordered model-fallback chain, and exponential backoff + jitter.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_retry::strategy::{jitter, ExponentialBackoff};

use crate::config::ModelConfig;

/// Failure classification for one model attempt.
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("model endpoint rate limited: {0}")]
    RateLimited(String),

    #[error("model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("transient upstream failure: {0}")]
    Transient(String),

    #[error("model call failed: {0}")]
    Fatal(String),

    #[error("missing API key")]
    MissingApiKey,

    #[error("giving up after {attempts} attempts (last model: {model}): {source}")]
    Exhausted {
        attempts: u32,
        model: String,
        #[source]
        source: Box<ModelError>,
    },
}

/// Tuning for one `generate` call.
#[derive(Debug, Clone)]
pub struct GenerateOptions {
    /// Primary model, head of the fallback chain.
    pub model: String,
    /// Total attempt budget. Free fallback switches are not counted.
    pub max_retries: u32,
    pub initial_delay: Duration,
}

impl GenerateOptions {
    pub fn from_config(config: &ModelConfig) -> Self {
        Self {
            model: config.model.clone(),
            max_retries: config.max_retries,
            initial_delay: Duration::from_millis(config.retry_delay_ms),
        }
    }
}

/// One attempt against one named model. Implementations are stateless.
#[async_trait]
pub trait ModelTransport: Send + Sync {
    async fn invoke(&self, model: &str, prompt: &str) -> Result<String, ModelError>;
}

/// The seam the orchestrator consumes. Implemented by
/// [`ResilientModelClient`] in production and by scripted doubles in tests.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str, opts: &GenerateOptions)
        -> Result<String, ModelError>;
}

// ============================================================================
// Gemini API structs (private)
// ============================================================================

#[derive(Debug, Serialize)]
struct GenerateRequest {
    contents: Vec<GeminiContent>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiContent {
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiPart {
    text: String,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorResponse {
    error: Option<GeminiErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorDetail {
    code: u16,
    message: String,
    status: Option<String>,
}

// ============================================================================
// GeminiTransport
// ============================================================================

/// Calls the Gemini `generateContent` REST API.
#[derive(Debug, Clone)]
pub struct GeminiTransport {
    client: Client,
    api_key: String,
    base_url: String,
}

impl GeminiTransport {
    pub fn new(api_key: String, request_timeout: Duration) -> Result<Self, ModelError> {
        Self::with_base_url(
            api_key,
            request_timeout,
            "https://generativelanguage.googleapis.com/v1beta".to_string(),
        )
    }

    /// Create a transport with a custom base URL (for testing / integration)
    pub fn with_base_url(
        api_key: String,
        request_timeout: Duration,
        base_url: String,
    ) -> Result<Self, ModelError> {
        if api_key.is_empty() {
            return Err(ModelError::MissingApiKey);
        }

        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| ModelError::Fatal(e.to_string()))?;

        Ok(Self {
            client,
            api_key,
            base_url,
        })
    }

    fn classify_status(status: u16, message: String) -> ModelError {
        let lowered = message.to_lowercase();
        if status == 429 || lowered.contains("quota") || lowered.contains("resource_exhausted") {
            ModelError::RateLimited(message)
        } else if status == 404 || lowered.contains("is not found") {
            ModelError::ModelUnavailable(message)
        } else if status >= 500 || lowered.contains("overloaded") {
            ModelError::Transient(message)
        } else {
            ModelError::Fatal(message)
        }
    }
}

#[async_trait]
impl ModelTransport for GeminiTransport {
    async fn invoke(&self, model: &str, prompt: &str) -> Result<String, ModelError> {
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, model, self.api_key
        );

        let request = GenerateRequest {
            contents: vec![GeminiContent {
                parts: vec![GeminiPart {
                    text: prompt.to_string(),
                }],
            }],
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() || e.is_connect() {
                    ModelError::Transient(e.to_string())
                } else {
                    ModelError::Fatal(e.to_string())
                }
            })?;

        let status = response.status();

        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            let error_detail = serde_json::from_str::<GeminiErrorResponse>(&error_body)
                .ok()
                .and_then(|e| e.error);

            let (code, message) = match error_detail {
                Some(detail) => {
                    let status_tag = detail.status.unwrap_or_default();
                    (detail.code, format!("{} {}", status_tag, detail.message))
                }
                None => (status.as_u16(), error_body),
            };

            tracing::warn!(code = code, model = model, message = %message, "Gemini API error");

            return Err(Self::classify_status(code, message));
        }

        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|e| ModelError::Transient(e.to_string()))?;

        let text: String = body
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(ModelError::Fatal(
                "model returned an empty response".to_string(),
            ));
        }

        Ok(text)
    }
}

// ============================================================================
// ResilientModelClient
// ============================================================================

/// Retry, exponential backoff + jitter, and ordered model fallback over a
/// [`ModelTransport`]. Stateless across calls — the chain lives only
/// within one `generate`.
pub struct ResilientModelClient<T: ModelTransport> {
    transport: T,
    fallback_models: Vec<String>,
    max_backoff: Duration,
}

impl<T: ModelTransport> ResilientModelClient<T> {
    pub fn new(transport: T, fallback_models: Vec<String>, max_backoff: Duration) -> Self {
        Self {
            transport,
            fallback_models,
            max_backoff,
        }
    }

    pub fn from_config(transport: T, config: &ModelConfig) -> Self {
        Self::new(
            transport,
            config.fallback_models.clone(),
            Duration::from_secs(config.max_backoff_seconds),
        )
    }

    fn exhausted(attempts: u32, model: &str, source: ModelError) -> ModelError {
        ModelError::Exhausted {
            attempts,
            model: model.to_string(),
            source: Box::new(source),
        }
    }
}

#[async_trait]
impl<T: ModelTransport> TextGenerator for ResilientModelClient<T> {
    async fn generate(
        &self,
        prompt: &str,
        opts: &GenerateOptions,
    ) -> Result<String, ModelError> {
        let mut remaining: VecDeque<String> = self
            .fallback_models
            .iter()
            .filter(|m| **m != opts.model)
            .cloned()
            .collect();
        let mut model = opts.model.clone();
        let mut tried = vec![model.clone()];
        let mut fallback_used = false;

        let budget = opts.max_retries.max(1);
        let mut attempts: u32 = 0;
        let mut backoff = ExponentialBackoff::from_millis(2)
            .factor((opts.initial_delay.as_millis() as u64 / 2).max(1))
            .max_delay(self.max_backoff)
            .map(jitter);

        enum Action {
            /// Model id not served — advance the chain, once per model.
            Advance,
            /// Rate limit before any fallback was used — switch for free.
            FreeSwitch,
            Backoff,
            GiveUp,
        }

        loop {
            attempts += 1;
            let err = match self.transport.invoke(&model, prompt).await {
                Ok(text) => return Ok(text),
                Err(e) => e,
            };

            let action = match &err {
                ModelError::ModelUnavailable(_) => Action::Advance,
                ModelError::RateLimited(_) if !fallback_used => Action::FreeSwitch,
                ModelError::RateLimited(_) | ModelError::Transient(_) => Action::Backoff,
                _ => Action::GiveUp,
            };

            match action {
                Action::Advance => match remaining.pop_front() {
                    Some(next) => {
                        tracing::warn!(from = %model, to = %next, "model not served, advancing fallback chain");
                        model = next;
                        tried.push(model.clone());
                        fallback_used = true;
                        attempts -= 1;
                        continue;
                    }
                    None => {
                        return Err(ModelError::ModelUnavailable(format!(
                            "no serving model in chain [{}]: {err}",
                            tried.join(", ")
                        )));
                    }
                },
                Action::FreeSwitch => {
                    if let Some(next) = remaining.pop_front() {
                        tracing::warn!(from = %model, to = %next, "rate limited on primary model, switching to fallback");
                        model = next;
                        tried.push(model.clone());
                        fallback_used = true;
                        attempts -= 1;
                        continue;
                    }
                    // No fallback left — backed off below like any rate limit.
                }
                Action::Backoff => {}
                Action::GiveUp => return Err(Self::exhausted(attempts, &model, err)),
            }

            if attempts >= budget {
                return Err(Self::exhausted(attempts, &model, err));
            }

            let delay = backoff.next().unwrap_or(self.max_backoff);
            tracing::warn!(
                model = %model,
                attempt = attempts,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "model call failed, backing off"
            );
            tokio::time::sleep(delay).await;
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

// chat-service-rs/src/gemini_client.rs
//
// HTTP client for the Gemini generateContent API.
//
// This module provides:
// - Real HTTP calls to the generative backend via reqwest
// - A bounded exponential backoff retry mechanism for retryable failures
// - Error classification separating retryable from non-retryable failures
// - Configuration via environment variables
//
// Configuration (.env file):
// - GEMINI_API_KEY: API key for the backend (checked at startup)
// - GEMINI_API_URL: API base URL (defaults to the public v1beta endpoint)
// - GEMINI_MODEL: Model identity (default: "gemini-1.5-flash")
// - GEMINI_REQUEST_TIMEOUT_SECS: Hard deadline per attempt (default: 30)
// - GEMINI_MAX_RETRIES: Maximum retry attempts (default: 2)
// - GEMINI_INITIAL_RETRY_DELAY_MS: Initial backoff delay (default: 1000)
// - GEMINI_MAX_RETRY_DELAY_MS: Maximum backoff delay (default: 15000)
// - GEMINI_MAX_OUTPUT_TOKENS / GEMINI_TEMPERATURE: generation policy

use async_trait::async_trait;
use backoff::{backoff::Backoff, ExponentialBackoff, ExponentialBackoffBuilder};
use rand::Rng;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::history::{Role, Turn};

/// Displayable stand-in for an empty or blank model reply. An empty reply is
/// degraded, not fatal: the pipeline always yields something renderable.
pub const EMPTY_REPLY_PLACEHOLDER: &str = "No response generated";

/// Generation limits attached to every call. Fixed per deployment,
/// never user-controlled.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationPolicy {
    pub max_output_tokens: u32,
    pub temperature: f32,
}

impl Default for GenerationPolicy {
    fn default() -> Self {
        Self {
            max_output_tokens: 1500,
            temperature: 0.7,
        }
    }
}

impl GenerationPolicy {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_output_tokens: config_rs::env_or(
                "GEMINI_MAX_OUTPUT_TOKENS",
                defaults.max_output_tokens,
            ),
            temperature: config_rs::env_or("GEMINI_TEMPERATURE", defaults.temperature)
                .clamp(0.0, 1.0),
        }
    }
}

/// Gateway failure taxonomy. The variant decides retryability; the payload
/// keeps the upstream detail for the operator log and is never shown
/// verbatim to end users.
#[derive(Error, Debug)]
pub enum GatewayError {
    // Non-retryable: client-side errors that retrying will not fix
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    // Retryable with increasing delays
    #[error("Rate limit exceeded: {0}")]
    RateLimited(String),
    #[error("Server error: {0}")]
    ServerError(String),
    #[error("Network error: {0}")]
    NetworkError(String),
    #[error("Request timed out: {0}")]
    Timeout(String),

    // Other
    #[error("Parse error: {0}")]
    ParseError(String),
    #[error("Unknown error: {0}")]
    Unknown(String),
}

fn is_retryable(error: &GatewayError) -> bool {
    matches!(
        error,
        GatewayError::ServerError(_)
            | GatewayError::NetworkError(_)
            | GatewayError::Timeout(_)
            | GatewayError::RateLimited(_)
    )
}

/// Seam between the orchestration flow and the concrete backend client.
/// The endpoint treats the backend as a black-box function text -> text.
#[async_trait]
pub trait GenerativeBackend: Send + Sync {
    async fn generate(
        &self,
        history: &[Turn],
        prompt: &str,
        policy: &GenerationPolicy,
    ) -> Result<String, GatewayError>;
}

// --- Wire types (Gemini generateContent REST contract) ---

#[derive(Debug, Serialize)]
struct GenerateContentRequest {
    contents: Vec<WireContent>,
    #[serde(rename = "generationConfig")]
    generation_config: WireGenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireContent {
    role: String,
    parts: Vec<WirePart>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WirePart {
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireGenerationConfig {
    max_output_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
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
    parts: Vec<WirePart>,
}

// Joins the first candidate's text parts; blank output maps to the
// degraded-reply placeholder.
fn extract_reply_text(response: GenerateContentResponse) -> String {
    let text = response
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
        EMPTY_REPLY_PLACEHOLDER.to_string()
    } else {
        text
    }
}

#[derive(Debug)]
pub struct GeminiClient {
    client: Client,
    api_key: String,
    api_url: String,
    model: String,
    max_retries: u32,
    initial_retry_delay_ms: u64,
    max_retry_delay_ms: u64,
}

impl GeminiClient {
    /// Creates a client configured from environment variables. The API key
    /// is required and validated by the caller at startup.
    pub fn new(api_key: String) -> Self {
        let api_url = std::env::var("GEMINI_API_URL")
            .unwrap_or_else(|_| "https://generativelanguage.googleapis.com/v1beta".to_string());
        let model =
            std::env::var("GEMINI_MODEL").unwrap_or_else(|_| "gemini-1.5-flash".to_string());

        let timeout_secs: u64 = config_rs::env_or("GEMINI_REQUEST_TIMEOUT_SECS", 30);
        let max_retries = config_rs::env_or("GEMINI_MAX_RETRIES", 2);
        let initial_retry_delay_ms = config_rs::env_or("GEMINI_INITIAL_RETRY_DELAY_MS", 1000);
        let max_retry_delay_ms = config_rs::env_or("GEMINI_MAX_RETRY_DELAY_MS", 15000);

        // The backend may stall; an explicit deadline bounds every attempt
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .unwrap_or_default();

        log::info!(
            "Gemini client initialized (model: {}, timeout: {}s, max retries: {})",
            model,
            timeout_secs,
            max_retries
        );

        Self {
            client,
            api_key,
            api_url,
            model,
            max_retries,
            initial_retry_delay_ms,
            max_retry_delay_ms,
        }
    }

    fn create_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_millis(self.initial_retry_delay_ms))
            .with_max_interval(Duration::from_millis(self.max_retry_delay_ms))
            .with_multiplier(2.0)
            .with_max_elapsed_time(Some(Duration::from_secs(60)))
            .with_randomization_factor(0.5)
            .build()
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.api_url.trim_end_matches('/'),
            self.model
        )
    }

    async fn execute_request(
        &self,
        request_body: &GenerateContentRequest,
    ) -> Result<String, GatewayError> {
        let response = match self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(request_body)
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(err) => {
                if err.is_timeout() {
                    return Err(GatewayError::Timeout(format!("Request timed out: {}", err)));
                } else if err.is_connect() {
                    return Err(GatewayError::NetworkError(format!(
                        "Connection failed: {}",
                        err
                    )));
                } else {
                    return Err(GatewayError::NetworkError(format!("Network error: {}", err)));
                }
            }
        };

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();

            return match status.as_u16() {
                400 => Err(GatewayError::InvalidRequest(format!("Bad request: {}", text))),
                401 => Err(GatewayError::InvalidRequest(format!("Unauthorized: {}", text))),
                403 => Err(GatewayError::InvalidRequest(format!("Forbidden: {}", text))),
                404 => Err(GatewayError::InvalidRequest(format!("Not found: {}", text))),
                429 => Err(GatewayError::RateLimited(format!(
                    "Rate limit exceeded: {}",
                    text
                ))),
                500 | 502 | 503 | 504 => Err(GatewayError::ServerError(format!(
                    "Server error ({}): {}",
                    status, text
                ))),
                _ => Err(GatewayError::Unknown(format!(
                    "Unknown error ({}): {}",
                    status, text
                ))),
            };
        }

        match response.json::<GenerateContentResponse>().await {
            Ok(data) => Ok(extract_reply_text(data)),
            Err(err) => Err(GatewayError::ParseError(format!(
                "Failed to parse response: {}",
                err
            ))),
        }
    }
}

#[async_trait]
impl GenerativeBackend for GeminiClient {
    /// Submit prior turns plus the newest instruction payload, with retry.
    ///
    /// Exactly one call is outstanding at any moment: retries are strictly
    /// sequential, bounded by max_retries and the backoff's elapsed-time
    /// cap, and only fire for retryable classes. The upstream call has no
    /// side effects beyond generating text, so retrying is idempotent.
    async fn generate(
        &self,
        history: &[Turn],
        prompt: &str,
        policy: &GenerationPolicy,
    ) -> Result<String, GatewayError> {
        let mut contents: Vec<WireContent> = history
            .iter()
            .map(|turn| WireContent {
                role: match turn.role {
                    Role::User => "user".to_string(),
                    Role::Model => "model".to_string(),
                },
                parts: vec![WirePart {
                    text: turn.content.clone(),
                }],
            })
            .collect();
        contents.push(WireContent {
            role: "user".to_string(),
            parts: vec![WirePart {
                text: prompt.to_string(),
            }],
        });

        let request_body = GenerateContentRequest {
            contents,
            generation_config: WireGenerationConfig {
                max_output_tokens: policy.max_output_tokens,
                temperature: policy.temperature,
            },
        };

        log::info!(
            "Preparing backend request (model: {}, history turns: {})",
            self.model,
            history.len()
        );

        let mut backoff = self.create_backoff();
        let mut attempt = 0;

        loop {
            attempt += 1;

            if attempt > 1 {
                log::info!("Retry attempt {} for backend request", attempt);
            }

            match self.execute_request(&request_body).await {
                Ok(response) => return Ok(response),
                Err(err) => {
                    if !is_retryable(&err) || attempt > self.max_retries {
                        log::error!("Backend request failed after {} attempt(s): {}", attempt, err);
                        return Err(err);
                    }

                    if let Some(backoff_duration) = backoff.next_backoff() {
                        log::warn!("Retryable error: {}. Retrying in {:?}", err, backoff_duration);

                        // Small extra jitter so concurrent turns do not
                        // retry in lockstep
                        let jitter = rand::thread_rng().gen_range(0..=200);
                        tokio::time::sleep(backoff_duration + Duration::from_millis(jitter)).await;
                    } else {
                        log::error!("Exceeded maximum backoff time: {}", err);
                        return Err(err);
                    }
                }
            }
        }
    }
}

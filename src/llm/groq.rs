//! HTTP client for OpenAI-compatible chat-completions endpoints
//!
//! Defaults target Groq, but any service exposing `/chat/completions` with
//! bearer authentication works.
//!
//! # Example
//!
//! ```ignore
//! use report_pipeline::llm::GroqClient;
//!
//! let client = GroqClient::new(std::env::var("GROQ_API_KEY")?, "llama3-8b-8192")
//!     .with_timeout(60);
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::client::{AnalysisRequest, AnalysisService};
use super::config::{DEFAULT_BASE_URL, ServiceSettings};
use super::error::{ServiceError, ServiceResult};
use super::prompt::{SYSTEM_PROMPT, build_prompt};

/// Chat-completions client
#[derive(Debug, Clone)]
pub struct GroqClient {
    base_url: String,
    model: String,
    api_key: String,
    /// Request timeout in seconds
    timeout_seconds: u64,
    temperature: f32,
    max_tokens: u32,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: usize,
    #[serde(default)]
    completion_tokens: usize,
}

impl GroqClient {
    /// Create a client for the default endpoint
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: model.into(),
            api_key: api_key.into(),
            timeout_seconds: 30,
            temperature: 0.3,
            max_tokens: 1500,
            client: reqwest::Client::new(),
        }
    }

    /// Create a client from configuration; fails when no API key is set
    pub fn from_settings(settings: &ServiceSettings) -> ServiceResult<Self> {
        let api_key = settings
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or_else(|| ServiceError::Auth("no API key configured".to_string()))?;
        Ok(Self::new(api_key, settings.model.clone())
            .with_base_url(settings.base_url.clone())
            .with_temperature(settings.temperature)
            .with_max_tokens(settings.max_tokens))
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Set the request timeout
    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.timeout_seconds = seconds;
        self
    }

    /// Set the temperature for sampling
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature.clamp(0.0, 2.0);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn map_send_error(&self, e: reqwest::Error) -> ServiceError {
        if e.is_timeout() {
            ServiceError::Timeout(self.timeout_seconds)
        } else if e.is_connect() {
            ServiceError::Connection(format!("Failed to connect to {}: {}", self.base_url, e))
        } else if e.is_builder() {
            ServiceError::InvalidRequest(e.to_string())
        } else {
            ServiceError::Connection(e.to_string())
        }
    }
}

/// Map a non-success HTTP status to a service error
fn status_error(status: u16, body: String, retry_after: Option<u64>) -> ServiceError {
    match status {
        401 | 403 => ServiceError::Auth(format!("HTTP {status}: {body}")),
        429 => ServiceError::RateLimited(retry_after.unwrap_or(60)),
        500..=599 => ServiceError::Server { status, body },
        _ => ServiceError::Client { status, body },
    }
}

#[async_trait]
impl AnalysisService for GroqClient {
    async fn analyze(&self, request: &AnalysisRequest) -> ServiceResult<String> {
        let url = format!("{}/chat/completions", self.base_url);
        let prompt = build_prompt(request);
        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt,
                },
            ],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        tracing::debug!(url = %url, model = %self.model, "Sending chat completion request");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .timeout(std::time::Duration::from_secs(self.timeout_seconds))
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok());
            let error_text = response.text().await.unwrap_or_default();
            return Err(status_error(status.as_u16(), error_text, retry_after));
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::InvalidResponse(e.to_string()))?;

        if let Some(usage) = &chat.usage {
            tracing::debug!(
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "Chat completion received"
            );
        }

        chat.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| ServiceError::InvalidResponse("response has no message content".to_string()))
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

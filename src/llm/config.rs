//! Configuration for AI analysis

use serde::{Deserialize, Serialize};

use super::digest::DigestConfig;
use super::retry::RetryPolicy;

/// Default OpenAI-compatible endpoint
pub const DEFAULT_BASE_URL: &str = "https://api.groq.com/openai/v1";

/// Default chat model
pub const DEFAULT_MODEL: &str = "llama3-8b-8192";

/// How the analysis client talks to the service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Per-attempt time limit in milliseconds
    #[serde(default = "default_attempt_timeout_ms")]
    pub attempt_timeout_ms: u64,

    #[serde(default)]
    pub retry: RetryPolicy,

    #[serde(default)]
    pub digest: DigestConfig,

    #[serde(default)]
    pub service: ServiceSettings,
}

fn default_attempt_timeout_ms() -> u64 {
    30_000
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            attempt_timeout_ms: default_attempt_timeout_ms(),
            retry: RetryPolicy::default(),
            digest: DigestConfig::default(),
            service: ServiceSettings::default(),
        }
    }
}

impl AnalysisConfig {
    pub fn with_attempt_timeout_ms(mut self, ms: u64) -> Self {
        self.attempt_timeout_ms = ms;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_digest(mut self, digest: DigestConfig) -> Self {
        self.digest = digest;
        self
    }
}

/// Connection settings for the chat-completions service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceSettings {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_model")]
    pub model: String,

    /// Secret; normally supplied through `GROQ_API_KEY`
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,

    /// Sampling temperature (0.0 = deterministic)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Completion length limit
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_temperature() -> f32 {
    0.3
}

fn default_max_tokens() -> u32 {
    1500
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            api_key: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AnalysisConfig::default();
        assert_eq!(config.attempt_timeout_ms, 30_000);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.service.model, "llama3-8b-8192");
        assert!(config.service.api_key.is_none());
    }

    #[test]
    fn test_partial_toml() {
        let config: AnalysisConfig = toml::from_str(
            r#"
            attempt_timeout_ms = 5000

            [retry]
            max_attempts = 5

            [digest]
            method = "head"
            "#,
        )
        .unwrap();
        assert_eq!(config.attempt_timeout_ms, 5000);
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.initial_backoff_ms, 500);
        assert_eq!(config.digest.method, crate::llm::digest::SampleMethod::Head);
        assert_eq!(config.service.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn test_api_key_is_never_serialized() {
        let mut config = AnalysisConfig::default();
        config.service.api_key = Some("secret".to_string());
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("secret"));
    }
}

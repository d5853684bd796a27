//! Pipeline configuration types
//!
//! Loaded from TOML. Secrets are normally left out of the file and supplied
//! through the environment (`GROQ_API_KEY`, `MAIL_API_TOKEN`, ...).

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::error::{PipelineError, PipelineResult};
use crate::delivery::DeliveryConfig;
use crate::export::{BrandingConfig, ChartStyle, ComposeConfig};
use crate::import::DEFAULT_MAX_BYTES;
use crate::llm::AnalysisConfig;

/// Main pipeline configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Jobs processed at the same time
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Seconds a worker may hold a job without renewing its lease
    #[serde(default = "default_lease_ttl_seconds")]
    pub lease_ttl_seconds: u64,

    /// Upload size ceiling in bytes
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,

    /// Schema catalog file (YAML or JSON); the built-in catalog when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalog_path: Option<PathBuf>,

    /// Exchange-rate table (JSON or TOML); identity rates when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rates_path: Option<PathBuf>,

    #[serde(default)]
    pub analysis: AnalysisConfig,

    #[serde(default)]
    pub delivery: DeliveryConfig,

    #[serde(default)]
    pub mail: MailSettings,

    #[serde(default)]
    pub compose: ComposeConfig,

    #[serde(default)]
    pub chart: ChartStyle,

    #[serde(default)]
    pub branding: BrandingConfig,
}

fn default_workers() -> usize {
    4
}

fn default_lease_ttl_seconds() -> u64 {
    300
}

fn default_max_upload_bytes() -> usize {
    DEFAULT_MAX_BYTES
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            lease_ttl_seconds: default_lease_ttl_seconds(),
            max_upload_bytes: default_max_upload_bytes(),
            catalog_path: None,
            rates_path: None,
            analysis: AnalysisConfig::default(),
            delivery: DeliveryConfig::default(),
            mail: MailSettings::default(),
            compose: ComposeConfig::default(),
            chart: ChartStyle::default(),
            branding: BrandingConfig::default(),
        }
    }
}

/// Mail API connection settings
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MailSettings {
    /// HTTP endpoint of the mail API; messages are only logged when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    /// Secret; normally supplied through `MAIL_API_TOKEN`
    #[serde(default, skip_serializing)]
    pub api_token: Option<String>,
}

impl MailSettings {
    pub fn is_enabled(&self) -> bool {
        self.api_url.is_some()
    }
}

impl PipelineConfig {
    /// Create a new pipeline config
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse TOML content
    pub fn from_toml_str(content: &str) -> PipelineResult<Self> {
        toml::from_str(content)
            .map_err(|e| PipelineError::ConfigError(format!("invalid TOML: {e}")))
    }

    /// Load a TOML file
    pub fn load(path: impl AsRef<Path>) -> PipelineResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::ConfigError(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }

    /// Apply overrides from the process environment
    pub fn with_env(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from `lookup`, which maps variable names to values
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(key) = get("GROQ_API_KEY") {
            self.analysis.service.api_key = Some(key);
        }
        if let Some(model) = get("GROQ_MODEL") {
            self.analysis.service.model = model;
        }
        if let Some(url) = get("MAIL_API_URL") {
            self.mail.api_url = Some(url);
        }
        if let Some(token) = get("MAIL_API_TOKEN") {
            self.mail.api_token = Some(token);
        }
        if let Some(from) = get("MAIL_FROM") {
            self.delivery.from = from;
        }
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_lease_ttl_seconds(mut self, seconds: u64) -> Self {
        self.lease_ttl_seconds = seconds;
        self
    }

    pub fn with_max_upload_bytes(mut self, max_bytes: usize) -> Self {
        self.max_upload_bytes = max_bytes;
        self
    }

    pub fn with_catalog_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.catalog_path = Some(path.into());
        self
    }

    pub fn with_rates_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.rates_path = Some(path.into());
        self
    }

    pub fn with_analysis(mut self, analysis: AnalysisConfig) -> Self {
        self.analysis = analysis;
        self
    }

    pub fn with_delivery(mut self, delivery: DeliveryConfig) -> Self {
        self.delivery = delivery;
        self
    }

    pub fn with_branding(mut self, branding: BrandingConfig) -> Self {
        self.branding = branding;
        self
    }

    pub fn lease_ttl(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.lease_ttl_seconds)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.workers == 0 {
            return Err("At least one worker is required".to_string());
        }
        if self.lease_ttl_seconds == 0 {
            return Err("Lease TTL must be positive".to_string());
        }
        if self.max_upload_bytes == 0 {
            return Err("Upload size limit must be positive".to_string());
        }
        if self.analysis.retry.max_attempts == 0 || self.delivery.retry.max_attempts == 0 {
            return Err("Retry policies need at least one attempt".to_string());
        }
        if self.analysis.attempt_timeout_ms == 0 {
            return Err("Analysis attempt timeout must be positive".to_string());
        }
        if self.analysis.digest.sample_size == 0 {
            return Err("Digest sample size must be positive".to_string());
        }
        let threshold = self.compose.high_value_threshold;
        if !threshold.is_finite() || threshold < 0.0 {
            return Err("High-value threshold must be a non-negative amount".to_string());
        }
        if self.mail.is_enabled()
            && self
                .mail
                .api_token
                .as_deref()
                .is_none_or(|t| t.trim().is_empty())
        {
            return Err("Mail API URL is set but MAIL_API_TOKEN is missing".to_string());
        }
        Ok(())
    }
}

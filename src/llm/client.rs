//! Analysis service trait
//!
//! `AnalysisService` is the network seam of the analysis stage. The retrying
//! [`AnalysisClient`](super::AnalysisClient) drives any implementation: the
//! HTTP client for OpenAI-compatible endpoints, or a scripted double in tests.

use async_trait::async_trait;
use serde::Serialize;

use super::digest::AnalysisPayload;
use super::error::ServiceResult;

/// Version of the request/response contract with the service
pub const SCHEMA_VERSION: &str = "1";

/// One analysis request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisRequest {
    pub schema_version: String,
    pub report_type: String,
    pub title: String,
    /// Report-specific guidance from the schema catalog
    pub instructions: String,
    pub base_currency: String,
    pub total_rows: usize,
    pub payload: AnalysisPayload,
}

impl AnalysisRequest {
    /// True when the payload is a digest rather than every row
    pub fn is_sampled(&self) -> bool {
        self.payload.is_digest()
    }
}

/// Trait for analysis service implementations
#[async_trait]
pub trait AnalysisService: Send + Sync {
    /// Send the request and return the raw response text
    async fn analyze(&self, request: &AnalysisRequest) -> ServiceResult<String>;

    /// Get the model name being used
    fn model_name(&self) -> &str;
}

/// A mock analysis service that always gives the same answer
#[cfg(test)]
pub struct MockAnalysisService {
    response: super::error::ServiceResult<String>,
}

#[cfg(test)]
impl MockAnalysisService {
    pub fn new(response: impl Into<String>) -> Self {
        Self {
            response: Ok(response.into()),
        }
    }

    pub fn failing(error: super::error::ServiceError) -> Self {
        Self {
            response: Err(error),
        }
    }
}

#[cfg(test)]
#[async_trait]
impl AnalysisService for MockAnalysisService {
    async fn analyze(&self, _request: &AnalysisRequest) -> ServiceResult<String> {
        self.response.clone()
    }

    fn model_name(&self) -> &str {
        "mock-model"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::error::ServiceError;

    fn request() -> AnalysisRequest {
        AnalysisRequest {
            schema_version: SCHEMA_VERSION.to_string(),
            report_type: "campus_assets".to_string(),
            title: "Assets".to_string(),
            instructions: String::new(),
            base_currency: "INR".to_string(),
            total_rows: 0,
            payload: AnalysisPayload::Rows {
                columns: vec![],
                rows: vec![],
            },
        }
    }

    #[tokio::test]
    async fn test_mock_service() {
        let service = MockAnalysisService::new("{}");
        assert_eq!(service.model_name(), "mock-model");
        assert_eq!(service.analyze(&request()).await.unwrap(), "{}");

        let failing = MockAnalysisService::failing(ServiceError::Timeout(1));
        assert!(failing.analyze(&request()).await.is_err());
    }

    #[test]
    fn test_request_serializes_payload_kind() {
        let json = serde_json::to_value(request()).unwrap();
        assert_eq!(json["payload"]["kind"], "rows");
        assert_eq!(json["schema_version"], "1");
        assert!(!request().is_sampled());
    }
}

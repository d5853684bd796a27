//! Retrying analysis client
//!
//! Wraps an [`AnalysisService`] with a per-attempt timeout and the retry
//! policy. Transient failures are retried with backoff; fatal and parse
//! failures end the analysis at once. Every attempt is recorded.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::client::{AnalysisRequest, AnalysisService, SCHEMA_VERSION};
use super::config::AnalysisConfig;
use super::digest::build_payload;
use super::error::{AnalysisError, AnalysisOpResult, AttemptFailure};
use super::prompt::{ResponseFault, parse_response};
use super::retry::RetryDecision;
use crate::catalog::ReportSchema;
use crate::models::{AnalysisResult, AttemptOutcome, AttemptRecord, NormalizedTable};

/// Successful analysis with the attempts it took
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisOutcome {
    pub result: AnalysisResult,
    pub attempts: Vec<AttemptRecord>,
}

/// Drives one analysis service under the configured retry policy
#[derive(Clone)]
pub struct AnalysisClient {
    service: Arc<dyn AnalysisService>,
    config: AnalysisConfig,
}

impl AnalysisClient {
    pub fn new(service: Arc<dyn AnalysisService>, config: AnalysisConfig) -> Self {
        Self { service, config }
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn model_name(&self) -> &str {
        self.service.model_name()
    }

    /// Build the request for a normalized table, digesting it when too large
    pub fn build_request(&self, schema: &ReportSchema, table: &NormalizedTable) -> AnalysisRequest {
        let (payload, _) = build_payload(table, &self.config.digest);
        AnalysisRequest {
            schema_version: SCHEMA_VERSION.to_string(),
            report_type: schema.report_type.clone(),
            title: schema.title.clone(),
            instructions: schema.analysis_instructions.clone(),
            base_currency: table.base_currency.clone(),
            total_rows: table.row_count(),
            payload,
        }
    }

    /// Analyze a normalized table
    pub async fn analyze(
        &self,
        schema: &ReportSchema,
        table: &NormalizedTable,
    ) -> AnalysisOpResult<AnalysisOutcome> {
        let request = self.build_request(schema, table);
        self.run(&request).await
    }

    /// Send `request` until it succeeds, fails for good, or attempts run out
    pub async fn run(&self, request: &AnalysisRequest) -> AnalysisOpResult<AnalysisOutcome> {
        let timeout = Duration::from_millis(self.config.attempt_timeout_ms);
        let mut state = self.config.retry.start();
        let mut history: Vec<AttemptRecord> = Vec::new();

        loop {
            let attempt = state.start_attempt();
            let started = Instant::now();
            debug!(
                attempt,
                model = self.service.model_name(),
                sampled = request.is_sampled(),
                "Sending analysis request"
            );

            let attempt_result = match tokio::time::timeout(timeout, self.service.analyze(request))
                .await
            {
                Err(_) => Err(AttemptFailure::Transient(format!(
                    "attempt timed out after {} ms",
                    self.config.attempt_timeout_ms
                ))),
                Ok(Err(e)) => Err(e.classify()),
                Ok(Ok(text)) => parse_response(&text).map_err(|fault| match fault {
                    ResponseFault::Transient(msg) => AttemptFailure::Transient(msg),
                    ResponseFault::Fatal(msg) => AttemptFailure::Fatal(msg),
                    ResponseFault::Invalid(msg) => AttemptFailure::Parse(msg),
                }),
            };

            let failure = match attempt_result {
                Ok(parsed) => {
                    history.push(AttemptRecord {
                        attempt,
                        outcome: AttemptOutcome::Success,
                        duration_ms: elapsed_ms(started),
                    });
                    info!(attempts = attempt, "Analysis completed");
                    return Ok(AnalysisOutcome {
                        result: AnalysisResult {
                            summary_text: parsed.summary,
                            key_findings: parsed.key_findings,
                            metrics: parsed.metrics,
                            confidence: parsed.confidence,
                            sampled: request.is_sampled(),
                            model: self.service.model_name().to_string(),
                            schema_version: parsed.schema_version,
                        },
                        attempts: history,
                    });
                }
                Err(failure) => failure,
            };

            history.push(AttemptRecord {
                attempt,
                outcome: failure.clone().into(),
                duration_ms: elapsed_ms(started),
            });

            match failure {
                AttemptFailure::Transient(last) => match state.on_transient_failure() {
                    RetryDecision::RetryAfter(delay) => {
                        warn!(
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %last,
                            "Transient analysis failure, retrying"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    RetryDecision::GiveUp => {
                        return Err(AnalysisError::Transient {
                            attempts: attempt,
                            last,
                            history,
                        });
                    }
                },
                AttemptFailure::Fatal(message) => {
                    return Err(AnalysisError::Fatal { message, history });
                }
                AttemptFailure::Parse(message) => {
                    return Err(AnalysisError::Parse { message, history });
                }
            }
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::client::MockAnalysisService;
    use crate::llm::error::ServiceError;
    use crate::llm::retry::RetryPolicy;
    use crate::models::{NormalizedRow, Value};

    const GOOD: &str = r#"{"schema_version": "1", "summary": "Fine.", "key_findings": [], "metrics": {"rows": 1}, "confidence": 0.9}"#;

    fn schema() -> ReportSchema {
        crate::catalog::SchemaCatalog::builtin()
            .unwrap()
            .get("campus_assets")
            .unwrap()
            .clone()
    }

    fn table() -> NormalizedTable {
        NormalizedTable {
            report_type: "campus_assets".to_string(),
            columns: vec!["device_name".to_string()],
            rows: vec![NormalizedRow {
                source_index: 0,
                values: vec![Value::Text("Laptop".to_string())],
                merge_count: 1,
            }],
            base_currency: "INR".to_string(),
            rates_version: "v1".to_string(),
        }
    }

    fn client(service: MockAnalysisService) -> AnalysisClient {
        AnalysisClient::new(
            Arc::new(service),
            AnalysisConfig::default().with_retry(RetryPolicy::immediate(3)),
        )
    }

    #[tokio::test]
    async fn test_success_on_first_attempt() {
        let outcome = client(MockAnalysisService::new(GOOD))
            .analyze(&schema(), &table())
            .await
            .unwrap();
        assert_eq!(outcome.attempts.len(), 1);
        assert!(outcome.attempts[0].is_success());
        assert_eq!(outcome.result.model, "mock-model");
        assert!(!outcome.result.sampled);
        assert_eq!(outcome.result.metrics["rows"], 1.0);
    }

    #[tokio::test]
    async fn test_transient_failure_exhausts_attempts() {
        let err = client(MockAnalysisService::failing(ServiceError::Server {
            status: 502,
            body: "bad gateway".to_string(),
        }))
        .analyze(&schema(), &table())
        .await
        .unwrap_err();
        assert!(matches!(err, AnalysisError::Transient { attempts: 3, .. }));
        assert_eq!(err.history().len(), 3);
    }

    #[tokio::test]
    async fn test_fatal_failure_is_not_retried() {
        let err = client(MockAnalysisService::failing(ServiceError::Client {
            status: 400,
            body: "bad request".to_string(),
        }))
        .analyze(&schema(), &table())
        .await
        .unwrap_err();
        assert!(matches!(err, AnalysisError::Fatal { .. }));
        assert_eq!(err.history().len(), 1);
    }

    #[tokio::test]
    async fn test_unparseable_response_is_not_retried() {
        let err = client(MockAnalysisService::new("not json at all"))
            .analyze(&schema(), &table())
            .await
            .unwrap_err();
        assert!(matches!(err, AnalysisError::Parse { .. }));
        assert_eq!(err.history().len(), 1);
    }

    #[test]
    fn test_request_uses_schema_metadata() {
        let client = client(MockAnalysisService::new(GOOD));
        let request = client.build_request(&schema(), &table());
        assert_eq!(request.title, "Campus Assets Management System");
        assert_eq!(request.total_rows, 1);
        assert!(!request.is_sampled());
    }
}

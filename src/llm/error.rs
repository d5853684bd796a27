//! Error types for AI analysis
//!
//! `ServiceError` describes a single failed call to the analysis service;
//! `AnalysisError` is what the retrying client reports once it gives up.

use thiserror::Error;

use crate::models::{AttemptOutcome, AttemptRecord};

/// Failure of one call to an analysis service
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ServiceError {
    /// Request timed out
    #[error("Analysis request timed out after {0} seconds")]
    Timeout(u64),

    /// Failed to reach the service
    #[error("Failed to connect to analysis service: {0}")]
    Connection(String),

    /// Rate limiting
    #[error("Rate limited by analysis service, retry after {0} seconds")]
    RateLimited(u64),

    /// 5xx response
    #[error("Analysis service error (HTTP {status}): {body}")]
    Server { status: u16, body: String },

    /// 4xx response other than auth and rate limiting
    #[error("Analysis request rejected (HTTP {status}): {body}")]
    Client { status: u16, body: String },

    /// Missing or rejected credentials
    #[error("Analysis service authentication failed: {0}")]
    Auth(String),

    /// The request could not be built
    #[error("Invalid analysis request: {0}")]
    InvalidRequest(String),

    /// The service answered with a body that is not a completion
    #[error("Invalid analysis service response: {0}")]
    InvalidResponse(String),
}

/// Result type for analysis service calls
pub type ServiceResult<T> = Result<T, ServiceError>;

impl ServiceError {
    /// Check if this error is worth retrying
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ServiceError::Timeout(_)
                | ServiceError::Connection(_)
                | ServiceError::RateLimited(_)
                | ServiceError::Server { .. }
        )
    }

    /// How the retrying client treats this failure
    pub fn classify(&self) -> AttemptFailure {
        match self {
            e if e.is_transient() => AttemptFailure::Transient(e.to_string()),
            ServiceError::InvalidResponse(msg) => AttemptFailure::Parse(msg.clone()),
            e => AttemptFailure::Fatal(e.to_string()),
        }
    }
}

/// Class of a failed attempt
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptFailure {
    /// Worth retrying
    Transient(String),
    /// Permanent; never retried
    Fatal(String),
    /// Response did not match the expected schema; never retried
    Parse(String),
}

impl From<AttemptFailure> for AttemptOutcome {
    fn from(failure: AttemptFailure) -> Self {
        match failure {
            AttemptFailure::Transient(msg) => AttemptOutcome::Transient(msg),
            AttemptFailure::Fatal(msg) => AttemptOutcome::Fatal(msg),
            AttemptFailure::Parse(msg) => AttemptOutcome::Parse(msg),
        }
    }
}

/// Final failure of an analysis after the retry policy ran its course
#[derive(Error, Debug, Clone)]
pub enum AnalysisError {
    /// Every attempt failed with a transient error
    #[error("Analysis still failing after {attempts} attempts: {last}")]
    Transient {
        attempts: u32,
        last: String,
        history: Vec<AttemptRecord>,
    },

    /// The service rejected the request; never retried
    #[error("Analysis failed: {message}")]
    Fatal {
        message: String,
        history: Vec<AttemptRecord>,
    },

    /// The response did not match the expected schema; never retried
    #[error("Analysis response could not be parsed: {message}")]
    Parse {
        message: String,
        history: Vec<AttemptRecord>,
    },
}

/// Result type for analysis operations
pub type AnalysisOpResult<T> = Result<T, AnalysisError>;

impl AnalysisError {
    /// Every attempt made before giving up
    pub fn history(&self) -> &[AttemptRecord] {
        match self {
            AnalysisError::Transient { history, .. }
            | AnalysisError::Fatal { history, .. }
            | AnalysisError::Parse { history, .. } => history,
        }
    }

    /// Get a user-friendly error message for CLI output
    pub fn user_message(&self) -> String {
        match self {
            AnalysisError::Transient { attempts, .. } => format!(
                "The AI analysis service did not respond after {attempts} attempts.\n\n\
                Hint: The service may be overloaded. Submit the file again later."
            ),
            AnalysisError::Fatal { .. } => "The AI analysis service rejected the request.\n\n\
                Hint: Check the analysis service configuration and API key."
                .to_string(),
            AnalysisError::Parse { .. } => {
                "The AI analysis service returned an answer that could not be understood.\n\n\
                Hint: Try again; if it keeps happening, try a different model."
                    .to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ServiceError::Timeout(30);
        assert_eq!(err.to_string(), "Analysis request timed out after 30 seconds");

        let err = ServiceError::Server {
            status: 503,
            body: "overloaded".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Analysis service error (HTTP 503): overloaded"
        );
    }

    #[test]
    fn test_classification() {
        assert!(matches!(
            ServiceError::RateLimited(60).classify(),
            AttemptFailure::Transient(_)
        ));
        assert!(matches!(
            ServiceError::Connection("refused".to_string()).classify(),
            AttemptFailure::Transient(_)
        ));
        assert!(matches!(
            ServiceError::Client {
                status: 400,
                body: String::new()
            }
            .classify(),
            AttemptFailure::Fatal(_)
        ));
        assert!(matches!(
            ServiceError::Auth("bad key".to_string()).classify(),
            AttemptFailure::Fatal(_)
        ));
        assert!(matches!(
            ServiceError::InvalidResponse("no choices".to_string()).classify(),
            AttemptFailure::Parse(_)
        ));
    }

    #[test]
    fn test_history_access() {
        let err = AnalysisError::Fatal {
            message: "denied".to_string(),
            history: vec![AttemptRecord {
                attempt: 1,
                outcome: AttemptOutcome::Fatal("denied".to_string()),
                duration_ms: 4,
            }],
        };
        assert_eq!(err.history().len(), 1);
        assert!(err.user_message().contains("rejected"));
    }
}

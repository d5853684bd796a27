//! Analysis results returned by the reasoning service

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Structured analysis of a normalized table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub summary_text: String,
    pub key_findings: Vec<String>,
    pub metrics: BTreeMap<String, f64>,
    /// Model confidence in `[0, 1]`
    pub confidence: f64,
    /// True when the service saw a digest instead of every row
    pub sampled: bool,
    /// Model that produced the result
    pub model: String,
    /// Wire schema version of the response
    pub schema_version: String,
}

/// Outcome of one analysis request attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum AttemptOutcome {
    Success,
    Transient(String),
    Fatal(String),
    Parse(String),
}

/// Record of one attempt made by the analysis client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptRecord {
    /// 1-based attempt number
    pub attempt: u32,
    pub outcome: AttemptOutcome,
    pub duration_ms: u64,
}

impl AttemptRecord {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, AttemptOutcome::Success)
    }
}

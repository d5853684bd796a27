//! Prompt construction and response parsing
//!
//! The service is asked for a JSON object in a versioned shape:
//!
//! ```json
//! {
//!   "schema_version": "1",
//!   "summary": "...",
//!   "key_findings": ["..."],
//!   "metrics": {"total_value": 125000.0},
//!   "confidence": 0.82
//! }
//! ```
//!
//! or an error envelope
//! `{"schema_version": "1", "error": {"category": "transient" | "fatal", "message": "..."}}`.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

use super::client::{AnalysisRequest, SCHEMA_VERSION};

/// System message sent with every request
pub const SYSTEM_PROMPT: &str = "You are a data analyst for an institutional resource management \
system. You read tabular inventory data and answer only with the JSON object you are asked for.";

/// User message template
pub const ANALYSIS_PROMPT_TEMPLATE: &str = r#"Analyze the "{title}" data set (report type: {report_type}).
Money values are in {currency}. The data set has {total_rows} rows; {payload_note}

{instructions_section}## Data
```json
{payload}
```

## Output
Return ONLY a JSON object with exactly these fields:
- "schema_version": the string "{schema_version}"
- "summary": two or three sentences describing the data set
- "key_findings": a list of short, specific observations
- "metrics": an object mapping metric names to numbers (totals, counts, averages)
- "confidence": a number between 0 and 1

If you cannot analyze the data, return {"schema_version": "{schema_version}", "error": {"category": "fatal", "message": "<reason>"}} instead."#;

/// Build the user prompt for a request
pub fn build_prompt(request: &AnalysisRequest) -> String {
    let payload_note = if request.is_sampled() {
        "below is a deterministic sample with per-column statistics."
    } else {
        "all rows are included below."
    };
    let instructions_section = if request.instructions.trim().is_empty() {
        String::new()
    } else {
        format!("## Instructions\n{}\n\n", request.instructions.trim())
    };
    let payload = serde_json::to_string_pretty(&request.payload).unwrap_or_default();

    ANALYSIS_PROMPT_TEMPLATE
        .replace("{title}", &request.title)
        .replace("{report_type}", &request.report_type)
        .replace("{currency}", &request.base_currency)
        .replace("{total_rows}", &request.total_rows.to_string())
        .replace("{payload_note}", payload_note)
        .replace("{instructions_section}", &instructions_section)
        .replace("{schema_version}", &request.schema_version)
        .replace("{payload}", &payload)
}

/// Why a response could not be turned into an analysis
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseFault {
    /// The service reported a transient problem in an error envelope
    Transient(String),
    /// The service reported a permanent problem in an error envelope
    Fatal(String),
    /// The text does not match the expected shape
    Invalid(String),
}

/// Fields of a successful analysis response
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedAnalysis {
    pub schema_version: String,
    pub summary: String,
    pub key_findings: Vec<String>,
    pub metrics: BTreeMap<String, f64>,
    pub confidence: f64,
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    schema_version: Option<String>,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    key_findings: Vec<String>,
    #[serde(default)]
    metrics: BTreeMap<String, f64>,
    #[serde(default)]
    confidence: Option<f64>,
    #[serde(default)]
    error: Option<WireError>,
}

#[derive(Debug, Deserialize)]
struct WireError {
    category: String,
    #[serde(default)]
    message: String,
}

static TRAILING_COMMA_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r",(\s*[}\]])").unwrap());

/// Parse the service's response text
///
/// Handles JSON wrapped in markdown code blocks and surrounded by prose, and
/// tolerates trailing commas.
pub fn parse_response(response: &str) -> Result<ParsedAnalysis, ResponseFault> {
    let json_str = extract_json(response);
    let json_str = TRAILING_COMMA_RE.replace_all(&json_str, "$1");

    let wire: WireResponse = serde_json::from_str(&json_str).map_err(|e| {
        ResponseFault::Invalid(format!(
            "Failed to parse JSON: {}. Response was: {}",
            e,
            preview(response)
        ))
    })?;

    let version = wire.schema_version.unwrap_or_default();
    if version != SCHEMA_VERSION {
        return Err(ResponseFault::Invalid(format!(
            "unsupported schema_version '{version}', expected '{SCHEMA_VERSION}'"
        )));
    }

    if let Some(error) = wire.error {
        return Err(match error.category.to_lowercase().as_str() {
            "transient" => ResponseFault::Transient(error.message),
            "fatal" => ResponseFault::Fatal(error.message),
            other => ResponseFault::Invalid(format!("unknown error category '{other}'")),
        });
    }

    let summary = wire
        .summary
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ResponseFault::Invalid("missing summary".to_string()))?;

    let confidence = wire
        .confidence
        .ok_or_else(|| ResponseFault::Invalid("missing confidence".to_string()))?;
    if !(0.0..=1.0).contains(&confidence) {
        return Err(ResponseFault::Invalid(format!(
            "confidence {confidence} is outside [0, 1]"
        )));
    }

    if let Some((name, value)) = wire.metrics.iter().find(|(_, v)| !v.is_finite()) {
        return Err(ResponseFault::Invalid(format!(
            "metric '{name}' is not a finite number ({value})"
        )));
    }

    Ok(ParsedAnalysis {
        schema_version: version,
        summary,
        key_findings: wire
            .key_findings
            .into_iter()
            .map(|f| f.trim().to_string())
            .filter(|f| !f.is_empty())
            .collect(),
        metrics: wire.metrics,
        confidence,
    })
}

fn preview(response: &str) -> String {
    response.chars().take(200).collect()
}

/// Extract JSON from a response that may contain markdown or other text
fn extract_json(response: &str) -> String {
    let trimmed = response.trim();

    // Try to find JSON in code blocks
    if let Some(start) = trimmed.find("```json") {
        let content_start = start + 7;
        if let Some(end) = trimmed[content_start..].find("```") {
            return trimmed[content_start..content_start + end]
                .trim()
                .to_string();
        }
    }

    // Try to find generic code blocks
    if let Some(start) = trimmed.find("```") {
        let content_start = start + 3;
        // Skip language identifier if present
        let content_start = trimmed[content_start..]
            .find('\n')
            .map(|n| content_start + n + 1)
            .unwrap_or(content_start);
        if let Some(end) = trimmed[content_start..].find("```") {
            return trimmed[content_start..content_start + end]
                .trim()
                .to_string();
        }
    }

    // Try to find JSON object directly
    if let Some(start) = trimmed.find('{')
        && let Some(end) = trimmed.rfind('}')
        && end > start
    {
        return trimmed[start..=end].to_string();
    }

    trimmed.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::digest::AnalysisPayload;

    const GOOD: &str = r#"{
        "schema_version": "1",
        "summary": "Twelve assets across three labs.",
        "key_findings": ["Lab 1 holds most of the value", "  "],
        "metrics": {"total_value": 125000.5, "asset_count": 12},
        "confidence": 0.8
    }"#;

    #[test]
    fn test_parse_plain_response() {
        let parsed = parse_response(GOOD).unwrap();
        assert_eq!(parsed.summary, "Twelve assets across three labs.");
        assert_eq!(parsed.key_findings.len(), 1);
        assert_eq!(parsed.metrics["asset_count"], 12.0);
        assert_eq!(parsed.confidence, 0.8);
    }

    #[test]
    fn test_parse_markdown_and_trailing_commas() {
        let response = "Here is the analysis:\n```json\n{\"schema_version\": \"1\", \"summary\": \"ok\", \"key_findings\": [\"a\",], \"confidence\": 0.5,}\n```\nThanks";
        let parsed = parse_response(response).unwrap();
        assert_eq!(parsed.key_findings, vec!["a"]);
        assert!(parsed.metrics.is_empty());
    }

    #[test]
    fn test_error_envelope() {
        let transient = r#"{"schema_version": "1", "error": {"category": "transient", "message": "busy"}}"#;
        assert_eq!(
            parse_response(transient),
            Err(ResponseFault::Transient("busy".to_string()))
        );
        let fatal = r#"{"schema_version": "1", "error": {"category": "FATAL", "message": "no data"}}"#;
        assert_eq!(
            parse_response(fatal),
            Err(ResponseFault::Fatal("no data".to_string()))
        );
    }

    #[test]
    fn test_schema_violations() {
        let wrong_version = GOOD.replace("\"1\"", "\"2\"");
        assert!(matches!(parse_response(&wrong_version), Err(ResponseFault::Invalid(_))));

        let bad_confidence = GOOD.replace("0.8", "1.7");
        assert!(matches!(parse_response(&bad_confidence), Err(ResponseFault::Invalid(_))));

        let no_summary = r#"{"schema_version": "1", "confidence": 0.4}"#;
        assert!(matches!(parse_response(no_summary), Err(ResponseFault::Invalid(_))));

        assert!(matches!(parse_response("I cannot help"), Err(ResponseFault::Invalid(_))));
    }

    #[test]
    fn test_build_prompt() {
        let request = AnalysisRequest {
            schema_version: SCHEMA_VERSION.to_string(),
            report_type: "campus_assets".to_string(),
            title: "Campus Assets".to_string(),
            instructions: "Focus on value per location.".to_string(),
            base_currency: "INR".to_string(),
            total_rows: 1,
            payload: AnalysisPayload::Rows {
                columns: vec!["device_name".to_string()],
                rows: vec![vec![serde_json::json!("Laptop")]],
            },
        };
        let prompt = build_prompt(&request);
        assert!(prompt.contains("\"Campus Assets\""));
        assert!(prompt.contains("Focus on value per location."));
        assert!(prompt.contains("\"Laptop\""));
        assert!(prompt.contains("all rows are included"));
        assert!(!prompt.contains("{schema_version}"));
    }
}

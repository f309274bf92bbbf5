//! Bundled log analyzer.
//!
//! A line-oriented scan of raw client log text. It reports the request
//! tracking id (when present), error and warning counts, and the first
//! few error lines so that a query can be enriched with what the log
//! shows.
//!
//! ```json
//! {
//!   "trackingId": "abc-123",
//!   "lineCount": 420,
//!   "errorCount": 3,
//!   "warningCount": 7,
//!   "errorLines": ["2024-01-01 ERROR join failed", "..."]
//! }
//! ```

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Value};
use tracing::debug;

use knowledge_router_core::error::RetrievalError;

use crate::traits::LogAnalyzer;

/// At most this many error lines are reported.
pub const MAX_ERROR_LINES: usize = 10;

static TRACKING_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)tracking[ _]?id\s*[:=]\s*([A-Za-z0-9][A-Za-z0-9._\-]*)").expect("tracking id pattern"));
static ERROR_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(error|fatal|exception|failed)\b").expect("error line pattern"));
static WARNING_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\b(warn|warning)\b").expect("warning line pattern"));

/// Regex-based [`LogAnalyzer`].
pub struct RegexLogAnalyzer;

#[async_trait]
impl LogAnalyzer for RegexLogAnalyzer {
    async fn analyze(&self, log_input: &str) -> Result<Value, RetrievalError> {
        if log_input.trim().is_empty() {
            return Err(RetrievalError::InvalidResponse("log input is empty".into()));
        }
        let report = analyze_log_text(log_input);
        debug!(
            tracking_id = ?report.get("trackingId"),
            errors = %report["errorCount"],
            "log analysis complete"
        );
        Ok(report)
    }
}

/// Scan `text` and build the report object.
pub fn analyze_log_text(text: &str) -> Value {
    let mut error_count = 0usize;
    let mut warning_count = 0usize;
    let mut error_lines = Vec::new();
    let mut line_count = 0usize;

    for line in text.lines() {
        line_count += 1;
        if ERROR_LINE.is_match(line) {
            error_count += 1;
            if error_lines.len() < MAX_ERROR_LINES {
                error_lines.push(line.trim().to_string());
            }
        } else if WARNING_LINE.is_match(line) {
            warning_count += 1;
        }
    }

    let mut report = json!({
        "lineCount": line_count,
        "errorCount": error_count,
        "warningCount": warning_count,
        "errorLines": error_lines,
    });
    if let Some(id) = extract_tracking_id(text) {
        report["trackingId"] = Value::String(id);
    }
    report
}

/// First `tracking id`, `tracking_id` or `trackingId` value in `text`.
pub fn extract_tracking_id(text: &str) -> Option<String> {
    TRACKING_ID
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

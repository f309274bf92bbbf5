//! Agent answer acceptance.
//!
//! Decides whether an LLM agent's answer is good enough to use or whether
//! the orchestrator must retry against the direct API. Any single trigger
//! is sufficient:
//!
//! | Trigger | Reason |
//! |---------|--------|
//! | no result at all | [`FallbackReason::Missing`] |
//! | `error: true` | [`FallbackReason::ErrorFlag`] |
//! | `requires_direct_api_fallback` (top level or `extra`) | [`FallbackReason::ExplicitFlag`] |
//! | `confidence_score` below the threshold (top level or `extra`) | [`FallbackReason::LowConfidence`] |
//! | `found_specific_data: false` (top level or `extra`) | [`FallbackReason::NoSpecificData`] |
//! | text matches a known non-answer | [`FallbackReason::GenericAnswer`] |
//!
//! Top-level fields take precedence over the same field under `extra`.

use std::fmt;

use serde_json::Value;

use crate::models::AgentResult;

/// Confidence below which an agent answer is rejected.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.6;

/// The apology that opens an agent's "nothing found" reply.
const APOLOGY: &str = "i apologize, but i don't have any specific information";

/// One of these must accompany [`APOLOGY`] for the reply to count as empty.
const APOLOGY_QUALIFIERS: &[&str] = &[
    "retrieved contents do not contain any direct references",
    "cannot provide a summary or any details about it",
    "unfortunately, there are no specific details available",
];

/// Boilerplate that on its own marks a reply as a non-answer.
const GENERIC_PHRASES: &[&str] = &[
    "i can search jira for that",
    "i don't have access to specific ticket details right now",
    "i would need to search jira",
    "i don't have specific information about",
    "i couldn't find specific information",
    "i don't have direct access to jira",
    "i don't have current jira data",
    "to get accurate information you should check jira",
    "to get the most current information",
    "to see the latest tickets",
    "i can't access the specific details",
    "without access to your organization's jira",
    "i'm not able to search jira directly",
    "i would need more information",
];

/// Why an agent answer was rejected.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FallbackReason {
    Missing,
    ErrorFlag,
    ExplicitFlag,
    LowConfidence(f64),
    NoSpecificData,
    GenericAnswer,
}

impl fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FallbackReason::Missing => f.write_str("no agent result"),
            FallbackReason::ErrorFlag => f.write_str("agent result has an error flag"),
            FallbackReason::ExplicitFlag => f.write_str("requires_direct_api_fallback is set"),
            FallbackReason::LowConfidence(score) => write!(f, "confidence {} below threshold", score),
            FallbackReason::NoSpecificData => f.write_str("found_specific_data is false"),
            FallbackReason::GenericAnswer => f.write_str("answer matches a generic non-answer"),
        }
    }
}

/// Threshold-configurable evaluator. [`needs_fallback`] uses the default.
#[derive(Debug, Clone, Copy)]
pub struct FallbackEvaluator {
    pub confidence_threshold: f64,
}

impl Default for FallbackEvaluator {
    fn default() -> Self {
        Self {
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
        }
    }
}

impl FallbackEvaluator {
    pub fn new(confidence_threshold: f64) -> Self {
        Self {
            confidence_threshold,
        }
    }

    /// The first trigger that rejects `result`, or `None` to accept it.
    pub fn evaluate(&self, result: Option<&AgentResult>) -> Option<FallbackReason> {
        let result = match result {
            Some(r) => r,
            None => return Some(FallbackReason::Missing),
        };
        if result.error {
            return Some(FallbackReason::ErrorFlag);
        }

        let extra = result.extra.as_ref();
        let extra_bool = |name: &str| extra.and_then(|e| e.get(name)).and_then(Value::as_bool);

        if result.requires_direct_api_fallback == Some(true)
            || extra_bool("requires_direct_api_fallback") == Some(true)
        {
            return Some(FallbackReason::ExplicitFlag);
        }

        let confidence = result
            .confidence_score
            .or_else(|| extra.and_then(|e| e.get("confidence_score")).and_then(Value::as_f64));
        if let Some(score) = confidence {
            if score < self.confidence_threshold {
                return Some(FallbackReason::LowConfidence(score));
            }
        }

        let found = result
            .found_specific_data
            .or_else(|| extra_bool("found_specific_data"));
        if found == Some(false) {
            return Some(FallbackReason::NoSpecificData);
        }

        if evaluation_text(result).is_some_and(is_generic_answer) {
            return Some(FallbackReason::GenericAnswer);
        }
        None
    }

    pub fn needs_fallback(&self, result: Option<&AgentResult>) -> bool {
        self.evaluate(result).is_some()
    }
}

/// True if the agent answer should be discarded in favour of the other
/// source, using the default confidence threshold.
pub fn needs_fallback(result: Option<&AgentResult>) -> bool {
    FallbackEvaluator::default().needs_fallback(result)
}

/// The text inspected for non-answers: `summary`, then `answer_text`,
/// `answer`, and finally `result.answer`.
fn evaluation_text(result: &AgentResult) -> Option<&str> {
    [
        result.summary.as_deref(),
        result.answer_text.as_deref(),
        result.answer.as_deref(),
        result.result.as_ref().and_then(|r| r.answer.as_deref()),
    ]
    .into_iter()
    .flatten()
    .find(|s| !s.is_empty())
}

/// True if `text` is a known "I have nothing for you" reply.
///
/// The apology alone is not enough: it must come with one of the
/// qualifiers, because agents also apologise in answers that do carry data.
pub fn is_generic_answer(text: &str) -> bool {
    let lowered = text.to_lowercase();
    if lowered.contains(APOLOGY) && APOLOGY_QUALIFIERS.iter().any(|q| lowered.contains(q)) {
        return true;
    }
    GENERIC_PHRASES.iter().any(|p| lowered.contains(p))
}

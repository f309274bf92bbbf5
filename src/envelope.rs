//! The response envelope returned for every query.
//!
//! One shape serves success, degraded success, clarification, and
//! unexpected failure. The `query` and `question` fields always echo the
//! query string the caller sent, unchanged.
//!
//! ```json
//! {
//!   "success": true,
//!   "status": "complete",
//!   "query": "summary of JIRA-123",
//!   "question": "summary of JIRA-123",
//!   "result": {
//!     "answer": "## JIRA-123 ...",
//!     "sources": [{ "title": "...", "url": null, "snippet": "..." }],
//!     "relatedQuestions": [],
//!     "needsUserInput": false,
//!     "missingInfo": null
//!   },
//!   "final_answer": "## JIRA-123 ...",
//!   "retrieval_contexts": [ ... ],
//!   "routing_decision": "advanced_jira_query_ticket_summary",
//!   "timestamp": "2025-05-14T10:00:00Z",
//!   "request_id": "6f0c...",
//!   "retrieval_errors": [],
//!   "retrieval_attempts": [{ "source": "advanced_jira_service_ticket_summary", "outcome": "success" }]
//! }
//! ```

use std::fmt;

use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use knowledge_router_core::models::{ChatTurn, ContextItem, MissingInfo, RoutingDecision};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvelopeStatus {
    Complete,
    NeedsClarification,
}

/// One failed collaborator call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorRecord {
    pub source: String,
    pub error: String,
}

impl ErrorRecord {
    pub fn new(source: impl Into<String>, error: impl fmt::Display) -> Self {
        Self {
            source: source.into(),
            error: error.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    /// Returned usable results.
    Success,
    /// Answered, but with nothing.
    Empty,
    /// Answered, but the fallback evaluator rejected the answer.
    Rejected,
    Failed,
}

/// One primary or fallback retrieval call, in call order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievalAttempt {
    pub source: String,
    pub outcome: AttemptOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceRef {
    pub title: String,
    pub url: Option<String>,
    pub snippet: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvelopeResult {
    pub answer: String,
    pub sources: Vec<SourceRef>,
    pub related_questions: Vec<String>,
    pub needs_user_input: bool,
    pub missing_info: Option<MissingInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponseEnvelope {
    pub success: bool,
    pub status: EnvelopeStatus,
    pub query: String,
    pub question: String,
    pub result: EnvelopeResult,
    pub final_answer: String,
    pub retrieval_contexts: Vec<ContextItem>,
    pub routing_decision: RoutingDecision,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis_output: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_analysis_result: Option<Value>,
    pub timestamp: String,
    pub request_id: Uuid,
    pub retrieval_errors: Vec<ErrorRecord>,
    pub retrieval_attempts: Vec<RetrievalAttempt>,
    /// `_metadata` turn the caller appends to history before the next turn.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clarification: Option<ChatTurn>,
}

/// `result.sources` entries for a context list.
pub fn sources_for(contexts: &[ContextItem]) -> Vec<SourceRef> {
    contexts
        .iter()
        .map(|item| SourceRef {
            title: item
                .title()
                .map(str::to_string)
                .unwrap_or_else(|| format!("Source from {}", item.source())),
            url: item.url().map(str::to_string),
            snippet: item.text().to_string(),
        })
        .collect()
}

pub fn status_for(contexts: &[ContextItem]) -> EnvelopeStatus {
    if contexts.iter().any(ContextItem::needs_user_input) {
        EnvelopeStatus::NeedsClarification
    } else {
        EnvelopeStatus::Complete
    }
}

impl ResponseEnvelope {
    /// True if the envelope may be served again for a similar query.
    pub fn is_cacheable(&self) -> bool {
        self.success
            && self.status == EnvelopeStatus::Complete
            && self.routing_decision != RoutingDecision::BothServicesFailed
    }

    /// A copy of a stored envelope re-addressed to a new request.
    pub fn readdressed(&self, query: &str, request_id: Uuid, timestamp: String) -> Self {
        Self {
            query: query.to_string(),
            question: query.to_string(),
            request_id,
            timestamp,
            ..self.clone()
        }
    }
}

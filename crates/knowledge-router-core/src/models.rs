//! Core data models used throughout Knowledge Router.
//!
//! These types describe what flows through a single request: the query
//! and its conversation history, the analysis of the query, the raw
//! records returned by collaborators, the normalized [`ContextItem`]s
//! handed to answer synthesis, and the diagnostic [`RoutingDecision`].
//!
//! Response shapes from upstream systems are converted into
//! [`ContextItem`] variants exactly once, at the collaborator boundary.
//! Nothing downstream inspects which JSON field happened to be populated.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

// ═══════════════════════════════════════════════════════════════════════
// Conversation
// ═══════════════════════════════════════════════════════════════════════

/// Speaker of a [`ChatTurn`].
///
/// `Metadata` turns are written by the orchestrator itself and carry
/// JSON-encoded context across a clarification round-trip. They serialize
/// as `"_metadata"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
    System,
    #[serde(rename = "_metadata", alias = "metadata")]
    Metadata,
}

/// One turn of conversation history. History is ordered oldest to newest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: ChatRole,
    #[serde(alias = "message")]
    pub content: String,
}

impl ChatTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }

    pub fn metadata(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Metadata,
            content: content.into(),
        }
    }
}

/// Content of the most recent assistant turn, scanning backward.
pub fn last_assistant_message(history: &[ChatTurn]) -> Option<&str> {
    history
        .iter()
        .rev()
        .find(|t| t.role == ChatRole::Assistant)
        .map(|t| t.content.as_str())
}

// ═══════════════════════════════════════════════════════════════════════
// Query analysis
// ═══════════════════════════════════════════════════════════════════════

/// Output of the query-analysis step, produced once per request.
///
/// Accepts both camelCase and the snake_case keys analysis models emit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryAnalysis {
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default, alias = "complete_question")]
    pub complete_question: String,
    #[serde(default)]
    pub thought: String,
    #[serde(default, alias = "auxiliary_information")]
    pub auxiliary_information: Vec<String>,
    #[serde(default, alias = "search_decision")]
    pub search_decision: String,
    #[serde(default, alias = "search_queries")]
    pub search_queries: Vec<String>,
    #[serde(default, alias = "related_questions", skip_serializing_if = "Vec::is_empty")]
    pub related_questions: Vec<String>,
}

fn default_language() -> String {
    "English".to_string()
}

impl QueryAnalysis {
    /// Drop blank search queries and fall back to `query` when none remain.
    pub fn normalized(mut self, query: &str) -> Self {
        self.search_queries.retain(|q| !q.trim().is_empty());
        if self.search_queries.is_empty() {
            self.search_queries.push(query.to_string());
        }
        if self.complete_question.trim().is_empty() {
            self.complete_question = query.to_string();
        }
        self
    }

    /// The primary search string (`searchQueries[0]`).
    pub fn primary_query<'a>(&'a self, fallback: &'a str) -> &'a str {
        self.search_queries
            .first()
            .map(|s| s.as_str())
            .unwrap_or(fallback)
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Target system and routing
// ═══════════════════════════════════════════════════════════════════════

/// Knowledge system a request is aimed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetSystem {
    Jira,
    Confluence,
    Default,
}

impl TargetSystem {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetSystem::Jira => "jira",
            TargetSystem::Confluence => "confluence",
            TargetSystem::Default => "default",
        }
    }
}

impl fmt::Display for TargetSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TargetSystem {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "jira" => Ok(TargetSystem::Jira),
            "confluence" => Ok(TargetSystem::Confluence),
            "default" => Ok(TargetSystem::Default),
            other => Err(format!(
                "unknown data source '{}': expected jira, confluence, or default",
                other
            )),
        }
    }
}

/// Diagnostic tag threaded through a request.
///
/// Starts as one of the two strategy values and is updated once as each
/// retrieval branch resolves. Serializes as its snake_case string form,
/// e.g. `"direct_api_fallback_success"` or `"advanced_jira_query_mttr_calculation"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutingDecision {
    DirectApiFirst,
    AiStudioFirst,
    DirectApiSuccess,
    AiStudioSuccess,
    DirectApiFallbackSuccess,
    AiStudioFallbackSuccess,
    BothServicesFailed,
    AdvancedJiraQuery(AnalyticsType),
    AiStudioDefault,
}

impl RoutingDecision {
    /// True for the terminal success states of a retrieval branch.
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            RoutingDecision::DirectApiSuccess
                | RoutingDecision::AiStudioSuccess
                | RoutingDecision::DirectApiFallbackSuccess
                | RoutingDecision::AiStudioFallbackSuccess
        )
    }
}

impl fmt::Display for RoutingDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoutingDecision::DirectApiFirst => f.write_str("direct_api_first"),
            RoutingDecision::AiStudioFirst => f.write_str("ai_studio_first"),
            RoutingDecision::DirectApiSuccess => f.write_str("direct_api_success"),
            RoutingDecision::AiStudioSuccess => f.write_str("ai_studio_success"),
            RoutingDecision::DirectApiFallbackSuccess => f.write_str("direct_api_fallback_success"),
            RoutingDecision::AiStudioFallbackSuccess => f.write_str("ai_studio_fallback_success"),
            RoutingDecision::BothServicesFailed => f.write_str("both_services_failed"),
            RoutingDecision::AdvancedJiraQuery(t) => {
                write!(f, "advanced_jira_query_{}", t.as_str().to_ascii_lowercase())
            }
            RoutingDecision::AiStudioDefault => f.write_str("ai_studio_default"),
        }
    }
}

impl Serialize for RoutingDecision {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Analytics intents
// ═══════════════════════════════════════════════════════════════════════

/// Kind of Jira analytic a query asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnalyticsType {
    TicketSummary,
    MttrCalculation,
    TopNIssues,
    BugGenerationAnalysis,
    DataForChartOrTable,
    SentimentAnalysis,
    GeneralJqlQuery,
    NeedsClarification,
}

impl AnalyticsType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalyticsType::TicketSummary => "TICKET_SUMMARY",
            AnalyticsType::MttrCalculation => "MTTR_CALCULATION",
            AnalyticsType::TopNIssues => "TOP_N_ISSUES",
            AnalyticsType::BugGenerationAnalysis => "BUG_GENERATION_ANALYSIS",
            AnalyticsType::DataForChartOrTable => "DATA_FOR_CHART_OR_TABLE",
            AnalyticsType::SentimentAnalysis => "SENTIMENT_ANALYSIS",
            AnalyticsType::GeneralJqlQuery => "GENERAL_JQL_QUERY",
            AnalyticsType::NeedsClarification => "NEEDS_CLARIFICATION",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        [
            AnalyticsType::TicketSummary,
            AnalyticsType::MttrCalculation,
            AnalyticsType::TopNIssues,
            AnalyticsType::BugGenerationAnalysis,
            AnalyticsType::DataForChartOrTable,
            AnalyticsType::SentimentAnalysis,
            AnalyticsType::GeneralJqlQuery,
            AnalyticsType::NeedsClarification,
        ]
        .into_iter()
        .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
    }
}

impl fmt::Display for AnalyticsType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameters for an MTTR computation. One of the two must be set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MttrParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jql_query: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_frame: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopNParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n: Option<usize>,
    pub aggregation_field: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jql_query_from_understanding: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_frame: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BugSourceType {
    Issue,
    Version,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BugAnalysisParams {
    pub source_type: BugSourceType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_issue_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link_type: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisualizationType {
    PieChart,
    BarChart,
    Table,
}

impl VisualizationType {
    pub fn presentation_hint(&self) -> PresentationHint {
        match self {
            VisualizationType::PieChart => PresentationHint::PieChart,
            VisualizationType::BarChart => PresentationHint::BarChart,
            VisualizationType::Table => PresentationHint::Table,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartParams {
    pub visualization_type: VisualizationType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jql_query: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_by_field: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_field: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub table_fields: Vec<String>,
}

/// Slot a clarification question asks the user to fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingInfo {
    IssueKey,
    IssueArea,
    UserName,
    ClientName,
    ReleaseVersion,
}

impl MissingInfo {
    pub fn as_str(&self) -> &'static str {
        match self {
            MissingInfo::IssueKey => "issue_key",
            MissingInfo::IssueArea => "issue_area",
            MissingInfo::UserName => "user_name",
            MissingInfo::ClientName => "client_name",
            MissingInfo::ReleaseVersion => "release_version",
        }
    }

    /// Fold the user's reply into the original query.
    pub fn enhance_query(&self, original: &str, reply: &str) -> String {
        let reply = reply.trim();
        match self {
            MissingInfo::IssueArea => format!("{} for project {}", original, reply),
            MissingInfo::IssueKey => format!("{} {}", original, reply),
            MissingInfo::UserName => format!("{} for user {}", original, reply),
            MissingInfo::ClientName | MissingInfo::ReleaseVersion => {
                format!("{} for {}", original, reply)
            }
        }
    }
}

/// A request for the user to supply a missing analytic parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClarificationRequest {
    pub missing_info: MissingInfo,
    pub prompt: String,
    /// Analytic the clarification belongs to.
    pub intent_type: AnalyticsType,
    /// Partially-resolved parameters restored on the follow-up turn.
    #[serde(default)]
    pub query_context: Value,
}

/// A classified analytical intent with its typed parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum AnalyticsIntent {
    TicketSummary { issue_key: String },
    Mttr(MttrParams),
    TopN(TopNParams),
    BugGeneration(BugAnalysisParams),
    ChartOrTable(ChartParams),
    Sentiment { issue_key: String },
    /// No specialised analytic applies; use generic routing. `jql` carries
    /// a prepared query when one is known.
    General { jql: Option<String> },
    NeedsClarification(ClarificationRequest),
}

impl AnalyticsIntent {
    pub fn analytics_type(&self) -> AnalyticsType {
        match self {
            AnalyticsIntent::TicketSummary { .. } => AnalyticsType::TicketSummary,
            AnalyticsIntent::Mttr(_) => AnalyticsType::MttrCalculation,
            AnalyticsIntent::TopN(_) => AnalyticsType::TopNIssues,
            AnalyticsIntent::BugGeneration(_) => AnalyticsType::BugGenerationAnalysis,
            AnalyticsIntent::ChartOrTable(_) => AnalyticsType::DataForChartOrTable,
            AnalyticsIntent::Sentiment { .. } => AnalyticsType::SentimentAnalysis,
            AnalyticsIntent::General { .. } => AnalyticsType::GeneralJqlQuery,
            AnalyticsIntent::NeedsClarification(_) => AnalyticsType::NeedsClarification,
        }
    }

    pub fn is_general(&self) -> bool {
        matches!(self, AnalyticsIntent::General { .. })
    }

    /// Parameters as a JSON object, for diagnostics and `_metadata` storage.
    pub fn parameters(&self) -> Value {
        let value = match self {
            AnalyticsIntent::TicketSummary { issue_key } | AnalyticsIntent::Sentiment { issue_key } => {
                serde_json::json!({ "issueKey": issue_key })
            }
            AnalyticsIntent::Mttr(p) => serde_json::to_value(p).unwrap_or(Value::Null),
            AnalyticsIntent::TopN(p) => serde_json::to_value(p).unwrap_or(Value::Null),
            AnalyticsIntent::BugGeneration(p) => serde_json::to_value(p).unwrap_or(Value::Null),
            AnalyticsIntent::ChartOrTable(p) => serde_json::to_value(p).unwrap_or(Value::Null),
            AnalyticsIntent::General { jql } => serde_json::json!({ "jqlQuery": jql }),
            AnalyticsIntent::NeedsClarification(c) => {
                serde_json::to_value(c).unwrap_or(Value::Null)
            }
        };
        if value.is_null() {
            serde_json::json!({})
        } else {
            value
        }
    }
}

/// Context restored from a `_metadata` history turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OriginalQueryContext {
    pub original_query: String,
    #[serde(default)]
    pub missing_info: Option<MissingInfo>,
    #[serde(default)]
    pub intent_type: Option<String>,
    #[serde(default)]
    pub query_context: Option<Value>,
}

// ═══════════════════════════════════════════════════════════════════════
// Collaborator records
// ═══════════════════════════════════════════════════════════════════════

/// A Jira issue as returned by the issue-search collaborator.
///
/// Read-only input to analytics. `fields` keeps the raw JSON so dot paths
/// such as `fields.status.name` resolve without a fixed schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueRecord {
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub fields: Value,
}

impl IssueRecord {
    pub fn new(key: impl Into<String>, fields: Value) -> Self {
        Self {
            key: key.into(),
            id: None,
            fields,
        }
    }

    /// Resolve a dot path against `{ "key": ..., "fields": {...} }`.
    ///
    /// Arrays are traversed element-wise; a path through an array yields
    /// an array of the non-null leaf values. Null and missing leaves
    /// resolve to `None`.
    pub fn resolve_path(&self, path: &str) -> Option<Value> {
        let mut segments = path.split('.').filter(|s| !s.is_empty());
        match segments.next()? {
            "key" => {
                if segments.next().is_none() {
                    Some(Value::String(self.key.clone()))
                } else {
                    None
                }
            }
            "id" => self.id.clone().map(Value::String),
            "fields" => {
                let rest: Vec<&str> = segments.collect();
                walk(&self.fields, &rest)
            }
            _ => None,
        }
    }

    /// `fields.<name>` as a string slice, when it is a JSON string.
    pub fn field_str(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(|v| v.as_str())
    }

    pub fn summary(&self) -> &str {
        self.field_str("summary").unwrap_or("")
    }

    /// `fields.status.name`.
    pub fn status_name(&self) -> Option<&str> {
        self.fields.pointer("/status/name").and_then(|v| v.as_str())
    }

    /// `fields.issuetype.name`.
    pub fn issue_type(&self) -> Option<&str> {
        self.fields.pointer("/issuetype/name").and_then(|v| v.as_str())
    }

    /// Plain text of `fields.description`, flattening Atlassian Document
    /// Format when the description is structured.
    pub fn description_text(&self) -> String {
        match self.fields.get("description") {
            Some(Value::String(s)) => s.clone(),
            Some(v @ Value::Object(_)) => {
                let mut out = String::new();
                collect_adf_text(v, &mut out);
                out.trim().to_string()
            }
            _ => String::new(),
        }
    }
}

fn walk(value: &Value, path: &[&str]) -> Option<Value> {
    if path.is_empty() {
        return if value.is_null() {
            None
        } else {
            Some(value.clone())
        };
    }
    match value {
        Value::Object(map) => walk(map.get(path[0])?, &path[1..]),
        Value::Array(items) => {
            let collected: Vec<Value> = items.iter().filter_map(|v| walk(v, path)).collect();
            if collected.is_empty() {
                None
            } else {
                Some(Value::Array(collected))
            }
        }
        _ => None,
    }
}

/// Append the text nodes of an Atlassian Document Format tree.
pub fn collect_adf_text(node: &Value, out: &mut String) {
    match node {
        Value::Object(map) => {
            if let Some(Value::String(text)) = map.get("text") {
                out.push_str(text);
            }
            if let Some(content) = map.get("content") {
                collect_adf_text(content, out);
            }
            if matches!(
                map.get("type").and_then(|t| t.as_str()),
                Some("paragraph") | Some("heading") | Some("listItem") | Some("hardBreak")
            ) {
                out.push('\n');
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_adf_text(item, out);
            }
        }
        Value::String(s) => out.push_str(s),
        _ => {}
    }
}

/// An issue comment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub created: Option<String>,
    pub body: String,
}

/// A wiki page as returned by the page-search collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageResult {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub space: Option<String>,
    #[serde(default)]
    pub version: Option<i64>,
    #[serde(default)]
    pub last_modified: Option<String>,
}

/// A citation carried by an agent answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CitationRef {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentAnswer {
    #[serde(default)]
    pub answer: Option<String>,
}

/// One answer returned by a hosted LLM agent.
///
/// Only the fields the fallback evaluator and the context normalizer read
/// are modelled; anything else lands in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentResult {
    #[serde(default)]
    pub error: bool,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub answer: Option<String>,
    #[serde(default)]
    pub answer_text: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub confidence_score: Option<f64>,
    #[serde(default)]
    pub found_specific_data: Option<bool>,
    #[serde(default)]
    pub requires_direct_api_fallback: Option<bool>,
    #[serde(default)]
    pub result: Option<AgentAnswer>,
    #[serde(default)]
    pub extra: Option<Value>,
    #[serde(default)]
    pub sources: Vec<CitationRef>,
}

impl AgentResult {
    /// A failed agent call with a human-readable message.
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            error: true,
            summary: Some(message.into()),
            ..Default::default()
        }
    }

    /// The answer text, preferring `result.answer`, then `summary`,
    /// `answer`, and `answer_text`.
    pub fn text(&self) -> Option<&str> {
        self.result
            .as_ref()
            .and_then(|r| r.answer.as_deref())
            .into_iter()
            .chain(self.summary.as_deref())
            .chain(self.answer.as_deref())
            .chain(self.answer_text.as_deref())
            .find(|s| !s.trim().is_empty())
    }

    /// Convert a successful result into a context item tagged with `source`.
    pub fn into_context(self, source: &str) -> ContextItem {
        let answer = self.text().unwrap_or_default().to_string();
        ContextItem::AgentAnswer {
            title: self.title,
            url: self.url,
            answer,
            source: source.to_string(),
            sources: self.sources,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Analytics results
// ═══════════════════════════════════════════════════════════════════════

/// Tag telling the synthesizer which template to use for a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresentationHint {
    TicketSummary,
    MttrResult,
    TopNList,
    BugListResult,
    PieChart,
    BarChart,
    Table,
    SentimentAnalysis,
    ListResult,
}

impl PresentationHint {
    pub fn as_str(&self) -> &'static str {
        match self {
            PresentationHint::TicketSummary => "ticket_summary",
            PresentationHint::MttrResult => "mttr_result",
            PresentationHint::TopNList => "top_n_list",
            PresentationHint::BugListResult => "bug_list_result",
            PresentationHint::PieChart => "pie_chart",
            PresentationHint::BarChart => "bar_chart",
            PresentationHint::Table => "table",
            PresentationHint::SentimentAnalysis => "sentiment_analysis",
            PresentationHint::ListResult => "list_result",
        }
    }
}

impl fmt::Display for PresentationHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MttrResult {
    pub mttr_millis: f64,
    pub count: usize,
    pub mttr_formatted: String,
}

/// One group produced by group-and-count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregationGroup {
    pub label: String,
    pub value: f64,
    pub issues: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkedIssue {
    pub key: String,
    pub summary: String,
    pub status: String,
    #[serde(rename = "type")]
    pub issue_type: String,
    pub link_description: String,
    pub link_direction: String,
}

// ═══════════════════════════════════════════════════════════════════════
// Context items
// ═══════════════════════════════════════════════════════════════════════

/// The normalized unit of retrieved information passed to synthesis.
///
/// Each variant names the one field that carries its substantive text:
/// `answer`, `content`, or `summary`. Indices into a request's context
/// list are what synthesis cites as `[Source N]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "kind",
    rename_all = "snake_case",
    rename_all_fields = "camelCase"
)]
pub enum ContextItem {
    /// A complete answer from a hosted LLM agent.
    AgentAnswer {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        title: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        url: Option<String>,
        answer: String,
        source: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        sources: Vec<CitationRef>,
    },
    /// A raw document from a direct API search (issue or page).
    Document {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        title: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        url: Option<String>,
        content: String,
        source: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        raw_data: Option<Value>,
    },
    /// A computed Jira analytic.
    Analytics {
        title: String,
        summary: String,
        source: String,
        raw_data: Value,
        presentation_hint: PresentationHint,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        context_info: Option<Value>,
    },
    /// Errors, empty-result notices, and clarification prompts.
    Notice {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        title: Option<String>,
        summary: String,
        source: String,
        #[serde(default)]
        is_error: bool,
        #[serde(default)]
        needs_user_input: bool,
    },
}

impl ContextItem {
    /// An error-flagged notice.
    pub fn error(source: impl Into<String>, summary: impl Into<String>) -> Self {
        ContextItem::Notice {
            title: None,
            summary: summary.into(),
            source: source.into(),
            is_error: true,
            needs_user_input: false,
        }
    }

    pub fn source(&self) -> &str {
        match self {
            ContextItem::AgentAnswer { source, .. }
            | ContextItem::Document { source, .. }
            | ContextItem::Analytics { source, .. }
            | ContextItem::Notice { source, .. } => source,
        }
    }

    pub fn title(&self) -> Option<&str> {
        match self {
            ContextItem::AgentAnswer { title, .. }
            | ContextItem::Document { title, .. }
            | ContextItem::Notice { title, .. } => title.as_deref(),
            ContextItem::Analytics { title, .. } => Some(title),
        }
    }

    pub fn url(&self) -> Option<&str> {
        match self {
            ContextItem::AgentAnswer { url, .. } | ContextItem::Document { url, .. } => {
                url.as_deref()
            }
            _ => None,
        }
    }

    /// The item's substantive text.
    pub fn text(&self) -> &str {
        match self {
            ContextItem::AgentAnswer { answer, .. } => answer,
            ContextItem::Document { content, .. } => content,
            ContextItem::Analytics { summary, .. } | ContextItem::Notice { summary, .. } => {
                summary
            }
        }
    }

    /// A ready-made answer that synthesis may return verbatim.
    pub fn ready_answer(&self) -> Option<&str> {
        match self {
            ContextItem::AgentAnswer { answer, .. } => Some(answer),
            _ => None,
        }
    }

    pub fn raw_data(&self) -> Option<&Value> {
        match self {
            ContextItem::Document { raw_data, .. } => raw_data.as_ref(),
            ContextItem::Analytics { raw_data, .. } => Some(raw_data),
            _ => None,
        }
    }

    pub fn presentation_hint(&self) -> Option<PresentationHint> {
        match self {
            ContextItem::Analytics {
                presentation_hint, ..
            } => Some(*presentation_hint),
            _ => None,
        }
    }

    pub fn context_info(&self) -> Option<&Value> {
        match self {
            ContextItem::Analytics { context_info, .. } => context_info.as_ref(),
            _ => None,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ContextItem::Notice { is_error: true, .. })
    }

    pub fn needs_user_input(&self) -> bool {
        matches!(
            self,
            ContextItem::Notice {
                needs_user_input: true,
                ..
            }
        )
    }
}

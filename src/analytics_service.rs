//! Jira analytics service.
//!
//! Classifies a query into an [`AnalyticsIntent`], fetches the issues the
//! intent needs through an [`IssueSearchClient`], and hands them to the
//! pure functions in [`knowledge_router_core::analytics`].
//!
//! | Operation | Fetch | Presentation hint |
//! |-----------|-------|-------------------|
//! | [`get_ticket_summary`](JiraAnalyticsService::get_ticket_summary) | one issue, expanded | `ticket_summary` |
//! | [`get_mttr`](JiraAnalyticsService::get_mttr) | one issue, or ≤250 done issues | `mttr_result` |
//! | [`get_top_n_issues`](JiraAnalyticsService::get_top_n_issues) | ≤250 issues | `top_n_list` |
//! | [`get_bug_generation_analysis`](JiraAnalyticsService::get_bug_generation_analysis) | one issue, or ≤50 release issues | `bug_list_result` |
//! | [`get_data_for_chart_or_table`](JiraAnalyticsService::get_data_for_chart_or_table) | ≤500 issues | `pie_chart` / `bar_chart` / `table` |
//! | [`get_sentiment_analysis`](JiraAnalyticsService::get_sentiment_analysis) | one issue + all comments | `sentiment_analysis` |
//!
//! Every operation returns an [`AnalyticsResponse`]; collaborator failures
//! become `success: false` responses and never escape as errors.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use knowledge_router_core::analytics::{
    analyze_linked_issues, calculate_mttr, format_data_for_table, group_and_count,
    noteworthy_terms, score_sentiment, NOT_AVAILABLE, UNASSIGNED,
};
use knowledge_router_core::error::RetrievalError;
use knowledge_router_core::intent::{classify_intent, IntentOptions};
use knowledge_router_core::jql;
use knowledge_router_core::models::{
    collect_adf_text, AnalyticsIntent, AnalyticsType, BugAnalysisParams, BugSourceType,
    ChartParams, ChatTurn, ContextItem, IssueRecord, MttrParams, PresentationHint, TopNParams,
    VisualizationType,
};

use crate::traits::{IssueFetchOptions, IssueSearchClient};

pub const MTTR_MAX_RESULTS: usize = 250;
pub const TOP_N_MAX_RESULTS: usize = 250;
pub const BUG_SOURCE_MAX_RESULTS: usize = 50;
pub const CHART_MAX_RESULTS: usize = 500;
pub const DEFAULT_TOP_N: usize = 10;

const SUMMARY_COMMENTS: usize = 5;
const SUMMARY_ATTACHMENTS: usize = 5;
const NOTEWORTHY_TERMS: usize = 5;

const DEFAULT_TABLE_FIELDS: &[&str] = &["key", "fields.summary", "fields.status.name"];

/// Result of one analytics operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsResponse {
    pub success: bool,
    pub data: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presentation_hint: Option<PresentationHint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Explanation attached to an empty but successful result.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_info: Option<Value>,
}

impl AnalyticsResponse {
    pub fn ok(data: Value, hint: PresentationHint) -> Self {
        Self {
            success: true,
            data,
            presentation_hint: Some(hint),
            error: None,
            message: None,
            context_info: None,
        }
    }

    /// A successful response with no rows.
    pub fn empty(hint: PresentationHint, message: &str) -> Self {
        Self {
            message: Some(message.to_string()),
            ..Self::ok(json!([]), hint)
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: Value::Null,
            presentation_hint: None,
            error: Some(error.into()),
            message: None,
            context_info: None,
        }
    }

    pub fn with_context(mut self, context_info: Value) -> Self {
        self.context_info = Some(context_info);
        self
    }

    /// One-line plain-text rendering of the result.
    pub fn describe(&self) -> String {
        if let Some(error) = &self.error {
            return error.clone();
        }
        if let Some(message) = &self.message {
            return message.clone();
        }
        let data = &self.data;
        match self.presentation_hint {
            Some(PresentationHint::TicketSummary) => format!(
                "{}: {} (Status: {}, Assignee: {}, Priority: {})",
                str_or(data, "key", ""),
                str_or(data, "summary", ""),
                str_or(data, "status", NOT_AVAILABLE),
                str_or(data, "assignee", UNASSIGNED),
                str_or(data, "priority", NOT_AVAILABLE),
            ),
            Some(PresentationHint::MttrResult) => format!(
                "Mean time to resolution: {} across {} resolved issue(s)",
                str_or(data, "mttrFormatted", NOT_AVAILABLE),
                data.get("count").and_then(Value::as_u64).unwrap_or(0)
            ),
            Some(PresentationHint::SentimentAnalysis) => format!(
                "Overall sentiment of {}: {} (score {})",
                str_or(data, "ticketKey", ""),
                str_or(data, "overallSentiment", "Neutral"),
                str_or(data, "sentimentScore", "0.00"),
            ),
            Some(PresentationHint::BugListResult) => {
                let keys: Vec<&str> = rows(data)
                    .iter()
                    .filter_map(|b| b.get("key").and_then(Value::as_str))
                    .collect();
                format!("{} linked bug(s): {}", keys.len(), keys.join(", "))
            }
            Some(PresentationHint::Table) => format!("{} row(s)", rows(data).len()),
            _ => {
                let groups: Vec<String> = rows(data)
                    .iter()
                    .map(|g| {
                        format!(
                            "{} ({})",
                            str_or(g, "label", UNASSIGNED),
                            g.get("value").and_then(Value::as_f64).unwrap_or(0.0)
                        )
                    })
                    .collect();
                groups.join(", ")
            }
        }
    }

    /// Context item carrying this result for synthesis.
    pub fn into_context_item(self, analytics_type: AnalyticsType) -> ContextItem {
        let summary = self.describe();
        let kind = analytics_type.as_str();
        ContextItem::Analytics {
            title: format!("Advanced Jira Analysis: {}", kind),
            summary,
            source: format!("advanced_jira_service_{}", kind.to_ascii_lowercase()),
            raw_data: self.data,
            presentation_hint: self.presentation_hint.unwrap_or(PresentationHint::ListResult),
            context_info: self.context_info,
        }
    }
}

fn str_or<'a>(value: &'a Value, key: &str, default: &'a str) -> &'a str {
    value.get(key).and_then(Value::as_str).unwrap_or(default)
}

fn rows(value: &Value) -> &[Value] {
    value.as_array().map(Vec::as_slice).unwrap_or(&[])
}

/// `status.name` → `fields.status.name`; `key` and already-prefixed
/// paths are unchanged.
fn field_path(path: &str) -> String {
    if path == "key" || path == "id" || path.starts_with("fields.") {
        path.to_string()
    } else {
        format!("fields.{}", path)
    }
}

/// Jira analytics over an issue-search collaborator.
pub struct JiraAnalyticsService {
    issues: Arc<dyn IssueSearchClient>,
    options: IntentOptions,
}

impl JiraAnalyticsService {
    pub fn new(issues: Arc<dyn IssueSearchClient>, options: IntentOptions) -> Self {
        Self { issues, options }
    }

    pub fn classify_intent(&self, query: &str, history: &[ChatTurn]) -> AnalyticsIntent {
        classify_intent(query, history, &self.options)
    }

    /// Run the operation for `intent`. General queries and clarification
    /// requests are not analytics and yield `None`.
    pub async fn execute(&self, intent: &AnalyticsIntent) -> Option<AnalyticsResponse> {
        info!(intent = %intent.analytics_type(), params = %intent.parameters(), "dispatching analytics");
        let response = match intent {
            AnalyticsIntent::TicketSummary { issue_key } => self.get_ticket_summary(issue_key).await,
            AnalyticsIntent::Mttr(params) => self.get_mttr(params).await,
            AnalyticsIntent::TopN(params) => self.get_top_n_issues(params).await,
            AnalyticsIntent::BugGeneration(params) => self.get_bug_generation_analysis(params).await,
            AnalyticsIntent::ChartOrTable(params) => self.get_data_for_chart_or_table(params).await,
            AnalyticsIntent::Sentiment { issue_key } => self.get_sentiment_analysis(issue_key).await,
            AnalyticsIntent::General { .. } | AnalyticsIntent::NeedsClarification(_) => return None,
        };
        if !response.success {
            warn!(intent = %intent.analytics_type(), error = ?response.error, "analytics failed");
        }
        Some(response)
    }

    // ============ Ticket summary ============

    pub async fn get_ticket_summary(&self, issue_key: &str) -> AnalyticsResponse {
        let issue = match self.issues.get_issue(issue_key, &IssueFetchOptions::full()).await {
            Ok(Some(issue)) => issue,
            Ok(None) => return AnalyticsResponse::failure(not_found(issue_key)),
            Err(e) => return AnalyticsResponse::failure(e.to_string()),
        };

        let mut data = ticket_summary(&issue);
        if let Some(url) = self.issues.issue_url(&issue.key) {
            data["url"] = Value::String(url);
        }
        AnalyticsResponse::ok(data, PresentationHint::TicketSummary)
    }

    // ============ MTTR ============

    pub async fn get_mttr(&self, params: &MttrParams) -> AnalyticsResponse {
        let fetched: Result<Vec<IssueRecord>, RetrievalError> = match (&params.issue_key, &params.jql_query) {
            (Some(key), _) => {
                let options = IssueFetchOptions::fields(&["created", "resolutiondate", "status", "updated"]);
                self.issues
                    .get_issue(key, &options)
                    .await
                    .map(|issue| issue.into_iter().collect())
            }
            (None, Some(jql_query)) if !jql_query.trim().is_empty() => {
                let jql = jql::and_clause(jql_query, "statusCategory = Done");
                self.issues.search_issues(&jql, MTTR_MAX_RESULTS).await
            }
            _ => {
                return AnalyticsResponse::failure(
                    "MTTR calculation requires an issue key or JQL query.",
                )
            }
        };

        let issues = match fetched {
            Ok(issues) => issues,
            Err(e) => return AnalyticsResponse::failure(e.to_string()),
        };

        let context = json!({
            "projectName": params.jql_query.as_deref().and_then(jql::project_from),
            "timeFrame": params.time_frame,
            "issueKey": params.issue_key,
        });

        if issues.is_empty() {
            return AnalyticsResponse::ok(
                json!({
                    "mttrFormatted": NOT_AVAILABLE,
                    "count": 0,
                    "message": "No resolved issues found for the given criteria.",
                }),
                PresentationHint::MttrResult,
            )
            .with_context(context);
        }

        let result = calculate_mttr(&issues);
        info!(count = result.count, mttr = %result.mttr_formatted, "mttr computed");
        let data = serde_json::to_value(&result).unwrap_or(Value::Null);
        AnalyticsResponse::ok(data, PresentationHint::MttrResult).with_context(context)
    }

    // ============ Top N ============

    pub async fn get_top_n_issues(&self, params: &TopNParams) -> AnalyticsResponse {
        let jql = match &params.jql_query_from_understanding {
            Some(j) => jql::ensure_order_by(j, "created DESC"),
            None => {
                let scope = params
                    .project
                    .as_deref()
                    .map(jql::project_clause)
                    .unwrap_or_default();
                jql::ensure_order_by(&scope, "created DESC")
            }
        };

        let issues = match self.issues.search_issues(&jql, TOP_N_MAX_RESULTS).await {
            Ok(issues) => issues,
            Err(e) => return AnalyticsResponse::failure(e.to_string()),
        };
        if issues.is_empty() {
            return AnalyticsResponse::empty(
                PresentationHint::ListResult,
                "No issues found for the given criteria.",
            );
        }

        let n = params.n.unwrap_or(DEFAULT_TOP_N);
        let mut groups = group_and_count(&issues, &field_path(&params.aggregation_field), None);
        groups.truncate(n);

        let context = json!({
            "projectName": params.project.clone().or_else(|| jql::project_from(&jql)),
            "timeFrame": params.time_frame,
            "totalIssuesFound": issues.len(),
            "n": n,
            "aggregatedBy": params.aggregation_field,
        });
        let data = serde_json::to_value(&groups).unwrap_or(Value::Null);
        AnalyticsResponse::ok(data, PresentationHint::TopNList).with_context(context)
    }

    // ============ Bug generation ============

    pub async fn get_bug_generation_analysis(&self, params: &BugAnalysisParams) -> AnalyticsResponse {
        let fetched = match (params.source_type, &params.source_issue_key) {
            (BugSourceType::Issue, Some(key)) => self
                .issues
                .get_issue(key, &IssueFetchOptions::default())
                .await
                .map(|issue| issue.into_iter().collect::<Vec<_>>()),
            (BugSourceType::Version, _) => match (&params.product_name, &params.version_name) {
                (Some(product), Some(version)) => {
                    let jql = format!(
                        "{} AND fixVersion = \"{}\"",
                        jql::project_clause(product),
                        jql::escape(version)
                    );
                    self.issues.search_issues(&jql, BUG_SOURCE_MAX_RESULTS).await
                }
                _ => return bug_params_missing(),
            },
            _ => return bug_params_missing(),
        };

        let sources = match fetched {
            Ok(sources) => sources,
            Err(e) => return AnalyticsResponse::failure(e.to_string()),
        };
        if sources.is_empty() {
            return AnalyticsResponse::empty(
                PresentationHint::ListResult,
                "No source issues found for bug generation analysis.",
            );
        }

        let filter: Vec<&str> = params.link_type.as_deref().into_iter().collect();
        let mut seen = HashSet::new();
        let mut bugs = Vec::new();
        for source in &sources {
            for bug in analyze_linked_issues(source, "Bug", &filter) {
                if !seen.insert(bug.key.clone()) {
                    continue;
                }
                let mut row = serde_json::to_value(&bug).unwrap_or(Value::Null);
                row["source"] = Value::String(source.key.clone());
                bugs.push(row);
            }
        }

        let context = json!({
            "productName": params.product_name,
            "versionName": params.version_name,
            "sourceIssueKey": params.source_issue_key,
            "totalSourceIssues": sources.len(),
            "totalBugsFound": bugs.len(),
        });
        AnalyticsResponse::ok(Value::Array(bugs), PresentationHint::BugListResult).with_context(context)
    }

    // ============ Charts and tables ============

    pub async fn get_data_for_chart_or_table(&self, params: &ChartParams) -> AnalyticsResponse {
        let jql = match (&params.jql_query, &params.project) {
            (Some(j), _) if !j.trim().is_empty() => j.clone(),
            (_, Some(project)) => jql::project_clause(project),
            _ => jql::ensure_order_by("", "created DESC"),
        };
        let hint = params.visualization_type.presentation_hint();

        let issues = match self.issues.search_issues(&jql, CHART_MAX_RESULTS).await {
            Ok(issues) => issues,
            Err(e) => return AnalyticsResponse::failure(e.to_string()),
        };
        if issues.is_empty() {
            return AnalyticsResponse::empty(hint, "No issues found for the given JQL.");
        }

        let data = match params.visualization_type {
            VisualizationType::Table => {
                let fields: Vec<String> = if params.table_fields.is_empty() {
                    DEFAULT_TABLE_FIELDS.iter().map(|f| f.to_string()).collect()
                } else {
                    params.table_fields.iter().map(|f| field_path(f)).collect()
                };
                let table = format_data_for_table(&issues, &fields);
                Value::Array(table.into_iter().map(Value::Object).collect())
            }
            VisualizationType::PieChart | VisualizationType::BarChart => {
                let Some(group_by) = params.group_by_field.as_deref() else {
                    return AnalyticsResponse::failure("groupByField is required for charts.");
                };
                let value_path = params.value_field.as_deref().map(field_path);
                let groups = group_and_count(&issues, &field_path(group_by), value_path.as_deref());
                serde_json::to_value(&groups).unwrap_or(Value::Null)
            }
        };

        let context = json!({
            "projectName": params.project.clone().or_else(|| jql::project_from(&jql)),
            "totalIssuesAnalyzed": issues.len(),
            "visualizationType": params.visualization_type,
            "groupedBy": params.group_by_field,
            "query": jql,
        });
        AnalyticsResponse::ok(data, hint).with_context(context)
    }

    // ============ Sentiment ============

    pub async fn get_sentiment_analysis(&self, issue_key: &str) -> AnalyticsResponse {
        let options = IssueFetchOptions::fields(&["summary", "description", "comment", "status", "assignee"]);
        let issue = match self.issues.get_issue(issue_key, &options).await {
            Ok(Some(issue)) => issue,
            Ok(None) => return AnalyticsResponse::failure(not_found(issue_key)),
            Err(e) => return AnalyticsResponse::failure(e.to_string()),
        };

        let comments: Vec<(String, Option<String>, String)> = match self.issues.fetch_all_comments(issue_key).await {
            Ok(comments) => comments
                .into_iter()
                .map(|c| (c.author.unwrap_or_else(|| "Unknown".to_string()), c.created, c.body))
                .collect(),
            Err(e) => {
                warn!(issue = issue_key, error = %e, "comment fetch failed, using embedded comments");
                embedded_comments(&issue)
                    .into_iter()
                    .map(|c| {
                        (
                            str_or(&c, "author", "Unknown").to_string(),
                            c.get("created").and_then(Value::as_str).map(str::to_string),
                            str_or(&c, "body", "").to_string(),
                        )
                    })
                    .collect()
            }
        };

        let mut texts: Vec<String> = Vec::new();
        if !issue.summary().is_empty() {
            texts.push(issue.summary().to_string());
        }
        let description = issue.description_text();
        if !description.is_empty() {
            texts.push(description);
        }

        let mut comment_sentiments = Vec::new();
        for (author, created, body) in comments.iter().filter(|(_, _, body)| !body.trim().is_empty()) {
            let score = score_sentiment(body);
            comment_sentiments.push(json!({
                "author": author,
                "created": created,
                "sentiment": score.label,
                "score": round2(score.score),
            }));
            texts.push(body.clone());
        }

        let overall = score_sentiment(&texts.join(" "));
        let terms: Vec<Value> = noteworthy_terms(&texts, NOTEWORTHY_TERMS)
            .into_iter()
            .map(|(term, count)| json!({ "term": term, "count": count }))
            .collect();

        let content_analyzed = if texts.is_empty() {
            "No content could be extracted for analysis".to_string()
        } else {
            format!("{} text elements (summary, description, comments)", texts.len())
        };

        let data = json!({
            "ticketKey": issue_key,
            "summary": issue.summary(),
            "status": issue.status_name().unwrap_or("Unknown"),
            "assignee": display_name(&issue.fields, "assignee").unwrap_or(UNASSIGNED),
            "overallSentiment": overall.label,
            "sentimentScore": format!("{:.2}", overall.score),
            "positiveTerms": overall.positive_count,
            "negativeTerms": overall.negative_count,
            "commentSentiments": comment_sentiments,
            "noteworthyTerms": terms,
            "totalComments": comment_sentiments.len(),
            "contentAnalyzed": content_analyzed,
        });
        AnalyticsResponse::ok(data, PresentationHint::SentimentAnalysis)
    }
}

fn not_found(issue_key: &str) -> String {
    format!("Ticket {} not found.", issue_key)
}

fn bug_params_missing() -> AnalyticsResponse {
    AnalyticsResponse::failure("Bug generation analysis requires a source issue or product/version.")
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

fn display_name<'a>(fields: &'a Value, name: &str) -> Option<&'a str> {
    fields.get(name).and_then(|v| v.get("displayName")).and_then(Value::as_str)
}

fn adf_or_string(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(v @ Value::Object(_)) => {
            let mut out = String::new();
            collect_adf_text(v, &mut out);
            out.trim().to_string()
        }
        _ => String::new(),
    }
}

/// `fields.comment.comments` as `{author, created, body}` objects.
fn embedded_comments(issue: &IssueRecord) -> Vec<Value> {
    issue
        .fields
        .pointer("/comment/comments")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .map(|c| {
                    json!({
                        "author": display_name(c, "author").unwrap_or("Unknown"),
                        "created": c.get("created"),
                        "body": adf_or_string(c.get("body")),
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

/// The fixed ticket-summary shape.
fn ticket_summary(issue: &IssueRecord) -> Value {
    let fields = &issue.fields;
    let named = |name: &str| {
        fields
            .get(name)
            .and_then(|v| v.get("name"))
            .and_then(Value::as_str)
            .unwrap_or(NOT_AVAILABLE)
            .to_string()
    };

    let comments: Vec<Value> = embedded_comments(issue).into_iter().take(SUMMARY_COMMENTS).collect();

    let attachments: Vec<Value> = fields
        .get("attachment")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .take(SUMMARY_ATTACHMENTS)
                .map(|a| {
                    json!({
                        "filename": a.get("filename"),
                        "size": a.get("size"),
                        "author": display_name(a, "author"),
                        "created": a.get("created"),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    let linked_issues: Vec<Value> = fields
        .get("issuelinks")
        .and_then(Value::as_array)
        .map(|links| {
            links
                .iter()
                .filter_map(|link| {
                    let (linked, direction) = match (link.get("inwardIssue"), link.get("outwardIssue")) {
                        (Some(issue), _) => (issue, "inward"),
                        (None, Some(issue)) => (issue, "outward"),
                        _ => return None,
                    };
                    Some(json!({
                        "type": link.pointer("/type/name"),
                        "direction": direction,
                        "key": linked.get("key"),
                        "summary": linked.pointer("/fields/summary"),
                        "status": linked.pointer("/fields/status/name"),
                    }))
                })
                .collect()
        })
        .unwrap_or_default();

    json!({
        "key": issue.key,
        "summary": issue.summary(),
        "status": issue.status_name().unwrap_or(NOT_AVAILABLE),
        "assignee": display_name(fields, "assignee").unwrap_or(UNASSIGNED),
        "reporter": display_name(fields, "reporter").unwrap_or(NOT_AVAILABLE),
        "created": fields.get("created"),
        "updated": fields.get("updated"),
        "description": issue.description_text(),
        "priority": named("priority"),
        "resolution": named("resolution"),
        "comments": comments,
        "attachments": attachments,
        "linkedIssues": linked_issues,
    })
}

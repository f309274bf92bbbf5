//! Analytics intent classification.
//!
//! Maps a query (and, for clarification replies, the conversation history)
//! to an [`AnalyticsIntent`]. The checks run in a fixed order and the
//! first match wins:
//!
//! 1. Reply to an earlier clarification question (restored from `_metadata`)
//! 2. Sentiment of a ticket
//! 3. AI-summary language issues (a prepared general query)
//! 4. Ticket key + "summary"/"details"/"about"
//! 5. MTTR
//! 6. Top-N issues
//! 7. Bug linkage
//! 8. Chart or table data
//! 9. Anything else is `GENERAL_JQL_QUERY`
//!
//! When an analytic is recognised but its subject is missing ("top issues
//! in this project"), the result is `NEEDS_CLARIFICATION` carrying the
//! question to ask and the parameters resolved so far.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::debug;

use crate::heuristics::{
    compile, extract_original_query_from_metadata, extract_ticket_keys,
    is_ai_summary_language_report, is_clarification_follow_up,
};
use crate::jql::{self, TimeFrame};
use crate::models::{
    AnalyticsIntent, AnalyticsType, BugAnalysisParams, BugSourceType, ChartParams, ChatTurn,
    ClarificationRequest, MissingInfo, MttrParams, OriginalQueryContext, TopNParams,
    VisualizationType,
};

/// Project and issue-area names recognised without a `project` prefix.
pub const DEFAULT_KNOWN_PROJECTS: &[&str] = &[
    "desktop client", "desktop clients", "zsee", "mobile", "web", "zoom rooms", "zr", "api",
    "backend", "frontend", "scheduler", "cloud", "recording", "transcription", "audio", "video",
    "ui", "telephony", "events", "webinar",
];

/// Knobs for classification that depend on the deployment.
#[derive(Debug, Clone)]
pub struct IntentOptions {
    /// Project assumed when a top-N, bug, or chart query names none.
    pub default_project: Option<String>,
    /// Lowercase names matched as bare words.
    pub known_projects: Vec<String>,
}

impl Default for IntentOptions {
    fn default() -> Self {
        Self {
            default_project: None,
            known_projects: DEFAULT_KNOWN_PROJECTS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

const PROMPT_SENTIMENT_TICKET: &str =
    "Which specific Jira ticket would you like to analyze the sentiment for?";
const PROMPT_MTTR_TICKET: &str = "Which specific Jira ticket would you like to check the MTTR for?";
const PROMPT_MTTR_AREA: &str = "Which Issue Area or Project would you like to check the MTTR for?";
const PROMPT_MTTR_USER: &str = "Which user would you like to check the MTTR for?";
const PROMPT_TOP_N_AREA: &str = "Which Issue Area or Project would you like to check for top issues?";
const PROMPT_BUG_CLIENT: &str = "Which client would you like to check for bugs?";
const PROMPT_BUG_RELEASE: &str = "Which release or version would you like to check for bugs?";
const PROMPT_CHART_AREA: &str = "Which Issue Area or Project would you like to visualize?";

static SENTIMENT: Lazy<Regex> = Lazy::new(|| compile(r"(?i)\b(sentiment|feeling|emotion|tone)\b"));
static TICKET_WORD: Lazy<Regex> = Lazy::new(|| compile(r"(?i)\b(ticket|issue|key)s?\b"));
static SUMMARY_WORD: Lazy<Regex> =
    Lazy::new(|| compile(r"(?i)\b(summary|summarize|details|about|overview)\b"));
static MTTR: Lazy<Regex> = Lazy::new(|| {
    compile(
        r"(?i)\bmttr\b|mean time to (resolution|resolve|respond)|average resolution time|\b(time|long)\b.*\bresol(ve|ution)\b",
    )
});
static TOP_N: Lazy<Regex> = Lazy::new(|| compile(r"(?i)\b(top|most)\b.*\b(issues?|tickets?)\b"));
static TOP_N_COUNT: Lazy<Regex> = Lazy::new(|| compile(r"(?i)\btop\s+(\d+)\b"));
static BUG: Lazy<Regex> =
    Lazy::new(|| compile(r"(?i)\bbugs?\b.*\b(list|reported|related)\b|\breported bugs?\b"));
static CHART: Lazy<Regex> = Lazy::new(|| compile(r"(?i)\b(chart|pie|bar|table|graph|visuali[sz]e)\b"));
static GROUP_BY: Lazy<Regex> = Lazy::new(|| {
    compile(r"(?i)\bby\s+(assignee|status|priority|reporter|component|components|type|issue\s*type)\b")
});
static PROJECT_PREFIX: Lazy<Regex> = Lazy::new(|| {
    compile(r#"(?i)\b(?:project|issue area|area)\s+(?:is\s+|=\s*)?"?([A-Za-z0-9][A-Za-z0-9_-]*)"?"#)
});
static PROJECT_SUFFIX: Lazy<Regex> = Lazy::new(|| {
    compile(r"(?i)\bin\s+(?:the\s+)?([A-Za-z0-9][A-Za-z0-9_-]*)\s+(?:project|issue area|area)\b")
});
static USER: Lazy<Regex> = Lazy::new(|| {
    compile(r"(?i)\b(?:user|assignee|assigned to)\s+@?([A-Za-z0-9][A-Za-z0-9_.@-]*)")
});
static CLIENT: Lazy<Regex> =
    Lazy::new(|| compile(r"(?i)\b(?:client|product)\s+([A-Za-z0-9][A-Za-z0-9_-]*)"));
static VERSION: Lazy<Regex> = Lazy::new(|| {
    compile(r"(?i)\b(?:version|release|v)\s*([0-9]+(?:\.[0-9]+)*)\b|\b([0-9]+\.[0-9]+(?:\.[0-9]+)*)\b")
});

/// Words that follow "project", "user", etc. without naming one.
const STOPWORDS: &[&str] = &[
    "a", "an", "and", "area", "by", "for", "in", "is", "issue", "issues", "of", "on", "or",
    "that", "the", "this", "ticket", "tickets", "to", "which", "with", "would", "you",
];

fn is_stopword(word: &str) -> bool {
    STOPWORDS.contains(&word.to_lowercase().as_str())
}

fn mentions_any(lowered: &str, phrases: &[&str]) -> bool {
    phrases.iter().any(|p| lowered.contains(p))
}

fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// The project or issue area a query names, if any.
///
/// Tries `project X` / `issue area X`, then `in X project`, then bare
/// known names (longest first).
pub fn extract_project(query: &str, options: &IntentOptions) -> Option<String> {
    for re in [&*PROJECT_PREFIX, &*PROJECT_SUFFIX] {
        if let Some(name) = re
            .captures_iter(query)
            .filter_map(|c| c.get(1))
            .map(|m| m.as_str())
            .find(|w| !is_stopword(w))
        {
            return Some(name.to_string());
        }
    }

    let lowered = query.to_lowercase();
    let mut known: Vec<&String> = options.known_projects.iter().collect();
    known.sort_by_key(|k| std::cmp::Reverse(k.len()));
    known
        .into_iter()
        .find(|name| {
            Regex::new(&format!(r"\b{}\b", regex::escape(&name.to_lowercase())))
                .map(|re| re.is_match(&lowered))
                .unwrap_or(false)
        })
        .map(|name| capitalize(name))
}

/// The user a query names (`user X`, `assignee X`, `assigned to X`).
pub fn extract_user(query: &str) -> Option<String> {
    USER.captures_iter(query)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().trim_end_matches(['.', ',']).to_string())
        .find(|w| !w.is_empty() && !is_stopword(w))
}

fn extract_version(query: &str) -> Option<String> {
    VERSION
        .captures(query)
        .and_then(|c| c.get(1).or_else(|| c.get(2)))
        .map(|m| m.as_str().to_string())
}

fn extract_client(query: &str) -> Option<String> {
    CLIENT
        .captures_iter(query)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str())
        .find(|w| !is_stopword(w))
        .map(|w| w.to_string())
}

fn group_by_field(query: &str) -> Option<&'static str> {
    let caps = GROUP_BY.captures(query)?;
    let raw = caps.get(1)?.as_str().to_lowercase();
    let field = match raw.split_whitespace().collect::<String>().as_str() {
        "assignee" => "assignee.displayName",
        "status" => "status.name",
        "priority" => "priority.name",
        "reporter" => "reporter.displayName",
        "component" | "components" => "components.name",
        "type" | "issuetype" => "issuetype.name",
        _ => return None,
    };
    Some(field)
}

fn clarify(
    missing_info: MissingInfo,
    prompt: &str,
    intent_type: AnalyticsType,
    partial: Value,
) -> AnalyticsIntent {
    AnalyticsIntent::NeedsClarification(ClarificationRequest {
        missing_info,
        prompt: prompt.to_string(),
        intent_type,
        query_context: partial,
    })
}

fn scoped_jql(project: Option<&str>, extra: Option<String>, time_frame: Option<TimeFrame>) -> String {
    let mut clauses: Vec<String> = Vec::new();
    if let Some(p) = project {
        clauses.push(jql::project_clause(p));
    }
    if let Some(e) = extra {
        clauses.push(e);
    }
    if let Some(tf) = time_frame {
        clauses.push(tf.clause().to_string());
    }
    clauses.join(" AND ")
}

/// Classify `query` into an analytics intent.
pub fn classify_intent(query: &str, history: &[ChatTurn], options: &IntentOptions) -> AnalyticsIntent {
    if is_clarification_follow_up(query, history) {
        if let Some(ctx) = extract_original_query_from_metadata(history) {
            if let Some(intent) = resume_clarification(&ctx, query, options) {
                debug!(
                    intent = %intent.analytics_type(),
                    original = %ctx.original_query,
                    "resumed analytics intent from clarification reply"
                );
                return intent;
            }
        }
    }
    classify_query(query, options)
}

/// Rebuild the intent a clarification question was asked for, with the
/// user's reply filling the missing slot.
pub fn resume_clarification(
    ctx: &OriginalQueryContext,
    reply: &str,
    options: &IntentOptions,
) -> Option<AnalyticsIntent> {
    let missing = ctx.missing_info?;
    let reply = reply.trim();
    let intent_type = ctx.intent_type.as_deref().and_then(AnalyticsType::parse);
    let stored = ctx.query_context.clone().unwrap_or(Value::Null);
    let time_frame = TimeFrame::detect(&ctx.original_query);

    let resumed = match (intent_type, missing) {
        (Some(AnalyticsType::TopNIssues), MissingInfo::IssueArea) => {
            let mut params: TopNParams = serde_json::from_value(stored).unwrap_or_else(|_| {
                TopNParams {
                    aggregation_field: "priority.name".to_string(),
                    ..Default::default()
                }
            });
            params.jql_query_from_understanding = Some(jql::ensure_order_by(
                &scoped_jql(Some(reply), None, time_frame),
                "created DESC",
            ));
            params.project = Some(reply.to_string());
            Some(AnalyticsIntent::TopN(params))
        }
        (Some(AnalyticsType::MttrCalculation), MissingInfo::IssueArea) => {
            Some(AnalyticsIntent::Mttr(MttrParams {
                issue_key: None,
                jql_query: Some(scoped_jql(Some(reply), None, time_frame)),
                time_frame: time_frame.map(|t| t.as_str().to_string()),
            }))
        }
        (Some(AnalyticsType::MttrCalculation), MissingInfo::UserName) => {
            let clause = format!("assignee = \"{}\"", jql::escape(reply));
            Some(AnalyticsIntent::Mttr(MttrParams {
                issue_key: None,
                jql_query: Some(scoped_jql(None, Some(clause), time_frame)),
                time_frame: time_frame.map(|t| t.as_str().to_string()),
            }))
        }
        (Some(AnalyticsType::MttrCalculation), MissingInfo::IssueKey) => {
            reply_key(reply).map(|key| {
                AnalyticsIntent::Mttr(MttrParams {
                    issue_key: Some(key),
                    ..Default::default()
                })
            })
        }
        (Some(AnalyticsType::SentimentAnalysis), MissingInfo::IssueKey) => {
            reply_key(reply).map(|issue_key| AnalyticsIntent::Sentiment { issue_key })
        }
        (Some(AnalyticsType::BugGenerationAnalysis), MissingInfo::ClientName)
        | (Some(AnalyticsType::BugGenerationAnalysis), MissingInfo::ReleaseVersion) => {
            serde_json::from_value::<BugAnalysisParams>(stored)
                .ok()
                .map(|mut params| {
                    if missing == MissingInfo::ClientName {
                        params.product_name = Some(reply.to_string());
                    } else {
                        params.version_name = Some(reply.to_string());
                    }
                    AnalyticsIntent::BugGeneration(params)
                })
        }
        (Some(AnalyticsType::DataForChartOrTable), MissingInfo::IssueArea) => {
            serde_json::from_value::<ChartParams>(stored)
                .ok()
                .map(|mut params| {
                    params.project = Some(reply.to_string());
                    params.jql_query = Some(scoped_jql(Some(reply), None, time_frame));
                    AnalyticsIntent::ChartOrTable(params)
                })
        }
        _ => None,
    };

    // A reply that cannot be slotted in directly is folded into the
    // original question and classified afresh.
    resumed.or_else(|| {
        let enhanced = missing.enhance_query(&ctx.original_query, reply);
        match classify_query(&enhanced, options) {
            AnalyticsIntent::NeedsClarification(_) => None,
            intent => Some(intent),
        }
    })
}

fn reply_key(reply: &str) -> Option<String> {
    extract_ticket_keys(&reply.to_uppercase()).into_iter().next()
}

/// Classify a query without consulting history.
pub fn classify_query(query: &str, options: &IntentOptions) -> AnalyticsIntent {
    let lowered = query.to_lowercase();
    let keys = extract_ticket_keys(query);
    let first_key = keys.first().cloned();
    let time_frame = TimeFrame::detect(query);
    let time_frame_label = time_frame.map(|t| t.as_str().to_string());

    // Sentiment of a specific ticket.
    if SENTIMENT.is_match(query) && TICKET_WORD.is_match(query) {
        return match first_key {
            Some(issue_key) => AnalyticsIntent::Sentiment { issue_key },
            None => clarify(
                MissingInfo::IssueKey,
                PROMPT_SENTIMENT_TICKET,
                AnalyticsType::SentimentAnalysis,
                Value::Object(Default::default()),
            ),
        };
    }

    if is_ai_summary_language_report(query) {
        return AnalyticsIntent::General {
            jql: Some(jql::ai_summary_language()),
        };
    }

    if let Some(issue_key) = first_key.clone() {
        if SUMMARY_WORD.is_match(query) {
            return AnalyticsIntent::TicketSummary { issue_key };
        }
    }

    if MTTR.is_match(query) {
        if let Some(issue_key) = first_key {
            return AnalyticsIntent::Mttr(MttrParams {
                issue_key: Some(issue_key),
                jql_query: None,
                time_frame: time_frame_label,
            });
        }
        let project = extract_project(query, options);
        let user = extract_user(query);
        if project.is_none() && user.is_none() {
            let partial = serde_json::json!({ "timeFrame": &time_frame_label });
            if mentions_any(&lowered, &["this ticket", "this issue", "this jira"]) {
                return clarify(
                    MissingInfo::IssueKey,
                    PROMPT_MTTR_TICKET,
                    AnalyticsType::MttrCalculation,
                    partial,
                );
            }
            if mentions_any(&lowered, &["this project", "this issue area", "this area"]) {
                return clarify(
                    MissingInfo::IssueArea,
                    PROMPT_MTTR_AREA,
                    AnalyticsType::MttrCalculation,
                    partial,
                );
            }
            if mentions_any(&lowered, &["this user", "this person", "this assignee"]) {
                return clarify(
                    MissingInfo::UserName,
                    PROMPT_MTTR_USER,
                    AnalyticsType::MttrCalculation,
                    partial,
                );
            }
        }
        let assignee = user.map(|u| format!("assignee = \"{}\"", jql::escape(&u)));
        let scope = project.or_else(|| options.default_project.clone());
        return AnalyticsIntent::Mttr(MttrParams {
            issue_key: None,
            jql_query: Some(scoped_jql(scope.as_deref(), assignee, time_frame)),
            time_frame: time_frame_label,
        });
    }

    if TOP_N.is_match(query) {
        let n = TOP_N_COUNT
            .captures(query)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse::<usize>().ok())
            .filter(|n| *n > 0);
        let mut params = TopNParams {
            n,
            aggregation_field: group_by_field(query).unwrap_or("priority.name").to_string(),
            project: None,
            jql_query_from_understanding: None,
            time_frame: time_frame_label,
        };
        let project = extract_project(query, options);
        if project.is_none() && mentions_any(&lowered, &["this project", "this issue area", "this area"]) {
            let partial = serde_json::to_value(&params).unwrap_or(Value::Null);
            return clarify(
                MissingInfo::IssueArea,
                PROMPT_TOP_N_AREA,
                AnalyticsType::TopNIssues,
                partial,
            );
        }
        let scope = project.or_else(|| options.default_project.clone());
        params.jql_query_from_understanding = Some(jql::ensure_order_by(
            &scoped_jql(scope.as_deref(), None, time_frame),
            "created DESC",
        ));
        params.project = scope;
        return AnalyticsIntent::TopN(params);
    }

    if BUG.is_match(query) {
        let link_type = if lowered.contains("block") {
            Some("Blocks".to_string())
        } else if lowered.contains("caused") || lowered.contains("causes") {
            Some("Causes".to_string())
        } else {
            None
        };
        if let Some(key) = first_key {
            return AnalyticsIntent::BugGeneration(BugAnalysisParams {
                source_type: BugSourceType::Issue,
                source_issue_key: Some(key),
                product_name: None,
                version_name: None,
                link_type,
            });
        }
        let mut params = BugAnalysisParams {
            source_type: BugSourceType::Version,
            source_issue_key: None,
            product_name: extract_client(query).or_else(|| extract_project(query, options)),
            version_name: extract_version(query),
            link_type,
        };
        let asks_client = mentions_any(&lowered, &["this client", "this product"]);
        if params.product_name.is_none() && (asks_client || options.default_project.is_none()) {
            let partial = serde_json::to_value(&params).unwrap_or(Value::Null);
            return clarify(
                MissingInfo::ClientName,
                PROMPT_BUG_CLIENT,
                AnalyticsType::BugGenerationAnalysis,
                partial,
            );
        }
        if params.product_name.is_none() {
            params.product_name = options.default_project.clone();
        }
        if params.version_name.is_none() {
            let partial = serde_json::to_value(&params).unwrap_or(Value::Null);
            return clarify(
                MissingInfo::ReleaseVersion,
                PROMPT_BUG_RELEASE,
                AnalyticsType::BugGenerationAnalysis,
                partial,
            );
        }
        return AnalyticsIntent::BugGeneration(params);
    }

    if CHART.is_match(query) {
        let visualization_type = if lowered.contains("table") {
            VisualizationType::Table
        } else if lowered.contains("bar") {
            VisualizationType::BarChart
        } else {
            VisualizationType::PieChart
        };
        let mut params = ChartParams {
            visualization_type,
            jql_query: None,
            project: None,
            group_by_field: Some(group_by_field(query).unwrap_or("status.name").to_string()),
            value_field: None,
            table_fields: Vec::new(),
        };
        let project = extract_project(query, options);
        if project.is_none() && mentions_any(&lowered, &["this project", "this issue area", "this area"]) {
            let partial = serde_json::to_value(&params).unwrap_or(Value::Null);
            return clarify(
                MissingInfo::IssueArea,
                PROMPT_CHART_AREA,
                AnalyticsType::DataForChartOrTable,
                partial,
            );
        }
        let scope = project.or_else(|| options.default_project.clone());
        params.jql_query = Some(scoped_jql(scope.as_deref(), None, time_frame));
        params.project = scope;
        return AnalyticsIntent::ChartOrTable(params);
    }

    AnalyticsIntent::General { jql: None }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts() -> IntentOptions {
        IntentOptions::default()
    }

    fn opts_with_default() -> IntentOptions {
        IntentOptions {
            default_project: Some("ZSEE".to_string()),
            ..IntentOptions::default()
        }
    }

    #[test]
    fn test_ticket_summary() {
        assert_eq!(
            classify_query("summary of JIRA-123", &opts()),
            AnalyticsIntent::TicketSummary {
                issue_key: "JIRA-123".into()
            }
        );
        assert_eq!(
            classify_query("tell me about ZSEE-42", &opts()).analytics_type(),
            AnalyticsType::TicketSummary
        );
        // a key on its own is not an analytic
        assert!(classify_query("ZSEE-42", &opts()).is_general());
    }

    #[test]
    fn test_mttr_project_and_time_frame() {
        let intent = classify_query("what's the mttr for project ABC this month", &opts());
        assert_eq!(
            intent,
            AnalyticsIntent::Mttr(MttrParams {
                issue_key: None,
                jql_query: Some("project = \"ABC\" AND created >= startOfMonth()".into()),
                time_frame: Some("this month".into()),
            })
        );
    }

    #[test]
    fn test_mttr_by_key_and_user() {
        let intent = classify_query("mttr of ZSEE-9", &opts());
        assert_eq!(
            intent,
            AnalyticsIntent::Mttr(MttrParams {
                issue_key: Some("ZSEE-9".into()),
                jql_query: None,
                time_frame: None,
            })
        );
        match classify_query("average resolution time for user jdoe", &opts()) {
            AnalyticsIntent::Mttr(p) => {
                assert_eq!(p.jql_query.as_deref(), Some("assignee = \"jdoe\""))
            }
            other => panic!("unexpected {:?}", other),
        }
        match classify_query("mean time to resolution", &opts()) {
            AnalyticsIntent::Mttr(p) => assert_eq!(p.jql_query.as_deref(), Some("")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_mttr_needs_clarification() {
        match classify_query("what is the mttr for this project", &opts()) {
            AnalyticsIntent::NeedsClarification(c) => {
                assert_eq!(c.missing_info, MissingInfo::IssueArea);
                assert_eq!(c.intent_type, AnalyticsType::MttrCalculation);
                assert!(crate::heuristics::is_clarification_prompt(&c.prompt));
            }
            other => panic!("unexpected {:?}", other),
        }
        match classify_query("mttr for this user", &opts()) {
            AnalyticsIntent::NeedsClarification(c) => {
                assert_eq!(c.missing_info, MissingInfo::UserName)
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_top_n() {
        match classify_query("top 5 issues by assignee in project Audio this week", &opts()) {
            AnalyticsIntent::TopN(p) => {
                assert_eq!(p.n, Some(5));
                assert_eq!(p.aggregation_field, "assignee.displayName");
                assert_eq!(p.project.as_deref(), Some("Audio"));
                assert_eq!(
                    p.jql_query_from_understanding.as_deref(),
                    Some("project = \"Audio\" AND created >= startOfWeek() ORDER BY created DESC")
                );
            }
            other => panic!("unexpected {:?}", other),
        }
        match classify_query("most reported tickets for desktop client", &opts()) {
            AnalyticsIntent::TopN(p) => {
                assert_eq!(p.n, None);
                assert_eq!(p.aggregation_field, "priority.name");
                assert_eq!(p.project.as_deref(), Some("Desktop client"));
            }
            other => panic!("unexpected {:?}", other),
        }
        match classify_query("top issues", &opts_with_default()) {
            AnalyticsIntent::TopN(p) => assert_eq!(p.project.as_deref(), Some("ZSEE")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_top_n_needs_issue_area() {
        match classify_query("top 3 issues in this issue area", &opts()) {
            AnalyticsIntent::NeedsClarification(c) => {
                assert_eq!(c.missing_info, MissingInfo::IssueArea);
                assert_eq!(c.query_context["n"], 3);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_bug_generation() {
        match classify_query("list bugs related to ZSEE-100", &opts()) {
            AnalyticsIntent::BugGeneration(p) => {
                assert_eq!(p.source_type, BugSourceType::Issue);
                assert_eq!(p.source_issue_key.as_deref(), Some("ZSEE-100"));
            }
            other => panic!("unexpected {:?}", other),
        }
        match classify_query("bugs reported for client Mobile in version 5.17.2", &opts()) {
            AnalyticsIntent::BugGeneration(p) => {
                assert_eq!(p.source_type, BugSourceType::Version);
                assert_eq!(p.product_name.as_deref(), Some("Mobile"));
                assert_eq!(p.version_name.as_deref(), Some("5.17.2"));
            }
            other => panic!("unexpected {:?}", other),
        }
        match classify_query("bugs reported in this release", &opts_with_default()) {
            AnalyticsIntent::NeedsClarification(c) => {
                assert_eq!(c.missing_info, MissingInfo::ReleaseVersion);
                assert_eq!(c.query_context["productName"], "ZSEE");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_chart() {
        match classify_query("bar chart of issues by priority for project ABC", &opts()) {
            AnalyticsIntent::ChartOrTable(p) => {
                assert_eq!(p.visualization_type, VisualizationType::BarChart);
                assert_eq!(p.group_by_field.as_deref(), Some("priority.name"));
                assert_eq!(p.jql_query.as_deref(), Some("project = \"ABC\""));
            }
            other => panic!("unexpected {:?}", other),
        }
        match classify_query("show a table of project ABC", &opts()) {
            AnalyticsIntent::ChartOrTable(p) => {
                assert_eq!(p.visualization_type, VisualizationType::Table)
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_sentiment() {
        assert_eq!(
            classify_query("what is the sentiment on ticket ZSEE-7", &opts()),
            AnalyticsIntent::Sentiment {
                issue_key: "ZSEE-7".into()
            }
        );
        assert_eq!(
            classify_query("what is the customer tone on this ticket", &opts()).analytics_type(),
            AnalyticsType::NeedsClarification
        );
    }

    #[test]
    fn test_ai_summary_language_is_general_with_jql() {
        match classify_query("jira issues where AI summary is in the wrong language", &opts()) {
            AnalyticsIntent::General { jql } => assert!(jql.unwrap().contains("AI summary")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_loose_language_wording_is_plain_general() {
        assert_eq!(
            classify_query("meeting notes came out in another language", &opts()),
            AnalyticsIntent::General { jql: None }
        );
        match classify_query("the meeting language is incorrect", &opts()) {
            AnalyticsIntent::General { jql } => assert!(jql.is_some()),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_general_fallback() {
        assert_eq!(
            classify_query("explain the login issue", &opts()),
            AnalyticsIntent::General { jql: None }
        );
    }

    #[test]
    fn test_resume_top_n_from_metadata() {
        let first = classify_query("top 3 issues in this issue area this month", &opts());
        let AnalyticsIntent::NeedsClarification(req) = first else {
            panic!("expected clarification");
        };
        let metadata = serde_json::json!({"metadata": {
            "originalQuery": "top 3 issues in this issue area this month",
            "missingInfo": req.missing_info,
            "intentType": req.intent_type,
            "queryContext": req.query_context,
        }});
        let history = vec![
            ChatTurn::user("top 3 issues in this issue area this month"),
            ChatTurn::metadata(metadata.to_string()),
            ChatTurn::assistant(req.prompt.clone()),
        ];
        match classify_intent("Desktop Client", &history, &opts()) {
            AnalyticsIntent::TopN(p) => {
                assert_eq!(p.n, Some(3));
                assert_eq!(p.project.as_deref(), Some("Desktop Client"));
                assert_eq!(
                    p.jql_query_from_understanding.as_deref(),
                    Some("project = \"Desktop Client\" AND created >= startOfMonth() ORDER BY created DESC")
                );
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_resume_user_and_key() {
        let ctx = OriginalQueryContext {
            original_query: "mttr for this user".into(),
            missing_info: Some(MissingInfo::UserName),
            intent_type: Some("MTTR_CALCULATION".into()),
            query_context: None,
        };
        assert_eq!(
            resume_clarification(&ctx, "jdoe", &opts()),
            Some(AnalyticsIntent::Mttr(MttrParams {
                issue_key: None,
                jql_query: Some("assignee = \"jdoe\"".into()),
                time_frame: None,
            }))
        );

        let ctx = OriginalQueryContext {
            original_query: "sentiment of this ticket".into(),
            missing_info: Some(MissingInfo::IssueKey),
            intent_type: Some("SENTIMENT_ANALYSIS".into()),
            query_context: None,
        };
        assert_eq!(
            resume_clarification(&ctx, "zsee-12", &opts()),
            Some(AnalyticsIntent::Sentiment {
                issue_key: "ZSEE-12".into()
            })
        );
    }

    #[test]
    fn test_follow_up_without_metadata_is_classified_fresh() {
        let history = vec![ChatTurn::assistant("Which Issue Area would you like?")];
        assert!(classify_intent("Audio", &history, &opts()).is_general());
    }

    #[test]
    fn test_extract_project_skips_stopwords() {
        assert_eq!(extract_project("issues in this project", &opts()), None);
        assert_eq!(
            extract_project("issues in the Billing project", &opts()).as_deref(),
            Some("Billing")
        );
        assert_eq!(
            extract_project("issue area = \"Telephony\"", &opts()).as_deref(),
            Some("Telephony")
        );
    }
}

//! Jira analytics engine.
//!
//! Pure transformations over already-fetched [`IssueRecord`]s. Nothing in
//! this module performs I/O; the async service in the application crate
//! fetches issues and hands them here.
//!
//! | Function | Purpose |
//! |----------|---------|
//! | [`calculate_mttr`] | mean time to resolution over resolved issues |
//! | [`format_millis_to_days_hours_minutes`] | `"2d 3h 15m"` rendering |
//! | [`group_and_count`] | group by a dot path, count or sum, sort descending |
//! | [`format_data_for_table`] | project issues into table rows |
//! | [`analyze_linked_issues`] | follow `issuelinks` to issues of a given type |
//! | [`score_sentiment`] | lexicon-based sentiment over free text |

use std::cmp::Ordering;
use std::collections::HashMap;

use chrono::{DateTime, FixedOffset, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::heuristics::compile;
use crate::models::{AggregationGroup, IssueRecord, LinkedIssue, MttrResult};

/// Label used when a grouping path does not resolve.
pub const UNASSIGNED: &str = "Unassigned";
/// Cell value used when a table path does not resolve.
pub const NOT_AVAILABLE: &str = "N/A";

// ═══════════════════════════════════════════════════════════════════════
// MTTR
// ═══════════════════════════════════════════════════════════════════════

/// Parse a Jira timestamp.
///
/// Accepts RFC 3339, Jira's `2024-01-05T10:00:00.000+0000` form, and bare
/// `YYYY-MM-DD` dates (taken as midnight UTC).
pub fn parse_jira_timestamp(raw: &str) -> Option<DateTime<FixedOffset>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt);
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f%z", "%Y-%m-%dT%H:%M:%S%z"] {
        if let Ok(dt) = DateTime::parse_from_str(raw, fmt) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc().fixed_offset())
}

fn timestamp_field(issue: &IssueRecord, name: &str) -> Option<DateTime<FixedOffset>> {
    issue.field_str(name).and_then(parse_jira_timestamp)
}

fn status_category_is_done(issue: &IssueRecord) -> bool {
    issue
        .fields
        .pointer("/status/statusCategory/key")
        .and_then(|v| v.as_str())
        .map(|k| k.eq_ignore_ascii_case("done"))
        .unwrap_or(false)
}

/// Mean time to resolution over `issues`.
///
/// An issue contributes `resolutiondate - created` when both are present
/// and the difference is positive. Issues without a `resolutiondate` whose
/// status category is `done` contribute `updated - created` instead; that
/// approximation is logged. Non-positive durations are skipped with a
/// warning.
pub fn calculate_mttr(issues: &[IssueRecord]) -> MttrResult {
    let mut total_millis: f64 = 0.0;
    let mut count: usize = 0;

    for issue in issues {
        let Some(created) = timestamp_field(issue, "created") else {
            debug!(issue = %issue.key, "skipping issue without created date");
            continue;
        };

        let resolved = match timestamp_field(issue, "resolutiondate") {
            Some(resolved) => resolved,
            None if status_category_is_done(issue) => match timestamp_field(issue, "updated") {
                Some(updated) => {
                    warn!(
                        issue = %issue.key,
                        "no resolutiondate on a done issue; approximating with updated"
                    );
                    updated
                }
                None => continue,
            },
            None => continue,
        };

        let millis = (resolved - created).num_milliseconds();
        if millis <= 0 {
            warn!(
                issue = %issue.key,
                millis,
                "resolution is not after creation; skipping"
            );
            continue;
        }

        total_millis += millis as f64;
        count += 1;
    }

    if count == 0 {
        return MttrResult {
            mttr_millis: 0.0,
            count: 0,
            mttr_formatted: NOT_AVAILABLE.to_string(),
        };
    }

    let mttr_millis = total_millis / count as f64;
    MttrResult {
        mttr_millis,
        count,
        mttr_formatted: format_millis_to_days_hours_minutes(mttr_millis),
    }
}

/// Render a duration as days, hours, and minutes, truncating.
///
/// Zero components are omitted. `0` renders as `"0m"`; positive durations
/// under a minute render as `"<1m"`. Never returns an empty string.
pub fn format_millis_to_days_hours_minutes(ms: f64) -> String {
    if !ms.is_finite() || ms <= 0.0 {
        return "0m".to_string();
    }

    let total_minutes = (ms / 60_000.0).floor() as u64;
    if total_minutes == 0 {
        return "<1m".to_string();
    }

    let days = total_minutes / (24 * 60);
    let hours = (total_minutes % (24 * 60)) / 60;
    let minutes = total_minutes % 60;

    let mut parts = Vec::with_capacity(3);
    if days > 0 {
        parts.push(format!("{}d", days));
    }
    if hours > 0 {
        parts.push(format!("{}h", hours));
    }
    if minutes > 0 {
        parts.push(format!("{}m", minutes));
    }
    parts.join(" ")
}

// ═══════════════════════════════════════════════════════════════════════
// Grouping and tables
// ═══════════════════════════════════════════════════════════════════════

/// Display label for a resolved field value.
///
/// Objects use their `name`, `displayName`, `value`, or `key`; arrays join
/// their element labels. Null, blank, and missing values become
/// [`UNASSIGNED`].
pub fn value_label(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => UNASSIGNED.to_string(),
        Some(Value::String(s)) if s.trim().is_empty() => UNASSIGNED.to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        Some(Value::Array(items)) => {
            let labels: Vec<String> = items
                .iter()
                .map(|v| value_label(Some(v)))
                .filter(|l| l != UNASSIGNED)
                .collect();
            if labels.is_empty() {
                UNASSIGNED.to_string()
            } else {
                labels.join(", ")
            }
        }
        Some(Value::Object(map)) => ["name", "displayName", "value", "key"]
            .iter()
            .find_map(|k| map.get(*k).and_then(|v| v.as_str()))
            .map(|s| s.to_string())
            .unwrap_or_else(|| Value::Object(map.clone()).to_string()),
    }
}

fn numeric_value(value: Option<&Value>) -> f64 {
    match value {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0.0),
        Some(Value::Array(items)) => items.iter().map(|v| numeric_value(Some(v))).sum(),
        _ => 0.0,
    }
}

/// Group issues by the value at `group_by_path`.
///
/// Without `count_field_path` each issue adds `1.0` to its group; with it,
/// the numeric value at that path is summed instead. Groups are sorted by
/// value descending; ties keep first-appearance order.
pub fn group_and_count(
    issues: &[IssueRecord],
    group_by_path: &str,
    count_field_path: Option<&str>,
) -> Vec<AggregationGroup> {
    let mut groups: Vec<AggregationGroup> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for issue in issues {
        let label = value_label(issue.resolve_path(group_by_path).as_ref());
        let amount = match count_field_path {
            Some(path) => numeric_value(issue.resolve_path(path).as_ref()),
            None => 1.0,
        };

        let slot = *index.entry(label.clone()).or_insert_with(|| {
            groups.push(AggregationGroup {
                label,
                value: 0.0,
                issues: Vec::new(),
            });
            groups.len() - 1
        });
        groups[slot].value += amount;
        groups[slot].issues.push(issue.key.clone());
    }

    groups.sort_by(|a, b| b.value.partial_cmp(&a.value).unwrap_or(Ordering::Equal));
    groups
}

/// Project each issue onto `field_paths`. Each row is keyed by the last
/// segment of the path; unresolvable paths yield [`NOT_AVAILABLE`].
pub fn format_data_for_table<S: AsRef<str>>(
    issues: &[IssueRecord],
    field_paths: &[S],
) -> Vec<Map<String, Value>> {
    issues
        .iter()
        .map(|issue| {
            let mut row = Map::new();
            for path in field_paths {
                let path = path.as_ref();
                let column = path.rsplit('.').next().unwrap_or(path).to_string();
                let cell = issue
                    .resolve_path(path)
                    .unwrap_or_else(|| Value::String(NOT_AVAILABLE.to_string()));
                row.insert(column, cell);
            }
            row
        })
        .collect()
}

// ═══════════════════════════════════════════════════════════════════════
// Linked issues
// ═══════════════════════════════════════════════════════════════════════

fn str_at<'a>(value: &'a Value, pointer: &str) -> Option<&'a str> {
    value.pointer(pointer).and_then(|v| v.as_str())
}

/// Issues linked from `source` whose type is `target_issue_type`.
///
/// When `link_type_filter` is non-empty, a link is kept only if its type
/// name, inward label, or outward label equals one of the filters
/// (case-insensitive).
pub fn analyze_linked_issues<S: AsRef<str>>(
    source: &IssueRecord,
    target_issue_type: &str,
    link_type_filter: &[S],
) -> Vec<LinkedIssue> {
    let Some(links) = source.fields.get("issuelinks").and_then(|v| v.as_array()) else {
        return Vec::new();
    };

    let filters: Vec<String> = link_type_filter
        .iter()
        .map(|f| f.as_ref().trim().to_lowercase())
        .filter(|f| !f.is_empty())
        .collect();

    let mut out = Vec::new();
    for link in links {
        let (linked, direction) = match (link.get("outwardIssue"), link.get("inwardIssue")) {
            (Some(issue), _) => (issue, "outward"),
            (None, Some(issue)) => (issue, "inward"),
            (None, None) => continue,
        };

        let issue_type = str_at(linked, "/fields/issuetype/name").unwrap_or("");
        if !issue_type.eq_ignore_ascii_case(target_issue_type) {
            continue;
        }

        if !filters.is_empty() {
            let labels = [
                str_at(link, "/type/name"),
                str_at(link, "/type/inward"),
                str_at(link, "/type/outward"),
            ];
            let matched = labels
                .iter()
                .flatten()
                .any(|l| filters.contains(&l.to_lowercase()));
            if !matched {
                continue;
            }
        }

        let Some(key) = linked.get("key").and_then(|v| v.as_str()) else {
            continue;
        };

        out.push(LinkedIssue {
            key: key.to_string(),
            summary: str_at(linked, "/fields/summary").unwrap_or("").to_string(),
            status: str_at(linked, "/fields/status/name")
                .unwrap_or(NOT_AVAILABLE)
                .to_string(),
            issue_type: issue_type.to_string(),
            link_description: str_at(link, &format!("/type/{}", direction))
                .or_else(|| str_at(link, "/type/name"))
                .unwrap_or("")
                .to_string(),
            link_direction: direction.to_string(),
        });
    }
    out
}

// ═══════════════════════════════════════════════════════════════════════
// Sentiment
// ═══════════════════════════════════════════════════════════════════════

const POSITIVE_TERMS: &[&str] = &[
    "good", "great", "excellent", "happy", "satisfied", "pleased", "fantastic", "amazing",
    "wonderful", "resolved", "fixed", "working", "success", "successful", "approve", "approved",
    "done", "completed",
];

const NEGATIVE_TERMS: &[&str] = &[
    "bad", "issue", "problem", "fail", "failed", "not working", "dissatisfied", "unhappy",
    "broken", "bug", "error", "crash", "disappointed", "wrong", "doesn't work", "terrible",
    "awful", "horrible", "poor", "reject", "rejected", "incomplete",
];

struct Lexicon {
    positive: Vec<(&'static str, Regex)>,
    negative: Vec<(&'static str, Regex)>,
}

static LEXICON: Lazy<Lexicon> = Lazy::new(|| {
    let build = |terms: &[&'static str]| {
        terms
            .iter()
            .map(|t| (*t, compile(&format!(r"(?i)\b{}\b", regex::escape(t)))))
            .collect()
    };
    Lexicon {
        positive: build(POSITIVE_TERMS),
        negative: build(NEGATIVE_TERMS),
    }
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SentimentLabel {
    Positive,
    Neutral,
    Negative,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SentimentScore {
    pub label: SentimentLabel,
    /// `(positive - negative) / (positive + negative)`, or `0.0` with no terms.
    pub score: f64,
    pub positive_count: usize,
    pub negative_count: usize,
}

fn count_terms(text: &str, terms: &[(&'static str, Regex)]) -> usize {
    terms.iter().map(|(_, re)| re.find_iter(text).count()).sum()
}

/// Lexicon sentiment of `text`. Scores above `0.2` are positive, below
/// `-0.2` negative.
pub fn score_sentiment(text: &str) -> SentimentScore {
    let positive_count = count_terms(text, &LEXICON.positive);
    let negative_count = count_terms(text, &LEXICON.negative);
    let total = positive_count + negative_count;
    let score = if total == 0 {
        0.0
    } else {
        (positive_count as f64 - negative_count as f64) / total as f64
    };
    let label = if score > 0.2 {
        SentimentLabel::Positive
    } else if score < -0.2 {
        SentimentLabel::Negative
    } else {
        SentimentLabel::Neutral
    };
    SentimentScore {
        label,
        score,
        positive_count,
        negative_count,
    }
}

/// Lexicon terms used more than once across `texts`, most frequent first,
/// at most `limit`.
pub fn noteworthy_terms<S: AsRef<str>>(texts: &[S], limit: usize) -> Vec<(String, usize)> {
    let mut counts: Vec<(String, usize)> = LEXICON
        .positive
        .iter()
        .chain(LEXICON.negative.iter())
        .map(|(term, re)| {
            let n: usize = texts
                .iter()
                .map(|t| re.find_iter(t.as_ref()).count())
                .sum();
            (term.to_string(), n)
        })
        .filter(|(_, n)| *n > 1)
        .collect();
    counts.sort_by(|a, b| b.1.cmp(&a.1));
    counts.truncate(limit);
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const HOUR: i64 = 3_600_000;

    fn resolved(key: &str, created: &str, resolved: &str) -> IssueRecord {
        IssueRecord::new(key, json!({"created": created, "resolutiondate": resolved}))
    }

    #[test]
    fn test_parse_jira_timestamp_formats() {
        assert!(parse_jira_timestamp("2024-01-05T10:00:00.000+0000").is_some());
        assert!(parse_jira_timestamp("2024-01-05T10:00:00Z").is_some());
        assert!(parse_jira_timestamp("2024-01-05").is_some());
        assert!(parse_jira_timestamp("yesterday").is_none());
    }

    #[test]
    fn test_mttr_is_mean_of_durations() {
        let issues = vec![
            resolved("A-1", "2024-01-01T00:00:00.000+0000", "2024-01-01T02:00:00.000+0000"),
            resolved("A-2", "2024-01-01T00:00:00.000+0000", "2024-01-01T05:00:00.000+0000"),
        ];
        let result = calculate_mttr(&issues);
        assert_eq!(result.count, 2);
        assert_eq!(result.mttr_millis, ((2 * HOUR + 5 * HOUR) / 2) as f64);
        assert_eq!(result.mttr_formatted, "3h 30m");
    }

    #[test]
    fn test_mttr_zero_cases() {
        let empty = calculate_mttr(&[]);
        assert_eq!(empty.count, 0);
        assert_eq!(empty.mttr_millis, 0.0);
        assert_eq!(empty.mttr_formatted, "N/A");

        let unresolved = calculate_mttr(&[IssueRecord::new(
            "A-1",
            json!({"created": "2024-01-01T00:00:00.000+0000"}),
        )]);
        assert_eq!(unresolved.count, 0);
        assert_eq!(unresolved.mttr_formatted, "N/A");
    }

    #[test]
    fn test_mttr_skips_non_positive_durations() {
        let issues = vec![
            resolved("A-1", "2024-01-02T00:00:00Z", "2024-01-01T00:00:00Z"),
            resolved("A-2", "2024-01-01T00:00:00Z", "2024-01-01T00:00:00Z"),
            resolved("A-3", "2024-01-01T00:00:00Z", "2024-01-02T00:00:00Z"),
        ];
        let result = calculate_mttr(&issues);
        assert_eq!(result.count, 1);
        assert_eq!(result.mttr_formatted, "1d");
    }

    #[test]
    fn test_mttr_done_status_uses_updated() {
        let issue = IssueRecord::new(
            "A-1",
            json!({
                "created": "2024-01-01T00:00:00Z",
                "updated": "2024-01-01T00:45:00Z",
                "status": {"name": "Closed", "statusCategory": {"key": "done"}}
            }),
        );
        let result = calculate_mttr(&[issue]);
        assert_eq!(result.count, 1);
        assert_eq!(result.mttr_formatted, "45m");

        let open = IssueRecord::new(
            "A-2",
            json!({
                "created": "2024-01-01T00:00:00Z",
                "updated": "2024-01-01T00:45:00Z",
                "status": {"statusCategory": {"key": "indeterminate"}}
            }),
        );
        assert_eq!(calculate_mttr(&[open]).count, 0);
    }

    #[test]
    fn test_format_millis() {
        assert_eq!(format_millis_to_days_hours_minutes(0.0), "0m");
        assert_eq!(format_millis_to_days_hours_minutes(59_999.0), "<1m");
        assert_eq!(format_millis_to_days_hours_minutes(60_000.0), "1m");
        assert_eq!(
            format_millis_to_days_hours_minutes((2 * 24 * HOUR + 3 * HOUR + 15 * 60_000) as f64),
            "2d 3h 15m"
        );
        assert_eq!(format_millis_to_days_hours_minutes((24 * HOUR + 30 * 60_000) as f64), "1d 30m");
        assert_eq!(format_millis_to_days_hours_minutes(-5.0), "0m");
        assert_eq!(format_millis_to_days_hours_minutes(f64::NAN), "0m");
    }

    #[test]
    fn test_format_millis_never_empty() {
        for ms in [1.0, 61_000.0, 3_600_000.0, 86_400_000.0, 1e12] {
            assert!(!format_millis_to_days_hours_minutes(ms).is_empty());
        }
    }

    #[test]
    fn test_group_and_count_missing_field_is_unassigned() {
        let issues: Vec<IssueRecord> = (1..=5)
            .map(|i| IssueRecord::new(format!("A-{}", i), json!({"summary": "x"})))
            .collect();
        let groups = group_and_count(&issues, "fields.assignee.displayName", None);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].label, "Unassigned");
        assert_eq!(groups[0].value, 5.0);
        assert_eq!(groups[0].issues, vec!["A-1", "A-2", "A-3", "A-4", "A-5"]);
    }

    #[test]
    fn test_group_and_count_sorted_and_stable() {
        let issues = vec![
            IssueRecord::new("A-1", json!({"priority": {"name": "Low"}})),
            IssueRecord::new("A-2", json!({"priority": {"name": "High"}})),
            IssueRecord::new("A-3", json!({"priority": {"name": "High"}})),
            IssueRecord::new("A-4", json!({"priority": {"name": "Medium"}})),
        ];
        let groups = group_and_count(&issues, "fields.priority.name", None);
        let labels: Vec<&str> = groups.iter().map(|g| g.label.as_str()).collect();
        assert_eq!(labels, vec!["High", "Low", "Medium"]);
        let total: f64 = groups.iter().map(|g| g.value).sum();
        assert_eq!(total, issues.len() as f64);

        // grouping on the object itself uses its name
        let by_object = group_and_count(&issues, "fields.priority", None);
        assert_eq!(by_object[0].label, "High");
    }

    #[test]
    fn test_group_and_count_sums_count_field() {
        let issues = vec![
            IssueRecord::new("A-1", json!({"status": {"name": "Open"}, "points": 3})),
            IssueRecord::new("A-2", json!({"status": {"name": "Done"}, "points": 8})),
            IssueRecord::new("A-3", json!({"status": {"name": "Open"}, "points": "2"})),
            IssueRecord::new("A-4", json!({"status": {"name": "Open"}})),
        ];
        let groups = group_and_count(&issues, "fields.status.name", Some("fields.points"));
        assert_eq!(groups[0].label, "Done");
        assert_eq!(groups[0].value, 8.0);
        assert_eq!(groups[1].label, "Open");
        assert_eq!(groups[1].value, 5.0);
        assert_eq!(groups[1].issues.len(), 3);
    }

    #[test]
    fn test_group_and_count_array_field() {
        let issues = vec![IssueRecord::new(
            "A-1",
            json!({"components": [{"name": "audio"}, {"name": "video"}]}),
        )];
        let groups = group_and_count(&issues, "fields.components.name", None);
        assert_eq!(groups[0].label, "audio, video");
    }

    #[test]
    fn test_format_data_for_table() {
        let issues = vec![IssueRecord::new(
            "A-1",
            json!({"summary": "Crash on join", "status": {"name": "Open"}}),
        )];
        let rows = format_data_for_table(
            &issues,
            &["key", "fields.summary", "fields.status.name", "fields.assignee.displayName"],
        );
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["key"], "A-1");
        assert_eq!(rows[0]["summary"], "Crash on join");
        assert_eq!(rows[0]["name"], "Open");
        assert_eq!(rows[0]["displayName"], "N/A");
    }

    fn source_with_links() -> IssueRecord {
        IssueRecord::new(
            "FEAT-1",
            json!({"issuelinks": [
                {
                    "type": {"name": "Blocks", "inward": "is blocked by", "outward": "blocks"},
                    "outwardIssue": {"key": "BUG-1", "fields": {
                        "summary": "Audio drops", "status": {"name": "Open"},
                        "issuetype": {"name": "Bug"}
                    }}
                },
                {
                    "type": {"name": "Relates", "inward": "relates to", "outward": "relates to"},
                    "inwardIssue": {"key": "BUG-2", "fields": {
                        "summary": "Echo", "issuetype": {"name": "bug"}
                    }}
                },
                {
                    "type": {"name": "Relates", "inward": "relates to", "outward": "relates to"},
                    "inwardIssue": {"key": "TASK-3", "fields": {"issuetype": {"name": "Task"}}}
                },
                {"type": {"name": "Broken"}}
            ]}),
        )
    }

    #[test]
    fn test_analyze_linked_issues_by_type() {
        let linked = analyze_linked_issues(&source_with_links(), "Bug", &[] as &[&str]);
        assert_eq!(linked.len(), 2);
        assert_eq!(linked[0].key, "BUG-1");
        assert_eq!(linked[0].link_direction, "outward");
        assert_eq!(linked[0].link_description, "blocks");
        assert_eq!(linked[1].key, "BUG-2");
        assert_eq!(linked[1].link_direction, "inward");
        assert_eq!(linked[1].status, "N/A");
    }

    #[test]
    fn test_analyze_linked_issues_with_filter() {
        let linked = analyze_linked_issues(&source_with_links(), "Bug", &["RELATES TO"]);
        assert_eq!(linked.len(), 1);
        assert_eq!(linked[0].key, "BUG-2");

        let none = analyze_linked_issues(&IssueRecord::new("X-1", json!({})), "Bug", &["blocks"]);
        assert!(none.is_empty());
    }

    #[test]
    fn test_score_sentiment() {
        let s = score_sentiment("Great work, the fix is done and everything is working");
        assert_eq!(s.label, SentimentLabel::Positive);
        let s = score_sentiment("Still broken. This is a terrible bug and the error persists");
        assert_eq!(s.label, SentimentLabel::Negative);
        let s = score_sentiment("Meeting moved to Tuesday");
        assert_eq!(s.label, SentimentLabel::Neutral);
        assert_eq!(s.score, 0.0);
        // word boundaries: "issues" is not "issue"
        assert_eq!(score_sentiment("issues").negative_count, 0);
    }

    #[test]
    fn test_noteworthy_terms() {
        let texts = ["crash on join", "another crash", "fixed", "crash again, still broken"];
        let terms = noteworthy_terms(&texts, 5);
        assert_eq!(terms, vec![("crash".to_string(), 3)]);
    }
}

//! JQL construction helpers.
//!
//! Direct Jira search always receives JQL. Free text is wrapped in a
//! `text ~` clause; anything already shaped like JQL passes through.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::heuristics::{compile, is_ai_summary_language_query};

static ORDER_BY: Lazy<Regex> = Lazy::new(|| compile(r"(?i)\s*\border\s+by\b"));
static JQL_SHAPE: Lazy<Regex> = Lazy::new(|| {
    compile(
        r#"(?i)(\b[\w."\[\]()]+\s*(=|!=|~|!~|>=|<=|>|<)\s*\S)|\border\s+by\b|\b(not\s+)?in\s*\(|\b(startOf|endOf)\w*\(\)|\bis\s+(not\s+)?empty\b"#,
    )
});
static PROJECT_IN_JQL: Lazy<Regex> = Lazy::new(|| compile(r#"(?i)project\s*=\s*"([^"]+)""#));

/// Escape a value for use inside a double-quoted JQL string.
pub fn escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// True if `text` already reads as a JQL expression.
pub fn looks_like_jql(text: &str) -> bool {
    JQL_SHAPE.is_match(text)
}

/// Full-text search JQL for a natural-language query.
pub fn text_search(query: &str) -> String {
    format!("text ~ \"{}\" ORDER BY updated DESC", escape(query.trim()))
}

/// JQL for issues about AI meeting summaries produced in the wrong language.
pub fn ai_summary_language() -> String {
    concat!(
        r#"(summary ~ "AI summary" OR summary ~ "meeting summary" OR summary ~ "language") AND "#,
        r#"(summary ~ "incorrect" OR summary ~ "wrong" OR summary ~ "not working" OR "#,
        r#"description ~ "incorrect language" OR description ~ "wrong language" OR "#,
        r#"description ~ "AI summary") ORDER BY updatedDate DESC"#
    )
    .to_string()
}

/// The JQL a direct Jira search should run for `query`.
pub fn for_direct_search(query: &str) -> String {
    if looks_like_jql(query) {
        query.trim().to_string()
    } else if is_ai_summary_language_query(query) {
        ai_summary_language()
    } else {
        text_search(query)
    }
}

/// Split `jql` into its filter and its `ORDER BY ...` suffix (if any).
fn split_order_by(jql: &str) -> (&str, &str) {
    match ORDER_BY.find(jql) {
        Some(m) => (jql[..m.start()].trim(), jql[m.start()..].trim()),
        None => (jql.trim(), ""),
    }
}

/// AND `clause` onto `jql`, keeping any `ORDER BY` at the end.
///
/// The existing filter is parenthesized: `AND` binds tighter than `OR`, so
/// `a OR b AND c` would only constrain `b`.
pub fn and_clause(jql: &str, clause: &str) -> String {
    let (filter, order) = split_order_by(jql);
    let combined = if filter.is_empty() {
        clause.to_string()
    } else {
        format!("({}) AND {}", filter, clause)
    };
    if order.is_empty() {
        combined
    } else {
        format!("{} {}", combined, order)
    }
}

/// Append `ORDER BY <default_order>` unless the JQL already orders.
pub fn ensure_order_by(jql: &str, default_order: &str) -> String {
    if ORDER_BY.is_match(jql) {
        jql.trim().to_string()
    } else if jql.trim().is_empty() {
        format!("ORDER BY {}", default_order)
    } else {
        format!("{} ORDER BY {}", jql.trim(), default_order)
    }
}

/// `project = "<name>"`.
pub fn project_clause(project: &str) -> String {
    format!("project = \"{}\"", escape(project))
}

/// The project named by a `project = "X"` clause.
pub fn project_from(jql: &str) -> Option<String> {
    PROJECT_IN_JQL
        .captures(jql)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// A relative creation window named in a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeFrame {
    ThisWeek,
    ThisMonth,
    ThisYear,
}

impl TimeFrame {
    pub fn detect(text: &str) -> Option<Self> {
        let lowered = text.to_lowercase();
        if lowered.contains("this week") {
            Some(TimeFrame::ThisWeek)
        } else if lowered.contains("this month") {
            Some(TimeFrame::ThisMonth)
        } else if lowered.contains("this year") {
            Some(TimeFrame::ThisYear)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TimeFrame::ThisWeek => "this week",
            TimeFrame::ThisMonth => "this month",
            TimeFrame::ThisYear => "this year",
        }
    }

    pub fn clause(&self) -> &'static str {
        match self {
            TimeFrame::ThisWeek => "created >= startOfWeek()",
            TimeFrame::ThisMonth => "created >= startOfMonth()",
            TimeFrame::ThisYear => "created >= startOfYear()",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_looks_like_jql() {
        assert!(looks_like_jql("project = ABC AND status = Done"));
        assert!(looks_like_jql("summary ~ \"login\""));
        assert!(looks_like_jql("assignee in (bob, alice)"));
        assert!(looks_like_jql("ORDER BY created DESC"));
        assert!(!looks_like_jql("why does login fail on android"));
        assert!(!looks_like_jql("find ZSEE-123"));
    }

    #[test]
    fn test_for_direct_search() {
        assert_eq!(
            for_direct_search("login \"fails\""),
            "text ~ \"login \\\"fails\\\"\" ORDER BY updated DESC"
        );
        assert_eq!(
            for_direct_search("status = Open"),
            "status = Open"
        );
        assert!(for_direct_search("AI summary in wrong language").starts_with("(summary ~ \"AI summary\""));
    }

    #[test]
    fn test_and_clause_keeps_order_by_last() {
        assert_eq!(
            and_clause("project = \"ABC\" ORDER BY created DESC", "created >= startOfMonth()"),
            "(project = \"ABC\") AND created >= startOfMonth() ORDER BY created DESC"
        );
        assert_eq!(
            and_clause("status = Resolved", "statusCategory = Done"),
            "(status = Resolved) AND statusCategory = Done"
        );
        assert_eq!(and_clause("", "statusCategory = Done"), "statusCategory = Done");
        assert_eq!(
            and_clause("ORDER BY created DESC", "project = \"X\""),
            "project = \"X\" ORDER BY created DESC"
        );
    }

    #[test]
    fn test_and_clause_constrains_every_or_branch() {
        assert_eq!(
            and_clause("project = A OR project = B ORDER BY created DESC", "statusCategory = Done"),
            "(project = A OR project = B) AND statusCategory = Done ORDER BY created DESC"
        );
    }

    #[test]
    fn test_ensure_order_by() {
        assert_eq!(
            ensure_order_by("project = \"ABC\"", "created DESC"),
            "project = \"ABC\" ORDER BY created DESC"
        );
        assert_eq!(
            ensure_order_by("project = \"ABC\" order by key", "created DESC"),
            "project = \"ABC\" order by key"
        );
        assert_eq!(ensure_order_by("", "created DESC"), "ORDER BY created DESC");
    }

    #[test]
    fn test_project_from() {
        assert_eq!(
            project_from("project = \"Desktop Client\" ORDER BY created DESC").as_deref(),
            Some("Desktop Client")
        );
        assert_eq!(project_from("status = Open"), None);
    }

    #[test]
    fn test_time_frame() {
        assert_eq!(TimeFrame::detect("mttr this Month"), Some(TimeFrame::ThisMonth));
        assert_eq!(TimeFrame::detect("mttr"), None);
        assert_eq!(TimeFrame::ThisWeek.clause(), "created >= startOfWeek()");
    }
}

//! Text heuristics for query intent recognition.
//!
//! Every classifier here is a pure, total function over the query text (and,
//! for follow-up detection, the conversation history). Malformed input
//! falls through to the "no match" branch.
//!
//! # Rule tables
//!
//! Keyword classifiers are expressed as [`RuleTable`]s: a list of
//! `(matcher, weight)` entries plus a firing threshold. A table fires when
//! the cumulative weight of matching rules reaches the threshold. Most
//! tables use weight `1.0` with threshold `1.0` (any single rule fires);
//! [`is_ai_summary_language_query`] uses fractional weights so that two
//! weak terms, or one strong pair, are required.
//!
//! | Table | Fires for |
//! |-------|-----------|
//! | [`JIRA_STRUCTURED`] | ticket ids, lookup phrases, JQL fragments, analytics keywords |
//! | [`CONFLUENCE_STRUCTURED`] | page ids, page lookup phrases, space keys |
//! | [`SHARED_STRUCTURED`] | metadata filters valid on both systems |
//! | [`INTERPRETIVE`] | explanation / summarisation requests |
//! | [`AI_SUMMARY_LANGUAGE`] | routing: AI summaries in the wrong language |
//! | [`AI_SUMMARY_LANGUAGE_REPORT`] | analytics: the same topic, stricter pairs |

use std::collections::BTreeSet;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::models::{last_assistant_message, ChatRole, ChatTurn, OriginalQueryContext, TargetSystem};

/// Compile a built-in pattern. All patterns are string literals exercised by tests.
pub(crate) fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).expect("built-in pattern must compile")
}

// ═══════════════════════════════════════════════════════════════════════
// Rule tables
// ═══════════════════════════════════════════════════════════════════════

/// How a [`Rule`] recognises text. Matching is done on lowercased input.
pub enum Matcher {
    /// The phrase occurs as a substring.
    Phrase(&'static str),
    /// Every phrase occurs as a substring.
    AllOf(&'static [&'static str]),
    /// The regular expression matches.
    Pattern(Regex),
}

impl Matcher {
    fn is_match(&self, lowered: &str) -> bool {
        match self {
            Matcher::Phrase(p) => lowered.contains(p),
            Matcher::AllOf(ps) => ps.iter().all(|p| lowered.contains(p)),
            Matcher::Pattern(re) => re.is_match(lowered),
        }
    }
}

/// A named, weighted heuristic.
pub struct Rule {
    pub name: &'static str,
    pub matcher: Matcher,
    pub weight: f64,
}

impl Rule {
    pub fn phrase(name: &'static str, phrase: &'static str) -> Self {
        Self {
            name,
            matcher: Matcher::Phrase(phrase),
            weight: 1.0,
        }
    }

    pub fn all_of(name: &'static str, phrases: &'static [&'static str]) -> Self {
        Self {
            name,
            matcher: Matcher::AllOf(phrases),
            weight: 1.0,
        }
    }

    pub(crate) fn pattern(name: &'static str, pattern: &str) -> Self {
        Self {
            name,
            matcher: Matcher::Pattern(compile(pattern)),
            weight: 1.0,
        }
    }

    pub fn weighted(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }
}

/// A declarative classifier: fires when the summed weight of matching
/// rules reaches `threshold`.
pub struct RuleTable {
    pub name: &'static str,
    pub threshold: f64,
    rules: Vec<Rule>,
}

impl RuleTable {
    pub fn new(name: &'static str, threshold: f64, rules: Vec<Rule>) -> Self {
        Self {
            name,
            threshold,
            rules,
        }
    }

    /// Cumulative weight of the rules matching `text`.
    pub fn score(&self, text: &str) -> f64 {
        let lowered = text.to_lowercase();
        self.rules
            .iter()
            .filter(|r| r.matcher.is_match(&lowered))
            .map(|r| r.weight)
            .sum()
    }

    /// Names of the rules matching `text`, in table order.
    pub fn matched(&self, text: &str) -> Vec<&'static str> {
        let lowered = text.to_lowercase();
        self.rules
            .iter()
            .filter(|r| r.matcher.is_match(&lowered))
            .map(|r| r.name)
            .collect()
    }

    pub fn fires(&self, text: &str) -> bool {
        self.score(text) >= self.threshold
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Structural Jira signals that favour the direct API.
pub static JIRA_STRUCTURED: Lazy<RuleTable> = Lazy::new(|| {
    RuleTable::new(
        "jira_structured",
        1.0,
        vec![
            Rule::pattern("ticket_id", r"[a-z]+-\d+"),
            Rule::phrase("find_ticket", "find ticket"),
            Rule::phrase("search_ticket", "search for ticket"),
            Rule::phrase("get_ticket", "get ticket"),
            Rule::phrase("find_issue", "find issue"),
            Rule::phrase("search_issue", "search for issue"),
            Rule::phrase("look_up_ticket", "look up ticket"),
            Rule::phrase("show_ticket", "show me ticket"),
            Rule::phrase("search_jira", "search jira"),
            Rule::phrase("created_after", "created after"),
            Rule::phrase("updated_after", "updated after"),
            Rule::phrase("created_before", "created before"),
            Rule::phrase("updated_before", "updated before"),
            Rule::phrase("created_by", "created by"),
            Rule::phrase("assigned_to", "assigned to"),
            Rule::phrase("priority_eq", "priority ="),
            Rule::phrase("status_eq", "status ="),
            Rule::all_of("project_eq", &["project", "="]),
            Rule::phrase("comments_on", "comments on"),
            Rule::phrase("attachments_for", "attachments for"),
            Rule::phrase("files_attached", "files attached to"),
            Rule::pattern("analytics_mttr", MTTR_PATTERN),
            Rule::pattern("analytics_top_n", TOP_N_PATTERN),
            Rule::pattern("analytics_bug_list", BUG_LIST_PATTERN),
            Rule::pattern("analytics_chart", CHART_PATTERN),
            Rule::pattern("analytics_sentiment", SENTIMENT_PATTERN),
        ],
    )
});

/// Structural Confluence signals that favour the direct API.
pub static CONFLUENCE_STRUCTURED: Lazy<RuleTable> = Lazy::new(|| {
    RuleTable::new(
        "confluence_structured",
        1.0,
        vec![
            Rule::pattern("page_id", r"page id:?\s*\d+"),
            Rule::phrase("find_page", "find confluence page"),
            Rule::phrase("get_page", "get confluence page"),
            Rule::phrase("search_confluence_for", "search confluence for"),
            Rule::phrase("search_confluence", "search confluence"),
            Rule::phrase("latest_version", "latest version of page"),
            Rule::phrase("recently_updated", "recently updated pages"),
            Rule::all_of("space_key", &["space", "key"]),
            Rule::phrase("pages_in_space", "pages in space"),
        ],
    )
});

/// Metadata filters that either direct API handles well.
pub static SHARED_STRUCTURED: Lazy<RuleTable> = Lazy::new(|| {
    RuleTable::new(
        "shared_structured",
        1.0,
        vec![
            Rule::phrase("created_in_last", "created in the last"),
            Rule::phrase("updated_in_last", "updated in the last"),
            Rule::phrase("modified_since", "modified since"),
            Rule::phrase("created_since", "created since"),
            Rule::phrase("list_all", "list all"),
        ],
    )
});

/// Requests for interpretation, best served by an LLM agent.
pub static INTERPRETIVE: Lazy<RuleTable> = Lazy::new(|| {
    RuleTable::new(
        "interpretive",
        1.0,
        vec![
            Rule::phrase("summarize", "summarize"),
            Rule::phrase("explain", "explain"),
            Rule::phrase("status_of", "what is the status of"),
            Rule::phrase("tell_me_about", "tell me about"),
            Rule::phrase("why_is", "why is"),
            Rule::phrase("provide_context", "provide context"),
            Rule::phrase("help_understand", "help me understand"),
        ],
    )
});

/// Two weak terms (0.5 each) or one strong pair (1.0) are required.
pub static AI_SUMMARY_LANGUAGE: Lazy<RuleTable> = Lazy::new(|| {
    RuleTable::new(
        "ai_summary_language",
        1.0,
        vec![
            Rule::phrase("ai_summary", "ai summary").weighted(0.5),
            Rule::phrase("meeting_summary", "meeting summary").weighted(0.5),
            Rule::phrase("incorrect_language", "incorrect language").weighted(0.5),
            Rule::phrase("wrong_language", "wrong language").weighted(0.5),
            Rule::phrase("language_spoken", "language spoken").weighted(0.5),
            Rule::phrase("language_issue", "language issue").weighted(0.5),
            Rule::phrase("transcription", "transcription").weighted(0.5),
            Rule::phrase("transcript", "transcript").weighted(0.5),
            Rule::all_of("ai_summary_and_language", &["ai summary", "language"]),
            Rule::all_of("meeting_and_language", &["meeting", "language"]),
            Rule::all_of("transcript_and_language", &["transcript", "language"]),
        ],
    )
});

/// The analytics classifier's variant of [`AI_SUMMARY_LANGUAGE`]. More
/// terms count, but the meeting and transcript pairs also need "incorrect"
/// and "wrong" respectively.
pub static AI_SUMMARY_LANGUAGE_REPORT: Lazy<RuleTable> = Lazy::new(|| {
    RuleTable::new(
        "ai_summary_language_report",
        1.0,
        vec![
            Rule::phrase("ai_summary", "ai summary").weighted(0.5),
            Rule::phrase("meeting_summary", "meeting summary").weighted(0.5),
            Rule::phrase("incorrect_language", "incorrect language").weighted(0.5),
            Rule::phrase("wrong_language", "wrong language").weighted(0.5),
            Rule::phrase("language_spoken", "language spoken").weighted(0.5),
            Rule::phrase("spoken_language", "spoken language").weighted(0.5),
            Rule::phrase("transcription_language", "transcription language").weighted(0.5),
            Rule::phrase("language_detection", "language detection").weighted(0.5),
            Rule::phrase("language_issue", "language issue").weighted(0.5),
            Rule::phrase("translation", "translation").weighted(0.5),
            Rule::phrase("transcript", "transcript").weighted(0.5),
            Rule::all_of("ai_summary_and_language", &["ai summary", "language"]),
            Rule::all_of("meeting_language_incorrect", &["meeting", "language", "incorrect"]),
            Rule::all_of("transcript_language_wrong", &["transcript", "language", "wrong"]),
        ],
    )
});

// ═══════════════════════════════════════════════════════════════════════
// Analytics keywords
// ═══════════════════════════════════════════════════════════════════════

const MTTR_PATTERN: &str =
    r"\bmttr\b|mean time to (resolution|resolve|respond)|average resolution time";
const TOP_N_PATTERN: &str = r"\b(top|most)\b.*\b(issues?|tickets?)\b";
const BUG_LIST_PATTERN: &str = r"\bbugs?\b.*\b(list|reported|related)\b|\breported bugs?\b";
const CHART_PATTERN: &str = r"\b(chart|pie|bar|table|graph|visuali[sz]e)\b";
const SENTIMENT_PATTERN: &str = r"\b(sentiment|feeling|emotion|tone)\b";

/// Families of analytics keywords a query can contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AnalyticsKeyword {
    Mttr,
    TopN,
    BugList,
    Chart,
    Sentiment,
}

static ANALYTICS_KEYWORDS: Lazy<Vec<(AnalyticsKeyword, Regex)>> = Lazy::new(|| {
    vec![
        (AnalyticsKeyword::Mttr, compile(MTTR_PATTERN)),
        (AnalyticsKeyword::TopN, compile(TOP_N_PATTERN)),
        (AnalyticsKeyword::BugList, compile(BUG_LIST_PATTERN)),
        (AnalyticsKeyword::Chart, compile(CHART_PATTERN)),
        (AnalyticsKeyword::Sentiment, compile(SENTIMENT_PATTERN)),
    ]
});

/// The set of analytics keyword families present in `text`.
pub fn classify_analytics_keywords(text: &str) -> BTreeSet<AnalyticsKeyword> {
    let lowered = text.to_lowercase();
    ANALYTICS_KEYWORDS
        .iter()
        .filter(|(_, re)| re.is_match(&lowered))
        .map(|(k, _)| *k)
        .collect()
}

pub fn has_analytics_keywords(text: &str) -> bool {
    !classify_analytics_keywords(text).is_empty()
}

// ═══════════════════════════════════════════════════════════════════════
// Ticket ids
// ═══════════════════════════════════════════════════════════════════════

static TICKET_ID: Lazy<Regex> = Lazy::new(|| compile(r"[A-Za-z]+-\d+"));
static TICKET_KEY: Lazy<Regex> = Lazy::new(|| compile(r"\b[A-Z][A-Z0-9]*-\d+\b"));

/// True if `text` contains something shaped like a ticket id (`ABC-123`),
/// in any case.
pub fn has_ticket_id(text: &str) -> bool {
    TICKET_ID.is_match(text)
}

/// Upper-case issue keys in `text`, in order of appearance, deduplicated.
pub fn extract_ticket_keys(text: &str) -> Vec<String> {
    let mut keys: Vec<String> = Vec::new();
    for m in TICKET_KEY.find_iter(text) {
        let key = m.as_str().to_string();
        if !keys.contains(&key) {
            keys.push(key);
        }
    }
    keys
}

// ═══════════════════════════════════════════════════════════════════════
// Target system
// ═══════════════════════════════════════════════════════════════════════

/// Classify the knowledge system a request names. Each text is scanned;
/// Jira keywords win over Confluence keywords.
pub fn detect_target_system(texts: &[&str]) -> TargetSystem {
    let lowered: Vec<String> = texts.iter().map(|t| t.to_lowercase()).collect();
    if lowered
        .iter()
        .any(|t| t.contains("jira") || t.contains("zsee"))
    {
        TargetSystem::Jira
    } else if lowered
        .iter()
        .any(|t| t.contains("confluence") || t.contains("wiki") || t.contains("document"))
    {
        TargetSystem::Confluence
    } else {
        TargetSystem::Default
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Clarification follow-ups
// ═══════════════════════════════════════════════════════════════════════

/// Questions the assistant asks when an analytic is missing its subject.
pub const CLARIFICATION_PHRASES: &[&str] = &[
    "which issue area",
    "which project",
    "which jira ticket",
    "which specific jira ticket",
    "which client would you",
    "which release or version",
    "which user would you",
];

/// True if `message` is one of the assistant's clarification questions.
pub fn is_clarification_prompt(message: &str) -> bool {
    let lowered = message.to_lowercase();
    CLARIFICATION_PHRASES.iter().any(|p| lowered.contains(p))
}

/// True if `query` reads like a bare answer: under 30 characters, or at
/// most three words of letters, digits, and spaces.
pub fn is_short_reply(query: &str) -> bool {
    let trimmed = query.trim();
    if trimmed.is_empty() {
        return false;
    }
    if trimmed.chars().count() < 30 {
        return true;
    }
    trimmed.split_whitespace().count() <= 3
        && trimmed
            .chars()
            .all(|c| c.is_alphanumeric() || c.is_whitespace())
}

/// True if the last assistant turn asked a clarification question and
/// `query` looks like the answer to it.
pub fn is_clarification_follow_up(query: &str, history: &[ChatTurn]) -> bool {
    match last_assistant_message(history) {
        Some(message) => is_clarification_prompt(message) && is_short_reply(query),
        None => false,
    }
}

/// Restore the context stored in the most recent `_metadata` turn.
///
/// Accepts both `{"metadata": {"originalQuery": ...}}` and the flat
/// `{"originalQuery": ...}` form. Returns `None` when there is no metadata
/// turn or it cannot be decoded.
pub fn extract_original_query_from_metadata(history: &[ChatTurn]) -> Option<OriginalQueryContext> {
    let turn = history.iter().rev().find(|t| t.role == ChatRole::Metadata)?;
    let value: Value = serde_json::from_str(&turn.content).ok()?;
    let inner = match value.get("metadata") {
        Some(m) if m.is_object() => m.clone(),
        _ => value,
    };
    let ctx: OriginalQueryContext = serde_json::from_value(inner).ok()?;
    if ctx.original_query.trim().is_empty() {
        None
    } else {
        Some(ctx)
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Domain-specific classifiers
// ═══════════════════════════════════════════════════════════════════════

/// Queries about AI-generated meeting summaries in the wrong language.
pub fn is_ai_summary_language_query(text: &str) -> bool {
    AI_SUMMARY_LANGUAGE.fires(text)
}

/// Stricter form used when classifying analytics intents.
pub fn is_ai_summary_language_report(text: &str) -> bool {
    AI_SUMMARY_LANGUAGE_REPORT.fires(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_has_ticket_id() {
        assert!(has_ticket_id("summary of JIRA-123"));
        assert!(has_ticket_id("look at abc-9 please"));
        assert!(!has_ticket_id("explain the login issue"));
        assert!(!has_ticket_id(""));
    }

    #[test]
    fn test_extract_ticket_keys_is_case_sensitive_and_deduplicated() {
        assert_eq!(
            extract_ticket_keys("compare ZSEE-1, ZSEE-22 and ZSEE-1 (not abc-3)"),
            vec!["ZSEE-1", "ZSEE-22"]
        );
    }

    #[test]
    fn test_analytics_keywords() {
        let k = classify_analytics_keywords("What's the MTTR for project ABC this month");
        assert!(k.contains(&AnalyticsKeyword::Mttr));
        let k = classify_analytics_keywords("top 5 issues by assignee");
        assert_eq!(k.into_iter().collect::<Vec<_>>(), vec![AnalyticsKeyword::TopN]);
        assert!(classify_analytics_keywords("list of bugs reported in 5.17")
            .contains(&AnalyticsKeyword::BugList));
        assert!(classify_analytics_keywords("pie chart of status")
            .contains(&AnalyticsKeyword::Chart));
        assert!(classify_analytics_keywords("customer sentiment on ABC-1")
            .contains(&AnalyticsKeyword::Sentiment));
        assert!(classify_analytics_keywords("explain the login issue").is_empty());
        // "stone" must not trigger the sentiment family
        assert!(!has_analytics_keywords("milestone stone"));
    }

    #[test]
    fn test_detect_target_system() {
        assert_eq!(detect_target_system(&["summary of JIRA-123"]), TargetSystem::Jira);
        assert_eq!(detect_target_system(&["x", "zsee backlog"]), TargetSystem::Jira);
        assert_eq!(
            detect_target_system(&["onboarding wiki page"]),
            TargetSystem::Confluence
        );
        assert_eq!(
            detect_target_system(&["find the design document"]),
            TargetSystem::Confluence
        );
        assert_eq!(detect_target_system(&["hello"]), TargetSystem::Default);
        assert_eq!(
            detect_target_system(&["jira tickets linked from confluence"]),
            TargetSystem::Jira
        );
    }

    #[test]
    fn test_clarification_follow_up() {
        let history = vec![
            ChatTurn::user("top 5 issues in this issue area"),
            ChatTurn::assistant("Which Issue Area would you like?"),
        ];
        assert!(is_clarification_follow_up("Audio", &history));
        assert!(is_clarification_follow_up(
            "Audio",
            &[ChatTurn::assistant("Which Issue Area would you like?")]
        ));
        assert!(!is_clarification_follow_up("Audio", &[]));
        assert!(!is_clarification_follow_up(
            "Audio",
            &[ChatTurn::assistant("Here are your results.")]
        ));
        assert!(!is_clarification_follow_up(
            "can you tell me more about how the scheduler handles retries?",
            &history
        ));
    }

    #[test]
    fn test_short_reply_rules() {
        assert!(is_short_reply("Desktop Client"));
        assert!(is_short_reply("the big long project name"));
        assert!(!is_short_reply(""));
        assert!(!is_short_reply(
            "please check the desktop client area for me, thanks!"
        ));
    }

    #[test]
    fn test_extract_original_query_from_metadata() {
        let history = vec![
            ChatTurn::user("top issues in this project"),
            ChatTurn::metadata(
                r#"{"metadata":{"originalQuery":"top issues in this project","missingInfo":"issue_area","intentType":"TOP_N_ISSUES"}}"#,
            ),
            ChatTurn::assistant("Which Issue Area or Project would you like to check for top issues?"),
        ];
        let ctx = extract_original_query_from_metadata(&history).unwrap();
        assert_eq!(ctx.original_query, "top issues in this project");
        assert_eq!(ctx.missing_info, Some(crate::models::MissingInfo::IssueArea));
        assert_eq!(ctx.intent_type.as_deref(), Some("TOP_N_ISSUES"));

        let flat = vec![ChatTurn::metadata(r#"{"originalQuery":"mttr for this user"}"#)];
        assert_eq!(
            extract_original_query_from_metadata(&flat).unwrap().original_query,
            "mttr for this user"
        );
    }

    #[test]
    fn test_extract_original_query_never_panics_on_garbage() {
        assert!(extract_original_query_from_metadata(&[]).is_none());
        assert!(extract_original_query_from_metadata(&[ChatTurn::metadata("not json")]).is_none());
        assert!(extract_original_query_from_metadata(&[ChatTurn::metadata("[1,2]")]).is_none());
        assert!(
            extract_original_query_from_metadata(&[ChatTurn::metadata(r#"{"originalQuery":""}"#)])
                .is_none()
        );
    }

    #[test]
    fn test_ai_summary_language_query() {
        assert!(is_ai_summary_language_query(
            "AI summary is in the wrong language"
        ));
        assert!(is_ai_summary_language_query(
            "meeting notes came out in another language"
        ));
        assert!(is_ai_summary_language_query("transcription problems"));
        assert!(!is_ai_summary_language_query("ai summary missing"));
        assert!(!is_ai_summary_language_query("language settings"));
    }

    #[test]
    fn test_ai_summary_language_report_is_stricter() {
        assert!(!is_ai_summary_language_report(
            "meeting notes came out in another language"
        ));
        assert!(is_ai_summary_language_report(
            "meeting summary language is incorrect"
        ));
        assert!(is_ai_summary_language_report("AI summary is in the wrong language"));
        assert!(is_ai_summary_language_report("translation of the transcript"));
        assert!(is_ai_summary_language_report("spoken language detection"));
        assert!(!is_ai_summary_language_report("transcript language"));
        assert!(is_ai_summary_language_report("transcript in the wrong language"));
    }

    #[test]
    fn test_builtin_tables_build() {
        for table in [
            &*JIRA_STRUCTURED,
            &*CONFLUENCE_STRUCTURED,
            &*SHARED_STRUCTURED,
            &*INTERPRETIVE,
            &*AI_SUMMARY_LANGUAGE,
            &*AI_SUMMARY_LANGUAGE_REPORT,
        ] {
            assert!(!table.is_empty(), "{} has no rules", table.name);
            assert_eq!(table.score(""), 0.0);
        }
        assert!(classify_analytics_keywords("").is_empty());
    }

    #[test]
    fn test_rule_table_scoring() {
        assert_eq!(AI_SUMMARY_LANGUAGE.score("ai summary"), 0.5);
        assert_eq!(
            AI_SUMMARY_LANGUAGE.matched("ai summary in the wrong language"),
            vec!["ai_summary", "wrong_language", "ai_summary_and_language"]
        );
        assert!(JIRA_STRUCTURED.fires("tickets assigned to bob"));
        assert!(JIRA_STRUCTURED.fires("project = ABC"));
        assert!(!JIRA_STRUCTURED.fires("explain the login issue"));
        assert!(CONFLUENCE_STRUCTURED.fires("get page id: 12345"));
        assert!(SHARED_STRUCTURED.fires("list all pages"));
        assert!(INTERPRETIVE.fires("Explain the login issue"));
        assert!(!INTERPRETIVE.is_empty());
    }
}

//! Direct-API-first vs. agent-first routing.
//!
//! [`decide`] picks which source a Jira or Confluence request tries first.
//! The precedence is fixed:
//!
//! 1. A reply to a clarification question goes to the direct API.
//! 2. Structural signals for the target system (ticket ids, "search jira",
//!    JQL fragments, analytics keywords, page ids) go to the direct API.
//! 3. Interpretive phrasing ("summarize", "explain", "why is") goes to the
//!    agent.
//! 4. Everything else goes to the agent.
//!
//! Each signal family is a weighted [`RuleTable`]; a family fires when its
//! cumulative weight reaches the table threshold.

use tracing::debug;

use crate::heuristics::{
    extract_original_query_from_metadata, has_analytics_keywords, is_clarification_follow_up,
    RuleTable, AI_SUMMARY_LANGUAGE, CONFLUENCE_STRUCTURED, INTERPRETIVE, JIRA_STRUCTURED,
    SHARED_STRUCTURED,
};
use crate::models::{ChatTurn, RoutingDecision, TargetSystem};

/// Which precedence step produced a routing decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutingRule {
    ClarificationFollowUp,
    Structured,
    Interpretive,
    Default,
}

impl RoutingRule {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoutingRule::ClarificationFollowUp => "clarification_follow_up",
            RoutingRule::Structured => "structured",
            RoutingRule::Interpretive => "interpretive",
            RoutingRule::Default => "default",
        }
    }
}

/// A routing decision with the rule and signal names that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct RoutingOutcome {
    pub decision: RoutingDecision,
    pub rule: RoutingRule,
    /// Names of the rules that matched, for diagnostics.
    pub signals: Vec<&'static str>,
}

fn structured_tables(target: TargetSystem) -> Vec<&'static RuleTable> {
    match target {
        TargetSystem::Jira => vec![&*JIRA_STRUCTURED, &*SHARED_STRUCTURED, &*AI_SUMMARY_LANGUAGE],
        TargetSystem::Confluence => vec![&*CONFLUENCE_STRUCTURED, &*SHARED_STRUCTURED],
        TargetSystem::Default => vec![
            &*JIRA_STRUCTURED,
            &*CONFLUENCE_STRUCTURED,
            &*SHARED_STRUCTURED,
        ],
    }
}

/// Decide which source to try first for `query` against `target`.
pub fn decide(query: &str, target: TargetSystem, history: &[ChatTurn]) -> RoutingDecision {
    decide_with_reason(query, target, history).decision
}

/// Like [`decide`], also reporting which rule fired.
pub fn decide_with_reason(query: &str, target: TargetSystem, history: &[ChatTurn]) -> RoutingOutcome {
    if is_clarification_follow_up(query, history) {
        let mut signals = vec!["clarification_prompt"];
        if let Some(ctx) = extract_original_query_from_metadata(history) {
            if has_analytics_keywords(&ctx.original_query) {
                signals.push("analytics_original_query");
            }
        }
        debug!(query, ?signals, "clarification reply routed to direct API");
        return RoutingOutcome {
            decision: RoutingDecision::DirectApiFirst,
            rule: RoutingRule::ClarificationFollowUp,
            signals,
        };
    }

    let structured: Vec<&'static str> = structured_tables(target)
        .into_iter()
        .filter(|table| table.fires(query))
        .flat_map(|table| table.matched(query))
        .collect();
    if !structured.is_empty() {
        debug!(query, %target, signals = ?structured, "structured query routed to direct API");
        return RoutingOutcome {
            decision: RoutingDecision::DirectApiFirst,
            rule: RoutingRule::Structured,
            signals: structured,
        };
    }

    if INTERPRETIVE.fires(query) {
        return RoutingOutcome {
            decision: RoutingDecision::AiStudioFirst,
            rule: RoutingRule::Interpretive,
            signals: INTERPRETIVE.matched(query),
        };
    }

    RoutingOutcome {
        decision: RoutingDecision::AiStudioFirst,
        rule: RoutingRule::Default,
        signals: Vec::new(),
    }
}

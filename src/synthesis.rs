//! Answer synthesis.
//!
//! Turns the ordered context list of one request into a Markdown answer.
//!
//! ```text
//! contexts ──▶ ready answer > 100 chars? ──yes──▶ returned verbatim
//!                     │ no
//!                     ▼
//!              any substantive item? ──no──▶ "insufficient information"
//!                     │ yes
//!                     ▼
//!        [Source N] blocks + hint templates ──▶ SynthesisLlmClient
//!                     │ error / empty
//!                     ▼
//!               raw findings list
//! ```
//!
//! The model never sees an empty context list, and a synthesis failure
//! never fails the request.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn};

use knowledge_router_core::models::{ContextItem, PresentationHint, RoutingDecision};

use crate::config::SynthesisConfig;
use crate::traits::{CompletionOptions, SynthesisLlmClient};

/// A ready-made answer longer than this is returned without synthesis.
pub const READY_ANSWER_MIN_CHARS: usize = 100;
/// Items with less text than this (and no analytics payload) do not count
/// as content.
pub const SUBSTANTIVE_MIN_CHARS: usize = 50;

const RAW_DATA_MAX_CHARS: usize = 6000;
const FALLBACK_ITEM_MAX_CHARS: usize = 600;

/// Per-request facts the prompt may mention.
#[derive(Debug, Clone, Default)]
pub struct SynthesisMeta {
    pub routing_decision: Option<RoutingDecision>,
    pub analysis_output: Option<Value>,
    pub log_analysis_result: Option<Value>,
}

pub struct AnswerSynthesizer {
    client: Arc<dyn SynthesisLlmClient>,
    options: CompletionOptions,
    max_words: usize,
}

impl AnswerSynthesizer {
    pub fn new(client: Arc<dyn SynthesisLlmClient>, config: &SynthesisConfig) -> Self {
        Self {
            client,
            options: CompletionOptions {
                temperature: config.temperature,
                max_tokens: config.max_tokens,
                json: false,
                model: None,
            },
            max_words: config.max_words,
        }
    }

    pub async fn synthesize(&self, query: &str, contexts: &[ContextItem], meta: &SynthesisMeta) -> String {
        if let Some(answer) = ready_answer(contexts) {
            info!(chars = answer.len(), "returning ready answer without synthesis");
            return answer.to_string();
        }

        if !contexts.iter().any(is_substantive) {
            warn!(items = contexts.len(), "no substantive context, skipping synthesis");
            return insufficient_information(query);
        }

        let system = system_prompt(query, contexts, self.max_words);
        let user = user_prompt(query, contexts, meta, self.max_words);
        debug!(items = contexts.len(), prompt_chars = user.len(), "calling synthesis model");

        match self.client.complete(&system, &user, &self.options).await {
            Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
            Ok(_) => {
                warn!("synthesis model returned an empty answer");
                fallback_answer(query, contexts)
            }
            Err(e) => {
                warn!(error = %e, "synthesis failed, listing raw findings");
                fallback_answer(query, contexts)
            }
        }
    }
}

/// The fixed answer used when nothing was retrieved.
pub fn insufficient_information(query: &str) -> String {
    format!(
        "I'm sorry, but I don't have sufficient information to answer about \"{}\". \
         The retrieved data didn't contain specific details about this topic.",
        query
    )
}

fn ready_answer(contexts: &[ContextItem]) -> Option<&str> {
    contexts
        .iter()
        .filter_map(ContextItem::ready_answer)
        .find(|answer| answer.chars().count() > READY_ANSWER_MIN_CHARS)
}

fn is_substantive(item: &ContextItem) -> bool {
    if item.is_error() || matches!(item, ContextItem::Notice { .. }) {
        return false;
    }
    matches!(item, ContextItem::Analytics { .. }) || item.text().chars().count() > SUBSTANTIVE_MIN_CHARS
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars).collect();
    format!("{}...", cut)
}

// ============ Prompt ============

const TICKET_SUMMARY_TEMPLATE: &str = "\
Ticket: <key>
Summary: <summary>
Priority: <priority>
Status: <status>
Assignee: <assignee>

### Issue Overview
<what happened and since when, from the description>

### Key Activities & Findings
<bullets drawn from the comments>

### Blockers
<anything waiting on another team, or \"None recorded\">

### Next Steps
<bullets>

### Linked Issues
<key (summary) per linked issue>

### Notes for Management
<impact and urgency in two or three bullets>";

const METRIC_TEMPLATE: &str = "\
## <metric> for <scope>

**<headline value>**

### Details
- <what was analyzed: issue count, project, time frame>
- <the supporting numbers>

### Observations
- <two or three short data-driven observations>";

const LIST_TEMPLATE: &str = "\
## <title>

1. **<KEY>: \"<summary>\"**
   * Status: <status>
   * Assignee: <assignee>

### Summary
- <counts and patterns across the list>";

const SENTIMENT_TEMPLATE: &str = "\
## Sentiment Analysis for <key>

Overall Sentiment: <label> (<score>)
Analysis Based On: <content analyzed>

### Key Sentiment Indicators
- Positive terms: <count>
- Negative terms: <count>

### Comment Sentiment Trend
- <how sentiment moves across comments>

### Summary Analysis
<two or three sentences>";

const CHART_TEMPLATE: &str = "\
## <distribution> for <scope>

### Chart Data Summary
- **Total issues analyzed: <n>**
- <label>: <value> (<percent>)

### Key Insights
- <two or three observations>";

fn template_for(hint: PresentationHint) -> (&'static str, &'static str) {
    match hint {
        PresentationHint::TicketSummary => (
            "a ticket summary; you MUST use this manager-friendly layout with every field filled from the data",
            TICKET_SUMMARY_TEMPLATE,
        ),
        PresentationHint::MttrResult => ("an MTTR result; lead with the MTTR value", METRIC_TEMPLATE),
        PresentationHint::TopNList => (
            "a top-N aggregation; present it as a numbered list in the given order",
            LIST_TEMPLATE,
        ),
        PresentationHint::BugListResult | PresentationHint::ListResult => (
            "a list of issues; list each key with its status",
            LIST_TEMPLATE,
        ),
        PresentationHint::SentimentAnalysis => ("a sentiment analysis", SENTIMENT_TEMPLATE),
        PresentationHint::PieChart | PresentationHint::BarChart | PresentationHint::Table => (
            "chart or table data; summarize what the chart or table would show",
            CHART_TEMPLATE,
        ),
    }
}

fn system_prompt(query: &str, contexts: &[ContextItem], max_words: usize) -> String {
    let mut prompt = format!(
        "You are a helpful assistant that synthesizes information from multiple sources to answer \
         a user's query. Answer in Markdown, concise and manager-friendly, under {max_words} words.

Instructions:
1. Answer the user's query: \"{query}\".
2. Use only the numbered [Source N] blocks. Pay attention to their Presentation hint, \
Context info and Raw data sections.
3. Combine information from all relevant sources.
4. If sources conflict, say so and present both.
5. If the sources are insufficient to answer fully, say so.
6. Structure the answer with headings, lists and bold text.
7. Cite the sources you use as [Source N].
8. Do not invent information that is not in the sources.
9. When a source contains a complete answer from an agent, prefer formatting that answer \
over writing a new one.
10. Always include Jira ticket keys together with their status and assignee when the sources name them.
"
    );

    let mut hints: Vec<PresentationHint> = Vec::new();
    for hint in contexts.iter().filter_map(ContextItem::presentation_hint) {
        if !hints.contains(&hint) {
            hints.push(hint);
        }
    }
    for hint in hints {
        let (what, template) = template_for(hint);
        prompt.push_str(&format!(
            "\nA source with presentation hint `{}` carries {}:\n{}\n",
            hint, what, template
        ));
    }
    prompt
}

fn render_source(index: usize, item: &ContextItem) -> String {
    let mut block = format!("[Source {}]\n", index + 1);
    if let Some(title) = item.title() {
        block.push_str(&format!("Title: {}\n", title));
    }
    if !item.text().is_empty() {
        block.push_str(&format!("Content: {}\n", item.text()));
    }
    block.push_str(&format!("Source: {}\n", item.source()));
    if let Some(url) = item.url() {
        block.push_str(&format!("URL: {}\n", url));
    }
    if item.is_error() {
        block.push_str("Error: true\n");
    }
    if let Some(hint) = item.presentation_hint() {
        block.push_str(&format!("Presentation hint: {}\n", hint));
    }
    if let Some(info) = item.context_info() {
        block.push_str(&format!("Context info: {}\n", info));
    }
    if let Some(raw) = item.raw_data() {
        let pretty = serde_json::to_string_pretty(raw).unwrap_or_default();
        block.push_str(&format!("Raw data:\n{}\n", truncate(&pretty, RAW_DATA_MAX_CHARS)));
    }
    if let ContextItem::AgentAnswer { sources, .. } = item {
        for citation in sources {
            let title = citation.title.as_deref().unwrap_or("untitled");
            match citation.url.as_deref() {
                Some(url) => block.push_str(&format!("Cites: {} ({})\n", title, url)),
                None => block.push_str(&format!("Cites: {}\n", title)),
            }
        }
    }
    block
}

fn user_prompt(query: &str, contexts: &[ContextItem], meta: &SynthesisMeta, max_words: usize) -> String {
    let blocks: Vec<String> = contexts
        .iter()
        .enumerate()
        .map(|(i, item)| render_source(i, item))
        .collect();

    let mut prompt = format!("Original Query: {}\n\nSources:\n{}", query, blocks.join("\n"));

    if let Some(decision) = meta.routing_decision {
        prompt.push_str(&format!("\nRouting: {}\n", decision));
    }
    if let Some(tracking) = meta
        .log_analysis_result
        .as_ref()
        .and_then(|r| r.get("trackingId"))
        .and_then(Value::as_str)
    {
        prompt.push_str(&format!("Log tracking id: {}\n", tracking));
    }
    if let Some(question) = meta
        .analysis_output
        .as_ref()
        .and_then(|a| a.get("completeQuestion"))
        .and_then(Value::as_str)
    {
        prompt.push_str(&format!("Interpreted question: {}\n", question));
    }

    prompt.push_str(&format!(
        "\nBased only on these sources, write a synthesized Markdown answer under {} words.",
        max_words
    ));
    prompt
}

// ============ Fallback ============

/// Deterministic answer listing what was retrieved.
pub fn fallback_answer(query: &str, contexts: &[ContextItem]) -> String {
    let findings: Vec<String> = contexts
        .iter()
        .filter(|item| !item.is_error() && !item.text().trim().is_empty())
        .enumerate()
        .map(|(i, item)| {
            let title = item.title().unwrap_or(item.source());
            let mut line = format!("{}. **{}**: {}", i + 1, title, truncate(item.text().trim(), FALLBACK_ITEM_MAX_CHARS));
            if let Some(url) = item.url() {
                line.push_str(&format!(" ({})", url));
            }
            line
        })
        .collect();

    if findings.is_empty() {
        return insufficient_information(query);
    }
    format!(
        "I couldn't generate a synthesized answer for \"{}\", but here is what I found:\n\n{}",
        query,
        findings.join("\n")
    )
}

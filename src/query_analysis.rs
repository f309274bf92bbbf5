//! Query analysis: turning a user question into search strings.
//!
//! | Provider | Implementation |
//! |----------|----------------|
//! | `"stub"` | [`StubQueryAnalyzer`]: deterministic, no I/O |
//! | `"openai"` | [`LlmQueryAnalyzer`]: asks the synthesis model for JSON |
//!
//! The LLM analyzer falls back to the stub output when the model answers
//! with something that is not a usable analysis. A failed model call is an
//! error and aborts the request.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tracing::{debug, warn};

use knowledge_router_core::models::{ChatRole, ChatTurn, QueryAnalysis};

use crate::traits::{CompletionOptions, QueryAnalyzer, SynthesisLlmClient};

/// Deterministic analysis: the query itself is the only search string.
pub struct StubQueryAnalyzer;

impl StubQueryAnalyzer {
    pub fn analysis(query: &str) -> QueryAnalysis {
        QueryAnalysis {
            language: "English".to_string(),
            complete_question: query.to_string(),
            thought: "Analyze the question and search the relevant knowledge sources.".to_string(),
            auxiliary_information: vec![format!("Information needed about {}", query)],
            search_decision: "Search the knowledge sources with the original question.".to_string(),
            search_queries: vec![query.to_string()],
            related_questions: Vec::new(),
        }
        .normalized(query)
    }
}

#[async_trait]
impl QueryAnalyzer for StubQueryAnalyzer {
    async fn analyze(&self, query: &str, _history: &[ChatTurn]) -> Result<QueryAnalysis> {
        Ok(Self::analysis(query))
    }
}

const ANALYSIS_SYSTEM_PROMPT: &str = "\
You are a user question analyzer for an internal support assistant that can search \
a Jira issue tracker, a Confluence wiki and hosted expert agents.

Rewrite the user's latest question as a complete, self-contained question using the \
chat history, decide what information is needed, and produce search queries.

Respond with a single JSON object:
{
  \"language\": \"the language of the question\",
  \"complete_question\": \"the self-contained question\",
  \"thought\": \"what is needed to answer it\",
  \"auxiliary_information\": [\"facts to look up\"],
  \"search_decision\": \"how you will search\",
  \"search_queries\": [\"one to three search queries\"],
  \"related_questions\": [\"up to three follow-up questions\"]
}";

/// Model-backed analysis.
pub struct LlmQueryAnalyzer {
    client: Arc<dyn SynthesisLlmClient>,
    model: Option<String>,
}

impl LlmQueryAnalyzer {
    pub fn new(client: Arc<dyn SynthesisLlmClient>) -> Self {
        Self {
            client,
            model: None,
        }
    }

    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.model = model;
        self
    }
}

#[async_trait]
impl QueryAnalyzer for LlmQueryAnalyzer {
    async fn analyze(&self, query: &str, history: &[ChatTurn]) -> Result<QueryAnalysis> {
        let options = CompletionOptions {
            temperature: 0.2,
            max_tokens: 600,
            json: true,
            model: self.model.clone(),
        };
        let raw = self
            .client
            .complete(ANALYSIS_SYSTEM_PROMPT, &analysis_prompt(query, history), &options)
            .await
            .map_err(|e| anyhow::anyhow!("Query analysis failed: {}", e))?;

        match parse_analysis(&raw) {
            Some(analysis) => {
                debug!(queries = ?analysis.search_queries, "query analysis complete");
                Ok(analysis.normalized(query))
            }
            None => {
                warn!("query analysis returned unusable JSON, using stub analysis");
                Ok(StubQueryAnalyzer::analysis(query))
            }
        }
    }
}

fn analysis_prompt(query: &str, history: &[ChatTurn]) -> String {
    let transcript: Vec<String> = history
        .iter()
        .filter(|t| t.role != ChatRole::Metadata)
        .map(|t| {
            let role = match t.role {
                ChatRole::User => "user",
                ChatRole::Assistant => "assistant",
                _ => "system",
            };
            format!("[{}]: {}", role, t.content)
        })
        .collect();
    format!(
        "chat history:\n{}\n\ncurrent user question: {}\nYour output is:",
        transcript.join("\n"),
        query
    )
}

/// Decode the model output, tolerating Markdown code fences around it.
fn parse_analysis(raw: &str) -> Option<QueryAnalysis> {
    let trimmed = raw.trim();
    let body = match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if end > start => &trimmed[start..=end],
        _ => return None,
    };
    serde_json::from_str(body).ok()
}

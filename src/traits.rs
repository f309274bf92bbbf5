//! Collaborator traits.
//!
//! The orchestrator never talks to Jira, Confluence, agents, or an LLM
//! directly. Each external system sits behind one of the traits below so
//! that HTTP clients, disabled stand-ins, and in-memory test fakes are
//! interchangeable.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │                     Collaborators                      │
//! │ ┌──────────────┐ ┌─────────────┐ ┌──────────────────┐  │
//! │ │IssueSearch   │ │PageSearch   │ │LlmAgentClient    │  │
//! │ │(JiraClient)  │ │(Confluence) │ │(AgentClient)     │  │
//! │ └──────────────┘ └─────────────┘ └──────────────────┘  │
//! │ ┌──────────────┐ ┌─────────────┐ ┌──────────────────┐  │
//! │ │SynthesisLlm  │ │QueryAnalyzer│ │LogAnalyzer       │  │
//! │ │(OpenAI)      │ │(stub / LLM) │ │(regex)           │  │
//! │ └──────────────┘ └─────────────┘ └──────────────────┘  │
//! └───────────────────────────┬────────────────────────────┘
//!                             ▼
//!                   Orchestrator::handle_query
//! ```
//!
//! Every trait has a `Disabled*` implementation that fails with
//! [`RetrievalError::NotConfigured`]; the orchestrator treats that like
//! any other retrieval failure.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use knowledge_router_core::error::RetrievalError;
use knowledge_router_core::models::{
    AgentResult, ChatTurn, Comment, IssueRecord, PageResult, QueryAnalysis,
};

use crate::tasks::TaskRecord;

// ═══════════════════════════════════════════════════════════════════════
// Issue search
// ═══════════════════════════════════════════════════════════════════════

/// What to include when fetching a single issue.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IssueFetchOptions {
    /// Values for the `expand` query parameter.
    pub expand: Vec<String>,
    /// Restrict the returned fields; `None` fetches all of them.
    pub fields: Option<Vec<String>>,
}

impl IssueFetchOptions {
    /// Everything a ticket summary needs: comments, attachments, links,
    /// and rendered fields.
    pub fn full() -> Self {
        Self {
            expand: vec!["renderedFields".to_string(), "names".to_string()],
            fields: None,
        }
    }

    pub fn fields(fields: &[&str]) -> Self {
        Self {
            expand: Vec::new(),
            fields: Some(fields.iter().map(|f| f.to_string()).collect()),
        }
    }
}

/// Jira issue search and retrieval.
///
/// "Not found" is not an error: `get_issue` returns `Ok(None)`.
#[async_trait]
pub trait IssueSearchClient: Send + Sync {
    /// Run a JQL search, returning at most `max_results` issues.
    async fn search_issues(
        &self,
        jql: &str,
        max_results: usize,
    ) -> Result<Vec<IssueRecord>, RetrievalError>;

    async fn get_issue(
        &self,
        key: &str,
        options: &IssueFetchOptions,
    ) -> Result<Option<IssueRecord>, RetrievalError>;

    /// Every comment on `key`, following pagination.
    async fn fetch_all_comments(&self, key: &str) -> Result<Vec<Comment>, RetrievalError>;

    /// Browse URL for an issue, when the client knows its base URL.
    fn issue_url(&self, _key: &str) -> Option<String> {
        None
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Page search
// ═══════════════════════════════════════════════════════════════════════

/// Confluence page search and retrieval.
#[async_trait]
pub trait PageSearchClient: Send + Sync {
    async fn search_pages(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<PageResult>, RetrievalError>;

    async fn get_page_by_id(&self, id: &str) -> Result<Option<PageResult>, RetrievalError>;
}

// ═══════════════════════════════════════════════════════════════════════
// LLM agents
// ═══════════════════════════════════════════════════════════════════════

/// Hosted LLM agents ("AI Studio").
#[async_trait]
pub trait LlmAgentClient: Send + Sync {
    /// Ask `agent_id` each of `search_queries`. Results are returned in
    /// the order of `search_queries`, regardless of completion order.
    async fn query_agent(
        &self,
        search_queries: &[String],
        original_query: &str,
        history: &[ChatTurn],
        agent_id: &str,
    ) -> Result<Vec<AgentResult>, RetrievalError>;
}

// ═══════════════════════════════════════════════════════════════════════
// Synthesis model
// ═══════════════════════════════════════════════════════════════════════

/// Sampling options for one completion.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionOptions {
    pub temperature: f64,
    pub max_tokens: u32,
    /// Ask the model for a JSON object.
    pub json: bool,
    /// Overrides the client's configured model.
    pub model: Option<String>,
}

impl Default for CompletionOptions {
    fn default() -> Self {
        Self {
            temperature: 0.3,
            max_tokens: 1200,
            json: false,
            model: None,
        }
    }
}

#[async_trait]
pub trait SynthesisLlmClient: Send + Sync {
    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        options: &CompletionOptions,
    ) -> Result<String, RetrievalError>;
}

// ═══════════════════════════════════════════════════════════════════════
// Pre-steps
// ═══════════════════════════════════════════════════════════════════════

/// Optional log-analysis pre-step. The returned object may carry a
/// `trackingId`.
#[async_trait]
pub trait LogAnalyzer: Send + Sync {
    async fn analyze(&self, log_input: &str) -> Result<Value, RetrievalError>;
}

/// Turns a query into search strings. An `Err` here aborts retrieval and
/// produces an error envelope.
#[async_trait]
pub trait QueryAnalyzer: Send + Sync {
    async fn analyze(&self, query: &str, history: &[ChatTurn]) -> Result<QueryAnalysis>;
}

// ═══════════════════════════════════════════════════════════════════════
// Task store
// ═══════════════════════════════════════════════════════════════════════

/// Storage for asynchronously processed requests.
#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn put(&self, record: TaskRecord);
    async fn get(&self, id: &str) -> Option<TaskRecord>;
    /// All records, newest first.
    async fn list(&self) -> Vec<TaskRecord>;
}

// ═══════════════════════════════════════════════════════════════════════
// Disabled collaborators
// ═══════════════════════════════════════════════════════════════════════

/// Stand-in for an unconfigured Jira.
pub struct DisabledIssueSearch;

#[async_trait]
impl IssueSearchClient for DisabledIssueSearch {
    async fn search_issues(&self, _: &str, _: usize) -> Result<Vec<IssueRecord>, RetrievalError> {
        Err(RetrievalError::NotConfigured("jira".to_string()))
    }

    async fn get_issue(
        &self,
        _: &str,
        _: &IssueFetchOptions,
    ) -> Result<Option<IssueRecord>, RetrievalError> {
        Err(RetrievalError::NotConfigured("jira".to_string()))
    }

    async fn fetch_all_comments(&self, _: &str) -> Result<Vec<Comment>, RetrievalError> {
        Err(RetrievalError::NotConfigured("jira".to_string()))
    }
}

/// Stand-in for an unconfigured Confluence.
pub struct DisabledPageSearch;

#[async_trait]
impl PageSearchClient for DisabledPageSearch {
    async fn search_pages(&self, _: &str, _: usize) -> Result<Vec<PageResult>, RetrievalError> {
        Err(RetrievalError::NotConfigured("confluence".to_string()))
    }

    async fn get_page_by_id(&self, _: &str) -> Result<Option<PageResult>, RetrievalError> {
        Err(RetrievalError::NotConfigured("confluence".to_string()))
    }
}

/// Stand-in when no agent endpoints are configured.
pub struct DisabledAgentClient;

#[async_trait]
impl LlmAgentClient for DisabledAgentClient {
    async fn query_agent(
        &self,
        _: &[String],
        _: &str,
        _: &[ChatTurn],
        agent_id: &str,
    ) -> Result<Vec<AgentResult>, RetrievalError> {
        Err(RetrievalError::NotConfigured(format!("agent {}", agent_id)))
    }
}

/// Stand-in for `synthesis.provider = "disabled"`.
pub struct DisabledSynthesis;

#[async_trait]
impl SynthesisLlmClient for DisabledSynthesis {
    async fn complete(
        &self,
        _: &str,
        _: &str,
        _: &CompletionOptions,
    ) -> Result<String, RetrievalError> {
        Err(RetrievalError::NotConfigured("synthesis".to_string()))
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Collaborator bundle
// ═══════════════════════════════════════════════════════════════════════

/// Every external collaborator the orchestrator uses.
#[derive(Clone)]
pub struct Collaborators {
    pub issues: Arc<dyn IssueSearchClient>,
    pub pages: Arc<dyn PageSearchClient>,
    pub agents: Arc<dyn LlmAgentClient>,
    pub synthesis: Arc<dyn SynthesisLlmClient>,
    pub query_analyzer: Arc<dyn QueryAnalyzer>,
    pub log_analyzer: Arc<dyn LogAnalyzer>,
}

impl Collaborators {
    /// All remote collaborators disabled; stub query analysis and the
    /// bundled log analyzer.
    pub fn disabled() -> Self {
        Self {
            issues: Arc::new(DisabledIssueSearch),
            pages: Arc::new(DisabledPageSearch),
            agents: Arc::new(DisabledAgentClient),
            synthesis: Arc::new(DisabledSynthesis),
            query_analyzer: Arc::new(crate::query_analysis::StubQueryAnalyzer),
            log_analyzer: Arc::new(crate::log_analysis::RegexLogAnalyzer),
        }
    }

    pub fn with_issues(mut self, issues: Arc<dyn IssueSearchClient>) -> Self {
        self.issues = issues;
        self
    }

    pub fn with_pages(mut self, pages: Arc<dyn PageSearchClient>) -> Self {
        self.pages = pages;
        self
    }

    pub fn with_agents(mut self, agents: Arc<dyn LlmAgentClient>) -> Self {
        self.agents = agents;
        self
    }

    pub fn with_synthesis(mut self, synthesis: Arc<dyn SynthesisLlmClient>) -> Self {
        self.synthesis = synthesis;
        self
    }

    pub fn with_query_analyzer(mut self, analyzer: Arc<dyn QueryAnalyzer>) -> Self {
        self.query_analyzer = analyzer;
        self
    }

    pub fn with_log_analyzer(mut self, analyzer: Arc<dyn LogAnalyzer>) -> Self {
        self.log_analyzer = analyzer;
        self
    }

    /// Build the HTTP-backed collaborators a configuration describes.
    /// Missing sections yield disabled stand-ins.
    ///
    /// # Errors
    ///
    /// Fails when a configured section's credentials are missing from the
    /// environment or an HTTP client cannot be built.
    pub fn from_config(config: &crate::config::Config) -> Result<Self> {
        let mut collaborators = Self::disabled();

        if let Some(jira) = &config.jira {
            collaborators.issues = Arc::new(crate::connector_jira::JiraClient::new(jira)?);
        }
        if let Some(confluence) = &config.confluence {
            collaborators.pages =
                Arc::new(crate::connector_confluence::ConfluenceClient::new(confluence)?);
        }
        if !config.agents.endpoints.is_empty() {
            collaborators.agents =
                Arc::new(crate::connector_agent::AgentClient::new(&config.agents)?);
        }
        if config.synthesis.is_enabled() {
            let client: Arc<dyn SynthesisLlmClient> =
                Arc::new(crate::llm::OpenAiSynthesisClient::new(&config.synthesis)?);
            if config.query_analysis.provider == "openai" {
                collaborators.query_analyzer = Arc::new(
                    crate::query_analysis::LlmQueryAnalyzer::new(client.clone())
                        .with_model(config.query_analysis.model.clone()),
                );
            }
            collaborators.synthesis = client;
        }

        Ok(collaborators)
    }
}

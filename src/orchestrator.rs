//! Query orchestration.
//!
//! [`Orchestrator::handle_query`] takes one query through the whole
//! pipeline and always returns a [`ResponseEnvelope`]:
//!
//! ```text
//!   log analysis (optional) ──▶ clarification restore ──▶ query analysis
//!                                                              │
//!                         target system: jira | confluence | default
//!                                                              │
//!   ┌──────────────────────────────┬───────────────────────────┴──────┐
//!   ▼ jira                         ▼ confluence                       ▼ default
//!   analytics intent?              routing decision                   agent fan-out,
//!   ├─ clarification ─▶ prompt     (direct first / agent first)       one call per
//!   ├─ analytic ok ───▶ done       with the other as fallback         search query
//!   └─ otherwise ─▶ routing decision ...
//!                                                              │
//!                       contexts ──▶ AnswerSynthesizer ──▶ envelope
//! ```
//!
//! Retrieval failures are recorded in `retrieval_errors` and never abort
//! the request. The retrieval phase runs under the request budget; when it
//! expires the request continues with whatever context it has. Only an
//! error outside retrieval (a failed query analysis) produces the
//! `success: false` envelope, which still echoes the original query.

use std::time::{Duration, Instant};

use anyhow::{bail, Result};
use chrono::{SecondsFormat, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use knowledge_router_core::error::RetrievalError;
use knowledge_router_core::fallback::FallbackEvaluator;
use knowledge_router_core::heuristics::{
    detect_target_system, extract_original_query_from_metadata,
    is_ai_summary_language_query, is_clarification_follow_up,
};
use knowledge_router_core::jql;
use knowledge_router_core::models::{
    AgentResult, AnalyticsIntent, AnalyticsType, ChatTurn, ClarificationRequest, ContextItem,
    IssueRecord, MissingInfo, PageResult, RoutingDecision, TargetSystem,
};
use knowledge_router_core::routing;

use crate::analytics_service::JiraAnalyticsService;
use crate::cache::ResponseCache;
use crate::config::{AgentsConfig, Config};
use crate::envelope::{
    sources_for, status_for, AttemptOutcome, EnvelopeResult, EnvelopeStatus, ErrorRecord,
    ResponseEnvelope, RetrievalAttempt,
};
use crate::synthesis::{AnswerSynthesizer, SynthesisMeta};
use crate::traits::Collaborators;

static PAGE_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)page\s*id\s*[:=]?\s*(\d+)").expect("page id pattern"));

/// Per-request overrides.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryOptions {
    /// Overrides keyword target classification.
    #[serde(default, alias = "requested_data_source")]
    pub requested_data_source: Option<TargetSystem>,
    /// Overrides the agent used when no target system applies.
    #[serde(default, alias = "agent_id")]
    pub agent_id: Option<String>,
}

impl QueryOptions {
    fn is_default(&self) -> bool {
        self.requested_data_source.is_none() && self.agent_id.is_none()
    }
}

/// One query with its conversation.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRequest {
    pub query: String,
    #[serde(default)]
    pub history: Vec<ChatTurn>,
    #[serde(default)]
    pub options: QueryOptions,
    #[serde(default, alias = "log_input")]
    pub log_input: Option<String>,
}

impl QueryRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Default::default()
        }
    }

    pub fn with_history(mut self, history: Vec<ChatTurn>) -> Self {
        self.history = history;
        self
    }

    pub fn with_options(mut self, options: QueryOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_log_input(mut self, log_input: impl Into<String>) -> Self {
        self.log_input = Some(log_input.into());
        self
    }

    fn is_cacheable(&self) -> bool {
        self.history.is_empty() && self.log_input.is_none() && self.options.is_default()
    }
}

/// What `kr route` reports: the classification of a query without any
/// collaborator call.
#[derive(Debug, Clone, Serialize)]
pub struct RoutePlan {
    pub target_system: TargetSystem,
    pub clarification_follow_up: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analytics_type: Option<AnalyticsType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analytics_parameters: Option<Value>,
    pub routing_decision: RoutingDecision,
    pub routing_rule: &'static str,
    pub signals: Vec<&'static str>,
}

// ============ Request state ============

struct PendingClarification {
    missing_info: MissingInfo,
    prompt: String,
    turn: ChatTurn,
}

/// Accumulators owned by one request.
struct RequestState {
    contexts: Vec<ContextItem>,
    errors: Vec<ErrorRecord>,
    attempts: Vec<RetrievalAttempt>,
    routing: RoutingDecision,
    analysis_output: Option<Value>,
    related_questions: Vec<String>,
    log_analysis_result: Option<Value>,
    clarification: Option<PendingClarification>,
}

impl Default for RequestState {
    fn default() -> Self {
        Self {
            contexts: Vec::new(),
            errors: Vec::new(),
            attempts: Vec::new(),
            routing: RoutingDecision::AiStudioFirst,
            analysis_output: None,
            related_questions: Vec::new(),
            log_analysis_result: None,
            clarification: None,
        }
    }
}

impl RequestState {
    fn attempt(&mut self, source: &str, outcome: AttemptOutcome, detail: Option<String>) {
        self.attempts.push(RetrievalAttempt {
            source: source.to_string(),
            outcome,
            detail,
        });
    }

    /// Record a failed call: one error and one failed attempt.
    fn fail(&mut self, source: &str, error: impl std::fmt::Display) {
        let record = ErrorRecord::new(source, error);
        warn!(source, error = %record.error, "retrieval failed");
        self.attempt(source, AttemptOutcome::Failed, Some(record.error.clone()));
        self.errors.push(record);
    }

    fn into_envelope(self, query: &str, request_id: Uuid, answer: String, success: bool) -> ResponseEnvelope {
        let (missing_info, clarification) = match self.clarification {
            Some(c) => (Some(c.missing_info), Some(c.turn)),
            None => (None, None),
        };
        let status = if missing_info.is_some() {
            EnvelopeStatus::NeedsClarification
        } else {
            status_for(&self.contexts)
        };

        ResponseEnvelope {
            success,
            status,
            query: query.to_string(),
            question: query.to_string(),
            result: EnvelopeResult {
                answer: answer.clone(),
                sources: sources_for(&self.contexts),
                related_questions: self.related_questions,
                needs_user_input: status == EnvelopeStatus::NeedsClarification,
                missing_info,
            },
            final_answer: answer,
            retrieval_contexts: self.contexts,
            routing_decision: self.routing,
            analysis_output: self.analysis_output,
            log_analysis_result: self.log_analysis_result,
            timestamp: now(),
            request_id,
            retrieval_errors: self.errors,
            retrieval_attempts: self.attempts,
            clarification,
        }
    }
}

fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// The parts of one request the retrieval branches read.
struct Turn<'a> {
    request: &'a QueryRequest,
    /// The query after log and clarification enrichment.
    effective: &'a str,
    /// First search query from query analysis.
    primary: &'a str,
    search_queries: &'a [String],
    follow_up: bool,
}

/// The direct API a Jira or Confluence branch searches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DirectSource {
    Jira,
    Confluence,
}

impl DirectSource {
    fn target(self) -> TargetSystem {
        match self {
            DirectSource::Jira => TargetSystem::Jira,
            DirectSource::Confluence => TargetSystem::Confluence,
        }
    }

    fn source_name(self) -> &'static str {
        match self {
            DirectSource::Jira => "jira_direct",
            DirectSource::Confluence => "confluence_direct",
        }
    }

    fn agent_source(self) -> &'static str {
        match self {
            DirectSource::Jira => "aistudio_jira",
            DirectSource::Confluence => "aistudio_confluence",
        }
    }

    fn label(self) -> &'static str {
        match self {
            DirectSource::Jira => "Jira",
            DirectSource::Confluence => "Confluence",
        }
    }

    fn agent_id(self, agents: &AgentsConfig) -> &str {
        match self {
            DirectSource::Jira => &agents.jira_agent,
            DirectSource::Confluence => &agents.confluence_agent,
        }
    }
}

// ============ Orchestrator ============

pub struct Orchestrator {
    collaborators: Collaborators,
    analytics: JiraAnalyticsService,
    synthesizer: AnswerSynthesizer,
    evaluator: FallbackEvaluator,
    agents: AgentsConfig,
    direct_search_limit: usize,
    request_timeout: Duration,
    cache: Option<ResponseCache>,
}

impl Orchestrator {
    pub fn new(config: &Config, collaborators: Collaborators) -> Self {
        Self {
            analytics: JiraAnalyticsService::new(collaborators.issues.clone(), config.intent_options()),
            synthesizer: AnswerSynthesizer::new(collaborators.synthesis.clone(), &config.synthesis),
            evaluator: FallbackEvaluator::new(config.orchestration.fallback_confidence_threshold),
            agents: config.agents.clone(),
            direct_search_limit: config.orchestration.direct_search_limit,
            request_timeout: Duration::from_secs(config.orchestration.request_timeout_secs),
            cache: config.cache.enabled.then(|| ResponseCache::new(&config.cache)),
            collaborators,
        }
    }

    /// Build with the HTTP collaborators described by `config`.
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(config, Collaborators::from_config(config)?))
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn analytics(&self) -> &JiraAnalyticsService {
        &self.analytics
    }

    /// Run one query. Never fails; see the module docs for the error shape.
    pub async fn handle_query(&self, request: &QueryRequest) -> ResponseEnvelope {
        let started = Instant::now();
        let request_id = Uuid::new_v4();
        info!(%request_id, query = %request.query, "handling query");

        let mut state = RequestState::default();
        let envelope = match self.run(request, request_id, &mut state).await {
            Ok(envelope) => envelope,
            Err(e) => {
                error!(%request_id, error = %e, "query failed");
                error_envelope(request, request_id, state, &e)
            }
        };

        info!(
            %request_id,
            routing = %envelope.routing_decision,
            contexts = envelope.retrieval_contexts.len(),
            errors = envelope.retrieval_errors.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "query handled"
        );
        envelope
    }

    async fn run(&self, request: &QueryRequest, request_id: Uuid, state: &mut RequestState) -> Result<ResponseEnvelope> {
        if request.query.trim().is_empty() {
            bail!("query must not be empty");
        }
        let history = &request.history;

        if let Some(cache) = self.cache.as_ref().filter(|_| request.is_cacheable()) {
            if let Some(hit) = cache.lookup(&request.query) {
                info!(%request_id, confidence = hit.confidence, "serving cached answer");
                return Ok(hit.envelope.readdressed(&request.query, request_id, now()));
            }
        }

        let mut effective = request.query.clone();
        if let Some(log_input) = request.log_input.as_deref() {
            effective = self.analyze_log(log_input, effective, state).await;
        }

        let follow_up = is_clarification_follow_up(&request.query, history);
        if follow_up {
            if let Some(ctx) = extract_original_query_from_metadata(history) {
                if let Some(missing) = ctx.missing_info {
                    effective = missing.enhance_query(&ctx.original_query, &effective);
                    info!(original = %ctx.original_query, enhanced = %effective, "restored clarification context");
                }
            }
        }

        let analysis = self
            .collaborators
            .query_analyzer
            .analyze(&effective, history)
            .await?
            .normalized(&effective);
        state.related_questions = analysis.related_questions.clone();
        state.analysis_output = serde_json::to_value(&analysis).ok();
        let primary = analysis.primary_query(&effective).to_string();

        let target = match request.options.requested_data_source {
            Some(requested) if requested != TargetSystem::Default => requested,
            _ if follow_up => TargetSystem::Jira,
            _ => detect_target_system(&[&primary, &effective]),
        };
        info!(%request_id, target = %target, follow_up, primary = %primary, "target system selected");

        let turn = Turn {
            request,
            effective: &effective,
            primary: &primary,
            search_queries: &analysis.search_queries,
            follow_up,
        };
        let retrieval = self.retrieve(target, &turn, state);
        if tokio::time::timeout(self.request_timeout, retrieval).await.is_err() {
            warn!(%request_id, budget_secs = self.request_timeout.as_secs_f64(), "request budget exceeded");
            state.routing = RoutingDecision::BothServicesFailed;
            state.errors.push(ErrorRecord::new(
                "request_budget",
                format!("Request budget of {:?} exceeded", self.request_timeout),
            ));
        }

        if state.contexts.is_empty() {
            if let Some(first) = state.errors.first() {
                let item = ContextItem::error(
                    first.source.clone(),
                    format!("Failed to retrieve information. Error: {}", first.error),
                );
                state.contexts.push(item);
            }
        }

        let answer = match &state.clarification {
            Some(clarification) => clarification.prompt.clone(),
            None => {
                let meta = SynthesisMeta {
                    routing_decision: Some(state.routing),
                    analysis_output: state.analysis_output.clone(),
                    log_analysis_result: state.log_analysis_result.clone(),
                };
                self.synthesizer.synthesize(&effective, &state.contexts, &meta).await
            }
        };

        let envelope = std::mem::take(state).into_envelope(&request.query, request_id, answer, true);
        if let Some(cache) = &self.cache {
            if request.is_cacheable() && envelope.is_cacheable() {
                cache.store(&request.query, &envelope);
            }
        }
        Ok(envelope)
    }

    async fn analyze_log(&self, log_input: &str, query: String, state: &mut RequestState) -> String {
        match self.collaborators.log_analyzer.analyze(log_input).await {
            Ok(report) => {
                let tracked = report
                    .get("trackingId")
                    .and_then(Value::as_str)
                    .map(|id| format!("{} (Log Tracking ID: {})", query, id));
                state.log_analysis_result = Some(report);
                tracked.unwrap_or(query)
            }
            Err(e) => {
                warn!(error = %e, "log analysis failed");
                state.log_analysis_result = Some(json!({ "error": format!("Log analysis failed: {}", e) }));
                query
            }
        }
    }

    async fn retrieve(&self, target: TargetSystem, turn: &Turn<'_>, state: &mut RequestState) {
        match target {
            TargetSystem::Jira => self.jira_branch(turn, state).await,
            TargetSystem::Confluence => self.generic_branch(DirectSource::Confluence, turn, None, state).await,
            TargetSystem::Default => self.default_branch(turn, state).await,
        }
    }

    // ============ Jira ============

    async fn jira_branch(&self, turn: &Turn<'_>, state: &mut RequestState) {
        // The bare reply is what the classifier matches against the stored intent.
        let intent_query = if turn.follow_up {
            turn.request.query.as_str()
        } else {
            turn.effective
        };
        let intent = self.analytics.classify_intent(intent_query, &turn.request.history);
        debug!(intent = %intent.analytics_type(), "analytics intent");

        let prepared_jql = match intent {
            AnalyticsIntent::General { jql } => jql,
            AnalyticsIntent::NeedsClarification(request) => {
                ask_for_clarification(turn, request, state);
                return;
            }
            intent => {
                if self.run_analytics(&intent, state).await {
                    return;
                }
                None
            }
        };
        self.generic_branch(DirectSource::Jira, turn, prepared_jql, state).await;
    }

    /// True if the analytic produced a context item.
    async fn run_analytics(&self, intent: &AnalyticsIntent, state: &mut RequestState) -> bool {
        let kind = intent.analytics_type();
        let source = format!("advanced_jira_service_{}", kind.as_str().to_ascii_lowercase());
        state.routing = RoutingDecision::AdvancedJiraQuery(kind);

        let Some(response) = self.analytics.execute(intent).await else {
            return false;
        };
        if response.success {
            state.attempt(&source, AttemptOutcome::Success, None);
            state.contexts.push(response.into_context_item(kind));
            true
        } else {
            let error = response.error.unwrap_or_else(|| "Analytics failed".to_string());
            state.fail(&source, error);
            info!(intent = %kind, "analytics failed, using generic routing");
            false
        }
    }

    // ============ Generic routing ============

    async fn generic_branch(
        &self,
        direct: DirectSource,
        turn: &Turn<'_>,
        prepared_jql: Option<String>,
        state: &mut RequestState,
    ) {
        let forced = direct == DirectSource::Jira
            && (turn.follow_up || prepared_jql.is_some() || is_ai_summary_language_query(turn.effective));
        let decision = if forced {
            info!(target = %direct.target(), "routing forced to direct API");
            RoutingDecision::DirectApiFirst
        } else {
            let outcome = routing::decide_with_reason(turn.effective, direct.target(), &turn.request.history);
            info!(
                target = %direct.target(),
                decision = %outcome.decision,
                rule = outcome.rule.as_str(),
                signals = ?outcome.signals,
                "routing decided"
            );
            outcome.decision
        };
        state.routing = decision;

        let jql = prepared_jql.as_deref();
        if decision == RoutingDecision::DirectApiFirst {
            self.direct_then_agent(direct, turn, jql, state).await;
        } else {
            self.agent_then_direct(direct, turn, jql, state).await;
        }
    }

    async fn direct_then_agent(&self, direct: DirectSource, turn: &Turn<'_>, jql: Option<&str>, state: &mut RequestState) {
        let direct_source = direct.source_name();
        match self.direct_search(direct, turn, jql).await {
            Ok(items) if !items.is_empty() => {
                info!(source = direct_source, count = items.len(), "direct search succeeded");
                state.attempt(direct_source, AttemptOutcome::Success, Some(format!("{} results", items.len())));
                state.contexts.extend(items);
                state.routing = RoutingDecision::DirectApiSuccess;
                return;
            }
            Ok(_) => {
                info!(source = direct_source, "direct search found nothing, falling back to agent");
                state.attempt(direct_source, AttemptOutcome::Empty, None);
            }
            Err(e) => state.fail(direct_source, e),
        }

        let agent_source = direct.agent_source();
        match self.ask_agent(direct.agent_id(&self.agents), turn).await {
            Ok(Some(result)) if !result.error => {
                state.attempt(agent_source, AttemptOutcome::Success, None);
                state.contexts.push(result.into_context(agent_source));
                state.routing = RoutingDecision::AiStudioFallbackSuccess;
            }
            Ok(result) => {
                let message = result
                    .and_then(|r| r.summary)
                    .unwrap_or_else(|| "Agent returned no answer".to_string());
                state.fail(agent_source, message);
                state.routing = RoutingDecision::BothServicesFailed;
            }
            Err(e) => {
                state.fail(agent_source, e);
                state.routing = RoutingDecision::BothServicesFailed;
            }
        }
    }

    async fn agent_then_direct(&self, direct: DirectSource, turn: &Turn<'_>, jql: Option<&str>, state: &mut RequestState) {
        let agent_source = direct.agent_source();
        let reason = match self.ask_agent(direct.agent_id(&self.agents), turn).await {
            Ok(Some(result)) => match self.evaluator.evaluate(Some(&result)) {
                None => {
                    info!(source = agent_source, "agent answer accepted");
                    state.attempt(agent_source, AttemptOutcome::Success, None);
                    state.contexts.push(result.into_context(agent_source));
                    state.routing = RoutingDecision::AiStudioSuccess;
                    return;
                }
                Some(reason) if result.error => {
                    state.fail(agent_source, result.summary.as_deref().unwrap_or("Agent error"));
                    reason.to_string()
                }
                Some(reason) => {
                    state.attempt(agent_source, AttemptOutcome::Rejected, Some(reason.to_string()));
                    reason.to_string()
                }
            },
            Ok(None) => {
                state.attempt(agent_source, AttemptOutcome::Empty, None);
                "agent returned no results".to_string()
            }
            Err(e) => {
                let message = e.to_string();
                state.fail(agent_source, e);
                message
            }
        };
        info!(source = agent_source, reason = %reason, "fallback to direct search triggered");

        let direct_source = direct.source_name();
        match self.direct_search(direct, turn, jql).await {
            Ok(items) if !items.is_empty() => {
                state.attempt(direct_source, AttemptOutcome::Success, Some(format!("{} results", items.len())));
                state.contexts.extend(items);
                state.routing = RoutingDecision::DirectApiFallbackSuccess;
            }
            Ok(_) => {
                state.attempt(direct_source, AttemptOutcome::Empty, None);
                state.routing = RoutingDecision::BothServicesFailed;
                state.contexts.push(ContextItem::Notice {
                    title: Some("No Results Found".to_string()),
                    summary: format!(
                        "Neither the agent nor direct {} search found results for \"{}\"",
                        direct.label(),
                        turn.effective
                    ),
                    source: "no_results".to_string(),
                    is_error: false,
                    needs_user_input: false,
                });
            }
            Err(e) => {
                let summary = format!(
                    "The agent provided insufficient information, and direct {} search failed: {}",
                    direct.label(),
                    e
                );
                state.fail(direct_source, e);
                state.routing = RoutingDecision::BothServicesFailed;
                state.contexts.push(ContextItem::Notice {
                    title: Some("Error in Fallback".to_string()),
                    summary,
                    source: "fallback_error".to_string(),
                    is_error: true,
                    needs_user_input: false,
                });
            }
        }
    }

    async fn ask_agent(&self, agent_id: &str, turn: &Turn<'_>) -> Result<Option<AgentResult>, RetrievalError> {
        let queries = [turn.primary.to_string()];
        let results = self
            .collaborators
            .agents
            .query_agent(&queries, turn.effective, &turn.request.history, agent_id)
            .await?;
        Ok(results.into_iter().next())
    }

    async fn direct_search(
        &self,
        direct: DirectSource,
        turn: &Turn<'_>,
        prepared_jql: Option<&str>,
    ) -> Result<Vec<ContextItem>, RetrievalError> {
        match direct {
            DirectSource::Jira => {
                let jql = prepared_jql
                    .map(str::to_string)
                    .unwrap_or_else(|| jql::for_direct_search(turn.primary));
                debug!(jql = %jql, "direct jira search");
                let issues = self
                    .collaborators
                    .issues
                    .search_issues(&jql, self.direct_search_limit)
                    .await?;
                Ok(issues.into_iter().map(|issue| self.issue_context(issue)).collect())
            }
            DirectSource::Confluence => {
                if let Some(id) = page_id(turn.effective) {
                    debug!(page_id = %id, "direct confluence page lookup");
                    if let Some(page) = self.collaborators.pages.get_page_by_id(&id).await? {
                        return Ok(vec![page_context(page)]);
                    }
                }
                let pages = self
                    .collaborators
                    .pages
                    .search_pages(turn.primary, self.direct_search_limit)
                    .await?;
                Ok(pages.into_iter().map(page_context).collect())
            }
        }
    }

    fn issue_context(&self, issue: IssueRecord) -> ContextItem {
        let description = issue.description_text();
        let content = if description.trim().is_empty() {
            issue.summary().to_string()
        } else {
            description
        };
        let raw = json!({
            "key": issue.key,
            "summary": issue.summary(),
            "status": issue.status_name(),
            "issueType": issue.issue_type(),
            "assignee": issue.fields.pointer("/assignee/displayName"),
            "priority": issue.fields.pointer("/priority/name"),
            "created": issue.fields.get("created"),
            "updated": issue.fields.get("updated"),
        });
        ContextItem::Document {
            title: Some(format!("{}: {}", issue.key, issue.summary())),
            url: self.collaborators.issues.issue_url(&issue.key),
            content,
            source: "jira_direct".to_string(),
            raw_data: Some(raw),
        }
    }

    // ============ Default ============

    async fn default_branch(&self, turn: &Turn<'_>, state: &mut RequestState) {
        state.routing = RoutingDecision::AiStudioDefault;
        let agent_id = turn
            .request
            .options
            .agent_id
            .as_deref()
            .unwrap_or(&self.agents.default_agent);
        let source = "aistudio_default";
        info!(agent = agent_id, queries = turn.search_queries.len(), "querying default agent");

        match self
            .collaborators
            .agents
            .query_agent(turn.search_queries, turn.effective, &turn.request.history, agent_id)
            .await
        {
            Ok(results) => {
                for result in results {
                    if result.error {
                        state.fail(source, result.summary.as_deref().unwrap_or("Agent error"));
                    } else if result.text().is_none() {
                        state.attempt(source, AttemptOutcome::Empty, None);
                    } else {
                        state.attempt(source, AttemptOutcome::Success, None);
                        state.contexts.push(result.into_context(source));
                    }
                }
            }
            Err(e) => state.fail(source, e),
        }
    }

    // ============ Planning ============

    /// Classify `query` the way [`handle_query`](Self::handle_query) would,
    /// without query analysis or any collaborator call.
    pub fn plan(&self, query: &str, history: &[ChatTurn]) -> RoutePlan {
        let follow_up = is_clarification_follow_up(query, history);
        let target = if follow_up {
            TargetSystem::Jira
        } else {
            detect_target_system(&[query])
        };

        let intent = (target == TargetSystem::Jira).then(|| self.analytics.classify_intent(query, history));
        let outcome = routing::decide_with_reason(query, target, history);

        let routing_decision = match (&intent, target) {
            (_, TargetSystem::Default) => RoutingDecision::AiStudioDefault,
            (Some(i), _) if !i.is_general() => RoutingDecision::AdvancedJiraQuery(i.analytics_type()),
            (Some(AnalyticsIntent::General { jql: Some(_) }), _) => RoutingDecision::DirectApiFirst,
            _ if follow_up => RoutingDecision::DirectApiFirst,
            _ => outcome.decision,
        };

        RoutePlan {
            target_system: target,
            clarification_follow_up: follow_up,
            analytics_type: intent.as_ref().map(AnalyticsIntent::analytics_type),
            analytics_parameters: intent.as_ref().map(AnalyticsIntent::parameters),
            routing_decision,
            routing_rule: outcome.rule.as_str(),
            signals: outcome.signals,
        }
    }
}

fn ask_for_clarification(turn: &Turn<'_>, request: ClarificationRequest, state: &mut RequestState) {
    info!(missing = request.missing_info.as_str(), intent = %request.intent_type, "analytics needs clarification");
    state.routing = RoutingDecision::AdvancedJiraQuery(AnalyticsType::NeedsClarification);

    let metadata = json!({
        "metadata": {
            "originalQuery": turn.effective,
            "missingInfo": request.missing_info,
            "intentType": request.intent_type,
            "queryContext": request.query_context,
        }
    });
    state.attempt("advanced_jira_service_clarification", AttemptOutcome::Success, None);
    state.contexts.push(ContextItem::Notice {
        title: Some("Clarification Needed".to_string()),
        summary: request.prompt.clone(),
        source: "advanced_jira_service_clarification".to_string(),
        is_error: false,
        needs_user_input: true,
    });
    state.clarification = Some(PendingClarification {
        missing_info: request.missing_info,
        prompt: request.prompt,
        turn: ChatTurn::metadata(metadata.to_string()),
    });
}

fn page_id(query: &str) -> Option<String> {
    PAGE_ID
        .captures(query)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

fn page_context(page: PageResult) -> ContextItem {
    let raw = json!({
        "id": page.id,
        "space": page.space,
        "version": page.version,
        "lastModified": page.last_modified,
    });
    ContextItem::Document {
        title: Some(page.title),
        url: page.url,
        content: page.summary,
        source: "confluence_direct".to_string(),
        raw_data: Some(raw),
    }
}

/// The `success: false` envelope for an error outside retrieval.
fn error_envelope(
    request: &QueryRequest,
    request_id: Uuid,
    mut state: RequestState,
    err: &anyhow::Error,
) -> ResponseEnvelope {
    if state.contexts.is_empty() {
        state.contexts.push(ContextItem::error("error", err.to_string()));
    }
    state.clarification = None;
    let answer = format!("I encountered an error trying to process your request: {}", err);
    state.into_envelope(&request.query, request_id, answer, false)
}

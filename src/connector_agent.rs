//! Hosted LLM agent connector.
//!
//! Implements [`LlmAgentClient`] for agents reachable over HTTP. Each agent
//! id maps to an endpoint in `[agents.endpoints.<id>]`.
//!
//! # Protocol
//!
//! ```text
//! POST <url>               {"question": "...", "chat_history": [...]}
//!   → immediate answer     {"result": {"answer": "..."}, ...}
//!   → or a task handle     {"task_id": "..."}
//! GET  <url>/tasks/<id>    {"status": "pending" | "complete" | "failed", ...}
//! ```
//!
//! A task is polled every `poll_interval_ms` until it reaches a terminal
//! status or `max_poll_attempts` is exhausted. One request is sent per
//! search query; the requests run concurrently and their results are
//! returned in dispatch order.

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use futures::future::join_all;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use knowledge_router_core::error::RetrievalError;
use knowledge_router_core::models::{AgentAnswer, AgentResult, ChatRole, ChatTurn, CitationRef};

use crate::config::{AgentEndpointConfig, AgentsConfig};
use crate::http::{build_client, env_credential, send_json};
use crate::traits::LlmAgentClient;

/// Retries for the initial submission. Polls are not retried; the next
/// poll is the retry.
const SUBMIT_RETRIES: u32 = 2;

/// Answer text used when a completed task carries no recognisable answer.
pub const NO_ANSWER_TEXT: &str =
    "Agent completed the task, but no specific answer format was found in the response.";

struct Endpoint {
    client: Client,
    url: String,
    token: Option<String>,
    poll_interval: Duration,
    max_poll_attempts: u32,
}

pub struct AgentClient {
    endpoints: BTreeMap<String, Endpoint>,
}

impl AgentClient {
    /// # Errors
    ///
    /// Returns an error if an endpoint names a `token_env` that is unset.
    pub fn new(config: &AgentsConfig) -> Result<Self> {
        let mut endpoints = BTreeMap::new();
        for (id, endpoint) in &config.endpoints {
            let token = match &endpoint.token_env {
                Some(var) => Some(env_credential(var)?),
                None => None,
            };
            endpoints.insert(id.clone(), Endpoint::new(endpoint, token)?);
        }
        Ok(Self { endpoints })
    }

    async fn ask(
        &self,
        endpoint: &Endpoint,
        agent_id: &str,
        question: &str,
        chat_history: &[Value],
    ) -> Result<AgentResult, RetrievalError> {
        let body = json!({ "question": question, "chat_history": chat_history });
        let response = send_json(agent_id, SUBMIT_RETRIES, || {
            endpoint.authorize(endpoint.client.post(&endpoint.url)).json(&body)
        })
        .await?
        .ok_or_else(|| RetrievalError::InvalidResponse(format!("{}: endpoint not found", agent_id)))?;

        match task_id(&response) {
            Some(id) => {
                debug!(agent_id, task_id = %id, "agent task submitted");
                self.poll(endpoint, agent_id, &id).await
            }
            None => Ok(parse_answer(&response, agent_id)),
        }
    }

    async fn poll(
        &self,
        endpoint: &Endpoint,
        agent_id: &str,
        task_id: &str,
    ) -> Result<AgentResult, RetrievalError> {
        let url = format!("{}/tasks/{}", endpoint.url.trim_end_matches('/'), task_id);

        for attempt in 1..=endpoint.max_poll_attempts {
            let response = match send_json(agent_id, 0, || {
                endpoint.authorize(endpoint.client.get(&url))
            })
            .await
            {
                Ok(Some(value)) => value,
                Ok(None) => {
                    return Err(RetrievalError::NotFound(format!(
                        "{}: task {}",
                        agent_id, task_id
                    )))
                }
                Err(e) if e.is_transient() => {
                    warn!(agent_id, task_id, attempt, error = %e, "poll failed");
                    tokio::time::sleep(endpoint.poll_interval).await;
                    continue;
                }
                Err(e) => return Err(e),
            };

            let status = response
                .get("status")
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_ascii_lowercase();
            match status.as_str() {
                "complete" | "completed" | "succeeded" | "done" => {
                    info!(agent_id, task_id, attempt, "agent task complete");
                    return Ok(parse_answer(&response, agent_id));
                }
                "pending" | "processing" | "running" | "queued" => {
                    tokio::time::sleep(endpoint.poll_interval).await;
                }
                _ => {
                    let message = response
                        .get("error")
                        .and_then(Value::as_str)
                        .map(str::to_string)
                        .unwrap_or_else(|| format!("polling failed with status '{}'", status));
                    return Err(RetrievalError::InvalidResponse(format!(
                        "{}: {}",
                        agent_id, message
                    )));
                }
            }
        }

        Err(RetrievalError::Transient(format!(
            "{}: task {} not complete after {} polls",
            agent_id, task_id, endpoint.max_poll_attempts
        )))
    }
}

impl Endpoint {
    fn new(config: &AgentEndpointConfig, token: Option<String>) -> Result<Self> {
        Ok(Self {
            client: build_client(config.timeout_secs)?,
            url: config.url.clone(),
            token,
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            max_poll_attempts: config.max_poll_attempts,
        })
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.header("Authorization", format!("Bearer {}", token)),
            None => request,
        }
    }
}

#[async_trait]
impl LlmAgentClient for AgentClient {
    async fn query_agent(
        &self,
        search_queries: &[String],
        original_query: &str,
        history: &[ChatTurn],
        agent_id: &str,
    ) -> Result<Vec<AgentResult>, RetrievalError> {
        let endpoint = self
            .endpoints
            .get(agent_id)
            .ok_or_else(|| RetrievalError::NotConfigured(format!("agent {}", agent_id)))?;

        let chat_history = wire_history(history);
        let questions: Vec<&str> = if search_queries.is_empty() {
            vec![original_query]
        } else {
            search_queries.iter().map(String::as_str).collect()
        };

        let outcomes = join_all(
            questions
                .iter()
                .map(|q| self.ask(endpoint, agent_id, q, &chat_history)),
        )
        .await;

        if outcomes.iter().all(Result::is_err) {
            let first = outcomes.into_iter().find_map(Result::err);
            return Err(first.unwrap_or_else(|| {
                RetrievalError::InvalidResponse(format!("{}: no questions dispatched", agent_id))
            }));
        }

        Ok(outcomes
            .into_iter()
            .map(|outcome| outcome.unwrap_or_else(|e| AgentResult::failed(e.to_string())))
            .collect())
    }
}

/// Chat history in the agent wire format. Metadata turns stay local.
fn wire_history(history: &[ChatTurn]) -> Vec<Value> {
    history
        .iter()
        .filter(|t| t.role != ChatRole::Metadata)
        .map(|t| json!({ "role": t.role, "content": t.content }))
        .collect()
}

fn task_id(response: &Value) -> Option<String> {
    ["/task_id", "/taskId", "/body/taskId"]
        .iter()
        .find_map(|p| response.pointer(p))
        .and_then(|v| match v {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
}

/// Decode an agent answer. The answer may sit at `result.answer`,
/// `data.answer`, `final_answer`, `result` (a string), or `answer`.
fn parse_answer(response: &Value, agent_id: &str) -> AgentResult {
    let candidates = [
        response.pointer("/result/answer").map(|a| (a, response.get("result"))),
        response.pointer("/data/answer").map(|a| (a, response.get("data"))),
        response.get("final_answer").map(|a| (a, None)),
        response.get("result").filter(|r| r.is_string()).map(|a| (a, None)),
        response.get("answer").map(|a| (a, Some(response))),
    ];
    let found = candidates
        .into_iter()
        .flatten()
        .find(|(answer, _)| match answer {
            Value::String(s) => !s.trim().is_empty(),
            Value::Null => false,
            _ => true,
        });

    let (answer, sources, found_specific_data) = match found {
        Some((Value::String(s), container)) => (s.clone(), citations(container), None),
        Some((other, container)) => (
            serde_json::to_string_pretty(other).unwrap_or_default(),
            citations(container),
            None,
        ),
        None => (NO_ANSWER_TEXT.to_string(), Vec::new(), Some(false)),
    };

    let title = ["title", "question"]
        .iter()
        .find_map(|k| response.get(*k).and_then(Value::as_str))
        .map(str::to_string)
        .unwrap_or_else(|| format!("Results from {}", agent_id));

    AgentResult {
        error: response.get("error").and_then(Value::as_bool).unwrap_or(false),
        title: Some(title),
        summary: None,
        answer: None,
        answer_text: None,
        url: response.get("url").and_then(Value::as_str).map(str::to_string),
        confidence_score: response.get("confidence_score").and_then(Value::as_f64),
        found_specific_data: response
            .get("found_specific_data")
            .and_then(Value::as_bool)
            .or(found_specific_data),
        requires_direct_api_fallback: response
            .get("requires_direct_api_fallback")
            .and_then(Value::as_bool),
        result: Some(AgentAnswer {
            answer: Some(answer),
        }),
        extra: response.get("extra").cloned(),
        sources,
    }
}

fn citations(container: Option<&Value>) -> Vec<CitationRef> {
    container
        .and_then(|c| c.get("sources"))
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|s| serde_json::from_value(s.clone()).ok())
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

    fn client(server: &MockServer) -> AgentClient {
        let mut endpoints = BTreeMap::new();
        endpoints.insert(
            "jira_ag".to_string(),
            AgentEndpointConfig {
                url: format!("{}/agents/jira", server.uri()),
                token_env: None,
                timeout_secs: 5,
                poll_interval_ms: 10,
                max_poll_attempts: 5,
            },
        );
        AgentClient::new(&AgentsConfig {
            endpoints,
            ..Default::default()
        })
        .unwrap()
    }

    /// Answers `pending` until the given number of calls has been made.
    struct PendingThen {
        calls: Arc<AtomicUsize>,
        pending: usize,
    }

    impl Respond for PendingThen {
        fn respond(&self, _: &Request) -> ResponseTemplate {
            if self.calls.fetch_add(1, Ordering::SeqCst) < self.pending {
                ResponseTemplate::new(200).set_body_json(json!({"status": "pending"}))
            } else {
                ResponseTemplate::new(200).set_body_json(json!({
                    "status": "complete",
                    "result": {"answer": "ZSEE-1 is fixed", "sources": [{"title": "ZSEE-1", "url": "https://x/1"}]}
                }))
            }
        }
    }

    #[tokio::test]
    async fn test_immediate_answer() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/agents/jira"))
            .and(body_partial_json(json!({"question": "login bug"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "answer": "It was a token expiry.",
                "confidence_score": 0.4
            })))
            .mount(&server)
            .await;

        let agents = client(&server);
        let results = agents
            .query_agent(&["login bug".to_string()], "login bug", &[], "jira_ag")
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].text(), Some("It was a token expiry."));
        assert_eq!(results[0].confidence_score, Some(0.4));
    }

    #[tokio::test]
    async fn test_task_is_polled_until_complete() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/agents/jira"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"task_id": "t-1"})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/agents/jira/tasks/t-1"))
            .respond_with(PendingThen {
                calls: Arc::new(AtomicUsize::new(0)),
                pending: 2,
            })
            .mount(&server)
            .await;

        let agents = client(&server);
        let results = agents
            .query_agent(&["status of ZSEE-1".to_string()], "status of ZSEE-1", &[], "jira_ag")
            .await
            .unwrap();
        assert_eq!(results[0].text(), Some("ZSEE-1 is fixed"));
        assert_eq!(results[0].sources.len(), 1);
    }

    #[tokio::test]
    async fn test_results_follow_dispatch_order() {
        let server = MockServer::start().await;
        for (question, answer, delay) in [("first", "one", 150u64), ("second", "two", 0)] {
            Mock::given(method("POST"))
                .and(path("/agents/jira"))
                .and(body_partial_json(json!({ "question": question })))
                .respond_with(
                    ResponseTemplate::new(200)
                        .set_body_json(json!({ "answer": answer }))
                        .set_delay(Duration::from_millis(delay)),
                )
                .mount(&server)
                .await;
        }

        let agents = client(&server);
        let queries = vec!["first".to_string(), "second".to_string()];
        let results = agents.query_agent(&queries, "q", &[], "jira_ag").await.unwrap();
        let answers: Vec<_> = results.iter().map(|r| r.text().unwrap()).collect();
        assert_eq!(answers, vec!["one", "two"]);
    }

    #[tokio::test]
    async fn test_failed_task_and_unknown_agent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"taskId": "t-2"})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/agents/jira/tasks/t-2"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"status": "failed", "error": "agent crashed"})),
            )
            .mount(&server)
            .await;

        let agents = client(&server);
        let err = agents
            .query_agent(&["q".to_string()], "q", &[], "jira_ag")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("agent crashed"));

        let err = agents
            .query_agent(&["q".to_string()], "q", &[], "conf_ag")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "not_configured");
    }

    #[test]
    fn test_parse_answer_without_text_flags_no_data() {
        let result = parse_answer(&json!({"status": "complete"}), "jira_ag");
        assert_eq!(result.text(), Some(NO_ANSWER_TEXT));
        assert_eq!(result.found_specific_data, Some(false));
        assert_eq!(result.title.as_deref(), Some("Results from jira_ag"));
    }

    #[test]
    fn test_wire_history_drops_metadata() {
        let history = vec![
            ChatTurn::user("hi"),
            ChatTurn::metadata("{}"),
            ChatTurn::assistant("hello"),
        ];
        let wire = wire_history(&history);
        assert_eq!(wire.len(), 2);
        assert_eq!(wire[1], json!({"role": "assistant", "content": "hello"}));
    }
}

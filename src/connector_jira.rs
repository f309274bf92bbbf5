//! Jira Cloud connector.
//!
//! Implements [`IssueSearchClient`] over the Jira REST API v3 with HTTP
//! Basic authentication (account email + API token).
//!
//! # Configuration
//!
//! ```toml
//! [jira]
//! base_url = "https://example.atlassian.net"
//! email_env = "JIRA_EMAIL"
//! token_env = "JIRA_API_TOKEN"
//! search_limit = 50
//! default_project = "ZSEE"
//! ```
//!
//! # Endpoints
//!
//! | Operation | Request |
//! |-----------|---------|
//! | search | `GET /rest/api/3/search?jql=..&startAt=..&maxResults=..` |
//! | single issue | `GET /rest/api/3/issue/{key}?expand=..` |
//! | comments | `GET /rest/api/3/issue/{key}/comment?startAt=..` |
//!
//! Search and comment listing follow `startAt` pagination until the
//! requested number of records is collected or the server runs out.
//! A 404 on a single issue is `Ok(None)`.

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, info};

use knowledge_router_core::error::RetrievalError;
use knowledge_router_core::models::{collect_adf_text, Comment, IssueRecord};

use crate::config::JiraConfig;
use crate::http::{basic_auth_header, build_client, env_credential, send_json};
use crate::traits::{IssueFetchOptions, IssueSearchClient};

/// Jira caps `maxResults` at 100 per page.
const MAX_PAGE_SIZE: usize = 100;

/// All navigable fields, so dot paths like `fields.components.name`
/// resolve during analytics.
const SEARCH_FIELDS: &str = "*navigable";

pub struct JiraClient {
    client: Client,
    base_url: String,
    auth: String,
    max_retries: u32,
    page_size: usize,
}

impl JiraClient {
    /// Create a client, reading credentials from the environment
    /// variables named in `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if either credential variable is unset.
    pub fn new(config: &JiraConfig) -> Result<Self> {
        let email = env_credential(&config.email_env)?;
        let token = env_credential(&config.token_env)?;
        Self::with_credentials(config, &email, &token)
    }

    pub fn with_credentials(config: &JiraConfig, email: &str, token: &str) -> Result<Self> {
        Ok(Self {
            client: build_client(config.timeout_secs)?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            auth: basic_auth_header(email, token),
            max_retries: config.max_retries,
            page_size: config.search_limit.clamp(1, MAX_PAGE_SIZE),
        })
    }

    async fn get(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Option<Value>, RetrievalError> {
        let url = format!("{}{}", self.base_url, path);
        send_json("jira", self.max_retries, || {
            self.client
                .get(&url)
                .header("Authorization", &self.auth)
                .header("Accept", "application/json")
                .query(query)
        })
        .await
    }
}

#[async_trait]
impl IssueSearchClient for JiraClient {
    async fn search_issues(
        &self,
        jql: &str,
        max_results: usize,
    ) -> Result<Vec<IssueRecord>, RetrievalError> {
        let mut issues = Vec::new();

        while issues.len() < max_results {
            let page = (max_results - issues.len()).min(self.page_size);
            let query = [
                ("jql", jql.to_string()),
                ("startAt", issues.len().to_string()),
                ("maxResults", page.to_string()),
                ("fields", SEARCH_FIELDS.to_string()),
            ];
            let body = self
                .get("/rest/api/3/search", &query)
                .await?
                .ok_or_else(|| RetrievalError::InvalidResponse("jira search returned 404".into()))?;

            let batch = parse_issues(&body)?;
            let total = body.get("total").and_then(Value::as_u64).map(|t| t as usize);
            let received = batch.len();
            issues.extend(batch);

            if received == 0 || total.is_some_and(|t| issues.len() >= t) {
                break;
            }
        }

        issues.truncate(max_results);
        info!(jql, count = issues.len(), "jira search complete");
        Ok(issues)
    }

    async fn get_issue(
        &self,
        key: &str,
        options: &IssueFetchOptions,
    ) -> Result<Option<IssueRecord>, RetrievalError> {
        let mut query = Vec::new();
        if !options.expand.is_empty() {
            query.push(("expand", options.expand.join(",")));
        }
        if let Some(fields) = &options.fields {
            query.push(("fields", fields.join(",")));
        }

        let path = format!("/rest/api/3/issue/{}", key);
        match self.get(&path, &query).await? {
            Some(body) => Ok(Some(parse_issue(&body)?)),
            None => {
                debug!(key, "jira issue not found");
                Ok(None)
            }
        }
    }

    async fn fetch_all_comments(&self, key: &str) -> Result<Vec<Comment>, RetrievalError> {
        let path = format!("/rest/api/3/issue/{}/comment", key);
        let mut comments = Vec::new();

        loop {
            let query = [
                ("startAt", comments.len().to_string()),
                ("maxResults", MAX_PAGE_SIZE.to_string()),
            ];
            let body = match self.get(&path, &query).await? {
                Some(body) => body,
                None => return Ok(Vec::new()),
            };

            let page: Vec<Comment> = body
                .get("comments")
                .and_then(Value::as_array)
                .map(|items| items.iter().map(parse_comment).collect())
                .unwrap_or_default();
            let total = body.get("total").and_then(Value::as_u64).map(|t| t as usize);
            let received = page.len();
            comments.extend(page);

            if received == 0 || total.map_or(true, |t| comments.len() >= t) {
                break;
            }
        }

        Ok(comments)
    }

    fn issue_url(&self, key: &str) -> Option<String> {
        Some(format!("{}/browse/{}", self.base_url, key))
    }
}

fn parse_issues(body: &Value) -> Result<Vec<IssueRecord>, RetrievalError> {
    body.get("issues")
        .and_then(Value::as_array)
        .ok_or_else(|| RetrievalError::InvalidResponse("jira search: missing issues array".into()))?
        .iter()
        .map(parse_issue)
        .collect()
}

fn parse_issue(value: &Value) -> Result<IssueRecord, RetrievalError> {
    let key = value
        .get("key")
        .and_then(Value::as_str)
        .ok_or_else(|| RetrievalError::InvalidResponse("jira issue: missing key".into()))?;
    Ok(IssueRecord {
        key: key.to_string(),
        id: value.get("id").and_then(Value::as_str).map(str::to_string),
        fields: value.get("fields").cloned().unwrap_or(Value::Null),
    })
}

fn parse_comment(value: &Value) -> Comment {
    let body = match value.get("body") {
        Some(Value::String(s)) => s.clone(),
        Some(adf @ Value::Object(_)) => {
            let mut out = String::new();
            collect_adf_text(adf, &mut out);
            out.trim().to_string()
        }
        _ => String::new(),
    };
    Comment {
        author: value
            .pointer("/author/displayName")
            .and_then(Value::as_str)
            .map(str::to_string),
        created: value.get("created").and_then(Value::as_str).map(str::to_string),
        body,
    }
}

//! Confluence connector.
//!
//! Implements [`PageSearchClient`] over the Confluence REST API with HTTP
//! Basic authentication.
//!
//! # Configuration
//!
//! ```toml
//! [confluence]
//! base_url = "https://example.atlassian.net/wiki"
//! email_env = "CONFLUENCE_EMAIL"
//! token_env = "CONFLUENCE_API_TOKEN"
//! search_limit = 10
//! ```
//!
//! Free-text search runs the CQL query
//! `siteSearch ~ "<query>" order by lastModified desc`, expanding
//! `body.view`, `version` and `space`. Page bodies are HTML; they are
//! reduced to a plain-text summary of at most [`SUMMARY_CHARS`] characters.

use anyhow::Result;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use serde_json::Value;
use tracing::info;

use knowledge_router_core::error::RetrievalError;
use knowledge_router_core::models::PageResult;

use crate::config::ConfluenceConfig;
use crate::http::{basic_auth_header, build_client, env_credential, send_json};
use crate::traits::PageSearchClient;

pub const SUMMARY_CHARS: usize = 500;

const EXPAND: &str = "body.view,version,space";

static TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").expect("tag pattern"));
static SPACES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("whitespace pattern"));

pub struct ConfluenceClient {
    client: Client,
    base_url: String,
    auth: String,
    max_retries: u32,
}

impl ConfluenceClient {
    /// # Errors
    ///
    /// Returns an error if either credential variable is unset.
    pub fn new(config: &ConfluenceConfig) -> Result<Self> {
        let email = env_credential(&config.email_env)?;
        let token = env_credential(&config.token_env)?;
        Self::with_credentials(config, &email, &token)
    }

    pub fn with_credentials(config: &ConfluenceConfig, email: &str, token: &str) -> Result<Self> {
        Ok(Self {
            client: build_client(config.timeout_secs)?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            auth: basic_auth_header(email, token),
            max_retries: config.max_retries,
        })
    }

    async fn get(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Option<Value>, RetrievalError> {
        let url = format!("{}{}", self.base_url, path);
        send_json("confluence", self.max_retries, || {
            self.client
                .get(&url)
                .header("Authorization", &self.auth)
                .header("Accept", "application/json")
                .query(query)
        })
        .await
    }

    fn to_page(&self, value: &Value) -> Result<PageResult, RetrievalError> {
        let id = match value.get("id") {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => {
                return Err(RetrievalError::InvalidResponse(
                    "confluence page: missing id".into(),
                ))
            }
        };
        let title = value
            .get("title")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let summary = value
            .pointer("/body/view/value")
            .and_then(Value::as_str)
            .map(|html| summarize_html(html, SUMMARY_CHARS))
            .filter(|s| !s.is_empty())
            .or_else(|| {
                value
                    .get("excerpt")
                    .and_then(Value::as_str)
                    .map(|s| summarize_html(s, SUMMARY_CHARS))
            })
            .unwrap_or_else(|| title.clone());

        let url = match value.pointer("/_links/webui").and_then(Value::as_str) {
            Some(webui) => format!("{}{}", self.base_url, webui),
            None => format!("{}/pages/{}", self.base_url, id),
        };

        Ok(PageResult {
            id,
            title,
            summary,
            url: Some(url),
            space: value
                .pointer("/space/key")
                .and_then(Value::as_str)
                .map(str::to_string),
            version: value.pointer("/version/number").and_then(Value::as_i64),
            last_modified: value
                .pointer("/version/when")
                .and_then(Value::as_str)
                .map(str::to_string),
        })
    }
}

#[async_trait]
impl PageSearchClient for ConfluenceClient {
    async fn search_pages(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<PageResult>, RetrievalError> {
        let params = [
            ("cql", site_search_cql(query)),
            ("limit", max_results.to_string()),
            ("expand", EXPAND.to_string()),
        ];
        let body = self
            .get("/rest/api/content/search", &params)
            .await?
            .unwrap_or(Value::Null);

        let pages = body
            .get("results")
            .and_then(Value::as_array)
            .map(|items| items.iter().map(|p| self.to_page(p)).collect())
            .unwrap_or_else(|| Ok(Vec::new()))?;

        info!(query, count = pages.len(), "confluence search complete");
        Ok(pages)
    }

    async fn get_page_by_id(&self, id: &str) -> Result<Option<PageResult>, RetrievalError> {
        let path = format!("/rest/api/content/{}", id);
        match self.get(&path, &[("expand", EXPAND.to_string())]).await? {
            Some(body) => Ok(Some(self.to_page(&body)?)),
            None => Ok(None),
        }
    }
}

/// CQL full-text query, newest first.
pub fn site_search_cql(query: &str) -> String {
    format!(
        "siteSearch ~ \"{}\" order by lastModified desc",
        query.replace('\\', "\\\\").replace('"', "\\\"")
    )
}

/// Strip tags, collapse whitespace and cut to `max_chars` characters.
pub fn summarize_html(html: &str, max_chars: usize) -> String {
    let text = TAG.replace_all(html, " ");
    let text = SPACES.replace_all(&text, " ");
    let text = text.trim();
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(max_chars).collect();
    cut.push_str("...");
    cut
}

//! Shared HTTP plumbing for the remote collaborators.
//!
//! Every connector sends its requests through [`send_json`], which applies
//! the same retry policy:
//!
//! - HTTP 429 or 5xx → retry with exponential backoff (1s, 2s, 4s, ...)
//! - HTTP 404 → `Ok(None)`; "not found" is not an error
//! - other HTTP 4xx → fail immediately
//! - network error or timeout → retry
//!
//! Exhausted retries map to [`RetrievalError::Transient`]; non-retryable
//! statuses and undecodable bodies map to
//! [`RetrievalError::InvalidResponse`].

use std::time::Duration;

use base64::Engine;
use reqwest::{Client, RequestBuilder};
use serde_json::Value;
use tracing::{debug, warn};

use knowledge_router_core::error::RetrievalError;

/// Build a `reqwest` client with a per-request timeout.
pub fn build_client(timeout_secs: u64) -> anyhow::Result<Client> {
    Ok(Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()?)
}

/// `Authorization` header value for HTTP Basic auth.
pub fn basic_auth_header(user: &str, token: &str) -> String {
    let encoded = base64::engine::general_purpose::STANDARD.encode(format!("{}:{}", user, token));
    format!("Basic {}", encoded)
}

/// Read a credential from the environment variable named in config.
pub fn env_credential(var: &str) -> anyhow::Result<String> {
    std::env::var(var).map_err(|_| anyhow::anyhow!("{} environment variable not set", var))
}

/// Send a request built by `build` and decode the JSON body.
///
/// `build` is called once per attempt, since a `RequestBuilder` is
/// consumed by `send`. `label` names the collaborator in errors and logs.
pub async fn send_json<F>(
    label: &str,
    max_retries: u32,
    build: F,
) -> Result<Option<Value>, RetrievalError>
where
    F: Fn() -> RequestBuilder,
{
    let mut last_err = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            let delay = Duration::from_secs(1 << (attempt - 1).min(5));
            debug!(label, attempt, ?delay, "retrying request");
            tokio::time::sleep(delay).await;
        }

        match build().send().await {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    let body = response.text().await.map_err(|e| {
                        RetrievalError::InvalidResponse(format!("{}: {}", label, e))
                    })?;
                    if body.trim().is_empty() {
                        return Ok(Some(Value::Null));
                    }
                    let json: Value = serde_json::from_str(&body).map_err(|e| {
                        RetrievalError::InvalidResponse(format!("{}: {}", label, e))
                    })?;
                    return Ok(Some(json));
                }

                if status.as_u16() == 404 {
                    return Ok(None);
                }

                let body_text = response.text().await.unwrap_or_default();
                if status.as_u16() == 429 || status.is_server_error() {
                    warn!(label, %status, attempt, "retryable HTTP error");
                    last_err = Some(RetrievalError::Transient(format!(
                        "{} error {}: {}",
                        label, status, body_text
                    )));
                    continue;
                }

                return Err(RetrievalError::InvalidResponse(format!(
                    "{} error {}: {}",
                    label, status, body_text
                )));
            }
            Err(e) => {
                warn!(label, attempt, error = %e, "request failed");
                last_err = Some(RetrievalError::Transient(format!("{}: {}", label, e)));
                continue;
            }
        }
    }

    Err(last_err
        .unwrap_or_else(|| RetrievalError::Transient(format!("{} failed after retries", label))))
}

//! OpenAI-compatible chat completion client.
//!
//! Implements [`SynthesisLlmClient`] by calling `POST {base_url}/chat/completions`
//! with a system and a user message and returning
//! `choices[0].message.content`. Requests go through the shared retry
//! policy in [`crate::http`].
//!
//! # Configuration
//!
//! ```toml
//! [synthesis]
//! provider = "openai"
//! model = "gpt-4o-mini"
//! api_key_env = "OPENAI_API_KEY"
//! ```

use anyhow::{bail, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::debug;

use knowledge_router_core::error::RetrievalError;

use crate::config::SynthesisConfig;
use crate::http::{build_client, env_credential, send_json};
use crate::traits::{CompletionOptions, SynthesisLlmClient};

pub struct OpenAiSynthesisClient {
    client: Client,
    url: String,
    api_key: String,
    model: String,
    max_retries: u32,
}

impl OpenAiSynthesisClient {
    /// # Errors
    ///
    /// Returns an error if `synthesis.model` is unset or the API key
    /// variable is missing from the environment.
    pub fn new(config: &SynthesisConfig) -> Result<Self> {
        let api_key = env_credential(&config.api_key_env)?;
        Self::with_api_key(config, &api_key)
    }

    pub fn with_api_key(config: &SynthesisConfig, api_key: &str) -> Result<Self> {
        let model = match &config.model {
            Some(m) if !m.trim().is_empty() => m.clone(),
            _ => bail!("synthesis.model required for the openai provider"),
        };
        Ok(Self {
            client: build_client(config.timeout_secs)?,
            url: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key: api_key.to_string(),
            model,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl SynthesisLlmClient for OpenAiSynthesisClient {
    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        options: &CompletionOptions,
    ) -> Result<String, RetrievalError> {
        let model = options.model.as_deref().unwrap_or(&self.model);
        let mut body = json!({
            "model": model,
            "messages": [
                {"role": "system", "content": system_prompt},
                {"role": "user", "content": user_prompt},
            ],
            "temperature": options.temperature,
            "max_tokens": options.max_tokens,
        });
        if options.json {
            body["response_format"] = json!({"type": "json_object"});
        }

        let response = send_json("openai", self.max_retries, || {
            self.client
                .post(&self.url)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .json(&body)
        })
        .await?
        .ok_or_else(|| RetrievalError::InvalidResponse("openai: endpoint not found".into()))?;

        let content = parse_completion(&response)?;
        debug!(model, chars = content.len(), "completion received");
        Ok(content)
    }
}

/// Extract `choices[0].message.content`.
fn parse_completion(response: &Value) -> Result<String, RetrievalError> {
    response
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .map(|s| s.trim().to_string())
        .ok_or_else(|| {
            RetrievalError::InvalidResponse(
                "Invalid OpenAI response: missing choices[0].message.content".into(),
            )
        })
}

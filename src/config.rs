use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

use knowledge_router_core::intent::{IntentOptions, DEFAULT_KNOWN_PROJECTS};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub jira: Option<JiraConfig>,
    #[serde(default)]
    pub confluence: Option<ConfluenceConfig>,
    #[serde(default)]
    pub agents: AgentsConfig,
    #[serde(default)]
    pub synthesis: SynthesisConfig,
    #[serde(default)]
    pub query_analysis: QueryAnalysisConfig,
    #[serde(default)]
    pub orchestration: OrchestrationConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct JiraConfig {
    pub base_url: String,
    #[serde(default = "default_jira_email_env")]
    pub email_env: String,
    #[serde(default = "default_jira_token_env")]
    pub token_env: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_jira_search_limit")]
    pub search_limit: usize,
    /// Project assumed by analytics when a query names none.
    #[serde(default)]
    pub default_project: Option<String>,
    /// Lowercase project/issue-area names recognised as bare words.
    #[serde(default = "default_known_projects")]
    pub known_projects: Vec<String>,
}

fn default_jira_email_env() -> String {
    "JIRA_EMAIL".to_string()
}
fn default_jira_token_env() -> String {
    "JIRA_API_TOKEN".to_string()
}
fn default_jira_search_limit() -> usize {
    50
}
fn default_known_projects() -> Vec<String> {
    DEFAULT_KNOWN_PROJECTS.iter().map(|s| s.to_string()).collect()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ConfluenceConfig {
    pub base_url: String,
    #[serde(default = "default_confluence_email_env")]
    pub email_env: String,
    #[serde(default = "default_confluence_token_env")]
    pub token_env: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_confluence_search_limit")]
    pub search_limit: usize,
}

fn default_confluence_email_env() -> String {
    "CONFLUENCE_EMAIL".to_string()
}
fn default_confluence_token_env() -> String {
    "CONFLUENCE_API_TOKEN".to_string()
}
fn default_confluence_search_limit() -> usize {
    10
}

fn default_timeout_secs() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct AgentsConfig {
    #[serde(default = "default_jira_agent")]
    pub jira_agent: String,
    #[serde(default = "default_confluence_agent")]
    pub confluence_agent: String,
    #[serde(default = "default_default_agent")]
    pub default_agent: String,
    #[serde(default)]
    pub endpoints: BTreeMap<String, AgentEndpointConfig>,
}

impl Default for AgentsConfig {
    fn default() -> Self {
        Self {
            jira_agent: default_jira_agent(),
            confluence_agent: default_confluence_agent(),
            default_agent: default_default_agent(),
            endpoints: BTreeMap::new(),
        }
    }
}

fn default_jira_agent() -> String {
    "jira_ag".to_string()
}
fn default_confluence_agent() -> String {
    "conf_ag".to_string()
}
fn default_default_agent() -> String {
    "default_agent".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct AgentEndpointConfig {
    pub url: String,
    #[serde(default)]
    pub token_env: Option<String>,
    #[serde(default = "default_agent_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_max_poll_attempts")]
    pub max_poll_attempts: u32,
}

fn default_agent_timeout_secs() -> u64 {
    60
}
fn default_poll_interval_ms() -> u64 {
    1000
}
fn default_max_poll_attempts() -> u32 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct SynthesisConfig {
    #[serde(default = "default_synthesis_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_synthesis_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_max_words")]
    pub max_words: usize,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            model: None,
            base_url: default_openai_base_url(),
            api_key_env: default_api_key_env(),
            temperature: 0.3,
            max_tokens: 1200,
            timeout_secs: 60,
            max_retries: 3,
            max_words: 800,
        }
    }
}

fn default_synthesis_provider() -> String {
    "disabled".to_string()
}
fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}
fn default_temperature() -> f64 {
    0.3
}
fn default_max_tokens() -> u32 {
    1200
}
fn default_synthesis_timeout_secs() -> u64 {
    60
}
fn default_max_words() -> usize {
    800
}

impl SynthesisConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct QueryAnalysisConfig {
    #[serde(default = "default_query_analysis_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
}

impl Default for QueryAnalysisConfig {
    fn default() -> Self {
        Self {
            provider: default_query_analysis_provider(),
            model: None,
        }
    }
}

fn default_query_analysis_provider() -> String {
    "stub".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct OrchestrationConfig {
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_fallback_confidence_threshold")]
    pub fallback_confidence_threshold: f64,
    #[serde(default = "default_direct_search_limit")]
    pub direct_search_limit: usize,
}

impl Default for OrchestrationConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_request_timeout_secs(),
            fallback_confidence_threshold: default_fallback_confidence_threshold(),
            direct_search_limit: default_direct_search_limit(),
        }
    }
}

fn default_request_timeout_secs() -> u64 {
    120
}
fn default_fallback_confidence_threshold() -> f64 {
    0.6
}
fn default_direct_search_limit() -> usize {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_cache_ttl_secs")]
    pub ttl_secs: u64,
    #[serde(default = "default_cache_max_entries")]
    pub max_entries: usize,
    #[serde(default = "default_cache_min_confidence")]
    pub min_confidence: f64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            ttl_secs: default_cache_ttl_secs(),
            max_entries: default_cache_max_entries(),
            min_confidence: default_cache_min_confidence(),
        }
    }
}

fn default_cache_ttl_secs() -> u64 {
    3600
}
fn default_cache_max_entries() -> usize {
    500
}
fn default_cache_min_confidence() -> f64 {
    0.9
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7341".to_string()
}

impl Config {
    /// A configuration with every section at its default: no Jira, no
    /// Confluence, no agent endpoints, stub query analysis, and synthesis
    /// disabled.
    pub fn minimal() -> Self {
        Self::default()
    }

    /// Classification knobs taken from `[jira]`.
    pub fn intent_options(&self) -> IntentOptions {
        match &self.jira {
            Some(jira) => IntentOptions {
                default_project: jira.default_project.clone(),
                known_projects: jira.known_projects.iter().map(|p| p.to_lowercase()).collect(),
            },
            None => IntentOptions::default(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config = parse_config(&content)?;
    validate(&config)?;
    Ok(config)
}

pub fn parse_config(content: &str) -> Result<Config> {
    toml::from_str(content).with_context(|| "Failed to parse config file")
}

pub fn validate(config: &Config) -> Result<()> {
    // Validate orchestration
    let threshold = config.orchestration.fallback_confidence_threshold;
    if !(0.0..=1.0).contains(&threshold) {
        anyhow::bail!("orchestration.fallback_confidence_threshold must be in [0.0, 1.0]");
    }
    if config.orchestration.request_timeout_secs == 0 {
        anyhow::bail!("orchestration.request_timeout_secs must be > 0");
    }
    if config.orchestration.direct_search_limit == 0 {
        anyhow::bail!("orchestration.direct_search_limit must be > 0");
    }

    // Validate cache
    if !(0.0..=1.0).contains(&config.cache.min_confidence) {
        anyhow::bail!("cache.min_confidence must be in [0.0, 1.0]");
    }
    if config.cache.enabled && config.cache.max_entries == 0 {
        anyhow::bail!("cache.max_entries must be > 0 when the cache is enabled");
    }

    // Validate connectors
    if let Some(jira) = &config.jira {
        if jira.base_url.trim().is_empty() {
            anyhow::bail!("jira.base_url must not be empty");
        }
        if jira.search_limit == 0 {
            anyhow::bail!("jira.search_limit must be > 0");
        }
    }
    if let Some(confluence) = &config.confluence {
        if confluence.base_url.trim().is_empty() {
            anyhow::bail!("confluence.base_url must not be empty");
        }
        if confluence.search_limit == 0 {
            anyhow::bail!("confluence.search_limit must be > 0");
        }
    }

    // Validate agents
    let agents = &config.agents;
    if !agents.endpoints.is_empty() {
        for id in [&agents.jira_agent, &agents.confluence_agent, &agents.default_agent] {
            if !agents.endpoints.contains_key(id) {
                anyhow::bail!(
                    "agents: '{}' is referenced but has no [agents.endpoints.{}] entry",
                    id,
                    id
                );
            }
        }
    }
    for (id, endpoint) in &agents.endpoints {
        if endpoint.url.trim().is_empty() {
            anyhow::bail!("agents.endpoints.{}.url must not be empty", id);
        }
        if endpoint.max_poll_attempts == 0 {
            anyhow::bail!("agents.endpoints.{}.max_poll_attempts must be > 0", id);
        }
    }

    // Validate synthesis
    match config.synthesis.provider.as_str() {
        "disabled" => {}
        "openai" => {
            if config.synthesis.model.is_none() {
                anyhow::bail!("synthesis.model must be specified when provider is 'openai'");
            }
        }
        other => anyhow::bail!(
            "Unknown synthesis provider: '{}'. Must be disabled or openai.",
            other
        ),
    }
    if config.synthesis.max_words == 0 {
        anyhow::bail!("synthesis.max_words must be > 0");
    }

    // Validate query analysis
    match config.query_analysis.provider.as_str() {
        "stub" => {}
        "openai" => {
            if !config.synthesis.is_enabled() {
                anyhow::bail!(
                    "query_analysis.provider = 'openai' requires synthesis.provider = 'openai'"
                );
            }
        }
        other => anyhow::bail!(
            "Unknown query_analysis provider: '{}'. Must be stub or openai.",
            other
        ),
    }

    Ok(())
}

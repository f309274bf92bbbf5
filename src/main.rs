//! # knowledge-router CLI (`kr`)
//!
//! Answers questions from Jira, Confluence, and hosted LLM agents, and
//! serves the same pipeline over HTTP.
//!
//! ## Usage
//!
//! ```bash
//! kr --config ./config/router.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `kr ask "<query>"` | Run one query and print the answer |
//! | `kr route "<query>"` | Show how a query would be routed, without calling anything |
//! | `kr serve` | Start the HTTP API |
//!
//! ## Examples
//!
//! ```bash
//! # Ticket summary straight from the analytics service
//! kr ask "summary of JIRA-123"
//!
//! # Full envelope, forcing Confluence
//! kr ask "onboarding checklist" --source confluence --json
//!
//! # Continue a conversation saved as a JSON array of turns
//! kr ask "Audio" --history ./history.json
//!
//! # Inspect routing only
//! kr route "top 10 issues in project AUDIO this month"
//! ```

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use knowledge_router::config::{self, Config};
use knowledge_router::orchestrator::{Orchestrator, QueryOptions, QueryRequest};
use knowledge_router::server;
use knowledge_router::traits::Collaborators;
use knowledge_router_core::models::{ChatTurn, TargetSystem};

/// knowledge-router: multi-source question answering over Jira,
/// Confluence, and hosted LLM agents.
#[derive(Parser)]
#[command(name = "kr", version, about = "Multi-source question answering over Jira, Confluence, and LLM agents")]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/router.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one query through the full pipeline.
    Ask {
        query: String,

        /// JSON file holding the conversation so far (an array of turns).
        #[arg(long)]
        history: Option<PathBuf>,

        /// Skip keyword detection and query this system.
        #[arg(long, value_enum)]
        source: Option<SourceArg>,

        /// Agent id for queries that name no system.
        #[arg(long)]
        agent: Option<String>,

        /// Log file to analyze before answering.
        #[arg(long)]
        log: Option<PathBuf>,

        /// Print the full response envelope as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Print the target system, analytics intent, and routing decision for
    /// a query. Calls no collaborator.
    Route {
        query: String,

        #[arg(long)]
        history: Option<PathBuf>,
    },

    /// Start the HTTP API on `[server].bind`.
    Serve,
}

#[derive(Clone, Copy, ValueEnum)]
enum SourceArg {
    Jira,
    Confluence,
}

impl From<SourceArg> for TargetSystem {
    fn from(arg: SourceArg) -> Self {
        match arg {
            SourceArg::Jira => TargetSystem::Jira,
            SourceArg::Confluence => TargetSystem::Confluence,
        }
    }
}

fn load_history(path: Option<&Path>) -> anyhow::Result<Vec<ChatTurn>> {
    let Some(path) = path else {
        return Ok(Vec::new());
    };
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read history file: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse history file: {}", path.display()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Ask {
            query,
            history,
            source,
            agent,
            log,
            json,
        } => {
            let cfg = config::load_config(&cli.config)?;
            let mut request = QueryRequest::new(query)
                .with_history(load_history(history.as_deref())?)
                .with_options(QueryOptions {
                    requested_data_source: source.map(TargetSystem::from),
                    agent_id: agent,
                });
            if let Some(path) = log {
                let log_input = std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read log file: {}", path.display()))?;
                request = request.with_log_input(log_input);
            }

            let orchestrator = Orchestrator::from_config(&cfg)?;
            let envelope = orchestrator.handle_query(&request).await;

            if json {
                println!("{}", serde_json::to_string_pretty(&envelope)?);
            } else {
                println!("{}", envelope.final_answer);
                if !envelope.result.sources.is_empty() {
                    println!();
                    println!("Sources:");
                    for (i, source) in envelope.result.sources.iter().enumerate() {
                        match &source.url {
                            Some(url) => println!("  {}. {} ({})", i + 1, source.title, url),
                            None => println!("  {}. {}", i + 1, source.title),
                        }
                    }
                }
                if let Some(turn) = &envelope.clarification {
                    println!();
                    println!("Append to history before replying: {}", serde_json::to_string(turn)?);
                }
            }

            if !envelope.success {
                bail!("query failed");
            }
        }
        Commands::Route { query, history } => {
            let cfg = config::load_config(&cli.config).unwrap_or_else(|_| Config::minimal());
            let history = load_history(history.as_deref())?;
            let plan = Orchestrator::new(&cfg, Collaborators::disabled()).plan(&query, &history);
            println!("{}", serde_json::to_string_pretty(&plan)?);
        }
        Commands::Serve => {
            let cfg = config::load_config(&cli.config)?;
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}

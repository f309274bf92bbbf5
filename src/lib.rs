//! # knowledge-router
//!
//! Multi-source question answering over Jira, Confluence, and hosted LLM
//! agents.
//!
//! A query is classified by target system, routed to the Jira analytics
//! service, a direct search API, or an agent (with the other as fallback),
//! and the retrieved context is synthesized into one Markdown answer.
//! Pure decision logic lives in `knowledge-router-core`. This crate holds
//! the async services, the HTTP collaborators, and the surfaces.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────────┐   ┌────────────────────┐
//! │ CLI / HTTP   │──▶│   Orchestrator   │──▶│ Jira analytics     │
//! │ (kr, /ask)   │   │ route + fallback │   │ direct Jira / Conf │
//! └──────────────┘   └────────┬─────────┘   │ LLM agents         │
//!                             │             └────────────────────┘
//!                             ▼
//!                    ┌──────────────────┐
//!                    │ AnswerSynthesizer│──▶ ResponseEnvelope
//!                    └──────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! kr ask "summary of JIRA-123"
//! kr route "MTTR for AUDIO last month"
//! kr serve
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`traits`] | Collaborator traits and the disabled defaults |
//! | [`http`] | Shared retrying HTTP client |
//! | [`connector_jira`] | Jira REST search client |
//! | [`connector_confluence`] | Confluence REST search client |
//! | [`connector_agent`] | Hosted LLM agent client |
//! | [`llm`] | Chat-completion client for synthesis and query analysis |
//! | [`log_analysis`] | Log pre-analysis |
//! | [`query_analysis`] | Query analysis (search queries, related questions) |
//! | [`analytics_service`] | Jira analytics operations |
//! | [`synthesis`] | Answer synthesis |
//! | [`envelope`] | Response envelope |
//! | [`orchestrator`] | Routing, fallback, and the request pipeline |
//! | [`cache`] | Response cache |
//! | [`tasks`] | Background query tasks |
//! | [`server`] | HTTP API |

pub mod analytics_service;
pub mod cache;
pub mod config;
pub mod connector_agent;
pub mod connector_confluence;
pub mod connector_jira;
pub mod envelope;
pub mod http;
pub mod llm;
pub mod log_analysis;
pub mod orchestrator;
pub mod query_analysis;
pub mod server;
pub mod synthesis;
pub mod tasks;
pub mod traits;

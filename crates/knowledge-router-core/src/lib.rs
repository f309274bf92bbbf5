//! # Knowledge Router Core
//!
//! Pure decision logic for Knowledge Router: data models, text heuristics,
//! routing, fallback evaluation, analytics intent classification, and the
//! Jira analytics engine.
//!
//! This crate performs no I/O. It has no tokio, HTTP client, or filesystem
//! dependency, so every function here can be exercised with plain values.
//! The async services that call external systems live in the
//! `knowledge-router` application crate and delegate to this crate for
//! every decision they make.

pub mod analytics;
pub mod error;
pub mod fallback;
pub mod heuristics;
pub mod intent;
pub mod jql;
pub mod models;
pub mod routing;

//! Collaborator error taxonomy.
//!
//! External calls distinguish "nothing was there" from "the call failed".
//! Routing treats both as fallback triggers; the distinction exists so
//! logs and analytics responses can say which one happened.

use thiserror::Error;

/// Error returned by any retrieval collaborator (issue search, page search,
/// LLM agent, synthesis model, log analyzer).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RetrievalError {
    /// The requested entity does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Timeout, network failure, rate limiting, or a 5xx response.
    #[error("transient failure: {0}")]
    Transient(String),

    /// The collaborator has no configuration (missing section or credentials).
    #[error("not configured: {0}")]
    NotConfigured(String),

    /// The collaborator answered with something that could not be decoded,
    /// or rejected the request with a non-retryable status.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl RetrievalError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, RetrievalError::NotFound(_))
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, RetrievalError::Transient(_))
    }

    /// Short machine-readable tag used in logs and error records.
    pub fn kind(&self) -> &'static str {
        match self {
            RetrievalError::NotFound(_) => "not_found",
            RetrievalError::Transient(_) => "transient",
            RetrievalError::NotConfigured(_) => "not_configured",
            RetrievalError::InvalidResponse(_) => "invalid_response",
        }
    }
}

impl From<serde_json::Error> for RetrievalError {
    fn from(err: serde_json::Error) -> Self {
        RetrievalError::InvalidResponse(err.to_string())
    }
}

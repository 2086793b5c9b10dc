//! Error taxonomy shared by every agentmesh crate.

use thiserror::Error;

/// The error kinds a delegation round must be able to classify and recover
/// from without letting an exception escape into the parent's conversation.
#[derive(Error, Debug)]
pub enum Error {
    /// Engine reported throttling. Retried with backoff before surfacing.
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// Transient network/IO failure. Retried with a shorter backoff than
    /// `RateLimited`.
    #[error("transient error: {0}")]
    Transient(String),

    /// A tool raised while executing. Surfaced to the LLM as an error
    /// string rather than propagated.
    #[error("tool error: {name} - {message}")]
    ToolFailure { name: String, message: String },

    /// A delegated child's round failed even after one reassignment.
    #[error("delegation failed for {agent}: {reason}")]
    DelegationFailure { agent: String, reason: String },

    /// Invalid setup discovered before any round executes: duplicate
    /// function names, unknown tool, bad depth configuration, etc. Fatal.
    #[error("configuration error: {0}")]
    ConfigurationError(String),

    /// The round was cancelled by the caller. No retry.
    #[error("cancelled")]
    Cancelled,

    #[error("llm error: {provider} - {message}")]
    LlmError { provider: String, message: String },

    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("json error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn tool_failure(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ToolFailure { name: name.into(), message: message.into() }
    }

    pub fn delegation_failure(agent: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::DelegationFailure { agent: agent.into(), reason: reason.into() }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::ConfigurationError(message.into())
    }

    pub fn llm_error(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::LlmError { provider: provider.into(), message: message.into() }
    }

    /// Whether this error kind should be retried by a caller with backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::RateLimited(_) | Error::Transient(_))
    }
}

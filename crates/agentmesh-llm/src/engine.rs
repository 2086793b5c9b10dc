//! The LLM transport abstraction the delegation core consumes.

use crate::types::{LlmMessage, LlmRequest, StreamDelta};
use futures::Stream;
use std::pin::Pin;
use tokio_util::sync::CancellationToken;

pub type EngineResult<T> = Result<T, EngineError>;

/// Coarse classification an `EngineError` carries so callers can decide
/// whether to retry without depending on a concrete engine implementation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    RateLimited,
    Transient,
    Other,
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("request failed: {0}")]
    RequestFailed(String),

    #[error("authentication failed: {0}")]
    AuthFailed(String),

    #[error("rate limited: retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("context overflow: {0}")]
    ContextOverflow(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("stream error: {0}")]
    StreamError(String),

    #[error("cancelled")]
    Cancelled,

    #[error("network error: {0}")]
    NetworkError(#[from] reqwest::Error),
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::RateLimited { .. } => ErrorKind::RateLimited,
            EngineError::NetworkError(_) | EngineError::StreamError(_) => ErrorKind::Transient,
            _ => ErrorKind::Other,
        }
    }
}

/// Stream of deltas for one assistant turn.
pub type EngineStream = Pin<Box<dyn Stream<Item = EngineResult<StreamDelta>> + Send>>;

/// The transport abstraction `agentmesh-agent` drives a round through.
/// Concrete engines (e.g. `AnthropicEngine`) implement this; the delegation
/// core never depends on a specific vendor's wire format.
#[async_trait::async_trait]
pub trait Engine: Send + Sync {
    fn name(&self) -> &str;
    fn models(&self) -> &[&str];

    fn supports_model(&self, model: &str) -> bool {
        self.models().iter().any(|m| *m == model || model.starts_with(m))
    }

    /// The largest prompt, in tokens, this engine will accept for the given
    /// model. Used to decide when the prompt must be truncated.
    fn max_context_size(&self, model: &str) -> usize;

    /// Estimated token length of one message, used for budgeting the prompt
    /// before it is sent.
    fn message_token_len(&self, message: &LlmMessage) -> usize;

    /// Stream a completion. If `cancel` fires, the underlying connection is
    /// dropped and the stream yields `EngineError::Cancelled`.
    async fn stream(
        &self,
        request: LlmRequest,
        cancel: Option<CancellationToken>,
    ) -> EngineResult<EngineStream>;
}

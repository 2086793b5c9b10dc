//! agentmesh-llm - engine adapters with streaming support.

pub mod anthropic;
pub mod engine;
pub mod types;

pub use anthropic::AnthropicEngine;
pub use engine::{Engine, EngineError, EngineResult, EngineStream, ErrorKind};
pub use types::*;

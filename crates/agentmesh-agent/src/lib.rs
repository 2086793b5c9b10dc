//! agentmesh-agent — the agent tree, delegation scheme, and process-scope
//! runtime that together form the hierarchical delegation core.

pub mod agent;
pub mod context;
pub mod delegation;
pub mod runtime;

pub use agent::{Agent, AgentEvent, TurnEvent};
pub use context::{CharCounter, ContextManager, TokenCounter};
pub use delegation::DelegationScheme;
pub use runtime::{AppRuntime, RuntimeConfig, ToolConfig};

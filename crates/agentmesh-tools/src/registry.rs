//! Tool trait and registry.
//!
//! Each tool is a self-contained module implementing the Tool trait.
//! Tools can be added/removed by editing the tools/ directory and
//! the default registry constructors in lib.rs.

use agentmesh_core::{Error, Result, ToolDefinition};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Clone, Debug)]
pub enum ToolResult {
    Text(String),
    Json(Value),
    Error(String),
}

impl ToolResult {
    pub fn text(s: impl Into<String>) -> Self { Self::Text(s.into()) }
    pub fn error(s: impl Into<String>) -> Self { Self::Error(s.into()) }

    pub fn to_content_string(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::Json(v) => serde_json::to_string_pretty(v).unwrap_or_default(),
            Self::Error(e) => format!("Error: {}", e),
        }
    }

    pub fn is_error(&self) -> bool { matches!(self, Self::Error(_)) }
}

/// The Tool trait — implement this to add a new AI-callable capability.
///
/// Each tool is a standalone unit registered with a ToolRegistry and exposes
/// exactly one AI function named after the tool. Lifecycle hooks default to
/// no-ops for stateless tools; tools that hold a resource (an index, a
/// connection) override `setup`/`cleanup`/`close`.
#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    /// Unique tool name (e.g. "bash", "read", "glob"). Also the AI function name.
    fn name(&self) -> &str;

    /// Human-readable description sent to the LLM.
    fn description(&self) -> &str;

    /// System prompt fragment for this tool (injected into agent context).
    fn prompt(&self) -> &str { "" }

    /// JSON Schema for input parameters.
    fn input_schema(&self) -> Value;

    /// Whether this tool only reads state (no side effects).
    fn is_read_only(&self) -> bool { false }

    /// Whether this tool is currently enabled.
    fn is_enabled(&self) -> bool { true }

    /// Called once after registration, before the owning agent's first round.
    /// Tools needing async initialization (index building, connecting)
    /// override this; the default is a no-op.
    async fn setup(&self) -> Result<()> { Ok(()) }

    /// Called when the owning agent's round finishes; releases any
    /// per-round state. Default is a no-op.
    async fn cleanup(&self) -> Result<()> { Ok(()) }

    /// Called when the owning agent terminates; releases any held resource.
    /// Default is a no-op.
    async fn close(&self) -> Result<()> { Ok(()) }

    /// Execute the tool with the given arguments.
    async fn execute(&self, args: Value) -> ToolResult;

    /// Execute with cancellation support. Default: race execute() against cancellation.
    /// Tools that manage child processes (like BashTool) should override this to
    /// kill the process on cancellation.
    async fn execute_cancellable(&self, args: Value, cancel: CancellationToken) -> ToolResult {
        tokio::select! {
            result = self.execute(args) => result,
            _ = cancel.cancelled() => ToolResult::text("[cancelled]"),
        }
    }

    /// This tool's single AI function descriptor.
    fn to_tool_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            input_schema: self.input_schema(),
        }
    }
}

pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl Default for ToolRegistry {
    fn default() -> Self { Self::new() }
}

impl ToolRegistry {
    pub fn new() -> Self { Self { tools: HashMap::new() } }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: impl Tool + 'static) {
        let name = tool.name().to_string();
        self.tools.insert(name, Arc::new(tool));
    }

    /// Register a tool, failing if its name collides with one already
    /// present. Used when composing an Agent's final function map, where a
    /// collision is a fatal configuration error rather than a silent
    /// overwrite.
    pub fn try_register(&mut self, tool: impl Tool + 'static) -> Result<()> {
        let name = tool.name().to_string();
        if self.tools.contains_key(&name) {
            return Err(Error::config(format!("duplicate tool name: {}", name)));
        }
        self.tools.insert(name, Arc::new(tool));
        Ok(())
    }

    /// Remove a tool by name.
    pub fn remove(&mut self, name: &str) -> bool {
        self.tools.remove(name).is_some()
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub async fn execute(&self, name: &str, args: Value) -> ToolResult {
        match self.tools.get(name) {
            Some(tool) if tool.is_enabled() => tool.execute(args).await,
            Some(_) => ToolResult::Error(format!("Tool '{}' is disabled", name)),
            None => ToolResult::Error(format!("Tool not found: {}", name)),
        }
    }

    /// Execute a tool with cancellation support.
    pub async fn execute_cancellable(&self, name: &str, args: Value, cancel: CancellationToken) -> ToolResult {
        match self.tools.get(name) {
            Some(tool) if tool.is_enabled() => tool.execute_cancellable(args, cancel).await,
            Some(_) => ToolResult::Error(format!("Tool '{}' is disabled", name)),
            None => ToolResult::Error(format!("Tool not found: {}", name)),
        }
    }

    /// Runs `setup()` on every enabled tool concurrently.
    pub async fn setup_all(&self) -> Result<()> {
        let futures = self.tools.values().filter(|t| t.is_enabled()).map(|t| t.setup());
        futures::future::try_join_all(futures).await?;
        Ok(())
    }

    /// Runs `cleanup()` then `close()` on every tool, collecting but not
    /// short-circuiting on individual errors so every tool gets a chance to
    /// release its resources.
    pub async fn close_all(&self) {
        for tool in self.tools.values() {
            if let Err(e) = tool.cleanup().await {
                tracing::warn!(tool = tool.name(), error = %e, "tool cleanup failed");
            }
        }
        for tool in self.tools.values() {
            if let Err(e) = tool.close().await {
                tracing::warn!(tool = tool.name(), error = %e, "tool close failed");
            }
        }
    }

    /// Get AI function definitions for all enabled tools.
    pub fn get_definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().filter(|t| t.is_enabled()).map(|t| t.to_tool_definition()).collect()
    }

    /// Get system prompt fragments from all enabled tools.
    pub fn combined_prompts(&self) -> String {
        self.tools
            .values()
            .filter(|t| t.is_enabled())
            .map(|t| t.prompt())
            .filter(|p| !p.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    pub fn list(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }

    /// List only read-only tools.
    pub fn list_read_only(&self) -> Vec<&str> {
        self.tools.iter().filter(|(_, t)| t.is_read_only()).map(|(k, _)| k.as_str()).collect()
    }
}

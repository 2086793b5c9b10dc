//! agentmesh-tools — modular AI-function tool implementations.
//!
//! Each tool is a self-contained file in src/tools/ implementing the `Tool`
//! trait from `registry.rs`. To add a tool: create the file, implement
//! `Tool`, register it below. To remove one: delete the file, remove it from
//! `tools/mod.rs` and the registry constructors below.

pub mod registry;
pub mod tools;

pub use registry::{Tool, ToolRegistry, ToolResult};

use std::path::Path;

/// Create the default tool registry with all builtin reference tools.
pub fn create_default_registry(workspace_root: impl AsRef<Path>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    let root = workspace_root.as_ref();

    // --- Read-only tools ---
    registry.register(tools::read::ReadTool::new(root));
    registry.register(tools::glob::GlobTool::new(root));
    registry.register(tools::grep::GrepTool::new(root));

    // --- Mutation tools ---
    registry.register(tools::write::WriteTool::new(root));
    registry.register(tools::edit::EditTool::new(root));
    registry.register(tools::bash::BashTool::new(root));

    registry
}

/// Create a policy-scoped tool registry.
///
/// Only registers tools whose names appear in `allowed_tools`. If a tool
/// isn't registered, the LLM never sees it and can't call it.
pub fn create_policy_registry(workspace_root: impl AsRef<Path>, allowed_tools: &[&str]) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    let root = workspace_root.as_ref();

    for name in allowed_tools {
        match *name {
            "read" => registry.register(tools::read::ReadTool::new(root)),
            "glob" => registry.register(tools::glob::GlobTool::new(root)),
            "grep" => registry.register(tools::grep::GrepTool::new(root)),
            "write" => registry.register(tools::write::WriteTool::new(root)),
            "edit" => registry.register(tools::edit::EditTool::new(root)),
            "bash" => registry.register(tools::bash::BashTool::new(root)),
            _ => tracing::warn!("Unknown tool in policy: {}", name),
        }
    }

    registry
}

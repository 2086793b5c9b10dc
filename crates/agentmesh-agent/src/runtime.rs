//! AppRuntime: the process-scope container holding configuration, the
//! agent arena, the event bus, the namer, and the global task log.

use crate::agent::Agent;
use crate::delegation::DelegationScheme;
use agentmesh_core::{AgentId, AgentName, Error, Event, EventBus, EventListener, Message, Namer, Result, RunState, TaskLog};
use agentmesh_llm::Engine;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Weak};
use tokio::sync::OnceCell;

/// Per-tool inclusion policy, keyed by tool name in [`RuntimeConfig::tool_configs`].
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ToolConfig {
    /// Include this tool for every non-root delegate agent.
    #[serde(default)]
    pub always_include: bool,
    /// Include this tool for the root agent regardless of `root_has_tools`.
    #[serde(default)]
    pub always_include_root: bool,
    /// Opaque construction parameters, reserved for tool kinds that need
    /// more than a workspace root (not consumed by the reference tools).
    #[serde(default)]
    pub kwargs: HashMap<String, serde_json::Value>,
}

/// Plain, serde-deserializable runtime configuration. Credentials live in
/// the `Engine` handles passed separately to [`AppRuntime::new`], never in
/// this struct, so it can be loaded straight from a checked-in JSON/TOML
/// file without risk of leaking a key.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub tool_configs: HashMap<String, ToolConfig>,
    #[serde(default)]
    pub root_has_tools: bool,
    #[serde(default = "default_true")]
    pub delegation_enabled: bool,
    #[serde(default = "default_max_depth")]
    pub max_delegation_depth: usize,
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: usize,
    #[serde(default = "default_semaphore_capacity")]
    pub request_semaphore_capacity: usize,
    #[serde(default = "default_root_prompt")]
    pub root_system_prompt: String,
    #[serde(default = "default_delegate_prompt")]
    pub delegate_system_prompt: String,
    #[serde(default = "default_model")]
    pub default_model: String,
    #[serde(default = "default_workspace_root")]
    pub workspace_root: PathBuf,
}

fn default_true() -> bool { true }
fn default_max_depth() -> usize { 4 }
fn default_retry_attempts() -> usize { 10 }
fn default_semaphore_capacity() -> usize { 3 }
fn default_model() -> String { "claude-3-5-sonnet-20241022".to_string() }
fn default_workspace_root() -> PathBuf { std::env::current_dir().unwrap_or_default() }
fn default_root_prompt() -> String {
    "You are {name}, the root agent. The current time is {time}. Decompose the user's request and delegate sub-tasks to helpers when useful.".to_string()
}
fn default_delegate_prompt() -> String {
    "You are {name}, a helper agent spawned at {time} to complete a specific sub-task. Stay focused on the instructions you were given.".to_string()
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            tool_configs: HashMap::new(),
            root_has_tools: true,
            delegation_enabled: true,
            max_delegation_depth: default_max_depth(),
            retry_attempts: default_retry_attempts(),
            request_semaphore_capacity: default_semaphore_capacity(),
            root_system_prompt: default_root_prompt(),
            delegate_system_prompt: default_delegate_prompt(),
            default_model: default_model(),
            workspace_root: default_workspace_root(),
        }
    }
}

/// Process-scope container: configuration, event bus, namer, global task
/// log, and the agent arena. Owns the root agent's lifecycle.
pub struct AppRuntime {
    config: RuntimeConfig,
    event_bus: Arc<EventBus>,
    namer: Namer,
    task_log: Arc<TaskLog>,
    arena: DashMap<AgentId, Arc<Agent>>,
    root_id: OnceCell<AgentId>,
    root_engine: Arc<dyn Engine>,
    delegate_engine: Arc<dyn Engine>,
    self_ref: Weak<AppRuntime>,
}

impl AppRuntime {
    pub fn new(config: RuntimeConfig, root_engine: Arc<dyn Engine>, delegate_engine: Arc<dyn Engine>) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            config,
            event_bus: Arc::new(EventBus::new()),
            namer: Namer::new(),
            task_log: Arc::new(TaskLog::new()),
            arena: DashMap::new(),
            root_id: OnceCell::new(),
            root_engine,
            delegate_engine,
            self_ref: weak.clone(),
        })
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn task_log(&self) -> &Arc<TaskLog> {
        &self.task_log
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    pub fn add_listener(&self, listener: Arc<dyn EventListener>) -> u64 {
        self.event_bus.add_listener(listener)
    }

    pub fn get_agent(&self, id: AgentId) -> Option<Arc<Agent>> {
        self.arena.get(&id).map(|e| e.clone())
    }

    /// Lazily constructs and returns the root agent, creating it on first call.
    pub async fn ensure_root(&self) -> Result<Arc<Agent>> {
        if let Some(id) = self.root_id.get() {
            return Ok(self.get_agent(*id).expect("root agent missing from arena"));
        }
        let agent = self.build_agent(None, 0, None).await?;
        self.arena.insert(agent.id, agent.clone());
        let _ = self.root_id.set(agent.id);
        self.dispatch_created(agent.id, None, agent.name.as_str(), 0);
        Ok(agent)
    }

    /// Creates and registers a new child agent under `parent_id`.
    pub async fn create_delegate(&self, parent_id: AgentId, instructions: &str) -> Result<Arc<Agent>> {
        let parent = self
            .get_agent(parent_id)
            .ok_or_else(|| Error::Internal("delegating parent missing from arena".to_string()))?;
        let depth = parent.depth + 1;
        let agent = self.build_agent(Some(parent_id), depth, Some(instructions.to_string())).await?;
        self.arena.insert(agent.id, agent.clone());
        parent.add_child(agent.id).await;
        self.dispatch_created(agent.id, Some(parent_id), agent.name.as_str(), depth);
        Ok(agent)
    }

    async fn build_agent(&self, parent: Option<AgentId>, depth: usize, task_description: Option<String>) -> Result<Arc<Agent>> {
        let is_root = parent.is_none();
        let id = AgentId::new();
        let name = AgentName::new(self.namer.get_name());

        let allowed = self.allowed_tool_names(is_root);
        let allowed_refs: Vec<&str> = allowed.iter().map(|s| s.as_str()).collect();
        let tools = agentmesh_tools::create_policy_registry(&self.config.workspace_root, &allowed_refs);
        tools.setup_all().await?;

        let delegator = if self.config.delegation_enabled {
            Some(DelegationScheme::new(
                self.self_ref.clone(),
                id,
                depth,
                self.config.max_delegation_depth,
                self.config.request_semaphore_capacity,
            ))
        } else {
            None
        };

        let (engine, system_prompt) = if is_root {
            (self.root_engine.clone(), self.config.root_system_prompt.clone())
        } else {
            (self.delegate_engine.clone(), self.config.delegate_system_prompt.clone())
        };

        Agent::new(
            id,
            name,
            depth,
            parent,
            task_description,
            engine,
            self.config.default_model.clone(),
            system_prompt,
            tools,
            delegator,
            self.self_ref.clone(),
            self.config.retry_attempts,
        )
    }

    fn allowed_tool_names(&self, is_root: bool) -> Vec<String> {
        self.config
            .tool_configs
            .iter()
            .filter(|(_, cfg)| {
                if is_root {
                    cfg.always_include_root || (cfg.always_include && self.config.root_has_tools)
                } else {
                    cfg.always_include
                }
            })
            .map(|(name, _)| name.clone())
            .collect()
    }

    fn dispatch_created(&self, agent_id: AgentId, parent_id: Option<AgentId>, name: &str, depth: usize) {
        let seq = self.event_bus.next_seq();
        self.event_bus.dispatch(Event::AgentCreated { seq, agent_id, parent_id, name: name.to_string(), depth });
    }

    /// `parent_message_idx` is the parent's chat-history length at the
    /// moment of delegation; the child has no messages yet.
    pub(crate) fn dispatch_delegated(&self, parent_id: AgentId, child_id: AgentId, parent_message_idx: usize, instructions: &str) {
        let seq = self.event_bus.next_seq();
        self.event_bus.dispatch(Event::AgentDelegated {
            seq,
            parent_id,
            child_id,
            parent_message_idx,
            child_message_idx: 0,
            instructions: instructions.to_string(),
        });
    }

    pub(crate) fn dispatch_message(&self, agent_id: AgentId, message: Message) {
        let seq = self.event_bus.next_seq();
        self.event_bus.dispatch(Event::AgentMessage { seq, agent_id, message });
    }

    pub(crate) fn dispatch_state_change(&self, agent_id: AgentId, old: RunState, new: RunState) {
        let seq = self.event_bus.next_seq();
        self.event_bus.dispatch(Event::AgentStateChange { seq, agent_id, old, new });
    }

    pub(crate) fn dispatch_tool_call(&self, agent_id: AgentId, name: &str, is_error: bool) {
        let seq = self.event_bus.next_seq();
        self.event_bus.dispatch(Event::ToolCall { seq, agent_id, name: name.to_string(), is_error });
    }

    /// Walks the agent arena post-order from the root, calling `cleanup()`
    /// then `close()` on every agent exactly once.
    pub async fn close(&self) {
        if let Some(root_id) = self.root_id.get().copied() {
            self.close_subtree(root_id).await;
        }
    }

    fn close_subtree<'a>(&'a self, id: AgentId) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send + 'a>> {
        Box::pin(async move {
            let Some(agent) = self.get_agent(id) else { return };
            let children = agent.children_snapshot().await;
            for child_id in children {
                self.close_subtree(child_id).await;
            }
            if let Err(e) = agent.cleanup().await {
                tracing::warn!(agent = %agent.name, error = %e, "agent cleanup failed");
            }
            if let Err(e) = agent.close().await {
                tracing::warn!(agent = %agent.name, error = %e, "agent close failed");
            }
        })
    }
}

//! `delegate`/`wait`: the two AI functions that let an LLM spawn and
//! coordinate child agents.

use crate::agent::Agent;
use crate::runtime::AppRuntime;
use agentmesh_core::{AgentId, RunState, TaskStatus, ToolDefinition};
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Weak;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock, Semaphore};
use tokio::task::JoinHandle;

const AUTO_AGGREGATE_THRESHOLD: usize = 4;
const ANTI_MONOLITH_THRESHOLD: f64 = 80.0;
const RATE_LIMIT_RETRY_DELAYS_MS: [u64; 2] = [2000, 4000];
const HELPER_JOIN_SEPARATOR: &str = "\n\n=====\n\n";

/// Per-agent owner of the `delegate`/`wait` AI functions. Tracks live
/// helpers, their in-flight futures, and the fan-out/depth/dedup rules that
/// bound delegation.
pub struct DelegationScheme {
    runtime: Weak<AppRuntime>,
    owner_id: AgentId,
    owner_depth: usize,
    max_delegation_depth: usize,
    semaphore: Arc<Semaphore>,
    helpers: DashMap<String, AgentId>,
    futures: Mutex<HashMap<String, JoinHandle<String>>>,
    auto_waiting: Mutex<Option<JoinHandle<String>>>,
    last_user_message: RwLock<String>,
}

impl DelegationScheme {
    pub fn new(
        runtime: Weak<AppRuntime>,
        owner_id: AgentId,
        owner_depth: usize,
        max_delegation_depth: usize,
        semaphore_capacity: usize,
    ) -> Arc<Self> {
        Arc::new(Self {
            runtime,
            owner_id,
            owner_depth,
            max_delegation_depth,
            semaphore: Arc::new(Semaphore::new(semaphore_capacity.max(1))),
            helpers: DashMap::new(),
            futures: Mutex::new(HashMap::new()),
            auto_waiting: Mutex::new(None),
            last_user_message: RwLock::new(String::new()),
        })
    }

    pub fn function_definitions() -> Vec<ToolDefinition> {
        vec![
            ToolDefinition {
                name: "delegate".to_string(),
                description: "Spawn a helper agent to work on a sub-task concurrently. Returns immediately with a status line; use wait to collect results.".to_string(),
                input_schema: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "instructions": {"type": "string", "description": "The sub-task to hand off"},
                        "who": {"type": "string", "description": "Name of an existing idle helper to reuse, if continuing its conversation"},
                    },
                    "required": ["instructions"],
                }),
            },
            ToolDefinition {
                name: "wait".to_string(),
                description: "Block until one or more helpers finish and return their results.".to_string(),
                input_schema: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "until": {"type": "string", "description": "A helper name, \"next\", or \"all\""},
                    },
                    "required": ["until"],
                }),
            },
        ]
    }

    pub async fn set_last_user_message(&self, message: &str) {
        *self.last_user_message.write().await = message.to_string();
    }

    pub fn live_helper_count(&self) -> usize {
        self.helpers.len()
    }

    pub async fn delegate(self: &Arc<Self>, args: serde_json::Value) -> String {
        let instructions = match args.get("instructions").and_then(|v| v.as_str()) {
            Some(s) if !s.trim().is_empty() => s.to_string(),
            _ => return "error: 'instructions' is required".to_string(),
        };
        let who = args.get("who").and_then(|v| v.as_str()).map(|s| s.to_string());

        let runtime = match self.runtime.upgrade() {
            Some(rt) => rt,
            None => return "error: runtime is no longer available".to_string(),
        };

        // 1. dedup
        if runtime.task_log().is_duplicate(&instructions) {
            return "duplicate task, skipped".to_string();
        }

        // 2. depth limit
        if self.owner_depth >= self.max_delegation_depth {
            return format!(
                "maximum delegation depth ({}) reached; cannot delegate further",
                self.max_delegation_depth
            );
        }

        // 3. auto-aggregate threshold
        {
            let mut auto = self.auto_waiting.lock().await;
            if self.helpers.len() >= AUTO_AGGREGATE_THRESHOLD && auto.is_none() {
                tracing::info!(owner = %self.owner_id, live = self.helpers.len(), "auto-aggregation triggered");
                let scheme = self.clone();
                *auto = Some(tokio::spawn(async move { scheme.auto_wait_all().await }));
            }
        }

        // 4. anti-monolith guard
        {
            let last = self.last_user_message.read().await.clone();
            if !last.is_empty() {
                let score = strsim::normalized_levenshtein(&instructions, &last) * 100.0;
                if score > ANTI_MONOLITH_THRESHOLD {
                    return "this instruction is nearly identical to the overall task; break it into smaller, independent sub-tasks before delegating".to_string();
                }
            }
        }

        // 5. reuse-or-create
        if let Some(who) = &who {
            if let Some(existing) = self.helpers.get(who).map(|e| *e.value()) {
                if self.futures.lock().await.contains_key(who) {
                    return format!("{} is currently busy; wait for it before reassigning more work", who);
                }
                return self.spawn_and_track(runtime, who.clone(), existing, instructions).await;
            }
        }

        let child = match runtime.create_delegate(self.owner_id, &instructions).await {
            Ok(c) => c,
            Err(e) => return format!("error: could not create helper: {}", e),
        };
        let name = child.name.as_str().to_string();
        self.helpers.insert(name.clone(), child.id);
        self.spawn_and_track(runtime, name, child.id, instructions).await
    }

    async fn spawn_and_track(
        self: &Arc<Self>,
        runtime: Arc<AppRuntime>,
        name: String,
        agent_id: AgentId,
        instructions: String,
    ) -> String {
        runtime.task_log().append(name.as_str(), instructions.as_str(), TaskStatus::Assigned);
        let parent_idx = match runtime.get_agent(self.owner_id) {
            Some(owner) => owner.history_len().await,
            None => 0,
        };
        runtime.dispatch_delegated(self.owner_id, agent_id, parent_idx, &instructions);

        let scheme = self.clone();
        let task_name = name.clone();
        let task_instructions = instructions.clone();
        let handle = tokio::spawn(async move {
            scheme.execute_with_recovery(task_name, agent_id, task_instructions).await
        });
        self.futures.lock().await.insert(name.clone(), handle);
        format!("{} is helping you with this request.", name)
    }

    /// Runs the helper's round, retrying on rate limits per the fixed
    /// (2s, 4s) schedule, then attempting exactly one reassignment to a
    /// fresh child if the helper's round still fails.
    async fn execute_with_recovery(self: Arc<Self>, name: String, agent_id: AgentId, instructions: String) -> String {
        let runtime = match self.runtime.upgrade() {
            Some(rt) => rt,
            None => return "runtime is no longer available".to_string(),
        };
        let _permit = match self.semaphore.clone().acquire_owned().await {
            Ok(p) => p,
            Err(_) => return "request semaphore closed".to_string(),
        };
        let child = match runtime.get_agent(agent_id) {
            Some(a) => a,
            None => return "helper agent missing from the tree".to_string(),
        };

        let mut result = child.run_to_completion(&instructions).await;
        for delay_ms in RATE_LIMIT_RETRY_DELAYS_MS {
            match &result {
                Err(agentmesh_core::Error::RateLimited(_)) => {
                    tracing::warn!(agent = %name, delay_ms, "helper rate limited, retrying");
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                    result = child.run_to_completion(&instructions).await;
                }
                _ => break,
            }
        }

        match result {
            Ok(text) => {
                runtime.task_log().set_status(&name, &instructions, TaskStatus::Completed);
                let _ = child.cleanup().await;
                self.helpers.remove(&name);
                text
            }
            Err(e) => {
                let reason = e.to_string();
                runtime.task_log().set_status(&name, &instructions, TaskStatus::Failed(reason.clone()));
                self.helpers.remove(&name);
                tracing::warn!(agent = %name, error = %reason, "helper failed, attempting one reassignment");
                self.reassign_once(&runtime, &instructions, &name, reason).await
            }
        }
    }

    async fn reassign_once(
        &self,
        runtime: &Arc<AppRuntime>,
        instructions: &str,
        failed_name: &str,
        failure_reason: String,
    ) -> String {
        let new_child = match runtime.create_delegate(self.owner_id, instructions).await {
            Ok(c) => c,
            Err(e) => return format!("{} failed ({}) and could not be reassigned: {}", failed_name, failure_reason, e),
        };
        let new_name = new_child.name.as_str().to_string();
        self.helpers.insert(new_name.clone(), new_child.id);
        runtime.task_log().append(new_name.as_str(), instructions, TaskStatus::Reassigned);
        let parent_idx = match runtime.get_agent(self.owner_id) {
            Some(owner) => owner.history_len().await,
            None => 0,
        };
        runtime.dispatch_delegated(self.owner_id, new_child.id, parent_idx, instructions);

        match new_child.run_to_completion(instructions).await {
            Ok(text) => {
                runtime.task_log().set_status(&new_name, instructions, TaskStatus::Completed);
                let _ = new_child.cleanup().await;
                self.helpers.remove(&new_name);
                text
            }
            Err(e2) => {
                let reason2 = e2.to_string();
                runtime.task_log().set_status(&new_name, instructions, TaskStatus::Failed(reason2.clone()));
                self.helpers.remove(&new_name);
                format!("{} failed after reassignment: {}", new_name, reason2)
            }
        }
    }

    pub async fn wait(self: &Arc<Self>, args: serde_json::Value) -> String {
        let until = args.get("until").and_then(|v| v.as_str()).unwrap_or("all").to_string();
        match until.as_str() {
            "next" => self.wait_next().await,
            "all" => self.wait_all_internal().await,
            name => self.wait_named(name).await,
        }
    }

    /// The owning agent, if the runtime is still alive. Used to move the
    /// owner into `Waiting` for the span of a blocking wait.
    async fn owner(&self) -> Option<Arc<Agent>> {
        self.runtime.upgrade()?.get_agent(self.owner_id)
    }

    async fn wait_next(&self) -> String {
        let drained: Vec<(String, JoinHandle<String>)> = {
            let mut guard = self.futures.lock().await;
            guard.drain().collect()
        };
        if drained.is_empty() {
            return "no helpers are currently running".to_string();
        }

        let owner = self.owner().await;
        if let Some(o) = &owner {
            o.set_run_state(RunState::Waiting).await;
        }

        let (names, handles): (Vec<String>, Vec<JoinHandle<String>>) = drained.into_iter().unzip();
        let (result, idx, rest) = futures::future::select_all(handles).await;
        let finished_name = names[idx].clone();
        let text = result.unwrap_or_else(|e| format!("helper task panicked: {}", e));

        let mut guard = self.futures.lock().await;
        let mut rest_iter = rest.into_iter();
        for (i, name) in names.iter().enumerate() {
            if i == idx {
                continue;
            }
            if let Some(handle) = rest_iter.next() {
                guard.insert(name.clone(), handle);
            }
        }
        drop(guard);

        if let Some(o) = &owner {
            o.set_run_state(RunState::Running).await;
        }
        format!("{}:{}", finished_name, text)
    }

    async fn wait_all_internal(&self) -> String {
        let drained: Vec<(String, JoinHandle<String>)> = {
            let mut guard = self.futures.lock().await;
            guard.drain().collect()
        };
        if drained.is_empty() {
            return "no helpers are currently running".to_string();
        }

        let owner = self.owner().await;
        if let Some(o) = &owner {
            o.set_run_state(RunState::Waiting).await;
        }

        let (names, handles): (Vec<String>, Vec<JoinHandle<String>>) = drained.into_iter().unzip();
        let results = futures::future::join_all(handles).await;
        let joined = names
            .into_iter()
            .zip(results)
            .map(|(name, r)| {
                let text = r.unwrap_or_else(|e| format!("helper task panicked: {}", e));
                format!("{}:{}", name, text)
            })
            .collect::<Vec<_>>()
            .join(HELPER_JOIN_SEPARATOR);

        if let Some(o) = &owner {
            o.set_run_state(RunState::Running).await;
        }
        joined
    }

    async fn wait_named(&self, name: &str) -> String {
        let handle = self.futures.lock().await.remove(name);
        let h = match handle {
            Some(h) => h,
            None => return format!("no helper named '{}' is currently running", name),
        };

        let owner = self.owner().await;
        if let Some(o) = &owner {
            o.set_run_state(RunState::Waiting).await;
        }

        let text = h.await.unwrap_or_else(|e| format!("helper task panicked: {}", e));

        if let Some(o) = &owner {
            o.set_run_state(RunState::Running).await;
        }
        format!("{}:{}", name, text)
    }

    async fn auto_wait_all(self: Arc<Self>) -> String {
        let result = self.wait_all_internal().await;
        *self.auto_waiting.lock().await = None;
        result
    }

    /// Cancels every in-flight helper future. Called when the owning
    /// agent's round is cancelled or the agent is shutting down.
    pub async fn cleanup(&self) -> agentmesh_core::Result<()> {
        let mut futures = self.futures.lock().await;
        for (_, handle) in futures.drain() {
            handle.abort();
        }
        drop(futures);
        if let Some(handle) = self.auto_waiting.lock().await.take() {
            handle.abort();
        }
        Ok(())
    }
}

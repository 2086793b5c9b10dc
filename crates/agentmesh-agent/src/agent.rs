//! The Agent tree node: one conversation wrapped around an engine, a set of
//! tools, and an optional delegation scheme.

use crate::context::{ContextManager, TokenCounter};
use crate::delegation::DelegationScheme;
use agentmesh_core::{
    AgentId, AgentName, Error, Event, Message, Result, Role, RunState, ToolDefinition,
};
use agentmesh_llm::{
    AccumulatedToolCall, ContentBlock, Engine, ErrorKind, LlmContent, LlmMessage, LlmRequest,
    LlmTool, StreamDelta,
};
use agentmesh_tools::ToolRegistry;
use futures::{Stream, StreamExt};
use std::pin::Pin;
use std::sync::Arc;
use std::sync::Weak;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::runtime::AppRuntime;

/// One item produced by [`Agent::full_round_stream`]: either a raw token
/// delta from the engine, or a completed message that has just been
/// appended to the chat history and dispatched as an `AgentMessage` event.
#[derive(Clone, Debug)]
pub enum TurnEvent {
    Delta(StreamDelta),
    MessageAppended(Message),
}

struct EngineTokenCounter<'a> {
    engine: &'a dyn Engine,
    model: &'a str,
}

impl<'a> TokenCounter for EngineTokenCounter<'a> {
    fn count(&self, message: &Message) -> usize {
        self.engine.message_token_len(&core_message_to_llm(message, self.model))
    }
}

fn render_system_prompt(template: &str, name: &str) -> String {
    template
        .replace("{name}", name)
        .replace("{time}", &chrono::Local::now().to_rfc3339())
}

fn core_message_to_llm(message: &Message, _model: &str) -> LlmMessage {
    match message.role {
        Role::System => LlmMessage { role: "system".to_string(), content: LlmContent::Text(message.content.clone()) },
        Role::User => LlmMessage { role: "user".to_string(), content: LlmContent::Text(message.content.clone()) },
        Role::Assistant => {
            let calls = message.tool_calls.as_deref().unwrap_or(&[]);
            if calls.is_empty() {
                LlmMessage { role: "assistant".to_string(), content: LlmContent::Text(message.content.clone()) }
            } else {
                let mut blocks = Vec::new();
                if !message.content.is_empty() {
                    blocks.push(ContentBlock::Text { text: message.content.clone() });
                }
                for call in calls {
                    let input = serde_json::from_str(&call.arguments).unwrap_or(serde_json::json!({}));
                    blocks.push(ContentBlock::ToolUse { id: call.id.clone(), name: call.name.clone(), input });
                }
                LlmMessage { role: "assistant".to_string(), content: LlmContent::Blocks(blocks) }
            }
        }
        Role::Tool => {
            let tool_use_id = message.tool_call_id.clone().unwrap_or_default();
            LlmMessage {
                role: "user".to_string(),
                content: LlmContent::Blocks(vec![ContentBlock::ToolResult {
                    tool_use_id,
                    content: message.content.clone(),
                    is_error: None,
                }]),
            }
        }
    }
}

/// A node in the delegation tree: a conversation, an engine handle, a set of
/// tools, and an optional delegator exposing `delegate`/`wait` to the LLM.
pub struct Agent {
    pub id: AgentId,
    pub name: AgentName,
    pub depth: usize,
    pub parent: Option<AgentId>,
    pub task_description: Option<String>,
    children: RwLock<Vec<AgentId>>,
    chat_history: RwLock<Vec<Message>>,
    run_state: RwLock<RunState>,
    system_prompt_template: String,
    model: String,
    engine: Arc<dyn Engine>,
    tools: ToolRegistry,
    delegator: Option<Arc<DelegationScheme>>,
    definitions: Vec<ToolDefinition>,
    runtime: Weak<AppRuntime>,
    retry_attempts: usize,
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("depth", &self.depth)
            .field("parent", &self.parent)
            .field("task_description", &self.task_description)
            .finish_non_exhaustive()
    }
}

impl Agent {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: AgentId,
        name: AgentName,
        depth: usize,
        parent: Option<AgentId>,
        task_description: Option<String>,
        engine: Arc<dyn Engine>,
        model: String,
        system_prompt_template: String,
        tools: ToolRegistry,
        delegator: Option<Arc<DelegationScheme>>,
        runtime: Weak<AppRuntime>,
        retry_attempts: usize,
    ) -> Result<Arc<Self>> {
        let mut names: Vec<String> = tools.list().into_iter().map(|s| s.to_string()).collect();
        if delegator.is_some() {
            names.push("delegate".to_string());
            names.push("wait".to_string());
        }
        let mut seen = std::collections::HashSet::new();
        for n in &names {
            if !seen.insert(n.clone()) {
                return Err(Error::config(format!("duplicate function name: {}", n)));
            }
        }

        let mut definitions = tools.get_definitions();
        if delegator.is_some() {
            definitions.extend(DelegationScheme::function_definitions());
        }

        Ok(Arc::new(Self {
            id,
            name,
            depth,
            parent,
            task_description,
            children: RwLock::new(Vec::new()),
            chat_history: RwLock::new(Vec::new()),
            run_state: RwLock::new(RunState::Idle),
            system_prompt_template,
            model,
            engine,
            tools,
            delegator,
            definitions,
            runtime,
            retry_attempts,
        }))
    }

    pub fn delegator(&self) -> Option<&Arc<DelegationScheme>> {
        self.delegator.as_ref()
    }

    pub async fn add_child(&self, child: AgentId) {
        self.children.write().await.push(child);
    }

    pub async fn children_snapshot(&self) -> Vec<AgentId> {
        self.children.read().await.clone()
    }

    pub async fn history_len(&self) -> usize {
        self.chat_history.read().await.len()
    }

    pub async fn run_state(&self) -> RunState {
        *self.run_state.read().await
    }

    /// Visible within the crate so `DelegationScheme` can move the owning
    /// agent into `Waiting` for the duration of a blocking `wait` call.
    pub(crate) async fn set_run_state(&self, new: RunState) {
        let old = {
            let mut guard = self.run_state.write().await;
            let old = *guard;
            *guard = new;
            old
        };
        if old != new {
            if let Some(rt) = self.runtime.upgrade() {
                rt.dispatch_state_change(self.id, old, new);
            }
        }
    }

    async fn append_and_dispatch(&self, message: Message) {
        self.chat_history.write().await.push(message.clone());
        if let Some(rt) = self.runtime.upgrade() {
            rt.dispatch_message(self.id, message);
        }
    }

    async fn build_prompt(&self) -> (String, Vec<LlmMessage>) {
        let rendered_system = render_system_prompt(&self.system_prompt_template, self.name.as_str());
        let always_included = vec![Message::system(rendered_system.clone())];
        let mut history = self.chat_history.read().await.clone();

        let budget = self.engine.max_context_size(&self.model).saturating_sub(8_192);
        let ctx = ContextManager::new(budget);
        let counter = EngineTokenCounter { engine: self.engine.as_ref(), model: &self.model };
        ctx.truncate_middle(&always_included, &mut history, &counter);

        let llm_messages = history.iter().map(|m| core_message_to_llm(m, &self.model)).collect();
        (rendered_system, llm_messages)
    }

    async fn execute_function(&self, name: &str, args: serde_json::Value) -> (String, bool) {
        match name {
            "delegate" => {
                let text = match &self.delegator {
                    Some(d) => d.delegate(args).await,
                    None => "delegation is not enabled for this agent".to_string(),
                };
                (text, false)
            }
            "wait" => {
                let text = match &self.delegator {
                    Some(d) => d.wait(args).await,
                    None => "delegation is not enabled for this agent".to_string(),
                };
                (text, false)
            }
            _ => {
                let result = self.tools.execute(name, args).await;
                let is_error = result.is_error();
                (result.to_content_string(), is_error)
            }
        }
    }

    /// Produces a lazy stream of token deltas and completed messages for one
    /// user→assistant round, including any interleaved tool calls.
    pub fn full_round_stream<'a>(
        &'a self,
        user_input: &str,
    ) -> Pin<Box<dyn Stream<Item = Result<TurnEvent>> + Send + 'a>> {
        let user_input = user_input.to_string();
        Box::pin(async_stream::stream! {
            self.append_and_dispatch(Message::user(user_input.as_str())).await;
            if let Some(d) = &self.delegator {
                d.set_last_user_message(&user_input).await;
            }
            self.set_run_state(RunState::Running).await;

            loop {
                let (system, messages) = self.build_prompt().await;
                let tools: Vec<LlmTool> = self.definitions.iter().map(LlmTool::from).collect();
                let request = LlmRequest {
                    model: self.model.clone(),
                    messages,
                    tools: if tools.is_empty() { None } else { Some(tools) },
                    max_tokens: Some(8192),
                    temperature: None,
                    system: Some(system),
                };

                let mut rate_limit_attempt = 0usize;
                let stream = loop {
                    match self.engine.stream(request.clone(), None).await {
                        Ok(s) => break s,
                        Err(e) if e.kind() == ErrorKind::RateLimited && rate_limit_attempt < self.retry_attempts => {
                            rate_limit_attempt += 1;
                            let backoff_ms = 1000u64.saturating_mul(1u64 << rate_limit_attempt.min(6));
                            tracing::warn!(agent = %self.name, attempt = rate_limit_attempt, backoff_ms, "engine rate limited, retrying");
                            tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                            continue;
                        }
                        Err(e) if e.kind() == ErrorKind::RateLimited => {
                            // Retry budget exhausted but still rate limited: surface as
                            // RateLimited (not LlmError) so a delegation wrapper around
                            // this round can apply its own fixed retry schedule.
                            yield Err(Error::RateLimited(e.to_string()));
                            self.set_run_state(RunState::Idle).await;
                            return;
                        }
                        Err(e) => {
                            yield Err(Error::llm_error(self.engine.name(), e.to_string()));
                            self.set_run_state(RunState::Idle).await;
                            return;
                        }
                    }
                };

                tokio::pin!(stream);
                let mut text_content = String::new();
                let mut tool_calls: Vec<AccumulatedToolCall> = Vec::new();
                let mut current_tool: Option<AccumulatedToolCall> = None;

                while let Some(delta_result) = stream.next().await {
                    match delta_result {
                        Ok(delta) => {
                            match &delta {
                                StreamDelta::Text(t) => text_content.push_str(t),
                                StreamDelta::ToolCallStart { id, name } => {
                                    current_tool = Some(AccumulatedToolCall { id: id.clone(), name: name.clone(), arguments: String::new() });
                                }
                                StreamDelta::ToolCallDelta { arguments, .. } => {
                                    if let Some(tool) = current_tool.as_mut() {
                                        tool.arguments.push_str(arguments);
                                    }
                                }
                                StreamDelta::ToolCallEnd { .. } => {
                                    if let Some(tool) = current_tool.take() {
                                        tool_calls.push(tool);
                                    }
                                }
                                _ => {}
                            }
                            yield Ok(TurnEvent::Delta(delta));
                        }
                        Err(e) => {
                            yield Err(Error::llm_error(self.engine.name(), e.to_string()));
                            self.set_run_state(RunState::Idle).await;
                            return;
                        }
                    }
                }

                let assistant_message = Message {
                    role: Role::Assistant,
                    content: text_content,
                    tool_calls: if tool_calls.is_empty() {
                        None
                    } else {
                        Some(
                            tool_calls
                                .iter()
                                .map(|t| agentmesh_core::ToolCall { id: t.id.clone(), name: t.name.clone(), arguments: t.arguments.clone() })
                                .collect(),
                        )
                    },
                    tool_call_id: None,
                };
                self.append_and_dispatch(assistant_message.clone()).await;
                yield Ok(TurnEvent::MessageAppended(assistant_message));

                if tool_calls.is_empty() {
                    break;
                }

                for call in tool_calls {
                    let args = call.parse_arguments().unwrap_or(serde_json::json!({}));
                    let (content, is_error) = self.execute_function(&call.name, args).await;
                    if let Some(rt) = self.runtime.upgrade() {
                        rt.dispatch_tool_call(self.id, &call.name, is_error);
                    }
                    let tool_message = Message::tool_result(call.id.clone(), content);
                    self.append_and_dispatch(tool_message.clone()).await;
                    yield Ok(TurnEvent::MessageAppended(tool_message));
                }
            }

            self.set_run_state(RunState::Idle).await;
        })
    }

    /// Drives [`full_round_stream`] to completion and returns the final
    /// assistant message's text. Used by the delegation wrapper, which only
    /// cares about the end result of a helper's round.
    pub async fn run_to_completion(&self, user_input: &str) -> Result<String> {
        let mut stream = self.full_round_stream(user_input);
        let mut final_text = String::new();
        while let Some(item) = stream.next().await {
            if let TurnEvent::MessageAppended(msg) = item? {
                if msg.role == Role::Assistant {
                    final_text = msg.content;
                }
            }
        }
        Ok(final_text)
    }

    /// Releases the delegator's in-flight work. Called before `close()`.
    pub async fn cleanup(&self) -> Result<()> {
        if let Some(d) = &self.delegator {
            d.cleanup().await?;
        }
        Ok(())
    }

    /// Releases every tool's held resources and marks the agent terminated.
    pub async fn close(&self) -> Result<()> {
        self.tools.close_all().await;
        self.set_run_state(RunState::Terminated).await;
        Ok(())
    }
}

// Re-exported for listeners that want to match on the raw event stream
// alongside agent-level state.
pub type AgentEvent = Event;

//! Integration tests for agentmesh-core: types, events, naming, task log, errors.

use agentmesh_core::*;

// ===========================================================================
// AgentId / AgentName
// ===========================================================================

#[test]
fn agent_id_is_unique_and_displayable() {
    let a = AgentId::new();
    let b = AgentId::new();
    assert_ne!(a, b);
    assert!(!format!("{}", a).is_empty());
}

#[test]
fn agent_name_from_str_and_display() {
    let name: AgentName = "crimson-falcon".into();
    assert_eq!(name.as_str(), "crimson-falcon");
    assert_eq!(format!("{}", name), "crimson-falcon");
}

// ===========================================================================
// RunState
// ===========================================================================

#[test]
fn run_state_serde_roundtrip() {
    for state in [RunState::Idle, RunState::Running, RunState::Waiting, RunState::Terminated] {
        let json = serde_json::to_string(&state).unwrap();
        let back: RunState = serde_json::from_str(&json).unwrap();
        assert_eq!(state, back);
    }
}

// ===========================================================================
// Role / Message
// ===========================================================================

#[test]
fn role_serializes_lowercase() {
    assert_eq!(serde_json::to_string(&Role::System).unwrap(), r#""system""#);
    assert_eq!(serde_json::to_string(&Role::User).unwrap(), r#""user""#);
}

#[test]
fn message_constructors() {
    let msg = Message::user("hello");
    assert_eq!(msg.role, Role::User);
    assert!(msg.tool_calls.is_none());

    let result = Message::tool_result("tc-1", "done");
    assert_eq!(result.role, Role::Tool);
    assert_eq!(result.tool_call_id.as_deref(), Some("tc-1"));
}

#[test]
fn message_tool_calls_skipped_when_none() {
    let msg = Message::user("hi");
    let json = serde_json::to_string(&msg).unwrap();
    assert!(!json.contains("tool_calls"));
}

// ===========================================================================
// ToolDefinition
// ===========================================================================

#[test]
fn tool_definition_serde() {
    let td = ToolDefinition {
        name: "delegate".into(),
        description: "Delegate a subtask".into(),
        input_schema: serde_json::json!({"type": "object"}),
    };
    let json = serde_json::to_string(&td).unwrap();
    let back: ToolDefinition = serde_json::from_str(&json).unwrap();
    assert_eq!(back.name, "delegate");
}

// ===========================================================================
// Namer
// ===========================================================================

#[test]
fn namer_issues_unique_names() {
    let namer = Namer::new();
    let a = namer.get_name();
    let b = namer.get_name();
    assert_ne!(a, b);
}

// ===========================================================================
// TaskLog
// ===========================================================================

#[test]
fn task_log_dedup_is_exact_string_match() {
    let log = TaskLog::new();
    log.append("helper-1", "summarize chapter one", TaskStatus::Assigned);
    assert!(log.is_duplicate("summarize chapter one"));
    assert!(!log.is_duplicate("summarize chapter One"));
}

#[test]
fn task_log_status_transitions() {
    let log = TaskLog::new();
    log.append("helper-1", "task", TaskStatus::Assigned);
    log.set_status("helper-1", "task", TaskStatus::Completed);
    let snapshot = log.snapshot();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].status, TaskStatus::Completed);
}

#[test]
fn task_log_to_json_lines() {
    let log = TaskLog::new();
    log.append("helper-1", "task one", TaskStatus::Assigned);
    log.append("helper-2", "task two", TaskStatus::Completed);
    let lines = log.to_json_lines();
    assert_eq!(lines.lines().count(), 2);
}

// ===========================================================================
// EventBus
// ===========================================================================

#[tokio::test]
async fn event_bus_dispatches_to_listeners() {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    let bus = EventBus::new();
    let counter = Arc::new(AtomicUsize::new(0));
    let counter2 = counter.clone();
    bus.add_listener(Arc::new(move |_e: Event| {
        counter2.fetch_add(1, Ordering::Relaxed);
    }));

    let seq = bus.next_seq();
    bus.dispatch(Event::AgentCreated {
        seq,
        agent_id: AgentId::new(),
        parent_id: None,
        name: "root".into(),
        depth: 0,
    });

    tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    assert_eq!(counter.load(Ordering::Relaxed), 1);
}

// ===========================================================================
// Error
// ===========================================================================

#[test]
fn error_kinds_classify_retryability() {
    assert!(Error::RateLimited("x".into()).is_retryable());
    assert!(Error::Transient("x".into()).is_retryable());
    assert!(!Error::ConfigurationError("x".into()).is_retryable());
    assert!(!Error::Cancelled.is_retryable());
}

#[test]
fn error_display_all_variants() {
    let errors: Vec<Error> = vec![
        Error::RateLimited("x".into()),
        Error::Transient("x".into()),
        Error::tool_failure("read", "missing"),
        Error::delegation_failure("helper-1", "exception"),
        Error::config("duplicate function name"),
        Error::Cancelled,
        Error::llm_error("anthropic", "bad request"),
        Error::SessionNotFound("x".into()),
        Error::Internal("x".into()),
    ];
    for e in errors {
        let _ = format!("{}", e);
    }
}

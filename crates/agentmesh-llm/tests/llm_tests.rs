//! Tests for agentmesh-llm: types, engine trait, and real Anthropic API integration

use agentmesh_llm::*;

// ===========================================================================
// LlmRequest
// ===========================================================================

#[test]
fn llm_request_default() {
    let req = LlmRequest::default();
    assert!(req.model.contains("claude"));
    assert!(req.messages.is_empty());
    assert!(req.tools.is_none());
    assert_eq!(req.max_tokens, Some(8192));
    assert!(req.temperature.is_none());
    assert!(req.system.is_none());
}

// ===========================================================================
// LlmContent
// ===========================================================================

#[test]
fn llm_content_from_string() {
    let c: LlmContent = "hello".into();
    match c {
        LlmContent::Text(s) => assert_eq!(s, "hello"),
        _ => panic!("Expected Text"),
    }
}

#[test]
fn llm_content_from_owned_string() {
    let c: LlmContent = String::from("world").into();
    match c {
        LlmContent::Text(s) => assert_eq!(s, "world"),
        _ => panic!("Expected Text"),
    }
}

#[test]
fn llm_content_text_serde() {
    let c = LlmContent::Text("hello".into());
    let json = serde_json::to_string(&c).unwrap();
    assert_eq!(json, r#""hello""#);
    let back: LlmContent = serde_json::from_str(&json).unwrap();
    match back {
        LlmContent::Text(s) => assert_eq!(s, "hello"),
        _ => panic!("Expected Text"),
    }
}

#[test]
fn llm_content_blocks_serde() {
    let c = LlmContent::Blocks(vec![ContentBlock::Text { text: "hi".into() }]);
    let json = serde_json::to_string(&c).unwrap();
    assert!(json.contains(r#""type":"text""#));
    let back: LlmContent = serde_json::from_str(&json).unwrap();
    match back {
        LlmContent::Blocks(blocks) => {
            assert_eq!(blocks.len(), 1);
            match &blocks[0] {
                ContentBlock::Text { text } => assert_eq!(text, "hi"),
                _ => panic!("Expected Text block"),
            }
        }
        _ => panic!("Expected Blocks"),
    }
}

// ===========================================================================
// ContentBlock
// ===========================================================================

#[test]
fn content_block_tool_use_serde() {
    let b = ContentBlock::ToolUse {
        id: "tc-1".into(),
        name: "read".into(),
        input: serde_json::json!({"path": "/tmp/foo"}),
    };
    let json = serde_json::to_string(&b).unwrap();
    assert!(json.contains(r#""type":"tool_use""#));
    let back: ContentBlock = serde_json::from_str(&json).unwrap();
    match back {
        ContentBlock::ToolUse { id, name, input } => {
            assert_eq!(id, "tc-1");
            assert_eq!(name, "read");
            assert_eq!(input["path"], "/tmp/foo");
        }
        _ => panic!("Expected ToolUse"),
    }
}

#[test]
fn content_block_tool_result_no_error_skipped() {
    let b = ContentBlock::ToolResult { tool_use_id: "tc-1".into(), content: "ok".into(), is_error: None };
    let json = serde_json::to_string(&b).unwrap();
    assert!(!json.contains("is_error"));
}

// ===========================================================================
// LlmTool / ToolDefinition conversion
// ===========================================================================

#[test]
fn llm_tool_from_tool_definition() {
    let def = agentmesh_core::ToolDefinition {
        name: "delegate".into(),
        description: "Delegate a subtask".into(),
        input_schema: serde_json::json!({"type": "object"}),
    };
    let tool: LlmTool = (&def).into();
    assert_eq!(tool.name, "delegate");
    assert_eq!(tool.description, "Delegate a subtask");
}

// ===========================================================================
// AccumulatedToolCall
// ===========================================================================

#[test]
fn accumulated_tool_call_parse_valid() {
    let tc = AccumulatedToolCall { id: "tc-1".into(), name: "read".into(), arguments: r#"{"path":"/tmp/foo"}"#.into() };
    let parsed = tc.parse_arguments().unwrap();
    assert_eq!(parsed["path"], "/tmp/foo");
}

#[test]
fn accumulated_tool_call_parse_invalid() {
    let tc = AccumulatedToolCall { id: "tc-1".into(), name: "read".into(), arguments: "not json".into() };
    assert!(tc.parse_arguments().is_err());
}

// ===========================================================================
// Engine trait — AnthropicEngine
// ===========================================================================

fn load_api_key() -> Option<String> {
    let output = std::process::Command::new("bash")
        .args(["-c", "source ~/.keys.sh 2>/dev/null && echo $ANTHROPIC_API_KEY"])
        .output()
        .ok()?;
    let key = String::from_utf8(output.stdout).ok()?.trim().to_string();
    if key.is_empty() { None } else { Some(key) }
}

#[test]
fn anthropic_engine_supports_model() {
    let engine = AnthropicEngine::new("fake");
    assert!(engine.supports_model("claude-3-5-haiku-20241022"));
    assert!(!engine.supports_model("gpt-4"));
}

#[test]
fn anthropic_engine_reports_context_budget() {
    let engine = AnthropicEngine::new("fake");
    assert!(engine.max_context_size("claude-3-5-sonnet-20241022") > 0);
    let msg = LlmMessage { role: "user".into(), content: LlmContent::Text("hello".into()) };
    assert!(engine.message_token_len(&msg) > 0);
}

#[tokio::test]
async fn anthropic_engine_simple_text_response() {
    let api_key = match load_api_key() {
        Some(k) => k,
        None => {
            eprintln!("SKIP: no ANTHROPIC_API_KEY");
            return;
        }
    };

    let engine = AnthropicEngine::new(&api_key);
    assert_eq!(engine.name(), "anthropic");
    assert!(!engine.models().is_empty());

    let request = LlmRequest {
        model: "claude-3-5-haiku-20241022".into(),
        messages: vec![LlmMessage {
            role: "user".into(),
            content: LlmContent::Text("Reply with exactly the word 'pong' and nothing else.".into()),
        }],
        max_tokens: Some(32),
        ..Default::default()
    };

    use futures::StreamExt;
    let stream = engine.stream(request, None).await.expect("API call failed");
    tokio::pin!(stream);

    let mut text = String::new();
    let mut got_done = false;

    while let Some(result) = stream.next().await {
        match result.expect("stream error") {
            StreamDelta::Text(t) => text.push_str(&t),
            StreamDelta::Done { .. } => got_done = true,
            _ => {}
        }
    }

    let lower = text.to_lowercase();
    assert!(lower.contains("pong"), "expected 'pong' in response, got: {}", text);
    assert!(got_done, "never received Done delta");
}

#[tokio::test]
async fn anthropic_engine_bad_key_fails() {
    let engine = AnthropicEngine::new("sk-bad-key-12345");

    let request = LlmRequest {
        model: "claude-3-5-haiku-20241022".into(),
        messages: vec![LlmMessage { role: "user".into(), content: LlmContent::Text("hello".into()) }],
        max_tokens: Some(16),
        ..Default::default()
    };

    let result = engine.stream(request, None).await;
    assert!(result.is_err(), "expected error with bad API key");
}

#[tokio::test]
async fn anthropic_engine_respects_cancellation() {
    let engine = AnthropicEngine::new("sk-irrelevant");
    let token = tokio_util::sync::CancellationToken::new();
    token.cancel();

    let request = LlmRequest {
        model: "claude-3-5-haiku-20241022".into(),
        messages: vec![LlmMessage { role: "user".into(), content: LlmContent::Text("hello".into()) }],
        max_tokens: Some(16),
        ..Default::default()
    };

    let result = engine.stream(request, Some(token)).await;
    assert!(matches!(result, Err(EngineError::Cancelled)));
}

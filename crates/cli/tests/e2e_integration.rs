//! End-to-end integration tests for the aiservices runtime.
//!
//! These tests wire the crates together the way the command-line tool does:
//! configuration from a file, a service built from it, and invocations that
//! run through memory, tools and the event bus.

use std::io::Write;
use std::sync::Arc;

use aiservices_config::ServiceConfig;
use aiservices_core::error::ToolError;
use aiservices_core::event::DomainEvent;
use aiservices_core::memory::ChatMemoryStore;
use aiservices_core::message::{AssistantMessage, ChatMessage, ConversationId, Role, ToolRequest};
use aiservices_core::model::{ModelResponse, TokenUsage};
use aiservices_core::output::ResultShape;
use aiservices_core::tool::{Tool, ToolCatalog};
use aiservices_service::scripted::ScriptedChatModel;
use aiservices_service::{AiService, RequestDescriptor};

// ── Helpers ──────────────────────────────────────────────────────────────

fn text_response(text: &str) -> ModelResponse {
    ModelResponse::new(AssistantMessage::from_text(text)).with_usage(TokenUsage::new(10, 5))
}

fn tool_response(id: &str, name: &str, args: serde_json::Value) -> ModelResponse {
    ModelResponse::new(AssistantMessage::from_tool_requests(vec![ToolRequest::new(
        id,
        name,
        args.to_string(),
    )]))
    .with_usage(TokenUsage::new(8, 2))
}

fn config_file(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "{contents}").unwrap();
    file
}

/// Adds two integers.
struct Calculator;

#[async_trait::async_trait]
impl Tool for Calculator {
    fn name(&self) -> &str {
        "add"
    }

    fn description(&self) -> &str {
        "Add two integers"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "a": { "type": "integer" },
                "b": { "type": "integer" }
            },
            "required": ["a", "b"]
        })
    }

    async fn call(&self, arguments: serde_json::Value) -> Result<String, ToolError> {
        let operand = |key: &str| {
            arguments[key]
                .as_i64()
                .ok_or_else(|| ToolError::InvalidArguments(format!("'{key}' must be an integer")))
        };
        Ok((operand("a")? + operand("b")?).to_string())
    }
}

// ── Config → service ─────────────────────────────────────────────────────

#[tokio::test]
async fn e2e_config_file_drives_service() {
    let file = config_file(
        "default_conversation_id = \"team\"\nmax_sequential_tool_executions = 2\n[memory]\nmax_messages = 6\n",
    );
    let config = ServiceConfig::load_from(file.path()).unwrap();

    let model = Arc::new(ScriptedChatModel::new(vec![text_response("one"), text_response("two")]));
    let service = AiService::from_config(model.clone(), &config).build();
    assert_eq!(service.default_conversation_id().as_str(), "team");

    for text in ["first", "second"] {
        service
            .invoke(RequestDescriptor::builder().user_template(text).build())
            .await
            .unwrap();
    }

    let store = service.memory_store().unwrap();
    assert_eq!(store.conversation_ids().await, vec![ConversationId::from("team")]);
    assert_eq!(store.snapshot(&ConversationId::from("team")).await.len(), 4);
    assert_eq!(model.requests()[1].messages.len(), 3);
}

#[tokio::test]
async fn e2e_config_ceiling_stops_tool_cycles() {
    let file = config_file("max_sequential_tool_executions = 3\n");
    let config = ServiceConfig::load_from(file.path()).unwrap();

    let model = Arc::new(ScriptedChatModel::repeating(tool_response(
        "c",
        "add",
        serde_json::json!({"a": 1, "b": 1}),
    )));
    let mut catalog = ToolCatalog::new();
    catalog.register_tool(Arc::new(Calculator)).unwrap();
    let service = AiService::from_config(model.clone(), &config).with_tools(catalog).build();

    let err = service
        .invoke(RequestDescriptor::builder().user_template("keep adding").build())
        .await
        .unwrap_err();

    assert!(err.to_string().contains("exceeded 3"));
    assert_eq!(model.call_count(), 3);
}

#[tokio::test]
async fn e2e_memory_disabled_by_config() {
    let file = config_file("[memory]\nenabled = false\n");
    let config = ServiceConfig::load_from(file.path()).unwrap();

    let model = Arc::new(ScriptedChatModel::new(vec![text_response("a"), text_response("b")]));
    let service = AiService::from_config(model.clone(), &config).build();
    assert!(service.memory_store().is_none());

    for text in ["x", "y"] {
        service
            .invoke(RequestDescriptor::builder().user_template(text).build())
            .await
            .unwrap();
    }
    assert_eq!(model.requests()[1].messages.len(), 1);
}

#[tokio::test]
async fn e2e_env_overrides_file() {
    let file = config_file("default_conversation_id = \"file\"\n");
    let mut config = ServiceConfig::load_from(file.path()).unwrap();
    config
        .apply_env(|key| (key == aiservices_config::ENV_DEFAULT_CONVERSATION).then(|| "env".to_string()))
        .unwrap();

    let service = AiService::from_config(Arc::new(ScriptedChatModel::new(vec![])), &config).build();
    assert_eq!(service.default_conversation_id().as_str(), "env");
}

// ── Tools and memory ─────────────────────────────────────────────────────

#[tokio::test]
async fn e2e_registered_tool_runs_with_parsed_arguments() {
    let model = Arc::new(ScriptedChatModel::new(vec![
        tool_response("c1", "add", serde_json::json!({"a": 40, "b": 2})),
        text_response("The sum is 42"),
    ]));
    let mut catalog = ToolCatalog::new();
    catalog.register_tool(Arc::new(Calculator)).unwrap();
    assert!(catalog.register_tool(Arc::new(Calculator)).is_err());

    let service = AiService::from_config(model.clone(), &ServiceConfig::default())
        .with_tools(catalog)
        .build();

    let rich = service
        .invoke(
            RequestDescriptor::builder()
                .user_template("What is 40 + 2?")
                .returning(ResultShape::rich(ResultShape::Text))
                .build(),
        )
        .await
        .unwrap()
        .into_rich()
        .unwrap();

    assert_eq!(rich.tool_executions[0].result, "42");
    assert_eq!(rich.token_usage, Some(TokenUsage::new(18, 7)));
    assert_eq!(model.requests()[0].tools[0].name, "add");
}

#[tokio::test]
async fn e2e_window_never_keeps_orphaned_tool_results() {
    let file = config_file("[memory]\nmax_messages = 3\n");
    let config = ServiceConfig::load_from(file.path()).unwrap();

    let model = Arc::new(ScriptedChatModel::new(vec![
        tool_response("c1", "add", serde_json::json!({"a": 1, "b": 2})),
        text_response("3"),
        text_response("ok"),
    ]));
    let mut catalog = ToolCatalog::new();
    catalog.register_tool(Arc::new(Calculator)).unwrap();
    let service = AiService::from_config(model, &config).with_tools(catalog).build();

    for text in ["1 + 2?", "thanks"] {
        service
            .invoke(RequestDescriptor::builder().user_template(text).build())
            .await
            .unwrap();
    }

    let log = service
        .memory_store()
        .unwrap()
        .snapshot(&ConversationId::default())
        .await;
    assert!(log.len() <= 3);
    assert!(!matches!(log.first(), Some(ChatMessage::ToolResult(_))));
    assert_eq!(log.last().map(ChatMessage::text).as_deref(), Some("ok"));
}

#[tokio::test]
async fn e2e_tiny_window_keeps_system_message_and_tool_round_trip() {
    let file = config_file("[memory]\nmax_messages = 2\n");
    let config = ServiceConfig::load_from(file.path()).unwrap();

    let model = Arc::new(ScriptedChatModel::new(vec![
        tool_response("c1", "add", serde_json::json!({"a": 1, "b": 2})),
        text_response("3"),
        text_response("you're welcome"),
    ]));
    let mut catalog = ToolCatalog::new();
    catalog.register_tool(Arc::new(Calculator)).unwrap();
    let service = AiService::from_config(model.clone(), &config).with_tools(catalog).build();

    for text in ["1 + 2?", "thanks"] {
        service
            .invoke(
                RequestDescriptor::builder()
                    .system_message("Use the calculator")
                    .user_template(text)
                    .build(),
            )
            .await
            .unwrap();
    }

    let requests = model.requests();
    let roles = |i: usize| requests[i].messages.iter().map(ChatMessage::role).collect::<Vec<_>>();
    assert_eq!(roles(0), vec![Role::System, Role::User]);
    // The request and its result reach the model together.
    assert_eq!(roles(1), vec![Role::System, Role::Assistant, Role::Tool]);
    assert_eq!(roles(2), vec![Role::System, Role::User]);
    assert_eq!(requests[2].messages[1].text(), "thanks");

    let log = service
        .memory_store()
        .unwrap()
        .snapshot(&ConversationId::default())
        .await;
    let texts: Vec<String> = log.iter().map(ChatMessage::text).collect();
    assert_eq!(texts, vec!["Use the calculator", "you're welcome"]);
}

#[tokio::test]
async fn e2e_removed_conversation_starts_fresh() {
    let model = Arc::new(ScriptedChatModel::new(vec![text_response("a"), text_response("b")]));
    let service = AiService::from_config(model.clone(), &ServiceConfig::default()).build();
    let call = || RequestDescriptor::builder().conversation_id("temp").user_template("hi").build();

    service.invoke(call()).await.unwrap();
    assert!(service.memory_store().unwrap().remove(&ConversationId::from("temp")).await);
    service.invoke(call()).await.unwrap();

    assert_eq!(model.requests()[1].messages.len(), 1);
}

// ── Events ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn e2e_event_bus_reports_invocation() {
    let model = Arc::new(ScriptedChatModel::new(vec![
        tool_response("c1", "add", serde_json::json!({"a": 2, "b": 2})),
        text_response("4"),
    ]));
    let mut catalog = ToolCatalog::new();
    catalog.register_tool(Arc::new(Calculator)).unwrap();
    let service = AiService::from_config(model, &ServiceConfig::default())
        .with_tools(catalog)
        .build();
    let mut rx = service.event_bus().subscribe();

    service
        .invoke(RequestDescriptor::builder().user_template("2 + 2").build())
        .await
        .unwrap();

    let mut kinds = Vec::new();
    while let Ok(event) = rx.try_recv() {
        kinds.push(match event.as_ref() {
            DomainEvent::InvocationStarted { .. } => "started",
            DomainEvent::ModelCalled { .. } => "model",
            DomainEvent::ToolExecuted { success, .. } => {
                assert!(*success);
                "tool"
            }
            DomainEvent::InvocationCompleted { total_tokens, .. } => {
                assert_eq!(*total_tokens, 25);
                "completed"
            }
            DomainEvent::ModerationFlagged { .. } => "flagged",
            DomainEvent::ErrorOccurred { .. } => "error",
        });
    }
    assert_eq!(kinds, vec!["started", "model", "tool", "model", "completed"]);
}

//! JSON-RPC dispatch: lifecycle, batches, error mapping.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};

use mcp_gatekeeper::auth::{AuthMode, Identity};
use mcp_gatekeeper::config::Config;
use mcp_gatekeeper::error::{ToolError, ToolResult};
use mcp_gatekeeper::protocol::{DispatchOutcome, DispatchResult, Dispatcher, SessionStore};
use mcp_gatekeeper::tools::demo::{EchoTool, GreetTool};
use mcp_gatekeeper::tools::{CallToolResult, McpTool, ToolSet};

struct PanickingTool;

#[async_trait::async_trait]
impl McpTool for PanickingTool {
    fn name(&self) -> &'static str {
        "explode"
    }

    fn description(&self) -> &'static str {
        "Always panics"
    }

    fn input_schema(&self) -> Value {
        json!({"type": "object"})
    }

    async fn execute(&self, _input: Value, _identity: &Identity) -> ToolResult<CallToolResult> {
        panic!("secret connection string postgres://admin:hunter2@db");
    }
}

struct FailingTool;

#[async_trait::async_trait]
impl McpTool for FailingTool {
    fn name(&self) -> &'static str {
        "fail"
    }

    fn description(&self) -> &'static str {
        "Always fails internally"
    }

    fn input_schema(&self) -> Value {
        json!({"type": "object"})
    }

    async fn execute(&self, _input: Value, _identity: &Identity) -> ToolResult<CallToolResult> {
        Err(ToolError::internal("db password=hunter2 rejected"))
    }
}

fn dispatcher() -> Dispatcher {
    let config = Config::new("test-server", "1.2.3").with_instructions("Be nice.");
    let tools = ToolSet::new()
        .with(EchoTool)
        .unwrap()
        .with(GreetTool)
        .unwrap()
        .with(PanickingTool)
        .unwrap()
        .with(FailingTool)
        .unwrap();
    let sessions = SessionStore::new(Duration::from_secs(60), 100);
    Dispatcher::new(&config, Arc::new(tools), sessions)
}

fn alice() -> Option<Arc<Identity>> {
    Some(Arc::new(
        Identity::new("alice", AuthMode::Pat, "pat_alice").with_display_name(Some("Alice".into())),
    ))
}

fn single(result: DispatchResult) -> Value {
    match result.outcome {
        DispatchOutcome::Single(response) => serde_json::to_value(response).unwrap(),
        other => panic!("expected a single response, got {other:?}"),
    }
}

async fn initialize(dispatcher: &Dispatcher) -> String {
    let result = dispatcher
        .dispatch_value(
            json!({
                "jsonrpc": "2.0",
                "id": 0,
                "method": "initialize",
                "params": {"protocolVersion": "2025-06-18", "capabilities": {}}
            }),
            None,
            alice(),
        )
        .await;
    result.session_id.expect("initialize creates a session")
}

async fn call(dispatcher: &Dispatcher, session: &str, message: Value) -> Value {
    single(dispatcher.dispatch_value(message, Some(session), alice()).await)
}

#[tokio::test]
async fn test_initialize() {
    let dispatcher = dispatcher();
    let result = dispatcher
        .dispatch_value(
            json!({
                "jsonrpc": "2.0",
                "id": 1,
                "method": "initialize",
                "params": {"protocolVersion": "2025-03-26"}
            }),
            None,
            alice(),
        )
        .await;

    assert!(result.session_id.is_some());
    let response = single(result);
    assert_eq!(response["id"], 1);
    assert_eq!(response["result"]["protocolVersion"], "2025-03-26");
    assert_eq!(response["result"]["serverInfo"]["name"], "test-server");
    assert_eq!(response["result"]["serverInfo"]["version"], "1.2.3");
    assert_eq!(response["result"]["instructions"], "Be nice.");
    assert!(response["result"]["capabilities"]["tools"].is_object());
}

#[tokio::test]
async fn test_initialize_with_ancient_version_fails() {
    let dispatcher = dispatcher();
    let result = dispatcher
        .dispatch_value(
            json!({
                "jsonrpc": "2.0",
                "id": 1,
                "method": "initialize",
                "params": {"protocolVersion": "2020-01-01"}
            }),
            None,
            alice(),
        )
        .await;

    assert!(result.session_id.is_none());
    assert_eq!(single(result)["error"]["code"], -32600);
}

#[tokio::test]
async fn test_tools_rejected_before_initialize() {
    let dispatcher = dispatcher();
    for method in ["tools/list", "tools/call"] {
        let response = single(
            dispatcher
                .dispatch_value(json!({"jsonrpc": "2.0", "id": 5, "method": method}), None, alice())
                .await,
        );
        assert_eq!(response["error"]["code"], -32002, "{method}");
        assert_eq!(response["id"], 5);
    }
}

#[tokio::test]
async fn test_ping_allowed_before_initialize() {
    let dispatcher = dispatcher();
    let response = single(
        dispatcher
            .dispatch_value(json!({"jsonrpc": "2.0", "id": "p", "method": "ping"}), None, alice())
            .await,
    );
    assert_eq!(response["result"], json!({}));
    assert_eq!(response["id"], "p");
}

#[tokio::test]
async fn test_unknown_session_is_uninitialized() {
    let dispatcher = dispatcher();
    let response = call(
        &dispatcher,
        "no-such-session",
        json!({"jsonrpc": "2.0", "id": 1, "method": "tools/list"}),
    )
    .await;
    assert_eq!(response["error"]["code"], -32002);
}

#[tokio::test]
async fn test_session_of_another_subject_is_uninitialized() {
    let dispatcher = dispatcher();
    let session = initialize(&dispatcher).await;

    let mallory = Some(Arc::new(Identity::new("mallory", AuthMode::Pat, "pat_m")));
    let response = single(
        dispatcher
            .dispatch_value(
                json!({"jsonrpc": "2.0", "id": 1, "method": "tools/list"}),
                Some(&session),
                mallory,
            )
            .await,
    );
    assert_eq!(response["error"]["code"], -32002);
}

#[tokio::test]
async fn test_tools_list() {
    let dispatcher = dispatcher();
    let session = initialize(&dispatcher).await;

    let response =
        call(&dispatcher, &session, json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"}))
            .await;

    let tools = response["result"]["tools"].as_array().unwrap();
    let names: Vec<&str> = tools.iter().map(|t| t["name"].as_str().unwrap()).collect();
    assert_eq!(names, vec!["echo", "greet", "explode", "fail"]);
    assert!(tools[0]["inputSchema"].is_object());
}

#[tokio::test]
async fn test_tools_call_passes_identity() {
    let dispatcher = dispatcher();
    let session = initialize(&dispatcher).await;

    let response = call(
        &dispatcher,
        &session,
        json!({"jsonrpc": "2.0", "id": 3, "method": "tools/call", "params": {"name": "greet"}}),
    )
    .await;

    assert_eq!(response["result"]["content"][0]["text"], "Hello, Alice!");
    assert_eq!(response["result"]["isError"], false);
}

#[tokio::test]
async fn test_tools_call_without_identity() {
    let dispatcher = dispatcher();
    let sessions_result = dispatcher
        .dispatch_value(json!({"jsonrpc": "2.0", "id": 0, "method": "initialize"}), None, None)
        .await;
    let session = sessions_result.session_id.unwrap();

    let response = single(
        dispatcher
            .dispatch_value(
                json!({
                    "jsonrpc": "2.0",
                    "id": 1,
                    "method": "tools/call",
                    "params": {"name": "echo", "arguments": {"message": "hi"}}
                }),
                Some(&session),
                None,
            )
            .await,
    );
    assert_eq!(response["error"]["code"], -32001);
}

#[tokio::test]
async fn test_tool_panic_is_sanitized() {
    let dispatcher = dispatcher();
    let session = initialize(&dispatcher).await;

    let response = call(
        &dispatcher,
        &session,
        json!({"jsonrpc": "2.0", "id": 4, "method": "tools/call", "params": {"name": "explode"}}),
    )
    .await;

    assert_eq!(response["error"]["code"], -32603);
    let body = response.to_string();
    assert!(!body.contains("hunter2"));
    assert!(!body.contains("postgres"));
}

#[tokio::test]
async fn test_tool_internal_error_is_sanitized() {
    let dispatcher = dispatcher();
    let session = initialize(&dispatcher).await;

    let response = call(
        &dispatcher,
        &session,
        json!({"jsonrpc": "2.0", "id": 4, "method": "tools/call", "params": {"name": "fail"}}),
    )
    .await;

    assert_eq!(response["error"]["code"], -32603);
    assert!(!response.to_string().contains("hunter2"));
}

#[tokio::test]
async fn test_invalid_tool_arguments() {
    let dispatcher = dispatcher();
    let session = initialize(&dispatcher).await;

    let response = call(
        &dispatcher,
        &session,
        json!({
            "jsonrpc": "2.0",
            "id": 6,
            "method": "tools/call",
            "params": {"name": "echo", "arguments": {"wrong": 1}}
        }),
    )
    .await;
    assert_eq!(response["error"]["code"], -32602);

    let response = call(
        &dispatcher,
        &session,
        json!({"jsonrpc": "2.0", "id": 7, "method": "tools/call", "params": {"name": "missing"}}),
    )
    .await;
    assert_eq!(response["error"]["code"], -32602);

    let response = call(
        &dispatcher,
        &session,
        json!({"jsonrpc": "2.0", "id": 8, "method": "tools/call", "params": {}}),
    )
    .await;
    assert_eq!(response["error"]["code"], -32602);
}

#[tokio::test]
async fn test_parse_error() {
    let dispatcher = dispatcher();
    let response = single(dispatcher.dispatch(b"{not json", None, alice()).await);
    assert_eq!(response["error"]["code"], -32700);
    assert_eq!(response["id"], Value::Null);
}

#[tokio::test]
async fn test_unknown_method() {
    let dispatcher = dispatcher();
    let request = json!({"jsonrpc": "2.0", "id": 9, "method": "resources/list"});
    let response = single(dispatcher.dispatch_value(request, None, alice()).await);
    assert_eq!(response["error"]["code"], -32601);
}

#[tokio::test]
async fn test_notifications_get_no_response() {
    let dispatcher = dispatcher();
    let session = initialize(&dispatcher).await;

    for method in ["notifications/initialized", "notifications/cancelled", "made/up"] {
        let result = dispatcher
            .dispatch_value(json!({"jsonrpc": "2.0", "method": method}), Some(&session), alice())
            .await;
        assert_eq!(result.outcome, DispatchOutcome::NoContent, "{method}");
    }
}

#[tokio::test]
async fn test_batch_mixed_with_notification() {
    let dispatcher = dispatcher();
    let result = dispatcher
        .dispatch_value(
            json!([
                {"jsonrpc": "2.0", "id": 1, "method": "unknown"},
                {"jsonrpc": "2.0", "method": "notify"}
            ]),
            None,
            alice(),
        )
        .await;

    let DispatchOutcome::Batch(responses) = result.outcome else {
        panic!("expected batch");
    };
    assert_eq!(responses.len(), 1);
    let response = serde_json::to_value(&responses[0]).unwrap();
    assert_eq!(response["id"], 1);
    assert_eq!(response["error"]["code"], -32601);
}

#[tokio::test]
async fn test_batch_preserves_order() {
    let dispatcher = dispatcher();
    let session = initialize(&dispatcher).await;

    let result = dispatcher
        .dispatch_value(
            json!([
                {"jsonrpc": "2.0", "id": "c", "method": "tools/call",
                 "params": {"name": "echo", "arguments": {"message": "one"}}},
                {"jsonrpc": "2.0", "id": 2, "method": "ping"},
                42,
                {"jsonrpc": "2.0", "id": "a", "method": "tools/list"}
            ]),
            Some(&session),
            alice(),
        )
        .await;

    let DispatchOutcome::Batch(responses) = result.outcome else {
        panic!("expected batch");
    };
    let responses: Vec<Value> =
        responses.iter().map(|r| serde_json::to_value(r).unwrap()).collect();
    assert_eq!(responses.len(), 4);
    assert_eq!(responses[0]["id"], "c");
    assert_eq!(responses[0]["result"]["content"][0]["text"], "Echo: one");
    assert_eq!(responses[1]["id"], 2);
    assert_eq!(responses[2]["id"], Value::Null);
    assert_eq!(responses[2]["error"]["code"], -32600);
    assert_eq!(responses[3]["id"], "a");
}

#[tokio::test]
async fn test_empty_and_notification_only_batches() {
    let dispatcher = dispatcher();

    let result = dispatcher.dispatch_value(json!([]), None, alice()).await;
    assert_eq!(result.outcome, DispatchOutcome::NoContent);

    let result = dispatcher
        .dispatch_value(
            json!([
                {"jsonrpc": "2.0", "method": "notifications/initialized"},
                {"jsonrpc": "2.0", "method": "notifications/cancelled", "params": {"requestId": 1}}
            ]),
            None,
            alice(),
        )
        .await;
    assert_eq!(result.outcome, DispatchOutcome::NoContent);
}

#[tokio::test]
async fn test_oversized_batch_rejected() {
    let dispatcher = dispatcher();
    let batch: Vec<Value> =
        (0..101).map(|i| json!({"jsonrpc": "2.0", "id": i, "method": "ping"})).collect();

    let response = single(dispatcher.dispatch_value(Value::Array(batch), None, alice()).await);
    assert_eq!(response["error"]["code"], -32600);
}

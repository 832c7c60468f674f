//! Unit tests for the JSON-RPC protocol layer.
//!
//! Tests request/response handling, tool definitions and the stdio loop.

use super::*;
use crate::config::Config;
use crate::server::AppState;
use serde_json::json;
use std::sync::Arc;

fn server() -> McpServer {
    McpServer::new(Arc::new(AppState::new(Config::default())))
}

fn request(value: Value) -> JsonRpcRequest {
    serde_json::from_value(value).unwrap()
}

// ============================================================================
// JsonRpcResponse tests
// ============================================================================

#[test]
fn test_jsonrpc_response_success_with_id() {
    let response = JsonRpcResponse::success(Some(json!(1)), json!({"result": "ok"}));

    assert_eq!(response.jsonrpc, "2.0");
    assert_eq!(response.id, json!(1));
    assert!(response.error.is_none());
    assert_eq!(response.result.unwrap()["result"], "ok");
}

#[test]
fn test_jsonrpc_response_error_without_id() {
    let response = JsonRpcResponse::error(None, -32700, "Parse error");

    assert_eq!(response.id, Value::Null);
    assert!(response.result.is_none());
    assert_eq!(response.error.unwrap().code, -32700);
}

#[test]
fn test_jsonrpc_response_serialization_omits_empty_fields() {
    let ok = serde_json::to_string(&JsonRpcResponse::success(Some(json!(1)), json!({}))).unwrap();
    assert!(ok.contains("\"result\""));
    assert!(!ok.contains("\"error\""));

    let err =
        serde_json::to_string(&JsonRpcResponse::error(Some(json!(1)), -32601, "nope")).unwrap();
    assert!(err.contains("-32601"));
    assert!(!err.contains("\"result\""));
}

#[test]
fn test_tool_call_result_shapes() {
    let ok = serde_json::to_value(ToolCallResult::success(&json!({"seq": 1})).unwrap()).unwrap();
    assert_eq!(ok["content"][0]["type"], "text");
    assert!(ok.get("isError").is_none());
    let text: Value = serde_json::from_str(ok["content"][0]["text"].as_str().unwrap()).unwrap();
    assert_eq!(text, json!({"seq": 1}));

    let err = RpcError::UnknownTool {
        tool_name: "tree_delete".to_string(),
    };
    let failed = serde_json::to_value(ToolCallResult::failure(&err)).unwrap();
    assert_eq!(failed["isError"], true);
    assert_eq!(failed["content"][0]["text"], "Error: Unknown tool: tree_delete");
}

// ============================================================================
// Tool definitions
// ============================================================================

#[test]
fn test_tool_definitions_are_unique_and_complete() {
    let tools = tool_definitions();
    let mut names: Vec<&str> = tools.iter().map(|t| t.name.as_str()).collect();
    names.sort_unstable();
    names.dedup();

    assert_eq!(names.len(), tools.len());
    for expected in [
        "tree_send_user",
        "tree_append_assistant",
        "tree_update_message",
        "tree_fork",
        "tree_set_active_branch",
        "tree_rename_branch",
        "tree_path",
        "tree_breadcrumbs",
        "tree_transcript",
        "tree_children",
        "tree_chat_messages",
        "tree_state",
    ] {
        assert!(names.contains(&expected), "missing tool {}", expected);
    }
}

#[test]
fn test_tool_schemas_are_objects() {
    for tool in tool_definitions() {
        assert_eq!(tool.input_schema["type"], "object", "{}", tool.name);
    }
}

// ============================================================================
// Request handling
// ============================================================================

#[tokio::test]
async fn test_initialize() {
    let response = server()
        .handle_request(request(json!({"jsonrpc": "2.0", "id": 1, "method": "initialize"})))
        .await
        .unwrap();

    let result = response.result.unwrap();
    assert_eq!(result["serverInfo"]["name"], "treechat");
    assert_eq!(result["protocolVersion"], "2024-11-05");
}

#[tokio::test]
async fn test_notifications_get_no_response() {
    let server = server();

    let response = server
        .handle_request(request(json!({"jsonrpc": "2.0", "method": "initialized"})))
        .await;
    assert!(response.is_none());

    let response = server
        .handle_request(request(json!({"jsonrpc": "2.0", "method": "whatever"})))
        .await;
    assert!(response.is_none());
}

#[tokio::test]
async fn test_unknown_method() {
    let response = server()
        .handle_request(request(json!({"jsonrpc": "2.0", "id": 7, "method": "nope"})))
        .await
        .unwrap();

    assert_eq!(response.id, json!(7));
    assert_eq!(response.error.unwrap().code, -32601);
}

#[tokio::test]
async fn test_wrong_jsonrpc_version() {
    let response = server()
        .handle_request(request(json!({"jsonrpc": "1.0", "id": 1, "method": "ping"})))
        .await
        .unwrap();

    let error = response.error.unwrap();
    assert_eq!(error.code, -32600);
    assert_eq!(
        error.message,
        "Invalid request: unsupported jsonrpc version 1.0"
    );
}

#[tokio::test]
async fn test_tools_call_missing_params() {
    let response = server()
        .handle_request(request(json!({"jsonrpc": "2.0", "id": 1, "method": "tools/call"})))
        .await
        .unwrap();

    assert_eq!(response.error.unwrap().code, -32602);
}

#[tokio::test]
async fn test_tools_call_success_and_tool_error() {
    let server = server();

    let response = server
        .handle_request(request(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "tools/call",
            "params": {"name": "tree_send_user", "arguments": {"content": "hi"}}
        })))
        .await
        .unwrap();
    let result = response.result.unwrap();
    assert!(result.get("isError").is_none());
    let message: Value = serde_json::from_str(result["content"][0]["text"].as_str().unwrap()).unwrap();
    assert_eq!(message["content"], "hi");

    let response = server
        .handle_request(request(json!({
            "jsonrpc": "2.0",
            "id": 2,
            "method": "tools/call",
            "params": {"name": "tree_fork", "arguments": {"message_id": "ghost"}}
        })))
        .await
        .unwrap();
    let result = response.result.unwrap();
    assert_eq!(result["isError"], true);
    assert_eq!(
        result["content"][0]["text"],
        "Error: Tool execution failed: Unknown message: ghost"
    );
}

// ============================================================================
// Stdio loop
// ============================================================================

#[tokio::test]
async fn test_serve_answers_each_request_line() {
    let input = concat!(
        r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#,
        "\n",
        "\n",
        r#"{"jsonrpc":"2.0","method":"initialized"}"#,
        "\n",
        "not json\n",
        r#"{"jsonrpc":"2.0","id":2,"method":"tools/list"}"#,
        "\n",
    );
    let mut output = Vec::new();

    server()
        .serve(input.as_bytes(), &mut output)
        .await
        .unwrap();

    let lines: Vec<Value> = String::from_utf8(output)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0]["id"], 1);
    assert_eq!(lines[1]["error"]["code"], -32700);
    assert_eq!(lines[2]["id"], 2);
    assert_eq!(
        lines[2]["result"]["tools"].as_array().unwrap().len(),
        tool_definitions().len()
    );
}

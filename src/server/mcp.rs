//! Controller protocol: JSON-RPC 2.0, one message per line.
//!
//! Requests and responses follow MCP conventions so an MCP client can drive
//! the session: `initialize`, `tools/list` and `tools/call`, with tool
//! failures returned in-band.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, error, info};

use super::{handle_tool_call, SharedState};
use crate::error::RpcError;

#[cfg(test)]
#[path = "mcp_tests.rs"]
mod mcp_tests;

/// Protocol revision reported by `initialize`.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// One request line. A missing `id` marks a notification.
#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    /// Must be "2.0".
    pub jsonrpc: String,
    /// Echoed back in the response.
    pub id: Option<Value>,
    /// Method name.
    pub method: String,
    /// Method parameters.
    #[serde(default)]
    pub params: Option<Value>,
}

/// One response line; exactly one of `result` and `error` is set.
#[derive(Debug, Serialize)]
pub struct JsonRpcResponse {
    /// Always "2.0".
    pub jsonrpc: &'static str,
    /// Request id, `null` when the line could not be parsed.
    pub id: Value,
    /// Success payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Failure payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

/// JSON-RPC error object
#[derive(Debug, Serialize)]
pub struct JsonRpcError {
    /// Standard JSON-RPC code (-32700, -32600, -32601, -32602, -32603).
    pub code: i32,
    /// Description shown to the controller.
    pub message: String,
}

/// Entry in the `tools/list` response.
#[derive(Debug, Clone, Serialize)]
pub struct Tool {
    /// Name passed as `params.name` in `tools/call`.
    pub name: String,
    /// What the tool does to the conversation tree.
    pub description: String,
    /// JSON Schema of `params.arguments`.
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

/// `params` of a `tools/call` request
#[derive(Debug, Deserialize)]
pub struct ToolCallParams {
    /// Tool name.
    pub name: String,
    /// Tool arguments, checked by the tool's handler.
    #[serde(default)]
    pub arguments: Option<Value>,
}

/// `result` of a `tools/call` request.
///
/// Tool failures are reported here with `isError` set rather than as a
/// JSON-RPC error, so the controller sees the session's own message.
#[derive(Debug, Serialize)]
pub struct ToolCallResult {
    /// A single text item carrying the JSON-encoded payload or the error.
    pub content: Vec<ToolText>,
    /// Set only for failed calls.
    #[serde(rename = "isError", skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
}

/// Text content item of a [`ToolCallResult`]
#[derive(Debug, Serialize)]
pub struct ToolText {
    /// Always "text".
    #[serde(rename = "type")]
    pub kind: &'static str,
    /// The text.
    pub text: String,
}

impl ToolCallResult {
    fn text(text: String, is_error: Option<bool>) -> Self {
        Self {
            content: vec![ToolText { kind: "text", text }],
            is_error,
        }
    }

    /// Successful call carrying `payload` as pretty-printed JSON
    pub fn success(payload: &Value) -> serde_json::Result<Self> {
        Ok(Self::text(serde_json::to_string_pretty(payload)?, None))
    }

    /// Failed call reported as "Error: <message>"
    pub fn failure(err: &RpcError) -> Self {
        Self::text(format!("Error: {}", err), Some(true))
    }
}

impl JsonRpcResponse {
    /// Response carrying `result`
    pub fn success(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id: id.unwrap_or(Value::Null),
            result: Some(result),
            error: None,
        }
    }

    /// Response carrying an error object
    pub fn error(id: Option<Value>, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0",
            id: id.unwrap_or(Value::Null),
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
            }),
        }
    }
}

/// Controller server speaking line-delimited JSON-RPC 2.0.
pub struct McpServer {
    /// Shared application state.
    state: SharedState,
}

impl McpServer {
    /// Create a new server
    pub fn new(state: SharedState) -> Self {
        Self { state }
    }

    /// Run the server on stdin/stdout until EOF
    pub async fn run(&self) -> std::io::Result<()> {
        let stdin = tokio::io::BufReader::new(tokio::io::stdin());
        let stdout = tokio::io::stdout();
        self.serve(stdin, stdout).await
    }

    /// Serve requests from `reader`, writing one response line per request
    pub async fn serve<R, W>(&self, mut reader: R, mut writer: W) -> std::io::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        info!("TreeChat controller server starting...");

        let mut line = String::new();

        loop {
            line.clear();
            let bytes_read = reader.read_line(&mut line).await?;

            // EOF reached
            if bytes_read == 0 {
                info!("EOF received, shutting down");
                break;
            }

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            debug!(request = %trimmed, "Received request");

            let response = match serde_json::from_str::<JsonRpcRequest>(trimmed) {
                Ok(request) => self.handle_request(request).await,
                Err(e) => {
                    error!(error = %e, "Failed to parse request");
                    Some(JsonRpcResponse::error(
                        None,
                        -32700,
                        format!("Parse error: {}", e),
                    ))
                }
            };

            // Notifications get no response
            if let Some(response) = response {
                let response_json = serde_json::to_string(&response)?;
                debug!(response = %response_json, "Sending response");

                writer.write_all(response_json.as_bytes()).await?;
                writer.write_all(b"\n").await?;
                writer.flush().await?;
            }
        }

        Ok(())
    }

    /// Handle a single JSON-RPC request.
    ///
    /// Returns `None` for notifications (requests without an id).
    pub async fn handle_request(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        let is_notification = request.id.is_none();

        if request.jsonrpc != "2.0" {
            return if is_notification {
                None
            } else {
                let err = RpcError::InvalidRequest {
                    message: format!("unsupported jsonrpc version {}", request.jsonrpc),
                };
                Some(JsonRpcResponse::error(request.id, -32600, err.to_string()))
            };
        }

        match request.method.as_str() {
            "initialize" => Some(self.handle_initialize(request.id)),
            "initialized" | "notifications/initialized" | "notifications/cancelled" => {
                debug!(method = %request.method, "Received notification");
                None
            }
            "tools/list" => Some(self.handle_tools_list(request.id)),
            "tools/call" => Some(self.handle_tool_call(request.id, request.params).await),
            "ping" => Some(JsonRpcResponse::success(
                request.id,
                Value::Object(Default::default()),
            )),
            method => {
                if is_notification {
                    debug!(method = %method, "Unknown notification, ignoring");
                    None
                } else {
                    error!(method = %method, "Unknown method");
                    Some(JsonRpcResponse::error(
                        request.id,
                        -32601,
                        format!("Method not found: {}", method),
                    ))
                }
            }
        }
    }

    fn handle_initialize(&self, id: Option<Value>) -> JsonRpcResponse {
        info!("Handling initialize request");

        JsonRpcResponse::success(
            id,
            json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": {"tools": {"listChanged": false}},
                "serverInfo": {
                    "name": "treechat",
                    "version": env!("CARGO_PKG_VERSION")
                }
            }),
        )
    }

    fn handle_tools_list(&self, id: Option<Value>) -> JsonRpcResponse {
        debug!("Handling tools/list request");
        JsonRpcResponse::success(id, json!({ "tools": tool_definitions() }))
    }

    async fn handle_tool_call(&self, id: Option<Value>, params: Option<Value>) -> JsonRpcResponse {
        let params: ToolCallParams = match params {
            Some(p) => match serde_json::from_value(p) {
                Ok(p) => p,
                Err(e) => {
                    return JsonRpcResponse::error(id, -32602, format!("Invalid params: {}", e));
                }
            },
            None => {
                return JsonRpcResponse::error(id, -32602, "Missing params");
            }
        };

        debug!(tool = %params.name, "Handling tool call");

        let tool_result = handle_tool_call(&self.state, &params.name, params.arguments)
            .await
            .and_then(|payload| ToolCallResult::success(&payload).map_err(RpcError::from))
            .unwrap_or_else(|e| {
                debug!(tool = %params.name, error = %e, "Tool call failed");
                ToolCallResult::failure(&e)
            });

        match serde_json::to_value(tool_result) {
            Ok(val) => JsonRpcResponse::success(id, val),
            Err(e) => {
                error!(error = %e, "Failed to serialize tool call result");
                JsonRpcResponse::error(id, -32603, format!("Internal error: {}", e))
            }
        }
    }
}

/// Every tool the server exposes
pub fn tool_definitions() -> Vec<Tool> {
    vec![
        content_tool(
            "tree_send_user",
            "Append a user message to the active branch.",
        ),
        content_tool(
            "tree_append_assistant",
            "Append an assistant message to the active branch. Pass empty content to create a placeholder for a streamed reply.",
        ),
        Tool {
            name: "tree_update_message".to_string(),
            description: "Replace the full content of an existing message (last write wins)."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "message_id": {
                        "type": "string",
                        "description": "The message to update"
                    },
                    "content": {
                        "type": "string",
                        "description": "The complete new content"
                    }
                },
                "required": ["message_id", "content"],
                "additionalProperties": false
            }),
        },
        Tool {
            name: "tree_fork".to_string(),
            description: "Fork a new branch continuing from a message (inclusive) and make it active."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "message_id": {
                        "type": "string",
                        "description": "The message to fork from"
                    }
                },
                "required": ["message_id"],
                "additionalProperties": false
            }),
        },
        Tool {
            name: "tree_set_active_branch".to_string(),
            description: "Make a branch the active branch.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "branch_id": {
                        "type": "string",
                        "description": "The branch to activate"
                    }
                },
                "required": ["branch_id"],
                "additionalProperties": false
            }),
        },
        Tool {
            name: "tree_rename_branch".to_string(),
            description: "Set a branch's display title.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "branch_id": {
                        "type": "string",
                        "description": "The branch to rename"
                    },
                    "title": {
                        "type": "string",
                        "description": "The new title"
                    }
                },
                "required": ["branch_id", "title"],
                "additionalProperties": false
            }),
        },
        view_tool(
            "tree_path",
            "Branches from the root to the active branch.",
        ),
        view_tool(
            "tree_breadcrumbs",
            "Root-to-active path as id/title pairs.",
        ),
        branch_view_tool(
            "tree_transcript",
            "Messages visible from a branch (defaults to the active branch).",
        ),
        branch_view_tool(
            "tree_children",
            "Direct child branches, oldest first (defaults to the active branch).",
        ),
        branch_view_tool(
            "tree_chat_messages",
            "Transcript as role/content pairs ready for a chat-completion request.",
        ),
        view_tool(
            "tree_state",
            "Active branch id, version counter and every branch.",
        ),
    ]
}

fn content_tool(name: &str, description: &str) -> Tool {
    Tool {
        name: name.to_string(),
        description: description.to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "content": {
                    "type": "string",
                    "description": "The message text"
                }
            },
            "required": ["content"],
            "additionalProperties": false
        }),
    }
}

fn view_tool(name: &str, description: &str) -> Tool {
    Tool {
        name: name.to_string(),
        description: description.to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {},
            "additionalProperties": false
        }),
    }
}

fn branch_view_tool(name: &str, description: &str) -> Tool {
    Tool {
        name: name.to_string(),
        description: description.to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "branch_id": {
                    "type": "string",
                    "description": "Optional branch ID (defaults to the active branch)"
                }
            },
            "additionalProperties": false
        }),
    }
}

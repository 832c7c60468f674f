use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::SharedState;
use crate::error::{RpcError, RpcResult, TreeError};
use crate::session::TreeSession;
use crate::tree::BranchNode;

#[derive(Debug, Deserialize)]
struct ContentParams {
    content: String,
}

#[derive(Debug, Deserialize)]
struct UpdateMessageParams {
    message_id: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ForkParams {
    message_id: String,
}

#[derive(Debug, Deserialize)]
struct BranchParams {
    branch_id: String,
}

#[derive(Debug, Deserialize)]
struct RenameParams {
    branch_id: String,
    title: String,
}

#[derive(Debug, Default, Deserialize)]
struct BranchViewParams {
    #[serde(default)]
    branch_id: Option<String>,
}

/// Result of `tree_set_active_branch`.
#[derive(Debug, Serialize)]
pub struct ActiveBranchResult {
    /// The branch now active.
    pub active_branch_id: String,
    /// Session version after the change.
    pub version: u64,
}

/// Result of `tree_state`.
#[derive(Debug, Serialize)]
pub struct TreeSnapshot {
    /// The active branch.
    pub active_branch_id: String,
    /// Session version.
    pub version: u64,
    /// Every branch, in creation order.
    pub branches: Vec<BranchNode>,
}

/// Route tool calls to the session facade
pub async fn handle_tool_call(
    state: &SharedState,
    tool_name: &str,
    arguments: Option<Value>,
) -> RpcResult<Value> {
    debug!(tool = %tool_name, "Routing tool call");

    let mut session = state.session.lock().await;

    match tool_name {
        "tree_send_user" => {
            let params: ContentParams = parse_arguments(tool_name, arguments)?;
            to_json(session.send_user(params.content)?)
        }
        "tree_append_assistant" => {
            let params: ContentParams = parse_arguments(tool_name, arguments)?;
            to_json(session.append_assistant(params.content)?)
        }
        "tree_update_message" => {
            let params: UpdateMessageParams = parse_arguments(tool_name, arguments)?;
            to_json(session.update_message(&params.message_id, params.content)?)
        }
        "tree_fork" => {
            let params: ForkParams = parse_arguments(tool_name, arguments)?;
            to_json(session.fork(&params.message_id)?)
        }
        "tree_set_active_branch" => {
            let params: BranchParams = parse_arguments(tool_name, arguments)?;
            session.set_active_branch(&params.branch_id)?;
            to_json(ActiveBranchResult {
                active_branch_id: session.active_branch_id().to_string(),
                version: session.version(),
            })
        }
        "tree_rename_branch" => {
            let params: RenameParams = parse_arguments(tool_name, arguments)?;
            to_json(session.rename_branch(&params.branch_id, params.title)?)
        }
        "tree_path" => to_json(session.path()),
        "tree_breadcrumbs" => to_json(session.breadcrumbs()),
        "tree_transcript" => {
            let branch_id = view_branch(&session, tool_name, arguments)?;
            to_json(session.transcript_for(&branch_id))
        }
        "tree_children" => {
            let branch_id = view_branch(&session, tool_name, arguments)?;
            to_json(session.children_of(&branch_id))
        }
        "tree_chat_messages" => {
            let branch_id = view_branch(&session, tool_name, arguments)?;
            to_json(session.chat_messages_for(&branch_id))
        }
        "tree_state" => to_json(TreeSnapshot {
            active_branch_id: session.active_branch_id().to_string(),
            version: session.version(),
            branches: session.branches(),
        }),
        _ => Err(RpcError::UnknownTool {
            tool_name: tool_name.to_string(),
        }),
    }
}

/// Branch a view tool targets: the given id if it exists, else the active branch.
fn view_branch(
    session: &TreeSession,
    tool_name: &str,
    arguments: Option<Value>,
) -> RpcResult<String> {
    let params: BranchViewParams = match arguments {
        Some(Value::Null) | None => BranchViewParams::default(),
        Some(args) => parse_arguments(tool_name, Some(args))?,
    };

    match params.branch_id {
        Some(id) if session.state().get_branch(&id).is_some() => Ok(id),
        Some(id) => Err(TreeError::UnknownBranch { branch_id: id }.into()),
        None => Ok(session.active_branch_id().to_string()),
    }
}

fn parse_arguments<T: serde::de::DeserializeOwned>(
    tool_name: &str,
    arguments: Option<Value>,
) -> RpcResult<T> {
    match arguments {
        Some(args) => serde_json::from_value(args).map_err(|e| RpcError::InvalidParameters {
            tool_name: tool_name.to_string(),
            message: e.to_string(),
        }),
        None => Err(RpcError::InvalidParameters {
            tool_name: tool_name.to_string(),
            message: "Missing arguments".to_string(),
        }),
    }
}

fn to_json<T: Serialize>(value: T) -> RpcResult<Value> {
    serde_json::to_value(value).map_err(RpcError::Json)
}

use thiserror::Error;

/// Application-level errors
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Tree error: {0}")]
    Tree(#[from] TreeError),

    #[error("Stream error: {0}")]
    Stream(#[from] StreamError),

    #[error("RPC protocol error: {0}")]
    Rpc(#[from] RpcError),
}

/// Tree store errors.
///
/// Both variants mean the caller passed a stale or fabricated id. They are
/// raised before any state is touched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TreeError {
    #[error("Unknown branch: {branch_id}")]
    UnknownBranch { branch_id: String },

    #[error("Unknown message: {message_id}")]
    UnknownMessage { message_id: String },
}

/// Reply streaming errors
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("Fragment source failed: {message}")]
    Source { message: String },

    #[error("Reply task failed: {message}")]
    Task { message: String },

    #[error("Tree error: {0}")]
    Tree(#[from] TreeError),
}

/// Controller protocol errors
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("Unknown tool: {tool_name}")]
    UnknownTool { tool_name: String },

    #[error("Invalid parameters for {tool_name}: {message}")]
    InvalidParameters { tool_name: String, message: String },

    #[error("Tool execution failed: {message}")]
    ExecutionFailed { message: String },

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<TreeError> for RpcError {
    fn from(err: TreeError) -> Self {
        RpcError::ExecutionFailed {
            message: err.to_string(),
        }
    }
}

/// Result type alias for tree store operations
pub type TreeResult<T> = Result<T, TreeError>;

/// Result type alias for reply streaming
pub type StreamResult<T> = Result<T, StreamError>;

/// Result type alias for controller protocol operations
pub type RpcResult<T> = Result<T, RpcError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_error_display() {
        let err = AppError::Config {
            message: "bad fork title length".to_string(),
        };
        assert_eq!(err.to_string(), "Configuration error: bad fork title length");
    }

    #[test]
    fn test_tree_error_display() {
        let err = TreeError::UnknownBranch {
            branch_id: "br-123".to_string(),
        };
        assert_eq!(err.to_string(), "Unknown branch: br-123");

        let err = TreeError::UnknownMessage {
            message_id: "msg-456".to_string(),
        };
        assert_eq!(err.to_string(), "Unknown message: msg-456");
    }

    #[test]
    fn test_stream_error_display() {
        let err = StreamError::Source {
            message: "connection reset".to_string(),
        };
        assert_eq!(err.to_string(), "Fragment source failed: connection reset");

        let err = StreamError::Task {
            message: "panicked".to_string(),
        };
        assert_eq!(err.to_string(), "Reply task failed: panicked");

        let err: StreamError = TreeError::UnknownMessage {
            message_id: "gone".to_string(),
        }
        .into();
        assert_eq!(err.to_string(), "Tree error: Unknown message: gone");
    }

    #[test]
    fn test_rpc_error_display() {
        let err = RpcError::InvalidRequest {
            message: "bad format".to_string(),
        };
        assert_eq!(err.to_string(), "Invalid request: bad format");

        let err = RpcError::UnknownTool {
            tool_name: "nonexistent".to_string(),
        };
        assert_eq!(err.to_string(), "Unknown tool: nonexistent");

        let err = RpcError::InvalidParameters {
            tool_name: "tree_fork".to_string(),
            message: "missing message_id".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid parameters for tree_fork: missing message_id"
        );
    }

    #[test]
    fn test_tree_error_conversion_to_rpc_error() {
        let tree_err = TreeError::UnknownBranch {
            branch_id: "b1".to_string(),
        };
        let rpc_err: RpcError = tree_err.into();
        assert!(matches!(rpc_err, RpcError::ExecutionFailed { .. }));
        assert_eq!(rpc_err.to_string(), "Tool execution failed: Unknown branch: b1");
    }

    #[test]
    fn test_layer_errors_convert_to_app_error() {
        let app_err: AppError = TreeError::UnknownMessage {
            message_id: "m".to_string(),
        }
        .into();
        assert!(matches!(app_err, AppError::Tree(_)));

        let app_err: AppError = StreamError::Source {
            message: "eof".to_string(),
        }
        .into();
        assert!(matches!(app_err, AppError::Stream(_)));

        let app_err: AppError = RpcError::UnknownTool {
            tool_name: "x".to_string(),
        }
        .into();
        assert!(matches!(app_err, AppError::Rpc(_)));
    }
}

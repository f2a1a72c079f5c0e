//! Error types for the MCP client

use std::time::Duration;

use ghost_mcp::protocol::{codes, JsonRpcError};
use thiserror::Error;

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors surfaced to callers of the client
#[derive(Debug, Error)]
pub enum ClientError {
    /// Server rejected the envelope or the protocol version
    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Method not found: {0}")]
    MethodNotFound(String),

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    #[error("Prompt not found: {0}")]
    PromptNotFound(String),

    /// Input failed the server's schema validation
    #[error("Validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),

    /// Server-side handler failure
    #[error("Execution error: {0}")]
    Execution(String),

    /// Connection failed or was lost mid-call
    #[error("Connection error: {0}")]
    Connection(String),

    /// No connection is currently usable
    #[error("No healthy connection available")]
    NoHealthyConnection,

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    /// Call made before the connection completed `initialize`
    #[error("Session required")]
    SessionRequired,

    /// Any other JSON-RPC error
    #[error("RPC error {code}: {message}")]
    Rpc { code: i32, message: String },

    /// The message never left the client; safe to send elsewhere
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClientError {
    /// Map a wire error to a typed error by its numeric code
    pub fn from_rpc(err: JsonRpcError) -> Self {
        match err.code {
            codes::PARSE_ERROR | codes::INVALID_REQUEST | codes::PROTOCOL_VERSION_MISMATCH => {
                ClientError::Protocol(err.message)
            }
            codes::METHOD_NOT_FOUND => ClientError::MethodNotFound(err.message),
            codes::INVALID_PARAMS => {
                let errors = err.validation_errors();
                if errors.is_empty() {
                    ClientError::Validation(vec![err.message])
                } else {
                    ClientError::Validation(errors)
                }
            }
            codes::SESSION_REQUIRED => ClientError::SessionRequired,
            codes::RESOURCE_NOT_FOUND => ClientError::ResourceNotFound(err.message),
            codes::TOOL_NOT_FOUND => ClientError::ToolNotFound(err.message),
            codes::PROMPT_NOT_FOUND => ClientError::PromptNotFound(err.message),
            codes::EXECUTION_ERROR => ClientError::Execution(err.message),
            codes::TIMEOUT => ClientError::Timeout(Duration::ZERO),
            code => ClientError::Rpc {
                code,
                message: err.message,
            },
        }
    }

    /// Whether the failure says something about the connection itself
    pub fn is_connection_failure(&self) -> bool {
        matches!(
            self,
            ClientError::Connection(_) | ClientError::Transport(_) | ClientError::Io(_)
        )
    }
}

//! Error types for the MCP server

use thiserror::Error;

use crate::protocol::{codes, JsonRpcError, SUPPORTED_PROTOCOL_VERSIONS};

/// Result type alias for server operations
pub type Result<T> = std::result::Result<T, McpError>;

/// Errors that can occur while serving MCP requests
#[derive(Debug, Error)]
pub enum McpError {
    /// Requested protocol version is not supported
    #[error("Unsupported protocol version: {0}")]
    ProtocolVersionMismatch(String),

    /// Malformed or structurally invalid request
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// No session for this connection
    #[error("No session: send initialize first")]
    SessionRequired,

    /// Unknown or unnegotiated method
    #[error("Method not found: {0}")]
    MethodNotFound(String),

    /// Tool not registered
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    /// Resource not registered
    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    /// Prompt not registered
    #[error("Prompt not found: {0}")]
    PromptNotFound(String),

    /// Input failed schema validation
    #[error("Validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),

    /// Handler or provider failed
    #[error("Execution error: {0}")]
    Execution(String),

    /// Request parameters could not be decoded
    #[error("Invalid params: {0}")]
    InvalidParams(String),

    /// Tool name already registered
    #[error("Duplicate tool: {0}")]
    DuplicateTool(String),

    /// Resource URI already registered
    #[error("Duplicate resource: {0}")]
    DuplicateResource(String),

    /// Prompt name already registered
    #[error("Duplicate prompt: {0}")]
    DuplicatePrompt(String),

    /// Schema cannot be used for validation
    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl McpError {
    /// Stable wire code for this error
    pub fn code(&self) -> i32 {
        match self {
            McpError::ProtocolVersionMismatch(_) => codes::PROTOCOL_VERSION_MISMATCH,
            McpError::Protocol(_) => codes::INVALID_REQUEST,
            McpError::SessionRequired => codes::SESSION_REQUIRED,
            McpError::MethodNotFound(_) => codes::METHOD_NOT_FOUND,
            McpError::ToolNotFound(_) => codes::TOOL_NOT_FOUND,
            McpError::ResourceNotFound(_) => codes::RESOURCE_NOT_FOUND,
            McpError::PromptNotFound(_) => codes::PROMPT_NOT_FOUND,
            McpError::Validation(_) | McpError::InvalidParams(_) => codes::INVALID_PARAMS,
            McpError::Execution(_) => codes::EXECUTION_ERROR,
            McpError::Json(_) => codes::PARSE_ERROR,
            McpError::DuplicateTool(_)
            | McpError::DuplicateResource(_)
            | McpError::DuplicatePrompt(_)
            | McpError::InvalidSchema(_)
            | McpError::Internal(_)
            | McpError::Io(_)
            | McpError::Config(_) => codes::INTERNAL_ERROR,
        }
    }
}

impl From<McpError> for JsonRpcError {
    fn from(err: McpError) -> Self {
        match err {
            McpError::ProtocolVersionMismatch(requested) => {
                JsonRpcError::protocol_version_mismatch(&requested, SUPPORTED_PROTOCOL_VERSIONS)
            }
            McpError::SessionRequired => JsonRpcError::session_required(),
            McpError::MethodNotFound(method) => JsonRpcError::method_not_found(&method),
            McpError::ToolNotFound(name) => JsonRpcError::tool_not_found(&name),
            McpError::ResourceNotFound(uri) => JsonRpcError::resource_not_found(&uri),
            McpError::PromptNotFound(name) => JsonRpcError::prompt_not_found(&name),
            McpError::Validation(errors) => JsonRpcError::validation_failed(&errors),
            McpError::Json(_) => JsonRpcError::parse_error(),
            McpError::Protocol(msg) => {
                JsonRpcError::new(codes::INVALID_REQUEST, format!("Invalid Request: {}", msg))
            }
            other => JsonRpcError::new(other.code(), other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_stable() {
        assert_eq!(McpError::SessionRequired.code(), -32001);
        assert_eq!(McpError::ToolNotFound("x".into()).code(), -32003);
        assert_eq!(McpError::Validation(vec![]).code(), -32602);
        assert_eq!(McpError::Execution("boom".into()).code(), -32005);
        assert_eq!(McpError::DuplicateTool("x".into()).code(), -32603);
    }

    #[test]
    fn test_version_mismatch_lists_supported() {
        let err: JsonRpcError = McpError::ProtocolVersionMismatch("bad-version".into()).into();
        assert_eq!(err.code, codes::PROTOCOL_VERSION_MISMATCH);
        let supported = err.data.unwrap()["supported"].clone();
        assert_eq!(supported[0], "2025-11-25");
    }

    #[test]
    fn test_validation_carries_errors() {
        let errors = vec!["depth: expected integer, got string".to_string()];
        let err: JsonRpcError = McpError::Validation(errors.clone()).into();
        assert_eq!(err.validation_errors(), errors);
    }
}

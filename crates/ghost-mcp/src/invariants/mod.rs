//! Invariants and validation for the Ghost MCP server
//!
//! Structural checks on requests and identifiers that run before any
//! registry is consulted.

use crate::error::{McpError, Result};
use crate::protocol::{JsonRpcRequest, JSONRPC_VERSION};

/// Scheme every resource URI uses
pub const RESOURCE_SCHEME: &str = "ghost://";

// ============================================================================
// Protocol Invariants
// ============================================================================

/// Validate that a JSON-RPC request is well-formed
pub fn validate_request(request: &JsonRpcRequest) -> Result<()> {
    // Invariant: envelope version must be "2.0"
    if request.version != JSONRPC_VERSION {
        return Err(McpError::Protocol(format!(
            "unsupported envelope version {}",
            request.version
        )));
    }

    // Invariant: Method must not be empty
    if request.method.is_empty() {
        return Err(McpError::Protocol("empty method".to_string()));
    }

    // Invariant: Method must not start with "rpc." (reserved)
    if request.method.starts_with("rpc.") {
        return Err(McpError::Protocol(format!(
            "reserved method name {}",
            request.method
        )));
    }

    Ok(())
}

// ============================================================================
// Identifier Validation
// ============================================================================

/// Validate a resource URI
pub fn validate_resource_uri(uri: &str) -> Result<&str> {
    // Invariant: Must start with ghost://
    let path = uri.strip_prefix(RESOURCE_SCHEME).ok_or_else(|| {
        McpError::InvalidParams(format!(
            "Resource URI must start with '{}'",
            RESOURCE_SCHEME
        ))
    })?;

    // Invariant: Must have a path after the scheme
    if path.is_empty() {
        return Err(McpError::InvalidParams(format!(
            "Resource URI must have a path after '{}'",
            RESOURCE_SCHEME
        )));
    }

    // Invariant: Path must not contain ".."
    if path.contains("..") {
        return Err(McpError::InvalidParams(
            "Resource URI must not contain '..'".to_string(),
        ));
    }

    Ok(uri)
}

/// Validate a tool or prompt name: lowercase ASCII, digits and `_`
pub fn validate_name(name: &str) -> Result<&str> {
    if name.is_empty() || name.len() > 64 {
        return Err(McpError::InvalidParams(format!(
            "Name must be 1-64 characters: {:?}",
            name
        )));
    }

    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
    {
        return Err(McpError::InvalidParams(format!(
            "Name may only contain a-z, 0-9 and '_': {}",
            name
        )));
    }

    Ok(name)
}

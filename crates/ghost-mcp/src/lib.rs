//! Ghost MCP Server
//!
//! This crate implements a Model Context Protocol (MCP) server that exposes a
//! catalog of wallet-analysis tools, readable resources and prompt templates
//! to AI agents.
//!
//! # Features
//!
//! - **Tools**: schema-validated execution with timeouts, per-tool metrics and
//!   an execution history
//! - **Resources**: schema-validated reads served through a TTL cache
//! - **Prompts**: message templates with named arguments
//! - **Sessions**: created by `initialize`, scoped to the negotiated
//!   capabilities, expired when idle
//!
//! # Transport Support
//!
//! - **stdio**: Standard input/output (for desktop agents)
//! - **TCP**: newline-delimited JSON, one session per socket
//!
//! # Example Usage
//!
//! ```no_run
//! use ghost_mcp::{McpServer, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> ghost_mcp::Result<()> {
//!     let server = McpServer::from_config(&ServerConfig::default())?;
//!     server.run_stdio().await
//! }
//! ```
//!
//! # Protocol Version
//!
//! This implementation targets MCP version 2025-11-25 and also accepts
//! 2025-06-18 and 2024-11-05.

pub mod config;
pub mod error;
pub mod handlers;
pub mod invariants;
pub mod prompts;
pub mod protocol;
pub mod resources;
pub mod schema;
pub mod server;
pub mod session;
pub mod tools;
pub mod transport;

pub use config::ServerConfig;
pub use error::{McpError, Result};
pub use handlers::{Dispatcher, MetricsSnapshot, SessionSlot};
pub use protocol::{
    ClientCapabilities, ClientInfo, InitializeParams, InitializeResult, JsonRpcError,
    JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, Method, RequestId,
    ServerCapabilities, ServerInfo, Tool, ToolContent, ToolsCallResult, MCP_PROTOCOL_VERSION,
};
pub use schema::{Schema, SchemaType, ValidationReport};
pub use server::{McpServer, TcpServerHandle};
pub use session::{Session, SessionManager};
pub use tools::{ExecutionError, ExecutionRecord, ExecutionStatus, ToolHandler, ToolRegistry};
pub use resources::{ResourceProvider, ResourceRegistry};

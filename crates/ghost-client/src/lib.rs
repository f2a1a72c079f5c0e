//! Ghost MCP Client
//!
//! Connects to one or more Ghost MCP servers, keeps the connections healthy
//! with heartbeats, and fails over to another server when the active one
//! stops answering.
//!
//! # Example Usage
//!
//! ```no_run
//! use ghost_client::{ClientConfig, McpClient};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> ghost_client::Result<()> {
//!     let config = ClientConfig::default().with_endpoints(["127.0.0.1:7411", "127.0.0.1:7412"]);
//!     let client = McpClient::tcp(config);
//!     client.connect().await?;
//!
//!     let record = client
//!         .call_tool(
//!             "analyze_wallet",
//!             json!({ "wallet_address": "So11111111111111111111111111111111111111112" }),
//!         )
//!         .await?;
//!     println!("{:?}", record.output);
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod manager;
pub mod transport;

pub use client::McpClient;
pub use config::{ClientConfig, LoadBalancing};
pub use connection::{Connection, ConnectionState};
pub use error::{ClientError, Result};
pub use manager::{ConnectionEvent, ConnectionEventKind, ConnectionManager};
pub use transport::{Connector, InProcessConnector, TcpConnector, Transport};

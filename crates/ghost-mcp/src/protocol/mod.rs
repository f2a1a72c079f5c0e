//! MCP Protocol implementation
//!
//! Envelope, method table, capability negotiation and payload types.

pub mod capabilities;
pub mod jsonrpc;
pub mod lifecycle;
pub mod messages;
pub mod method;

pub use capabilities::*;
pub use jsonrpc::*;
pub use lifecycle::*;
pub use messages::*;
pub use method::*;

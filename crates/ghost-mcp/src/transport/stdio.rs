//! stdio transport for MCP
//!
//! stdout carries protocol messages only; logs go to stderr.

use tokio::io::{BufReader, Stdin, Stdout};

use super::LineTransport;

pub type StdioTransport = LineTransport<BufReader<Stdin>, Stdout>;

pub fn stdio_transport() -> StdioTransport {
    LineTransport::new(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
}

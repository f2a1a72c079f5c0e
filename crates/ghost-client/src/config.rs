//! Client configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use ghost_mcp::protocol::{ClientInfo, MCP_PROTOCOL_VERSION};

/// How `send` picks a connection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadBalancing {
    /// Always use the active connection; switch only when it fails
    #[default]
    FailoverOnly,
    /// Rotate over every healthy connection
    RoundRobin,
}

/// Client configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Name sent in `clientInfo`
    pub client_name: String,

    /// Version sent in `clientInfo`
    pub client_version: String,

    /// Protocol version requested at `initialize`
    pub protocol_version: String,

    /// Capability families declared at `initialize`
    pub capabilities: Vec<String>,

    /// Server endpoints, in preference order
    pub endpoints: Vec<String>,

    /// Per-request timeout (milliseconds)
    pub request_timeout_ms: u64,

    /// Interval between heartbeat rounds (milliseconds)
    pub heartbeat_interval_ms: u64,

    /// Heartbeats older than this mark a connection stale (milliseconds)
    pub heartbeat_timeout_ms: u64,

    /// Connect attempts per `establish`
    pub max_connect_attempts: u32,

    /// Delay between connect attempts (milliseconds)
    pub reconnect_backoff_ms: u64,

    pub load_balancing: LoadBalancing,

    /// Connection events kept for inspection
    pub event_history_limit: usize,

    /// Client-side execution records kept for inspection
    pub execution_history_limit: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            client_name: "ghost-client".to_string(),
            client_version: env!("CARGO_PKG_VERSION").to_string(),
            protocol_version: MCP_PROTOCOL_VERSION.to_string(),
            capabilities: vec![
                "tools".to_string(),
                "resources".to_string(),
                "prompts".to_string(),
            ],
            endpoints: vec!["127.0.0.1:7411".to_string()],
            request_timeout_ms: 30_000,
            heartbeat_interval_ms: 5_000,
            heartbeat_timeout_ms: 15_000,
            max_connect_attempts: 3,
            reconnect_backoff_ms: 500,
            load_balancing: LoadBalancing::FailoverOnly,
            event_history_limit: 128,
            execution_history_limit: 256,
        }
    }
}

impl ClientConfig {
    pub fn with_endpoints<I, S>(mut self, endpoints: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.endpoints = endpoints.into_iter().map(Into::into).collect();
        self
    }

    pub fn client_info(&self) -> ClientInfo {
        ClientInfo::new(&self.client_name, &self.client_version)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_millis(self.heartbeat_timeout_ms)
    }

    pub fn reconnect_backoff(&self) -> Duration {
        Duration::from_millis(self.reconnect_backoff_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: ClientConfig =
            serde_json::from_str(r#"{"endpoints": ["a:1", "b:2"], "load_balancing": "round_robin"}"#)
                .unwrap();
        assert_eq!(config.endpoints, vec!["a:1", "b:2"]);
        assert_eq!(config.load_balancing, LoadBalancing::RoundRobin);
        assert_eq!(config.max_connect_attempts, 3);
        assert_eq!(config.heartbeat_timeout(), Duration::from_secs(15));
    }
}

//! Server configuration

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Server configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Name reported in `serverInfo`
    pub server_name: String,

    /// Version reported in `serverInfo`
    pub server_version: String,

    /// Instructions returned from `initialize`
    pub instructions: Option<String>,

    /// Resource cache TTL (seconds)
    pub cache_ttl_secs: u64,

    /// Sessions idle longer than this are expired (seconds)
    pub session_idle_timeout_secs: u64,

    /// How often idle sessions are swept (seconds)
    pub session_sweep_interval_secs: u64,

    /// Per-call tool timeout (seconds)
    pub tool_timeout_secs: u64,

    /// Execution records kept for inspection
    pub execution_history_limit: usize,

    /// Dispatcher error events kept for inspection
    pub event_history_limit: usize,

    /// Listen address for the TCP transport
    pub tcp_bind: String,

    /// Addresses flagged by `check_compliance`
    pub blacklist: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            server_name: "ghost-mcp".to_string(),
            server_version: env!("CARGO_PKG_VERSION").to_string(),
            instructions: Some(
                "Wallet analysis tools. Call initialize, then tools/list.".to_string(),
            ),
            cache_ttl_secs: 300,
            session_idle_timeout_secs: 1800,
            session_sweep_interval_secs: 60,
            tool_timeout_secs: 30,
            execution_history_limit: 256,
            event_history_limit: 256,
            tcp_bind: "127.0.0.1:7411".to_string(),
            blacklist: Vec::new(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from file
    pub fn load(path: &Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.check()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> crate::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Reject values that would make the server unusable
    pub fn check(&self) -> crate::Result<()> {
        if self.tool_timeout_secs == 0 {
            return Err(crate::McpError::Config(
                "tool_timeout_secs must be positive".to_string(),
            ));
        }
        if self.session_sweep_interval_secs == 0 {
            return Err(crate::McpError::Config(
                "session_sweep_interval_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn session_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.session_idle_timeout_secs)
    }

    pub fn session_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.session_sweep_interval_secs)
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.cache_ttl(), Duration::from_secs(300));
        assert_eq!(config.tool_timeout(), Duration::from_secs(30));
        assert_eq!(config.tcp_bind, "127.0.0.1:7411");
        assert!(config.check().is_ok());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ghost.json");

        let config = ServerConfig {
            cache_ttl_secs: 5,
            blacklist: vec!["So11111111111111111111111111111111111111112".to_string()],
            ..ServerConfig::default()
        };
        config.save(&path).unwrap();

        let loaded = ServerConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.json");
        std::fs::write(&path, r#"{"cache_ttl_secs": 10}"#).unwrap();

        let loaded = ServerConfig::load(&path).unwrap();
        assert_eq!(loaded.cache_ttl_secs, 10);
        assert_eq!(loaded.session_idle_timeout_secs, 1800);
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, r#"{"tool_timeout_secs": 0}"#).unwrap();

        assert!(matches!(
            ServerConfig::load(&path),
            Err(crate::McpError::Config(_))
        ));
    }
}

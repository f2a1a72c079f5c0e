//! MCP capability negotiation types
//!
//! Defines client and server capabilities for MCP protocol negotiation.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Preferred MCP protocol version
pub const MCP_PROTOCOL_VERSION: &str = "2025-11-25";

/// Every protocol version this server accepts at `initialize`
pub const SUPPORTED_PROTOCOL_VERSIONS: &[&str] = &["2025-11-25", "2025-06-18", "2024-11-05"];

/// Check whether a requested protocol version is accepted
pub fn is_supported_version(version: &str) -> bool {
    SUPPORTED_PROTOCOL_VERSIONS.contains(&version)
}

/// Client information sent during initialization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientInfo {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl ClientInfo {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: Some(version.into()),
        }
    }
}

/// Server information sent during initialization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
}

impl Default for ServerInfo {
    fn default() -> Self {
        Self {
            name: "ghost-mcp".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// A feature family a session can negotiate
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    Tools,
    Resources,
    Prompts,
}

impl Capability {
    pub const ALL: [Capability; 3] = [
        Capability::Tools,
        Capability::Resources,
        Capability::Prompts,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Tools => "tools",
            Capability::Resources => "resources",
            Capability::Prompts => "prompts",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Capability {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Capability::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| format!("unknown capability: {}", s))
    }
}

/// Capabilities declared by a client at `initialize`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientCapabilities {
    /// Feature families the client intends to use
    #[serde(default)]
    pub supported: Vec<String>,
}

impl ClientCapabilities {
    pub fn all() -> Self {
        Self {
            supported: Capability::ALL
                .iter()
                .map(|c| c.as_str().to_string())
                .collect(),
        }
    }

    /// Intersect the declared list with what the server offers.
    ///
    /// An empty declaration means "whatever the server has". Unknown names are
    /// ignored.
    pub fn negotiate(&self, offered: &BTreeSet<Capability>) -> BTreeSet<Capability> {
        if self.supported.is_empty() {
            return offered.clone();
        }

        self.supported
            .iter()
            .filter_map(|name| name.parse::<Capability>().ok())
            .filter(|cap| offered.contains(cap))
            .collect()
    }
}

/// Capabilities that this server provides
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerCapabilities {
    /// Server provides tools
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<ToolsCapability>,

    /// Server provides resources
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourcesCapability>,

    /// Server provides prompts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompts: Option<PromptsCapability>,
}

impl ServerCapabilities {
    /// Capability flags for a negotiated set
    pub fn from_negotiated(negotiated: &BTreeSet<Capability>) -> Self {
        Self {
            tools: negotiated.contains(&Capability::Tools).then(|| ToolsCapability {
                list_changed: Some(false),
            }),
            resources: negotiated
                .contains(&Capability::Resources)
                .then(|| ResourcesCapability {
                    subscribe: Some(false),
                    list_changed: Some(false),
                }),
            prompts: negotiated.contains(&Capability::Prompts).then(|| PromptsCapability {
                list_changed: Some(false),
            }),
        }
    }
}

/// Tools capability
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolsCapability {
    /// Server will send notifications when tool list changes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub list_changed: Option<bool>,
}

/// Resources capability
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourcesCapability {
    /// Server supports resource subscriptions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscribe: Option<bool>,

    /// Server will send notifications when resource list changes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub list_changed: Option<bool>,
}

/// Prompts capability
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptsCapability {
    /// Server will send notifications when prompt list changes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub list_changed: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offered() -> BTreeSet<Capability> {
        [Capability::Tools, Capability::Resources, Capability::Prompts]
            .into_iter()
            .collect()
    }

    #[test]
    fn test_empty_declaration_gets_everything_offered() {
        let negotiated = ClientCapabilities::default().negotiate(&offered());
        assert_eq!(negotiated, offered());
    }

    #[test]
    fn test_negotiation_is_an_intersection() {
        let client = ClientCapabilities {
            supported: vec![
                "tools".to_string(),
                "logging".to_string(),
                "sampling".to_string(),
            ],
        };
        let negotiated = client.negotiate(&offered());
        assert_eq!(negotiated, [Capability::Tools].into_iter().collect());
    }

    #[test]
    fn test_server_capabilities_follow_negotiation() {
        let caps = ServerCapabilities::from_negotiated(&[Capability::Tools].into_iter().collect());
        assert!(caps.tools.is_some());
        assert!(caps.resources.is_none());
        assert!(caps.prompts.is_none());

        let json = serde_json::to_value(&caps).unwrap();
        assert!(json.get("resources").is_none());
    }

    #[test]
    fn test_supported_versions() {
        assert!(is_supported_version(MCP_PROTOCOL_VERSION));
        assert!(!is_supported_version("bad-version"));
    }
}

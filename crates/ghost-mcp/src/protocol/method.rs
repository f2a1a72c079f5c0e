//! Closed set of request methods understood by the server

use std::fmt;
use std::str::FromStr;

use super::capabilities::Capability;

/// Request method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Initialize,
    Ping,
    ToolsList,
    ToolsCall,
    ResourcesList,
    ResourcesRead,
    PromptsList,
    PromptsGet,
}

impl Method {
    pub const ALL: [Method; 8] = [
        Method::Initialize,
        Method::Ping,
        Method::ToolsList,
        Method::ToolsCall,
        Method::ResourcesList,
        Method::ResourcesRead,
        Method::PromptsList,
        Method::PromptsGet,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Initialize => "initialize",
            Method::Ping => "ping",
            Method::ToolsList => "tools/list",
            Method::ToolsCall => "tools/call",
            Method::ResourcesList => "resources/list",
            Method::ResourcesRead => "resources/read",
            Method::PromptsList => "prompts/list",
            Method::PromptsGet => "prompts/get",
        }
    }

    /// Whether the method may be called before `initialize`
    pub fn allowed_without_session(&self) -> bool {
        matches!(self, Method::Initialize | Method::Ping)
    }

    /// Capability a session must have negotiated to call this method
    pub fn required_capability(&self) -> Option<Capability> {
        match self {
            Method::Initialize | Method::Ping => None,
            Method::ToolsList | Method::ToolsCall => Some(Capability::Tools),
            Method::ResourcesList | Method::ResourcesRead => Some(Capability::Resources),
            Method::PromptsList | Method::PromptsGet => Some(Capability::Prompts),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unknown method name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownMethod(pub String);

impl FromStr for Method {
    type Err = UnknownMethod;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Method::ALL
            .iter()
            .copied()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| UnknownMethod(s.to_string()))
    }
}

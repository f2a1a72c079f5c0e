//! MCP request dispatch
//!
//! The [`Dispatcher`] owns the registries and the session table and turns one
//! incoming message into at most one response. Transports keep a
//! [`SessionSlot`] per connection and pass it in with every message.

mod metrics;

pub use metrics::{DispatchMetrics, ErrorEvent, MetricsSnapshot};

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeSet;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::error::{McpError, Result};
use crate::invariants;
use crate::prompts::{self, PromptCatalog};
use crate::protocol::*;
use crate::resources::{self, ResourceRegistry};
use crate::session::SessionManager;
use crate::tools::{self, ExecutionError, ToolRegistry};

/// Session bound to one connection
#[derive(Debug, Default, Clone)]
pub struct SessionSlot {
    session_id: Option<String>,
}

impl SessionSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }
}

/// Routes messages to the tool registry, resource registry and prompt catalog
pub struct Dispatcher {
    info: ServerInfo,
    instructions: Option<String>,
    tools: ToolRegistry,
    resources: ResourceRegistry,
    prompts: PromptCatalog,
    sessions: SessionManager,
    metrics: Mutex<DispatchMetrics>,
}

impl Dispatcher {
    /// Build a dispatcher around already populated registries
    pub fn new(
        config: &ServerConfig,
        tools: ToolRegistry,
        resources: ResourceRegistry,
        prompts: PromptCatalog,
    ) -> Self {
        let offered: BTreeSet<Capability> =
            [Capability::Tools, Capability::Resources, Capability::Prompts]
                .into_iter()
                .collect();

        Self {
            info: ServerInfo {
                name: config.server_name.clone(),
                version: config.server_version.clone(),
            },
            instructions: config.instructions.clone(),
            tools,
            resources,
            prompts,
            sessions: SessionManager::new(offered, config.session_idle_timeout()),
            metrics: Mutex::new(DispatchMetrics::new(config.event_history_limit)),
        }
    }

    /// Dispatcher with the wallet-analysis catalog registered
    pub fn with_builtin(config: &ServerConfig) -> Result<Self> {
        let mut tool_registry =
            ToolRegistry::new(config.tool_timeout(), config.execution_history_limit);
        tools::register_builtin(&mut tool_registry, &config.blacklist)?;

        let mut resource_registry = ResourceRegistry::new(config.cache_ttl());
        resources::register_builtin(&mut resource_registry)?;

        let mut prompt_catalog = PromptCatalog::new();
        prompts::register_builtin(&mut prompt_catalog)?;

        Ok(Self::new(config, tool_registry, resource_registry, prompt_catalog))
    }

    pub fn info(&self) -> &ServerInfo {
        &self.info
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn resources(&self) -> &ResourceRegistry {
        &self.resources
    }

    pub fn prompts(&self) -> &PromptCatalog {
        &self.prompts
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    /// Handle one line of newline-delimited JSON.
    ///
    /// Returns the serialized response, or `None` when nothing is owed
    /// (notifications, stray responses).
    pub async fn handle_line(&self, slot: &mut SessionSlot, line: &str) -> Option<String> {
        let response = match serde_json::from_str::<serde_json::Value>(line) {
            Ok(value) => self.handle_value(slot, value).await?,
            Err(e) => {
                warn!("Failed to parse message: {}", e);
                let err = JsonRpcError::parse_error();
                self.record_error("", &err).await;
                JsonRpcResponse::error(RequestId::Null, err)
            }
        };

        encode_response(&response)
    }

    /// Handle one decoded JSON document
    pub async fn handle_value(
        &self,
        slot: &mut SessionSlot,
        value: serde_json::Value,
    ) -> Option<JsonRpcResponse> {
        let id = value
            .get("id")
            .cloned()
            .and_then(|id| serde_json::from_value::<RequestId>(id).ok())
            .unwrap_or(RequestId::Null);

        match JsonRpcMessage::from_value(value) {
            Ok(JsonRpcMessage::Request(request)) => Some(self.handle_request(slot, &request).await),
            Ok(JsonRpcMessage::Notification(notification)) => {
                self.handle_notification(slot, &notification).await;
                None
            }
            Ok(JsonRpcMessage::Response(response))
                if response.result.is_some() || response.error.is_some() =>
            {
                debug!("Ignoring response for id {}", response.id);
                None
            }
            Ok(JsonRpcMessage::Response(_)) | Err(_) => {
                let err = JsonRpcError::invalid_request();
                self.record_error("", &err).await;
                Some(JsonRpcResponse::error(id, err))
            }
        }
    }

    /// Handle an incoming JSON-RPC request
    pub async fn handle_request(
        &self,
        slot: &mut SessionSlot,
        request: &JsonRpcRequest,
    ) -> JsonRpcResponse {
        debug!("Handling request: {} (id: {})", request.method, request.id);
        self.metrics.lock().await.record_request(&request.method);

        let result = match invariants::validate_request(request) {
            Ok(()) => self.route(slot, request).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(value) => JsonRpcResponse::success(request.id.clone(), value),
            Err(e) => {
                let err = JsonRpcError::from(e);
                self.record_error(&request.method, &err).await;
                JsonRpcResponse::error(request.id.clone(), err)
            }
        }
    }

    async fn route(&self, slot: &mut SessionSlot, request: &JsonRpcRequest) -> Result<serde_json::Value> {
        let method: Method = request
            .method
            .parse()
            .map_err(|_| McpError::MethodNotFound(request.method.clone()))?;

        if !method.allowed_without_session() {
            self.require_session(slot, method).await?;
        }

        let params = request.params.clone();
        match method {
            Method::Initialize => self.handle_initialize(slot, params).await,
            Method::Ping => self.handle_ping(slot).await,
            Method::ToolsList => self.handle_tools_list(params),
            Method::ToolsCall => self.handle_tools_call(params).await,
            Method::ResourcesList => to_value(&ResourcesListResult {
                resources: self.resources.list(),
            }),
            Method::ResourcesRead => self.handle_resources_read(params).await,
            Method::PromptsList => to_value(&PromptsListResult {
                prompts: self.prompts.list(),
            }),
            Method::PromptsGet => self.handle_prompts_get(params),
        }
    }

    /// Touch the slot's session and check the method was negotiated
    async fn require_session(&self, slot: &mut SessionSlot, method: Method) -> Result<()> {
        let id = slot.session_id.as_deref().ok_or(McpError::SessionRequired)?;

        let session = match self.sessions.touch(id).await {
            Ok(session) => session,
            Err(e) => {
                // Expired underneath the connection
                slot.session_id = None;
                return Err(e);
            }
        };

        match method.required_capability() {
            Some(capability) if !session.has_capability(capability) => {
                warn!(
                    "Session {} called {} without negotiating {}",
                    session.id, method, capability
                );
                Err(McpError::MethodNotFound(method.to_string()))
            }
            _ => Ok(()),
        }
    }

    /// Handle an incoming notification
    pub async fn handle_notification(&self, slot: &SessionSlot, notification: &JsonRpcNotification) {
        debug!("Handling notification: {}", notification.method);

        match notification.method.as_str() {
            "notifications/initialized" => {
                info!(
                    "Client confirmed initialization (session: {})",
                    slot.session_id().unwrap_or("none")
                );
            }
            "notifications/cancelled" => {
                let cancelled = notification
                    .params
                    .clone()
                    .and_then(|p| serde_json::from_value::<CancelledNotification>(p).ok());
                if let Some(cancelled) = cancelled {
                    warn!("Request cancelled: {}", cancelled.request_id);
                }
            }
            _ => debug!("Unknown notification: {}", notification.method),
        }
    }

    /// Drop the slot's session when its connection goes away
    pub async fn close(&self, slot: &mut SessionSlot) {
        if let Some(id) = slot.session_id.take() {
            self.sessions.expire(&id).await;
        }
    }

    pub async fn expire_idle_sessions(&self) -> usize {
        self.sessions.expire_idle().await.len()
    }

    pub async fn metrics(&self) -> MetricsSnapshot {
        let (total_requests, total_errors, per_method, recent_errors) = {
            let metrics = self.metrics.lock().await;
            (
                metrics.total_requests(),
                metrics.total_errors(),
                metrics.per_method(),
                metrics.events(),
            )
        };

        MetricsSnapshot {
            total_requests,
            total_errors,
            per_method,
            recent_errors,
            active_sessions: self.sessions.len().await,
            tools: self.tools.all_metrics().await,
            cache: self.resources.cache_stats().await,
        }
    }

    async fn record_error(&self, method: &str, err: &JsonRpcError) {
        self.metrics
            .lock()
            .await
            .record_error(method, err.code, err.message.clone());
    }

    // ========================================================================
    // Lifecycle Handlers
    // ========================================================================

    async fn handle_initialize(
        &self,
        slot: &mut SessionSlot,
        params: Option<serde_json::Value>,
    ) -> Result<serde_json::Value> {
        let params: InitializeParams = parse_params(params)?;

        info!(
            "Initialize request from {} (version: {})",
            params.client_info.name, params.protocol_version
        );

        if !is_supported_version(&params.protocol_version) {
            warn!(
                "Protocol version mismatch: client={}, supported={:?}",
                params.protocol_version, SUPPORTED_PROTOCOL_VERSIONS
            );
            return Err(McpError::ProtocolVersionMismatch(params.protocol_version));
        }

        if let Some(previous) = slot.session_id.take() {
            debug!("Re-initialize replaces session {}", previous);
            self.sessions.expire(&previous).await;
        }

        let session = self
            .sessions
            .create(
                params.client_info,
                params.protocol_version.clone(),
                &params.capabilities,
            )
            .await;
        slot.session_id = Some(session.id.clone());

        to_value(&InitializeResult {
            protocol_version: params.protocol_version,
            capabilities: ServerCapabilities::from_negotiated(&session.capabilities),
            server_info: self.info.clone(),
            session_id: session.id,
            instructions: self.instructions.clone(),
        })
    }

    async fn handle_ping(&self, slot: &mut SessionSlot) -> Result<serde_json::Value> {
        if let Some(id) = slot.session_id.as_deref() {
            if self.sessions.touch(id).await.is_err() {
                slot.session_id = None;
            }
        }
        Ok(serde_json::json!({}))
    }

    // ========================================================================
    // Tools Handlers
    // ========================================================================

    fn handle_tools_list(&self, params: Option<serde_json::Value>) -> Result<serde_json::Value> {
        let params: ToolsListParams = parse_optional_params(params)?;
        to_value(&ToolsListResult {
            tools: self.tools.list(params.category.as_deref()),
        })
    }

    async fn handle_tools_call(&self, params: Option<serde_json::Value>) -> Result<serde_json::Value> {
        let params: ToolsCallParams = parse_params(params)?;
        debug!("Calling tool: {}", params.name);

        let record = self.tools.execute(&params.name, params.arguments).await?;

        let result = match (record.output, record.error) {
            (_, Some(ExecutionError::Validation { errors })) => {
                return Err(McpError::Validation(errors))
            }
            (_, Some(failure)) => {
                let message = format!("{}: {}", params.name, failure);
                let err = match failure {
                    ExecutionError::Timeout { .. } => JsonRpcError::timeout(message),
                    _ => JsonRpcError::execution_error(message),
                };
                self.record_error(Method::ToolsCall.as_str(), &err).await;
                ToolsCallResult::error(err.message)
            }
            (Some(output), None) => ToolsCallResult::success(output),
            (None, None) => ToolsCallResult::success(serde_json::Value::Null),
        };

        to_value(&result)
    }

    // ========================================================================
    // Resources Handlers
    // ========================================================================

    async fn handle_resources_read(
        &self,
        params: Option<serde_json::Value>,
    ) -> Result<serde_json::Value> {
        let params: ResourcesReadParams = parse_params(params)?;
        debug!("Reading resource: {}", params.uri);

        invariants::validate_resource_uri(&params.uri)?;
        let content = self.resources.read(&params.uri, params.arguments).await?;

        to_value(&ResourcesReadResult {
            contents: vec![content],
        })
    }

    // ========================================================================
    // Prompts Handlers
    // ========================================================================

    fn handle_prompts_get(&self, params: Option<serde_json::Value>) -> Result<serde_json::Value> {
        let params: PromptsGetParams = parse_params(params)?;
        debug!("Getting prompt: {}", params.name);

        let result = self.prompts.get(&params.name, params.arguments.as_ref())?;
        to_value(&result)
    }
}

/// Serialize a response for the wire
pub fn encode_response(response: &JsonRpcResponse) -> Option<String> {
    match serde_json::to_string(response) {
        Ok(json) => Some(json),
        Err(e) => {
            error!("Failed to serialize response: {}", e);
            None
        }
    }
}

fn parse_params<T: DeserializeOwned>(params: Option<serde_json::Value>) -> Result<T> {
    params
        .ok_or_else(|| McpError::InvalidParams("Missing params".to_string()))
        .and_then(|p| {
            serde_json::from_value(p)
                .map_err(|e| McpError::InvalidParams(format!("Invalid params: {}", e)))
        })
}

fn parse_optional_params<T: DeserializeOwned + Default>(
    params: Option<serde_json::Value>,
) -> Result<T> {
    params
        .map(serde_json::from_value)
        .transpose()
        .map_err(|e| McpError::InvalidParams(e.to_string()))
        .map(Option::unwrap_or_default)
}

fn to_value<T: Serialize>(value: &T) -> Result<serde_json::Value> {
    serde_json::to_value(value).map_err(|e| McpError::Internal(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn dispatcher() -> Dispatcher {
        Dispatcher::with_builtin(&ServerConfig::default()).unwrap()
    }

    fn request(id: i64, method: &str, params: serde_json::Value) -> JsonRpcRequest {
        JsonRpcRequest::new(id, method).with_params(params)
    }

    async fn initialize(dispatcher: &Dispatcher, slot: &mut SessionSlot, caps: &[&str]) {
        let response = dispatcher
            .handle_request(
                slot,
                &request(
                    1,
                    "initialize",
                    json!({
                        "protocolVersion": "2025-11-25",
                        "capabilities": { "supported": caps },
                        "clientInfo": { "name": "test-client", "version": "1.0.0" }
                    }),
                ),
            )
            .await;
        assert!(response.error.is_none(), "{:?}", response.error);
    }

    #[tokio::test]
    async fn test_handle_initialize() {
        let dispatcher = dispatcher();
        let mut slot = SessionSlot::new();
        initialize(&dispatcher, &mut slot, &[]).await;

        assert!(slot.session_id().is_some());
        assert_eq!(dispatcher.sessions().len().await, 1);
    }

    #[tokio::test]
    async fn test_bad_version_creates_no_session() {
        let dispatcher = dispatcher();
        let mut slot = SessionSlot::new();

        let response = dispatcher
            .handle_request(
                &mut slot,
                &request(
                    1,
                    "initialize",
                    json!({ "protocolVersion": "bad-version", "clientInfo": { "name": "x" } }),
                ),
            )
            .await;

        assert_eq!(response.error.unwrap().code, codes::PROTOCOL_VERSION_MISMATCH);
        assert!(slot.session_id().is_none());
        assert_eq!(dispatcher.sessions().len().await, 0);
    }

    #[tokio::test]
    async fn test_session_required() {
        let dispatcher = dispatcher();
        let mut slot = SessionSlot::new();

        let response = dispatcher
            .handle_request(&mut slot, &request(1, "tools/list", json!({})))
            .await;
        assert_eq!(response.error.unwrap().code, codes::SESSION_REQUIRED);

        let ping = dispatcher
            .handle_request(&mut slot, &request(2, "ping", json!({})))
            .await;
        assert!(ping.error.is_none());
    }

    #[tokio::test]
    async fn test_handle_tools_list() {
        let dispatcher = dispatcher();
        let mut slot = SessionSlot::new();
        initialize(&dispatcher, &mut slot, &[]).await;

        let response = dispatcher
            .handle_request(&mut slot, &request(2, "tools/list", json!({ "category": "compliance" })))
            .await;
        let result = response.result.unwrap();
        assert_eq!(result["tools"].as_array().unwrap().len(), 1);
        assert_eq!(result["tools"][0]["name"], "check_compliance");
    }

    #[tokio::test]
    async fn test_unnegotiated_capability_is_method_not_found() {
        let dispatcher = dispatcher();
        let mut slot = SessionSlot::new();
        initialize(&dispatcher, &mut slot, &["tools"]).await;

        let response = dispatcher
            .handle_request(&mut slot, &request(2, "prompts/list", json!({})))
            .await;
        assert_eq!(response.error.unwrap().code, codes::METHOD_NOT_FOUND);
    }

    #[tokio::test]
    async fn test_unknown_method() {
        let dispatcher = dispatcher();
        let mut slot = SessionSlot::new();
        initialize(&dispatcher, &mut slot, &[]).await;

        let response = dispatcher
            .handle_request(&mut slot, &request(2, "tools/delete", json!({})))
            .await;
        assert_eq!(response.error.unwrap().code, codes::METHOD_NOT_FOUND);
    }

    #[tokio::test]
    async fn test_request_count_tracks_calls() {
        let dispatcher = dispatcher();
        let mut slot = SessionSlot::new();
        initialize(&dispatcher, &mut slot, &[]).await;

        for id in 2..5 {
            dispatcher
                .handle_request(&mut slot, &request(id, "resources/list", json!({})))
                .await;
        }

        let session = dispatcher
            .sessions()
            .get(slot.session_id().unwrap())
            .await
            .unwrap();
        assert_eq!(session.request_count, 3);
        assert_eq!(dispatcher.metrics().await.total_requests, 4);
    }

    #[tokio::test]
    async fn test_reinitialize_replaces_session() {
        let dispatcher = dispatcher();
        let mut slot = SessionSlot::new();
        initialize(&dispatcher, &mut slot, &[]).await;
        let first = slot.session_id().unwrap().to_string();

        initialize(&dispatcher, &mut slot, &[]).await;
        assert_ne!(slot.session_id().unwrap(), first);
        assert_eq!(dispatcher.sessions().len().await, 1);
    }

    #[tokio::test]
    async fn test_parse_error_has_null_id() {
        let dispatcher = dispatcher();
        let mut slot = SessionSlot::new();

        let line = dispatcher.handle_line(&mut slot, "{not json").await.unwrap();
        let response: JsonRpcResponse = serde_json::from_str(&line).unwrap();
        assert_eq!(response.id, RequestId::Null);
        assert_eq!(response.error.unwrap().code, codes::PARSE_ERROR);
    }

    #[tokio::test]
    async fn test_notifications_get_no_response() {
        let dispatcher = dispatcher();
        let mut slot = SessionSlot::new();

        let reply = dispatcher
            .handle_line(&mut slot, r#"{"version":"2.0","method":"notifications/initialized"}"#)
            .await;
        assert!(reply.is_none());
    }

    #[tokio::test]
    async fn test_tool_failure_recorded_as_event() {
        let dispatcher = dispatcher();
        let mut slot = SessionSlot::new();
        initialize(&dispatcher, &mut slot, &[]).await;

        let response = dispatcher
            .handle_request(
                &mut slot,
                &request(2, "tools/call", json!({ "name": "analyze_wallet", "arguments": {} })),
            )
            .await;
        let err = response.error.unwrap();
        assert_eq!(err.code, codes::INVALID_PARAMS);
        assert_eq!(
            err.validation_errors(),
            vec!["wallet_address: required field missing".to_string()]
        );

        let snapshot = dispatcher.metrics().await;
        assert_eq!(snapshot.total_errors, 1);
        assert_eq!(snapshot.recent_errors[0].method, "tools/call");
        assert_eq!(snapshot.tools["analyze_wallet"].error_stats.validation_errors, 1);
    }
}

//! High-level MCP client
//!
//! Typed wrappers over the connection manager for every server method, plus a
//! client-side history of tool executions. A connected client runs its own
//! heartbeat monitor, which keeps idle connections alive and reconnects
//! failed ones.

use std::collections::VecDeque;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{info, warn};

use ghost_mcp::protocol::{
    Method, Prompt, PromptsGetResult, PromptsListResult, Resource, ResourceContent,
    ResourcesListResult, ResourcesReadResult, Tool, ToolsCallResult, ToolsListResult,
};
use ghost_mcp::{ExecutionError, ExecutionRecord};

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::manager::ConnectionManager;
use crate::transport::{Connector, TcpConnector};

struct Monitor {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// MCP client over a pool of server connections.
///
/// Dropping the client stops its heartbeat monitor.
pub struct McpClient {
    manager: Arc<ConnectionManager>,
    executions: Mutex<VecDeque<ExecutionRecord>>,
    monitor: Mutex<Option<Monitor>>,
}

impl McpClient {
    pub fn new(config: ClientConfig, connector: Arc<dyn Connector>) -> Self {
        Self {
            manager: Arc::new(ConnectionManager::new(config, connector)),
            executions: Mutex::new(VecDeque::new()),
            monitor: Mutex::new(None),
        }
    }

    /// Client that reaches its endpoints over TCP
    pub fn tcp(config: ClientConfig) -> Self {
        Self::new(config, Arc::new(TcpConnector))
    }

    pub fn manager(&self) -> &Arc<ConnectionManager> {
        &self.manager
    }

    /// Establish every configured endpoint and start the heartbeat monitor.
    ///
    /// Returns the ids of the connections that came up; fails only if none did.
    /// Endpoints that did not come up are retried by the monitor.
    pub async fn connect(&self) -> Result<Vec<String>> {
        let endpoints = self.manager.config().endpoints.clone();
        let mut connected = Vec::new();
        let mut last_error = None;

        for endpoint in &endpoints {
            match self.manager.establish(endpoint).await {
                Ok(id) => connected.push(id),
                Err(e) => {
                    warn!("Could not connect to {}: {}", endpoint, e);
                    last_error = Some(e);
                }
            }
        }

        if connected.is_empty() {
            return Err(last_error.unwrap_or_else(|| {
                ClientError::Connection("no endpoints configured".to_string())
            }));
        }
        info!("Connected to {}/{} endpoints", connected.len(), endpoints.len());
        self.start_monitor().await;
        Ok(connected)
    }

    async fn start_monitor(&self) {
        let mut monitor = self.monitor.lock().await;
        if monitor.as_ref().is_some_and(|m| !m.task.is_finished()) {
            return;
        }
        let (shutdown, shutdown_rx) = watch::channel(false);
        let task = self.manager.spawn_heartbeat_monitor(shutdown_rx);
        *monitor = Some(Monitor { shutdown, task });
    }

    /// Stop the heartbeat monitor and close every connection
    pub async fn disconnect(&self) {
        if let Some(monitor) = self.monitor.lock().await.take() {
            let _ = monitor.shutdown.send(true);
            if let Err(e) = monitor.task.await {
                warn!("Heartbeat monitor failed: {}", e);
            }
        }
        self.manager.disconnect_all().await;
    }

    /// Whether the heartbeat monitor is running
    pub async fn is_monitoring(&self) -> bool {
        self.monitor
            .lock()
            .await
            .as_ref()
            .is_some_and(|m| !m.task.is_finished())
    }

    async fn request<T: DeserializeOwned>(&self, method: Method, params: Option<Value>) -> Result<T> {
        let value = self.manager.send(method.as_str(), params).await?;
        Ok(serde_json::from_value(value)?)
    }

    pub async fn ping(&self) -> Result<()> {
        self.manager.send(Method::Ping.as_str(), None).await?;
        Ok(())
    }

    pub async fn list_tools(&self, category: Option<&str>) -> Result<Vec<Tool>> {
        let params = category.map(|c| json!({ "category": c }));
        let result: ToolsListResult = self.request(Method::ToolsList, params).await?;
        Ok(result.tools)
    }

    /// Invoke a tool and record the outcome.
    ///
    /// A tool that ran and failed yields `Ok` with a failed record. Errors
    /// that kept the tool from running (validation, unknown tool, transport)
    /// are recorded too and returned as `Err`.
    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<ExecutionRecord> {
        let mut record = ExecutionRecord::new(name, arguments.clone());
        record.start();
        let started = Instant::now();

        let params = json!({ "name": name, "arguments": arguments });
        let outcome: Result<ToolsCallResult> = self.request(Method::ToolsCall, Some(params)).await;
        let elapsed = started.elapsed();

        match outcome {
            Ok(result) if result.is_error => {
                record.fail(
                    ExecutionError::Execution {
                        message: result.text(),
                    },
                    elapsed,
                );
            }
            Ok(result) => {
                let output = match result.structured_content {
                    Some(structured) => structured,
                    None => Value::String(result.text()),
                };
                record.complete(output, elapsed);
            }
            Err(e) => {
                let error = match &e {
                    ClientError::Validation(errors) => ExecutionError::Validation {
                        errors: errors.clone(),
                    },
                    ClientError::Timeout(after) => ExecutionError::Timeout {
                        after_ms: after.as_millis() as u64,
                    },
                    other => ExecutionError::Execution {
                        message: other.to_string(),
                    },
                };
                record.fail(error, elapsed);
                self.remember(record).await;
                return Err(e);
            }
        }

        self.remember(record.clone()).await;
        Ok(record)
    }

    async fn remember(&self, record: ExecutionRecord) {
        let limit = self.manager.config().execution_history_limit;
        if limit == 0 {
            return;
        }
        let mut executions = self.executions.lock().await;
        if executions.len() == limit {
            executions.pop_front();
        }
        executions.push_back(record);
    }

    /// Recorded tool executions, oldest first
    pub async fn executions(&self) -> Vec<ExecutionRecord> {
        self.executions.lock().await.iter().cloned().collect()
    }

    pub async fn list_resources(&self) -> Result<Vec<Resource>> {
        let result: ResourcesListResult = self.request(Method::ResourcesList, None).await?;
        Ok(result.resources)
    }

    pub async fn read_resource(&self, uri: &str, arguments: Value) -> Result<Vec<ResourceContent>> {
        let params = json!({ "uri": uri, "arguments": arguments });
        let result: ResourcesReadResult = self.request(Method::ResourcesRead, Some(params)).await?;
        Ok(result.contents)
    }

    pub async fn list_prompts(&self) -> Result<Vec<Prompt>> {
        let result: PromptsListResult = self.request(Method::PromptsList, None).await?;
        Ok(result.prompts)
    }

    pub async fn get_prompt(
        &self,
        name: &str,
        arguments: serde_json::Map<String, Value>,
    ) -> Result<PromptsGetResult> {
        let params = json!({ "name": name, "arguments": arguments });
        self.request(Method::PromptsGet, Some(params)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::InProcessConnector;
    use crate::connection::ConnectionState;
    use ghost_mcp::{Dispatcher, ExecutionStatus, ServerConfig};
    use std::time::Duration;
    use tokio_test::{assert_err, assert_ok};

    const WALLET: &str = "So11111111111111111111111111111111111111112";

    async fn client(endpoints: &[&str], register: &[&str]) -> McpClient {
        let connector = Arc::new(InProcessConnector::new());
        for endpoint in register {
            let dispatcher = Dispatcher::with_builtin(&ServerConfig::default()).unwrap();
            connector.register(*endpoint, Arc::new(dispatcher)).await;
        }
        let config = ClientConfig {
            reconnect_backoff_ms: 1,
            ..ClientConfig::default()
        }
        .with_endpoints(endpoints.iter().copied());
        McpClient::new(config, connector)
    }

    #[tokio::test]
    async fn test_connect_needs_one_endpoint() {
        let client = client(&["missing", "primary"], &["primary"]).await;
        let connected = client.connect().await.unwrap();
        assert_eq!(connected.len(), 1);
        assert_ok!(client.ping().await);

        let nothing = self::client(&["missing"], &[]).await;
        assert_err!(nothing.connect().await);
    }

    #[tokio::test]
    async fn test_list_tools_by_category() {
        let client = client(&["primary"], &["primary"]).await;
        client.connect().await.unwrap();

        let all = client.list_tools(None).await.unwrap();
        assert_eq!(all.len(), 3);

        let analysis = client.list_tools(Some("analysis")).await.unwrap();
        assert!(analysis.iter().all(|t| t.category == "analysis"));
        assert_eq!(analysis.len(), 2);
    }

    #[tokio::test]
    async fn test_call_tool_records_execution() {
        let client = client(&["primary"], &["primary"]).await;
        client.connect().await.unwrap();

        let record = client
            .call_tool("analyze_wallet", json!({ "wallet_address": WALLET }))
            .await
            .unwrap();
        assert_eq!(record.status, ExecutionStatus::Completed);
        let score = record.output.as_ref().unwrap()["risk_score"].as_f64().unwrap();
        assert!((0.0..=1.0).contains(&score));

        let err = client
            .call_tool("analyze_wallet", json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Validation(ref errors) if errors.iter().any(|e| e.contains("wallet_address"))));

        let history = client.executions().await;
        assert_eq!(history.len(), 2);
        assert!(history[0].is_success());
        assert_eq!(history[1].status, ExecutionStatus::Failed);
        assert!(matches!(
            history[1].error,
            Some(ExecutionError::Validation { .. })
        ));
    }

    #[tokio::test]
    async fn test_unknown_tool_is_typed() {
        let client = client(&["primary"], &["primary"]).await;
        client.connect().await.unwrap();

        assert!(matches!(
            client.call_tool("nope", json!({})).await,
            Err(ClientError::ToolNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_resources_and_prompts() {
        let client = client(&["primary"], &["primary"]).await;
        client.connect().await.unwrap();

        let resources = client.list_resources().await.unwrap();
        assert!(resources.iter().any(|r| r.uri == "ghost://risk/thresholds"));

        let first = client
            .read_resource("ghost://wallet/profile", json!({ "wallet_address": WALLET }))
            .await
            .unwrap();
        let second = client
            .read_resource("ghost://wallet/profile", json!({ "wallet_address": WALLET }))
            .await
            .unwrap();
        assert_eq!(first, second);

        assert!(matches!(
            client.read_resource("ghost://nothing", json!({})).await,
            Err(ClientError::ResourceNotFound(_))
        ));

        let prompts = client.list_prompts().await.unwrap();
        assert_eq!(prompts.len(), 2);

        let mut args = serde_json::Map::new();
        args.insert("wallet_address".to_string(), json!(WALLET));
        let prompt = client.get_prompt("investigate_wallet", args).await.unwrap();
        assert!(!prompt.messages.is_empty());

        assert!(matches!(
            client.get_prompt("investigate_wallet", serde_json::Map::new()).await,
            Err(ClientError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_history_is_bounded() {
        let connector = Arc::new(InProcessConnector::new());
        let dispatcher = Dispatcher::with_builtin(&ServerConfig::default()).unwrap();
        connector.register("primary", Arc::new(dispatcher)).await;
        let config = ClientConfig {
            execution_history_limit: 2,
            ..ClientConfig::default()
        }
        .with_endpoints(["primary"]);
        let client = McpClient::new(config, connector);
        client.connect().await.unwrap();

        for _ in 0..3 {
            client
                .call_tool("analyze_wallet", json!({ "wallet_address": WALLET }))
                .await
                .unwrap();
        }
        assert_eq!(client.executions().await.len(), 2);
    }

    async fn monitored_client() -> (McpClient, Arc<InProcessConnector>) {
        let connector = Arc::new(InProcessConnector::new());
        let dispatcher = Dispatcher::with_builtin(&ServerConfig::default()).unwrap();
        connector.register("primary", Arc::new(dispatcher)).await;
        let config = ClientConfig {
            reconnect_backoff_ms: 1,
            ..ClientConfig::default()
        }
        .with_endpoints(["primary"]);
        (McpClient::new(config, connector.clone()), connector)
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_client_keeps_working() {
        let (client, _connector) = monitored_client().await;
        let ids = client.connect().await.unwrap();
        assert!(client.is_monitoring().await);

        // Well past the heartbeat timeout with no calls
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_ok!(client.ping().await);

        let connections = client.manager().connections().await;
        assert_eq!(connections.len(), 1);
        assert_eq!(connections[0].id, ids[0]);
        assert_eq!(connections[0].state, ConnectionState::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_monitor_reconnects_after_outage() {
        let (client, connector) = monitored_client().await;
        let ids = client.connect().await.unwrap();

        connector.set_available("primary", false).await;
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert!(matches!(
            client.ping().await,
            Err(ClientError::NoHealthyConnection)
        ));

        connector.set_available("primary", true).await;
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_ok!(client.ping().await);

        let connections = client.manager().connections().await;
        assert_eq!(connections.len(), 1);
        assert_eq!(connections[0].id, ids[0]);
        assert_eq!(client.manager().active_id().await, Some(ids[0].clone()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_stops_monitor() {
        let (client, _connector) = monitored_client().await;
        client.connect().await.unwrap();
        client.connect().await.unwrap();
        assert_eq!(client.manager().connections().await.len(), 1);

        client.disconnect().await;
        assert!(!client.is_monitoring().await);
        assert!(client.manager().connections().await.is_empty());
        assert!(matches!(
            client.ping().await,
            Err(ClientError::NoHealthyConnection)
        ));
    }
}

//! End-to-end tests over real TCP servers
//!
//! Each test binds servers on ephemeral ports and drives them with the
//! high-level client.

use std::sync::Arc;
use std::time::Duration;

use ghost_client::{
    ClientConfig, ClientError, ConnectionEventKind, ConnectionManager, ConnectionState, McpClient,
};
use ghost_mcp::{ExecutionStatus, McpServer, ServerConfig, TcpServerHandle};
use serde_json::json;

const WALLET: &str = "So11111111111111111111111111111111111111112";

async fn start_server() -> TcpServerHandle {
    let server = McpServer::from_config(&ServerConfig::default()).unwrap();
    server.bind_tcp("127.0.0.1:0").await.unwrap()
}

/// Wait until the client has seen the dropped socket
async fn wait_for_healthy(manager: &ConnectionManager, count: usize) {
    let settled = tokio::time::timeout(Duration::from_secs(5), async {
        while manager.healthy_count().await != count {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(settled.is_ok(), "never reached {count} healthy connection(s)");
}

fn client_for(servers: &[&TcpServerHandle]) -> McpClient {
    let config = ClientConfig {
        request_timeout_ms: 5_000,
        reconnect_backoff_ms: 10,
        ..ClientConfig::default()
    }
    .with_endpoints(servers.iter().map(|s| s.local_addr().to_string()));
    McpClient::tcp(config)
}

#[tokio::test]
async fn test_full_session_over_tcp() {
    let server = start_server().await;
    let client = client_for(&[&server]);
    client.connect().await.unwrap();

    client.ping().await.unwrap();
    assert_eq!(client.list_tools(None).await.unwrap().len(), 3);

    let record = client
        .call_tool("analyze_wallet", json!({ "wallet_address": WALLET, "depth": 2 }))
        .await
        .unwrap();
    assert_eq!(record.status, ExecutionStatus::Completed);
    let output = record.output.unwrap();
    let score = output["risk_score"].as_f64().unwrap();
    assert!((0.0..=1.0).contains(&score));

    let contents = client
        .read_resource("ghost://risk/thresholds", json!({}))
        .await
        .unwrap();
    assert_eq!(contents.len(), 1);

    client.disconnect().await;
    server.shutdown().await;
}

#[tokio::test]
async fn test_primary_loss_absorbed_by_failover() {
    let primary = start_server().await;
    let backup = start_server().await;
    let client = client_for(&[&primary, &backup]);

    let ids = client.connect().await.unwrap();
    assert_eq!(ids.len(), 2);
    let manager = client.manager();
    assert_eq!(manager.active_id().await, Some(ids[0].clone()));

    client.ping().await.unwrap();
    primary.shutdown().await;
    wait_for_healthy(manager, 1).await;

    // The dead primary is skipped before anything is written to it
    let record = client
        .call_tool("analyze_wallet", json!({ "wallet_address": WALLET }))
        .await
        .unwrap();
    assert!(record.is_success());

    assert_eq!(manager.active_id().await, Some(ids[1].clone()));
    let dead = manager.connection(&ids[0]).await.unwrap();
    assert_eq!(dead.state, ConnectionState::Error);
    assert_eq!(dead.failed_requests, 0);

    let events = manager.events().await;
    assert!(events.iter().any(|e| e.kind
        == ConnectionEventKind::Failover {
            from: Some(ids[0].clone()),
            to: ids[1].clone(),
        }));

    assert_eq!(client.executions().await.len(), 1);

    client.disconnect().await;
    backup.shutdown().await;
}

#[tokio::test]
async fn test_all_servers_down() {
    let only = start_server().await;
    let client = client_for(&[&only]);
    client.connect().await.unwrap();

    only.shutdown().await;
    wait_for_healthy(client.manager(), 0).await;
    assert!(matches!(
        client.ping().await,
        Err(ClientError::Connection(_)) | Err(ClientError::NoHealthyConnection)
    ));
    assert!(client.manager().active_id().await.is_none());
    assert!(matches!(
        client.ping().await,
        Err(ClientError::NoHealthyConnection)
    ));
}

#[tokio::test]
async fn test_heartbeat_monitor_fails_over_without_traffic() {
    let primary = start_server().await;
    let backup = start_server().await;

    let config = ClientConfig {
        heartbeat_interval_ms: 20,
        heartbeat_timeout_ms: 1_000,
        request_timeout_ms: 1_000,
        ..ClientConfig::default()
    }
    .with_endpoints([primary.local_addr().to_string(), backup.local_addr().to_string()]);
    let client = McpClient::tcp(config);
    let ids = client.connect().await.unwrap();
    assert!(client.is_monitoring().await);
    let manager = Arc::clone(client.manager());

    primary.shutdown().await;

    let promoted = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if manager.active_id().await.as_deref() == Some(ids[1].as_str()) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(promoted.is_ok(), "heartbeat monitor never failed over");

    // No request was lost to the dead server
    client.ping().await.unwrap();

    client.disconnect().await;
    assert!(!client.is_monitoring().await);
    backup.shutdown().await;
}

//! Client transports
//!
//! A [`Connector`] opens a [`Transport`] to an endpoint. TCP carries
//! newline-delimited JSON and pairs responses with requests by id; the
//! in-process connector calls straight into a [`Dispatcher`].
//!
//! Transports report a message that never left the client as
//! [`ClientError::Transport`]. A request lost after it was written comes back
//! as [`ClientError::Connection`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::{oneshot, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use ghost_mcp::protocol::{JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, RequestId};
use ghost_mcp::{Dispatcher, SessionSlot};

use crate::error::{ClientError, Result};

/// One open connection to a server
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a request and wait for the response with the same id
    async fn request(&self, request: JsonRpcRequest) -> Result<JsonRpcResponse>;

    async fn notify(&self, notification: JsonRpcNotification) -> Result<()>;

    async fn close(&self);

    /// The transport can no longer carry messages
    fn is_closed(&self) -> bool;
}

/// Opens transports to endpoints
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, endpoint: &str) -> Result<Arc<dyn Transport>>;
}

// ============================================================================
// TCP
// ============================================================================

type Pending = Arc<Mutex<HashMap<RequestId, oneshot::Sender<JsonRpcResponse>>>>;

/// Connects over TCP; endpoints are `host:port`
#[derive(Debug, Default, Clone, Copy)]
pub struct TcpConnector;

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self, endpoint: &str) -> Result<Arc<dyn Transport>> {
        let stream = TcpStream::connect(endpoint)
            .await
            .map_err(|e| ClientError::Connection(format!("{}: {}", endpoint, e)))?;
        Ok(Arc::new(TcpTransport::new(stream)))
    }
}

/// Newline-delimited JSON over a TCP stream
pub struct TcpTransport {
    writer: Mutex<OwnedWriteHalf>,
    pending: Pending,
    closed: Arc<AtomicBool>,
    reader: JoinHandle<()>,
}

impl TcpTransport {
    pub fn new(stream: TcpStream) -> Self {
        let (read_half, write_half) = stream.into_split();
        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let closed = Arc::new(AtomicBool::new(false));

        let reader = tokio::spawn(read_responses(
            BufReader::new(read_half),
            Arc::clone(&pending),
            Arc::clone(&closed),
        ));

        Self {
            writer: Mutex::new(write_half),
            pending,
            closed,
            reader,
        }
    }

    async fn write_line(&self, line: &str) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ClientError::Transport("connection closed".to_string()));
        }
        trace!("Sending: {}", line);
        let mut writer = self.writer.lock().await;
        let written: std::io::Result<()> = async {
            writer.write_all(line.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await
        }
        .await;
        written.map_err(|e| ClientError::Transport(e.to_string()))
    }
}

async fn read_responses<R>(reader: R, pending: Pending, closed: Arc<AtomicBool>)
where
    R: tokio::io::AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                trace!("Received: {}", line);
                let response: JsonRpcResponse = match serde_json::from_str(&line) {
                    Ok(response) => response,
                    Err(e) => {
                        warn!("Discarding unparseable message: {}", e);
                        continue;
                    }
                };
                match pending.lock().await.remove(&response.id) {
                    Some(waiter) => {
                        let _ = waiter.send(response);
                    }
                    None => debug!("No caller waiting for response {}", response.id),
                }
            }
            Ok(None) => {
                debug!("Server closed the connection");
                break;
            }
            Err(e) => {
                warn!("Read failed: {}", e);
                break;
            }
        }
    }

    closed.store(true, Ordering::SeqCst);
    // Dropping the senders fails every waiting caller
    pending.lock().await.clear();
}

#[async_trait]
impl Transport for TcpTransport {
    async fn request(&self, request: JsonRpcRequest) -> Result<JsonRpcResponse> {
        let line = serde_json::to_string(&request)?;
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(request.id.clone(), tx);

        if let Err(e) = self.write_line(&line).await {
            self.pending.lock().await.remove(&request.id);
            return Err(e);
        }

        rx.await
            .map_err(|_| ClientError::Connection("connection closed before response".to_string()))
    }

    async fn notify(&self, notification: JsonRpcNotification) -> Result<()> {
        let line = serde_json::to_string(&notification)?;
        self.write_line(&line).await
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.reader.abort();
        if let Err(e) = self.writer.lock().await.shutdown().await {
            debug!("Shutdown after close: {}", e);
        }
        self.pending.lock().await.clear();
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

// ============================================================================
// In-process
// ============================================================================

struct Endpoint {
    dispatcher: Arc<Dispatcher>,
    up: Arc<AtomicBool>,
}

/// Connects to dispatchers living in the same process.
///
/// Endpoints can be taken down and brought back to simulate server failure.
#[derive(Default)]
pub struct InProcessConnector {
    endpoints: RwLock<HashMap<String, Endpoint>>,
}

impl InProcessConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, endpoint: impl Into<String>, dispatcher: Arc<Dispatcher>) {
        self.endpoints.write().await.insert(
            endpoint.into(),
            Endpoint {
                dispatcher,
                up: Arc::new(AtomicBool::new(true)),
            },
        );
    }

    /// Mark an endpoint up or down. Down endpoints refuse new connections and
    /// fail every request on existing ones.
    pub async fn set_available(&self, endpoint: &str, available: bool) {
        if let Some(entry) = self.endpoints.read().await.get(endpoint) {
            entry.up.store(available, Ordering::SeqCst);
        }
    }
}

#[async_trait]
impl Connector for InProcessConnector {
    async fn connect(&self, endpoint: &str) -> Result<Arc<dyn Transport>> {
        let endpoints = self.endpoints.read().await;
        let entry = endpoints
            .get(endpoint)
            .ok_or_else(|| ClientError::Connection(format!("{}: no such endpoint", endpoint)))?;

        if !entry.up.load(Ordering::SeqCst) {
            return Err(ClientError::Connection(format!("{}: connection refused", endpoint)));
        }

        Ok(Arc::new(InProcessTransport {
            dispatcher: Arc::clone(&entry.dispatcher),
            slot: Mutex::new(SessionSlot::new()),
            up: Arc::clone(&entry.up),
            closed: AtomicBool::new(false),
        }))
    }
}

/// Transport that serializes each message and hands it to a dispatcher
pub struct InProcessTransport {
    dispatcher: Arc<Dispatcher>,
    slot: Mutex<SessionSlot>,
    up: Arc<AtomicBool>,
    closed: AtomicBool,
}

impl InProcessTransport {
    fn check_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) || !self.up.load(Ordering::SeqCst) {
            return Err(ClientError::Transport("endpoint unavailable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl Transport for InProcessTransport {
    async fn request(&self, request: JsonRpcRequest) -> Result<JsonRpcResponse> {
        self.check_open()?;
        let line = serde_json::to_string(&request)?;

        let mut slot = self.slot.lock().await;
        let reply = self
            .dispatcher
            .handle_line(&mut slot, &line)
            .await
            .ok_or_else(|| ClientError::Protocol("request was not answered".to_string()))?;
        Ok(serde_json::from_str(&reply)?)
    }

    async fn notify(&self, notification: JsonRpcNotification) -> Result<()> {
        self.check_open()?;
        let line = serde_json::to_string(&notification)?;
        let mut slot = self.slot.lock().await;
        self.dispatcher.handle_line(&mut slot, &line).await;
        Ok(())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.dispatcher.close(&mut *self.slot.lock().await).await;
    }

    /// Only an explicit `close` counts; a downed endpoint shows up on the next
    /// message instead.
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ghost_mcp::ServerConfig;
    use serde_json::json;

    async fn connector() -> InProcessConnector {
        let connector = InProcessConnector::new();
        let dispatcher = Dispatcher::with_builtin(&ServerConfig::default()).unwrap();
        connector.register("primary", Arc::new(dispatcher)).await;
        connector
    }

    #[tokio::test]
    async fn test_in_process_request() {
        let connector = connector().await;
        let transport = connector.connect("primary").await.unwrap();

        let response = transport
            .request(JsonRpcRequest::new(5, "ping").with_params(json!({})))
            .await
            .unwrap();
        assert_eq!(response.id, RequestId::Number(5));
        assert_eq!(response.result, Some(json!({})));
    }

    #[tokio::test]
    async fn test_unavailable_endpoint() {
        let connector = connector().await;
        let transport = connector.connect("primary").await.unwrap();

        connector.set_available("primary", false).await;
        assert!(matches!(
            transport.request(JsonRpcRequest::new(1, "ping")).await,
            Err(ClientError::Transport(_))
        ));
        assert!(!transport.is_closed());
        assert!(connector.connect("primary").await.is_err());
        assert!(connector.connect("missing").await.is_err());
    }

    #[tokio::test]
    async fn test_tcp_request_matched_by_id() {
        let server = ghost_mcp::McpServer::from_config(&ServerConfig::default()).unwrap();
        let handle = server.bind_tcp("127.0.0.1:0").await.unwrap();

        let transport = TcpConnector
            .connect(&handle.local_addr().to_string())
            .await
            .unwrap();
        let (a, b) = tokio::join!(
            transport.request(JsonRpcRequest::new("a", "ping")),
            transport.request(JsonRpcRequest::new("b", "ping")),
        );
        assert_eq!(a.unwrap().id, RequestId::from("a"));
        assert_eq!(b.unwrap().id, RequestId::from("b"));

        handle.shutdown().await;
        let err = transport
            .request(JsonRpcRequest::new(3, "ping"))
            .await
            .unwrap_err();
        assert!(err.is_connection_failure(), "got {err:?}");

        // Once the reader sees EOF, nothing more is written
        tokio::time::timeout(std::time::Duration::from_secs(5), async {
            while !transport.is_closed() {
                tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        assert!(matches!(
            transport.request(JsonRpcRequest::new(4, "ping")).await,
            Err(ClientError::Transport(_))
        ));
    }

    #[tokio::test]
    async fn test_closed_in_process_transport_refuses_messages() {
        let connector = connector().await;
        let transport = connector.connect("primary").await.unwrap();

        transport.close().await;
        assert!(transport.is_closed());
        assert!(matches!(
            transport.notify(JsonRpcNotification::new("notifications/initialized")).await,
            Err(ClientError::Transport(_))
        ));
    }
}

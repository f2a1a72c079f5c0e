//! MCP Server implementation
//!
//! The server owns a shared [`Dispatcher`] and runs it over stdio or TCP.
//! Idle sessions are swept by a background task for as long as a transport is
//! running.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, ToSocketAddrs};
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::error::Result;
use crate::handlers::Dispatcher;
use crate::transport::{self, serve_connection};

/// MCP Server
pub struct McpServer {
    dispatcher: Arc<Dispatcher>,
    sweep_interval: Duration,
}

impl McpServer {
    /// Create a server around an existing dispatcher
    pub fn new(dispatcher: Dispatcher, config: &ServerConfig) -> Self {
        Self {
            dispatcher: Arc::new(dispatcher),
            sweep_interval: config.session_sweep_interval(),
        }
    }

    /// Create a server with the built-in wallet-analysis catalog
    pub fn from_config(config: &ServerConfig) -> Result<Self> {
        Ok(Self::new(Dispatcher::with_builtin(config)?, config))
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Serve a single client over stdin/stdout until EOF
    pub async fn run_stdio(&self) -> Result<()> {
        info!("Starting Ghost MCP server (stdio transport)");

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let sweeper = spawn_session_sweeper(
            Arc::clone(&self.dispatcher),
            self.sweep_interval,
            shutdown_rx,
        );

        let mut transport = transport::stdio_transport();
        let result = serve_connection(&self.dispatcher, &mut transport).await;

        let _ = shutdown_tx.send(true);
        if let Err(e) = sweeper.await {
            error!("Session sweeper failed: {}", e);
        }

        info!("Ghost MCP server stopped");
        result.map_err(Into::into)
    }

    /// Start accepting TCP connections. Each socket gets its own session.
    pub async fn bind_tcp(&self, addr: impl ToSocketAddrs) -> Result<TcpServerHandle> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        info!("Ghost MCP server listening on {}", local_addr);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let sweeper = spawn_session_sweeper(
            Arc::clone(&self.dispatcher),
            self.sweep_interval,
            shutdown_rx.clone(),
        );
        let task = tokio::spawn(accept_loop(
            listener,
            Arc::clone(&self.dispatcher),
            shutdown_rx,
        ));

        Ok(TcpServerHandle {
            local_addr,
            shutdown: shutdown_tx,
            task,
            sweeper,
        })
    }
}

/// Handle to a running TCP server
pub struct TcpServerHandle {
    local_addr: SocketAddr,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
    sweeper: JoinHandle<()>,
}

impl TcpServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting, drop every open connection and wait for the tasks
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for (name, task) in [("accept loop", self.task), ("session sweeper", self.sweeper)] {
            if let Err(e) = task.await {
                error!("TCP server {} failed: {}", name, e);
            }
        }
        info!("TCP server on {} stopped", self.local_addr);
    }
}

async fn accept_loop(
    listener: TcpListener,
    dispatcher: Arc<Dispatcher>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    debug!("Accepted connection from {}", peer);
                    let dispatcher = Arc::clone(&dispatcher);
                    connections.spawn(async move {
                        let mut transport = transport::tcp_transport(stream);
                        if let Err(e) = serve_connection(&dispatcher, &mut transport).await {
                            warn!("Connection {} ended with error: {}", peer, e);
                        }
                        debug!("Connection {} closed", peer);
                    });
                }
                Err(e) => error!("Failed to accept connection: {}", e),
            },
            Some(joined) = connections.join_next(), if !connections.is_empty() => {
                if let Err(e) = joined {
                    if e.is_panic() {
                        error!("Connection task panicked: {}", e);
                    }
                }
            }
        }
    }

    debug!("Aborting {} open connection(s)", connections.len());
    connections.shutdown().await;
}

/// Periodically expire idle sessions until shutdown is signalled
pub fn spawn_session_sweeper(
    dispatcher: Arc<Dispatcher>,
    every: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = ticker.tick() => {
                    let expired = dispatcher.expire_idle_sessions().await;
                    if expired > 0 {
                        debug!("Sweeper expired {} session(s)", expired);
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::SessionSlot;
    use crate::protocol::JsonRpcRequest;
    use serde_json::json;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpStream;

    #[tokio::test]
    async fn test_tcp_roundtrip() {
        let server = McpServer::from_config(&ServerConfig::default()).unwrap();
        let handle = server.bind_tcp("127.0.0.1:0").await.unwrap();

        let stream = TcpStream::connect(handle.local_addr()).await.unwrap();
        let (read_half, mut write_half) = stream.into_split();
        let mut lines = BufReader::new(read_half).lines();

        write_half
            .write_all(b"{\"version\":\"2.0\",\"id\":7,\"method\":\"ping\"}\n")
            .await
            .unwrap();
        let reply = lines.next_line().await.unwrap().unwrap();
        let value: serde_json::Value = serde_json::from_str(&reply).unwrap();
        assert_eq!(value["id"], 7);
        assert_eq!(value["result"], json!({}));

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_expires_idle_sessions() {
        let config = ServerConfig {
            session_idle_timeout_secs: 10,
            session_sweep_interval_secs: 1,
            ..ServerConfig::default()
        };
        let server = McpServer::from_config(&config).unwrap();
        let dispatcher = Arc::clone(server.dispatcher());

        let mut slot = SessionSlot::new();
        let request = JsonRpcRequest::new(1, "initialize").with_params(json!({
            "protocolVersion": "2025-11-25",
            "clientInfo": { "name": "idle" }
        }));
        dispatcher.handle_request(&mut slot, &request).await;
        assert_eq!(dispatcher.sessions().len().await, 1);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let sweeper = spawn_session_sweeper(Arc::clone(&dispatcher), config.session_sweep_interval(), shutdown_rx);

        tokio::time::sleep(Duration::from_secs(12)).await;
        assert_eq!(dispatcher.sessions().len().await, 0);

        shutdown_tx.send(true).unwrap();
        sweeper.await.unwrap();
    }
}

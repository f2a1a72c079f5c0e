//! Connection manager
//!
//! Keeps a pool of server connections, tracks their health, and routes each
//! request to a healthy one. A failure noticed before a request is sent is
//! absorbed by failing over; a connection that dies while a request is in
//! flight fails that request and the next one goes elsewhere. Connections in
//! `Error` keep their pool entry and are brought back by [`ConnectionManager::reconnect`].

use std::collections::VecDeque;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{watch, RwLock};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use ghost_mcp::protocol::{
    ClientCapabilities, InitializeParams, InitializeResult, JsonRpcNotification, JsonRpcRequest,
    Method,
};

use crate::config::{ClientConfig, LoadBalancing};
use crate::connection::{Connection, ConnectionState};
use crate::error::{ClientError, Result};
use crate::transport::{Connector, Transport};

/// Something that happened to the pool
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConnectionEventKind {
    Established {
        connection_id: String,
        endpoint: String,
    },
    ConnectionFailed {
        connection_id: String,
        reason: String,
    },
    Failover {
        from: Option<String>,
        to: String,
    },
    /// The active connection died and nothing could replace it
    ActiveCleared {
        from: String,
    },
    Disconnected {
        connection_id: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectionEvent {
    pub timestamp: DateTime<Utc>,
    pub kind: ConnectionEventKind,
}

struct Managed {
    info: Connection,
    transport: Option<Arc<dyn Transport>>,
}

impl Managed {
    fn usable(&self, heartbeat_timeout: Duration) -> bool {
        self.transport.as_ref().is_some_and(|t| !t.is_closed())
            && self.info.is_healthy(heartbeat_timeout)
    }

    /// Claim the entry for a connect attempt.
    ///
    /// Only `Error` and `Disconnected` entries move to `Connecting`. A
    /// connected entry is returned as is; one already connecting is refused.
    fn claim(&mut self) -> Option<Result<String>> {
        match self.info.state {
            ConnectionState::Connected => Some(Ok(self.info.id.clone())),
            ConnectionState::Connecting => Some(Err(ClientError::Connection(format!(
                "{} is already connecting",
                self.info.id
            )))),
            ConnectionState::Error | ConnectionState::Disconnected => {
                self.info.state = ConnectionState::Connecting;
                None
            }
        }
    }
}

#[derive(Default)]
struct Pool {
    /// Establishment order; failover prefers earlier entries
    connections: Vec<Managed>,
    active: Option<String>,
    events: VecDeque<ConnectionEvent>,
    cursor: usize,
}

impl Pool {
    fn get(&self, id: &str) -> Option<&Managed> {
        self.connections.iter().find(|m| m.info.id == id)
    }

    fn get_mut(&mut self, id: &str) -> Option<&mut Managed> {
        self.connections.iter_mut().find(|m| m.info.id == id)
    }

    fn push_event(&mut self, kind: ConnectionEventKind, limit: usize) {
        if limit == 0 {
            return;
        }
        if self.events.len() == limit {
            self.events.pop_front();
        }
        self.events.push_back(ConnectionEvent {
            timestamp: Utc::now(),
            kind,
        });
    }
}

/// Pool of server connections with health tracking and failover
pub struct ConnectionManager {
    config: ClientConfig,
    connector: Arc<dyn Connector>,
    pool: RwLock<Pool>,
    next_connection: AtomicU64,
    next_request: AtomicI64,
}

impl ConnectionManager {
    pub fn new(config: ClientConfig, connector: Arc<dyn Connector>) -> Self {
        Self {
            config,
            connector,
            pool: RwLock::new(Pool::default()),
            next_connection: AtomicU64::new(1),
            next_request: AtomicI64::new(1),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn next_request_id(&self) -> i64 {
        self.next_request.fetch_add(1, Ordering::SeqCst)
    }

    // ========================================================================
    // Establishment
    // ========================================================================

    /// Connect and handshake with an endpoint.
    ///
    /// An endpoint keeps one pool entry: a connected one is returned as is, a
    /// failed one is reconnected in place. Transport failures are retried up
    /// to `max_connect_attempts` times; a rejected handshake is not. The first
    /// connection established becomes active.
    pub async fn establish(&self, endpoint: &str) -> Result<String> {
        let id = {
            let mut pool = self.pool.write().await;
            let existing = pool
                .connections
                .iter()
                .position(|m| m.info.endpoint == endpoint);
            match existing {
                Some(index) => {
                    let existing = &mut pool.connections[index];
                    if let Some(done) = existing.claim() {
                        return done;
                    }
                    existing.info.id.clone()
                }
                None => {
                    let id = format!(
                        "conn-{}",
                        self.next_connection.fetch_add(1, Ordering::SeqCst)
                    );
                    let mut info = Connection::new(&id, endpoint);
                    info.state = ConnectionState::Connecting;
                    pool.connections.push(Managed {
                        info,
                        transport: None,
                    });
                    id
                }
            }
        };
        self.connect_entry(&id, endpoint).await
    }

    /// Re-establish a connection in `Error` or `Disconnected`, keeping its id
    pub async fn reconnect(&self, id: &str) -> Result<String> {
        let endpoint = {
            let mut pool = self.pool.write().await;
            let managed = pool
                .get_mut(id)
                .ok_or_else(|| ClientError::Connection(format!("unknown connection {}", id)))?;
            if let Some(done) = managed.claim() {
                return done;
            }
            managed.info.endpoint.clone()
        };
        self.connect_entry(id, &endpoint).await
    }

    /// Reconnect every connection in `Error`. Returns the ids that came back.
    pub async fn reconnect_failed(&self) -> Vec<String> {
        let failed: Vec<String> = self
            .pool
            .read()
            .await
            .connections
            .iter()
            .filter(|m| m.info.state == ConnectionState::Error)
            .map(|m| m.info.id.clone())
            .collect();

        let mut recovered = Vec::new();
        for id in failed {
            match self.reconnect(&id).await {
                Ok(id) => recovered.push(id),
                Err(e) => debug!("{} is still down: {}", id, e),
            }
        }
        recovered
    }

    async fn connect_entry(&self, id: &str, endpoint: &str) -> Result<String> {
        info!("Connecting {} to {}", id, endpoint);

        let max_attempts = self.config.max_connect_attempts.max(1);
        let mut last_error = ClientError::Connection(format!("{}: not attempted", endpoint));

        for attempt in 1..=max_attempts {
            self.update(id, |c| c.attempts += 1).await;

            match self.connect_once(endpoint).await {
                Ok((transport, result)) => return self.finish_establish(id, transport, result).await,
                Err(e) if e.is_connection_failure() || matches!(e, ClientError::Timeout(_)) => {
                    warn!(
                        "Connect attempt {}/{} to {} failed: {}",
                        attempt, max_attempts, endpoint, e
                    );
                    last_error = e;
                    if attempt < max_attempts {
                        tokio::time::sleep(self.config.reconnect_backoff()).await;
                    }
                }
                Err(e) => {
                    warn!("Handshake with {} rejected: {}", endpoint, e);
                    last_error = e;
                    break;
                }
            }
        }

        let reason = last_error.to_string();
        let mut pool = self.pool.write().await;
        if let Some(managed) = pool.get_mut(id) {
            managed.info.mark_failed(&reason);
        }
        pool.push_event(
            ConnectionEventKind::ConnectionFailed {
                connection_id: id.to_string(),
                reason,
            },
            self.config.event_history_limit,
        );
        Err(last_error)
    }

    async fn finish_establish(
        &self,
        id: &str,
        transport: Arc<dyn Transport>,
        result: InitializeResult,
    ) -> Result<String> {
        let mut pool = self.pool.write().await;

        let claimed = pool.get_mut(id).map(|managed| {
            managed.info.mark_connected();
            managed.info.session_id = Some(result.session_id);
            managed.info.server_info = Some(result.server_info);
            managed.info.protocol_version = Some(result.protocol_version);
            let replaced = managed.transport.replace(Arc::clone(&transport));
            (managed.info.endpoint.clone(), replaced)
        });
        let Some((endpoint, replaced)) = claimed else {
            drop(pool);
            transport.close().await;
            return Err(ClientError::Connection(format!(
                "{} was removed while connecting",
                id
            )));
        };
        if let Some(old) = replaced {
            close_detached(old);
        }

        if pool.active.is_none() {
            info!("{} is now the active connection", id);
            pool.active = Some(id.to_string());
        }
        pool.push_event(
            ConnectionEventKind::Established {
                connection_id: id.to_string(),
                endpoint,
            },
            self.config.event_history_limit,
        );
        Ok(id.to_string())
    }

    async fn connect_once(&self, endpoint: &str) -> Result<(Arc<dyn Transport>, InitializeResult)> {
        let transport = self.connector.connect(endpoint).await?;
        match self.handshake(transport.as_ref()).await {
            Ok(result) => Ok((transport, result)),
            Err(e) => {
                transport.close().await;
                Err(e)
            }
        }
    }

    async fn handshake(&self, transport: &dyn Transport) -> Result<InitializeResult> {
        let params = InitializeParams {
            protocol_version: self.config.protocol_version.clone(),
            capabilities: ClientCapabilities {
                supported: self.config.capabilities.clone(),
            },
            client_info: self.config.client_info(),
        };
        let request = JsonRpcRequest::new(self.next_request_id(), Method::Initialize.as_str())
            .with_params(serde_json::to_value(&params)?);

        let response = tokio::time::timeout(self.config.request_timeout(), transport.request(request))
            .await
            .map_err(|_| ClientError::Timeout(self.config.request_timeout()))??;
        let result: InitializeResult =
            serde_json::from_value(response.into_result().map_err(ClientError::from_rpc)?)?;

        transport
            .notify(JsonRpcNotification::new("notifications/initialized"))
            .await?;
        debug!(
            "Handshake complete: session {} ({})",
            result.session_id, result.protocol_version
        );
        Ok(result)
    }

    // ========================================================================
    // Requests
    // ========================================================================

    /// Send a request on a healthy connection.
    ///
    /// An unhealthy active connection is replaced before sending. A request
    /// that could not be written is sent once more on the connection that
    /// takes over, and fails with `Connection` only if none does. If the
    /// connection fails while the request is in flight, the request fails with
    /// `Connection` and is not retried.
    pub async fn send(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<serde_json::Value> {
        let (id, transport) = self.select().await?;
        let reason = match self.send_on(&id, transport, method, params.clone()).await {
            Err(ClientError::Transport(reason)) => reason,
            other => return other,
        };

        warn!("{} was not sent on {}: {}", method, id, reason);
        self.fail_connection(&id, &reason).await;

        let (retry_id, transport) = self
            .select()
            .await
            .map_err(|_| ClientError::Connection(reason.clone()))?;
        match self.send_on(&retry_id, transport, method, params).await {
            Err(ClientError::Transport(reason)) => {
                self.fail_connection(&retry_id, &reason).await;
                Err(ClientError::Connection(reason))
            }
            other => other,
        }
    }

    /// One attempt on one connection. `Transport` errors are passed through
    /// uncounted for the caller to retry.
    async fn send_on(
        &self,
        id: &str,
        transport: Arc<dyn Transport>,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<serde_json::Value> {
        let mut request = JsonRpcRequest::new(self.next_request_id(), method);
        request.params = params;
        debug!("Sending {} (id: {}) via {}", method, request.id, id);

        let timeout = self.config.request_timeout();
        let started = Instant::now();
        let outcome = tokio::time::timeout(timeout, transport.request(request)).await;
        let elapsed = started.elapsed();

        match outcome {
            Ok(Ok(response)) => {
                let success = !response.is_error();
                self.update(id, |c| {
                    c.record_response(elapsed, success);
                    c.refresh_heartbeat();
                })
                .await;
                response.into_result().map_err(ClientError::from_rpc)
            }
            Ok(Err(e @ ClientError::Transport(_))) => Err(e),
            Ok(Err(e)) if e.is_connection_failure() => {
                self.update(id, Connection::record_unanswered).await;
                self.fail_connection(id, &e.to_string()).await;
                Err(match e {
                    ClientError::Connection(reason) => ClientError::Connection(reason),
                    other => ClientError::Connection(other.to_string()),
                })
            }
            Ok(Err(e)) => {
                self.update(id, Connection::record_unanswered).await;
                Err(e)
            }
            Err(_) => {
                warn!("{} on {} timed out after {:?}", method, id, timeout);
                self.update(id, Connection::record_unanswered).await;
                Err(ClientError::Timeout(timeout))
            }
        }
    }

    /// Pick the connection for the next request
    async fn select(&self) -> Result<(String, Arc<dyn Transport>)> {
        let heartbeat_timeout = self.config.heartbeat_timeout();
        let mut pool = self.pool.write().await;

        let active_usable = pool
            .active
            .as_deref()
            .and_then(|id| pool.get(id))
            .is_some_and(|m| m.usable(heartbeat_timeout));
        if !active_usable {
            self.failover_locked(&mut pool);
        }

        let active = pool.active.clone().ok_or(ClientError::NoHealthyConnection)?;
        let target = match self.config.load_balancing {
            LoadBalancing::FailoverOnly => active,
            LoadBalancing::RoundRobin => {
                let healthy: Vec<String> = pool
                    .connections
                    .iter()
                    .filter(|m| m.usable(heartbeat_timeout))
                    .map(|m| m.info.id.clone())
                    .collect();
                if healthy.is_empty() {
                    active
                } else {
                    let pick = healthy[pool.cursor % healthy.len()].clone();
                    pool.cursor = pool.cursor.wrapping_add(1);
                    pick
                }
            }
        };

        let transport = pool
            .get(&target)
            .and_then(|m| m.transport.clone())
            .ok_or(ClientError::NoHealthyConnection)?;
        Ok((target, transport))
    }

    async fn update(&self, id: &str, f: impl FnOnce(&mut Connection)) {
        if let Some(managed) = self.pool.write().await.get_mut(id) {
            f(&mut managed.info);
        }
    }

    /// Mark a connection failed, drop its transport and fail over if it was active
    async fn fail_connection(&self, id: &str, reason: &str) {
        let transport = {
            let mut pool = self.pool.write().await;
            let Some(managed) = pool.get_mut(id) else {
                return;
            };
            error!("Connection {} failed: {}", id, reason);
            managed.info.mark_failed(reason);
            let transport = managed.transport.take();

            pool.push_event(
                ConnectionEventKind::ConnectionFailed {
                    connection_id: id.to_string(),
                    reason: reason.to_string(),
                },
                self.config.event_history_limit,
            );
            if pool.active.as_deref() == Some(id) {
                self.failover_locked(&mut pool);
            }
            transport
        };

        if let Some(transport) = transport {
            transport.close().await;
        }
    }

    // ========================================================================
    // Health
    // ========================================================================

    /// Replace the active connection if it is not connected or its heartbeat
    /// is stale. Returns the active connection afterwards.
    pub async fn failover(&self) -> Option<String> {
        let mut pool = self.pool.write().await;
        self.failover_locked(&mut pool)
    }

    fn failover_locked(&self, pool: &mut Pool) -> Option<String> {
        let heartbeat_timeout = self.config.heartbeat_timeout();
        let from = pool.active.clone();

        if let Some(current) = from.as_deref() {
            let mut failed = None;
            if let Some(managed) = pool.get_mut(current) {
                if managed.usable(heartbeat_timeout) {
                    return from;
                }
                if managed.info.state == ConnectionState::Connected {
                    let reason = match &managed.transport {
                        Some(t) if !t.is_closed() => "heartbeat timeout",
                        _ => "connection closed",
                    };
                    managed.info.mark_failed(reason);
                    if let Some(transport) = managed.transport.take() {
                        close_detached(transport);
                    }
                    failed = Some(reason);
                }
            }
            if let Some(reason) = failed {
                error!("Connection {} failed: {}", current, reason);
                pool.push_event(
                    ConnectionEventKind::ConnectionFailed {
                        connection_id: current.to_string(),
                        reason: reason.to_string(),
                    },
                    self.config.event_history_limit,
                );
            }
        }

        let to = pool
            .connections
            .iter()
            .find(|m| Some(&m.info.id) != from.as_ref() && m.usable(heartbeat_timeout))
            .map(|m| m.info.id.clone());

        match to {
            Some(to) => {
                warn!("Failing over from {:?} to {}", from, to);
                pool.active = Some(to.clone());
                pool.push_event(
                    ConnectionEventKind::Failover {
                        from,
                        to: to.clone(),
                    },
                    self.config.event_history_limit,
                );
                Some(to)
            }
            None => {
                pool.active = None;
                if let Some(from) = from {
                    warn!("No healthy connection to replace {}", from);
                    pool.push_event(
                        ConnectionEventKind::ActiveCleared { from },
                        self.config.event_history_limit,
                    );
                }
                None
            }
        }
    }

    /// Ping every connected connection.
    ///
    /// Answered pings refresh the heartbeat; failed ones move the connection
    /// to `Error`. Returns `(connection id, alive)` pairs.
    pub async fn heartbeat(&self) -> Vec<(String, bool)> {
        let targets: Vec<(String, Arc<dyn Transport>)> = self
            .pool
            .read()
            .await
            .connections
            .iter()
            .filter(|m| m.info.state == ConnectionState::Connected)
            .filter_map(|m| m.transport.clone().map(|t| (m.info.id.clone(), t)))
            .collect();

        let timeout = self.config.heartbeat_timeout();
        let mut pings = JoinSet::new();
        for (id, transport) in targets {
            let request = JsonRpcRequest::new(self.next_request_id(), Method::Ping.as_str());
            pings.spawn(async move {
                let alive = matches!(
                    tokio::time::timeout(timeout, transport.request(request)).await,
                    Ok(Ok(_))
                );
                (id, alive)
            });
        }

        let mut results = Vec::new();
        while let Some(joined) = pings.join_next().await {
            match joined {
                Ok(result) => results.push(result),
                Err(e) => error!("Heartbeat task failed: {}", e),
            }
        }

        for (id, alive) in &results {
            if *alive {
                self.update(id, Connection::refresh_heartbeat).await;
            } else {
                self.fail_connection(id, "heartbeat failed").await;
            }
        }

        results.sort();
        results
    }

    /// Run heartbeats, reconnects and failover checks on an interval until
    /// shutdown is signalled or the sender is dropped
    pub fn spawn_heartbeat_monitor(
        self: &Arc<Self>,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let every = manager
                .config
                .heartbeat_interval()
                .max(Duration::from_millis(1));
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = shutdown.changed() => break,
                    _ = ticker.tick() => {
                        manager.heartbeat().await;
                        let recovered = manager.reconnect_failed().await;
                        if !recovered.is_empty() {
                            info!("Reconnected {:?}", recovered);
                        }
                        manager.failover().await;
                    }
                }
            }
            debug!("Heartbeat monitor stopped");
        })
    }

    // ========================================================================
    // Teardown and inspection
    // ========================================================================

    /// Close and forget a connection, failing over if it was active
    pub async fn disconnect(&self, id: &str) -> Result<()> {
        let transport = {
            let mut pool = self.pool.write().await;
            let index = pool
                .connections
                .iter()
                .position(|m| m.info.id == id)
                .ok_or_else(|| ClientError::Connection(format!("unknown connection {}", id)))?;

            let mut managed = pool.connections.remove(index);
            managed.info.state = ConnectionState::Disconnected;
            pool.push_event(
                ConnectionEventKind::Disconnected {
                    connection_id: id.to_string(),
                },
                self.config.event_history_limit,
            );
            if pool.active.as_deref() == Some(id) {
                self.failover_locked(&mut pool);
            }
            managed.transport
        };

        if let Some(transport) = transport {
            transport.close().await;
        }
        info!("Disconnected {}", id);
        Ok(())
    }

    pub async fn disconnect_all(&self) {
        let ids: Vec<String> = self
            .pool
            .read()
            .await
            .connections
            .iter()
            .map(|m| m.info.id.clone())
            .collect();
        for id in ids {
            let _ = self.disconnect(&id).await;
        }
    }

    pub async fn connections(&self) -> Vec<Connection> {
        self.pool
            .read()
            .await
            .connections
            .iter()
            .map(|m| m.info.clone())
            .collect()
    }

    pub async fn connection(&self, id: &str) -> Option<Connection> {
        self.pool.read().await.get(id).map(|m| m.info.clone())
    }

    pub async fn active_id(&self) -> Option<String> {
        self.pool.read().await.active.clone()
    }

    pub async fn healthy_count(&self) -> usize {
        let timeout = self.config.heartbeat_timeout();
        self.pool
            .read()
            .await
            .connections
            .iter()
            .filter(|m| m.usable(timeout))
            .count()
    }

    pub async fn events(&self) -> Vec<ConnectionEvent> {
        self.pool.read().await.events.iter().cloned().collect()
    }
}

/// Close a transport without holding the pool lock
fn close_detached(transport: Arc<dyn Transport>) {
    tokio::spawn(async move { transport.close().await });
}

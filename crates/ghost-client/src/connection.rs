//! Per-connection state and health bookkeeping

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::Instant;

use ghost_mcp::protocol::ServerInfo;

/// Connection lifecycle.
///
/// `Disconnected -> Connecting -> Connected | Error`, and `Connected -> Error`
/// on heartbeat timeout or transport failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Error => "error",
        };
        f.write_str(name)
    }
}

/// Snapshot of one managed connection
#[derive(Debug, Clone)]
pub struct Connection {
    pub id: String,
    pub endpoint: String,
    pub state: ConnectionState,
    pub session_id: Option<String>,
    pub server_info: Option<ServerInfo>,
    pub protocol_version: Option<String>,
    pub connected_at: Option<DateTime<Utc>>,
    pub last_heartbeat: Option<Instant>,
    pub last_error: Option<String>,

    /// Connect tries, including retries
    pub attempts: u32,

    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,

    /// Running mean over answered requests
    pub avg_response_time_ms: f64,
    answered: u64,
}

impl Connection {
    pub fn new(id: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            endpoint: endpoint.into(),
            state: ConnectionState::Disconnected,
            session_id: None,
            server_info: None,
            protocol_version: None,
            connected_at: None,
            last_heartbeat: None,
            last_error: None,
            attempts: 0,
            total_requests: 0,
            successful_requests: 0,
            failed_requests: 0,
            avg_response_time_ms: 0.0,
            answered: 0,
        }
    }

    pub fn heartbeat_age(&self) -> Option<Duration> {
        self.last_heartbeat
            .map(|at| Instant::now().duration_since(at))
    }

    /// Connected with a heartbeat no older than `timeout`
    pub fn is_healthy(&self, timeout: Duration) -> bool {
        self.state == ConnectionState::Connected
            && self.heartbeat_age().is_some_and(|age| age <= timeout)
    }

    pub fn success_rate(&self) -> f64 {
        if self.total_requests == 0 {
            return 0.0;
        }
        self.successful_requests as f64 / self.total_requests as f64
    }

    pub(crate) fn mark_connected(&mut self) {
        self.state = ConnectionState::Connected;
        self.connected_at = Some(Utc::now());
        self.last_heartbeat = Some(Instant::now());
        self.last_error = None;
    }

    pub(crate) fn mark_failed(&mut self, reason: impl Into<String>) {
        self.state = ConnectionState::Error;
        self.last_error = Some(reason.into());
    }

    pub(crate) fn refresh_heartbeat(&mut self) {
        self.last_heartbeat = Some(Instant::now());
    }

    /// Fold one answered request into the counters
    pub(crate) fn record_response(&mut self, elapsed: Duration, success: bool) {
        self.total_requests += 1;
        if success {
            self.successful_requests += 1;
        } else {
            self.failed_requests += 1;
        }

        self.answered += 1;
        let elapsed_ms = elapsed.as_secs_f64() * 1000.0;
        self.avg_response_time_ms += (elapsed_ms - self.avg_response_time_ms) / self.answered as f64;
    }

    /// Count a request that never got an answer
    pub(crate) fn record_unanswered(&mut self) {
        self.total_requests += 1;
        self.failed_requests += 1;
    }
}

//! Session management
//!
//! A session is created by a successful `initialize` and lives until it is
//! expired explicitly or sits idle past the configured timeout.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::{debug, info};

use crate::error::{McpError, Result};
use crate::protocol::{Capability, ClientCapabilities, ClientInfo};

/// Per-client session state
#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    pub client_info: ClientInfo,
    pub protocol_version: String,

    /// Negotiated at creation, never changed afterwards
    pub capabilities: BTreeSet<Capability>,

    pub created_at: DateTime<Utc>,
    pub last_activity: Instant,
    pub request_count: u64,
}

impl Session {
    pub fn has_capability(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    pub fn idle_for(&self) -> Duration {
        Instant::now().duration_since(self.last_activity)
    }
}

/// Owns every live session
pub struct SessionManager {
    offered: BTreeSet<Capability>,
    idle_timeout: Duration,
    sessions: RwLock<HashMap<String, Arc<Mutex<Session>>>>,
}

impl SessionManager {
    pub fn new(offered: BTreeSet<Capability>, idle_timeout: Duration) -> Self {
        Self {
            offered,
            idle_timeout,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Capabilities this server offers to every client
    pub fn offered(&self) -> &BTreeSet<Capability> {
        &self.offered
    }

    /// Create a session with the negotiated capability set
    pub async fn create(
        &self,
        client_info: ClientInfo,
        protocol_version: impl Into<String>,
        declared: &ClientCapabilities,
    ) -> Session {
        let session = Session {
            id: uuid::Uuid::new_v4().to_string(),
            client_info,
            protocol_version: protocol_version.into(),
            capabilities: declared.negotiate(&self.offered),
            created_at: Utc::now(),
            last_activity: Instant::now(),
            request_count: 0,
        };

        info!(
            "Session {} created for {} ({:?})",
            session.id, session.client_info.name, session.capabilities
        );
        self.sessions
            .write()
            .await
            .insert(session.id.clone(), Arc::new(Mutex::new(session.clone())));
        session
    }

    /// Record activity on a session and return its updated state
    pub async fn touch(&self, id: &str) -> Result<Session> {
        let entry = self
            .sessions
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or(McpError::SessionRequired)?;

        let mut session = entry.lock().await;
        session.request_count += 1;
        session.last_activity = Instant::now();
        Ok(session.clone())
    }

    /// Remove a session. Returns whether it existed.
    pub async fn expire(&self, id: &str) -> bool {
        let removed = self.sessions.write().await.remove(id).is_some();
        if removed {
            debug!("Session {} expired", id);
        }
        removed
    }

    /// Remove every session idle longer than the timeout
    pub async fn expire_idle(&self) -> Vec<String> {
        let mut sessions = self.sessions.write().await;
        let mut expired = Vec::new();

        for (id, entry) in sessions.iter() {
            if entry.lock().await.idle_for() > self.idle_timeout {
                expired.push(id.clone());
            }
        }
        for id in &expired {
            sessions.remove(id);
        }

        if !expired.is_empty() {
            info!("Expired {} idle session(s)", expired.len());
        }
        expired
    }

    pub async fn get(&self, id: &str) -> Option<Session> {
        let entry = self.sessions.read().await.get(id).cloned()?;
        let session = entry.lock().await.clone();
        Some(session)
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

//! Protocol sessions.
//!
//! A session is created by a successful `initialize` and carries the negotiated
//! protocol version between HTTP requests. Sessions expire after a period of
//! inactivity.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;

use crate::config::Config;

/// An initialized protocol session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Opaque id sent back in the `Mcp-Session-Id` header.
    pub id: String,
    /// Version agreed during `initialize`.
    pub protocol_version: &'static str,
    /// Subject that created the session, if the request was authenticated.
    pub subject_id: Option<String>,
}

/// In-memory session store with idle expiry.
#[derive(Clone)]
pub struct SessionStore {
    sessions: Cache<String, Arc<Session>>,
}

impl SessionStore {
    /// Create a store; sessions idle longer than `idle_timeout` are dropped.
    #[must_use]
    pub fn new(idle_timeout: Duration, max_capacity: u64) -> Self {
        let sessions = Cache::builder()
            .max_capacity(max_capacity)
            .time_to_idle(idle_timeout)
            .build();
        Self { sessions }
    }

    /// Create a store from the session settings in `config`.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.session_idle_timeout, config.session_max_capacity)
    }

    /// Start a new session.
    pub async fn create(
        &self,
        protocol_version: &'static str,
        subject_id: Option<&str>,
    ) -> Arc<Session> {
        let session = Arc::new(Session {
            id: uuid::Uuid::new_v4().to_string(),
            protocol_version,
            subject_id: subject_id.map(str::to_owned),
        });
        self.sessions.insert(session.id.clone(), Arc::clone(&session)).await;
        tracing::debug!(session_id = %session.id, protocol_version, "Created session");
        session
    }

    /// Look up a session for `subject_id`. A session created by another subject is
    /// treated as absent.
    pub async fn get(&self, id: &str, subject_id: Option<&str>) -> Option<Arc<Session>> {
        let session = self.sessions.get(id).await?;
        if session.subject_id.as_deref() != subject_id {
            tracing::warn!(session_id = %id, "Session presented by a different subject");
            return None;
        }
        Some(session)
    }

    /// End a session.
    pub async fn remove(&self, id: &str) {
        self.sessions.invalidate(id).await;
    }

    /// Approximate number of live sessions.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.sessions.entry_count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore").field("sessions", &self.sessions.entry_count()).finish()
    }
}

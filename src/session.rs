//! MCP session management.
//!
//! Sessions correlate the requests of one client conversation. They are
//! issued on `initialize`, refreshed on every request, and evicted after an
//! idle window either lazily on lookup or by [`SessionManager::sweep_expired`].
//! An expired id is indistinguishable from one that was never issued.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant, SystemTime};

use parking_lot::Mutex;
use uuid::Uuid;

use crate::error::{McpError, Result};

/// Default idle window before a session is evicted.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Snapshot of one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Opaque id echoed by clients in the `mcp-session-id` header.
    pub id: String,
    /// Wall-clock creation time.
    pub created_at: SystemTime,
    /// Last request seen under this id.
    pub last_seen_at: Instant,
}

impl Session {
    fn is_expired(&self, now: Instant, idle: Duration) -> bool {
        now.saturating_duration_since(self.last_seen_at) >= idle
    }
}

/// Process-wide session table.
///
/// The lock is only held for map operations, never across an await.
#[derive(Debug)]
pub struct SessionManager {
    sessions: Mutex<HashMap<String, Session>>,
    idle_timeout: Duration,
}

impl SessionManager {
    /// Create a manager with the given idle window.
    pub fn new(idle_timeout: Duration) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            idle_timeout,
        }
    }

    /// Idle window after which sessions expire.
    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    /// Issue a new session with a random (UUID v4) id.
    pub fn create(&self) -> Session {
        let session = Session {
            id: Uuid::new_v4().simple().to_string(),
            created_at: SystemTime::now(),
            last_seen_at: Instant::now(),
        };
        self.sessions
            .lock()
            .insert(session.id.clone(), session.clone());
        tracing::info!(session = %session.id, "session created");
        session
    }

    /// Look up a live session, evicting it if it has gone idle.
    pub fn validate(&self, id: &str) -> Result<Session> {
        let now = Instant::now();
        let mut sessions = self.sessions.lock();
        let session = Self::live_entry(&mut sessions, id, now, self.idle_timeout)?;
        Ok(session.clone())
    }

    /// Record activity on a live session.
    pub fn touch(&self, id: &str) -> Result<()> {
        let now = Instant::now();
        let mut sessions = self.sessions.lock();
        let session = Self::live_entry(&mut sessions, id, now, self.idle_timeout)?;
        session.last_seen_at = now;
        Ok(())
    }

    fn live_entry<'a>(
        sessions: &'a mut HashMap<String, Session>,
        id: &str,
        now: Instant,
        idle: Duration,
    ) -> Result<&'a mut Session> {
        let expired = match sessions.get(id) {
            Some(session) => session.is_expired(now, idle),
            None => return Err(McpError::SessionNotFound(id.to_string())),
        };
        if expired {
            sessions.remove(id);
            tracing::debug!(session = %id, "session expired");
        }
        sessions
            .get_mut(id)
            .ok_or_else(|| McpError::SessionNotFound(id.to_string()))
    }

    /// Terminate a session. Returns whether it was live.
    pub fn remove(&self, id: &str) -> bool {
        let now = Instant::now();
        let removed = self.sessions.lock().remove(id);
        matches!(removed, Some(session) if !session.is_expired(now, self.idle_timeout))
    }

    /// Evict every idle session. Returns the number evicted.
    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let mut sessions = self.sessions.lock();
        let before = sessions.len();
        sessions.retain(|_, session| !session.is_expired(now, self.idle_timeout));
        before - sessions.len()
    }

    /// Number of sessions currently stored (including not-yet-swept idle ones).
    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    /// Whether no sessions are stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// How often the background sweep runs for a given idle window.
pub fn sweep_interval(idle_timeout: Duration) -> Duration {
    (idle_timeout / 2).clamp(Duration::from_secs(1), Duration::from_secs(60))
}

/// Evict idle sessions in the background.
///
/// The task holds only a weak reference and exits once the manager is dropped.
pub fn spawn_sweeper(manager: &Arc<SessionManager>) -> tokio::task::JoinHandle<()> {
    let weak: Weak<SessionManager> = Arc::downgrade(manager);
    let period = sweep_interval(manager.idle_timeout());
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let Some(manager) = weak.upgrade() else {
                break;
            };
            let evicted = manager.sweep_expired();
            if evicted > 0 {
                tracing::debug!(evicted, remaining = manager.len(), "swept idle sessions");
            }
        }
    })
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new(DEFAULT_IDLE_TIMEOUT)
    }
}

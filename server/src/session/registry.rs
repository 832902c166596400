use metrics::{counter, gauge};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use crate::session::state::{ParticipantSession, now_millis};

/// Result of rebinding a session to a new connection
#[derive(Debug, Clone)]
pub struct ResumedSession {
    pub session: ParticipantSession,
    /// Connection the session was bound to before the rebind; equal to the
    /// new connection on a duplicate resume call
    pub previous_connection_id: Uuid,
}

/// In-memory table of live participant sessions
///
/// Keyed both by session id and by connection id; the single source of truth
/// for who is currently in a presentation. Absence is a routine race outcome
/// (the connection may already be gone), so lookups return `None` rather
/// than failing.
pub struct SessionRegistry {
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    by_session: HashMap<String, ParticipantSession>,
    by_connection: HashMap<Uuid, String>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
        }
    }

    /// Create a fresh session for a connection
    ///
    /// A connection holds at most one session: if this connection already has
    /// one, the old session is removed first and the new one replaces it.
    pub async fn create(
        &self,
        presentation_id: &str,
        connection_id: Uuid,
        display_name: String,
        is_anonymous: bool,
    ) -> ParticipantSession {
        let session =
            ParticipantSession::new(presentation_id, connection_id, display_name, is_anonymous);

        let mut inner = self.inner.write().await;
        if let Some(old_session_id) = inner.by_connection.remove(&connection_id)
            && let Some(old) = inner.by_session.remove(&old_session_id)
        {
            debug!(
                "Replaced session {} for connection {}",
                old.session_id, connection_id
            );
            counter!("slidecast_sessions_replaced_total").increment(1);
        }

        inner
            .by_connection
            .insert(connection_id, session.session_id.clone());
        inner
            .by_session
            .insert(session.session_id.clone(), session.clone());

        counter!("slidecast_sessions_created_total").increment(1);
        gauge!("slidecast_sessions_active").set(inner.by_session.len() as f64);

        info!(
            "Created session {} for connection {} in presentation {}",
            session.session_id, connection_id, presentation_id
        );

        session
    }

    pub async fn remove_by_session_id(&self, session_id: &str) -> Option<ParticipantSession> {
        let mut inner = self.inner.write().await;
        let session = inner.by_session.remove(session_id)?;
        inner.by_connection.remove(&session.connection_id);
        gauge!("slidecast_sessions_active").set(inner.by_session.len() as f64);
        debug!("Removed session {}", session_id);
        Some(session)
    }

    pub async fn remove_by_connection_id(&self, connection_id: Uuid) -> Option<ParticipantSession> {
        let mut inner = self.inner.write().await;
        let session_id = inner.by_connection.remove(&connection_id)?;
        let session = inner.by_session.remove(&session_id);
        gauge!("slidecast_sessions_active").set(inner.by_session.len() as f64);
        debug!("Removed session {} for connection {}", session_id, connection_id);
        session
    }

    /// Refresh a session's activity timestamp; absent sessions are a no-op
    pub async fn touch(&self, session_id: &str) {
        let mut inner = self.inner.write().await;
        if let Some(session) = inner.by_session.get_mut(session_id) {
            session.last_activity = now_millis();
        }
    }

    /// Same as [`touch`](Self::touch), keyed by the live connection
    pub async fn touch_connection(&self, connection_id: Uuid) {
        let mut inner = self.inner.write().await;
        if let Some(session_id) = inner.by_connection.get(&connection_id).cloned()
            && let Some(session) = inner.by_session.get_mut(&session_id)
        {
            session.last_activity = now_millis();
        }
    }

    pub async fn find_by_connection_id(&self, connection_id: Uuid) -> Option<ParticipantSession> {
        let inner = self.inner.read().await;
        let session_id = inner.by_connection.get(&connection_id)?;
        inner.by_session.get(session_id).cloned()
    }

    pub async fn count_for(&self, presentation_id: &str) -> usize {
        let inner = self.inner.read().await;
        inner
            .by_session
            .values()
            .filter(|s| s.presentation_id == presentation_id)
            .count()
    }

    pub async fn list_for(&self, presentation_id: &str) -> Vec<ParticipantSession> {
        let inner = self.inner.read().await;
        inner
            .by_session
            .values()
            .filter(|s| s.presentation_id == presentation_id)
            .cloned()
            .collect()
    }

    /// Rebind an existing session to a new connection
    ///
    /// Returns `None` when the session id is unknown; the caller falls back
    /// to a fresh create. Calling twice with the same pair is a no-op
    /// success (the previous connection id equals the new one).
    pub async fn resume(
        &self,
        session_id: &str,
        new_connection_id: Uuid,
    ) -> Option<ResumedSession> {
        let mut inner = self.inner.write().await;
        let previous_connection_id = inner.by_session.get(session_id)?.connection_id;

        if previous_connection_id != new_connection_id {
            inner.by_connection.remove(&previous_connection_id);
            inner
                .by_connection
                .insert(new_connection_id, session_id.to_string());
        }

        // get_mut can't miss: the entry was present above and the lock is held
        let session = inner.by_session.get_mut(session_id)?;
        session.connection_id = new_connection_id;
        session.last_activity = now_millis();

        counter!("slidecast_sessions_resumed_total").increment(1);
        info!(
            "Resumed session {} on connection {} (was {})",
            session_id, new_connection_id, previous_connection_id
        );

        Some(ResumedSession {
            session: session.clone(),
            previous_connection_id,
        })
    }

    /// Remove and return every session idle longer than `max_idle`
    ///
    /// The cutoff is computed once at sweep start, so sessions touched while
    /// the scan runs are never evicted.
    pub async fn sweep(&self, max_idle: Duration) -> Vec<ParticipantSession> {
        let cutoff = now_millis().saturating_sub(max_idle.as_millis() as u64);

        let mut inner = self.inner.write().await;
        let stale: Vec<String> = inner
            .by_session
            .values()
            .filter(|s| s.last_activity < cutoff)
            .map(|s| s.session_id.clone())
            .collect();

        let mut removed = Vec::with_capacity(stale.len());
        for session_id in stale {
            if let Some(session) = inner.by_session.remove(&session_id) {
                inner.by_connection.remove(&session.connection_id);
                removed.push(session);
            }
        }

        if !removed.is_empty() {
            counter!("slidecast_sessions_swept_total").increment(removed.len() as u64);
            gauge!("slidecast_sessions_active").set(inner.by_session.len() as f64);
            info!("Swept {} stale session(s)", removed.len());
        }

        removed
    }

    /// Backdate a session's activity so sweep paths can be exercised
    #[cfg(test)]
    pub(crate) async fn set_last_activity(&self, session_id: &str, value: u64) {
        let mut inner = self.inner.write().await;
        if let Some(session) = inner.by_session.get_mut(session_id) {
            session.last_activity = value;
        }
    }

    pub async fn len(&self) -> usize {
        let inner = self.inner.read().await;
        inner.by_session.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

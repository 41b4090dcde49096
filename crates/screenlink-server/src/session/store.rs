//! Authoritative in-memory session table.
//!
//! Owns creation, lookup, expiry sweep, and destruction. Every mutation of
//! a session's fields happens inside a single write-lock critical section,
//! so capacity checks are atomic with the client-list append and a sweep
//! racing a join resolves cleanly (the loser observes the session gone).

use crate::credentials;
use screenlink_proto::{LinkError, LinkResult, PermissionUpdate, Permissions};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Bounded attempts at minting a non-colliding session ID.
const ID_RETRY_LIMIT: usize = 8;

/// A single sharing session between one host and up to N viewers.
#[derive(Debug, Clone)]
pub struct Session {
    /// Public identifier (16 uppercase hex chars, or a caller-chosen room
    /// name on the legacy path).
    pub id: String,
    /// Connection currently acting as host. Exactly one per session; host
    /// disconnect destroys the session.
    pub host: String,
    /// bcrypt hash of the one-time password. `None` only for legacy-room
    /// sessions. Immutable for the life of the session.
    pub password_hash: Option<String>,
    /// Viewer connections, in join order. Bounded by the per-session cap.
    pub clients: Vec<String>,
    /// Current permission flags, host-mutable.
    pub permissions: Permissions,
    /// Creation time, used by the expiry sweep.
    pub created_at: Instant,
    /// Creation time as unix seconds, for the status surface.
    pub created_unix: u64,
}

impl Session {
    fn new(id: String, host: String, password_hash: Option<String>) -> Self {
        Self {
            id,
            host,
            password_hash,
            clients: Vec::new(),
            permissions: Permissions::default(),
            created_at: Instant::now(),
            created_unix: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0),
        }
    }
}

/// Result of a successful client append.
#[derive(Debug, Clone)]
pub struct JoinedSession {
    pub host: String,
    pub permissions: Permissions,
    pub total_clients: usize,
}

/// Outcome of a legacy room join, decided atomically inside the store.
#[derive(Debug, Clone)]
pub enum RoomJoin {
    /// The room did not exist; the joiner is now its host.
    CreatedAsHost,
    /// The room existed; the joiner was appended as a client.
    JoinedAsClient {
        host: String,
        /// Every other member (host + prior clients), for `user-connected`
        /// fan-out.
        others: Vec<String>,
        total_clients: usize,
    },
}

/// Shared session table. Cheap to clone; all clones share the same map.
#[derive(Clone, Default)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<String, Session>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new password-gated session, minting its ID. Retries on the
    /// (practically unreachable) ID collision a bounded number of times.
    pub async fn create(&self, host: String, password_hash: String) -> LinkResult<String> {
        let mut sessions = self.sessions.write().await;
        for _ in 0..ID_RETRY_LIMIT {
            let id = credentials::generate_session_id();
            if sessions.contains_key(&id) {
                warn!(session_id = %id, "session id collision, retrying");
                continue;
            }
            sessions.insert(
                id.clone(),
                Session::new(id.clone(), host, Some(password_hash)),
            );
            info!(session_id = %id, "session created");
            return Ok(id);
        }
        Err(LinkError::Credential(
            "could not mint a unique session id".into(),
        ))
    }

    /// Legacy room join: create-if-absent with the joiner as host, otherwise
    /// append as client. One critical section, so two racing first-joiners
    /// cannot both become host.
    ///
    /// Only reaches legacy (password-less) rooms. A password-gated session is
    /// invisible to this path and reports not-found, so knowing a session ID
    /// is never enough to skip its password check.
    pub async fn join_room(
        &self,
        room_id: &str,
        conn_id: &str,
        max_clients: usize,
    ) -> LinkResult<RoomJoin> {
        let mut sessions = self.sessions.write().await;
        match sessions.get_mut(room_id) {
            None => {
                sessions.insert(
                    room_id.to_string(),
                    Session::new(room_id.to_string(), conn_id.to_string(), None),
                );
                info!(room_id, host = conn_id, "room created, joiner is host");
                Ok(RoomJoin::CreatedAsHost)
            }
            Some(session) if session.password_hash.is_some() => {
                warn!(room_id, client = conn_id, "room join refused, session is password-gated");
                Err(LinkError::SessionNotFound)
            }
            Some(session) => {
                if session.clients.len() >= max_clients {
                    return Err(LinkError::SessionFull);
                }
                let mut others = vec![session.host.clone()];
                others.extend(session.clients.iter().cloned());
                session.clients.push(conn_id.to_string());
                debug!(room_id, client = conn_id, total = session.clients.len(), "room join");
                Ok(RoomJoin::JoinedAsClient {
                    host: session.host.clone(),
                    others,
                    total_clients: session.clients.len(),
                })
            }
        }
    }

    /// Snapshot a session by exact ID. No lock escapes the store.
    pub async fn get(&self, session_id: &str) -> Option<Session> {
        self.sessions.read().await.get(session_id).cloned()
    }

    /// Remove a session outright, returning it if it was still present.
    pub async fn remove(&self, session_id: &str) -> Option<Session> {
        let removed = self.sessions.write().await.remove(session_id);
        if removed.is_some() {
            info!(session_id, "session removed");
        }
        removed
    }

    /// Append a client, capacity-checked atomically with the append. Two
    /// concurrent joins cannot both take the last slot.
    pub async fn try_add_client(
        &self,
        session_id: &str,
        conn_id: &str,
        max_clients: usize,
    ) -> LinkResult<JoinedSession> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(session_id)
            .ok_or(LinkError::SessionNotFound)?;
        if session.clients.len() >= max_clients {
            return Err(LinkError::SessionFull);
        }
        session.clients.push(conn_id.to_string());
        Ok(JoinedSession {
            host: session.host.clone(),
            permissions: session.permissions,
            total_clients: session.clients.len(),
        })
    }

    /// Remove a client from its session. Returns the host and remaining
    /// client count, or `None` if session or client were already gone.
    pub async fn remove_client(
        &self,
        session_id: &str,
        conn_id: &str,
    ) -> Option<(String, usize)> {
        let mut sessions = self.sessions.write().await;
        let session = sessions.get_mut(session_id)?;
        let before = session.clients.len();
        session.clients.retain(|c| c != conn_id);
        if session.clients.len() == before {
            return None;
        }
        Some((session.host.clone(), session.clients.len()))
    }

    /// Merge a partial permission update, returning the full resulting set
    /// together with the client list to broadcast to.
    pub async fn merge_permissions(
        &self,
        session_id: &str,
        update: &PermissionUpdate,
    ) -> Option<(Permissions, Vec<String>)> {
        let mut sessions = self.sessions.write().await;
        let session = sessions.get_mut(session_id)?;
        session.permissions.merge(update);
        Some((session.permissions, session.clients.clone()))
    }

    /// Remove and return every session older than `timeout` as of `now`.
    pub async fn sweep_expired(&self, now: Instant, timeout: Duration) -> Vec<Session> {
        let mut sessions = self.sessions.write().await;
        let mut removed = Vec::new();
        sessions.retain(|id, session| {
            let age = now.saturating_duration_since(session.created_at);
            if age > timeout {
                warn!(session_id = %id, age_secs = age.as_secs(), "session expired");
                removed.push(session.clone());
                false
            } else {
                true
            }
        });
        if !removed.is_empty() {
            debug!(count = removed.len(), "sweep removed sessions");
        }
        removed
    }

    /// Number of live sessions.
    pub async fn count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with_session() -> SessionStore {
        SessionStore::new()
    }

    #[tokio::test]
    async fn create_and_get() {
        let store = store_with_session();
        let id = store.create("host-1".into(), "$hash".into()).await.unwrap();
        assert_eq!(id.len(), 16);
        let session = store.get(&id).await.unwrap();
        assert_eq!(session.host, "host-1");
        assert_eq!(session.password_hash.as_deref(), Some("$hash"));
        assert!(session.clients.is_empty());
        assert!(session.permissions.view_screen);
    }

    #[tokio::test]
    async fn lookup_is_exact_match_only() {
        let store = store_with_session();
        let id = store.create("host-1".into(), "$hash".into()).await.unwrap();
        assert!(store.get(&id.to_lowercase()).await.is_none());
        assert!(store.get("").await.is_none());
    }

    #[tokio::test]
    async fn capacity_is_enforced_on_append() {
        let store = store_with_session();
        let id = store.create("host-1".into(), "$hash".into()).await.unwrap();
        for n in 0..5 {
            let joined = store.try_add_client(&id, &format!("c{n}"), 5).await.unwrap();
            assert_eq!(joined.total_clients, n + 1);
        }
        let err = store.try_add_client(&id, "c5", 5).await.unwrap_err();
        assert!(matches!(err, LinkError::SessionFull));
        // Session unchanged by the rejected join.
        assert_eq!(store.get(&id).await.unwrap().clients.len(), 5);
    }

    #[tokio::test]
    async fn add_to_missing_session_is_not_found() {
        let store = store_with_session();
        let err = store.try_add_client("ABCDEF0123456789", "c0", 5).await.unwrap_err();
        assert!(matches!(err, LinkError::SessionNotFound));
    }

    #[tokio::test]
    async fn remove_client_reports_remaining() {
        let store = store_with_session();
        let id = store.create("host-1".into(), "$hash".into()).await.unwrap();
        store.try_add_client(&id, "c0", 5).await.unwrap();
        store.try_add_client(&id, "c1", 5).await.unwrap();
        let (host, remaining) = store.remove_client(&id, "c0").await.unwrap();
        assert_eq!(host, "host-1");
        assert_eq!(remaining, 1);
        // Removing again is a no-op.
        assert!(store.remove_client(&id, "c0").await.is_none());
    }

    #[tokio::test]
    async fn room_join_first_is_host_second_is_client() {
        let store = store_with_session();
        let first = store.join_room("support-7", "a", 5).await.unwrap();
        assert!(matches!(first, RoomJoin::CreatedAsHost));
        let second = store.join_room("support-7", "b", 5).await.unwrap();
        match second {
            RoomJoin::JoinedAsClient { host, others, total_clients } => {
                assert_eq!(host, "a");
                assert_eq!(others, vec!["a".to_string()]);
                assert_eq!(total_clients, 1);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        // Legacy sessions carry no password hash.
        assert!(store.get("support-7").await.unwrap().password_hash.is_none());
    }

    #[tokio::test]
    async fn room_join_cannot_enter_password_gated_session() {
        let store = store_with_session();
        let id = store.create("host-1".into(), "$hash".into()).await.unwrap();
        let err = store.join_room(&id, "attacker", 5).await.unwrap_err();
        assert!(matches!(err, LinkError::SessionNotFound));
        // The gated session is untouched: no client appended, no host swap.
        let session = store.get(&id).await.unwrap();
        assert!(session.clients.is_empty());
        assert_eq!(session.host, "host-1");
    }

    #[tokio::test]
    async fn sweep_respects_the_timeout_boundary() {
        let store = store_with_session();
        let id = store.create("host-1".into(), "$hash".into()).await.unwrap();
        let timeout = Duration::from_secs(24 * 3600);
        let t0 = store.get(&id).await.unwrap().created_at;

        // 23h in: survives.
        let removed = store
            .sweep_expired(t0 + Duration::from_secs(23 * 3600), timeout)
            .await;
        assert!(removed.is_empty());
        assert!(store.get(&id).await.is_some());

        // 24h + 1s: swept.
        let removed = store
            .sweep_expired(t0 + timeout + Duration::from_secs(1), timeout)
            .await;
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].id, id);
        assert!(store.get(&id).await.is_none());
    }

    #[tokio::test]
    async fn permission_merge_returns_full_set_and_targets() {
        let store = store_with_session();
        let id = store.create("host-1".into(), "$hash".into()).await.unwrap();
        store.try_add_client(&id, "c0", 5).await.unwrap();
        let update = PermissionUpdate {
            control_mouse: Some(false),
            ..Default::default()
        };
        let (perms, targets) = store.merge_permissions(&id, &update).await.unwrap();
        assert!(!perms.control_mouse);
        assert!(perms.control_keyboard);
        assert_eq!(targets, vec!["c0".to_string()]);
    }
}

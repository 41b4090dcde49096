//! Session lifecycle management: create, join, leave, disconnect, expiry.
//!
//! Coordinates the session store and connection registry so that both are
//! mutated within one logical operation, and fans out the cascading
//! notifications (join counts, host-disconnect teardown, expiry).

use super::registry::ConnectionRegistry;
use super::store::{RoomJoin, Session, SessionStore};
use crate::credentials;
use crate::notifier::Notifier;
use screenlink_proto::{LinkError, LinkResult, Permissions, Role, ServerEvent};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Credentials handed to the host at creation. The plaintext password
/// appears here once and is never persisted.
#[derive(Debug)]
pub struct SessionCredentials {
    pub session_id: String,
    pub password: String,
}

/// Drives the per-session state machine: created → active (≥0 clients) →
/// ended. Ended is terminal; late joins against an ended session observe
/// "Session not found".
pub struct LifecycleManager {
    store: SessionStore,
    registry: ConnectionRegistry,
    notifier: Arc<dyn Notifier>,
    max_clients: usize,
    session_timeout: Duration,
}

impl LifecycleManager {
    pub fn new(
        store: SessionStore,
        registry: ConnectionRegistry,
        notifier: Arc<dyn Notifier>,
        max_clients: usize,
        session_timeout: Duration,
    ) -> Self {
        Self {
            store,
            registry,
            notifier,
            max_clients,
            session_timeout,
        }
    }

    /// Create a password-gated session with `host_conn_id` as its host.
    pub async fn create_session(&self, host_conn_id: &str) -> LinkResult<SessionCredentials> {
        let password = credentials::generate_password();
        let hash = {
            let password = password.clone();
            tokio::task::spawn_blocking(move || credentials::hash_password(&password))
                .await
                .map_err(|e| LinkError::Credential(e.to_string()))??
        };

        let session_id = self.store.create(host_conn_id.to_string(), hash).await?;
        self.registry
            .register(host_conn_id, Role::Host, &session_id)
            .await;

        info!(session_id = %session_id, host = host_conn_id, "session created by host");
        Ok(SessionCredentials {
            session_id,
            password,
        })
    }

    /// Join a session as a viewer. Password verification runs off the lock
    /// path; the capacity check is atomic with the client-list append, and a
    /// session swept mid-verification reports `SessionNotFound`.
    pub async fn join_session(
        &self,
        session_id: &str,
        password: &str,
        conn_id: &str,
    ) -> LinkResult<Permissions> {
        let session = self
            .store
            .get(session_id)
            .await
            .ok_or(LinkError::SessionNotFound)?;

        if let Some(hash) = session.password_hash {
            let password = password.to_string();
            let ok = tokio::task::spawn_blocking(move || {
                credentials::verify_password(&password, &hash)
            })
            .await
            .map_err(|e| LinkError::Credential(e.to_string()))?;
            if !ok {
                debug!(session_id, conn_id, "join rejected: bad password");
                return Err(LinkError::InvalidPassword);
            }
        }

        let joined = self
            .store
            .try_add_client(session_id, conn_id, self.max_clients)
            .await?;
        self.registry.register(conn_id, Role::Client, session_id).await;

        self.notifier.send_to(
            &joined.host,
            ServerEvent::ClientJoined {
                client_id: conn_id.to_string(),
                total_clients: joined.total_clients,
            },
        );
        info!(session_id, client = conn_id, total = joined.total_clients, "client joined");
        Ok(joined.permissions)
    }

    /// Legacy room join: no password gate. The first joiner of a room name
    /// becomes its host; later joiners become clients. Kept as a distinct
    /// compatibility mode with its weaker trust model; password-gated
    /// sessions are unreachable through it.
    pub async fn join_room(&self, room_id: &str, conn_id: &str) -> LinkResult<Role> {
        match self.store.join_room(room_id, conn_id, self.max_clients).await? {
            RoomJoin::CreatedAsHost => {
                self.registry.register(conn_id, Role::Host, room_id).await;
                Ok(Role::Host)
            }
            RoomJoin::JoinedAsClient {
                host,
                others,
                total_clients,
            } => {
                self.registry.register(conn_id, Role::Client, room_id).await;
                self.notifier.broadcast_to(
                    &others,
                    ServerEvent::UserConnected {
                        user_id: conn_id.to_string(),
                    },
                );
                self.notifier.send_to(
                    &host,
                    ServerEvent::ClientJoined {
                        client_id: conn_id.to_string(),
                        total_clients,
                    },
                );
                Ok(Role::Client)
            }
        }
    }

    /// Explicit leave. Same semantics as a transport-level disconnect.
    pub async fn leave(&self, conn_id: &str) {
        self.handle_disconnect(conn_id).await;
    }

    /// Role-dependent teardown, triggered by transport disconnect or an
    /// explicit leave. Idempotent: an unknown or already-removed connection
    /// is a no-op.
    pub async fn handle_disconnect(&self, conn_id: &str) {
        let Some(record) = self.registry.lookup(conn_id).await else {
            return;
        };

        match record.role {
            Role::Host => {
                // Host disconnect always destroys the session, no hand-off.
                if let Some(session) = self.store.remove(&record.session_id).await {
                    self.notifier
                        .broadcast_to(&session.clients, ServerEvent::HostDisconnected);
                    for client in &session.clients {
                        self.registry.unregister(client).await;
                    }
                    info!(
                        session_id = %record.session_id,
                        clients = session.clients.len(),
                        "host disconnected, session destroyed"
                    );
                }
                self.registry.unregister(conn_id).await;
            }
            Role::Client => {
                if let Some((host, remaining)) = self
                    .store
                    .remove_client(&record.session_id, conn_id)
                    .await
                {
                    self.notifier.send_to(
                        &host,
                        ServerEvent::ClientDisconnected {
                            client_id: conn_id.to_string(),
                            total_clients: remaining,
                        },
                    );
                    debug!(session_id = %record.session_id, client = conn_id, remaining, "client left");
                }
                self.registry.unregister(conn_id).await;
            }
        }
    }

    /// Expiry sweep: removes every session older than the configured
    /// timeout as of `now`, notifying host and clients and unregistering
    /// their connections — the same teardown discipline as a host
    /// disconnect.
    pub async fn sweep(&self, now: Instant) -> Vec<Session> {
        let removed = self.store.sweep_expired(now, self.session_timeout).await;
        for session in &removed {
            self.notifier
                .send_to(&session.host, ServerEvent::SessionExpired);
            self.notifier
                .broadcast_to(&session.clients, ServerEvent::SessionExpired);
            self.registry.unregister(&session.host).await;
            for client in &session.clients {
                self.registry.unregister(client).await;
            }
        }
        removed
    }

    /// Store handle for the HTTP status surface.
    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Registry handle for role checks in the signaling/gateway layers.
    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }
}

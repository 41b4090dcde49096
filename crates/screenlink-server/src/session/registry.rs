//! Connection registry: maps each live transport connection to its role
//! and owning session.
//!
//! Side-effect free with respect to the session store; the lifecycle
//! manager keeps the two in sync within each logical operation.

use screenlink_proto::Role;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// A live connection's association with a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionRecord {
    pub connection_id: String,
    pub role: Role,
    pub session_id: String,
}

/// Registry of connection → (role, session) records.
#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    records: Arc<RwLock<HashMap<String, ConnectionRecord>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a connection's role and session. Overwrites any stale record
    /// for the same connection.
    pub async fn register(&self, connection_id: &str, role: Role, session_id: &str) {
        let record = ConnectionRecord {
            connection_id: connection_id.to_string(),
            role,
            session_id: session_id.to_string(),
        };
        self.records
            .write()
            .await
            .insert(connection_id.to_string(), record);
        debug!(connection_id, ?role, session_id, "connection registered");
    }

    /// Look up a connection's record.
    pub async fn lookup(&self, connection_id: &str) -> Option<ConnectionRecord> {
        self.records.read().await.get(connection_id).cloned()
    }

    /// Remove a connection's record. Idempotent.
    pub async fn unregister(&self, connection_id: &str) {
        if self.records.write().await.remove(connection_id).is_some() {
            debug!(connection_id, "connection unregistered");
        }
    }

    /// Number of registered connections.
    pub async fn count(&self) -> usize {
        self.records.read().await.len()
    }
}

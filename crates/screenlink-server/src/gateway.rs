//! Permission and command gateway.
//!
//! Validates remote-control commands against the session's current
//! permission flags before they reach the host, and applies host-issued
//! permission updates with fan-out to every client.

use crate::notifier::Notifier;
use crate::session::{ConnectionRegistry, SessionStore};
use screenlink_proto::{
    CommandKind, ControlCommand, LinkError, LinkResult, PermissionUpdate, Role, ServerEvent,
};
use std::sync::Arc;
use tracing::{debug, info};

pub struct CommandGateway {
    store: SessionStore,
    registry: ConnectionRegistry,
    notifier: Arc<dyn Notifier>,
}

impl CommandGateway {
    pub fn new(
        store: SessionStore,
        registry: ConnectionRegistry,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            store,
            registry,
            notifier,
        }
    }

    /// Merge a partial permission update into the caller's session and
    /// broadcast the complete resulting set to every client. Host-only.
    pub async fn update_permissions(
        &self,
        conn_id: &str,
        update: &PermissionUpdate,
    ) -> LinkResult<()> {
        let record = self
            .registry
            .lookup(conn_id)
            .await
            .ok_or_else(|| LinkError::Unauthorized("Not in a session".into()))?;
        if record.role != Role::Host {
            return Err(LinkError::Unauthorized(
                "Only the host may change permissions".into(),
            ));
        }

        let (permissions, clients) = self
            .store
            .merge_permissions(&record.session_id, update)
            .await
            .ok_or(LinkError::SessionNotFound)?;

        info!(session_id = %record.session_id, ?permissions, "permissions updated");
        self.notifier
            .broadcast_to(&clients, ServerEvent::PermissionsUpdated { permissions });
        Ok(())
    }

    /// Forward a remote-control command to the session's host if the
    /// matching permission flag allows it. Client-only. A denied command
    /// never reaches the host.
    pub async fn forward_command(&self, conn_id: &str, command: ControlCommand) -> LinkResult<()> {
        let record = self
            .registry
            .lookup(conn_id)
            .await
            .ok_or_else(|| LinkError::Unauthorized("Not in a session".into()))?;
        if record.role != Role::Client {
            return Err(LinkError::Unauthorized(
                "Only a client may send control commands".into(),
            ));
        }

        let session = self
            .store
            .get(&record.session_id)
            .await
            .ok_or(LinkError::SessionNotFound)?;

        let allowed = match command.kind {
            CommandKind::Mouse => session.permissions.control_mouse,
            CommandKind::Keyboard => session.permissions.control_keyboard,
        };
        if !allowed {
            debug!(
                session_id = %record.session_id,
                client = conn_id,
                kind = ?command.kind,
                "control command denied by permissions"
            );
            return Err(LinkError::Unauthorized(
                "Control permission is disabled".into(),
            ));
        }

        self.notifier.send_to(
            &session.host,
            ServerEvent::RemoteControl {
                from_id: conn_id.to_string(),
                command,
            },
        );
        Ok(())
    }
}

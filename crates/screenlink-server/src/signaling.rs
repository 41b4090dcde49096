//! Signaling relay: forwards WebRTC offer/answer/ICE blobs between the two
//! endpoints of a session.
//!
//! The server is a blind relay — SDP and ICE payloads are never inspected.
//! Offers may only originate from a host, answers from a client; ICE
//! trickles both ways. All forwards are fire-and-forget: a vanished target
//! drops the message without surfacing an error to the sender.

use crate::notifier::Notifier;
use crate::session::ConnectionRegistry;
use screenlink_proto::{LinkError, LinkResult, Role, ServerEvent};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

pub struct SignalingRouter {
    registry: ConnectionRegistry,
    notifier: Arc<dyn Notifier>,
}

impl SignalingRouter {
    pub fn new(registry: ConnectionRegistry, notifier: Arc<dyn Notifier>) -> Self {
        Self { registry, notifier }
    }

    /// Relay an SDP offer. Host-only.
    pub async fn relay_offer(
        &self,
        from_id: &str,
        target_id: &str,
        offer: Value,
    ) -> LinkResult<()> {
        self.require_role(from_id, Role::Host, "Only the host may send offers")
            .await?;
        debug!(from = from_id, target = target_id, "relaying offer");
        self.notifier.send_to(
            target_id,
            ServerEvent::WebrtcOffer {
                from_id: from_id.to_string(),
                offer,
            },
        );
        Ok(())
    }

    /// Relay an SDP answer. Client-only.
    pub async fn relay_answer(
        &self,
        from_id: &str,
        target_id: &str,
        answer: Value,
    ) -> LinkResult<()> {
        self.require_role(from_id, Role::Client, "Only a client may send answers")
            .await?;
        debug!(from = from_id, target = target_id, "relaying answer");
        self.notifier.send_to(
            target_id,
            ServerEvent::WebrtcAnswer {
                from_id: from_id.to_string(),
                answer,
            },
        );
        Ok(())
    }

    /// Relay a trickled ICE candidate. Permitted for either role, but the
    /// sender must belong to a session.
    pub async fn relay_ice_candidate(
        &self,
        from_id: &str,
        target_id: &str,
        candidate: Value,
    ) -> LinkResult<()> {
        if self.registry.lookup(from_id).await.is_none() {
            return Err(LinkError::Unauthorized(
                "Not part of a session".to_string(),
            ));
        }
        self.notifier.send_to(
            target_id,
            ServerEvent::IceCandidate {
                from_id: from_id.to_string(),
                candidate,
            },
        );
        Ok(())
    }

    /// Legacy unrestricted relay for the room compatibility mode. No role
    /// check, matching its weaker trust model.
    pub fn relay_signal(&self, from_id: &str, target_id: &str, signal: Value) {
        self.notifier.send_to(
            target_id,
            ServerEvent::Signal {
                from: from_id.to_string(),
                signal,
            },
        );
    }

    async fn require_role(&self, conn_id: &str, role: Role, denial: &str) -> LinkResult<()> {
        match self.registry.lookup(conn_id).await {
            Some(record) if record.role == role => Ok(()),
            _ => Err(LinkError::Unauthorized(denial.to_string())),
        }
    }
}

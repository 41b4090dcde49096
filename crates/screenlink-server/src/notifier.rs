//! Transport-agnostic notification fan-out.
//!
//! The session/lifecycle layers never talk to a socket library directly;
//! they push [`ServerEvent`]s through this seam. The production
//! implementation backs each connection with an mpsc sender drained by its
//! WebSocket write loop. All sends are best-effort: a missing or saturated
//! target drops the event silently, matching the at-most-once relay
//! contract.

use screenlink_proto::ServerEvent;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio::sync::mpsc;
use tracing::debug;

/// Capability to push events to connections by ID.
pub trait Notifier: Send + Sync {
    /// Fire-and-forget send to a single connection.
    fn send_to(&self, connection_id: &str, event: ServerEvent);

    /// Fire-and-forget send to each listed connection.
    fn broadcast_to(&self, connection_ids: &[String], event: ServerEvent) {
        for id in connection_ids {
            self.send_to(id, event.clone());
        }
    }
}

/// Production notifier: per-connection outbound mpsc senders.
#[derive(Clone, Default)]
pub struct ChannelNotifier {
    senders: Arc<RwLock<HashMap<String, mpsc::Sender<ServerEvent>>>>,
}

impl ChannelNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a connection's outbound sender. Called at accept time.
    pub fn attach(&self, connection_id: &str, sender: mpsc::Sender<ServerEvent>) {
        if let Ok(mut senders) = self.senders.write() {
            senders.insert(connection_id.to_string(), sender);
        }
    }

    /// Detach a connection's sender. Called when its transport closes.
    pub fn detach(&self, connection_id: &str) {
        if let Ok(mut senders) = self.senders.write() {
            senders.remove(connection_id);
        }
    }
}

impl Notifier for ChannelNotifier {
    fn send_to(&self, connection_id: &str, event: ServerEvent) {
        let sender = match self.senders.read() {
            Ok(senders) => senders.get(connection_id).cloned(),
            Err(_) => None,
        };
        match sender {
            Some(tx) => {
                if tx.try_send(event).is_err() {
                    debug!(connection_id, "dropping event for saturated or closed connection");
                }
            }
            None => {
                debug!(connection_id, "dropping event for unknown connection");
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn delivers_to_attached_connection() {
        let notifier = ChannelNotifier::new();
        let (tx, mut rx) = mpsc::channel(4);
        notifier.attach("c1", tx);
        notifier.send_to("c1", ServerEvent::HostDisconnected);
        assert_eq!(rx.recv().await, Some(ServerEvent::HostDisconnected));
    }

    #[tokio::test]
    async fn missing_target_drops_silently() {
        let notifier = ChannelNotifier::new();
        // No panic, no error surfaced to the sender.
        notifier.send_to("nobody", ServerEvent::SessionExpired);
    }

    #[tokio::test]
    async fn detach_stops_delivery() {
        let notifier = ChannelNotifier::new();
        let (tx, mut rx) = mpsc::channel(4);
        notifier.attach("c1", tx);
        notifier.detach("c1");
        notifier.send_to("c1", ServerEvent::HostDisconnected);
        assert!(rx.try_recv().is_err());
    }
}

//! Signaling event types for the screenlink wire protocol.
//!
//! Every frame on the wire is a JSON object `{"event": "...", "data": {...}}`
//! with a kebab-case event name. WebRTC payloads (SDP offers/answers, ICE
//! candidates) are opaque to the server and carried as raw JSON values.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Role a connection holds within a session.
///
/// Assigned explicitly at registration time, never inferred later from
/// table contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Host,
    Client,
}

/// Per-session permission flags, host-mutable and broadcast to clients on
/// change.
///
/// `view_screen` gates nothing server-side (media flows peer-to-peer once
/// WebRTC is up) but is carried for client-side UI gating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Permissions {
    pub view_screen: bool,
    pub control_mouse: bool,
    pub control_keyboard: bool,
}

impl Default for Permissions {
    fn default() -> Self {
        Self {
            view_screen: true,
            control_mouse: true,
            control_keyboard: true,
        }
    }
}

/// Partial permission update. Omitted flags retain their prior value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub view_screen: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub control_mouse: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub control_keyboard: Option<bool>,
}

impl Permissions {
    /// Merge a partial update into the current flag set.
    pub fn merge(&mut self, update: &PermissionUpdate) {
        if let Some(v) = update.view_screen {
            self.view_screen = v;
        }
        if let Some(v) = update.control_mouse {
            self.control_mouse = v;
        }
        if let Some(v) = update.control_keyboard {
            self.control_keyboard = v;
        }
    }
}

/// Kind of remote-control command a client can send to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandKind {
    Mouse,
    Keyboard,
}

/// A remote-control command. The payload (coordinates, key codes, ...) is
/// opaque to the server; only `type` is inspected for permission gating.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlCommand {
    #[serde(rename = "type")]
    pub kind: CommandKind,
    #[serde(flatten)]
    pub payload: Value,
}

/// Events sent by a connection to the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientEvent {
    /// Request a new session; the caller becomes its host.
    CreateSession,
    /// Join an existing session as a viewer.
    #[serde(rename_all = "camelCase")]
    JoinSession { session_id: String, password: String },
    /// Legacy room join: first joiner becomes host, later joiners become
    /// clients, no password gate.
    #[serde(rename_all = "camelCase")]
    JoinRoom { room_id: String },
    /// WebRTC SDP offer, relayed to the target connection (host-only).
    #[serde(rename_all = "camelCase")]
    WebrtcOffer { target_id: String, offer: Value },
    /// WebRTC SDP answer, relayed to the target connection (client-only).
    #[serde(rename_all = "camelCase")]
    WebrtcAnswer { target_id: String, answer: Value },
    /// Trickled ICE candidate, relayed in either direction.
    #[serde(rename_all = "camelCase")]
    IceCandidate { target_id: String, candidate: Value },
    /// Legacy unrestricted signal relay for the room compatibility mode.
    Signal { to: String, signal: Value },
    /// Host-only partial permission update.
    UpdatePermissions { permissions: PermissionUpdate },
    /// Client-only remote-control command, permission-gated.
    RemoteControl { command: ControlCommand },
    /// Explicit leave; same teardown semantics as a transport disconnect.
    #[serde(rename_all = "camelCase")]
    LeaveRoom { room_id: String },
}

/// Events sent by the server to a connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
    /// Response to `create-session`. The plaintext password appears here
    /// once and is never retrievable again.
    #[serde(rename_all = "camelCase")]
    SessionCreated {
        success: bool,
        session_id: String,
        password: String,
    },
    /// Response to `join-session`.
    #[serde(rename_all = "camelCase")]
    JoinResult {
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        permissions: Option<Permissions>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    /// Legacy room mode: a new connection joined the room.
    #[serde(rename_all = "camelCase")]
    UserConnected { user_id: String },
    /// A viewer joined the session (sent to the host).
    #[serde(rename_all = "camelCase")]
    ClientJoined {
        client_id: String,
        total_clients: usize,
    },
    /// A viewer left or disconnected (sent to the host).
    #[serde(rename_all = "camelCase")]
    ClientDisconnected {
        client_id: String,
        total_clients: usize,
    },
    /// The host disconnected; the session is gone.
    HostDisconnected,
    /// The session exceeded its lifetime and was swept.
    SessionExpired,
    /// Full resulting permission set after a host update.
    PermissionsUpdated { permissions: Permissions },
    #[serde(rename_all = "camelCase")]
    WebrtcOffer { from_id: String, offer: Value },
    #[serde(rename_all = "camelCase")]
    WebrtcAnswer { from_id: String, answer: Value },
    #[serde(rename_all = "camelCase")]
    IceCandidate { from_id: String, candidate: Value },
    Signal { from: String, signal: Value },
    /// Remote-control command forwarded to the host.
    #[serde(rename_all = "camelCase")]
    RemoteControl {
        from_id: String,
        command: ControlCommand,
    },
    /// Error surfaced to the offending connection only.
    Error { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn client_event_wire_names() {
        let event = ClientEvent::JoinSession {
            session_id: "A1B2C3D4E5F60718".into(),
            password: "secret".into(),
        };
        let v = serde_json::to_value(&event).unwrap();
        assert_eq!(v["event"], "join-session");
        assert_eq!(v["data"]["sessionId"], "A1B2C3D4E5F60718");
        assert_eq!(v["data"]["password"], "secret");
    }

    #[test]
    fn create_session_has_no_payload() {
        let v = serde_json::to_value(&ClientEvent::CreateSession).unwrap();
        assert_eq!(v["event"], "create-session");
        let parsed: ClientEvent =
            serde_json::from_value(json!({"event": "create-session"})).unwrap();
        assert_eq!(parsed, ClientEvent::CreateSession);
    }

    #[test]
    fn offer_payload_is_opaque() {
        let raw = json!({
            "event": "webrtc-offer",
            "data": {
                "targetId": "abc123",
                "offer": {"type": "offer", "sdp": "v=0\r\n..."}
            }
        });
        let parsed: ClientEvent = serde_json::from_value(raw).unwrap();
        match parsed {
            ClientEvent::WebrtcOffer { target_id, offer } => {
                assert_eq!(target_id, "abc123");
                assert_eq!(offer["sdp"], "v=0\r\n...");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn permissions_wire_names_are_camel_case() {
        let v = serde_json::to_value(Permissions::default()).unwrap();
        assert_eq!(v, json!({"viewScreen": true, "controlMouse": true, "controlKeyboard": true}));
    }

    #[test]
    fn permission_merge_is_partial() {
        let mut perms = Permissions::default();
        perms.merge(&PermissionUpdate {
            control_mouse: Some(false),
            ..Default::default()
        });
        assert!(perms.view_screen);
        assert!(!perms.control_mouse);
        assert!(perms.control_keyboard);

        // Omitted fields deserialize to None and leave flags untouched.
        let update: PermissionUpdate =
            serde_json::from_value(json!({"controlKeyboard": false})).unwrap();
        perms.merge(&update);
        assert!(!perms.control_mouse);
        assert!(!perms.control_keyboard);
    }

    #[test]
    fn control_command_keeps_payload_fields() {
        let raw = json!({"type": "mouse", "x": 120, "y": 55, "button": "left"});
        let cmd: ControlCommand = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(cmd.kind, CommandKind::Mouse);
        assert_eq!(cmd.payload["x"], 120);
        let back = serde_json::to_value(&cmd).unwrap();
        assert_eq!(back, raw);
    }

    #[test]
    fn server_event_wire_names() {
        let v = serde_json::to_value(&ServerEvent::ClientJoined {
            client_id: "c1".into(),
            total_clients: 2,
        })
        .unwrap();
        assert_eq!(v["event"], "client-joined");
        assert_eq!(v["data"]["clientId"], "c1");
        assert_eq!(v["data"]["totalClients"], 2);

        let v = serde_json::to_value(&ServerEvent::HostDisconnected).unwrap();
        assert_eq!(v["event"], "host-disconnected");
    }

    #[test]
    fn join_result_omits_absent_fields() {
        let v = serde_json::to_value(&ServerEvent::JoinResult {
            success: false,
            permissions: None,
            error: Some("Invalid password".into()),
        })
        .unwrap();
        assert!(v["data"].get("permissions").is_none());
        assert_eq!(v["data"]["error"], "Invalid password");
    }
}

//! screenlink-proto: Shared protocol library for screenlink.
//!
//! Provides the JSON signaling event types exchanged between the
//! coordination server and its host/viewer connections, the permission
//! flag model, the error taxonomy, and codec helpers.

pub mod codec;
pub mod error;
pub mod messages;

// Re-export commonly used items at crate root.
pub use codec::{decode_client_event, decode_server_event, encode_event, MAX_EVENT_SIZE};
pub use error::{LinkError, LinkResult};
pub use messages::{
    ClientEvent, CommandKind, ControlCommand, PermissionUpdate, Permissions, Role, ServerEvent,
};

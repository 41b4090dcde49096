//! JSON text-frame codec for the screenlink control channel.
//!
//! The WebSocket layer already frames messages, so the codec is a thin
//! serialize/deserialize wrapper with a size cap shared by both directions.

use crate::error::{LinkError, LinkResult};
use crate::messages::{ClientEvent, ServerEvent};

/// Maximum accepted event size in bytes (1 MiB). SDP blobs are a few KiB;
/// anything near this limit is malformed or hostile.
pub const MAX_EVENT_SIZE: usize = 1_048_576;

/// Encode an event into a JSON text frame.
pub fn encode_event<T: serde::Serialize>(event: &T) -> LinkResult<String> {
    let text = serde_json::to_string(event)?;
    if text.len() > MAX_EVENT_SIZE {
        return Err(LinkError::InvalidMessage(format!(
            "event too large: {} bytes",
            text.len()
        )));
    }
    Ok(text)
}

/// Decode a client→server event from a JSON text frame.
pub fn decode_client_event(text: &str) -> LinkResult<ClientEvent> {
    check_size(text)?;
    Ok(serde_json::from_str(text)?)
}

/// Decode a server→client event from a JSON text frame.
pub fn decode_server_event(text: &str) -> LinkResult<ServerEvent> {
    check_size(text)?;
    Ok(serde_json::from_str(text)?)
}

fn check_size(text: &str) -> LinkResult<()> {
    if text.len() > MAX_EVENT_SIZE {
        return Err(LinkError::InvalidMessage(format!(
            "frame too large: {} bytes (max {MAX_EVENT_SIZE})",
            text.len()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::ClientEvent;

    #[test]
    fn round_trip_client_event() {
        let event = ClientEvent::JoinRoom {
            room_id: "support-42".into(),
        };
        let text = encode_event(&event).unwrap();
        let decoded = decode_client_event(&text).unwrap();
        assert_eq!(decoded, event);
    }

    #[test]
    fn rejects_oversized_frame() {
        let big = format!(
            r#"{{"event":"signal","data":{{"to":"x","signal":"{}"}}}}"#,
            "a".repeat(MAX_EVENT_SIZE)
        );
        let err = decode_client_event(&big).unwrap_err();
        assert!(matches!(err, LinkError::InvalidMessage(_)));
    }

    #[test]
    fn rejects_unknown_event() {
        let err = decode_client_event(r#"{"event":"no-such-event","data":{}}"#).unwrap_err();
        assert!(matches!(err, LinkError::InvalidMessage(_)));
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(decode_client_event("{not json").is_err());
    }
}

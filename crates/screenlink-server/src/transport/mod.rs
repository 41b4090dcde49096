//! Transport layer: WebSocket listener with optional TLS.

pub mod websocket;

//! Session state: store, connection registry, lifecycle manager.

pub mod lifecycle;
pub mod registry;
pub mod store;

pub use lifecycle::{LifecycleManager, SessionCredentials};
pub use registry::{ConnectionRecord, ConnectionRegistry};
pub use store::{JoinedSession, RoomJoin, Session, SessionStore};

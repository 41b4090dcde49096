use thiserror::Error;

/// Errors produced by the screenlink protocol and server layers.
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    #[error("Session not found")]
    SessionNotFound,

    #[error("Invalid password")]
    InvalidPassword,

    #[error("Session is full")]
    SessionFull,

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("credential backend error: {0}")]
    Credential(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl From<serde_json::Error> for LinkError {
    fn from(e: serde_json::Error) -> Self {
        LinkError::InvalidMessage(e.to_string())
    }
}

impl LinkError {
    /// The message sent to the offending connection in an `error` event.
    ///
    /// Kept deliberately generic for the join-path variants so a caller
    /// cannot probe session existence beyond what holding the ID already
    /// implies.
    pub fn client_message(&self) -> String {
        self.to_string()
    }
}

pub type LinkResult<T> = Result<T, LinkError>;

use std::time::Duration;

use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// Result alias for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors that can occur while connecting to or driving a GAMA server.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("failed to connect to {url}: {source}")]
    Connection {
        url: String,
        #[source]
        source: tungstenite::Error,
    },
    #[error("client is already connected")]
    AlreadyConnected,
    #[error("client is not connected")]
    NotConnected,
    #[error("failed to encode command: {0}")]
    Encoding(#[from] serde_json::Error),
    #[error("failed to send command: {0}")]
    Send(#[source] tungstenite::Error),
    #[error("malformed message from server: {0}")]
    MalformedMessage(String),
    #[error("connection to server closed: {0}")]
    TransportClosed(String),
    #[error("server did not complete the handshake within {0:?}")]
    HandshakeTimeout(Duration),
}

impl ClientError {
    pub(crate) fn closed(reason: impl Into<String>) -> Self {
        ClientError::TransportClosed(reason.into())
    }

    pub(crate) fn malformed(message: impl Into<String>) -> Self {
        ClientError::MalformedMessage(message.into())
    }
}

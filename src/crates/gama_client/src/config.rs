use std::time::Duration;

use crate::message::CONNECTION_SUCCESSFUL;

/// Connection-level configuration for a GAMA server client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Host name or IP address the server listens on.
    pub host: String,
    /// TCP port of the server's websocket endpoint.
    pub port: u16,
    /// Message tag the server uses to announce the assigned socket id.
    pub handshake_tag: String,
    /// Optional upper bound on how long `connect` waits for the handshake.
    pub handshake_timeout: Option<Duration>,
    /// How long `close` waits for the receive loop before aborting it.
    pub close_timeout: Duration,
}

impl ClientConfig {
    /// Create a config targeting `ws://{host}:{port}`.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            handshake_tag: CONNECTION_SUCCESSFUL.to_string(),
            handshake_timeout: None,
            close_timeout: Duration::from_secs(2),
        }
    }

    /// Override the tag that marks the connection-success message.
    pub fn with_handshake_tag(mut self, tag: impl Into<String>) -> Self {
        self.handshake_tag = tag.into();
        self
    }

    /// Bound the handshake wait. Without this `connect` waits indefinitely.
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = Some(timeout);
        self
    }

    /// Override how long a graceful close may take.
    pub fn with_close_timeout(mut self, timeout: Duration) -> Self {
        self.close_timeout = timeout;
        self
    }

    /// Websocket URL derived from host and port.
    pub fn url(&self) -> String {
        format!("ws://{}:{}", self.host, self.port)
    }
}

use std::future::Future;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::message::InboundMessage;

/// Receives every inbound message except the handshake.
///
/// Called from the client's receive loop, one message at a time and in
/// arrival order. A slow handler delays delivery of later messages.
#[async_trait]
pub trait MessageHandler: Send + Sync + 'static {
    async fn handle(&self, message: InboundMessage);
}

#[async_trait]
impl<F, Fut> MessageHandler for F
where
    F: Fn(InboundMessage) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    async fn handle(&self, message: InboundMessage) {
        (self)(message).await;
    }
}

/// Handler that forwards messages into an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelHandler {
    tx: mpsc::UnboundedSender<InboundMessage>,
}

impl ChannelHandler {
    /// Create the handler together with the receiving half.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<InboundMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl MessageHandler for ChannelHandler {
    async fn handle(&self, message: InboundMessage) {
        if self.tx.send(message).is_err() {
            tracing::debug!("message receiver dropped, discarding server message");
        }
    }
}

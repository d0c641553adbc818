#![allow(dead_code)]

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use gama_client::InboundMessage;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

pub const WAIT: Duration = Duration::from_secs(5);

enum Action {
    Send(Message),
    Close,
    Drop,
}

/// In-process stand-in for a GAMA server accepting a single client.
///
/// Frames queued before the client connects are sent right after the
/// websocket upgrade, in order.
pub struct FakeServer {
    port: u16,
    actions: mpsc::UnboundedSender<Action>,
    received: mpsc::UnboundedReceiver<Value>,
    task: JoinHandle<()>,
}

impl FakeServer {
    /// Server that announces nothing until told to.
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind fake server");
        let port = listener.local_addr().expect("local addr").port();
        let (actions, mut action_rx) = mpsc::unbounded_channel();
        let (received_tx, received) = mpsc::unbounded_channel();

        let task = tokio::spawn(async move {
            let Ok((tcp, _)) = listener.accept().await else {
                return;
            };
            let Ok(ws) = accept_async(tcp).await else {
                return;
            };
            let (mut ws_tx, mut ws_rx) = ws.split();

            loop {
                tokio::select! {
                    action = action_rx.recv() => match action {
                        Some(Action::Send(message)) => {
                            if ws_tx.send(message).await.is_err() {
                                break;
                            }
                        }
                        Some(Action::Close) => {
                            let _ = ws_tx.close().await;
                            break;
                        }
                        Some(Action::Drop) | None => break,
                    },
                    frame = ws_rx.next() => match frame {
                        Some(Ok(Message::Text(text))) => {
                            let value = serde_json::from_str(text.as_str())
                                .unwrap_or_else(|_| Value::String(text.to_string()));
                            let _ = received_tx.send(value);
                        }
                        Some(Ok(Message::Close(_))) => {
                            // Drive the close handshake so the reply reaches the client.
                            while let Some(Ok(_)) = ws_rx.next().await {}
                            break;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(_)) | None => break,
                    },
                }
            }
        });

        Self {
            port,
            actions,
            received,
            task,
        }
    }

    /// Server that sends the connection-success message on accept.
    pub async fn with_greeting(socket_id: &str) -> Self {
        let server = Self::start().await;
        server.push_json(greeting(socket_id));
        server
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn push_text(&self, text: &str) {
        let _ = self.actions.send(Action::Send(Message::text(text.to_string())));
    }

    pub fn push_json(&self, value: Value) {
        self.push_text(&value.to_string());
    }

    /// Send a close frame and stop serving.
    pub fn close(&self) {
        let _ = self.actions.send(Action::Close);
    }

    /// Drop the TCP connection without a close handshake.
    pub fn drop_connection(&self) {
        let _ = self.actions.send(Action::Drop);
    }

    /// Next frame sent by the client, parsed as JSON.
    pub async fn next_frame(&mut self) -> Value {
        tokio::time::timeout(WAIT, self.received.recv())
            .await
            .expect("client frame should arrive")
            .expect("fake server stopped before receiving a frame")
    }

    /// Frames received so far without waiting.
    pub fn drain_frames(&mut self) -> Vec<Value> {
        let mut frames = Vec::new();
        while let Ok(frame) = self.received.try_recv() {
            frames.push(frame);
        }
        frames
    }

    /// Wait until the server task has finished.
    pub async fn finished(self) {
        let _ = tokio::time::timeout(WAIT, self.task).await;
    }
}

pub fn greeting(socket_id: &str) -> Value {
    json!({"type": "ConnectionSuccessful", "content": socket_id})
}

pub async fn next_message(rx: &mut mpsc::UnboundedReceiver<InboundMessage>) -> InboundMessage {
    tokio::time::timeout(WAIT, rx.recv())
        .await
        .expect("handler should receive a message")
        .expect("handler channel closed")
}

/// Port with nothing listening on it.
pub async fn unused_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind probe listener");
    listener.local_addr().expect("local addr").port()
}

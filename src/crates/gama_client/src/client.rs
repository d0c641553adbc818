use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::stream::{SplitSink, SplitStream};
use futures::{FutureExt, SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::command::{Command, LoadOptions, ReloadOptions};
use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};
use crate::handler::MessageHandler;
use crate::message::InboundMessage;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Client for a single GAMA server session.
///
/// Commands are fire-and-forget: replies and simulation events arrive
/// through the [`MessageHandler`] given at construction.
pub struct Client {
    config: ClientConfig,
    handler: Arc<dyn MessageHandler>,
    socket_id: String,
    link: Option<Link>,
}

/// Live transport plus the receive loop reading from it.
struct Link {
    sink: Mutex<SplitSink<WsStream, Message>>,
    state: Arc<LinkState>,
    receiver: Option<JoinHandle<ClientResult<()>>>,
}

#[derive(Default)]
struct LinkState {
    terminated: AtomicBool,
    close_requested: AtomicBool,
}

/// Marks the link terminated however the receive loop exits, aborts included.
struct TerminateOnDrop(Arc<LinkState>);

impl Drop for TerminateOnDrop {
    fn drop(&mut self) {
        self.0.terminated.store(true, Ordering::SeqCst);
    }
}

/// Pending handshake resolved by the receive loop.
struct Handshake {
    tag: String,
    tx: oneshot::Sender<String>,
}

impl Client {
    /// Create a client for `ws://{host}:{port}`. No connection is made yet.
    pub fn new(host: impl Into<String>, port: u16, handler: impl MessageHandler) -> Self {
        Self::with_config(ClientConfig::new(host, port), handler)
    }

    /// Create a client from an explicit configuration.
    pub fn with_config(config: ClientConfig, handler: impl MessageHandler) -> Self {
        Self {
            config,
            handler: Arc::new(handler),
            socket_id: String::new(),
            link: None,
        }
    }

    /// Configuration this client was built with.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Socket id assigned by the server; empty until a handshake completes.
    pub fn socket_id(&self) -> &str {
        &self.socket_id
    }

    /// Whether a transport is attached and its receive loop is still running.
    pub fn is_connected(&self) -> bool {
        self.link.as_ref().is_some_and(Link::is_live)
    }

    /// Open the websocket and start listening.
    ///
    /// With `expect_handshake` the call suspends until the server announces
    /// the socket id and returns it. Otherwise it returns `None` as soon as
    /// the transport is open, and the announcement goes to the handler like
    /// any other message.
    pub async fn connect(&mut self, expect_handshake: bool) -> ClientResult<Option<String>> {
        if self.is_connected() {
            return Err(ClientError::AlreadyConnected);
        }

        let url = self.config.url();
        let (ws, _) = connect_async(url.as_str())
            .await
            .map_err(|source| ClientError::Connection {
                url: url.clone(),
                source,
            })?;
        tracing::info!(url = url.as_str(), "connected to gama server");

        let (sink, stream) = ws.split();
        let (handshake_tx, handshake_rx) = oneshot::channel();
        let handshake = expect_handshake.then(|| Handshake {
            tag: self.config.handshake_tag.clone(),
            tx: handshake_tx,
        });

        let state = Arc::new(LinkState::default());
        let receiver = tokio::spawn(receive_loop(
            stream,
            self.handler.clone(),
            handshake,
            state.clone(),
        ));

        self.socket_id.clear();
        self.link = Some(Link {
            sink: Mutex::new(sink),
            state,
            receiver: Some(receiver),
        });

        if !expect_handshake {
            return Ok(None);
        }

        let outcome = match self.config.handshake_timeout {
            Some(limit) => match tokio::time::timeout(limit, handshake_rx).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    tracing::warn!(timeout = ?limit, "handshake timed out");
                    self.link.take();
                    return Err(ClientError::HandshakeTimeout(limit));
                }
            },
            None => handshake_rx.await,
        };

        match outcome {
            Ok(socket_id) => {
                tracing::info!(socket_id = socket_id.as_str(), "handshake completed");
                self.socket_id.clone_from(&socket_id);
                Ok(Some(socket_id))
            }
            Err(_) => {
                let err = self.closed().await.err();
                Err(err.unwrap_or_else(|| ClientError::closed("connection closed before handshake")))
            }
        }
    }

    /// Encode and send one command. Returns once the frame is written.
    pub async fn send(&self, command: Command) -> ClientResult<()> {
        let link = self
            .link
            .as_ref()
            .filter(|link| link.is_live())
            .ok_or(ClientError::NotConnected)?;
        let text = command.encode(&self.socket_id)?;
        tracing::debug!(command = %command.kind(), "sending command");

        let mut sink = link.sink.lock().await;
        sink.send(Message::text(text))
            .await
            .map_err(ClientError::Send)
    }

    /// Load a model and create an experiment.
    ///
    /// To attach an extension map, use [`send`](Self::send) with
    /// [`Command::load`] and [`Command::with_extension`].
    pub async fn load(
        &self,
        model_path: &str,
        experiment: &str,
        options: &LoadOptions,
    ) -> ClientResult<()> {
        self.send(Command::load(model_path, experiment, options)?)
            .await
    }

    /// Run the experiment until paused or stopped.
    ///
    /// To attach an extension map, use [`send`](Self::send) with
    /// [`Command::play`] and [`Command::with_extension`].
    pub async fn play(&self, exp_id: &str, sync: bool) -> ClientResult<()> {
        self.send(Command::play(exp_id, sync)).await
    }

    /// Pause a running experiment.
    ///
    /// To attach an extension map, use [`send`](Self::send) with
    /// [`Command::pause`] and [`Command::with_extension`].
    pub async fn pause(&self, exp_id: &str) -> ClientResult<()> {
        self.send(Command::pause(exp_id)).await
    }

    /// Advance the experiment by `nb_step` cycles.
    ///
    /// To attach an extension map, use [`send`](Self::send) with
    /// [`Command::step`] and [`Command::with_extension`].
    pub async fn step(&self, exp_id: &str, nb_step: u32, sync: bool) -> ClientResult<()> {
        self.send(Command::step(exp_id, nb_step, sync)).await
    }

    /// Rewind the experiment by `nb_step` cycles.
    ///
    /// To attach an extension map, use [`send`](Self::send) with
    /// [`Command::step_back`] and [`Command::with_extension`].
    pub async fn step_back(&self, exp_id: &str, nb_step: u32, sync: bool) -> ClientResult<()> {
        self.send(Command::step_back(exp_id, nb_step, sync)).await
    }

    /// Stop and dispose of an experiment.
    ///
    /// To attach an extension map, use [`send`](Self::send) with
    /// [`Command::stop`] and [`Command::with_extension`].
    pub async fn stop(&self, exp_id: &str) -> ClientResult<()> {
        self.send(Command::stop(exp_id)).await
    }

    /// Restart an experiment, optionally with new parameters.
    ///
    /// To attach an extension map, use [`send`](Self::send) with
    /// [`Command::reload`] and [`Command::with_extension`].
    pub async fn reload(&self, exp_id: &str, options: &ReloadOptions) -> ClientResult<()> {
        self.send(Command::reload(exp_id, options)?).await
    }

    /// Evaluate a GAML expression in the context of an experiment.
    ///
    /// To attach an extension map, use [`send`](Self::send) with
    /// [`Command::expression`] and [`Command::with_extension`].
    pub async fn expression(&self, exp_id: &str, expression: &str) -> ClientResult<()> {
        self.send(Command::expression(exp_id, expression)).await
    }

    /// Ask the server process to exit.
    ///
    /// To attach an extension map, use [`send`](Self::send) with
    /// [`Command::exit`] and [`Command::with_extension`].
    pub async fn exit(&self) -> ClientResult<()> {
        self.send(Command::exit()).await
    }

    /// Wait for the receive loop to end.
    ///
    /// Resolves to `Ok(())` after a local [`close`](Self::close) and to
    /// [`ClientError::TransportClosed`] when the server side went away.
    pub async fn closed(&mut self) -> ClientResult<()> {
        let Some(receiver) = self.link.as_mut().and_then(|link| link.receiver.take()) else {
            return Err(ClientError::NotConnected);
        };
        join_receiver(receiver).await
    }

    /// Close the websocket and wait for the receive loop to finish.
    pub async fn close(&mut self) -> ClientResult<()> {
        let Some(mut link) = self.link.take() else {
            return Ok(());
        };
        if !link.is_live() {
            return Ok(());
        }
        link.state.close_requested.store(true, Ordering::SeqCst);
        let _ = link.sink.lock().await.send(Message::Close(None)).await;

        let Some(mut receiver) = link.receiver.take() else {
            return Ok(());
        };
        match tokio::time::timeout(self.config.close_timeout, &mut receiver).await {
            Ok(joined) => flatten_join(joined),
            Err(_) => {
                // Force the loop down if the server never acknowledged the close.
                receiver.abort();
                tracing::warn!("server did not acknowledge close; receive loop aborted");
                Ok(())
            }
        }
    }
}

impl Link {
    fn is_live(&self) -> bool {
        !self.state.terminated.load(Ordering::SeqCst)
    }
}

impl Drop for Link {
    fn drop(&mut self) {
        if let Some(receiver) = self.receiver.take() {
            receiver.abort();
        }
    }
}

async fn join_receiver(receiver: JoinHandle<ClientResult<()>>) -> ClientResult<()> {
    flatten_join(receiver.await)
}

fn flatten_join(
    joined: Result<ClientResult<()>, tokio::task::JoinError>,
) -> ClientResult<()> {
    joined.unwrap_or_else(|err| Err(ClientError::closed(format!("receive loop failed: {err}"))))
}

async fn receive_loop(
    mut stream: SplitStream<WsStream>,
    handler: Arc<dyn MessageHandler>,
    mut handshake: Option<Handshake>,
    state: Arc<LinkState>,
) -> ClientResult<()> {
    let _terminate = TerminateOnDrop(state.clone());
    let reason = loop {
        let message = match stream.next().await {
            Some(Ok(Message::Text(text))) => InboundMessage::parse(text.as_str()),
            Some(Ok(Message::Binary(bytes))) => InboundMessage::parse_bytes(&bytes),
            Some(Ok(Message::Close(frame))) => {
                break match frame {
                    Some(frame) => format!(
                        "closed by server ({}): {}",
                        u16::from(frame.code),
                        frame.reason.as_str()
                    ),
                    None => "closed by server".to_string(),
                };
            }
            Some(Ok(_)) => continue,
            Some(Err(err)) => break err.to_string(),
            None => break "stream ended".to_string(),
        };

        let message = match message {
            Ok(message) => message,
            Err(err) => {
                tracing::warn!(error = %err, "unable to decode server message");
                continue;
            }
        };

        if let Some(pending) = handshake.take() {
            match message.handshake_socket_id(&pending.tag) {
                Some(socket_id) => {
                    let _ = pending.tx.send(socket_id.to_string());
                    continue;
                }
                None => handshake = Some(pending),
            }
        }

        tracing::debug!(tag = message.tag().unwrap_or_default(), "dispatching server message");
        if let Err(panic) = AssertUnwindSafe(handler.handle(message)).catch_unwind().await {
            tracing::error!(panic = panic_message(&*panic), "message handler panicked");
        }
    };

    state.terminated.store(true, Ordering::SeqCst);
    if state.close_requested.load(Ordering::SeqCst) {
        tracing::info!("connection to gama server closed");
        return Ok(());
    }
    tracing::error!(reason = reason.as_str(), "lost connection to gama server");
    Err(ClientError::closed(reason))
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

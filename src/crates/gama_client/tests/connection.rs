#[path = "fake_server_support.rs"]
mod support;

use std::time::Duration;

use gama_client::{ChannelHandler, Client, ClientConfig, ClientError, MessageType};
use serde_json::json;

use support::{greeting, next_message, unused_port, FakeServer};

#[tokio::test]
async fn connect_returns_announced_socket_id() {
    let mut server = FakeServer::with_greeting("abc-123").await;
    let (handler, _messages) = ChannelHandler::new();
    let mut client = Client::new("127.0.0.1", server.port(), handler);

    let socket_id = client.connect(true).await.expect("connect should succeed");
    assert_eq!(socket_id.as_deref(), Some("abc-123"));
    assert_eq!(client.socket_id(), "abc-123");
    assert!(client.is_connected());

    client.play("exp1", false).await.expect("play should send");
    assert_eq!(
        server.next_frame().await,
        json!({"type": "play", "socket_id": "abc-123", "exp_id": "exp1", "sync": false})
    );
}

#[tokio::test]
async fn handshake_resolves_once_and_later_announcements_reach_handler() {
    let server = FakeServer::with_greeting("first").await;
    server.push_json(greeting("second"));
    server.push_json(json!({"type": "SimulationOutput", "content": "tick"}));

    let (handler, mut messages) = ChannelHandler::new();
    let mut client = Client::new("127.0.0.1", server.port(), handler);
    let socket_id = client.connect(true).await.expect("connect should succeed");
    assert_eq!(socket_id.as_deref(), Some("first"));

    let repeated = next_message(&mut messages).await;
    assert_eq!(repeated.message_type(), Some(MessageType::ConnectionSuccessful));
    assert_eq!(repeated.content(), Some(&json!("second")));

    let output = next_message(&mut messages).await;
    assert_eq!(output.message_type(), Some(MessageType::SimulationOutput));
    assert_eq!(client.socket_id(), "first");
}

#[tokio::test]
async fn messages_ahead_of_handshake_are_forwarded() {
    let server = FakeServer::start().await;
    server.push_json(json!({"type": "SimulationStatus", "content": "NONE"}));
    server.push_json(greeting("late"));

    let (handler, mut messages) = ChannelHandler::new();
    let mut client = Client::new("127.0.0.1", server.port(), handler);
    let socket_id = client.connect(true).await.expect("connect should succeed");
    assert_eq!(socket_id.as_deref(), Some("late"));

    let status = next_message(&mut messages).await;
    assert_eq!(status.tag(), Some("SimulationStatus"));
    assert!(messages.try_recv().is_err(), "handshake must not be forwarded");
}

#[tokio::test]
async fn connect_without_handshake_hands_announcement_to_handler() {
    let mut server = FakeServer::with_greeting("unused").await;
    let (handler, mut messages) = ChannelHandler::new();
    let mut client = Client::new("127.0.0.1", server.port(), handler);

    let socket_id = client.connect(false).await.expect("connect should succeed");
    assert!(socket_id.is_none());

    let announcement = next_message(&mut messages).await;
    assert_eq!(announcement.content(), Some(&json!("unused")));
    assert_eq!(client.socket_id(), "");

    client.pause("exp1").await.expect("pause should send");
    assert_eq!(
        server.next_frame().await,
        json!({"type": "pause", "socket_id": "", "exp_id": "exp1"})
    );
}

#[tokio::test]
async fn unreachable_server_reports_connection_error() {
    let port = unused_port().await;
    let (handler, _messages) = ChannelHandler::new();
    let mut client = Client::new("127.0.0.1", port, handler);

    let err = client.connect(true).await.expect_err("nothing is listening");
    match err {
        ClientError::Connection { url, .. } => assert_eq!(url, format!("ws://127.0.0.1:{port}")),
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(!client.is_connected());
}

#[tokio::test]
async fn handshake_timeout_tears_down_transport() {
    let server = FakeServer::start().await;
    let (handler, _messages) = ChannelHandler::new();
    let config = ClientConfig::new("127.0.0.1", server.port())
        .with_handshake_timeout(Duration::from_millis(100));
    let mut client = Client::with_config(config, handler);

    let err = client.connect(true).await.expect_err("no handshake is sent");
    assert!(matches!(err, ClientError::HandshakeTimeout(limit) if limit == Duration::from_millis(100)));
    assert!(!client.is_connected());
    assert!(matches!(
        client.play("exp1", false).await,
        Err(ClientError::NotConnected)
    ));
}

#[tokio::test]
async fn closure_before_handshake_fails_connect() {
    let server = FakeServer::start().await;
    server.close();
    let (handler, _messages) = ChannelHandler::new();
    let mut client = Client::new("127.0.0.1", server.port(), handler);

    let err = client.connect(true).await.expect_err("server closes first");
    assert!(matches!(err, ClientError::TransportClosed(_)), "got {err:?}");
    assert!(!client.is_connected());
}

#[tokio::test]
async fn second_connect_on_live_session_is_rejected() {
    let server = FakeServer::with_greeting("abc").await;
    let (handler, _messages) = ChannelHandler::new();
    let mut client = Client::new("127.0.0.1", server.port(), handler);
    client.connect(true).await.expect("connect should succeed");

    assert!(matches!(
        client.connect(true).await,
        Err(ClientError::AlreadyConnected)
    ));
    assert_eq!(client.socket_id(), "abc");
}

#[tokio::test]
async fn custom_handshake_tag_is_honoured() {
    let server = FakeServer::start().await;
    server.push_json(greeting("ignored"));
    server.push_json(json!({"type": "HELLO", "content": "custom-id"}));

    let (handler, mut messages) = ChannelHandler::new();
    let config = ClientConfig::new("127.0.0.1", server.port()).with_handshake_tag("HELLO");
    let mut client = Client::with_config(config, handler);

    let socket_id = client.connect(true).await.expect("connect should succeed");
    assert_eq!(socket_id.as_deref(), Some("custom-id"));
    let forwarded = next_message(&mut messages).await;
    assert_eq!(forwarded.message_type(), Some(MessageType::ConnectionSuccessful));
}

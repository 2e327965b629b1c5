//! WebSocket round trips through a real listen socket.

mod common;

use std::time::Duration;

use common::{loopback, next_event, next_event_of, start_server, wait_until};
use futures_util::{SinkExt, StreamExt};
use pylon_core::{BroadcastStatus, ConnectionId, EventKind, SendStatus};
use pylon_server::ServerConfig;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type Client = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

async fn connect(port: u16) -> Client {
    let (client, _) = connect_async(format!("ws://127.0.0.1:{port}/ws"))
        .await
        .expect("upgrade should succeed");
    client
}

async fn next_message(client: &mut Client) -> Message {
    tokio::time::timeout(Duration::from_secs(5), client.next())
        .await
        .expect("message should arrive")
        .expect("stream should be open")
        .expect("frame should be valid")
}

#[tokio::test]
async fn open_message_and_reply() {
    let (server, port) = start_server(loopback());
    let mut client = connect(port).await;

    let open = next_event(&server).await;
    assert_eq!(open.kind(), EventKind::Open);
    assert!(open.payload().is_empty());
    let id: ConnectionId = open.correlation_id().parse().unwrap();

    client.send(Message::text("ping")).await.unwrap();
    let message = next_event(&server).await;
    assert_eq!(message.kind(), EventKind::Message);
    assert_eq!(message.correlation_id(), id.to_string());
    assert_eq!(message.payload().as_ref(), b"ping");

    assert_eq!(server.send_text(&id, "pong"), SendStatus::Success);
    assert_eq!(next_message(&mut client).await, Message::text("pong"));

    assert_eq!(server.send_binary(&id, vec![1u8, 2, 3]), SendStatus::Success);
    assert_eq!(
        next_message(&mut client).await,
        Message::binary(vec![1u8, 2, 3])
    );
}

#[tokio::test]
async fn client_close_fades_until_purge() {
    let (server, port) = start_server(loopback());
    let mut client = connect(port).await;
    let id: ConnectionId = next_event_of(&server, EventKind::Open)
        .await
        .correlation_id()
        .parse()
        .unwrap();
    assert_eq!(server.num_connected_clients(), 1);

    client
        .close(Some(CloseFrame {
            code: CloseCode::Normal,
            reason: "bye".into(),
        }))
        .await
        .unwrap();

    let close = next_event_of(&server, EventKind::Close).await;
    assert_eq!(close.correlation_id(), id.to_string());
    assert_eq!(&close.payload()[..2], &1000u16.to_be_bytes());
    assert_eq!(&close.payload()[2..], b"bye");

    assert_eq!(server.num_connected_clients(), 0);
    assert_eq!(server.send_text(&id, "late"), SendStatus::NotFound);
    assert_eq!(server.purge_faded(), 1);
    assert_eq!(server.purge_faded(), 0);
}

#[tokio::test]
async fn broadcast_skips_faded_connections() {
    let (server, port) = start_server(loopback());
    let mut first = connect(port).await;
    let mut second = connect(port).await;
    let mut third = connect(port).await;
    for _ in 0..3 {
        next_event_of(&server, EventKind::Open).await;
    }

    third.close(None).await.unwrap();
    next_event_of(&server, EventKind::Close).await;

    assert_eq!(server.broadcast_text("hello all"), BroadcastStatus::Success);
    assert_eq!(next_message(&mut first).await, Message::text("hello all"));
    assert_eq!(next_message(&mut second).await, Message::text("hello all"));

    assert_eq!(
        server.broadcast_text(vec![0xC3u8, 0x28]),
        BroadcastStatus::Dropped
    );
}

#[tokio::test]
async fn server_disconnect_sends_normal_close() {
    let (server, port) = start_server(loopback());
    let mut client = connect(port).await;
    let id: ConnectionId = next_event_of(&server, EventKind::Open)
        .await
        .correlation_id()
        .parse()
        .unwrap();

    assert!(server.disconnect(&id));
    match next_message(&mut client).await {
        Message::Close(Some(frame)) => assert_eq!(frame.code, CloseCode::Normal),
        other => panic!("expected close frame, got {other:?}"),
    }

    let close = next_event_of(&server, EventKind::Close).await;
    assert_eq!(close.correlation_id(), id.to_string());
}

#[tokio::test]
async fn echo_mode_returns_every_message() {
    let config = ServerConfig::builder().host("127.0.0.1").echo(true).build();
    let (server, port) = start_server(config);
    let mut client = connect(port).await;
    next_event_of(&server, EventKind::Open).await;

    client.send(Message::text("again")).await.unwrap();
    assert_eq!(next_message(&mut client).await, Message::text("again"));
    assert_eq!(
        next_event_of(&server, EventKind::Message).await.payload().as_ref(),
        b"again"
    );
}

#[tokio::test]
async fn unrouted_upgrade_is_rejected() {
    let (server, port) = start_server(loopback());
    let result = connect_async(format!("ws://127.0.0.1:{port}/nowhere")).await;
    assert!(result.is_err());

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!server.has_events());
    wait_until(|| server.num_connected_clients() == 0).await;
}

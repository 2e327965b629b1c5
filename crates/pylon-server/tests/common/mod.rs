//! Helpers shared by the integration tests.

#![allow(dead_code)]

use std::time::{Duration, Instant};

use pylon_core::{EventEnvelope, EventKind};
use pylon_server::{Server, ServerConfig, Verb};

/// How long a test waits for the engine before failing.
pub const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

/// Starts a loopback server on an ephemeral port with the test routes.
pub fn start_server(config: ServerConfig) -> (Server, u16) {
    let server = Server::new(config).expect("server should start its engine");
    server.add_route(Verb::Ws, "/ws");
    server.add_route(Verb::Get, "/items/:id");
    server.add_route(Verb::Post, "/upload");
    server.add_route(Verb::Any, "/any/*");
    assert!(server.start_listening(0));

    let port = server.local_port().expect("listening server has a port");
    let listen = server.pop_event();
    assert_eq!(listen.kind(), EventKind::Listen);
    (server, port)
}

/// Loopback config with defaults otherwise.
pub fn loopback() -> ServerConfig {
    ServerConfig::builder().host("127.0.0.1").build()
}

/// Polls the queue until an envelope arrives.
pub async fn next_event(server: &Server) -> EventEnvelope {
    let deadline = Instant::now() + EVENT_TIMEOUT;
    loop {
        if server.has_events() {
            return server.pop_event();
        }
        assert!(Instant::now() < deadline, "timed out waiting for an event");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Polls the queue until an envelope of `kind` arrives, skipping others.
pub async fn next_event_of(server: &Server, kind: EventKind) -> EventEnvelope {
    loop {
        let event = next_event(server).await;
        if event.kind() == kind {
            return event;
        }
    }
}

/// Polls `condition` until it holds.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + EVENT_TIMEOUT;
    while !condition() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// An HTTP client that never goes through a proxy.
pub fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .build()
        .expect("client should build")
}

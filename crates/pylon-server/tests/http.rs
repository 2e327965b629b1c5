//! HTTP requests answered by the polling host.

mod common;

use std::time::Duration;

use common::{http_client, loopback, next_event, next_event_of, start_server};
use pylon_core::{EventKind, RequestId, RequestStatus, ResponseStatus};
use pylon_server::{RequestField, ServerConfig};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

#[tokio::test]
async fn get_request_answered_by_host() {
    let (server, port) = start_server(loopback());
    let pending = tokio::spawn(
        http_client()
            .get(format!("http://127.0.0.1:{port}/items/42?verbose=1"))
            .header("X-Test", "1")
            .send(),
    );

    let start = next_event(&server).await;
    assert_eq!(start.kind(), EventKind::HttpStart);
    assert!(start.payload().is_empty());
    let id: RequestId = start.correlation_id().parse().unwrap();
    assert!(server.has_request(&id));

    let mut buf = [0u8; 64];
    assert!(server.copy_request_field(&id, RequestField::Header("X-Test"), &mut buf));
    assert_eq!(&buf[..2], b"1\0");
    assert_eq!(server.request_field(&id, RequestField::Method).as_deref(), Some("GET"));
    assert_eq!(server.request_field(&id, RequestField::Url).as_deref(), Some("/items/42"));
    assert_eq!(server.request_field(&id, RequestField::Query).as_deref(), Some("verbose=1"));
    assert_eq!(
        server.request_field(&id, RequestField::Endpoint).as_deref(),
        Some("/items/:id")
    );
    let headers: serde_json::Value =
        serde_json::from_str(&server.request_field(&id, RequestField::AllHeaders).unwrap()).unwrap();
    assert_eq!(headers["x-test"], "1");

    let end = next_event(&server).await;
    assert_eq!(end.kind(), EventKind::HttpEnd);
    assert_eq!(end.correlation_id(), id.to_string());

    assert_eq!(server.write_response_status(&id, "201 Created"), RequestStatus::Ok);
    assert_eq!(server.write_response_header(&id, "X-Reply", "yes"), RequestStatus::Ok);
    assert_eq!(server.end_response(&id, "ok"), ResponseStatus::SentAndEnded);
    assert!(!server.has_request(&id));
    assert_eq!(server.end_response(&id, "again"), ResponseStatus::NoSuchRequest);

    let response = pending.await.unwrap().unwrap();
    assert_eq!(response.status(), 201);
    assert_eq!(response.headers()["x-reply"], "yes");
    assert_eq!(response.text().await.unwrap(), "ok");
}

#[tokio::test]
async fn header_truncated_but_present() {
    let (server, port) = start_server(loopback());
    let pending = tokio::spawn(
        http_client()
            .get(format!("http://127.0.0.1:{port}/items/1"))
            .header("X-Long", "abcdefghij")
            .send(),
    );

    let id: RequestId = next_event_of(&server, EventKind::HttpStart)
        .await
        .correlation_id()
        .parse()
        .unwrap();

    let mut small = [0xFFu8; 4];
    assert!(server.copy_request_field(&id, RequestField::Header("x-long"), &mut small));
    assert_eq!(&small, b"abc\0");

    assert!(!server.copy_request_field(&id, RequestField::Header("x-missing"), &mut small));
    assert_eq!(small[0], 0);

    let mut tiny = [0u8; 3];
    assert!(!server.copy_request_field(&id, RequestField::Url, &mut tiny));
    assert_eq!(&tiny, b"/i\0");

    server.end_response(&id, "");
    assert_eq!(pending.await.unwrap().unwrap().status(), 200);
}

#[tokio::test]
async fn post_body_arrives_in_chunks() {
    let (server, port) = start_server(loopback());
    let pending = tokio::spawn(
        http_client()
            .post(format!("http://127.0.0.1:{port}/upload"))
            .body("hello body")
            .send(),
    );

    let id = next_event_of(&server, EventKind::HttpStart)
        .await
        .correlation_id()
        .to_string();

    let mut body = Vec::new();
    loop {
        let event = next_event(&server).await;
        assert_eq!(event.correlation_id(), id);
        match event.kind() {
            EventKind::HttpData => body.extend_from_slice(event.payload()),
            EventKind::HttpEnd => break,
            other => panic!("unexpected event {other}"),
        }
    }
    assert_eq!(body, b"hello body");

    let id: RequestId = id.parse().unwrap();
    assert_eq!(server.write_response(&id, "part one, "), ResponseStatus::SentNotEnded);
    assert_eq!(server.write_response(&id, "part two"), ResponseStatus::SentNotEnded);
    assert_eq!(server.end_response(&id, ""), ResponseStatus::SentAndEnded);

    let response = pending.await.unwrap().unwrap();
    assert_eq!(response.text().await.unwrap(), "part one, part two");
}

#[tokio::test]
async fn try_end_completes_at_total_size() {
    let (server, port) = start_server(loopback());
    let pending = tokio::spawn(
        http_client()
            .get(format!("http://127.0.0.1:{port}/any/stream"))
            .send(),
    );
    let id: RequestId = next_event_of(&server, EventKind::HttpStart)
        .await
        .correlation_id()
        .parse()
        .unwrap();

    assert_eq!(server.write_response_header(&id, "Content-Length", "10"), RequestStatus::Ok);
    assert_eq!(server.try_end_response(&id, "01234", 10), ResponseStatus::SentNotEnded);
    assert_eq!(server.try_end_response(&id, "56789", 10), ResponseStatus::SentAndEnded);
    assert!(!server.has_request(&id));

    let response = pending.await.unwrap().unwrap();
    assert_eq!(response.text().await.unwrap(), "0123456789");
}

#[tokio::test]
async fn unrouted_request_gets_404() {
    let (server, port) = start_server(loopback());
    let response = http_client()
        .get(format!("http://127.0.0.1:{port}/missing"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);

    // POST /items/:id is only registered for GET
    let response = http_client()
        .post(format!("http://127.0.0.1:{port}/items/1"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
    assert!(!server.has_events());
}

#[tokio::test]
async fn client_abort_emits_http_abort() {
    let (server, port) = start_server(loopback());
    let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    stream
        .write_all(b"GET /items/9 HTTP/1.1\r\nHost: localhost\r\n\r\n")
        .await
        .unwrap();

    let id: RequestId = next_event_of(&server, EventKind::HttpStart)
        .await
        .correlation_id()
        .parse()
        .unwrap();
    drop(stream);

    let abort = next_event_of(&server, EventKind::HttpAbort).await;
    assert_eq!(abort.correlation_id(), id.to_string());
    assert!(abort.payload().is_empty());
    assert!(!server.has_request(&id));
    assert_eq!(server.end_response(&id, "too late"), ResponseStatus::NoSuchRequest);
}

#[tokio::test]
async fn oversized_body_chunks_are_truncated() {
    let config = ServerConfig::builder()
        .host("127.0.0.1")
        .max_payload_size(4)
        .build();
    let (server, port) = start_server(config);
    let pending = tokio::spawn(
        http_client()
            .post(format!("http://127.0.0.1:{port}/upload"))
            .body("0123456789")
            .send(),
    );

    let id: RequestId = next_event_of(&server, EventKind::HttpStart)
        .await
        .correlation_id()
        .parse()
        .unwrap();
    let data = next_event_of(&server, EventKind::HttpData).await;
    assert!(data.payload().len() <= 4);

    server.end_response(&id, "");
    tokio::time::timeout(Duration::from_secs(5), pending)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
}

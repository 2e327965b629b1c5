//! Per-connection session task.
//!
//! A [`Session`] owns one upgraded socket for its whole life. It is the only
//! place where OPEN, MESSAGE and CLOSE envelopes are produced, and the only
//! place that fades registry entries.

use std::sync::Arc;
use std::time::Duration;

use bytes::{BufMut, Bytes, BytesMut};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use pylon_core::{ConnectionId, DeferredQueue, EventKind};
use pylon_telemetry::metrics;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::Instant;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, info};
use tungstenite::Message;

use crate::error::CloseCode;
use crate::handle::{ConnectionHandle, OutboundReceiver};
use crate::outbound::Outbound;
use crate::registry::ConnectionRegistry;

/// How long to wait for the peer to answer a close frame we sent.
const CLOSE_GRACE: Duration = Duration::from_secs(2);

/// Timing and echo settings for a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Close after this long without traffic. `None` disables.
    pub idle_timeout: Option<Duration>,
    /// Ping after half the idle timeout without traffic.
    pub send_pings: bool,
    /// Close once the connection has been open this long. `None` disables.
    pub max_lifetime: Option<Duration>,
    /// Whether outbound frames count as traffic for the idle timeout.
    pub reset_idle_on_send: bool,
    /// Re-send every inbound data message to its sender.
    pub echo: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Some(Duration::from_secs(120)),
            send_pings: true,
            max_lifetime: None,
            reset_idle_on_send: true,
            echo: false,
        }
    }
}

/// Encodes a CLOSE envelope payload: big-endian code then UTF-8 reason.
///
/// `None` yields an empty payload.
pub fn close_payload(close: Option<(u16, &str)>) -> Bytes {
    match close {
        Some((code, reason)) => {
            let mut payload = BytesMut::with_capacity(2 + reason.len());
            payload.put_u16(code);
            payload.put_slice(reason.as_bytes());
            payload.freeze()
        }
        None => Bytes::new(),
    }
}

/// One WebSocket connection's task.
#[derive(Debug)]
pub struct Session {
    id: ConnectionId,
    correlation_id: String,
    config: SessionConfig,
    queue: Arc<DeferredQueue>,
    registry: Arc<ConnectionRegistry>,
}

/// How the connection ended, as reported in the CLOSE envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Closure {
    /// A close frame with this code and reason.
    Frame(u16, String),
    /// A close frame without a code.
    NoCode,
}

type Sink<S> = SplitSink<WebSocketStream<S>, Message>;

impl Session {
    /// Creates a session for connection `id`.
    pub fn new(
        id: ConnectionId,
        config: SessionConfig,
        queue: Arc<DeferredQueue>,
        registry: Arc<ConnectionRegistry>,
    ) -> Self {
        Self {
            id,
            correlation_id: id.to_string(),
            config,
            queue,
            registry,
        }
    }

    /// Registers the connection, then pumps frames until the socket closes.
    ///
    /// Returns at once, dropping the socket, if the registry refuses the
    /// connection.
    pub async fn run<S>(
        self,
        socket: WebSocketStream<S>,
        handle: ConnectionHandle,
        mut outbound: OutboundReceiver,
    ) where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let registered = self
            .registry
            .register_then(self.id, handle, || self.emit(EventKind::Open, Bytes::new()));
        if !registered {
            debug!(connection_id = %self.id, "Connection refused by registry");
            return;
        }
        metrics::connection_opened();
        info!(connection_id = %self.id, "Connection opened");

        let (mut sink, mut stream) = socket.split();
        let opened_at = Instant::now();
        let mut last_activity = opened_at;
        let mut ping_sent = false;
        let mut closing: Option<Instant> = None;
        let mut closure: Option<Closure> = None;
        let mut outbound_open = true;

        loop {
            let deadline = self.next_deadline(opened_at, last_activity, ping_sent, closing);

            tokio::select! {
                inbound = stream.next() => match inbound {
                    Some(Ok(message)) => {
                        last_activity = Instant::now();
                        ping_sent = false;
                        match message {
                            Message::Text(_) | Message::Binary(_) => {
                                if self.config.echo {
                                    if let Err(e) = sink.send(message.clone()).await {
                                        debug!(connection_id = %self.id, error = %e, "Echo failed");
                                        break;
                                    }
                                }
                                self.emit(EventKind::Message, data_of(message));
                            }
                            Message::Close(frame) => {
                                debug!(connection_id = %self.id, "Received close frame");
                                closure.get_or_insert(match frame {
                                    Some(frame) => Closure::Frame(frame.code.into(), frame.reason.as_str().to_owned()),
                                    None => Closure::NoCode,
                                });
                            }
                            Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
                        }
                    }
                    Some(Err(e)) => {
                        debug!(connection_id = %self.id, error = %e, "Connection read ended");
                        break;
                    }
                    None => break,
                },

                frame = outbound.recv(), if outbound_open && closing.is_none() => match frame {
                    Some(Outbound::Close { code, reason }) => {
                        closing = Some(Instant::now());
                        if !self.start_close(&mut sink, code, &reason, &mut closure).await {
                            break;
                        }
                    }
                    Some(frame) => {
                        let size = frame.len();
                        let result = sink.send(frame.into_message()).await;
                        outbound.flushed(size);
                        if let Err(e) = result {
                            debug!(connection_id = %self.id, error = %e, "Send failed");
                            break;
                        }
                        if self.config.reset_idle_on_send {
                            last_activity = Instant::now();
                        }
                    }
                    None => {
                        outbound_open = false;
                        closing = Some(Instant::now());
                        if !self.start_close(&mut sink, CloseCode::GoingAway, "server shutting down", &mut closure).await {
                            break;
                        }
                    }
                },

                () = sleep_until(deadline) => {
                    let now = Instant::now();
                    if closing.is_some() {
                        debug!(connection_id = %self.id, "Peer did not answer close frame");
                        break;
                    }
                    let expired = |limit: Option<Duration>, since: Instant| {
                        limit.is_some_and(|limit| now >= since + limit)
                    };
                    if expired(self.config.max_lifetime, opened_at) {
                        closing = Some(now);
                        if !self.start_close(&mut sink, CloseCode::GoingAway, "max lifetime reached", &mut closure).await {
                            break;
                        }
                    } else if expired(self.config.idle_timeout, last_activity) {
                        closing = Some(now);
                        if !self.start_close(&mut sink, CloseCode::GoingAway, "idle timeout", &mut closure).await {
                            break;
                        }
                    } else if !ping_sent {
                        ping_sent = true;
                        if sink.send(Message::Ping(Bytes::new())).await.is_err() {
                            break;
                        }
                    }
                }
            }
        }

        metrics::connection_closed();
        let payload = match &closure {
            Some(Closure::Frame(code, reason)) => close_payload(Some((*code, reason))),
            Some(Closure::NoCode) => close_payload(None),
            None => close_payload(Some((CloseCode::Abnormal.as_u16(), ""))),
        };
        if self.registry.fade(&self.id) {
            self.emit(EventKind::Close, payload);
        }
        info!(connection_id = %self.id, closure = ?closure, "Connection closed");
    }

    /// Sends a close frame and records it as the reported closure.
    async fn start_close<S>(
        &self,
        sink: &mut Sink<S>,
        code: CloseCode,
        reason: &str,
        closure: &mut Option<Closure>,
    ) -> bool
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        debug!(connection_id = %self.id, code = code.as_u16(), reason = %reason, "Starting close handshake");
        closure.get_or_insert_with(|| Closure::Frame(code.as_u16(), reason.to_string()));
        sink.send(Outbound::close(code, reason).into_message())
            .await
            .is_ok()
    }

    fn next_deadline(
        &self,
        opened_at: Instant,
        last_activity: Instant,
        ping_sent: bool,
        closing: Option<Instant>,
    ) -> Option<Instant> {
        if let Some(started) = closing {
            return Some(started + CLOSE_GRACE);
        }

        let lifetime = self.config.max_lifetime.map(|limit| opened_at + limit);
        let idle = self.config.idle_timeout.map(|limit| last_activity + limit);
        let ping = self
            .config
            .idle_timeout
            .filter(|_| self.config.send_pings && !ping_sent)
            .map(|limit| last_activity + limit / 2);

        [lifetime, idle, ping].into_iter().flatten().min()
    }

    fn emit(&self, kind: EventKind, payload: Bytes) {
        let truncated = self.queue.emit(kind, self.correlation_id.as_str(), payload);
        metrics::record_event_queued(kind.as_str(), truncated);
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

fn data_of(message: Message) -> Bytes {
    match message {
        Message::Text(text) => Bytes::copy_from_slice(text.as_bytes()),
        Message::Binary(data) => data,
        _ => Bytes::new(),
    }
}

//! The host-facing server.
//!
//! [`Server`] is what the scripting host holds. Every method is synchronous,
//! never blocks on the engine (apart from the bounded wait in
//! [`Server::stop_listening`]) and never panics or returns an error for stale
//! ids; outcomes are reported as booleans or status values.
//!
//! # Example
//!
//! ```rust,no_run
//! use pylon_core::EventKind;
//! use pylon_server::{Server, ServerConfig, Verb};
//!
//! let server = Server::new(ServerConfig::default())?;
//! server.add_route(Verb::Ws, "/chat");
//! server.add_route(Verb::Get, "/health");
//! server.start_listening(8080);
//!
//! // host tick
//! for event in server.drain_events(64) {
//!     match event.kind() {
//!         EventKind::Message => {
//!             let id = event.correlation_id().parse()?;
//!             server.send_text(&id, event.payload().to_vec());
//!         }
//!         EventKind::HttpStart => {
//!             let id = event.correlation_id().parse()?;
//!             server.end_response(&id, "ok");
//!         }
//!         _ => {}
//!     }
//! }
//! server.purge_faded();
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::fmt;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;

use bytes::Bytes;
use http::StatusCode;
use parking_lot::Mutex;
use pylon_core::buffer::BufferCopy;
use pylon_core::{
    BroadcastStatus, ConnectionId, EventEnvelope, EventKind, RequestId, RequestStatus,
    ResponseStatus, SendStatus,
};
use pylon_telemetry::metrics;
use pylon_ws::{CloseCode, Outbound};
use tokio::net::TcpListener;
use tokio::runtime::Runtime;
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::engine::Engine;
use crate::error::{ServerError, ServerResult};
use crate::request::RequestField;
use crate::route::Verb;
use crate::runtime::{build_runtime, RuntimeConfig};
use crate::shutdown::ShutdownSignal;

/// Listen socket state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServerState {
    /// Not listening.
    Idle,
    /// Accepting connections.
    Listening,
    /// Stop in progress.
    ShuttingDown,
}

impl ServerState {
    /// Returns the lower-case name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Listening => "listening",
            Self::ShuttingDown => "shutting_down",
        }
    }
}

impl fmt::Display for ServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

struct Listening {
    port: u16,
    shutdown: ShutdownSignal,
    closed: mpsc::Receiver<()>,
}

/// One HTTP/WebSocket endpoint bridged to a polling host.
pub struct Server {
    engine: Arc<Engine>,
    runtime: Option<Runtime>,
    state: Mutex<ServerState>,
    listening: Mutex<Option<Listening>>,
}

impl fmt::Debug for Server {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Server")
            .field("state", &self.state())
            .field("port", &self.local_port())
            .field("pending_events", &self.num_events())
            .finish_non_exhaustive()
    }
}

impl Server {
    /// Creates an idle server and starts its engine thread.
    pub fn new(config: ServerConfig) -> ServerResult<Self> {
        let runtime = build_runtime(&RuntimeConfig::default()).map_err(ServerError::Runtime)?;
        metrics::describe_metrics();
        info!(
            host = config.host(),
            compression = %config.compression(),
            max_payload_size = config.max_payload_size(),
            max_backpressure = config.max_backpressure(),
            idle_timeout_secs = config.idle_timeout_secs(),
            "Server created"
        );
        Ok(Self {
            engine: Arc::new(Engine::new(config)),
            runtime: Some(runtime),
            state: Mutex::new(ServerState::Idle),
            listening: Mutex::new(None),
        })
    }

    /// The configuration.
    pub fn config(&self) -> &ServerConfig {
        self.engine.config()
    }

    /// Current listen state.
    pub fn state(&self) -> ServerState {
        *self.state.lock()
    }

    /// The bound port while listening.
    pub fn local_port(&self) -> Option<u16> {
        self.listening.lock().as_ref().map(|l| l.port)
    }

    /// Registers a route. Duplicates are allowed; the first one wins.
    pub fn add_route(&self, verb: Verb, pattern: &str) {
        self.engine.add_route(verb, pattern);
    }

    /// Binds `port` (0 picks a free one) and starts accepting.
    ///
    /// On success a LISTEN envelope carrying the bound port is queued. A
    /// failed bind is logged, queues an ERROR envelope and leaves the server
    /// idle. Calling this while not idle is a logged no-op.
    pub fn start_listening(&self, port: u16) -> bool {
        let mut state = self.state.lock();
        if *state != ServerState::Idle {
            warn!(state = %*state, port, "start_listening ignored, server is not idle");
            return false;
        }

        let (listener, bound) = match self.bind(port) {
            Ok(bound) => bound,
            Err(e) => {
                error!(port, error = %e, "Failed to start listening");
                self.engine
                    .emit_server(EventKind::Error, Bytes::from(e.to_string()));
                return false;
            }
        };

        self.engine.reopen();
        let shutdown = ShutdownSignal::new();
        let (closed_tx, closed_rx) = mpsc::channel();
        if let Some(runtime) = &self.runtime {
            runtime.spawn(Arc::clone(&self.engine).accept_loop(
                listener,
                shutdown.clone(),
                closed_tx,
            ));
        }

        *self.listening.lock() = Some(Listening {
            port: bound,
            shutdown,
            closed: closed_rx,
        });
        *state = ServerState::Listening;

        info!(port = bound, "Listening");
        self.engine
            .emit_server(EventKind::Listen, Bytes::from(bound.to_string()));
        true
    }

    fn bind(&self, port: u16) -> ServerResult<(TcpListener, u16)> {
        let host = self.engine.config().host();
        let addr = format!("{host}:{port}");
        let runtime = self
            .runtime
            .as_ref()
            .ok_or_else(|| ServerError::invalid_state("engine runtime has stopped"))?;

        let std_listener =
            std::net::TcpListener::bind((host, port)).map_err(|e| ServerError::bind(&addr, e))?;
        std_listener
            .set_nonblocking(true)
            .map_err(|e| ServerError::bind(&addr, e))?;
        let bound = std_listener
            .local_addr()
            .map_err(|e| ServerError::bind(&addr, e))?
            .port();

        let _guard = runtime.enter();
        let listener = TcpListener::from_std(std_listener).map_err(|e| ServerError::bind(&addr, e))?;
        Ok((listener, bound))
    }

    /// Disconnects every client, answers pending requests with 503, closes
    /// the listen socket and queues SHUTDOWN.
    ///
    /// Each client is faded right away with a CLOSE envelope carrying 1001,
    /// queued ahead of SHUTDOWN. Upgrades that finish afterwards are refused.
    ///
    /// Calling this while not listening is a logged no-op.
    pub fn stop_listening(&self) -> bool {
        let mut state = self.state.lock();
        if *state != ServerState::Listening {
            warn!(state = %*state, "stop_listening ignored, server is not listening");
            return false;
        }
        let Some(listening) = self.listening.lock().take() else {
            warn!("stop_listening ignored, no listen socket");
            *state = ServerState::Idle;
            return false;
        };
        *state = ServerState::ShuttingDown;

        let disconnected = self
            .engine
            .close_connections(CloseCode::GoingAway, "server shutting down");
        let aborted = self
            .engine
            .requests()
            .abort_all(StatusCode::SERVICE_UNAVAILABLE);

        listening.shutdown.trigger();
        let timeout = self.engine.config().shutdown_timeout();
        if let Err(RecvTimeoutError::Timeout) = listening.closed.recv_timeout(timeout) {
            warn!(port = listening.port, ?timeout, "Listen socket did not close in time");
        }

        info!(
            port = listening.port,
            disconnected, aborted, "Stopped listening"
        );
        self.engine.emit_server(EventKind::Shutdown, Bytes::new());
        *state = ServerState::Idle;
        true
    }

    /// Sends a text frame. Bytes that are not UTF-8 are dropped.
    pub fn send_text(&self, id: &ConnectionId, data: impl Into<Vec<u8>>) -> SendStatus {
        match Outbound::text(data) {
            Ok(outbound) => self.engine.connections().send(id, outbound),
            Err(e) => {
                debug!(connection_id = %id, error = %e, "Dropping text send");
                metrics::record_message_sent(SendStatus::Dropped.as_str());
                SendStatus::Dropped
            }
        }
    }

    /// Sends a binary frame.
    pub fn send_binary(&self, id: &ConnectionId, data: impl Into<Bytes>) -> SendStatus {
        self.engine.connections().send(id, Outbound::binary(data))
    }

    /// Sends a text frame marked for compression.
    ///
    /// Goes out as a plain text frame.
    pub fn send_compressed_text(&self, id: &ConnectionId, data: impl Into<Vec<u8>>) -> SendStatus {
        self.send_text(id, data)
    }

    /// Sends a text frame to every live connection.
    pub fn broadcast_text(&self, data: impl Into<Vec<u8>>) -> BroadcastStatus {
        match Outbound::text(data) {
            Ok(outbound) => self.engine.connections().broadcast(&outbound),
            Err(e) => {
                debug!(error = %e, "Dropping text broadcast");
                BroadcastStatus::Dropped
            }
        }
    }

    /// Sends a binary frame to every live connection.
    pub fn broadcast_binary(&self, data: impl Into<Bytes>) -> BroadcastStatus {
        self.engine
            .connections()
            .broadcast(&Outbound::binary(data))
    }

    /// Broadcasts a text frame marked for compression.
    pub fn broadcast_compressed_text(&self, data: impl Into<Vec<u8>>) -> BroadcastStatus {
        self.broadcast_text(data)
    }

    /// Closes one connection with code 1000.
    pub fn disconnect(&self, id: &ConnectionId) -> bool {
        self.engine
            .connections()
            .disconnect(id, CloseCode::Normal, "")
    }

    /// Number of live connections.
    pub fn num_connected_clients(&self) -> usize {
        self.engine.connections().live_count()
    }

    /// Reaps faded connections. Call from the host tick only.
    pub fn purge_faded(&self) -> usize {
        self.engine.connections().purge()
    }

    /// Returns `true` while the request is in flight.
    pub fn has_request(&self, id: &RequestId) -> bool {
        self.engine.requests().has(id)
    }

    /// Queues a response body chunk.
    pub fn write_response(&self, id: &RequestId, data: impl Into<Bytes>) -> ResponseStatus {
        self.engine.requests().write(id, data.into())
    }

    /// Queues a final chunk and ends the response.
    pub fn end_response(&self, id: &RequestId, data: impl Into<Bytes>) -> ResponseStatus {
        self.engine.requests().end(id, data.into())
    }

    /// Backpressure-aware write that ends once `total_size` bytes went out.
    pub fn try_end_response(
        &self,
        id: &RequestId,
        data: impl Into<Bytes>,
        total_size: usize,
    ) -> ResponseStatus {
        self.engine.requests().try_end(id, data.into(), total_size)
    }

    /// Sets the response status line, e.g. `"404 Not Found"`.
    pub fn write_response_status(&self, id: &RequestId, status: &str) -> RequestStatus {
        self.engine.requests().status(id, status)
    }

    /// Adds a response header.
    pub fn write_response_header(&self, id: &RequestId, name: &str, value: &str) -> RequestStatus {
        self.engine.requests().header(id, name, value)
    }

    /// Reads one request field as an owned string.
    ///
    /// Header bytes that are not UTF-8 are replaced with U+FFFD; use
    /// [`copy_request_field`](Self::copy_request_field) for the raw value.
    pub fn request_field(&self, id: &RequestId, field: RequestField<'_>) -> Option<String> {
        self.engine.requests().with_record(id, |record| match field {
            RequestField::Method => Some(record.method().to_string()),
            RequestField::Url => Some(record.url().to_string()),
            RequestField::Query => Some(record.query().to_string()),
            RequestField::Endpoint => Some(record.route().to_string()),
            RequestField::Header(name) => record
                .header(name)
                .map(|value| String::from_utf8_lossy(value).into_owned()),
            RequestField::AllHeaders => Some(record.headers_json()),
        })?
    }

    /// Copies one request field into `buf` with a trailing NUL.
    ///
    /// Returns `false` for an unknown request or header, and on truncation,
    /// except that a header that exists is reported `true` even when cut.
    /// On failure with no data `buf` holds an empty string.
    pub fn copy_request_field(&self, id: &RequestId, field: RequestField<'_>, buf: &mut [u8]) -> bool {
        match self.engine.requests().copy_field(id, field, buf) {
            Some(BufferCopy { truncated, .. }) => {
                !truncated || matches!(field, RequestField::Header(_))
            }
            None => {
                if let Some(first) = buf.first_mut() {
                    *first = 0;
                }
                false
            }
        }
    }

    /// Returns `true` if an envelope is waiting.
    pub fn has_events(&self) -> bool {
        self.engine.queue().has_events()
    }

    /// Number of waiting envelopes.
    pub fn num_events(&self) -> usize {
        self.engine.queue().len()
    }

    /// Pops the oldest envelope, or the empty sentinel.
    pub fn pop_event(&self) -> EventEnvelope {
        self.engine.queue().pop()
    }

    /// Pops up to `max` envelopes in order.
    pub fn drain_events(&self, max: usize) -> Vec<EventEnvelope> {
        self.engine.queue().drain(max)
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        if self.state() == ServerState::Listening {
            self.stop_listening();
        }
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

//! The socket engine.
//!
//! Everything here runs on the engine runtime. The accept loop hands each TCP
//! connection to hyper; routed requests become registry entries plus
//! HTTP_* envelopes, and upgrade requests become WebSocket sessions. Engine
//! code never returns an error to the host: failures are logged and turned
//! into envelopes or plain HTTP answers.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http::{header, Request, Response, StatusCode};
use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use parking_lot::RwLock;
use pylon_core::{ConnectionId, DeferredQueue, EventKind, RequestId};
use pylon_telemetry::metrics;
use pylon_ws::{
    close_payload, complete_upgrade, is_websocket_request, upgrade_response,
    validate_upgrade_request, CloseCode, ConnectionHandle, ConnectionRegistry, Session,
};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::request::{RequestRecord, RequestRegistry};
use crate::response::{AbortGuard, ResponseBody, ResponseChannels, ResponseHandle};
use crate::route::{RouteMatch, RouteTable, Verb};
use crate::shutdown::{ConnectionTracker, ShutdownSignal};

/// Pushes an envelope and records it.
pub(crate) fn queue_event(
    queue: &DeferredQueue,
    kind: EventKind,
    correlation_id: impl Into<String>,
    payload: Bytes,
) {
    let truncated = queue.emit(kind, correlation_id, payload);
    metrics::record_event_queued(kind.as_str(), truncated);
}

/// State shared by the host-facing [`Server`](crate::Server) and the engine
/// tasks.
#[derive(Debug)]
pub struct Engine {
    config: ServerConfig,
    queue: Arc<DeferredQueue>,
    connections: Arc<ConnectionRegistry>,
    requests: Arc<RequestRegistry>,
    routes: RwLock<RouteTable>,
}

impl Engine {
    /// Creates the engine state for `config`.
    pub fn new(config: ServerConfig) -> Self {
        Self {
            queue: Arc::new(DeferredQueue::new(config.max_payload_size())),
            connections: Arc::new(ConnectionRegistry::new(config.backpressure_policy())),
            requests: Arc::new(RequestRegistry::new(config.max_backpressure())),
            routes: RwLock::new(RouteTable::new()),
            config,
        }
    }

    /// The configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// The deferred event queue.
    pub fn queue(&self) -> &Arc<DeferredQueue> {
        &self.queue
    }

    /// The WebSocket connection registry.
    pub fn connections(&self) -> &Arc<ConnectionRegistry> {
        &self.connections
    }

    /// The HTTP request registry.
    pub fn requests(&self) -> &Arc<RequestRegistry> {
        &self.requests
    }

    /// Appends a route registration.
    pub fn add_route(&self, verb: Verb, pattern: &str) {
        self.routes.write().add(verb, pattern);
        debug!(verb = %verb, route = pattern, "Route registered");
    }

    /// Closes and fades every live connection, queuing a CLOSE envelope for
    /// each, and refuses new ones until [`Engine::reopen`].
    pub fn close_connections(&self, code: CloseCode, reason: &str) -> usize {
        let faded = self.connections.shut_down(code, reason);
        let payload = close_payload(Some((code.as_u16(), reason)));
        for id in &faded {
            queue_event(&self.queue, EventKind::Close, id.to_string(), payload.clone());
        }
        faded.len()
    }

    /// Accepts WebSocket connections again.
    pub fn reopen(&self) {
        self.connections.reopen();
    }

    /// Queues a server-scoped envelope.
    pub fn emit_server(&self, kind: EventKind, payload: Bytes) {
        queue_event(&self.queue, kind, pylon_core::SERVER_CORRELATION_ID, payload);
    }

    /// Accepts connections until `shutdown` fires.
    ///
    /// `closed` is dropped as soon as the listen socket is closed; in-flight
    /// connections then get up to the configured shutdown timeout to finish.
    pub async fn accept_loop(
        self: Arc<Self>,
        listener: TcpListener,
        shutdown: ShutdownSignal,
        closed: std::sync::mpsc::Sender<()>,
    ) {
        let tracker = ConnectionTracker::new();

        loop {
            tokio::select! {
                result = listener.accept() => match result {
                    Ok((stream, remote_addr)) => {
                        let engine = Arc::clone(&self);
                        let token = tracker.acquire();
                        let shutdown = shutdown.clone();
                        tokio::spawn(async move {
                            engine.serve_connection(stream, remote_addr, shutdown).await;
                            drop(token);
                        });
                    }
                    Err(e) => warn!(error = %e, "Failed to accept connection"),
                },
                () = shutdown.recv() => {
                    info!("Stop requested, closing listen socket");
                    break;
                }
            }
        }

        drop(listener);
        drop(closed);

        let active = tracker.active_connections();
        if active > 0 {
            debug!(active, "Waiting for connections to finish");
            let timeout = self.config.shutdown_timeout();
            if tokio::time::timeout(timeout, tracker.wait_idle()).await.is_err() {
                warn!(
                    active = tracker.active_connections(),
                    "Shutdown timeout reached with connections still open"
                );
            }
        }
    }

    async fn serve_connection(
        self: Arc<Self>,
        stream: TcpStream,
        remote_addr: SocketAddr,
        shutdown: ShutdownSignal,
    ) {
        let io = TokioIo::new(stream);
        let engine = Arc::clone(&self);
        let service = service_fn(move |req: Request<Incoming>| {
            let engine = Arc::clone(&engine);
            async move { Ok::<_, Infallible>(engine.handle_request(req).await) }
        });

        let conn = http1::Builder::new()
            .serve_connection(io, service)
            .with_upgrades();
        tokio::pin!(conn);

        let result = tokio::select! {
            result = conn.as_mut() => result,
            () = shutdown.recv() => {
                conn.as_mut().graceful_shutdown();
                conn.as_mut().await
            }
        };
        if let Err(e) = result {
            debug!(remote = %remote_addr, error = %e, "Connection ended with error");
        }
    }

    async fn handle_request(self: Arc<Self>, req: Request<Incoming>) -> Response<ResponseBody> {
        let websocket = is_websocket_request(&req);
        let found = self
            .routes
            .read()
            .find(req.method(), req.uri().path(), websocket);

        let Some(found) = found else {
            debug!(method = %req.method(), path = req.uri().path(), "No route");
            return plain_response(StatusCode::NOT_FOUND, "Not Found");
        };

        if websocket {
            self.upgrade(req)
        } else {
            self.dispatch(req, found).await
        }
    }

    fn upgrade(self: Arc<Self>, mut req: Request<Incoming>) -> Response<ResponseBody> {
        let accept_key = match validate_upgrade_request(&req) {
            Ok(key) => key,
            Err(e) => {
                debug!(error = %e, "Rejected upgrade request");
                return plain_response(StatusCode::BAD_REQUEST, e.to_string());
            }
        };
        let response = match upgrade_response::<ResponseBody>(&accept_key) {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "Failed to build upgrade response");
                return plain_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error");
            }
        };

        let id = ConnectionId::new();
        let on_upgrade = hyper::upgrade::on(&mut req);
        metrics::record_request(Verb::Ws.as_str());

        tokio::spawn(async move {
            match on_upgrade.await {
                Ok(upgraded) => {
                    let socket =
                        complete_upgrade(TokioIo::new(upgraded), self.config.max_payload_size())
                            .await;
                    let (handle, outbound) = ConnectionHandle::channel(id);
                    Session::new(
                        id,
                        self.config.session_config(),
                        Arc::clone(&self.queue),
                        Arc::clone(&self.connections),
                    )
                    .run(socket, handle, outbound)
                    .await;
                }
                Err(e) => debug!(connection_id = %id, error = %e, "Upgrade did not complete"),
            }
        });

        response
    }

    async fn dispatch(
        self: Arc<Self>,
        req: Request<Incoming>,
        found: RouteMatch,
    ) -> Response<ResponseBody> {
        let (parts, body) = req.into_parts();
        let id = RequestId::new();
        let (response, channels) = ResponseHandle::channel();

        if !self
            .requests
            .begin(RequestRecord::from_parts(id, &parts, found.pattern, response))
        {
            return plain_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error");
        }
        let guard = AbortGuard::new(id, Arc::clone(&self.requests), Arc::clone(&self.queue));

        metrics::record_request(Verb::from_method(&parts.method).map_or("OTHER", Verb::as_str));
        queue_event(&self.queue, EventKind::HttpStart, id.to_string(), Bytes::new());
        tokio::spawn(Arc::clone(&self).read_body(id, body));

        let ResponseChannels { head, body, state } = channels;
        let Ok(head) = head.await else {
            drop(guard);
            return plain_response(StatusCode::SERVICE_UNAVAILABLE, "Service Unavailable");
        };

        let mut response = Response::new(ResponseBody::stream(
            body,
            state,
            &id,
            Arc::clone(&self.queue),
            guard,
        ));
        *response.status_mut() = head.status;
        *response.headers_mut() = head.headers;
        response
    }

    async fn read_body(self: Arc<Self>, id: RequestId, mut body: Incoming) {
        let correlation_id = id.to_string();
        while let Some(frame) = body.frame().await {
            match frame {
                Ok(frame) => {
                    if let Ok(data) = frame.into_data() {
                        if !data.is_empty() && self.requests.has(&id) {
                            queue_event(
                                &self.queue,
                                EventKind::HttpData,
                                correlation_id.as_str(),
                                data,
                            );
                        }
                    }
                }
                Err(e) => {
                    debug!(request_id = %id, error = %e, "Request body ended early");
                    return;
                }
            }
        }
        if self.requests.has(&id) {
            queue_event(&self.queue, EventKind::HttpEnd, correlation_id, Bytes::new());
        }
    }
}

fn plain_response(status: StatusCode, body: impl Into<Bytes>) -> Response<ResponseBody> {
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
        .body(ResponseBody::full(body))
        .unwrap_or_else(|_| Response::new(ResponseBody::default()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_sizes_from_config() {
        let config = ServerConfig::builder().max_payload_size(512).build();
        let engine = Engine::new(config);
        assert_eq!(engine.queue().max_payload(), 512);
        assert!(engine.connections().is_empty());
        assert!(engine.requests().is_empty());
    }

    #[test]
    fn test_emit_server_uses_sentinel_id() {
        let engine = Engine::new(ServerConfig::default());
        engine.emit_server(EventKind::Listen, Bytes::from_static(b"8080"));
        let event = engine.queue().pop();
        assert_eq!(event.kind(), EventKind::Listen);
        assert_eq!(event.correlation_id(), pylon_core::SERVER_CORRELATION_ID);
        assert_eq!(&event.payload()[..], b"8080");
    }

    #[test]
    fn test_close_connections_queues_close_events() {
        let engine = Engine::new(ServerConfig::default());
        let id = ConnectionId::new();
        let (handle, _outbound) = ConnectionHandle::channel(id);
        assert!(engine.connections().register(id, handle));

        assert_eq!(engine.close_connections(CloseCode::GoingAway, "server shutting down"), 1);
        let close = engine.queue().pop();
        assert_eq!(close.kind(), EventKind::Close);
        assert_eq!(close.correlation_id(), id.to_string());
        assert_eq!(
            close.payload().as_ref(),
            close_payload(Some((1001, "server shutting down"))).as_ref()
        );
        assert!(engine.queue().is_empty());

        let late = ConnectionId::new();
        let (handle, _outbound) = ConnectionHandle::channel(late);
        assert!(!engine.connections().register(late, handle.clone()));
        engine.reopen();
        assert!(engine.connections().register(late, handle));
    }

    #[test]
    fn test_plain_response() {
        let response = plain_response(StatusCode::NOT_FOUND, "Not Found");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/plain; charset=utf-8"
        );
    }
}

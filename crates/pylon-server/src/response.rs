//! Response plumbing between the host and a hyper connection task.
//!
//! Each routed request gets a [`ResponseHandle`] stored in the request
//! registry and a [`ResponseBody`] handed to hyper. The head travels over a
//! one-shot channel the first time the host writes or ends; body chunks travel
//! over an unbounded channel. A shared [`BodyState`] counts bytes queued by the
//! host against bytes hyper has pulled, which is what backpressure and
//! HTTP_WRITABLE are based on.

use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use http::header::{HeaderName, HeaderValue};
use http::{HeaderMap, StatusCode};
use hyper::body::{Body, Frame, SizeHint};
use parking_lot::Mutex;
use pylon_core::{DeferredQueue, EventKind, RequestId, RequestStatus};
use tokio::sync::{mpsc, oneshot};

use crate::engine::queue_event;
use crate::request::RequestRegistry;

/// Status line and headers of a response.
#[derive(Debug, Clone)]
pub struct ResponseHead {
    /// Status code.
    pub status: StatusCode,
    /// Response headers.
    pub headers: HeaderMap,
}

impl Default for ResponseHead {
    fn default() -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
        }
    }
}

/// Byte counters shared between a handle and its body.
#[derive(Debug, Default)]
pub struct BodyState {
    buffered: AtomicUsize,
    queued: AtomicUsize,
    writable_wanted: AtomicBool,
}

impl BodyState {
    /// Bytes queued by the host that hyper has not pulled yet.
    pub fn buffered(&self) -> usize {
        self.buffered.load(Ordering::Acquire)
    }

    /// Total bytes accepted from the host.
    pub fn queued(&self) -> usize {
        self.queued.load(Ordering::Acquire)
    }
}

struct Pending {
    head: ResponseHead,
    head_tx: Option<oneshot::Sender<ResponseHead>>,
    body_tx: Option<mpsc::UnboundedSender<Bytes>>,
}

/// Host-side half of a response.
pub struct ResponseHandle {
    pending: Mutex<Pending>,
    state: Arc<BodyState>,
}

impl std::fmt::Debug for ResponseHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseHandle")
            .field("head_sent", &self.head_sent())
            .field("buffered", &self.state.buffered())
            .field("queued", &self.state.queued())
            .finish()
    }
}

/// Engine-side receivers paired with a [`ResponseHandle`].
pub struct ResponseChannels {
    /// Resolves with the head on the first write or end.
    pub head: oneshot::Receiver<ResponseHead>,
    /// Body chunks; closes when the response ends.
    pub body: mpsc::UnboundedReceiver<Bytes>,
    /// Counters shared with the handle.
    pub state: Arc<BodyState>,
}

impl ResponseHandle {
    /// Creates a handle and the receivers the connection task consumes.
    pub fn channel() -> (Self, ResponseChannels) {
        let (head_tx, head_rx) = oneshot::channel();
        let (body_tx, body_rx) = mpsc::unbounded_channel();
        let state = Arc::new(BodyState::default());
        let handle = Self {
            pending: Mutex::new(Pending {
                head: ResponseHead::default(),
                head_tx: Some(head_tx),
                body_tx: Some(body_tx),
            }),
            state: Arc::clone(&state),
        };
        (
            handle,
            ResponseChannels {
                head: head_rx,
                body: body_rx,
                state,
            },
        )
    }

    /// Returns `true` once the head has been handed to the connection.
    pub fn head_sent(&self) -> bool {
        self.pending.lock().head_tx.is_none()
    }

    /// Bytes still waiting to be pulled by the connection.
    pub fn buffered(&self) -> usize {
        self.state.buffered()
    }

    /// Total bytes accepted so far.
    pub fn queued(&self) -> usize {
        self.state.queued()
    }

    /// Sets the status from a line such as `"404 Not Found"` or `"204"`.
    pub fn set_status(&self, line: &str) -> RequestStatus {
        let mut pending = self.pending.lock();
        if pending.head_tx.is_none() {
            return RequestStatus::HeadersSent;
        }
        match parse_status_line(line) {
            Some(status) => {
                pending.head.status = status;
                RequestStatus::Ok
            }
            None => RequestStatus::InvalidValue,
        }
    }

    /// Appends a header to the pending head.
    pub fn set_header(&self, name: &str, value: &str) -> RequestStatus {
        let mut pending = self.pending.lock();
        if pending.head_tx.is_none() {
            return RequestStatus::HeadersSent;
        }
        let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) else {
            return RequestStatus::InvalidValue;
        };
        pending.head.headers.append(name, value);
        RequestStatus::Ok
    }

    /// Queues a body chunk, flushing the head first if needed.
    ///
    /// Returns `false` if the body has already been closed or the connection
    /// stopped reading it.
    pub fn write(&self, data: Bytes) -> bool {
        let mut pending = self.pending.lock();
        Self::flush_head(&mut pending);
        self.push_chunk(&pending, data)
    }

    /// Queues a final chunk and closes the body.
    pub fn end(&self, data: Bytes) -> bool {
        let mut pending = self.pending.lock();
        Self::flush_head(&mut pending);
        let accepted = self.push_chunk(&pending, data);
        pending.body_tx = None;
        accepted
    }

    /// Asks for an HTTP_WRITABLE event once buffered bytes drain.
    ///
    /// Returns `false` if the bytes drained before the request was recorded.
    /// No event follows then and the caller may write straight away.
    pub fn want_writable(&self) -> bool {
        let state = &self.state;
        state.writable_wanted.store(true, Ordering::SeqCst);
        if state.buffered.load(Ordering::SeqCst) > 0 {
            return true;
        }
        // the body may have taken the flag after draining; then the event is on its way
        !state.writable_wanted.swap(false, Ordering::SeqCst)
    }

    /// Answers with `status` if nothing was sent yet, then closes the body.
    pub fn abort_with(&self, status: StatusCode) {
        let mut pending = self.pending.lock();
        if pending.head_tx.is_some() {
            pending.head = ResponseHead {
                status,
                headers: HeaderMap::new(),
            };
            Self::flush_head(&mut pending);
        }
        pending.body_tx = None;
    }

    fn flush_head(pending: &mut Pending) {
        if let Some(tx) = pending.head_tx.take() {
            // receiver gone means the client is gone; the abort path handles it
            let _ = tx.send(std::mem::take(&mut pending.head));
        }
    }

    fn push_chunk(&self, pending: &Pending, data: Bytes) -> bool {
        let Some(tx) = pending.body_tx.as_ref() else {
            return false;
        };
        if data.is_empty() {
            return true;
        }
        let len = data.len();
        self.state.buffered.fetch_add(len, Ordering::SeqCst);
        if tx.send(data).is_err() {
            self.state.buffered.fetch_sub(len, Ordering::SeqCst);
            return false;
        }
        self.state.queued.fetch_add(len, Ordering::AcqRel);
        true
    }
}

/// Parses the leading status code of a status line.
fn parse_status_line(line: &str) -> Option<StatusCode> {
    let code = line.trim_start().split_whitespace().next()?;
    let code: u16 = code.parse().ok()?;
    StatusCode::from_u16(code).ok()
}

/// Removes the request and queues HTTP_ABORT when dropped, unless the
/// request has already ended.
pub struct AbortGuard {
    id: RequestId,
    requests: Arc<RequestRegistry>,
    queue: Arc<DeferredQueue>,
}

impl AbortGuard {
    /// Arms a guard for one request.
    pub fn new(id: RequestId, requests: Arc<RequestRegistry>, queue: Arc<DeferredQueue>) -> Self {
        Self {
            id,
            requests,
            queue,
        }
    }
}

impl Drop for AbortGuard {
    fn drop(&mut self) {
        if self.requests.abort(&self.id) {
            tracing::debug!(request_id = %self.id, "Client went away before the response ended");
            queue_event(&self.queue, EventKind::HttpAbort, self.id.to_string(), Bytes::new());
        }
    }
}

struct Streaming {
    rx: mpsc::UnboundedReceiver<Bytes>,
    state: Arc<BodyState>,
    id: String,
    queue: Arc<DeferredQueue>,
    _guard: AbortGuard,
}

enum Kind {
    Empty,
    Full(Option<Bytes>),
    Stream(Box<Streaming>),
}

/// Body type served by the engine.
pub struct ResponseBody {
    kind: Kind,
}

impl Default for ResponseBody {
    fn default() -> Self {
        Self { kind: Kind::Empty }
    }
}

impl ResponseBody {
    /// A body with one fixed chunk.
    pub fn full(data: impl Into<Bytes>) -> Self {
        Self {
            kind: Kind::Full(Some(data.into())),
        }
    }

    /// A body fed by a [`ResponseHandle`].
    pub fn stream(
        rx: mpsc::UnboundedReceiver<Bytes>,
        state: Arc<BodyState>,
        id: &RequestId,
        queue: Arc<DeferredQueue>,
        guard: AbortGuard,
    ) -> Self {
        Self {
            kind: Kind::Stream(Box::new(Streaming {
                rx,
                state,
                id: id.to_string(),
                queue,
                _guard: guard,
            })),
        }
    }
}

impl Body for ResponseBody {
    type Data = Bytes;
    type Error = std::convert::Infallible;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        match &mut self.kind {
            Kind::Empty => Poll::Ready(None),
            Kind::Full(data) => Poll::Ready(data.take().map(|d| Ok(Frame::data(d)))),
            Kind::Stream(stream) => match stream.rx.poll_recv(cx) {
                Poll::Ready(Some(chunk)) => {
                    let state = &stream.state;
                    let remaining = state
                        .buffered
                        .fetch_sub(chunk.len(), Ordering::SeqCst)
                        .saturating_sub(chunk.len());
                    if remaining == 0 && state.writable_wanted.swap(false, Ordering::SeqCst) {
                        let written = state.queued().to_string();
                        queue_event(
                            &stream.queue,
                            EventKind::HttpWritable,
                            stream.id.clone(),
                            Bytes::from(written),
                        );
                    }
                    Poll::Ready(Some(Ok(Frame::data(chunk))))
                }
                Poll::Ready(None) => Poll::Ready(None),
                Poll::Pending => Poll::Pending,
            },
        }
    }

    fn is_end_stream(&self) -> bool {
        match &self.kind {
            Kind::Empty => true,
            Kind::Full(data) => data.is_none(),
            Kind::Stream(_) => false,
        }
    }

    fn size_hint(&self) -> SizeHint {
        match &self.kind {
            Kind::Empty => SizeHint::with_exact(0),
            Kind::Full(Some(data)) => SizeHint::with_exact(data.len() as u64),
            Kind::Full(None) => SizeHint::with_exact(0),
            Kind::Stream(_) => SizeHint::default(),
        }
    }
}

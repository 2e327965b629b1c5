//! Event envelopes.
//!
//! An [`EventEnvelope`] is the flattened, plain-data record of one
//! asynchronous occurrence inside the socket engine. Every native callback
//! source is reduced to this one shape so the host can pull events on its own
//! schedule instead of receiving callbacks.

use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::CoreError;

/// Correlation id used by server-scoped events (LISTEN, SHUTDOWN, server ERROR).
pub const SERVER_CORRELATION_ID: &str = "server";

/// The discriminant of an [`EventEnvelope`].
///
/// Discriminant values are part of the C ABI and must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(i32)]
pub enum EventKind {
    /// A WebSocket connection finished its upgrade.
    Open = 0,
    /// A WebSocket message arrived.
    Message = 1,
    /// A WebSocket connection closed.
    Close = 2,
    /// The listen socket was bound.
    Listen = 3,
    /// The server finished shutting down.
    Shutdown = 4,
    /// HTTP request headers completed.
    HttpStart = 5,
    /// A chunk of HTTP request body arrived.
    HttpData = 6,
    /// The HTTP request body is complete.
    HttpEnd = 7,
    /// The peer went away before the response ended.
    HttpAbort = 8,
    /// A backpressured response drained and can accept more data.
    HttpWritable = 9,
    /// A diagnostic, or the empty-queue sentinel.
    Error = 10,
}

impl EventKind {
    /// All event kinds in discriminant order.
    pub const ALL: [Self; 11] = [
        Self::Open,
        Self::Message,
        Self::Close,
        Self::Listen,
        Self::Shutdown,
        Self::HttpStart,
        Self::HttpData,
        Self::HttpEnd,
        Self::HttpAbort,
        Self::HttpWritable,
        Self::Error,
    ];

    /// Returns the stable upper-case name of this kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "OPEN",
            Self::Message => "MESSAGE",
            Self::Close => "CLOSE",
            Self::Listen => "LISTEN",
            Self::Shutdown => "SHUTDOWN",
            Self::HttpStart => "HTTP_START",
            Self::HttpData => "HTTP_DATA",
            Self::HttpEnd => "HTTP_END",
            Self::HttpAbort => "HTTP_ABORT",
            Self::HttpWritable => "HTTP_WRITABLE",
            Self::Error => "ERROR",
        }
    }

    /// Returns the C ABI discriminant.
    #[must_use]
    pub const fn as_i32(self) -> i32 {
        self as i32
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<i32> for EventKind {
    type Error = CoreError;

    fn try_from(value: i32) -> Result<Self, CoreError> {
        Self::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_i32() == value)
            .ok_or(CoreError::UnknownEventKind(value))
    }
}

/// One asynchronous occurrence: kind, correlation id and payload bytes.
///
/// The correlation id is always present. Server-scoped events use
/// [`SERVER_CORRELATION_ID`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventEnvelope {
    kind: EventKind,
    correlation_id: String,
    payload: Bytes,
    truncated: bool,
}

impl EventEnvelope {
    /// Creates an envelope without applying a payload cap.
    pub fn new(kind: EventKind, correlation_id: impl Into<String>, payload: Bytes) -> Self {
        Self {
            kind,
            correlation_id: correlation_id.into(),
            payload,
            truncated: false,
        }
    }

    /// Creates an envelope whose payload is cut to at most `max_payload` bytes.
    ///
    /// Truncation is logged and recorded on the envelope; it never happens
    /// silently.
    pub fn capped(
        kind: EventKind,
        correlation_id: impl Into<String>,
        mut payload: Bytes,
        max_payload: usize,
    ) -> Self {
        let correlation_id = correlation_id.into();
        let truncated = payload.len() > max_payload;
        if truncated {
            warn!(
                kind = %kind,
                correlation_id = %correlation_id,
                size = payload.len(),
                max = max_payload,
                "Event payload exceeds maximum size, truncating"
            );
            payload.truncate(max_payload);
        }
        Self {
            kind,
            correlation_id,
            payload,
            truncated,
        }
    }

    /// Creates a server-scoped envelope.
    pub fn server(kind: EventKind, payload: Bytes) -> Self {
        Self::new(kind, SERVER_CORRELATION_ID, payload)
    }

    /// The sentinel returned when popping an empty queue.
    #[must_use]
    pub fn empty_sentinel() -> Self {
        Self::server(EventKind::Error, Bytes::new())
    }

    /// Returns `true` if this is the empty-queue sentinel.
    #[must_use]
    pub fn is_empty_sentinel(&self) -> bool {
        self.kind == EventKind::Error
            && self.payload.is_empty()
            && self.correlation_id == SERVER_CORRELATION_ID
    }

    /// Returns the event kind.
    #[must_use]
    pub fn kind(&self) -> EventKind {
        self.kind
    }

    /// Returns the correlation id.
    #[must_use]
    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    /// Returns the payload.
    #[must_use]
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Returns `true` if the payload was cut to the configured maximum.
    #[must_use]
    pub fn truncated(&self) -> bool {
        self.truncated
    }

    /// Decomposes the envelope.
    #[must_use]
    pub fn into_parts(self) -> (EventKind, String, Bytes) {
        (self.kind, self.correlation_id, self.payload)
    }
}

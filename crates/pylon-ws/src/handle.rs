//! Non-owning back-references to live connections.
//!
//! A [`ConnectionHandle`] never touches the socket. It hands frames to the
//! connection's session task over an unbounded channel and keeps a shared
//! count of bytes that are queued but not yet flushed.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use pylon_core::{ConnectionId, SendStatus};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::CloseCode;
use crate::outbound::Outbound;

/// What to do when buffered bytes exceed the limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackpressurePolicy {
    /// Buffered bytes above which sends are dropped.
    pub max_backpressure: usize,
    /// Whether to close the connection (1008) when a send is dropped for backpressure.
    pub close_on_limit: bool,
}

impl Default for BackpressurePolicy {
    fn default() -> Self {
        Self {
            max_backpressure: 64 * 1024,
            close_on_limit: false,
        }
    }
}

fn channel(id: ConnectionId) -> (ConnectionHandle, OutboundReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    let buffered = Arc::new(AtomicUsize::new(0));
    (
        ConnectionHandle {
            id,
            tx,
            buffered: Arc::clone(&buffered),
        },
        OutboundReceiver { rx, buffered },
    )
}

/// Sending half held by the registry.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    tx: mpsc::UnboundedSender<Outbound>,
    buffered: Arc<AtomicUsize>,
}

impl ConnectionHandle {
    /// Creates a connected handle/receiver pair for one connection.
    pub fn channel(id: ConnectionId) -> (Self, OutboundReceiver) {
        channel(id)
    }

    /// Returns the connection id.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Bytes queued but not yet flushed to the socket.
    pub fn buffered_amount(&self) -> usize {
        self.buffered.load(Ordering::Acquire)
    }

    /// Returns `true` once the session task has exited.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Queues a frame, applying the backpressure policy.
    pub fn send(&self, outbound: Outbound, policy: &BackpressurePolicy) -> SendStatus {
        if self.is_closed() {
            return SendStatus::Dropped;
        }

        let buffered = self.buffered_amount();
        if buffered > policy.max_backpressure {
            warn!(
                connection_id = %self.id,
                buffered = buffered,
                max = policy.max_backpressure,
                "Backpressure limit exceeded, dropping message"
            );
            if policy.close_on_limit {
                self.close(CloseCode::PolicyViolation, "backpressure limit exceeded");
            }
            return SendStatus::Dropped;
        }

        let size = outbound.len();
        self.buffered.fetch_add(size, Ordering::AcqRel);
        if self.tx.send(outbound).is_err() {
            release(&self.buffered, size);
            return SendStatus::Dropped;
        }

        if buffered + size > policy.max_backpressure {
            SendStatus::Backpressure
        } else {
            SendStatus::Success
        }
    }

    /// Asks the session to start the closing handshake.
    ///
    /// Returns `false` if the session is already gone.
    pub fn close(&self, code: CloseCode, reason: impl Into<String>) -> bool {
        let reason = reason.into();
        debug!(connection_id = %self.id, code = code.as_u16(), reason = %reason, "Closing connection");
        self.tx.send(Outbound::close(code, reason)).is_ok()
    }
}

/// Receiving half owned by the session task.
#[derive(Debug)]
pub struct OutboundReceiver {
    rx: mpsc::UnboundedReceiver<Outbound>,
    buffered: Arc<AtomicUsize>,
}

impl OutboundReceiver {
    /// Waits for the next queued frame.
    ///
    /// Returns `None` once every handle has been dropped.
    pub async fn recv(&mut self) -> Option<Outbound> {
        self.rx.recv().await
    }

    /// Takes a queued frame without waiting.
    pub fn try_recv(&mut self) -> Option<Outbound> {
        self.rx.try_recv().ok()
    }

    /// Marks `size` bytes as flushed.
    pub fn flushed(&self, size: usize) {
        release(&self.buffered, size);
    }
}

fn release(buffered: &AtomicUsize, size: usize) {
    let _ = buffered.fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
        Some(current.saturating_sub(size))
    });
}

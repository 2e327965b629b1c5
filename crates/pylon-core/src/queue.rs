//! The deferred event queue.
//!
//! Engine callbacks push envelopes; the host pops them between engine loop
//! iterations. Push never blocks and never fails. Pop on an empty queue
//! returns [`EventEnvelope::empty_sentinel`] instead of blocking, so callers
//! must branch on the kind before touching the payload.
//!
//! The engine runs on its own thread while the host polls from another, so
//! the queue is guarded by a mutex. Neither side holds the lock for longer
//! than a single push or pop.

use std::collections::VecDeque;

use bytes::Bytes;
use parking_lot::Mutex;

use crate::envelope::{EventEnvelope, EventKind};

/// Ordered, single-consumer FIFO of [`EventEnvelope`]s.
#[derive(Debug)]
pub struct DeferredQueue {
    events: Mutex<VecDeque<EventEnvelope>>,
    max_payload: usize,
}

impl DeferredQueue {
    /// Creates an empty queue that caps envelope payloads at `max_payload` bytes.
    #[must_use]
    pub fn new(max_payload: usize) -> Self {
        Self {
            events: Mutex::new(VecDeque::new()),
            max_payload,
        }
    }

    /// Returns the payload cap applied by [`DeferredQueue::emit`].
    #[must_use]
    pub fn max_payload(&self) -> usize {
        self.max_payload
    }

    /// Appends an envelope.
    pub fn push(&self, envelope: EventEnvelope) {
        self.events.lock().push_back(envelope);
    }

    /// Builds a capped envelope and appends it.
    ///
    /// Returns `true` if the payload had to be truncated.
    pub fn emit(&self, kind: EventKind, correlation_id: impl Into<String>, payload: Bytes) -> bool {
        let envelope = EventEnvelope::capped(kind, correlation_id, payload, self.max_payload);
        let truncated = envelope.truncated();
        self.push(envelope);
        truncated
    }

    /// Removes and returns the oldest envelope, or the empty sentinel.
    pub fn pop(&self) -> EventEnvelope {
        self.events
            .lock()
            .pop_front()
            .unwrap_or_else(EventEnvelope::empty_sentinel)
    }

    /// Returns the oldest envelope without removing it.
    #[must_use]
    pub fn peek(&self) -> Option<EventEnvelope> {
        self.events.lock().front().cloned()
    }

    /// Removes up to `max` envelopes in order.
    pub fn drain(&self, max: usize) -> Vec<EventEnvelope> {
        let mut events = self.events.lock();
        let count = max.min(events.len());
        events.drain(..count).collect()
    }

    /// Returns the number of queued envelopes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    /// Returns `true` if no envelopes are queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    /// Returns `true` if at least one envelope is queued.
    #[must_use]
    pub fn has_events(&self) -> bool {
        !self.is_empty()
    }

    /// Discards every queued envelope, returning how many were dropped.
    pub fn clear(&self) -> usize {
        let mut events = self.events.lock();
        let count = events.len();
        events.clear();
        count
    }
}

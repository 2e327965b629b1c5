//! # Pylon Core
//!
//! Core types for the pylon bridge between a push-driven socket engine and a
//! pull-driven, single-threaded scripting host.
//!
//! This crate provides the foundational types used throughout pylon:
//!
//! - [`EventEnvelope`] - One asynchronous occurrence (kind + correlation id + payload)
//! - [`DeferredQueue`] - Ordered, single-consumer FIFO of envelopes
//! - [`ConnectionId`] / [`RequestId`] - UUID v7 correlation identifiers
//! - [`SendStatus`], [`BroadcastStatus`], [`ResponseStatus`], [`RequestStatus`] - Command results
//! - [`buffer`] - Copying values into fixed-capacity caller buffers
//!
//! # Example
//!
//! ```
//! use bytes::Bytes;
//! use pylon_core::{DeferredQueue, EventEnvelope, EventKind};
//!
//! let queue = DeferredQueue::new(1024);
//! queue.push(EventEnvelope::new(EventKind::Message, "conn-1", Bytes::from_static(b"ping")));
//!
//! let event = queue.pop();
//! assert_eq!(event.kind(), EventKind::Message);
//! assert_eq!(event.payload().as_ref(), b"ping");
//!
//! // Popping an empty queue never blocks or fails.
//! assert!(queue.pop().is_empty_sentinel());
//! ```

#![doc(html_root_url = "https://docs.rs/pylon-core/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod buffer;
mod envelope;
mod error;
mod id;
mod queue;
mod status;

pub use envelope::{EventEnvelope, EventKind, SERVER_CORRELATION_ID};
pub use error::{CoreError, CoreResult};
pub use id::{ConnectionId, RequestId};
pub use queue::DeferredQueue;
pub use status::{BroadcastStatus, RequestStatus, ResponseStatus, SendStatus};

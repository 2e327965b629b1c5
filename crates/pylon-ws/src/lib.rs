//! WebSocket side of the pylon bridge.
//!
//! This crate owns everything between an upgraded socket and the deferred
//! event queue:
//!
//! - [`ConnectionRegistry`] maps connection ids to live or faded handles.
//!   The engine only ever *fades* entries; the host reaps them with
//!   [`ConnectionRegistry::purge`] between polls.
//! - [`ConnectionHandle`] is the non-owning back-reference the registry
//!   holds. Sending through it never blocks; it only accounts buffered bytes
//!   against the backpressure limit.
//! - [`Session`] drives one upgraded socket: it queues OPEN, MESSAGE and
//!   CLOSE envelopes, flushes outbound frames and enforces idle timeouts,
//!   automatic pings and the maximum lifetime.
//! - [`upgrade`] holds the RFC 6455 handshake helpers.
//!
//! # Flow
//!
//! ```text
//! HTTP Request ──► is_websocket_request() ──► upgrade_response() (101)
//!      │
//!      ▼
//! complete_upgrade() ──► Session::run()
//!      │                    │
//!      │                    ├─► registry.register(id)  + OPEN
//!      │                    ├─► inbound frames          ─► MESSAGE
//!      │                    └─► socket closed           ─► registry.fade(id) + CLOSE
//!      ▼
//! host tick ──► registry.purge()
//! ```

pub mod error;
pub mod handle;
pub mod outbound;
pub mod registry;
pub mod session;
pub mod upgrade;

pub use error::{CloseCode, WsError, WsResult};
pub use handle::{BackpressurePolicy, ConnectionHandle, OutboundReceiver};
pub use outbound::Outbound;
pub use registry::{ConnectionEntry, ConnectionRegistry, RegistryStats};
pub use session::{close_payload, Session, SessionConfig};
pub use upgrade::{complete_upgrade, is_websocket_request, upgrade_response, validate_upgrade_request};

//! # Pylon Server
//!
//! HTTP and WebSocket endpoint for a pull-driven, single-threaded host.
//!
//! The socket engine runs on its own single-threaded Tokio runtime. Nothing
//! it does calls back into the host; every occurrence becomes an
//! [`EventEnvelope`](pylon_core::EventEnvelope) on a deferred queue that the
//! host drains between ticks with [`Server::pop_event`] or
//! [`Server::drain_events`]. The host answers with synchronous commands
//! (sends, broadcasts, response writes) that report outcomes as status values.
//!
//! - [`Server`] - composition root and the whole host-facing surface
//! - [`ServerConfig`] - tuning knobs, built with [`ServerConfig::builder()`]
//! - [`RouteTable`] / [`Verb`] - ordered route registrations
//! - [`RequestRegistry`] - in-flight HTTP requests and their responses
//!
//! ## Example
//!
//! ```rust,no_run
//! use pylon_server::{Server, ServerConfig, Verb};
//!
//! let server = Server::new(ServerConfig::builder().idle_timeout_secs(60).build())?;
//! server.add_route(Verb::Ws, "/ws");
//! server.add_route(Verb::Any, "/api/*");
//!
//! if server.start_listening(9001) {
//!     // poll server.pop_event() from the host loop
//! }
//! # Ok::<(), pylon_server::ServerError>(())
//! ```

#![doc(html_root_url = "https://docs.rs/pylon-server/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod config;
mod engine;
pub mod error;
pub mod request;
pub mod response;
pub mod route;
pub mod runtime;
mod server;
pub mod shutdown;

pub use config::{CompressionMode, ServerConfig, ServerConfigBuilder};
pub use engine::Engine;
pub use error::{ServerError, ServerResult};
pub use request::{RequestField, RequestRecord, RequestRegistry};
pub use route::{RouteMatch, RoutePattern, RouteTable, Verb};
pub use server::{Server, ServerState};

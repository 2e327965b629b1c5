//! Observability for pylon.
//!
//! - **Logging**: `tracing-subscriber` output, JSON or pretty, filtered by `EnvFilter`
//! - **Metrics**: counters and gauges for the event bridge via the `metrics` facade
//!
//! Pylon never installs a metrics recorder itself. Embedders that want the
//! numbers install one (for example a Prometheus exporter) before starting a
//! server; without a recorder every call is a no-op.
//!
//! # Standard Metrics
//!
//! | Metric | Type | Labels | Description |
//! |--------|------|--------|-------------|
//! | `pylon_events_queued_total` | Counter | `kind` | Envelopes pushed onto the deferred queue |
//! | `pylon_connections_open` | Gauge | - | Live WebSocket connections |
//! | `pylon_messages_sent_total` | Counter | `status` | WebSocket sends by outcome |
//! | `pylon_requests_total` | Counter | `verb` | HTTP requests handed to the host |
//! | `pylon_payload_truncations_total` | Counter | - | Envelope payloads cut to the maximum size |
//!
//! # Example
//!
//! ```rust,ignore
//! use pylon_telemetry::{init_logging, LogConfig};
//!
//! init_logging(&LogConfig::development())?;
//! tracing::info!(port = 8080, "Listening");
//! ```

#![warn(missing_docs)]

pub mod error;
pub mod logging;
pub mod metrics;

pub use error::TelemetryError;
pub use logging::{init_logging, LogConfig};

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;

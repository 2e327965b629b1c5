//! Server configuration types.
//!
//! Configuration is fixed once the server is constructed. Use
//! [`ServerConfig::builder()`] to override defaults.
//!
//! # Example
//!
//! ```rust
//! use pylon_server::{CompressionMode, ServerConfig};
//!
//! let config = ServerConfig::builder()
//!     .host("127.0.0.1")
//!     .idle_timeout_secs(30)
//!     .compression(CompressionMode::Disabled)
//!     .build();
//!
//! assert_eq!(config.idle_timeout_secs(), 30);
//! assert_eq!(config.max_payload_size(), 16 * 1024 * 1024);
//! ```

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use pylon_ws::{BackpressurePolicy, SessionConfig};
use serde::{Deserialize, Serialize};

/// Default bind host.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default maximum payload size (16 MiB).
pub const DEFAULT_MAX_PAYLOAD_SIZE: usize = 16 * 1024 * 1024;

/// Default backpressure limit (64 KiB).
pub const DEFAULT_MAX_BACKPRESSURE: usize = 64 * 1024;

/// Default idle timeout in seconds.
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 120;

/// Default bounded wait for the accept loop when stopping, in seconds.
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 5;

/// WebSocket compression setting.
///
/// Recorded and logged only; compressed sends go out as plain text frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompressionMode {
    /// No compression.
    Disabled,
    /// One compressor shared by all connections.
    #[default]
    SharedCompressor,
    /// One compressor per connection.
    DedicatedCompressor,
}

impl CompressionMode {
    /// Returns the snake_case name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disabled => "disabled",
            Self::SharedCompressor => "shared_compressor",
            Self::DedicatedCompressor => "dedicated_compressor",
        }
    }
}

impl fmt::Display for CompressionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CompressionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "disabled" | "none" => Ok(Self::Disabled),
            "shared_compressor" | "shared" => Ok(Self::SharedCompressor),
            "dedicated_compressor" | "dedicated" => Ok(Self::DedicatedCompressor),
            other => Err(format!("unknown compression mode '{other}'")),
        }
    }
}

/// Server configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    host: String,
    max_payload_size: usize,
    max_backpressure: usize,
    idle_timeout_secs: u64,
    max_lifetime_minutes: u64,
    send_pings_automatically: bool,
    close_on_backpressure_limit: bool,
    reset_idle_timeout_on_send: bool,
    compression: CompressionMode,
    echo: bool,
    shutdown_timeout: Duration,
}

impl ServerConfig {
    /// Creates a new server configuration builder.
    #[must_use]
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder::default()
    }

    /// Returns the bind host.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Maximum inbound message size and envelope payload size, in bytes.
    #[must_use]
    pub fn max_payload_size(&self) -> usize {
        self.max_payload_size
    }

    /// Buffered bytes above which sends are dropped.
    #[must_use]
    pub fn max_backpressure(&self) -> usize {
        self.max_backpressure
    }

    /// Idle timeout in seconds; 0 disables.
    #[must_use]
    pub fn idle_timeout_secs(&self) -> u64 {
        self.idle_timeout_secs
    }

    /// Maximum connection lifetime in minutes; 0 means unlimited.
    #[must_use]
    pub fn max_lifetime_minutes(&self) -> u64 {
        self.max_lifetime_minutes
    }

    /// Whether idle connections are pinged automatically.
    #[must_use]
    pub fn send_pings_automatically(&self) -> bool {
        self.send_pings_automatically
    }

    /// Whether exceeding the backpressure limit closes the connection.
    #[must_use]
    pub fn close_on_backpressure_limit(&self) -> bool {
        self.close_on_backpressure_limit
    }

    /// Whether outbound traffic resets the idle timer.
    #[must_use]
    pub fn reset_idle_timeout_on_send(&self) -> bool {
        self.reset_idle_timeout_on_send
    }

    /// The compression mode.
    #[must_use]
    pub fn compression(&self) -> CompressionMode {
        self.compression
    }

    /// Whether inbound WebSocket messages are echoed back.
    #[must_use]
    pub fn echo(&self) -> bool {
        self.echo
    }

    /// Bounded wait for the accept loop to exit when stopping.
    #[must_use]
    pub fn shutdown_timeout(&self) -> Duration {
        self.shutdown_timeout
    }

    /// Derives per-connection session settings.
    #[must_use]
    pub fn session_config(&self) -> SessionConfig {
        let idle_timeout =
            (self.idle_timeout_secs > 0).then(|| Duration::from_secs(self.idle_timeout_secs));
        let max_lifetime = (self.max_lifetime_minutes > 0)
            .then(|| Duration::from_secs(self.max_lifetime_minutes * 60));
        SessionConfig {
            idle_timeout,
            send_pings: self.send_pings_automatically,
            max_lifetime,
            reset_idle_on_send: self.reset_idle_timeout_on_send,
            echo: self.echo,
        }
    }

    /// Derives the backpressure policy for sends.
    #[must_use]
    pub fn backpressure_policy(&self) -> BackpressurePolicy {
        BackpressurePolicy {
            max_backpressure: self.max_backpressure,
            close_on_limit: self.close_on_backpressure_limit,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Builder for [`ServerConfig`].
#[derive(Debug, Clone)]
pub struct ServerConfigBuilder {
    config: ServerConfig,
}

impl Default for ServerConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerConfigBuilder {
    /// Creates a new builder with default values.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: ServerConfig {
                host: DEFAULT_HOST.to_string(),
                max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
                max_backpressure: DEFAULT_MAX_BACKPRESSURE,
                idle_timeout_secs: DEFAULT_IDLE_TIMEOUT_SECS,
                max_lifetime_minutes: 0,
                send_pings_automatically: true,
                close_on_backpressure_limit: false,
                reset_idle_timeout_on_send: true,
                compression: CompressionMode::SharedCompressor,
                echo: false,
                shutdown_timeout: Duration::from_secs(DEFAULT_SHUTDOWN_TIMEOUT_SECS),
            },
        }
    }

    /// Sets the bind host (e.g., "0.0.0.0", "127.0.0.1").
    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    /// Sets the maximum payload size in bytes.
    #[must_use]
    pub fn max_payload_size(mut self, bytes: usize) -> Self {
        self.config.max_payload_size = bytes;
        self
    }

    /// Sets the backpressure limit in bytes.
    #[must_use]
    pub fn max_backpressure(mut self, bytes: usize) -> Self {
        self.config.max_backpressure = bytes;
        self
    }

    /// Sets the idle timeout in seconds; 0 disables.
    #[must_use]
    pub fn idle_timeout_secs(mut self, secs: u64) -> Self {
        self.config.idle_timeout_secs = secs;
        self
    }

    /// Sets the maximum connection lifetime in minutes; 0 means unlimited.
    #[must_use]
    pub fn max_lifetime_minutes(mut self, minutes: u64) -> Self {
        self.config.max_lifetime_minutes = minutes;
        self
    }

    /// Enables or disables automatic pings.
    #[must_use]
    pub fn send_pings_automatically(mut self, enabled: bool) -> Self {
        self.config.send_pings_automatically = enabled;
        self
    }

    /// Closes connections whose sends exceed the backpressure limit.
    #[must_use]
    pub fn close_on_backpressure_limit(mut self, enabled: bool) -> Self {
        self.config.close_on_backpressure_limit = enabled;
        self
    }

    /// Lets outbound traffic reset the idle timer.
    #[must_use]
    pub fn reset_idle_timeout_on_send(mut self, enabled: bool) -> Self {
        self.config.reset_idle_timeout_on_send = enabled;
        self
    }

    /// Sets the compression mode.
    #[must_use]
    pub fn compression(mut self, mode: CompressionMode) -> Self {
        self.config.compression = mode;
        self
    }

    /// Echoes every inbound WebSocket message back to its sender.
    #[must_use]
    pub fn echo(mut self, enabled: bool) -> Self {
        self.config.echo = enabled;
        self
    }

    /// Sets the bounded wait used when stopping.
    #[must_use]
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.config.shutdown_timeout = timeout;
        self
    }

    /// Builds the configuration.
    #[must_use]
    pub fn build(self) -> ServerConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.host(), "0.0.0.0");
        assert_eq!(config.max_payload_size(), 16 * 1024 * 1024);
        assert_eq!(config.max_backpressure(), 64 * 1024);
        assert_eq!(config.idle_timeout_secs(), 120);
        assert_eq!(config.max_lifetime_minutes(), 0);
        assert!(config.send_pings_automatically());
        assert!(!config.close_on_backpressure_limit());
        assert!(config.reset_idle_timeout_on_send());
        assert_eq!(config.compression(), CompressionMode::SharedCompressor);
        assert!(!config.echo());
    }

    #[test]
    fn test_builder_overrides() {
        let config = ServerConfig::builder()
            .host("127.0.0.1")
            .max_backpressure(1024)
            .close_on_backpressure_limit(true)
            .echo(true)
            .shutdown_timeout(Duration::from_millis(250))
            .build();

        assert_eq!(config.host(), "127.0.0.1");
        assert_eq!(config.backpressure_policy().max_backpressure, 1024);
        assert!(config.backpressure_policy().close_on_limit);
        assert!(config.echo());
        assert_eq!(config.shutdown_timeout(), Duration::from_millis(250));
    }

    #[test]
    fn test_session_config_disables_zero_limits() {
        let config = ServerConfig::builder()
            .idle_timeout_secs(0)
            .max_lifetime_minutes(0)
            .build();
        let session = config.session_config();
        assert_eq!(session.idle_timeout, None);
        assert_eq!(session.max_lifetime, None);

        let config = ServerConfig::builder().max_lifetime_minutes(2).build();
        let session = config.session_config();
        assert_eq!(session.idle_timeout, Some(Duration::from_secs(120)));
        assert_eq!(session.max_lifetime, Some(Duration::from_secs(120)));
    }

    #[test]
    fn test_compression_mode_parse() {
        assert_eq!(
            "shared".parse::<CompressionMode>().unwrap(),
            CompressionMode::SharedCompressor
        );
        assert_eq!(
            "Dedicated-Compressor".parse::<CompressionMode>().unwrap(),
            CompressionMode::DedicatedCompressor
        );
        assert!("zstd".parse::<CompressionMode>().is_err());
        assert_eq!(CompressionMode::Disabled.to_string(), "disabled");
    }
}

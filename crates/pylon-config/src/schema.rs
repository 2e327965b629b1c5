//! Configuration sections.

use pylon_server::config::{
    DEFAULT_HOST, DEFAULT_IDLE_TIMEOUT_SECS, DEFAULT_MAX_BACKPRESSURE, DEFAULT_MAX_PAYLOAD_SIZE,
    DEFAULT_SHUTDOWN_TIMEOUT_SECS,
};
use serde::{Deserialize, Serialize};

/// The `[server]` section.
///
/// ```
/// use pylon_config::ServerSection;
///
/// let section = ServerSection::default();
/// assert_eq!(section.idle_timeout_secs, 120);
/// assert_eq!(section.compression, "shared_compressor");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ServerSection {
    /// Bind host.
    #[serde(default = "default_host")]
    pub host: String,

    /// Maximum inbound message and envelope payload size in bytes.
    #[serde(default = "default_max_payload_size")]
    pub max_payload_size: usize,

    /// Buffered bytes above which sends are dropped.
    #[serde(default = "default_max_backpressure")]
    pub max_backpressure: usize,

    /// Idle timeout in seconds; 0 disables.
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,

    /// Maximum connection lifetime in minutes; 0 means unlimited.
    #[serde(default)]
    pub max_lifetime_minutes: u64,

    /// Ping idle connections automatically.
    #[serde(default = "default_true")]
    pub send_pings_automatically: bool,

    /// Close connections that exceed the backpressure limit.
    #[serde(default)]
    pub close_on_backpressure_limit: bool,

    /// Count outbound traffic as activity for the idle timeout.
    #[serde(default = "default_true")]
    pub reset_idle_timeout_on_send: bool,

    /// `disabled`, `shared_compressor` or `dedicated_compressor`.
    #[serde(default = "default_compression")]
    pub compression: String,

    /// Echo every inbound message back to its sender.
    #[serde(default)]
    pub echo: bool,

    /// Bounded wait for the listen socket to close when stopping, in seconds.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            max_payload_size: default_max_payload_size(),
            max_backpressure: default_max_backpressure(),
            idle_timeout_secs: default_idle_timeout(),
            max_lifetime_minutes: 0,
            send_pings_automatically: true,
            close_on_backpressure_limit: false,
            reset_idle_timeout_on_send: true,
            compression: default_compression(),
            echo: false,
            shutdown_timeout_secs: default_shutdown_timeout(),
        }
    }
}

/// The `[logging]` section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LoggingSection {
    /// Install a subscriber at all.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Filter directive, e.g. `info` or `pylon_server=debug,hyper=warn`.
    #[serde(default = "default_level")]
    pub level: String,

    /// JSON lines instead of human-readable output.
    #[serde(default = "default_true")]
    pub json: bool,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            enabled: true,
            level: default_level(),
            json: true,
        }
    }
}

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_max_payload_size() -> usize {
    DEFAULT_MAX_PAYLOAD_SIZE
}

fn default_max_backpressure() -> usize {
    DEFAULT_MAX_BACKPRESSURE
}

fn default_idle_timeout() -> u64 {
    DEFAULT_IDLE_TIMEOUT_SECS
}

fn default_shutdown_timeout() -> u64 {
    DEFAULT_SHUTDOWN_TIMEOUT_SECS
}

fn default_compression() -> String {
    "shared_compressor".to_string()
}

fn default_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_section_uses_defaults() {
        let section: ServerSection = toml::from_str("echo = true").unwrap();
        assert!(section.echo);
        assert_eq!(section.max_backpressure, DEFAULT_MAX_BACKPRESSURE);
        assert!(section.send_pings_automatically);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let result: Result<ServerSection, _> = toml::from_str("max_conections = 10");
        assert!(result.is_err());

        let result: Result<LoggingSection, _> = serde_json::from_str(r#"{"format": "json"}"#);
        assert!(result.is_err());
    }
}

//! FFI configuration types
//!
//! Configuration passed from the host when creating a server.

use std::os::raw::c_char;
use std::time::Duration;

use pylon_server::config::{
    DEFAULT_IDLE_TIMEOUT_SECS, DEFAULT_MAX_BACKPRESSURE, DEFAULT_MAX_PAYLOAD_SIZE,
    DEFAULT_SHUTDOWN_TIMEOUT_SECS,
};
use pylon_server::ServerConfig;

use crate::types::PylonCompression;

/// Server configuration.
///
/// `host` is borrowed and copied; null selects `0.0.0.0`. Start from
/// `pylon_server_config_default()` and override fields as needed.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct PylonServerConfig {
    /// Bind host (null for the default)
    pub host: *const c_char,
    /// Maximum inbound message and event payload size in bytes
    pub max_payload_size: usize,
    /// Buffered bytes above which sends are dropped
    pub max_backpressure: usize,
    /// Idle timeout in seconds, 0 disables
    pub idle_timeout_secs: u32,
    /// Connection lifetime limit in minutes, 0 means unlimited
    pub max_lifetime_minutes: u32,
    /// Ping idle connections automatically
    pub send_pings_automatically: bool,
    /// Close connections that exceed the backpressure limit
    pub close_on_backpressure_limit: bool,
    /// Count outbound traffic as activity for the idle timeout
    pub reset_idle_timeout_on_send: bool,
    /// Compression mode
    pub compression: PylonCompression,
    /// Echo every inbound message back to its sender
    pub echo: bool,
    /// Bounded wait when stopping, in seconds
    pub shutdown_timeout_secs: u32,
}

impl Default for PylonServerConfig {
    fn default() -> Self {
        Self {
            host: std::ptr::null(),
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
            max_backpressure: DEFAULT_MAX_BACKPRESSURE,
            idle_timeout_secs: DEFAULT_IDLE_TIMEOUT_SECS as u32,
            max_lifetime_minutes: 0,
            send_pings_automatically: true,
            close_on_backpressure_limit: false,
            reset_idle_timeout_on_send: true,
            compression: PylonCompression::Shared,
            echo: false,
            shutdown_timeout_secs: DEFAULT_SHUTDOWN_TIMEOUT_SECS as u32,
        }
    }
}

impl TryFrom<&PylonServerConfig> for ServerConfig {
    type Error = String;

    fn try_from(config: &PylonServerConfig) -> Result<Self, Self::Error> {
        if config.max_payload_size == 0 {
            return Err("max_payload_size must be greater than 0".to_string());
        }
        if config.max_backpressure == 0 {
            return Err("max_backpressure must be greater than 0".to_string());
        }

        let mut builder = ServerConfig::builder()
            .max_payload_size(config.max_payload_size)
            .max_backpressure(config.max_backpressure)
            .idle_timeout_secs(u64::from(config.idle_timeout_secs))
            .max_lifetime_minutes(u64::from(config.max_lifetime_minutes))
            .send_pings_automatically(config.send_pings_automatically)
            .close_on_backpressure_limit(config.close_on_backpressure_limit)
            .reset_idle_timeout_on_send(config.reset_idle_timeout_on_send)
            .compression(config.compression.into())
            .echo(config.echo)
            .shutdown_timeout(Duration::from_secs(u64::from(config.shutdown_timeout_secs)));

        if !config.host.is_null() {
            let host = crate::c_str_to_str(config.host).ok_or("host is not valid UTF-8")?;
            builder = builder.host(host);
        }

        Ok(builder.build())
    }
}

/// Returns a configuration populated with the defaults.
#[no_mangle]
pub extern "C" fn pylon_server_config_default() -> PylonServerConfig {
    PylonServerConfig::default()
}

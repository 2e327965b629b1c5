//! The root configuration type.

use std::str::FromStr;
use std::time::Duration;

use pylon_server::{CompressionMode, ServerConfig};
use pylon_telemetry::logging::{create_env_filter, LogConfig};
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};
use crate::schema::{LoggingSection, ServerSection};

/// Complete pylon configuration.
///
/// ```
/// use pylon_config::PylonConfig;
///
/// let config = PylonConfig::default();
/// assert!(config.validate().is_ok());
/// assert_eq!(config.server_config().unwrap().host(), "0.0.0.0");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(deny_unknown_fields)]
pub struct PylonConfig {
    /// Server settings.
    #[serde(default)]
    pub server: ServerSection,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingSection,
}

impl PylonConfig {
    /// Local development preset: loopback host, debug logs, readable output.
    #[must_use]
    pub fn development() -> Self {
        let mut config = Self::default();
        config.server.host = "127.0.0.1".to_string();
        config.logging.level = "debug".to_string();
        config.logging.json = false;
        config
    }

    /// Checks ranges and enumerations.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.server.host.trim().is_empty() {
            return Err(ConfigError::invalid_value("server.host", "must not be empty"));
        }
        if self.server.max_payload_size == 0 {
            return Err(ConfigError::invalid_value(
                "server.max_payload_size",
                "must be greater than 0",
            ));
        }
        if self.server.max_backpressure == 0 {
            return Err(ConfigError::invalid_value(
                "server.max_backpressure",
                "must be greater than 0",
            ));
        }
        self.compression()?;
        if let Err(e) = create_env_filter(&self.logging.level) {
            return Err(ConfigError::invalid_value("logging.level", e.to_string()));
        }
        Ok(())
    }

    /// The parsed compression mode.
    pub fn compression(&self) -> ConfigResult<CompressionMode> {
        CompressionMode::from_str(&self.server.compression)
            .map_err(|e| ConfigError::invalid_value("server.compression", e))
    }

    /// Builds the server configuration.
    pub fn server_config(&self) -> ConfigResult<ServerConfig> {
        let server = &self.server;
        Ok(ServerConfig::builder()
            .host(server.host.clone())
            .max_payload_size(server.max_payload_size)
            .max_backpressure(server.max_backpressure)
            .idle_timeout_secs(server.idle_timeout_secs)
            .max_lifetime_minutes(server.max_lifetime_minutes)
            .send_pings_automatically(server.send_pings_automatically)
            .close_on_backpressure_limit(server.close_on_backpressure_limit)
            .reset_idle_timeout_on_send(server.reset_idle_timeout_on_send)
            .compression(self.compression()?)
            .echo(server.echo)
            .shutdown_timeout(Duration::from_secs(server.shutdown_timeout_secs))
            .build())
    }

    /// Builds the logging configuration.
    #[must_use]
    pub fn log_config(&self) -> LogConfig {
        LogConfig {
            enabled: self.logging.enabled,
            ..LogConfig::with_level(self.logging.level.clone(), self.logging.json)
        }
    }
}

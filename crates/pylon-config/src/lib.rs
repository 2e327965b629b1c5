//! Configuration for pylon servers.
//!
//! Settings come from three layers, later ones winning: built-in defaults,
//! a TOML or JSON file, then `PYLON__SECTION__KEY` environment variables.
//! Unknown fields in files are rejected.
//!
//! # Example
//!
//! ```no_run
//! use pylon_config::ConfigLoader;
//! use pylon_server::Server;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ConfigLoader::new()
//!     .with_dotenv()?
//!     .with_optional_file("pylon.toml")?
//!     .with_env_prefix("PYLON")
//!     .load()?;
//!
//! pylon_telemetry::init_logging(&config.log_config())?;
//! let server = Server::new(config.server_config()?)?;
//! # drop(server);
//! # Ok(())
//! # }
//! ```
//!
//! # File Format
//!
//! ```toml
//! [server]
//! host = "0.0.0.0"
//! max_payload_size = 16777216
//! max_backpressure = 65536
//! idle_timeout_secs = 120
//! max_lifetime_minutes = 0
//! send_pings_automatically = true
//! close_on_backpressure_limit = false
//! reset_idle_timeout_on_send = true
//! compression = "shared_compressor"
//! echo = false
//! shutdown_timeout_secs = 5
//!
//! [logging]
//! enabled = true
//! level = "info"
//! json = true
//! ```

#![warn(missing_docs)]

mod config;
mod error;
mod loader;
mod schema;

pub use config::PylonConfig;
pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, DEFAULT_ENV_PREFIX};
pub use schema::{LoggingSection, ServerSection};

//! FFI error handling
//!
//! Error types and conversion for the FFI boundary.

use pylon_config::ConfigError;
use pylon_core::CoreError;
use pylon_server::ServerError;
use pylon_telemetry::TelemetryError;
use thiserror::Error;

use crate::types::PylonError;

/// Internal error type for FFI operations
#[derive(Error, Debug)]
pub enum FfiError {
    /// Configuration rejected
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Null pointer argument
    #[error("Null pointer provided for: {0}")]
    NullPointer(&'static str),

    /// Non-UTF-8 string argument
    #[error("Invalid UTF-8 string: {0}")]
    InvalidUtf8(String),

    /// Malformed connection or request id
    #[error("Invalid id: {0}")]
    InvalidId(String),

    /// Out-of-range argument
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The server could not be created
    #[error("Server start failed: {0}")]
    ServerStart(String),

    /// Logging initialization failed
    #[error("Logging initialization failed: {0}")]
    Logging(String),
}

impl From<&FfiError> for PylonError {
    fn from(err: &FfiError) -> Self {
        match err {
            FfiError::InvalidConfig(_) => PylonError::InvalidConfig,
            FfiError::NullPointer(_) => PylonError::NullPointer,
            FfiError::InvalidUtf8(_) => PylonError::InvalidUtf8,
            FfiError::InvalidId(_) => PylonError::InvalidId,
            FfiError::InvalidArgument(_) => PylonError::InvalidArgument,
            FfiError::ServerStart(_) => PylonError::ServerStartError,
            FfiError::Logging(_) => PylonError::LoggingError,
        }
    }
}

impl From<FfiError> for PylonError {
    fn from(err: FfiError) -> Self {
        PylonError::from(&err)
    }
}

impl From<ConfigError> for FfiError {
    fn from(err: ConfigError) -> Self {
        Self::InvalidConfig(err.to_string())
    }
}

impl From<ServerError> for FfiError {
    fn from(err: ServerError) -> Self {
        Self::ServerStart(err.to_string())
    }
}

impl From<CoreError> for FfiError {
    fn from(err: CoreError) -> Self {
        Self::InvalidId(err.to_string())
    }
}

impl From<TelemetryError> for FfiError {
    fn from(err: TelemetryError) -> Self {
        Self::Logging(err.to_string())
    }
}

/// Records `err` as the last error and returns its code.
pub(crate) fn fail(err: FfiError) -> PylonError {
    let code = PylonError::from(&err);
    crate::set_last_error(err);
    code
}

/// Converts a result to an error code, setting the last error on failure.
pub(crate) fn result_to_error<T>(result: Result<T, FfiError>) -> (Option<T>, PylonError) {
    match result {
        Ok(value) => (Some(value), PylonError::Ok),
        Err(err) => (None, fail(err)),
    }
}

//! Server error types.

use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors raised while managing the listen socket.
///
/// These never reach the host as panics; the server logs them and reports a
/// boolean result plus an ERROR envelope.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind the listen socket.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// The address that could not be bound.
        addr: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A command was issued in the wrong server state.
    #[error("invalid server state: {0}")]
    InvalidState(String),

    /// Failed to build the engine runtime.
    #[error("failed to start engine runtime: {0}")]
    Runtime(#[source] std::io::Error),
}

impl ServerError {
    /// Creates a new bind error.
    pub fn bind(addr: impl Into<String>, source: std::io::Error) -> Self {
        Self::Bind {
            addr: addr.into(),
            source,
        }
    }

    /// Creates a new invalid state error.
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState(message.into())
    }

    /// Returns `true` for the one fatal condition, a failed bind.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Bind { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_error_display() {
        let err = ServerError::bind(
            "0.0.0.0:80",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert_eq!(err.to_string(), "failed to bind 0.0.0.0:80: denied");
        assert!(err.is_fatal());
    }

    #[test]
    fn test_invalid_state_not_fatal() {
        let err = ServerError::invalid_state("not listening");
        assert!(!err.is_fatal());
        assert_eq!(err.to_string(), "invalid server state: not listening");
    }
}

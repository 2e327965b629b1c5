//! Error types for pylon core.

use thiserror::Error;

/// Result type alias using [`CoreError`].
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors raised while converting foreign values into core types.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// The text is not a valid correlation identifier.
    #[error("invalid identifier '{value}': {reason}")]
    InvalidId {
        /// The rejected text.
        value: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The integer does not name an event kind.
    #[error("unknown event kind discriminant: {0}")]
    UnknownEventKind(i32),
}

impl CoreError {
    /// Creates a new invalid identifier error.
    pub fn invalid_id(value: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidId {
            value: value.into(),
            reason: reason.into(),
        }
    }
}

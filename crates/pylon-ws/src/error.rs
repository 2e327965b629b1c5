//! Error types for WebSocket operations.

use std::fmt;
use thiserror::Error;

/// Result type for WebSocket operations.
pub type WsResult<T> = Result<T, WsError>;

/// Errors that can occur during WebSocket operations.
#[derive(Debug, Error)]
pub enum WsError {
    /// The HTTP request was not a valid WebSocket upgrade request.
    #[error("not a WebSocket upgrade request: {reason}")]
    NotWebSocketRequest {
        /// Reason why the request is not a valid WebSocket upgrade.
        reason: String,
    },

    /// A text message was not valid UTF-8.
    #[error("text message is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    /// Failed to build the handshake response.
    #[error("failed to build upgrade response: {0}")]
    Http(#[from] http::Error),

    /// Tungstenite error.
    #[error("tungstenite error: {0}")]
    Tungstenite(#[from] tungstenite::Error),
}

impl WsError {
    /// Create a new "not a WebSocket request" error.
    pub fn not_websocket(reason: impl Into<String>) -> Self {
        Self::NotWebSocketRequest {
            reason: reason.into(),
        }
    }
}

/// Close codes this layer sends or reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum CloseCode {
    /// Normal closure (1000).
    Normal = 1000,
    /// Going away (1001).
    GoingAway = 1001,
    /// Protocol error (1002).
    Protocol = 1002,
    /// No status received (1005).
    NoStatus = 1005,
    /// Abnormal closure (1006). Never sent on the wire.
    Abnormal = 1006,
    /// Policy violation (1008).
    PolicyViolation = 1008,
    /// Message too big (1009).
    MessageTooBig = 1009,
    /// Internal error (1011).
    InternalError = 1011,
}

impl CloseCode {
    /// Convert from a u16 code.
    pub fn from_u16(code: u16) -> Option<Self> {
        match code {
            1000 => Some(Self::Normal),
            1001 => Some(Self::GoingAway),
            1002 => Some(Self::Protocol),
            1005 => Some(Self::NoStatus),
            1006 => Some(Self::Abnormal),
            1008 => Some(Self::PolicyViolation),
            1009 => Some(Self::MessageTooBig),
            1011 => Some(Self::InternalError),
            _ => None,
        }
    }

    /// Get the u16 value of this close code.
    pub fn as_u16(self) -> u16 {
        self as u16
    }
}

impl fmt::Display for CloseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Normal => "Normal",
            Self::GoingAway => "GoingAway",
            Self::Protocol => "Protocol",
            Self::NoStatus => "NoStatus",
            Self::Abnormal => "Abnormal",
            Self::PolicyViolation => "PolicyViolation",
            Self::MessageTooBig => "MessageTooBig",
            Self::InternalError => "InternalError",
        };
        write!(f, "{} ({})", name, self.as_u16())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ws_error_not_websocket() {
        let err = WsError::not_websocket("missing upgrade header");
        assert!(matches!(err, WsError::NotWebSocketRequest { .. }));
        assert!(err.to_string().contains("missing upgrade header"));
    }

    #[test]
    fn test_invalid_utf8_from() {
        let err: WsError = String::from_utf8(vec![0xff, 0xfe]).unwrap_err().into();
        assert!(matches!(err, WsError::InvalidUtf8(_)));
    }

    #[test]
    fn test_close_code_from_u16() {
        assert_eq!(CloseCode::from_u16(1000), Some(CloseCode::Normal));
        assert_eq!(CloseCode::from_u16(1008), Some(CloseCode::PolicyViolation));
        assert_eq!(CloseCode::from_u16(4000), None);
    }

    #[test]
    fn test_close_code_display() {
        assert_eq!(CloseCode::GoingAway.to_string(), "GoingAway (1001)");
    }
}

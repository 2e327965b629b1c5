//! Frames queued by the host for a connection's session task.

use bytes::Bytes;
use tungstenite::protocol::CloseFrame;
use tungstenite::Message;

use crate::error::{CloseCode, WsResult};

/// One outbound frame waiting for its session task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// A text frame. Always valid UTF-8.
    Text(String),
    /// A binary frame.
    Binary(Bytes),
    /// A close frame; the session starts the closing handshake.
    Close {
        /// The close code.
        code: CloseCode,
        /// The close reason.
        reason: String,
    },
}

impl Outbound {
    /// Creates a text frame, rejecting bytes that are not UTF-8.
    pub fn text(data: impl Into<Vec<u8>>) -> WsResult<Self> {
        Ok(Self::Text(String::from_utf8(data.into())?))
    }

    /// Creates a binary frame.
    pub fn binary(data: impl Into<Bytes>) -> Self {
        Self::Binary(data.into())
    }

    /// Creates a close frame.
    pub fn close(code: CloseCode, reason: impl Into<String>) -> Self {
        Self::Close {
            code,
            reason: reason.into(),
        }
    }

    /// Bytes this frame adds to the connection's buffered amount.
    pub fn len(&self) -> usize {
        match self {
            Self::Text(text) => text.len(),
            Self::Binary(data) => data.len(),
            Self::Close { reason, .. } => 2 + reason.len(),
        }
    }

    /// Returns `true` if the frame carries no payload.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` for close frames.
    pub fn is_close(&self) -> bool {
        matches!(self, Self::Close { .. })
    }

    /// Converts into a tungstenite message.
    pub fn into_message(self) -> Message {
        match self {
            Self::Text(text) => Message::Text(text.into()),
            Self::Binary(data) => Message::Binary(data),
            Self::Close { code, reason } => Message::Close(Some(CloseFrame {
                code: code.as_u16().into(),
                reason: reason.into(),
            })),
        }
    }
}

//! Result statuses for imperative commands.
//!
//! Commands on stale or unknown identifiers never fail with an error; they
//! report one of these values instead.

use serde::{Deserialize, Serialize};

/// Outcome of sending one message to one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(i32)]
pub enum SendStatus {
    /// The message was queued and buffered bytes are within the limit.
    Success = 0,
    /// The message was queued but buffered bytes now exceed the limit.
    Backpressure = 1,
    /// The message was not queued.
    Dropped = 2,
    /// The connection id is unknown or faded.
    NotFound = 3,
}

impl SendStatus {
    /// Returns the lower-case name used in logs and metric labels.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Backpressure => "backpressure",
            Self::Dropped => "dropped",
            Self::NotFound => "not_found",
        }
    }

    /// Returns `true` if the message was queued for delivery.
    #[must_use]
    pub const fn is_delivered(self) -> bool {
        matches!(self, Self::Success | Self::Backpressure)
    }
}

/// Aggregate outcome of a broadcast.
///
/// `Dropped` if at least one live recipient failed; recipients that were
/// faded are skipped and do not count as failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(i32)]
pub enum BroadcastStatus {
    /// Every live recipient accepted the message.
    Success = 0,
    /// At least one live recipient failed.
    Dropped = 1,
    /// There were no live recipients.
    NoRecipients = 2,
}

impl BroadcastStatus {
    /// Folds one recipient outcome into the aggregate.
    #[must_use]
    pub const fn merge(self, status: SendStatus) -> Self {
        match (self, status.is_delivered()) {
            (Self::Dropped, _) | (_, false) => Self::Dropped,
            _ => Self::Success,
        }
    }
}

/// Two-bit response progress: bit 0 = sent, bit 1 = ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(i32)]
pub enum ResponseStatus {
    /// The request id is unknown, ended or aborted.
    NoSuchRequest = -1,
    /// Nothing was sent; retry once the response is writable.
    NotSent = 0,
    /// Data was sent and the response is still open.
    SentNotEnded = 1,
    /// Data was sent and the response is complete.
    SentAndEnded = 3,
}

impl ResponseStatus {
    /// Returns `true` if the call flushed data.
    #[must_use]
    pub const fn is_sent(self) -> bool {
        matches!(self, Self::SentNotEnded | Self::SentAndEnded)
    }

    /// Returns `true` if the response is complete.
    #[must_use]
    pub const fn is_ended(self) -> bool {
        matches!(self, Self::SentAndEnded)
    }
}

/// Outcome of setting response head metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(i32)]
pub enum RequestStatus {
    /// The value was recorded.
    Ok = 0,
    /// The request id is unknown, ended or aborted.
    NoSuchRequest = 1,
    /// The head has already been flushed and can no longer change.
    HeadersSent = 2,
    /// The status line, header name or header value is malformed.
    InvalidValue = 3,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_status_bits() {
        assert_eq!(ResponseStatus::NotSent as i32, 0b00);
        assert_eq!(ResponseStatus::SentNotEnded as i32, 0b01);
        assert_eq!(ResponseStatus::SentAndEnded as i32, 0b11);
        assert!(ResponseStatus::SentAndEnded.is_sent());
        assert!(!ResponseStatus::SentNotEnded.is_ended());
        assert!(!ResponseStatus::NoSuchRequest.is_sent());
    }

    #[test]
    fn test_broadcast_merge() {
        let all_ok = [SendStatus::Success, SendStatus::Backpressure]
            .into_iter()
            .fold(BroadcastStatus::Success, BroadcastStatus::merge);
        assert_eq!(all_ok, BroadcastStatus::Success);

        let one_failed = [SendStatus::Success, SendStatus::Dropped, SendStatus::Success]
            .into_iter()
            .fold(BroadcastStatus::Success, BroadcastStatus::merge);
        assert_eq!(one_failed, BroadcastStatus::Dropped);
    }

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_string(&SendStatus::Backpressure).unwrap();
        assert_eq!(json, "\"backpressure\"");
    }
}

//! FFI-safe type definitions
//!
//! All types in this module use `#[repr(C)]` so their layout is stable for
//! the host.

use std::os::raw::c_char;

use pylon_server::{CompressionMode, ServerState};

/// Capacity of [`PylonEvent::correlation_id`], including the NUL.
///
/// A hyphenated UUID is 36 bytes; `"server"` is 6.
pub const PYLON_ID_CAPACITY: usize = 40;

/// Error codes returned by pylon FFI functions
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PylonError {
    /// Success - no error
    Ok = 0,
    /// Configuration rejected
    InvalidConfig = 1,
    /// Null pointer provided where non-null required
    NullPointer = 2,
    /// Invalid UTF-8 string
    InvalidUtf8 = 3,
    /// Connection or request id is not a valid id
    InvalidId = 4,
    /// Argument out of range, e.g. an unknown verb
    InvalidArgument = 5,
    /// Engine runtime could not be created
    ServerStartError = 6,
    /// Logging could not be initialized
    LoggingError = 7,
    /// Internal error
    Internal = 99,
}

impl From<PylonError> for i32 {
    fn from(err: PylonError) -> Self {
        err as i32
    }
}

/// Opaque handle to a pylon server
///
/// Created with `pylon_server_new()` or `pylon_server_from_file()` and freed
/// with `pylon_server_free()`.
#[repr(C)]
pub struct PylonServer {
    _private: [u8; 0],
}

/// Compression mode as seen from C.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PylonCompression {
    /// No compression
    Disabled = 0,
    /// One compressor shared by all connections
    Shared = 1,
    /// One compressor per connection
    Dedicated = 2,
}

impl From<PylonCompression> for CompressionMode {
    fn from(mode: PylonCompression) -> Self {
        match mode {
            PylonCompression::Disabled => Self::Disabled,
            PylonCompression::Shared => Self::SharedCompressor,
            PylonCompression::Dedicated => Self::DedicatedCompressor,
        }
    }
}

/// Server state as seen from C.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PylonServerState {
    /// Not listening
    Idle = 0,
    /// Accepting connections
    Listening = 1,
    /// Stop in progress
    ShuttingDown = 2,
}

impl From<ServerState> for PylonServerState {
    fn from(state: ServerState) -> Self {
        match state {
            ServerState::Idle => Self::Idle,
            ServerState::Listening => Self::Listening,
            ServerState::ShuttingDown => Self::ShuttingDown,
        }
    }
}

/// One dequeued event.
///
/// The caller owns `payload` and sets `payload_capacity` before each call;
/// pylon fills the remaining fields.
#[repr(C)]
#[derive(Debug)]
pub struct PylonEvent {
    /// `EventKind` discriminant (OPEN=0 ... ERROR=10)
    pub kind: i32,
    /// NUL-terminated correlation id
    pub correlation_id: [c_char; PYLON_ID_CAPACITY],
    /// Caller-owned payload buffer (may be null when capacity is 0)
    pub payload: *mut u8,
    /// Size of `payload` in bytes
    pub payload_capacity: usize,
    /// Bytes written to `payload`
    pub payload_len: usize,
    /// Whether the payload or id was cut to fit
    pub truncated: bool,
}

impl Default for PylonEvent {
    fn default() -> Self {
        Self {
            kind: 0,
            correlation_id: [0; PYLON_ID_CAPACITY],
            payload: std::ptr::null_mut(),
            payload_capacity: 0,
            payload_len: 0,
            truncated: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(PylonError::Ok as i32, 0);
        assert_eq!(i32::from(PylonError::InvalidId), 4);
        assert_eq!(PylonError::Internal as i32, 99);
    }

    #[test]
    fn test_compression_mapping() {
        assert_eq!(
            CompressionMode::from(PylonCompression::Disabled),
            CompressionMode::Disabled
        );
        assert_eq!(
            CompressionMode::from(PylonCompression::Dedicated),
            CompressionMode::DedicatedCompressor
        );
    }

    #[test]
    fn test_event_default() {
        let event = PylonEvent::default();
        assert!(event.payload.is_null());
        assert_eq!(event.payload_capacity, 0);
        assert!(event.correlation_id.iter().all(|b| *b == 0));
    }

    #[test]
    fn test_id_fits() {
        assert!(PYLON_ID_CAPACITY > 36);
    }
}

//! Event polling
//!
//! The host drains events on its own thread. An empty queue yields the
//! sentinel event: kind ERROR, correlation id `"server"`, empty payload.

use pylon_core::buffer::{copy_bytes, copy_nul_terminated};
use pylon_server::Server;
use tracing::warn;

use crate::error::{fail, FfiError};
use crate::server_ref;
use crate::types::{PylonEvent, PylonServer};

/// Whether at least one event is waiting
///
/// # Safety
///
/// `server` must be null or a valid server pointer.
#[no_mangle]
pub unsafe extern "C" fn pylon_has_events(server: *const PylonServer) -> bool {
    server_ref(server).is_ok_and(Server::has_events)
}

/// Number of waiting events
///
/// # Safety
///
/// `server` must be null or a valid server pointer.
#[no_mangle]
pub unsafe extern "C" fn pylon_num_events(server: *const PylonServer) -> usize {
    server_ref(server).map_or(0, Server::num_events)
}

/// Dequeue the oldest event into `event`
///
/// Set `event.payload` and `event.payload_capacity` before the call. The
/// correlation id and payload are cut to fit and `event.truncated` reports
/// it. Returns false when the queue was empty (the sentinel is written) or
/// an argument was invalid.
///
/// # Safety
///
/// - `server` must be a valid server pointer
/// - `event` must point to a writable `PylonEvent`
/// - `event.payload` must be valid for `event.payload_capacity` bytes
#[no_mangle]
pub unsafe extern "C" fn pylon_next_event(server: *mut PylonServer, event: *mut PylonEvent) -> bool {
    let server = match server_ref(server) {
        Ok(server) => server,
        Err(e) => {
            fail(e);
            return false;
        }
    };
    if event.is_null() {
        fail(FfiError::NullPointer("event"));
        return false;
    }
    let event = &mut *event;
    if event.payload.is_null() && event.payload_capacity > 0 {
        fail(FfiError::NullPointer("event.payload"));
        return false;
    }

    let envelope = server.pop_event();
    let sentinel = envelope.is_empty_sentinel();
    let capped = envelope.truncated();
    let (kind, correlation_id, payload) = envelope.into_parts();

    let id_buf = std::slice::from_raw_parts_mut(
        event.correlation_id.as_mut_ptr().cast::<u8>(),
        event.correlation_id.len(),
    );
    let id_copy = copy_nul_terminated(correlation_id.as_bytes(), id_buf);

    let payload_copy = if event.payload_capacity == 0 {
        copy_bytes(&payload, &mut [])
    } else {
        let dest = std::slice::from_raw_parts_mut(event.payload, event.payload_capacity);
        copy_bytes(&payload, dest)
    };
    if payload_copy.truncated {
        warn!(
            kind = %kind,
            correlation_id = %correlation_id,
            size = payload.len(),
            capacity = event.payload_capacity,
            "Event payload truncated to caller buffer"
        );
    }

    event.kind = kind.as_i32();
    event.payload_len = payload_copy.copied;
    event.truncated = capped || id_copy.truncated || payload_copy.truncated;

    !sentinel
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PylonServerConfig;
    use crate::server::{pylon_server_free, pylon_server_new, pylon_start_listening, pylon_stop_listening};
    use pylon_core::EventKind;
    use std::ffi::CStr;

    fn id_of(event: &PylonEvent) -> String {
        unsafe { CStr::from_ptr(event.correlation_id.as_ptr()) }
            .to_str()
            .unwrap()
            .to_string()
    }

    #[test]
    fn test_empty_queue_sentinel() {
        let config = PylonServerConfig::default();
        let server = unsafe { pylon_server_new(&config) };
        let mut payload = [0u8; 16];
        let mut event = PylonEvent {
            payload: payload.as_mut_ptr(),
            payload_capacity: payload.len(),
            ..PylonEvent::default()
        };

        unsafe {
            assert!(!pylon_has_events(server));
            assert_eq!(pylon_num_events(server), 0);
            assert!(!pylon_next_event(server, &mut event));
            pylon_server_free(server);
        }
        assert_eq!(event.kind, EventKind::Error.as_i32());
        assert_eq!(id_of(&event), "server");
        assert_eq!(event.payload_len, 0);
        assert!(!event.truncated);
    }

    #[test]
    fn test_listen_event_and_truncation() {
        let config = PylonServerConfig::default();
        let server = unsafe { pylon_server_new(&config) };
        let mut payload = [0u8; 2];
        let mut event = PylonEvent {
            payload: payload.as_mut_ptr(),
            payload_capacity: payload.len(),
            ..PylonEvent::default()
        };

        unsafe {
            assert!(pylon_start_listening(server, 0));
            assert_eq!(pylon_num_events(server), 1);
            assert!(pylon_next_event(server, &mut event));
        }
        assert_eq!(event.kind, EventKind::Listen.as_i32());
        assert_eq!(id_of(&event), "server");
        assert_eq!(event.payload_len, 2);
        // Ephemeral ports have at least four digits.
        assert!(event.truncated);

        unsafe {
            assert!(pylon_stop_listening(server));
            event.payload_capacity = 0;
            event.payload = std::ptr::null_mut();
            assert!(pylon_next_event(server, &mut event));
            assert_eq!(event.kind, EventKind::Shutdown.as_i32());
            pylon_server_free(server);
        }
    }

    #[test]
    fn test_null_event() {
        let config = PylonServerConfig::default();
        let server = unsafe { pylon_server_new(&config) };
        unsafe {
            assert!(!pylon_next_event(server, std::ptr::null_mut()));
            pylon_server_free(server);
        }
    }
}

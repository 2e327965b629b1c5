//! # Pylon FFI
//!
//! C ABI for driving a pylon server from a single-threaded host.
//!
//! ## Overview
//!
//! The host creates a server, registers routes, starts listening and then
//! polls. Everything the engine observes arrives as events pulled with
//! `pylon_next_event()`; everything the host wants done is an imperative
//! call that returns a status value.
//!
//! ## Safety
//!
//! Every function taking a pointer is `unsafe`. The caller must ensure:
//!
//! - Pointers are either null or valid for the stated length
//! - Strings are NUL-terminated
//! - A server handle is not used after `pylon_server_free()`
//!
//! Null pointers and invalid UTF-8 never crash; they return an error code or
//! a not-found status, and `pylon_last_error()` describes the problem.
//!
//! ## Memory Management
//!
//! - Strings and byte buffers passed TO pylon are borrowed and copied
//! - Output buffers are owned by the caller and never grown
//! - Server handles must be freed with `pylon_server_free`
//!
//! ## Example (C)
//!
//! ```c
//! #include <pylon.h>
//!
//! int main(void) {
//!     PylonServerConfig config = pylon_server_config_default();
//!     PylonServer *server = pylon_server_new(&config);
//!     pylon_add_route(server, 8, "/ws");
//!     pylon_start_listening(server, 9001);
//!
//!     uint8_t payload[4096];
//!     PylonEvent event = {0};
//!     for (;;) {
//!         event.payload = payload;
//!         event.payload_capacity = sizeof payload;
//!         if (pylon_next_event(server, &event)) {
//!             /* dispatch on event.kind */
//!         }
//!     }
//! }
//! ```

#![allow(unsafe_code)] // FFI requires unsafe
#![allow(clippy::missing_safety_doc)] // Safety docs in module-level

mod config;
mod error;
mod events;
mod messaging;
mod request;
mod response;
mod server;
mod types;

pub use config::{pylon_server_config_default, PylonServerConfig};
pub use error::FfiError;
pub use events::{pylon_has_events, pylon_next_event, pylon_num_events};
pub use messaging::{
    pylon_broadcast_binary, pylon_broadcast_compressed_text, pylon_broadcast_text,
    pylon_disconnect, pylon_num_connected_clients, pylon_purge, pylon_send_binary,
    pylon_send_compressed_text, pylon_send_text,
};
pub use request::{
    pylon_get_request_endpoint, pylon_get_request_header, pylon_get_request_headers,
    pylon_get_request_method, pylon_get_request_query, pylon_get_request_url, pylon_has_request,
};
pub use response::{
    pylon_end_response, pylon_try_end_response, pylon_write_response,
    pylon_write_response_header, pylon_write_response_status,
};
pub use server::{
    pylon_add_route, pylon_local_port, pylon_server_free, pylon_server_from_file,
    pylon_server_new, pylon_server_state, pylon_start_listening, pylon_stop_listening,
};
pub use types::{
    PylonCompression, PylonError, PylonEvent, PylonServer, PylonServerState, PYLON_ID_CAPACITY,
};

use std::ffi::CStr;
use std::os::raw::c_char;
use std::str::FromStr;
use std::sync::OnceLock;

use parking_lot::Mutex;
use pylon_core::CoreError;
use pylon_server::Server;
use pylon_telemetry::{init_logging, LogConfig};

use crate::error::FfiError as Error;

/// Global last error message for FFI error reporting
static LAST_ERROR: OnceLock<Mutex<Option<String>>> = OnceLock::new();

/// Set the last error message
pub(crate) fn set_last_error(err: impl std::fmt::Display) {
    let message = err.to_string();
    tracing::debug!(error = %message, "FFI call failed");
    let lock = LAST_ERROR.get_or_init(|| Mutex::new(None));
    *lock.lock() = Some(message);
}

/// Get the last error message as a C string
///
/// # Safety
///
/// The returned pointer is valid until the next call that sets an error.
/// The caller must not free it. Returns null when no error was recorded.
#[no_mangle]
pub unsafe extern "C" fn pylon_last_error() -> *const c_char {
    static ERROR_BUFFER: OnceLock<Mutex<Vec<u8>>> = OnceLock::new();

    let lock = LAST_ERROR.get_or_init(|| Mutex::new(None));
    let error = lock.lock();

    match error.as_ref() {
        Some(msg) => {
            let buffer = ERROR_BUFFER.get_or_init(|| Mutex::new(Vec::new()));
            let mut buf = buffer.lock();
            buf.clear();
            buf.extend(msg.bytes().filter(|b| *b != 0));
            buf.push(0);
            buf.as_ptr().cast()
        }
        None => std::ptr::null(),
    }
}

/// Returns the library version as a static C string.
#[no_mangle]
pub extern "C" fn pylon_version() -> *const c_char {
    concat!(env!("CARGO_PKG_VERSION"), "\0").as_ptr().cast()
}

/// Installs the global log subscriber.
///
/// `level` is a filter directive such as `"info"` or
/// `"pylon_server=debug,hyper=warn"`; null means `"info"`.
///
/// # Safety
///
/// `level` must be null or a valid NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn pylon_init_logging(level: *const c_char, json: bool) -> PylonError {
    let level = if level.is_null() {
        "info"
    } else {
        match c_str_to_str(level) {
            Some(level) => level,
            None => return error::fail(Error::InvalidUtf8("level".to_string())),
        }
    };

    let config = LogConfig::with_level(level, json);
    match init_logging(&config) {
        Ok(()) => PylonError::Ok,
        Err(e) => error::fail(e.into()),
    }
}

/// Converts a C string to `&str`.
///
/// Returns None if the pointer is null or the string is not valid UTF-8.
fn c_str_to_str<'a>(ptr: *const c_char) -> Option<&'a str> {
    if ptr.is_null() {
        return None;
    }
    unsafe { CStr::from_ptr(ptr).to_str().ok() }
}

/// Like [`c_str_to_str`], reporting which argument was bad.
fn required_str<'a>(ptr: *const c_char, name: &'static str) -> Result<&'a str, Error> {
    if ptr.is_null() {
        return Err(Error::NullPointer(name));
    }
    c_str_to_str(ptr).ok_or_else(|| Error::InvalidUtf8(name.to_string()))
}

/// Parses a connection or request id argument.
fn parse_id<T>(ptr: *const c_char, name: &'static str) -> Result<T, Error>
where
    T: FromStr<Err = CoreError>,
{
    Ok(required_str(ptr, name)?.parse()?)
}

/// Borrows a server handle.
fn server_ref<'a>(server: *const PylonServer) -> Result<&'a Server, Error> {
    if server.is_null() {
        return Err(Error::NullPointer("server"));
    }
    Ok(unsafe { &*server.cast::<Server>() })
}

/// Borrows `len` bytes; a null pointer is accepted only for an empty slice.
fn bytes_arg<'a>(data: *const u8, len: usize) -> Result<&'a [u8], Error> {
    if len == 0 {
        return Ok(&[]);
    }
    if data.is_null() {
        return Err(Error::NullPointer("data"));
    }
    Ok(unsafe { std::slice::from_raw_parts(data, len) })
}

/// Borrows a caller output buffer.
fn buffer_arg<'a>(buf: *mut c_char, capacity: usize) -> Result<&'a mut [u8], Error> {
    if buf.is_null() {
        return Err(Error::NullPointer("buffer"));
    }
    Ok(unsafe { std::slice::from_raw_parts_mut(buf.cast::<u8>(), capacity) })
}

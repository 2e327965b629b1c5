//! Response writing
//!
//! Malformed arguments report `NoSuchRequest` (or `InvalidValue` for head
//! metadata) and set the last error.

use std::os::raw::c_char;

use pylon_core::{RequestId, RequestStatus, ResponseStatus};
use pylon_server::Server;

use crate::error::{fail, FfiError};
use crate::types::PylonServer;
use crate::{bytes_arg, parse_id, required_str, server_ref};

fn target<'a>(
    server: *mut PylonServer,
    request_id: *const c_char,
) -> Result<(&'a Server, RequestId), FfiError> {
    let server = server_ref(server)?;
    let id = parse_id(request_id, "request_id")?;
    Ok((server, id))
}

unsafe fn with_body(
    server: *mut PylonServer,
    request_id: *const c_char,
    data: *const u8,
    len: usize,
    op: impl FnOnce(&Server, &RequestId, Vec<u8>) -> ResponseStatus,
) -> ResponseStatus {
    let args = target(server, request_id)
        .and_then(|(server, id)| Ok((server, id, bytes_arg(data, len)?.to_vec())));
    match args {
        Ok((server, id, body)) => op(server, &id, body),
        Err(e) => {
            fail(e);
            ResponseStatus::NoSuchRequest
        }
    }
}

/// Write a body chunk, flushing the head first if needed
///
/// # Safety
///
/// - `server` must be a valid server pointer
/// - `request_id` must be a valid NUL-terminated string
/// - `data` must be valid for `len` bytes (may be null when `len` is 0)
#[no_mangle]
pub unsafe extern "C" fn pylon_write_response(
    server: *mut PylonServer,
    request_id: *const c_char,
    data: *const u8,
    len: usize,
) -> ResponseStatus {
    with_body(server, request_id, data, len, |server, id, body| {
        server.write_response(id, body)
    })
}

/// Write a final chunk and complete the response
///
/// # Safety
///
/// Same requirements as `pylon_write_response`.
#[no_mangle]
pub unsafe extern "C" fn pylon_end_response(
    server: *mut PylonServer,
    request_id: *const c_char,
    data: *const u8,
    len: usize,
) -> ResponseStatus {
    with_body(server, request_id, data, len, |server, id, body| {
        server.end_response(id, body)
    })
}

/// Backpressure-aware write that ends once `total_size` bytes went out
///
/// Returns `NotSent` when the chunk does not fit; an HTTP_WRITABLE event
/// follows once the buffered bytes drain.
///
/// # Safety
///
/// Same requirements as `pylon_write_response`.
#[no_mangle]
pub unsafe extern "C" fn pylon_try_end_response(
    server: *mut PylonServer,
    request_id: *const c_char,
    data: *const u8,
    len: usize,
    total_size: usize,
) -> ResponseStatus {
    with_body(server, request_id, data, len, |server, id, body| {
        server.try_end_response(id, body, total_size)
    })
}

/// Set the status line, e.g. `"404 Not Found"`
///
/// # Safety
///
/// - `server` must be a valid server pointer
/// - `request_id` and `status` must be valid NUL-terminated strings
#[no_mangle]
pub unsafe extern "C" fn pylon_write_response_status(
    server: *mut PylonServer,
    request_id: *const c_char,
    status: *const c_char,
) -> RequestStatus {
    let (server, id) = match target(server, request_id) {
        Ok(target) => target,
        Err(e) => {
            fail(e);
            return RequestStatus::NoSuchRequest;
        }
    };
    match required_str(status, "status") {
        Ok(status) => server.write_response_status(&id, status),
        Err(e) => {
            fail(e);
            RequestStatus::InvalidValue
        }
    }
}

/// Add a response header
///
/// # Safety
///
/// - `server` must be a valid server pointer
/// - `request_id`, `name` and `value` must be valid NUL-terminated strings
#[no_mangle]
pub unsafe extern "C" fn pylon_write_response_header(
    server: *mut PylonServer,
    request_id: *const c_char,
    name: *const c_char,
    value: *const c_char,
) -> RequestStatus {
    let (server, id) = match target(server, request_id) {
        Ok(target) => target,
        Err(e) => {
            fail(e);
            return RequestStatus::NoSuchRequest;
        }
    };
    let header = required_str(name, "name").and_then(|name| Ok((name, required_str(value, "value")?)));
    match header {
        Ok((name, value)) => server.write_response_header(&id, name, value),
        Err(e) => {
            fail(e);
            RequestStatus::InvalidValue
        }
    }
}

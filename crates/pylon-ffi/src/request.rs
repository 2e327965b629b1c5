//! Request accessors
//!
//! Each accessor copies into a caller buffer, always NUL-terminates, and
//! never grows the buffer. They return false for an unknown request and on
//! truncation, except that `pylon_get_request_header` returns true for a
//! header that exists even when cut.

use std::os::raw::c_char;

use pylon_core::RequestId;
use pylon_server::RequestField;

use crate::error::{fail, FfiError};
use crate::types::PylonServer;
use crate::{buffer_arg, parse_id, required_str, server_ref};

unsafe fn copy_field<'a>(
    server: *const PylonServer,
    request_id: *const c_char,
    field: impl FnOnce() -> Result<RequestField<'a>, FfiError>,
    buf: *mut c_char,
    capacity: usize,
) -> bool {
    let result = (|| -> Result<bool, FfiError> {
        let dest = buffer_arg(buf, capacity)?;
        if let Some(first) = dest.first_mut() {
            *first = 0;
        }
        let server = server_ref(server)?;
        let id: RequestId = parse_id(request_id, "request_id")?;
        Ok(server.copy_request_field(&id, field()?, dest))
    })();

    result.unwrap_or_else(|e| {
        fail(e);
        false
    })
}

/// Whether the request is still open
///
/// # Safety
///
/// - `server` must be a valid server pointer
/// - `request_id` must be a valid NUL-terminated string
#[no_mangle]
pub unsafe extern "C" fn pylon_has_request(
    server: *const PylonServer,
    request_id: *const c_char,
) -> bool {
    let result = server_ref(server).and_then(|server| {
        let id: RequestId = parse_id(request_id, "request_id")?;
        Ok(server.has_request(&id))
    });
    result.unwrap_or_else(|e| {
        fail(e);
        false
    })
}

/// Copy the request method
///
/// # Safety
///
/// - `server` must be a valid server pointer
/// - `request_id` must be a valid NUL-terminated string
/// - `buf` must be valid for `capacity` bytes
#[no_mangle]
pub unsafe extern "C" fn pylon_get_request_method(
    server: *const PylonServer,
    request_id: *const c_char,
    buf: *mut c_char,
    capacity: usize,
) -> bool {
    copy_field(server, request_id, || Ok(RequestField::Method), buf, capacity)
}

/// Copy the request path
///
/// # Safety
///
/// Same requirements as `pylon_get_request_method`.
#[no_mangle]
pub unsafe extern "C" fn pylon_get_request_url(
    server: *const PylonServer,
    request_id: *const c_char,
    buf: *mut c_char,
    capacity: usize,
) -> bool {
    copy_field(server, request_id, || Ok(RequestField::Url), buf, capacity)
}

/// Copy the query string, without the leading `?`
///
/// # Safety
///
/// Same requirements as `pylon_get_request_method`.
#[no_mangle]
pub unsafe extern "C" fn pylon_get_request_query(
    server: *const PylonServer,
    request_id: *const c_char,
    buf: *mut c_char,
    capacity: usize,
) -> bool {
    copy_field(server, request_id, || Ok(RequestField::Query), buf, capacity)
}

/// Copy the matched route pattern
///
/// # Safety
///
/// Same requirements as `pylon_get_request_method`.
#[no_mangle]
pub unsafe extern "C" fn pylon_get_request_endpoint(
    server: *const PylonServer,
    request_id: *const c_char,
    buf: *mut c_char,
    capacity: usize,
) -> bool {
    copy_field(server, request_id, || Ok(RequestField::Endpoint), buf, capacity)
}

/// Copy one header value; the name is matched case-insensitively
///
/// # Safety
///
/// Same requirements as `pylon_get_request_method`, and `name` must be a
/// valid NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn pylon_get_request_header(
    server: *const PylonServer,
    request_id: *const c_char,
    name: *const c_char,
    buf: *mut c_char,
    capacity: usize,
) -> bool {
    copy_field(
        server,
        request_id,
        || Ok(RequestField::Header(required_str(name, "name")?)),
        buf,
        capacity,
    )
}

/// Copy every header as a JSON object of lower-cased names
///
/// # Safety
///
/// Same requirements as `pylon_get_request_method`.
#[no_mangle]
pub unsafe extern "C" fn pylon_get_request_headers(
    server: *const PylonServer,
    request_id: *const c_char,
    buf: *mut c_char,
    capacity: usize,
) -> bool {
    copy_field(server, request_id, || Ok(RequestField::AllHeaders), buf, capacity)
}

//! WebSocket sends, broadcasts and connection housekeeping
//!
//! A bad argument (null server, malformed id, null data) reports
//! `NotFound` or `Dropped` and sets the last error.

use std::os::raw::c_char;

use pylon_core::{BroadcastStatus, ConnectionId, SendStatus};
use pylon_server::Server;

use crate::error::{fail, FfiError};
use crate::types::PylonServer;
use crate::{bytes_arg, parse_id, server_ref};

#[derive(Clone, Copy)]
enum Frame {
    Text,
    Binary,
    CompressedText,
}

unsafe fn send(
    server: *mut PylonServer,
    id: *const c_char,
    data: *const u8,
    len: usize,
    frame: Frame,
) -> SendStatus {
    let target = server_ref(server).and_then(|server| {
        let id: ConnectionId = parse_id(id, "connection_id")?;
        Ok((server, id))
    });
    let (server, id) = match target {
        Ok(target) => target,
        Err(e) => {
            fail(e);
            return SendStatus::NotFound;
        }
    };
    let data = match bytes_arg(data, len) {
        Ok(data) => data,
        Err(e) => {
            fail(e);
            return SendStatus::Dropped;
        }
    };

    match frame {
        Frame::Text => server.send_text(&id, data),
        Frame::Binary => server.send_binary(&id, data.to_vec()),
        Frame::CompressedText => server.send_compressed_text(&id, data),
    }
}

unsafe fn broadcast(
    server: *mut PylonServer,
    data: *const u8,
    len: usize,
    frame: Frame,
) -> BroadcastStatus {
    let args = server_ref(server).and_then(|server| Ok((server, bytes_arg(data, len)?)));
    let (server, data) = match args {
        Ok(args) => args,
        Err(e) => {
            fail(e);
            return BroadcastStatus::Dropped;
        }
    };

    match frame {
        Frame::Text => server.broadcast_text(data),
        Frame::Binary => server.broadcast_binary(data.to_vec()),
        Frame::CompressedText => server.broadcast_compressed_text(data),
    }
}

/// Send a text message to one connection
///
/// `data` must be UTF-8; invalid text is `Dropped`.
///
/// # Safety
///
/// - `server` must be a valid server pointer
/// - `connection_id` must be a valid NUL-terminated string
/// - `data` must be valid for `len` bytes (may be null when `len` is 0)
#[no_mangle]
pub unsafe extern "C" fn pylon_send_text(
    server: *mut PylonServer,
    connection_id: *const c_char,
    data: *const u8,
    len: usize,
) -> SendStatus {
    send(server, connection_id, data, len, Frame::Text)
}

/// Send a binary message to one connection
///
/// # Safety
///
/// Same requirements as `pylon_send_text`.
#[no_mangle]
pub unsafe extern "C" fn pylon_send_binary(
    server: *mut PylonServer,
    connection_id: *const c_char,
    data: *const u8,
    len: usize,
) -> SendStatus {
    send(server, connection_id, data, len, Frame::Binary)
}

/// Send a text message marked for compression to one connection
///
/// # Safety
///
/// Same requirements as `pylon_send_text`.
#[no_mangle]
pub unsafe extern "C" fn pylon_send_compressed_text(
    server: *mut PylonServer,
    connection_id: *const c_char,
    data: *const u8,
    len: usize,
) -> SendStatus {
    send(server, connection_id, data, len, Frame::CompressedText)
}

/// Send a text message to every live connection
///
/// # Safety
///
/// - `server` must be a valid server pointer
/// - `data` must be valid for `len` bytes (may be null when `len` is 0)
#[no_mangle]
pub unsafe extern "C" fn pylon_broadcast_text(
    server: *mut PylonServer,
    data: *const u8,
    len: usize,
) -> BroadcastStatus {
    broadcast(server, data, len, Frame::Text)
}

/// Send a binary message to every live connection
///
/// # Safety
///
/// Same requirements as `pylon_broadcast_text`.
#[no_mangle]
pub unsafe extern "C" fn pylon_broadcast_binary(
    server: *mut PylonServer,
    data: *const u8,
    len: usize,
) -> BroadcastStatus {
    broadcast(server, data, len, Frame::Binary)
}

/// Send a text message marked for compression to every live connection
///
/// # Safety
///
/// Same requirements as `pylon_broadcast_text`.
#[no_mangle]
pub unsafe extern "C" fn pylon_broadcast_compressed_text(
    server: *mut PylonServer,
    data: *const u8,
    len: usize,
) -> BroadcastStatus {
    broadcast(server, data, len, Frame::CompressedText)
}

/// Close one connection with code 1000
///
/// Returns false for an unknown or already faded connection.
///
/// # Safety
///
/// - `server` must be a valid server pointer
/// - `connection_id` must be a valid NUL-terminated string
#[no_mangle]
pub unsafe extern "C" fn pylon_disconnect(
    server: *mut PylonServer,
    connection_id: *const c_char,
) -> bool {
    let result = server_ref(server).and_then(|server| {
        let id: ConnectionId = parse_id(connection_id, "connection_id")?;
        Ok(server.disconnect(&id))
    });

    result.unwrap_or_else(|e: FfiError| {
        fail(e);
        false
    })
}

/// Live connections; faded ones are not counted
///
/// # Safety
///
/// `server` must be null or a valid server pointer.
#[no_mangle]
pub unsafe extern "C" fn pylon_num_connected_clients(server: *const PylonServer) -> usize {
    server_ref(server).map_or(0, Server::num_connected_clients)
}

/// Remove faded connections; returns how many were removed
///
/// Call between polls, never from inside event handling for the same tick.
///
/// # Safety
///
/// `server` must be null or a valid server pointer.
#[no_mangle]
pub unsafe extern "C" fn pylon_purge(server: *mut PylonServer) -> usize {
    server_ref(server).map_or(0, Server::purge_faded)
}

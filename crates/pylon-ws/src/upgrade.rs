//! WebSocket HTTP upgrade handling (RFC 6455).

use base64::Engine;
use http::{header, Request, Response, StatusCode};
use sha1::{Digest, Sha1};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::WebSocketStream;
use tungstenite::protocol::{Role, WebSocketConfig};

use crate::error::{WsError, WsResult};

/// The WebSocket magic GUID used in the handshake.
const WEBSOCKET_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Check if a request is a WebSocket upgrade request.
///
/// A valid WebSocket upgrade request must have:
/// - `Connection: Upgrade` header
/// - `Upgrade: websocket` header
/// - `Sec-WebSocket-Key` header
/// - `Sec-WebSocket-Version: 13` header
pub fn is_websocket_request<B>(request: &Request<B>) -> bool {
    validate_upgrade_request(request).is_ok()
}

fn header_str<'a, B>(request: &'a Request<B>, name: impl header::AsHeaderName) -> Option<&'a str> {
    request.headers().get(name).and_then(|v| v.to_str().ok())
}

/// Validate a WebSocket upgrade request.
///
/// Returns the `Sec-WebSocket-Accept` value if valid.
pub fn validate_upgrade_request<B>(request: &Request<B>) -> WsResult<String> {
    let connection_upgrade = header_str(request, header::CONNECTION)
        .is_some_and(|v| v.to_ascii_lowercase().contains("upgrade"));
    if !connection_upgrade {
        return Err(WsError::not_websocket("missing Connection: Upgrade header"));
    }

    let upgrade_websocket = header_str(request, header::UPGRADE)
        .is_some_and(|v| v.eq_ignore_ascii_case("websocket"));
    if !upgrade_websocket {
        return Err(WsError::not_websocket("missing Upgrade: websocket header"));
    }

    let key = header_str(request, header::SEC_WEBSOCKET_KEY)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| WsError::not_websocket("missing Sec-WebSocket-Key header"))?;

    if header_str(request, header::SEC_WEBSOCKET_VERSION) != Some("13") {
        return Err(WsError::not_websocket(
            "missing or invalid Sec-WebSocket-Version header (must be 13)",
        ));
    }

    Ok(compute_accept_key(key))
}

/// Compute the Sec-WebSocket-Accept value from the key.
pub fn compute_accept_key(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(WEBSOCKET_GUID.as_bytes());
    base64::engine::general_purpose::STANDARD.encode(hasher.finalize())
}

/// Builds the `101 Switching Protocols` response for a validated request.
pub fn upgrade_response<B: Default>(accept_key: &str) -> WsResult<Response<B>> {
    Ok(Response::builder()
        .status(StatusCode::SWITCHING_PROTOCOLS)
        .header(header::CONNECTION, "Upgrade")
        .header(header::UPGRADE, "websocket")
        .header(header::SEC_WEBSOCKET_ACCEPT, accept_key)
        .body(B::default())?)
}

/// Wraps an upgraded IO stream as a server-side WebSocket.
///
/// `max_message_size` bounds inbound messages and frames.
pub async fn complete_upgrade<S>(stream: S, max_message_size: usize) -> WebSocketStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut config = WebSocketConfig::default();
    config.max_message_size = Some(max_message_size);
    config.max_frame_size = Some(max_message_size);
    WebSocketStream::from_raw_socket(stream, Role::Server, Some(config)).await
}

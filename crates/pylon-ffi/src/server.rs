//! Server lifecycle
//!
//! Creating, configuring, starting and stopping a server from the host.

use std::os::raw::c_char;

use pylon_config::{ConfigLoader, DEFAULT_ENV_PREFIX};
use pylon_server::{Server, ServerConfig, Verb};

use crate::config::PylonServerConfig;
use crate::error::{fail, result_to_error, FfiError};
use crate::types::{PylonError, PylonServer, PylonServerState};
use crate::{required_str, server_ref};

fn into_handle(server: Server) -> *mut PylonServer {
    Box::into_raw(Box::new(server)).cast()
}

/// Create a server
///
/// # Safety
///
/// - `config` must be a valid pointer to a `PylonServerConfig`
/// - `config.host` must be null or a valid NUL-terminated UTF-8 string
///
/// Returns null on error; use `pylon_last_error()` for the message.
#[no_mangle]
pub unsafe extern "C" fn pylon_server_new(config: *const PylonServerConfig) -> *mut PylonServer {
    if config.is_null() {
        fail(FfiError::NullPointer("config"));
        return std::ptr::null_mut();
    }

    let result = ServerConfig::try_from(&*config)
        .map_err(FfiError::InvalidConfig)
        .and_then(|config| Ok(Server::new(config)?));

    match result_to_error(result) {
        (Some(server), _) => into_handle(server),
        (None, _) => std::ptr::null_mut(),
    }
}

/// Create a server from a TOML or JSON file
///
/// Environment variables prefixed `PYLON__` override file values, and a
/// `.env` file is honoured. A null `path` uses defaults plus environment.
/// The `[logging]` section is not applied; call `pylon_init_logging()`.
///
/// # Safety
///
/// `path` must be null or a valid NUL-terminated UTF-8 string.
#[no_mangle]
pub unsafe extern "C" fn pylon_server_from_file(path: *const c_char) -> *mut PylonServer {
    let result = (|| -> Result<Server, FfiError> {
        let mut loader = ConfigLoader::new().with_dotenv()?;
        if !path.is_null() {
            loader = loader.with_file(required_str(path, "path")?)?;
        }
        let config = loader.with_env_prefix(DEFAULT_ENV_PREFIX).load()?;
        Ok(Server::new(config.server_config()?)?)
    })();

    match result_to_error(result) {
        (Some(server), _) => into_handle(server),
        (None, _) => std::ptr::null_mut(),
    }
}

/// Free a server
///
/// Stops listening first if needed. Null is ignored.
///
/// # Safety
///
/// - `server` must be a pointer returned by `pylon_server_new` or
///   `pylon_server_from_file`
/// - After calling this, `server` is no longer valid
#[no_mangle]
pub unsafe extern "C" fn pylon_server_free(server: *mut PylonServer) {
    if server.is_null() {
        return;
    }

    drop(Box::from_raw(server.cast::<Server>()));
}

/// Register a route
///
/// `verb` is GET=0, POST=1, PUT=2, PATCH=3, DELETE=4, OPTIONS=5, HEAD=6,
/// ANY=7, WS=8. Patterns support `:name` parameters and a trailing `*`.
///
/// # Safety
///
/// - `server` must be a valid server pointer
/// - `pattern` must be a valid NUL-terminated UTF-8 string
#[no_mangle]
pub unsafe extern "C" fn pylon_add_route(
    server: *mut PylonServer,
    verb: i32,
    pattern: *const c_char,
) -> PylonError {
    let result = (|| -> Result<(), FfiError> {
        let server = server_ref(server)?;
        let verb = Verb::try_from(verb).map_err(FfiError::InvalidArgument)?;
        let pattern = required_str(pattern, "pattern")?;
        server.add_route(verb, pattern);
        Ok(())
    })();

    result_to_error(result).1
}

/// Start listening on `port` (0 picks a free port)
///
/// A LISTEN event carrying the bound port follows on success. Returns
/// false if the server is already listening or the bind failed; a bind
/// failure also queues an ERROR event.
///
/// # Safety
///
/// `server` must be a valid server pointer.
#[no_mangle]
pub unsafe extern "C" fn pylon_start_listening(server: *mut PylonServer, port: u16) -> bool {
    match server_ref(server) {
        Ok(server) => server.start_listening(port),
        Err(e) => {
            fail(e);
            false
        }
    }
}

/// Stop listening, closing every connection and aborting open requests
///
/// Returns false if the server was not listening.
///
/// # Safety
///
/// `server` must be a valid server pointer.
#[no_mangle]
pub unsafe extern "C" fn pylon_stop_listening(server: *mut PylonServer) -> bool {
    match server_ref(server) {
        Ok(server) => server.stop_listening(),
        Err(e) => {
            fail(e);
            false
        }
    }
}

/// Current listen state; a null server reports `Idle`
///
/// # Safety
///
/// `server` must be null or a valid server pointer.
#[no_mangle]
pub unsafe extern "C" fn pylon_server_state(server: *const PylonServer) -> PylonServerState {
    server_ref(server).map_or(PylonServerState::Idle, |server| server.state().into())
}

/// Bound port, or -1 when not listening
///
/// # Safety
///
/// `server` must be null or a valid server pointer.
#[no_mangle]
pub unsafe extern "C" fn pylon_local_port(server: *const PylonServer) -> i32 {
    server_ref(server)
        .ok()
        .and_then(Server::local_port)
        .map_or(-1, i32::from)
}

//! FFI bindings for pageheat
//!
//! C-compatible functions for driving a heatmap engine from a host shell.
//! All strings are null-terminated. Returned strings are allocated here and
//! must be freed with `pageheat_free_string`.

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;

use chrono::Utc;

use crate::config::HeatmapConfig;
use crate::engine::{BearerToken, HeatmapEngine, RefreshTicket};
use crate::error::FetchError;
use crate::pipeline::records_to_dashboard;
use crate::schema::RecordAdapter;
use crate::types::Surface;

/// `status` value for a successful fetch; `body` holds the records array
pub const PAGEHEAT_FETCH_OK: i32 = 0;
/// `status` value for a rejected credential
pub const PAGEHEAT_FETCH_UNAUTHORIZED: i32 = 1;
/// `status` value for any other failure; `body` may hold a message
pub const PAGEHEAT_FETCH_NETWORK_ERROR: i32 = 2;

// Thread-local storage for the last error message
thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

fn set_last_error(msg: &str) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = CString::new(msg).ok();
    });
}

fn clear_last_error() {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = None;
    });
}

/// Helper to convert C string to Rust string
unsafe fn cstr_to_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok().map(|s| s.to_string())
}

/// Helper to convert Rust string to C string (caller must free)
fn string_to_cstr(s: &str) -> *mut c_char {
    match CString::new(s) {
        Ok(cstr) => cstr.into_raw(),
        Err(_) => ptr::null_mut(),
    }
}

// ============================================================================
// Stateless API
// ============================================================================

/// Compute dashboard JSON for a JSON array of records.
///
/// # Safety
/// - `records_json` must be a valid null-terminated C string.
/// - Returns a newly allocated string that must be freed with `pageheat_free_string`.
/// - Returns NULL on error; call `pageheat_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn pageheat_records_to_dashboard(records_json: *const c_char) -> *mut c_char {
    clear_last_error();

    let json_str = match cstr_to_string(records_json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid JSON string pointer");
            return ptr::null_mut();
        }
    };

    match records_to_dashboard(&json_str, Utc::now()) {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

// ============================================================================
// Engine API
// ============================================================================

/// Opaque handle to a HeatmapEngine
pub struct HeatmapEngineHandle {
    engine: HeatmapEngine,
}

/// Create an engine. `config_json` may be NULL for the default configuration.
///
/// # Safety
/// - `config_json` must be NULL or a valid null-terminated C string.
/// - Must be freed with `pageheat_engine_free`.
/// - Returns NULL on error; call `pageheat_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn pageheat_engine_new(config_json: *const c_char) -> *mut HeatmapEngineHandle {
    clear_last_error();

    let config = if config_json.is_null() {
        HeatmapConfig::default()
    } else {
        let json_str = match cstr_to_string(config_json) {
            Some(s) => s,
            None => {
                set_last_error("Invalid config string pointer");
                return ptr::null_mut();
            }
        };
        match HeatmapConfig::from_json(&json_str) {
            Ok(config) => config,
            Err(e) => {
                set_last_error(&e.to_string());
                return ptr::null_mut();
            }
        }
    };

    match HeatmapEngine::new(config) {
        Ok(engine) => Box::into_raw(Box::new(HeatmapEngineHandle { engine })),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Dispose and free an engine.
///
/// # Safety
/// - `engine` must be a valid pointer returned by `pageheat_engine_new`, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn pageheat_engine_free(engine: *mut HeatmapEngineHandle) {
    if !engine.is_null() {
        let mut handle = Box::from_raw(engine);
        handle.engine.dispose();
    }
}

/// Install a bearer token.
///
/// # Safety
/// - `engine` must be a valid pointer returned by `pageheat_engine_new`.
/// - `token` must be a valid null-terminated C string.
/// - Returns 0 on success, -1 on error.
#[no_mangle]
pub unsafe extern "C" fn pageheat_engine_authenticate(
    engine: *mut HeatmapEngineHandle,
    token: *const c_char,
) -> i32 {
    clear_last_error();

    if engine.is_null() {
        set_last_error("Null engine pointer");
        return -1;
    }

    let handle = &mut *engine;

    let token_str = match cstr_to_string(token) {
        Some(s) => s,
        None => {
            set_last_error("Invalid token string pointer");
            return -1;
        }
    };

    match handle.engine.authenticate(BearerToken::new(token_str)) {
        Ok(()) => 0,
        Err(e) => {
            set_last_error(&e.to_string());
            -1
        }
    }
}

/// Start a refresh. The host fetches records and reports back with
/// `pageheat_engine_complete_refresh`.
///
/// # Safety
/// - `engine` must be a valid pointer returned by `pageheat_engine_new`.
/// - Returns the ticket sequence number (> 0), or -1 on error.
#[no_mangle]
pub unsafe extern "C" fn pageheat_engine_begin_refresh(engine: *mut HeatmapEngineHandle) -> i64 {
    clear_last_error();

    if engine.is_null() {
        set_last_error("Null engine pointer");
        return -1;
    }

    let handle = &mut *engine;

    match handle.engine.begin_refresh() {
        Ok(ticket) => ticket.seq() as i64,
        Err(e) => {
            set_last_error(&e.to_string());
            -1
        }
    }
}

/// Report the outcome of a fetch.
///
/// `status` is one of `PAGEHEAT_FETCH_OK`, `PAGEHEAT_FETCH_UNAUTHORIZED` or
/// `PAGEHEAT_FETCH_NETWORK_ERROR`. A success body that does not parse is
/// treated as a network error.
///
/// # Safety
/// - `engine` must be a valid pointer returned by `pageheat_engine_new`.
/// - `body` must be NULL or a valid null-terminated C string.
/// - Returns 0 (updated), 1 (discarded), 2 (credential rejected),
///   3 (failed) or -1 on error.
#[no_mangle]
pub unsafe extern "C" fn pageheat_engine_complete_refresh(
    engine: *mut HeatmapEngineHandle,
    seq: i64,
    status: i32,
    body: *const c_char,
) -> i32 {
    clear_last_error();

    if engine.is_null() {
        set_last_error("Null engine pointer");
        return -1;
    }
    if seq <= 0 {
        set_last_error("Invalid ticket sequence");
        return -1;
    }

    let handle = &mut *engine;
    let body_str = cstr_to_string(body);

    let outcome = match status {
        PAGEHEAT_FETCH_OK => {
            let Some(body_str) = body_str else {
                set_last_error("Invalid body string pointer");
                return -1;
            };
            RecordAdapter::parse_array(&body_str).map_err(|e| FetchError::Network(e.to_string()))
        }
        PAGEHEAT_FETCH_UNAUTHORIZED => Err(FetchError::Unauthorized),
        PAGEHEAT_FETCH_NETWORK_ERROR => Err(FetchError::Network(
            body_str.unwrap_or_else(|| "fetch failed".to_string()),
        )),
        other => {
            set_last_error(&format!("Unknown fetch status: {}", other));
            return -1;
        }
    };

    handle
        .engine
        .complete_refresh(RefreshTicket::from_seq(seq as u64), outcome)
        .code()
}

/// Set the render surface size and re-render if data is loaded.
///
/// # Safety
/// - `engine` must be a valid pointer returned by `pageheat_engine_new`.
/// - Returns 0 on success, -1 on error.
#[no_mangle]
pub unsafe extern "C" fn pageheat_engine_resize(
    engine: *mut HeatmapEngineHandle,
    width: u32,
    height: u32,
) -> i32 {
    clear_last_error();

    if engine.is_null() {
        set_last_error("Null engine pointer");
        return -1;
    }

    let handle = &mut *engine;

    match handle.engine.resize(Surface::new(width, height)) {
        Ok(()) => 0,
        Err(e) => {
            set_last_error(&e.to_string());
            -1
        }
    }
}

/// Set the kernel radius in pixels.
///
/// # Safety
/// - `engine` must be a valid pointer returned by `pageheat_engine_new`.
/// - Returns 0 on success, -1 on error.
#[no_mangle]
pub unsafe extern "C" fn pageheat_engine_set_radius(engine: *mut HeatmapEngineHandle, radius_px: u32) -> i32 {
    clear_last_error();

    if engine.is_null() {
        set_last_error("Null engine pointer");
        return -1;
    }

    match (*engine).engine.set_radius(radius_px) {
        Ok(()) => 0,
        Err(e) => {
            set_last_error(&e.to_string());
            -1
        }
    }
}

/// Set the global intensity in `[0, 1]`.
///
/// # Safety
/// - `engine` must be a valid pointer returned by `pageheat_engine_new`.
/// - Returns 0 on success, -1 on error.
#[no_mangle]
pub unsafe extern "C" fn pageheat_engine_set_intensity(engine: *mut HeatmapEngineHandle, intensity: f32) -> i32 {
    clear_last_error();

    if engine.is_null() {
        set_last_error("Null engine pointer");
        return -1;
    }

    match (*engine).engine.set_intensity(intensity) {
        Ok(()) => 0,
        Err(e) => {
            set_last_error(&e.to_string());
            -1
        }
    }
}

/// Current dashboard as JSON.
///
/// # Safety
/// - `engine` must be a valid pointer returned by `pageheat_engine_new`.
/// - Returns a newly allocated string that must be freed with `pageheat_free_string`.
/// - Returns NULL if nothing is loaded or on error.
#[no_mangle]
pub unsafe extern "C" fn pageheat_engine_dashboard_json(engine: *const HeatmapEngineHandle) -> *mut c_char {
    clear_last_error();

    if engine.is_null() {
        set_last_error("Null engine pointer");
        return ptr::null_mut();
    }

    let handle = &*engine;

    match handle.engine.dashboard_json() {
        Ok(Some(json)) => string_to_cstr(&json),
        Ok(None) => ptr::null_mut(),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Borrow the RGBA8 pixels of the current frame.
///
/// # Safety
/// - `engine` must be a valid pointer returned by `pageheat_engine_new`.
/// - `out_len` must be NULL or point to writable memory.
/// - The buffer is owned by the engine and stays valid until the next call
///   that mutates it. Do NOT free it.
/// - Returns NULL if no frame exists.
#[no_mangle]
pub unsafe extern "C" fn pageheat_engine_pixels(
    engine: *const HeatmapEngineHandle,
    out_len: *mut usize,
) -> *const u8 {
    clear_last_error();

    if !out_len.is_null() {
        *out_len = 0;
    }
    if engine.is_null() {
        set_last_error("Null engine pointer");
        return ptr::null();
    }

    match (*engine).engine.frame() {
        Some(frame) => {
            if !out_len.is_null() {
                *out_len = frame.pixels().len();
            }
            frame.pixels().as_ptr()
        }
        None => ptr::null(),
    }
}

/// Current engine state code (0 unauthenticated, 1 idle, 2 loading,
/// 3 ready, 4 refreshing, 5 disposed).
///
/// # Safety
/// - `engine` must be a valid pointer returned by `pageheat_engine_new`.
/// - Returns -1 for a NULL engine.
#[no_mangle]
pub unsafe extern "C" fn pageheat_engine_state(engine: *const HeatmapEngineHandle) -> i32 {
    if engine.is_null() {
        return -1;
    }
    (*engine).engine.state().code()
}

// ============================================================================
// Memory Management
// ============================================================================

/// Free a string returned by pageheat functions.
///
/// # Safety
/// - `ptr` must be a valid pointer returned by a pageheat function, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn pageheat_free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        drop(CString::from_raw(ptr));
    }
}

// ============================================================================
// Error Handling
// ============================================================================

/// Get the last error message.
///
/// # Safety
/// - Returns a pointer to a thread-local error string.
/// - The returned pointer is valid until the next pageheat call on this thread.
/// - Do NOT free the returned pointer.
/// - Returns NULL if no error occurred.
#[no_mangle]
pub unsafe extern "C" fn pageheat_last_error() -> *const c_char {
    LAST_ERROR.with(|e| match &*e.borrow() {
        Some(cstr) => cstr.as_ptr(),
        None => ptr::null(),
    })
}

// ============================================================================
// Version Information
// ============================================================================

/// Get the library version.
///
/// # Safety
/// - Returns a pointer to a static string. Do NOT free.
#[no_mangle]
pub unsafe extern "C" fn pageheat_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}

//! FFI bindings for VibeFlow
//!
//! This module provides C-compatible functions for editor hosts that embed the
//! library. All functions use C strings (null-terminated) and return allocated
//! memory that must be freed by the caller using `vibeflow_free_string`.

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;

use crate::clock::SystemClock;
use crate::config::FlowConfig;
use crate::error::VibeflowError;
use crate::pipeline::FlowSession;
use crate::schema::HostEventAdapter;
use crate::scorer::UniformJitter;
use crate::store::{JsonFileStore, KeyValueStore, MemoryStore};

// Thread-local storage for the last error message
thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

/// Set the last error message
fn set_last_error(msg: &str) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = CString::new(msg).ok();
    });
}

/// Clear the last error message
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

/// Return a JSON result as a C string, or NULL with the error recorded
fn json_result(result: Result<String, VibeflowError>) -> *mut c_char {
    match result {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

// ============================================================================
// Session API
// ============================================================================

/// Opaque handle to a FlowSession
pub struct VibeflowSessionHandle {
    session: FlowSession,
}

/// Create a session from a JSON config. NULL `config_json` uses the defaults.
/// `state_path` names a JSON file that keeps assist mode and the logs across
/// restarts; NULL keeps them in memory only.
///
/// # Safety
/// - `config_json` and `state_path` must each be NULL or a valid null-terminated C string.
/// - Returns a pointer that must be freed with `vibeflow_session_free`.
/// - Returns NULL on error; call `vibeflow_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn vibeflow_session_new(
    config_json: *const c_char,
    state_path: *const c_char,
) -> *mut VibeflowSessionHandle {
    clear_last_error();

    let config = if config_json.is_null() {
        FlowConfig::default()
    } else {
        let json = match cstr_to_string(config_json) {
            Some(s) => s,
            None => {
                set_last_error("Invalid config string pointer");
                return ptr::null_mut();
            }
        };
        match FlowConfig::from_json(&json) {
            Ok(config) => config,
            Err(e) => {
                set_last_error(&e.to_string());
                return ptr::null_mut();
            }
        }
    };

    let store: Box<dyn KeyValueStore> = if state_path.is_null() {
        Box::new(MemoryStore::new())
    } else {
        let path = match cstr_to_string(state_path) {
            Some(s) => s,
            None => {
                set_last_error("Invalid state path string pointer");
                return ptr::null_mut();
            }
        };
        match JsonFileStore::open(path) {
            Ok(store) => Box::new(store),
            Err(e) => {
                set_last_error(&e.to_string());
                return ptr::null_mut();
            }
        }
    };

    match FlowSession::with_parts(config, Box::new(SystemClock), Box::new(UniformJitter::new()), store) {
        Ok(session) => Box::into_raw(Box::new(VibeflowSessionHandle { session })),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Free a session, writing any unsaved logs to its state file.
///
/// # Safety
/// - `session` must be a valid pointer returned by `vibeflow_session_new`, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn vibeflow_session_free(session: *mut VibeflowSessionHandle) {
    if !session.is_null() {
        drop(Box::from_raw(session));
    }
}

/// Feed one host event (JSON) and return the response (JSON).
///
/// # Safety
/// - `session` must be a valid pointer returned by `vibeflow_session_new`.
/// - `host_event_json` must be a valid null-terminated C string.
/// - Returns a newly allocated string that must be freed with `vibeflow_free_string`.
/// - Returns NULL on error; call `vibeflow_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn vibeflow_session_handle(
    session: *mut VibeflowSessionHandle,
    host_event_json: *const c_char,
) -> *mut c_char {
    clear_last_error();

    if session.is_null() {
        set_last_error("Null session pointer");
        return ptr::null_mut();
    }

    let handle = &mut *session;

    let json_str = match cstr_to_string(host_event_json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid host event string pointer");
            return ptr::null_mut();
        }
    };

    json_result(
        HostEventAdapter::parse_line(&json_str)
            .and_then(|event| handle.session.handle(&event))
            .and_then(|response| Ok(serde_json::to_string(&response)?)),
    )
}

/// Current dashboard snapshot as JSON.
///
/// # Safety
/// - `session` must be a valid pointer returned by `vibeflow_session_new`.
/// - Returns a newly allocated string that must be freed with `vibeflow_free_string`.
/// - Returns NULL on error; call `vibeflow_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn vibeflow_session_snapshot(session: *mut VibeflowSessionHandle) -> *mut c_char {
    clear_last_error();

    if session.is_null() {
        set_last_error("Null session pointer");
        return ptr::null_mut();
    }

    let handle = &*session;
    json_result(serde_json::to_string(&handle.session.snapshot()).map_err(VibeflowError::from))
}

/// The `{history, moods, events}` export bundle as JSON.
///
/// # Safety
/// - `session` must be a valid pointer returned by `vibeflow_session_new`.
/// - Returns a newly allocated string that must be freed with `vibeflow_free_string`.
/// - Returns NULL on error; call `vibeflow_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn vibeflow_session_bundle(session: *mut VibeflowSessionHandle) -> *mut c_char {
    clear_last_error();

    if session.is_null() {
        set_last_error("Null session pointer");
        return ptr::null_mut();
    }

    let handle = &*session;
    json_result(crate::export::render_bundle(&handle.session.bundle()))
}

// ============================================================================
// Memory Management
// ============================================================================

/// Free a string returned by VibeFlow functions.
///
/// # Safety
/// - `ptr` must be a valid pointer returned by a VibeFlow function, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn vibeflow_free_string(ptr: *mut c_char) {
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
/// - The returned pointer is valid until the next VibeFlow function call on this thread.
/// - Do NOT free the returned pointer.
/// - Returns NULL if no error occurred.
#[no_mangle]
pub unsafe extern "C" fn vibeflow_last_error() -> *const c_char {
    LAST_ERROR.with(|e| match &*e.borrow() {
        Some(cstr) => cstr.as_ptr(),
        None => ptr::null(),
    })
}

// ============================================================================
// Version Information
// ============================================================================

/// Get the VibeFlow library version.
///
/// # Safety
/// - Returns a pointer to a static string. Do NOT free.
#[no_mangle]
pub unsafe extern "C" fn vibeflow_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CString;

    unsafe fn take_string(ptr: *mut c_char) -> String {
        assert!(!ptr.is_null());
        let s = CStr::from_ptr(ptr).to_str().unwrap().to_string();
        vibeflow_free_string(ptr);
        s
    }

    #[test]
    fn test_ffi_session_lifecycle() {
        unsafe {
            let session = vibeflow_session_new(ptr::null(), ptr::null());
            assert!(!session.is_null());

            let edit = CString::new(
                r#"{"timestamp":"2024-01-15T14:00:00Z","kind":"text_change",
                    "payload":{"changes":[{"text":"fn main()","range_length":0}]}}"#,
            )
            .unwrap();
            let response: serde_json::Value =
                serde_json::from_str(&take_string(vibeflow_session_handle(session, edit.as_ptr()))).unwrap();
            assert_eq!(response["type"], "edits");
            assert_eq!(response["events"][0]["type"], "insert");

            let toggle = CString::new(
                r#"{"timestamp":"2024-01-15T14:00:01Z","kind":"command","payload":{"command":"toggle_assist"}}"#,
            )
            .unwrap();
            let response: serde_json::Value =
                serde_json::from_str(&take_string(vibeflow_session_handle(session, toggle.as_ptr()))).unwrap();
            assert_eq!(response["enabled"], true);

            let snapshot: serde_json::Value =
                serde_json::from_str(&take_string(vibeflow_session_snapshot(session))).unwrap();
            assert_eq!(snapshot["metrics"]["totalInsertions"], 9);

            let bundle: serde_json::Value =
                serde_json::from_str(&take_string(vibeflow_session_bundle(session))).unwrap();
            assert_eq!(bundle["events"].as_array().unwrap().len(), 2);

            vibeflow_session_free(session);
        }
    }

    #[test]
    fn test_ffi_session_with_config() {
        unsafe {
            let config = CString::new(r#"{"ai_insert_threshold": 5}"#).unwrap();
            let session = vibeflow_session_new(config.as_ptr(), ptr::null());
            assert!(!session.is_null());

            let edit = CString::new(
                r#"{"timestamp":"2024-01-15T14:00:00Z","kind":"text_change",
                    "payload":{"changes":[{"text":"abcdef","range_length":0}]}}"#,
            )
            .unwrap();
            let response = take_string(vibeflow_session_handle(session, edit.as_ptr()));
            assert!(response.contains("ai.accept"));

            vibeflow_session_free(session);

            let bad = CString::new(r#"{"nudge": {"low_threshold": 90, "high_threshold": 70}}"#).unwrap();
            assert!(vibeflow_session_new(bad.as_ptr(), ptr::null()).is_null());
            assert!(!vibeflow_last_error().is_null());
        }
    }

    fn handle_json(session: *mut VibeflowSessionHandle, json: &str) -> serde_json::Value {
        let event = CString::new(json).unwrap();
        unsafe { serde_json::from_str(&take_string(vibeflow_session_handle(session, event.as_ptr()))).unwrap() }
    }

    #[test]
    fn test_ffi_tick_scores_on_host_time() {
        unsafe {
            let config = CString::new(r#"{"scorer": {"jitter_amplitude": 0}}"#).unwrap();
            let session = vibeflow_session_new(config.as_ptr(), ptr::null());
            assert!(!session.is_null());

            for second in 0..10 {
                handle_json(
                    session,
                    &format!(
                        r#"{{"timestamp":"2024-01-15T14:00:0{}Z","kind":"text_change","payload":{{"changes":[{{"text":"abcd","range_length":0}}]}}}}"#,
                        second
                    ),
                );
            }
            let response = handle_json(session, r#"{"timestamp":"2024-01-15T14:00:10Z","kind":"tick"}"#);

            assert_eq!(response["type"], "tick");
            assert_eq!(response["status"]["timestamp"], "2024-01-15T14:00:10Z");
            assert_eq!(response["status"]["score"], 84);
            assert_eq!(response["status"]["band"], "high");

            vibeflow_session_free(session);
        }
    }

    #[test]
    fn test_ffi_state_survives_restart() {
        let path = std::env::temp_dir().join(format!("vibeflow-ffi-{}.json", uuid::Uuid::new_v4()));
        let state = CString::new(path.to_str().unwrap()).unwrap();
        let toggle = r#"{"timestamp":"2024-01-15T14:00:00Z","kind":"command","payload":{"command":"toggle_assist"}}"#;

        unsafe {
            let session = vibeflow_session_new(ptr::null(), state.as_ptr());
            assert!(!session.is_null());
            assert_eq!(handle_json(session, toggle)["enabled"], true);
            handle_json(
                session,
                r#"{"timestamp":"2024-01-15T14:00:01Z","kind":"command","payload":{"command":"report_mood","mood":"Happy"}}"#,
            );
            vibeflow_session_free(session);

            let session = vibeflow_session_new(ptr::null(), state.as_ptr());
            assert!(!session.is_null());
            let bundle: serde_json::Value =
                serde_json::from_str(&take_string(vibeflow_session_bundle(session))).unwrap();
            assert_eq!(bundle["moods"].as_array().unwrap().len(), 1);
            assert_eq!(handle_json(session, toggle)["enabled"], false);
            vibeflow_session_free(session);
        }

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_ffi_error_handling() {
        unsafe {
            let session = vibeflow_session_new(ptr::null(), ptr::null());
            let invalid_json = CString::new("not json").unwrap();

            let result = vibeflow_session_handle(session, invalid_json.as_ptr());
            assert!(result.is_null());

            let error = vibeflow_last_error();
            assert!(!error.is_null());
            let error_str = CStr::from_ptr(error).to_str().unwrap();
            assert!(!error_str.is_empty());

            assert!(vibeflow_session_handle(ptr::null_mut(), invalid_json.as_ptr()).is_null());
            vibeflow_session_free(session);
        }
    }

    #[test]
    fn test_ffi_version() {
        unsafe {
            let version = vibeflow_version();
            assert!(!version.is_null());

            let version_str = CStr::from_ptr(version).to_str().unwrap();
            assert_eq!(version_str, crate::VIBEFLOW_VERSION);
        }
    }
}

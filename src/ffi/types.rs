//! # FFI Types
//!
//! C-compatible types for the native bindings.

use std::ffi::{CStr, CString};
use std::os::raw::c_char;

use crate::error::FfiError;

/// FFI-safe result type
///
/// Used to return results across the FFI boundary. Release with
/// [`mercurio_free_result`].
#[repr(C)]
pub struct FfiResult {
    /// Success flag (1 = success, 0 = error)
    pub success: i32,
    /// Error code (0 if success)
    pub error_code: i32,
    /// Error message (null if success)
    pub error_message: *mut c_char,
    /// Result data, usually JSON (null if error or empty)
    pub data: *mut c_char,
}

impl FfiResult {
    /// Create a successful result with data
    pub fn ok(data: String) -> Self {
        Self {
            success: 1,
            error_code: 0,
            error_message: std::ptr::null_mut(),
            data: into_c_string(data),
        }
    }

    /// Create a successful result without data
    pub fn ok_empty() -> Self {
        Self {
            success: 1,
            error_code: 0,
            error_message: std::ptr::null_mut(),
            data: std::ptr::null_mut(),
        }
    }

    /// Create an error result
    pub fn err(code: i32, message: String) -> Self {
        Self {
            success: 0,
            error_code: code,
            error_message: into_c_string(message),
            data: std::ptr::null_mut(),
        }
    }

    /// Create from a dispatcher result
    pub fn from_result(result: Result<String, FfiError>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(e) => e.into(),
        }
    }
}

impl From<FfiError> for FfiResult {
    fn from(err: FfiError) -> Self {
        Self::err(err.code, err.message)
    }
}

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

/// Hand a string to C. Interior NUL bytes are dropped.
pub fn into_c_string(value: String) -> *mut c_char {
    let mut bytes = value.into_bytes();
    bytes.retain(|b| *b != 0);
    CString::new(bytes)
        .map(CString::into_raw)
        .unwrap_or(std::ptr::null_mut())
}

/// Convert a C string to a Rust String
///
/// # Safety
/// The caller must ensure the pointer is null or valid and null-terminated.
pub unsafe fn cstr_to_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok().map(String::from)
}

/// Free a C string allocated by Rust
///
/// # Safety
/// The pointer must have been returned by this library and not freed yet.
#[no_mangle]
pub unsafe extern "C" fn mercurio_free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        drop(CString::from_raw(ptr));
    }
}

/// Free an FfiResult
///
/// # Safety
/// The FfiResult must have been created by this library and not freed yet.
#[no_mangle]
pub unsafe extern "C" fn mercurio_free_result(result: FfiResult) {
    if !result.error_message.is_null() {
        drop(CString::from_raw(result.error_message));
    }
    if !result.data.is_null() {
        drop(CString::from_raw(result.data));
    }
}

//! # C API
//!
//! C-compatible FFI functions for iOS and other native hosts.
//!
//! Everything past `mercurio_init` goes through `mercurio_call(method, args)`;
//! see the dispatcher for the method table. Every returned `FfiResult` must
//! be released with `mercurio_free_result`.

use std::os::raw::c_char;

use super::state;
use super::types::*;
use super::{ERR_INVALID_JSON, ERR_MISSING_FIELD};

// ============================================================================
// INITIALIZATION
// ============================================================================

/// Initialize Mercurio Core
///
/// Must be called before any other function.
///
/// # Arguments
/// * `config_json` - `CoreConfig` as JSON (null for `MERCURIO_*` environment)
///
/// # Safety
/// `config_json` must be null or a valid null-terminated string.
#[no_mangle]
pub unsafe extern "C" fn mercurio_init(config_json: *const c_char) -> FfiResult {
    let json = if config_json.is_null() {
        None
    } else {
        match cstr_to_string(config_json) {
            Some(json) => Some(json),
            None => return FfiResult::err(ERR_INVALID_JSON, "Config is not UTF-8".to_string()),
        }
    };

    match state::parse_config(json.as_deref()).and_then(state::init) {
        Ok(()) => {
            tracing::info!("Mercurio FFI initialized");
            FfiResult::ok_empty()
        }
        Err(e) => e.into(),
    }
}

/// Shutdown Mercurio Core
///
/// Drops the shared core. `mercurio_init` may be called again afterwards.
#[no_mangle]
pub extern "C" fn mercurio_shutdown() -> FfiResult {
    if state::shutdown() {
        tracing::info!("Mercurio FFI shut down");
    }
    FfiResult::ok_empty()
}

/// Get Mercurio Core version
///
/// Release with `mercurio_free_string`.
#[no_mangle]
pub extern "C" fn mercurio_version() -> *mut c_char {
    into_c_string(crate::version().to_string())
}

// ============================================================================
// DISPATCH
// ============================================================================

/// Call a core method by name with JSON arguments
///
/// # Safety
/// `method` must be a valid null-terminated string. `args` must be null or
/// a valid null-terminated string.
#[no_mangle]
pub unsafe extern "C" fn mercurio_call(method: *const c_char, args: *const c_char) -> FfiResult {
    let Some(method) = cstr_to_string(method) else {
        return FfiResult::err(ERR_MISSING_FIELD, "Missing method".to_string());
    };
    let args = cstr_to_string(args).unwrap_or_default();

    FfiResult::from_result(state::call(&method, &args))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CStr;

    #[test]
    fn test_version_string() {
        let ptr = mercurio_version();
        let version = unsafe { CStr::from_ptr(ptr) }.to_str().unwrap().to_string();
        assert_eq!(version, crate::version());
        unsafe { mercurio_free_string(ptr) };
    }

    #[test]
    fn test_call_without_method() {
        let result = unsafe { mercurio_call(std::ptr::null(), std::ptr::null()) };
        assert_eq!(result.success, 0);
        assert_eq!(result.error_code, ERR_MISSING_FIELD);
        unsafe { mercurio_free_result(result) };
    }
}

//! # WASM Bindings
//!
//! WebAssembly bindings for the browser client.
//!
//! The default credential backend on wasm32 is `localStorage`, so an
//! identity created here survives a page reload.

use std::sync::Once;

use wasm_bindgen::prelude::*;

use super::state;
use crate::error::FfiError;

static LOGGING: Once = Once::new();

fn to_js_error(err: FfiError) -> JsValue {
    match serde_json::to_string(&err) {
        Ok(json) => JsValue::from_str(&json),
        Err(_) => JsValue::from_str(&err.message),
    }
}

/// Initialize Mercurio for web
///
/// Sets up the panic hook and tracing, then opens the core with
/// `config_json` (a `CoreConfig`) or the defaults.
#[wasm_bindgen]
pub fn mercurio_wasm_init(config_json: Option<String>) -> Result<(), JsValue> {
    console_error_panic_hook::set_once();
    LOGGING.call_once(tracing_wasm::set_as_global_default);

    state::parse_config(config_json.as_deref())
        .and_then(state::init)
        .map_err(to_js_error)?;

    tracing::info!("Mercurio WASM initialized");
    Ok(())
}

/// Call a core method by name with JSON arguments
#[wasm_bindgen]
pub fn mercurio_wasm_call(method: &str, args: &str) -> Result<String, JsValue> {
    state::call(method, args).map_err(to_js_error)
}

/// Drop the shared core
#[wasm_bindgen]
pub fn mercurio_wasm_shutdown() -> bool {
    state::shutdown()
}

/// Get Mercurio Core version
#[wasm_bindgen]
pub fn mercurio_wasm_version() -> String {
    crate::version().to_string()
}

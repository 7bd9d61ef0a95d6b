//! # Shared FFI State
//!
//! The process-wide [`MercurioCore`] behind `c_api.rs` and `wasm.rs`.

use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;

use super::dispatcher::{dispatch, DResult};
use super::{ERR_ALREADY_INITIALIZED, ERR_INVALID_JSON, ERR_NOT_INITIALIZED};
use crate::config::CoreConfig;
use crate::error::FfiError;
use crate::MercurioCore;

static CORE: Lazy<RwLock<Option<Arc<MercurioCore>>>> = Lazy::new(|| RwLock::new(None));

/// Parse a host-supplied config, falling back to `MERCURIO_*` variables
/// when none is given
pub fn parse_config(json: Option<&str>) -> Result<CoreConfig, FfiError> {
    match json.map(str::trim).filter(|json| !json.is_empty()) {
        Some(json) => serde_json::from_str(json)
            .map_err(|e| FfiError::new(ERR_INVALID_JSON, format!("Invalid config: {}", e))),
        None => Ok(CoreConfig::from_env()?),
    }
}

/// Open the shared core. Fails if it is already open.
pub fn init(config: CoreConfig) -> Result<(), FfiError> {
    let mut core = CORE.write();
    if core.is_some() {
        return Err(FfiError::new(ERR_ALREADY_INITIALIZED, "Already initialized"));
    }
    *core = Some(Arc::new(MercurioCore::open(config)?));
    Ok(())
}

/// Drop the shared core. Returns whether one was open.
///
/// Calls already in flight keep their handle until they return.
pub fn shutdown() -> bool {
    CORE.write().take().is_some()
}

/// Dispatch `method` against the shared core
pub fn call(method: &str, args: &str) -> DResult {
    let core = CORE
        .read()
        .clone()
        .ok_or_else(|| FfiError::new(ERR_NOT_INITIALIZED, "Not initialized"))?;
    dispatch(&core, method, args)
}

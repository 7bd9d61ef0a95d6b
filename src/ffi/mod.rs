//! # FFI Bindings
//!
//! Foreign Function Interface bindings for the iOS and browser clients.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         FFI ARCHITECTURE                                │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Swift / TypeScript                                                     │
//! │         │                                                               │
//! │         ▼                                                               │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    Platform Bindings                            │   │
//! │  │                                                                 │   │
//! │  │  iOS:  C FFI (mercurio_init / mercurio_call) → Swift wrapper    │   │
//! │  │  Web:  wasm-bindgen (mercurio_wasm_*) → TypeScript              │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │         │                                                               │
//! │         ▼                                                               │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │           Dispatcher: method name + JSON args → JSON            │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │         │                                                               │
//! │         ▼                                                               │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     MercurioCore                                │   │
//! │  │            Identity │ Hybrid cipher │ Key codec                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Error Handling
//!
//! All FFI functions return results through:
//! - C FFI: `FfiResult` struct with error code and message
//! - WASM: a thrown string holding `{"code", "message", "recoverable"}`
//!
//! The dispatcher and shared state are plain Rust and always compiled.
//! The exported symbols live behind the `ffi` and `wasm` features.

mod dispatcher;
mod state;
mod types;

#[cfg(feature = "ffi")]
mod c_api;

#[cfg(all(feature = "wasm", target_arch = "wasm32"))]
mod wasm;

pub use dispatcher::{dispatch, DResult};
pub use state::{call, init, parse_config, shutdown};
pub use types::*;

#[cfg(feature = "ffi")]
pub use c_api::*;

#[cfg(all(feature = "wasm", target_arch = "wasm32"))]
pub use wasm::*;

/// Arguments were not valid JSON
pub const ERR_INVALID_JSON: i32 = 1;

/// A required argument was missing or had the wrong type
pub const ERR_MISSING_FIELD: i32 = 2;

/// No handler for the requested method
pub const ERR_UNKNOWN_METHOD: i32 = 3;

/// A call arrived before `init`
pub const ERR_NOT_INITIALIZED: i32 = 100;

/// `init` was called twice without `shutdown`
pub const ERR_ALREADY_INITIALIZED: i32 = 101;

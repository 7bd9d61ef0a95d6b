//! # Storage Module
//!
//! Durable, platform-protected storage for identity key material.
//!
//! ## Storage Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         STORAGE SYSTEM                                  │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │  Platform Secure Storage (Keys Only)                            │   │
//! │  │  ───────────────────────────────────                             │   │
//! │  │                                                                 │   │
//! │  │  iOS / macOS: Keychain generic passwords                       │   │
//! │  │  Desktop / CLI: JSON file, owner-only, optionally encrypted    │   │
//! │  │  Browser: window.localStorage                                  │   │
//! │  │  Tests: in-memory                                              │   │
//! │  │                                                                 │   │
//! │  │  Stored, each as its own entry under one namespace:            │   │
//! │  │  • signing-public-key / signing-private-key                    │   │
//! │  │  • exchange-public-key / exchange-private-key                  │   │
//! │  │  • identifier                                                  │   │
//! │  │  • recovery-phrase                                             │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Messages are never persisted here. They live on the relay in their
//! encrypted form.

mod secure_store;

#[cfg(not(target_arch = "wasm32"))]
pub use secure_store::FileCredentialStore;
#[cfg(any(target_os = "ios", target_os = "macos"))]
pub use secure_store::KeychainCredentialStore;
#[cfg(target_arch = "wasm32")]
pub use secure_store::LocalStorageCredentialStore;
pub use secure_store::{
    keys, CredentialStore, MemoryCredentialStore, StorageKey, DEFAULT_NAMESPACE,
};

//! # Mercurio Core
//!
//! The cryptographic layer shared by the Mercurio mobile and browser
//! clients: identity generation and recovery, hybrid message encryption,
//! the public-key interchange encoding and secure storage of private
//! material. No server ever sees plaintext or private keys.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          MERCURIO CORE                                  │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                        Messenger                                │   │
//! │  │            publish_identity · send · open · history             │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │          │                      │                        │              │
//! │          ▼                      ▼                        ▼              │
//! │  ┌───────────────┐   ┌────────────────────┐   ┌────────────────────┐   │
//! │  │   Identity    │   │   Hybrid Cipher    │   │ Directory / Relay  │   │
//! │  │   Manager     │   │  AES-256-GCM +     │   │  (collaborators)   │   │
//! │  │               │   │  RSA-OAEP-SHA256   │   │                    │   │
//! │  └───────────────┘   └────────────────────┘   └────────────────────┘   │
//! │          │                      │                                       │
//! │          ▼                      ▼                                       │
//! │  ┌───────────────┐   ┌────────────────────┐                            │
//! │  │  Credential   │   │     Key Codec      │                            │
//! │  │    Store      │   │  DER · SPKI · b64  │                            │
//! │  └───────────────┘   └────────────────────┘                            │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Hierarchy
//!
//! - [`error`] - Error types for the entire library
//! - [`crypto`] - Key codec, keypairs, hybrid message cipher
//! - [`identity`] - Identity manager, identifiers, recovery phrases
//! - [`storage`] - Secure credential store backends
//! - [`directory`] - User directory and message relay seams
//! - [`messaging`] - Send / receive on top of the above
//! - [`config`] - Runtime configuration
//! - [`ffi`] - C and WebAssembly bindings for the mobile and browser clients
//!
//! ## Platform Support
//!
//! | Platform | Credential Store | Status |
//! |----------|------------------|--------|
//! | iOS | Keychain | Supported |
//! | macOS | Keychain or file | Supported |
//! | Linux / Windows | File (optionally encrypted) | Supported |
//! | Web | localStorage or memory | Supported |

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

// ============================================================================
// MODULE DECLARATIONS
// ============================================================================

pub mod config;
pub mod crypto;
pub mod directory;
pub mod error;
pub mod ffi;
pub mod identity;
pub mod messaging;
pub mod storage;
/// Platform-aware time utilities for native and WASM targets.
pub mod time;

// ============================================================================
// RE-EXPORTS
// ============================================================================

pub use config::{CoreConfig, CredentialBackend};
pub use crypto::{EncryptedPayload, RsaPublicKey, RsaPublicKeyWire};
pub use error::{Error, Result};
pub use identity::{Identifier, IdentityManager, PublicMaterial, RecoveryPhrase};
pub use messaging::{DecryptedMessage, Messenger};

// ============================================================================
// CORE INSTANCE
// ============================================================================

use std::sync::Arc;

use directory::{Directory, MessageRelay};
use storage::CredentialStore;

/// Handle that wires the credential store and identity manager together
///
/// ## Lifecycle
///
/// ```text
/// ┌─────────────────────────────────────────────────────────────────────────┐
/// │                      MERCURIO CORE LIFECYCLE                            │
/// ├─────────────────────────────────────────────────────────────────────────┤
/// │                                                                         │
/// │  1. Open                                                               │
/// │     ┌─────────────┐                                                    │
/// │     │ Mercurio    │──► Build credential store                          │
/// │     │ Core::open()│──► Load persisted identity, if any                 │
/// │     └─────────────┘                                                    │
/// │            │                                                           │
/// │            ▼                                                           │
/// │  2. Create or Restore Identity (first run only)                        │
/// │     ┌─────────────┐                                                    │
/// │     │ identity()  │──► generate_identity()                             │
/// │     │             │──► restore_from_phrase()                           │
/// │     └─────────────┘                                                    │
/// │            │                                                           │
/// │            ▼                                                           │
/// │  3. Messaging                                                          │
/// │     ┌─────────────┐                                                    │
/// │     │ messenger() │◄─► publish keys, send, read history                │
/// │     └─────────────┘                                                    │
/// │            │                                                           │
/// │            ▼                                                           │
/// │  4. Logout                                                             │
/// │     ┌─────────────┐                                                    │
/// │     │ clear_      │──► Erase every credential entry                    │
/// │     │ identity()  │                                                    │
/// │     └─────────────┘                                                    │
/// │                                                                         │
/// └─────────────────────────────────────────────────────────────────────────┘
/// ```
///
/// There is no global instance. Hosts own the handle and pass it where needed.
pub struct MercurioCore {
    config: CoreConfig,
    store: Arc<dyn CredentialStore>,
    identity: Arc<IdentityManager>,
}

impl MercurioCore {
    /// Open the core with the given configuration
    ///
    /// ## Example
    ///
    /// ```ignore
    /// use mercurio_core::{CoreConfig, MercurioCore};
    ///
    /// let core = MercurioCore::open(CoreConfig::from_env()?)?;
    /// if !core.identity().has_identity()? {
    ///     core.identity().generate_identity()?;
    /// }
    /// ```
    pub fn open(config: CoreConfig) -> Result<Self> {
        tracing::info!("Opening Mercurio Core v{}", version());
        if config.verbose_logging {
            tracing::debug!(
                "Credential backend {:?}, namespace {}",
                config.credential_backend,
                config.namespace
            );
        }

        let store = config.build_store()?;
        let identity = Arc::new(IdentityManager::new(Arc::clone(&store)));

        match identity.load()? {
            Some(id) => tracing::info!("Active identity {}...", id.short()),
            None => tracing::info!("No identity on this device"),
        }

        Ok(Self {
            config,
            store,
            identity,
        })
    }

    /// The identity manager
    pub fn identity(&self) -> &Arc<IdentityManager> {
        &self.identity
    }

    /// The credential store backing the identity
    pub fn credential_store(&self) -> &Arc<dyn CredentialStore> {
        &self.store
    }

    /// The configuration this core was opened with
    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    /// Create a messenger for the active identity over the given collaborators
    pub fn messenger(
        &self,
        directory: Arc<dyn Directory>,
        relay: Arc<dyn MessageRelay>,
    ) -> Messenger {
        Messenger::new(Arc::clone(&self.identity), directory, relay)
    }
}

impl std::fmt::Debug for MercurioCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MercurioCore")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// VERSION INFO
// ============================================================================

/// Returns the version of Mercurio Core
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Returns build information for debugging
pub fn build_info() -> BuildInfo {
    BuildInfo {
        version: env!("CARGO_PKG_VERSION"),
        #[cfg(target_os = "ios")]
        target: "ios",
        #[cfg(target_os = "android")]
        target: "android",
        #[cfg(target_os = "macos")]
        target: "macos",
        #[cfg(target_os = "linux")]
        target: "linux",
        #[cfg(target_os = "windows")]
        target: "windows",
        #[cfg(target_arch = "wasm32")]
        target: "wasm32",
        #[cfg(not(any(
            target_os = "ios",
            target_os = "android",
            target_os = "macos",
            target_os = "linux",
            target_os = "windows",
            target_arch = "wasm32"
        )))]
        target: "unknown",
        profile: if cfg!(debug_assertions) {
            "debug"
        } else {
            "release"
        },
        credential_backends: credential_backends(),
    }
}

fn credential_backends() -> &'static [&'static str] {
    if cfg!(any(target_os = "ios", target_os = "macos")) {
        &["memory", "file", "keychain"]
    } else if cfg!(target_arch = "wasm32") {
        &["memory", "local_storage"]
    } else {
        &["memory", "file"]
    }
}

/// Build information for debugging
#[derive(Debug, Clone)]
pub struct BuildInfo {
    /// Crate version
    pub version: &'static str,
    /// Target platform
    pub target: &'static str,
    /// Build profile (debug/release)
    pub profile: &'static str,
    /// Credential store backends compiled in
    pub credential_backends: &'static [&'static str],
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!version().is_empty());
    }

    #[test]
    fn test_build_info() {
        let info = build_info();
        assert_eq!(info.version, version());
        assert!(info.credential_backends.contains(&"memory"));
    }

    #[test]
    fn test_open_reloads_persisted_identity() {
        let dir = tempfile::tempdir().unwrap();
        let config = CoreConfig {
            credential_backend: CredentialBackend::File {
                path: dir.path().join("credentials.json"),
                key: None,
            },
            ..CoreConfig::default()
        };

        let first = MercurioCore::open(config.clone()).unwrap();
        assert!(!first.identity().has_identity().unwrap());
        let id = first.identity().generate_identity().unwrap();
        drop(first);

        let second = MercurioCore::open(config).unwrap();
        assert_eq!(second.identity().public_material().unwrap().identifier, id);
    }
}

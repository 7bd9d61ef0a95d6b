//! Runtime configuration for [`MercurioCore`](crate::MercurioCore).

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::storage::{CredentialStore, MemoryCredentialStore, StorageKey, DEFAULT_NAMESPACE};

/// Environment variable overriding the credential namespace
pub const ENV_NAMESPACE: &str = "MERCURIO_NAMESPACE";

/// Environment variable selecting the file backend at the given path
pub const ENV_CREDENTIALS_PATH: &str = "MERCURIO_CREDENTIALS_PATH";

/// Environment variable holding the hex key that encrypts the file backend
pub const ENV_CREDENTIALS_KEY: &str = "MERCURIO_CREDENTIALS_KEY";

/// Environment variable enabling verbose logging ("1" or "true")
pub const ENV_VERBOSE: &str = "MERCURIO_VERBOSE";

/// Where identity key material is persisted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CredentialBackend {
    /// Process memory only; lost on exit
    Memory,
    /// JSON file with owner-only permissions
    File {
        /// Location of the credentials file
        path: PathBuf,
        /// Encrypt values at rest with this key
        #[serde(default, skip_serializing_if = "Option::is_none")]
        key: Option<StorageKey>,
    },
    /// Apple keychain generic passwords (iOS / macOS only)
    Keychain,
    /// Browser `localStorage` (wasm32 only)
    LocalStorage,
}

impl Default for CredentialBackend {
    fn default() -> Self {
        if cfg!(target_os = "ios") {
            CredentialBackend::Keychain
        } else if cfg!(target_arch = "wasm32") {
            CredentialBackend::LocalStorage
        } else {
            CredentialBackend::Memory
        }
    }
}

/// Configuration for opening Mercurio Core
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Namespace every credential entry is scoped under
    pub namespace: String,
    /// Credential store backend
    pub credential_backend: CredentialBackend,
    /// Enable verbose logging
    pub verbose_logging: bool,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            credential_backend: CredentialBackend::default(),
            verbose_logging: cfg!(feature = "verbose-logging"),
        }
    }
}

impl CoreConfig {
    /// Build a config from `MERCURIO_*` environment variables
    ///
    /// Fails if `MERCURIO_CREDENTIALS_KEY` is set but is not 64 hex characters.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(namespace) = lookup(ENV_NAMESPACE).filter(|ns| !ns.trim().is_empty()) {
            config.namespace = namespace.trim().to_string();
        }
        if let Some(path) = lookup(ENV_CREDENTIALS_PATH).filter(|p| !p.is_empty()) {
            let key = lookup(ENV_CREDENTIALS_KEY)
                .filter(|k| !k.trim().is_empty())
                .map(|k| StorageKey::from_hex(&k))
                .transpose()?;
            config.credential_backend = CredentialBackend::File {
                path: path.into(),
                key,
            };
        }
        if let Some(verbose) = lookup(ENV_VERBOSE) {
            config.verbose_logging = matches!(verbose.trim(), "1" | "true" | "TRUE" | "yes");
        }

        Ok(config)
    }

    /// Instantiate the configured credential store
    pub fn build_store(&self) -> Result<Arc<dyn CredentialStore>> {
        match &self.credential_backend {
            CredentialBackend::Memory => Ok(Arc::new(MemoryCredentialStore::with_namespace(
                self.namespace.clone(),
            ))),

            #[cfg(not(target_arch = "wasm32"))]
            CredentialBackend::File { path, key: None } => Ok(Arc::new(
                crate::storage::FileCredentialStore::open(path.clone(), self.namespace.clone()),
            )),
            #[cfg(not(target_arch = "wasm32"))]
            CredentialBackend::File {
                path,
                key: Some(key),
            } => Ok(Arc::new(crate::storage::FileCredentialStore::with_encryption(
                path.clone(),
                self.namespace.clone(),
                key.clone(),
            ))),
            #[cfg(target_arch = "wasm32")]
            CredentialBackend::File { .. } => Err(crate::error::Error::Internal(
                "file credential backend is not available on wasm32".into(),
            )),

            #[cfg(any(target_os = "ios", target_os = "macos"))]
            CredentialBackend::Keychain => Ok(Arc::new(
                crate::storage::KeychainCredentialStore::new(self.namespace.clone()),
            )),
            #[cfg(not(any(target_os = "ios", target_os = "macos")))]
            CredentialBackend::Keychain => Err(crate::error::Error::Internal(
                "keychain credential backend requires iOS or macOS".into(),
            )),

            #[cfg(target_arch = "wasm32")]
            CredentialBackend::LocalStorage => Ok(Arc::new(
                crate::storage::LocalStorageCredentialStore::new(self.namespace.clone()),
            )),
            #[cfg(not(target_arch = "wasm32"))]
            CredentialBackend::LocalStorage => Err(crate::error::Error::Internal(
                "localStorage credential backend requires wasm32".into(),
            )),
        }
    }
}

//! # Secure Storage
//!
//! Scoped, keyed persistence of private identity material.
//!
//! ## Platform Implementations
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      SECURE STORAGE                                     │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │  CredentialStore Trait                                          │   │
//! │  │  ─────────────────────                                           │   │
//! │  │                                                                 │   │
//! │  │  • save(entries)   - Replace each named entry                  │   │
//! │  │  • get(name)       - Current value, None if absent             │   │
//! │  │  • delete(name)    - Remove one entry                          │   │
//! │  │  • delete_all()    - Remove every identity entry (idempotent)  │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! │  ┌────────────┐  ┌────────────┐  ┌────────────┐  ┌────────────┐      │
//! │  │  Memory    │  │   File     │  │ iOS/macOS  │  │  Browser   │      │
//! │  │            │  │            │  │  Keychain  │  │ localStor. │      │
//! │  │ - Tests    │  │ - Desktop, │  │            │  │            │      │
//! │  │ - Ephemeral│  │   CLI      │  │ - Generic  │  │ - wasm32   │      │
//! │  │   sessions │  │ - Atomic   │  │   passwords│  │ - base64   │      │
//! │  │            │  │   rename   │  │ - OSStatus │  │   values   │      │
//! │  └────────────┘  └────────────┘  └────────────┘  └────────────┘      │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every backend serializes its own operations. `save` replaces whole
//! values under one lock, so a concurrent reader observes either the old or
//! the new value of an entry, never a mix.

use std::collections::HashMap;
#[cfg(not(target_arch = "wasm32"))]
use std::collections::BTreeMap;
#[cfg(not(target_arch = "wasm32"))]
use std::path::{Path, PathBuf};
#[cfg(not(target_arch = "wasm32"))]
use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine as _};
#[cfg(not(target_arch = "wasm32"))]
use once_cell::sync::Lazy;
#[cfg(any(not(target_arch = "wasm32"), target_os = "ios", target_os = "macos"))]
use parking_lot::Mutex;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
#[cfg(not(target_arch = "wasm32"))]
use uuid::Uuid;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::crypto::KEY_SIZE;
#[cfg(not(target_arch = "wasm32"))]
use crate::crypto::{open_with_aad, seal_with_aad, EncryptionKey, Nonce, NONCE_SIZE, TAG_SIZE};
use crate::error::{Error, Result};

/// Namespace used when none is configured
pub const DEFAULT_NAMESPACE: &str = "com.mercurio.messenger";

/// Logical entry names. Each is stored as an independent entry.
pub mod keys {
    /// Ed25519 public key (32 raw bytes)
    pub const SIGNING_PUBLIC_KEY: &str = "signing-public-key";

    /// Ed25519 seed (32 raw bytes)
    pub const SIGNING_PRIVATE_KEY: &str = "signing-private-key";

    /// RSA public key as the JSON wire form
    pub const EXCHANGE_PUBLIC_KEY: &str = "exchange-public-key";

    /// RSA private key as PKCS#1 DER
    pub const EXCHANGE_PRIVATE_KEY: &str = "exchange-private-key";

    /// The "05..." identifier (UTF-8)
    pub const IDENTIFIER: &str = "identifier";

    /// The 12-word recovery phrase (UTF-8)
    pub const RECOVERY_PHRASE: &str = "recovery-phrase";

    /// Every name `delete_all` removes
    pub const ALL: [&str; 6] = [
        SIGNING_PUBLIC_KEY,
        SIGNING_PRIVATE_KEY,
        EXCHANGE_PUBLIC_KEY,
        EXCHANGE_PRIVATE_KEY,
        IDENTIFIER,
        RECOVERY_PHRASE,
    ];
}

/// Durable store for private identity material
pub trait CredentialStore: Send + Sync {
    /// Namespace every entry is scoped under
    fn namespace(&self) -> &str;

    /// Replace each entry: any existing value is deleted, then the new one written
    ///
    /// Entries are written in order. A backend that fails part way may leave
    /// the earlier entries replaced and the later ones untouched.
    fn save(&self, entries: &[(&str, &[u8])]) -> Result<()>;

    /// Current value for `name`, `None` if absent
    fn get(&self, name: &str) -> Result<Option<Zeroizing<Vec<u8>>>>;

    /// Remove one entry. Returns whether it existed.
    fn delete(&self, name: &str) -> Result<bool>;

    /// Remove every known entry. Entries that are already absent are fine.
    fn delete_all(&self) -> Result<()> {
        for name in keys::ALL {
            self.delete(name)?;
        }
        Ok(())
    }

    /// Check if an entry exists
    fn contains(&self, name: &str) -> Result<bool> {
        Ok(self.get(name)?.is_some())
    }
}

// ============================================================================
// IN-MEMORY
// ============================================================================

/// In-memory store with the same semantics as the platform backends
pub struct MemoryCredentialStore {
    namespace: String,
    entries: RwLock<HashMap<String, Zeroizing<Vec<u8>>>>,
}

impl MemoryCredentialStore {
    /// Create an empty store under the default namespace
    pub fn new() -> Self {
        Self::with_namespace(DEFAULT_NAMESPACE)
    }

    /// Create an empty store under `namespace`
    pub fn with_namespace(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryCredentialStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    fn save(&self, entries: &[(&str, &[u8])]) -> Result<()> {
        let mut storage = self.entries.write();
        for (name, value) in entries {
            storage.remove(*name);
            storage.insert(name.to_string(), Zeroizing::new(value.to_vec()));
        }
        tracing::debug!("Saved {} credential entries", entries.len());
        Ok(())
    }

    fn get(&self, name: &str) -> Result<Option<Zeroizing<Vec<u8>>>> {
        Ok(self.entries.read().get(name).cloned())
    }

    fn delete(&self, name: &str) -> Result<bool> {
        Ok(self.entries.write().remove(name).is_some())
    }

    fn delete_all(&self) -> Result<()> {
        let mut storage = self.entries.write();
        for name in keys::ALL {
            storage.remove(name);
        }
        Ok(())
    }
}

// ============================================================================
// FILE
// ============================================================================

/// 256-bit key for encrypting file store values at rest
///
/// Parsed from 64 hex characters. Never printed.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StorageKey([u8; KEY_SIZE]);

impl StorageKey {
    /// Create from raw bytes
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Parse 64 hex characters
    pub fn from_hex(value: &str) -> Result<Self> {
        let bytes = Zeroizing::new(
            hex::decode(value.trim())
                .map_err(|e| Error::Internal(format!("storage key is not hex: {}", e)))?,
        );
        let key: [u8; KEY_SIZE] = bytes.as_slice().try_into().map_err(|_| {
            Error::Internal(format!(
                "storage key must be {} bytes, got {}",
                KEY_SIZE,
                bytes.len()
            ))
        })?;
        Ok(Self(key))
    }

    #[cfg(not(target_arch = "wasm32"))]
    fn encryption_key(&self) -> EncryptionKey {
        EncryptionKey::from_bytes(self.0)
    }
}

impl std::fmt::Debug for StorageKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("StorageKey([REDACTED])")
    }
}

impl TryFrom<String> for StorageKey {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::from_hex(&value)
    }
}

impl From<StorageKey> for String {
    fn from(key: StorageKey) -> Self {
        hex::encode(key.0)
    }
}

/// One lock per backing file, shared by every store instance in the process
#[cfg(not(target_arch = "wasm32"))]
static FILE_LOCKS: Lazy<Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>> = Lazy::new(Default::default);

#[cfg(not(target_arch = "wasm32"))]
fn file_lock(path: &Path) -> Arc<Mutex<()>> {
    // The file may not exist yet, so only its directory is canonicalized
    let key = match (path.parent(), path.file_name()) {
        (Some(dir), Some(name)) => {
            let dir = if dir.as_os_str().is_empty() {
                Path::new(".")
            } else {
                dir
            };
            dir.canonicalize()
                .map(|dir| dir.join(name))
                .unwrap_or_else(|_| path.to_path_buf())
        }
        _ => path.to_path_buf(),
    };
    Arc::clone(FILE_LOCKS.lock().entry(key).or_default())
}

/// JSON file store for desktop and CLI hosts
///
/// Values are base64 in a single JSON object keyed by `namespace/name`.
/// With a [`StorageKey`] each value is `nonce || ciphertext || tag` under
/// AES-256-GCM, bound to its `namespace/name`.
///
/// Every instance on the same path shares one process-wide lock, so
/// namespaces can share a file. Writes go to a uniquely named, owner-only
/// sibling file that is synced and then renamed over the original.
#[cfg(not(target_arch = "wasm32"))]
pub struct FileCredentialStore {
    namespace: String,
    path: PathBuf,
    key: Option<StorageKey>,
    lock: Arc<Mutex<()>>,
}

#[cfg(not(target_arch = "wasm32"))]
impl FileCredentialStore {
    /// Open (or lazily create) a store at `path`
    pub fn open(path: impl Into<PathBuf>, namespace: impl Into<String>) -> Self {
        let path = path.into();
        Self {
            namespace: namespace.into(),
            lock: file_lock(&path),
            path,
            key: None,
        }
    }

    /// Open a store whose values are encrypted with `key`
    pub fn with_encryption(
        path: impl Into<PathBuf>,
        namespace: impl Into<String>,
        key: StorageKey,
    ) -> Self {
        Self {
            key: Some(key),
            ..Self::open(path, namespace)
        }
    }

    /// Location of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn entry_key(&self, name: &str) -> String {
        format!("{}/{}", self.namespace, name)
    }

    fn encode_value(&self, entry: &str, value: &[u8]) -> Result<String> {
        let Some(key) = &self.key else {
            return Ok(STANDARD.encode(value));
        };

        let nonce = Nonce::random();
        let (ciphertext, tag) =
            seal_with_aad(&key.encryption_key(), &nonce, value, entry.as_bytes())?;

        let mut sealed = Vec::with_capacity(NONCE_SIZE + ciphertext.len() + TAG_SIZE);
        sealed.extend_from_slice(nonce.as_bytes());
        sealed.extend_from_slice(&ciphertext);
        sealed.extend_from_slice(&tag);
        Ok(STANDARD.encode(sealed))
    }

    fn decode_value(&self, entry: &str, encoded: &str) -> Result<Zeroizing<Vec<u8>>> {
        let raw = Zeroizing::new(
            STANDARD
                .decode(encoded)
                .map_err(|e| Error::StoreReadError(format!("entry {}: {}", entry, e)))?,
        );
        let Some(key) = &self.key else {
            return Ok(raw);
        };

        let unreadable = || Error::StoreReadError(format!("entry {} could not be decrypted", entry));
        if raw.len() < NONCE_SIZE + TAG_SIZE {
            return Err(unreadable());
        }
        let (nonce, rest) = raw.split_at(NONCE_SIZE);
        let (ciphertext, tag) = rest.split_at(rest.len() - TAG_SIZE);
        let nonce = Nonce::from_slice(nonce).ok_or_else(unreadable)?;
        let tag: [u8; TAG_SIZE] = tag.try_into().map_err(|_| unreadable())?;

        open_with_aad(&key.encryption_key(), &nonce, ciphertext, &tag, entry.as_bytes())
            .map(Zeroizing::new)
            .map_err(|_| unreadable())
    }

    fn read_map(&self) -> Result<BTreeMap<String, String>> {
        match std::fs::read(&self.path) {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                Error::StoreReadError(format!("{}: {}", self.path.display(), e))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(Error::StoreReadError(format!(
                "{}: {}",
                self.path.display(),
                e
            ))),
        }
    }

    fn write_map(&self, map: &BTreeMap<String, String>) -> Result<()> {
        let bytes = Zeroizing::new(serde_json::to_vec_pretty(map)?);

        let file_name = self
            .path
            .file_name()
            .ok_or_else(|| Error::Internal(format!("{} is not a file path", self.path.display())))?;
        let tmp = self.path.with_file_name(format!(
            ".{}.{}.tmp",
            file_name.to_string_lossy(),
            Uuid::new_v4().simple()
        ));

        let written = write_private(&tmp, &bytes).and_then(|()| std::fs::rename(&tmp, &self.path));
        if written.is_err() {
            let _ = std::fs::remove_file(&tmp);
        }
        Ok(written?)
    }
}

/// Create `path` (which must not exist) readable by the owner only, then
/// write and sync `bytes`
#[cfg(not(target_arch = "wasm32"))]
fn write_private(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    use std::io::Write;

    let mut options = std::fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

#[cfg(not(target_arch = "wasm32"))]
impl CredentialStore for FileCredentialStore {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    fn save(&self, entries: &[(&str, &[u8])]) -> Result<()> {
        let _guard = self.lock.lock();
        let mut map = self.read_map()?;
        for (name, value) in entries {
            let key = self.entry_key(name);
            map.remove(&key);
            let encoded = self.encode_value(&key, value)?;
            map.insert(key, encoded);
        }
        self.write_map(&map)?;
        tracing::debug!(
            "Saved {} credential entries to {}",
            entries.len(),
            self.path.display()
        );
        Ok(())
    }

    fn get(&self, name: &str) -> Result<Option<Zeroizing<Vec<u8>>>> {
        let _guard = self.lock.lock();
        let map = self.read_map()?;
        let key = self.entry_key(name);
        match map.get(&key) {
            Some(encoded) => self.decode_value(&key, encoded).map(Some),
            None => Ok(None),
        }
    }

    fn delete(&self, name: &str) -> Result<bool> {
        let _guard = self.lock.lock();
        let mut map = self.read_map()?;
        let existed = map.remove(&self.entry_key(name)).is_some();
        if existed {
            self.write_map(&map)?;
        }
        Ok(existed)
    }

    fn delete_all(&self) -> Result<()> {
        let _guard = self.lock.lock();
        let mut map = self.read_map()?;
        let before = map.len();
        for name in keys::ALL {
            map.remove(&self.entry_key(name));
        }
        if map.len() != before {
            self.write_map(&map)?;
        }
        Ok(())
    }
}

// ============================================================================
// APPLE KEYCHAIN
// ============================================================================

/// `errSecItemNotFound`
#[cfg(any(target_os = "ios", target_os = "macos"))]
const ERR_SEC_ITEM_NOT_FOUND: i32 = -25300;

/// Generic-password keychain items, service = namespace, account = name
#[cfg(any(target_os = "ios", target_os = "macos"))]
pub struct KeychainCredentialStore {
    service: String,
    lock: Mutex<()>,
}

#[cfg(any(target_os = "ios", target_os = "macos"))]
impl KeychainCredentialStore {
    /// Create a store for the given keychain service name
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            lock: Mutex::new(()),
        }
    }

    fn delete_item(&self, name: &str) -> Result<bool> {
        use security_framework::passwords::delete_generic_password;

        match delete_generic_password(&self.service, name) {
            Ok(()) => Ok(true),
            Err(e) if e.code() == ERR_SEC_ITEM_NOT_FOUND => Ok(false),
            Err(e) => Err(Error::StoreWriteError {
                status: e.code(),
                message: format!("Keychain delete of {} failed: {}", name, e),
            }),
        }
    }
}

#[cfg(any(target_os = "ios", target_os = "macos"))]
impl CredentialStore for KeychainCredentialStore {
    fn namespace(&self) -> &str {
        &self.service
    }

    fn save(&self, entries: &[(&str, &[u8])]) -> Result<()> {
        use security_framework::passwords::set_generic_password;

        let _guard = self.lock.lock();
        for (name, value) in entries {
            self.delete_item(name)?;
            set_generic_password(&self.service, name, value).map_err(|e| {
                Error::StoreWriteError {
                    status: e.code(),
                    message: format!("Keychain write of {} failed: {}", name, e),
                }
            })?;
        }
        Ok(())
    }

    fn get(&self, name: &str) -> Result<Option<Zeroizing<Vec<u8>>>> {
        use security_framework::passwords::get_generic_password;

        let _guard = self.lock.lock();
        match get_generic_password(&self.service, name) {
            Ok(data) => Ok(Some(Zeroizing::new(data))),
            Err(e) if e.code() == ERR_SEC_ITEM_NOT_FOUND => Ok(None),
            Err(e) => Err(Error::StoreReadError(format!(
                "Keychain read of {} failed (status {}): {}",
                name,
                e.code(),
                e
            ))),
        }
    }

    fn delete(&self, name: &str) -> Result<bool> {
        let _guard = self.lock.lock();
        self.delete_item(name)
    }

    fn delete_all(&self) -> Result<()> {
        let _guard = self.lock.lock();
        for name in keys::ALL {
            self.delete_item(name)?;
        }
        Ok(())
    }
}

// ============================================================================
// BROWSER LOCAL STORAGE
// ============================================================================

/// `window.localStorage` store for the browser client
///
/// Each value is base64 under the key `namespace/name`. The storage handle
/// is looked up on every call; wasm32 runs single-threaded, so there is no
/// lock.
#[cfg(target_arch = "wasm32")]
pub struct LocalStorageCredentialStore {
    namespace: String,
}

#[cfg(target_arch = "wasm32")]
impl LocalStorageCredentialStore {
    /// Create a store under `namespace`
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    fn storage(&self) -> Result<web_sys::Storage> {
        web_sys::window()
            .ok_or_else(|| Error::StoreReadError("no window object".into()))?
            .local_storage()
            .map_err(|e| Error::StoreReadError(format!("localStorage is not accessible: {:?}", e)))?
            .ok_or_else(|| Error::StoreReadError("localStorage is not available".into()))
    }

    fn entry_key(&self, name: &str) -> String {
        format!("{}/{}", self.namespace, name)
    }
}

#[cfg(target_arch = "wasm32")]
impl CredentialStore for LocalStorageCredentialStore {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    fn save(&self, entries: &[(&str, &[u8])]) -> Result<()> {
        let storage = self.storage()?;
        for (name, value) in entries {
            let key = self.entry_key(name);
            let encoded = Zeroizing::new(STANDARD.encode(value));
            storage
                .remove_item(&key)
                .and_then(|_| storage.set_item(&key, &encoded))
                .map_err(|e| Error::StoreWriteError {
                    status: -1,
                    message: format!("localStorage write of {} failed: {:?}", name, e),
                })?;
        }
        Ok(())
    }

    fn get(&self, name: &str) -> Result<Option<Zeroizing<Vec<u8>>>> {
        let encoded = self
            .storage()?
            .get_item(&self.entry_key(name))
            .map_err(|e| Error::StoreReadError(format!("localStorage read of {} failed: {:?}", name, e)))?;

        match encoded.map(Zeroizing::new) {
            Some(encoded) => STANDARD
                .decode(encoded.as_bytes())
                .map(|bytes| Some(Zeroizing::new(bytes)))
                .map_err(|e| Error::StoreReadError(format!("entry {} is not base64: {}", name, e))),
            None => Ok(None),
        }
    }

    fn delete(&self, name: &str) -> Result<bool> {
        let storage = self.storage()?;
        let key = self.entry_key(name);
        let existed = storage
            .get_item(&key)
            .map_err(|e| Error::StoreReadError(format!("localStorage read of {} failed: {:?}", name, e)))?
            .is_some();
        storage.remove_item(&key).map_err(|e| Error::StoreWriteError {
            status: -1,
            message: format!("localStorage delete of {} failed: {:?}", name, e),
        })?;
        Ok(existed)
    }
}

// ============================================================================
// TESTS
// ============================================================================

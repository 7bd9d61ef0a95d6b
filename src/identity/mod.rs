//! # Identity Module
//!
//! Creation, recovery and lifetime of the single identity active on a device.
//!
//! ## Identity Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         IDENTITY SYSTEM                                 │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     USER IDENTITY                               │   │
//! │  ├─────────────────────────────────────────────────────────────────┤   │
//! │  │                                                                 │   │
//! │  │  Recovery Phrase (12 words)                                     │   │
//! │  │         │                                                       │   │
//! │  │         ▼                                                       │   │
//! │  │  ┌─────────────────┐   ┌─────────────────┐                     │   │
//! │  │  │ Signing KeyPair │   │ Exchange        │                     │   │
//! │  │  │ (Ed25519)       │   │ KeyPair (RSA)   │                     │   │
//! │  │  │                 │   │                 │                     │   │
//! │  │  │ • Identifier    │   │ • Unwraps       │                     │   │
//! │  │  │ • Signatures    │   │   message keys  │                     │   │
//! │  │  │ • From phrase   │   │ • Random        │                     │   │
//! │  │  └─────────────────┘   └─────────────────┘                     │   │
//! │  │                                                                 │   │
//! │  │  Identifier: 05d75a980182b10ab7d54bfed3c964073a0ee172f3...     │   │
//! │  │  (Derived from Ed25519 public key)                              │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Restore Caveat
//!
//! Restoring from the phrase reproduces the identifier, but the exchange
//! keypair is generated fresh. Messages encrypted under the previous
//! exchange key can no longer be decrypted after a restore.
//!
//! ## Access
//!
//! [`IdentityManager`] owns the in-memory identity behind a mutex. Generation,
//! restoration, logout and reads are linearized through it, together with the
//! credential store writes they perform.

mod identifier;
mod recovery;

pub use identifier::{Identifier, IDENTIFIER_LEN, IDENTIFIER_PREFIX};
pub use recovery::{RecoveryPhrase, WORD_COUNT};

use std::sync::Arc;

use parking_lot::Mutex;
use zeroize::Zeroizing;

use crate::crypto::{
    EncryptedPayload, ExchangeKeyPair, RsaPublicKey, RsaPublicKeyWire, SigningKeyPair,
    SIGNATURE_SIZE,
};
use crate::error::{Error, Result};
use crate::storage::{keys, CredentialStore};

/// The active identity's key material
///
/// Keys are shared behind `Arc` so decryption can run outside the manager's
/// lock. Every wrapper zeroizes on drop.
pub struct Identity {
    identifier: Identifier,
    signing: Arc<SigningKeyPair>,
    exchange: Arc<ExchangeKeyPair>,
    exchange_public: RsaPublicKey,
}

impl Identity {
    fn new(signing: SigningKeyPair, exchange: ExchangeKeyPair) -> Self {
        let identifier = Identifier::from_signing_key(&signing.public_bytes());
        let exchange_public = exchange.public_key();
        Self {
            identifier,
            signing: Arc::new(signing),
            exchange: Arc::new(exchange),
            exchange_public,
        }
    }

    /// Get the identifier
    pub fn identifier(&self) -> &Identifier {
        &self.identifier
    }

    /// Get the public material (safe to share)
    pub fn public_material(&self) -> PublicMaterial {
        PublicMaterial {
            identifier: self.identifier.clone(),
            signing_public_key: self.signing.public_bytes(),
            exchange_public_key: self.exchange_public.clone(),
        }
    }
}

impl std::fmt::Debug for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Identity")
            .field("identifier", &self.identifier.short())
            .field("keys", &"[REDACTED]")
            .finish()
    }
}

/// Public portion of an identity that is published to the directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicMaterial {
    /// "05..." identifier
    pub identifier: Identifier,

    /// Ed25519 public key
    pub signing_public_key: [u8; 32],

    /// RSA exchange public key
    pub exchange_public_key: RsaPublicKey,
}

/// Owns the device's identity and its persisted copy
pub struct IdentityManager {
    store: Arc<dyn CredentialStore>,
    active: Mutex<Option<Identity>>,
}

impl IdentityManager {
    /// Create a manager over `store`. Nothing is loaded until first use.
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self {
            store,
            active: Mutex::new(None),
        }
    }

    /// Create a brand new identity, replacing any existing one
    ///
    /// ## Important
    ///
    /// The recovery phrase is persisted and readable through
    /// [`recovery_phrase`](Self::recovery_phrase) so the user can write it
    /// down. It is the only way to recover the identifier later.
    pub fn generate_identity(&self) -> Result<Identifier> {
        let recovery = RecoveryPhrase::generate()?;
        let signing = SigningKeyPair::from_seed(&recovery.signing_seed());
        let exchange = ExchangeKeyPair::generate()?;

        let identifier = self.install(signing, exchange, &recovery)?;
        tracing::info!("Identity generated: {}...", identifier.short());
        Ok(identifier)
    }

    /// Recreate the identity whose recovery phrase is `phrase`
    ///
    /// The identifier is reproduced exactly. The exchange keypair is new.
    pub fn restore_from_phrase(&self, phrase: &str) -> Result<Identifier> {
        let recovery = RecoveryPhrase::from_phrase(phrase)?;
        let signing = SigningKeyPair::from_seed(&recovery.signing_seed());
        let exchange = ExchangeKeyPair::generate()?;

        let identifier = self.install(signing, exchange, &recovery)?;
        tracing::info!("Identity restored: {}...", identifier.short());
        Ok(identifier)
    }

    fn install(
        &self,
        signing: SigningKeyPair,
        exchange: ExchangeKeyPair,
        recovery: &RecoveryPhrase,
    ) -> Result<Identifier> {
        let identity = Identity::new(signing, exchange);

        let signing_public = identity.signing.public_bytes();
        let signing_secret = identity.signing.secret_bytes();
        let exchange_public = serde_json::to_vec(&identity.exchange_public.to_wire())?;
        let exchange_secret = identity.exchange.to_pkcs1_der()?;
        let phrase = recovery.phrase();

        let mut active = self.active.lock();
        *active = None;

        // The identifier goes last: until it is written, a partially saved
        // identity either loads as absent or fails the identifier check.
        let saved = self.store.save(&[
            (keys::RECOVERY_PHRASE, phrase.as_bytes()),
            (keys::SIGNING_PUBLIC_KEY, signing_public.as_slice()),
            (keys::SIGNING_PRIVATE_KEY, signing_secret.as_slice()),
            (keys::EXCHANGE_PUBLIC_KEY, exchange_public.as_slice()),
            (keys::EXCHANGE_PRIVATE_KEY, exchange_secret.as_slice()),
            (keys::IDENTIFIER, identity.identifier.as_str().as_bytes()),
        ]);
        if let Err(e) = saved {
            tracing::warn!("Saving identity failed, erasing partial entries: {}", e);
            if let Err(cleanup) = self.store.delete_all() {
                tracing::warn!("Erasing partial identity failed: {}", cleanup);
            }
            return Err(e);
        }

        let identifier = identity.identifier.clone();
        *active = Some(identity);
        Ok(identifier)
    }

    /// Load a previously persisted identity into memory
    ///
    /// Returns the identifier, or `None` if the store holds no identity.
    pub fn load(&self) -> Result<Option<Identifier>> {
        let mut active = self.active.lock();
        *active = self.read_stored()?;
        Ok(active.as_ref().map(|identity| identity.identifier.clone()))
    }

    fn read_stored(&self) -> Result<Option<Identity>> {
        let Some(identifier) = self.stored_identifier()? else {
            return Ok(None);
        };

        let signing = self
            .store
            .get(keys::SIGNING_PRIVATE_KEY)?
            .ok_or(Error::KeysNotFound)?;
        let exchange = self
            .store
            .get(keys::EXCHANGE_PRIVATE_KEY)?
            .ok_or(Error::KeysNotFound)?;

        let identity = Identity::new(
            SigningKeyPair::from_bytes(&signing)?,
            ExchangeKeyPair::from_pkcs1_der(&exchange)?,
        );

        if identity.identifier != identifier {
            return Err(Error::StoreReadError(
                "stored identifier does not match the signing key".into(),
            ));
        }

        if let Some(stored) = self.store.get(keys::EXCHANGE_PUBLIC_KEY)? {
            let wire: RsaPublicKeyWire = serde_json::from_slice(&stored)
                .map_err(|e| Error::StoreReadError(format!("exchange public key: {}", e)))?;
            if RsaPublicKey::from_wire(&wire)? != identity.exchange_public {
                tracing::warn!("Stored exchange public key does not match private key");
            }
        }

        tracing::debug!("Loaded identity {}...", identifier.short());
        Ok(Some(identity))
    }

    fn stored_identifier(&self) -> Result<Option<Identifier>> {
        match self.store.get(keys::IDENTIFIER)? {
            Some(bytes) => {
                let value = std::str::from_utf8(&bytes)
                    .map_err(|e| Error::StoreReadError(format!("identifier: {}", e)))?;
                Identifier::parse(value).map(Some)
            }
            None => Ok(None),
        }
    }

    /// Run `f` against the active identity, loading it from the store if needed
    fn with_active<T>(&self, f: impl FnOnce(&Identity) -> T) -> Result<T> {
        let mut active = self.active.lock();
        if active.is_none() {
            *active = self.read_stored()?;
        }
        active.as_ref().map(f).ok_or(Error::KeysNotFound)
    }

    /// Check whether an identity is persisted on this device
    pub fn has_identity(&self) -> Result<bool> {
        let _active = self.active.lock();
        self.store.contains(keys::IDENTIFIER)
    }

    /// Get the persisted identifier
    pub fn identifier(&self) -> Result<Option<Identifier>> {
        let _active = self.active.lock();
        self.stored_identifier()
    }

    /// Get the persisted recovery phrase
    ///
    /// ## Security Warning
    ///
    /// Only for showing to the user. Never log.
    pub fn recovery_phrase(&self) -> Result<Option<Zeroizing<String>>> {
        let _active = self.active.lock();
        match self.store.get(keys::RECOVERY_PHRASE)? {
            Some(bytes) => String::from_utf8(bytes.to_vec())
                .map(|phrase| Some(Zeroizing::new(phrase)))
                .map_err(|e| Error::StoreReadError(format!("recovery phrase: {}", e))),
            None => Ok(None),
        }
    }

    /// Public keys of the active identity
    pub fn public_material(&self) -> Result<PublicMaterial> {
        self.with_active(Identity::public_material)
    }

    /// Erase the identity from memory and from the store
    ///
    /// Safe to call when no identity exists.
    pub fn clear_identity(&self) -> Result<()> {
        let mut active = self.active.lock();
        self.store.delete_all()?;
        if let Some(identity) = active.take() {
            tracing::info!("Identity cleared: {}...", identity.identifier.short());
        }
        Ok(())
    }

    /// Decrypt a payload addressed to the active identity
    pub fn decrypt_message(&self, payload: &EncryptedPayload) -> Result<String> {
        let exchange = self.with_active(|identity| Arc::clone(&identity.exchange))?;
        crate::crypto::decrypt_message(payload, &exchange)
    }

    /// Sign `message` with the active identity's Ed25519 key
    pub fn sign(&self, message: &[u8]) -> Result<[u8; SIGNATURE_SIZE]> {
        let signing = self.with_active(|identity| Arc::clone(&identity.signing))?;
        Ok(signing.sign(message))
    }

    /// Verify a signature made by the holder of `identifier`
    pub fn verify(identifier: &Identifier, message: &[u8], signature: &[u8]) -> Result<()> {
        crate::crypto::verify(&identifier.signing_public_key()?, message, signature)
    }
}

impl std::fmt::Debug for IdentityManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityManager")
            .field("namespace", &self.store.namespace())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::encrypt_message;
    use crate::storage::MemoryCredentialStore;

    const TEST_PHRASE: &str =
        "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    const OTHER_PHRASE: &str =
        "legal winner thank year wave sausage worth useful legal winner thank yellow";

    fn manager() -> (IdentityManager, Arc<MemoryCredentialStore>) {
        let store = Arc::new(MemoryCredentialStore::new());
        (IdentityManager::new(store.clone()), store)
    }

    fn expected_identifier(phrase: &str) -> Identifier {
        let signing =
            SigningKeyPair::from_seed(&RecoveryPhrase::from_phrase(phrase).unwrap().signing_seed());
        Identifier::from_signing_key(&signing.public_bytes())
    }

    /// Writes entries one at a time, like the keychain, and fails on a chosen one
    #[derive(Default)]
    struct FlakyStore {
        inner: MemoryCredentialStore,
        fail_on: Mutex<Option<&'static str>>,
        written: Mutex<Vec<String>>,
    }

    impl CredentialStore for FlakyStore {
        fn namespace(&self) -> &str {
            self.inner.namespace()
        }

        fn save(&self, entries: &[(&str, &[u8])]) -> Result<()> {
            for (name, value) in entries {
                if *self.fail_on.lock() == Some(*name) {
                    return Err(Error::StoreWriteError {
                        status: -34018,
                        message: format!("write of {} refused", name),
                    });
                }
                self.inner.save(&[(*name, *value)])?;
                self.written.lock().push(name.to_string());
            }
            Ok(())
        }

        fn get(&self, name: &str) -> Result<Option<Zeroizing<Vec<u8>>>> {
            self.inner.get(name)
        }

        fn delete(&self, name: &str) -> Result<bool> {
            self.inner.delete(name)
        }
    }

    #[test]
    fn test_generate_identity() {
        let (manager, store) = manager();
        assert!(!manager.has_identity().unwrap());

        let id = manager.generate_identity().unwrap();

        assert!(manager.has_identity().unwrap());
        assert_eq!(manager.identifier().unwrap(), Some(id.clone()));
        assert_eq!(id.as_str().len(), 66);
        assert!(id.as_str().starts_with("05"));

        let phrase = manager.recovery_phrase().unwrap().unwrap();
        assert_eq!(phrase.split(' ').count(), 12);

        for name in keys::ALL {
            assert!(store.contains(name).unwrap(), "missing entry {}", name);
        }
    }

    #[test]
    fn test_generate_twice_gives_different_identifiers() {
        let (manager, _) = manager();
        let first = manager.generate_identity().unwrap();
        let second = manager.generate_identity().unwrap();
        assert_ne!(first, second);
        assert_eq!(manager.identifier().unwrap(), Some(second));
    }

    #[test]
    fn test_generated_identity_is_recoverable() {
        let (manager, _) = manager();
        let id = manager.generate_identity().unwrap();
        let phrase = manager.recovery_phrase().unwrap().unwrap();

        let (other_device, _) = self::manager();
        assert_eq!(other_device.restore_from_phrase(&phrase).unwrap(), id);
    }

    #[test]
    fn test_restore_is_deterministic() {
        let (manager, _) = manager();
        let first = manager.restore_from_phrase(TEST_PHRASE).unwrap();
        let second = manager.restore_from_phrase(TEST_PHRASE).unwrap();
        assert_eq!(first, second);

        // Seed bytes used directly as the Ed25519 secret
        let expected = SigningKeyPair::from_seed(
            &RecoveryPhrase::from_phrase(TEST_PHRASE).unwrap().signing_seed(),
        );
        assert_eq!(first, Identifier::from_signing_key(&expected.public_bytes()));
    }

    #[test]
    fn test_restore_normalizes_phrase() {
        let (manager, _) = manager();
        let messy = format!("  {}  ", TEST_PHRASE.to_uppercase());
        manager.restore_from_phrase(&messy).unwrap();
        assert_eq!(
            manager.recovery_phrase().unwrap().unwrap().as_str(),
            TEST_PHRASE
        );
    }

    #[test]
    fn test_restore_rejects_bad_checksum_without_touching_store() {
        let (manager, store) = manager();
        let flipped = TEST_PHRASE.replace("about", "abandon");

        assert!(matches!(
            manager.restore_from_phrase(&flipped),
            Err(Error::InvalidRecoveryPhrase(_))
        ));
        assert!(!store.contains(keys::IDENTIFIER).unwrap());
    }

    #[test]
    fn test_restore_generates_new_exchange_key() {
        let (manager, _) = manager();
        manager.restore_from_phrase(TEST_PHRASE).unwrap();
        let before = manager.public_material().unwrap();

        let payload = encrypt_message("sent before restore", &before.exchange_public_key).unwrap();
        assert_eq!(
            manager.decrypt_message(&payload).unwrap(),
            "sent before restore"
        );

        manager.restore_from_phrase(TEST_PHRASE).unwrap();
        let after = manager.public_material().unwrap();

        assert_eq!(before.identifier, after.identifier);
        assert_eq!(before.signing_public_key, after.signing_public_key);
        assert_ne!(before.exchange_public_key, after.exchange_public_key);
        assert!(matches!(
            manager.decrypt_message(&payload),
            Err(Error::DecryptionFailed)
        ));
    }

    #[test]
    fn test_public_material_without_identity() {
        let (manager, _) = manager();
        assert!(matches!(
            manager.public_material(),
            Err(Error::KeysNotFound)
        ));
        assert!(matches!(manager.sign(b"x"), Err(Error::KeysNotFound)));
    }

    #[test]
    fn test_clear_identity() {
        let (manager, store) = manager();
        manager.generate_identity().unwrap();

        manager.clear_identity().unwrap();

        assert!(!manager.has_identity().unwrap());
        assert!(manager.identifier().unwrap().is_none());
        assert!(manager.recovery_phrase().unwrap().is_none());
        assert!(matches!(
            manager.public_material(),
            Err(Error::KeysNotFound)
        ));
        for name in keys::ALL {
            assert!(!store.contains(name).unwrap());
        }

        // Idempotent
        manager.clear_identity().unwrap();
    }

    #[test]
    fn test_load_from_existing_store() {
        let (manager, store) = manager();
        let id = manager.generate_identity().unwrap();
        let material = manager.public_material().unwrap();
        let payload = encrypt_message("persisted", &material.exchange_public_key).unwrap();

        let reopened = IdentityManager::new(store);
        assert_eq!(reopened.load().unwrap(), Some(id));
        assert_eq!(reopened.public_material().unwrap(), material);
        assert_eq!(reopened.decrypt_message(&payload).unwrap(), "persisted");
    }

    #[test]
    fn test_load_empty_store() {
        let (manager, _) = manager();
        assert_eq!(manager.load().unwrap(), None);
    }

    #[test]
    fn test_load_detects_mismatched_identifier() {
        let (manager, store) = manager();
        manager.generate_identity().unwrap();

        let other = Identifier::from_signing_key(&[9u8; 32]);
        store
            .save(&[(keys::IDENTIFIER, other.as_str().as_bytes())])
            .unwrap();

        let reopened = IdentityManager::new(store);
        assert!(matches!(reopened.load(), Err(Error::StoreReadError(_))));
    }

    #[test]
    fn test_exchange_public_key_stored_as_wire_json() {
        let (manager, store) = manager();
        manager.generate_identity().unwrap();
        let material = manager.public_material().unwrap();

        let stored = store.get(keys::EXCHANGE_PUBLIC_KEY).unwrap().unwrap();
        let wire: RsaPublicKeyWire = serde_json::from_slice(&stored).unwrap();
        assert_eq!(wire, material.exchange_public_key.to_wire());
    }

    #[test]
    fn test_sign_and_verify() {
        let (manager, _) = manager();
        let id = manager.generate_identity().unwrap();

        let signature = manager.sign(b"directory entry").unwrap();
        assert!(IdentityManager::verify(&id, b"directory entry", &signature).is_ok());
        assert!(IdentityManager::verify(&id, b"tampered entry", &signature).is_err());
    }

    #[test]
    fn test_debug_redacts() {
        let (manager, _) = manager();
        manager.generate_identity().unwrap();
        let debug = manager.with_active(|identity| format!("{:?}", identity)).unwrap();
        assert!(debug.contains("REDACTED"));
    }

    #[test]
    fn test_identifier_is_written_last() {
        let store = Arc::new(FlakyStore::default());
        let manager = IdentityManager::new(store.clone());
        manager.generate_identity().unwrap();

        let written = store.written.lock();
        assert_eq!(written.len(), keys::ALL.len());
        assert_eq!(written.last().map(String::as_str), Some(keys::IDENTIFIER));
    }

    #[test]
    fn test_failed_save_leaves_no_partial_identity() {
        for failing in [keys::EXCHANGE_PRIVATE_KEY, keys::IDENTIFIER] {
            let store = Arc::new(FlakyStore::default());
            let manager = IdentityManager::new(store.clone());
            manager.restore_from_phrase(TEST_PHRASE).unwrap();

            *store.fail_on.lock() = Some(failing);
            assert!(matches!(
                manager.restore_from_phrase(OTHER_PHRASE),
                Err(Error::StoreWriteError { .. })
            ));

            // Neither the old nor the new identity survives, in memory or stored
            assert!(!manager.has_identity().unwrap());
            assert_eq!(manager.identifier().unwrap(), None);
            assert!(manager.recovery_phrase().unwrap().is_none());
            assert!(matches!(manager.public_material(), Err(Error::KeysNotFound)));
            for name in keys::ALL {
                assert!(store.get(name).unwrap().is_none(), "{} left behind", name);
            }
        }
    }

    #[test]
    fn test_readers_never_see_a_mixed_identity() {
        let (manager, _) = manager();
        let manager = Arc::new(manager);
        let known = [expected_identifier(TEST_PHRASE), expected_identifier(OTHER_PHRASE)];
        let phrases = [TEST_PHRASE, OTHER_PHRASE];
        let done = Arc::new(std::sync::atomic::AtomicBool::new(false));

        let readers: Vec<_> = (0..3)
            .map(|_| {
                let manager = Arc::clone(&manager);
                let known = known.clone();
                let done = Arc::clone(&done);
                std::thread::spawn(move || {
                    while !done.load(std::sync::atomic::Ordering::SeqCst) {
                        if let Some(id) = manager.identifier().unwrap() {
                            assert!(known.contains(&id), "unknown identifier {}", id);
                        }

                        match manager.public_material() {
                            Ok(material) => {
                                assert!(known.contains(&material.identifier));
                                assert_eq!(
                                    material.identifier,
                                    Identifier::from_signing_key(&material.signing_public_key)
                                );
                                assert_eq!(material.exchange_public_key.modulus_bits(), 2048);
                            }
                            Err(Error::KeysNotFound) => {}
                            Err(e) => panic!("reader saw {:?}", e),
                        }

                        if let Some(phrase) = manager.recovery_phrase().unwrap() {
                            assert!(phrases.contains(&phrase.as_str()));
                        }
                    }
                })
            })
            .collect();

        for _ in 0..3 {
            assert_eq!(manager.restore_from_phrase(TEST_PHRASE).unwrap(), known[0]);
            assert_eq!(manager.restore_from_phrase(OTHER_PHRASE).unwrap(), known[1]);
            manager.clear_identity().unwrap();
        }
        manager.restore_from_phrase(TEST_PHRASE).unwrap();
        done.store(true, std::sync::atomic::Ordering::SeqCst);

        for reader in readers {
            reader.join().unwrap();
        }
        assert_eq!(manager.identifier().unwrap(), Some(known[0].clone()));
    }
}

//! # Encryption Module
//!
//! Hybrid message encryption: AES-256-GCM for the content, RSA-OAEP-SHA256
//! to wrap the per-message AES key for the recipient.
//!
//! ## Encryption Flow
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      MESSAGE ENCRYPTION FLOW                            │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  SENDER                                                                │
//! │  ─────────────────────────────────────────────────────────────────      │
//! │                                                                         │
//! │  1. Fresh AES-256 key (32 random bytes)                                │
//! │  2. Fresh nonce (12 random bytes)                                      │
//! │  3. AES-256-GCM(key, nonce, utf8(plaintext))                           │
//! │         ↓                                                               │
//! │     ciphertext || tag(16)  ──split──►  ciphertext, tag                 │
//! │  4. RSA-OAEP-SHA256(recipient public key, key)  →  wrapped key         │
//! │  5. base64 each of: ciphertext, wrapped key, nonce, tag                │
//! │                                                                         │
//! │  RECIPIENT                                                             │
//! │  ─────────────────────────────────────────────────────────────────      │
//! │                                                                         │
//! │  1. RSA-OAEP-SHA256 decrypt wrapped key → 32-byte AES key              │
//! │  2. ciphertext || tag                                                  │
//! │  3. AES-256-GCM decrypt with nonce (tag verified first)                │
//! │  4. UTF-8 decode                                                       │
//! │                                                                         │
//! │  Any failure in 1–4 is reported as the same DecryptionFailed.          │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Security Properties
//!
//! | Property | Guarantee |
//! |----------|-----------|
//! | Confidentiality | Only the holder of the recipient's exchange key can read it |
//! | Integrity | Tampering with any field fails authentication |
//! | Key freshness | Key and nonce are new for every call |
//! | Forward Secrecy | None: a leaked exchange key opens every past message |

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Nonce as AesNonce,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::rngs::OsRng;
use rand::RngCore;
use rsa::Oaep;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use zeroize::{ZeroizeOnDrop, Zeroizing};

use super::codec::RsaPublicKey;
use super::keys::ExchangeKeyPair;
use crate::error::{Error, Result};

/// Size of the AES-GCM nonce in bytes (96 bits)
pub const NONCE_SIZE: usize = 12;

/// Size of the AES-GCM authentication tag in bytes (128 bits)
pub const TAG_SIZE: usize = 16;

/// Size of the message key in bytes (256 bits)
pub const KEY_SIZE: usize = 32;

/// A nonce (number used once) for AES-GCM encryption
///
/// Every message uses its own random key, so a random nonce never repeats
/// under the same key.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Nonce(pub [u8; NONCE_SIZE]);

impl Nonce {
    /// Generate a cryptographically random nonce
    pub fn random() -> Self {
        let mut bytes = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Parse from a slice; `None` unless exactly 12 bytes
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        bytes.try_into().ok().map(Self)
    }

    /// Get the raw bytes
    pub fn as_bytes(&self) -> &[u8; NONCE_SIZE] {
        &self.0
    }
}

/// An AES-256-GCM message key
///
/// Zeroized when dropped.
#[derive(ZeroizeOnDrop)]
pub struct EncryptionKey([u8; KEY_SIZE]);

impl EncryptionKey {
    /// Generate a random key
    pub fn random() -> Self {
        let mut bytes = [0u8; KEY_SIZE];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Create from raw bytes
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

/// Encrypt with AES-256-GCM, returning `(ciphertext, tag)` separately
pub fn seal(key: &EncryptionKey, nonce: &Nonce, plaintext: &[u8]) -> Result<(Vec<u8>, [u8; TAG_SIZE])> {
    seal_with_aad(key, nonce, plaintext, &[])
}

/// [`seal`] with associated data that must be presented again to [`open_with_aad`]
pub fn seal_with_aad(
    key: &EncryptionKey,
    nonce: &Nonce,
    plaintext: &[u8],
    aad: &[u8],
) -> Result<(Vec<u8>, [u8; TAG_SIZE])> {
    let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
        .map_err(|e| Error::EncryptionFailed(format!("Invalid key: {}", e)))?;

    let mut combined = cipher
        .encrypt(
            AesNonce::from_slice(nonce.as_bytes()),
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|e| Error::EncryptionFailed(format!("AES-GCM: {}", e)))?;

    let split = combined
        .len()
        .checked_sub(TAG_SIZE)
        .ok_or_else(|| Error::EncryptionFailed("AES-GCM output shorter than tag".into()))?;
    let mut tag = [0u8; TAG_SIZE];
    tag.copy_from_slice(&combined[split..]);
    combined.truncate(split);

    Ok((combined, tag))
}

/// Decrypt with AES-256-GCM. The tag is verified before anything is returned.
pub fn open(key: &EncryptionKey, nonce: &Nonce, ciphertext: &[u8], tag: &[u8; TAG_SIZE]) -> Result<Vec<u8>> {
    open_with_aad(key, nonce, ciphertext, tag, &[])
}

/// [`open`] for data sealed by [`seal_with_aad`]
pub fn open_with_aad(
    key: &EncryptionKey,
    nonce: &Nonce,
    ciphertext: &[u8],
    tag: &[u8; TAG_SIZE],
    aad: &[u8],
) -> Result<Vec<u8>> {
    let cipher =
        Aes256Gcm::new_from_slice(key.as_bytes()).map_err(|_| Error::DecryptionFailed)?;

    let mut combined = Vec::with_capacity(ciphertext.len() + TAG_SIZE);
    combined.extend_from_slice(ciphertext);
    combined.extend_from_slice(tag);

    cipher
        .decrypt(
            AesNonce::from_slice(nonce.as_bytes()),
            Payload {
                msg: combined.as_slice(),
                aad,
            },
        )
        .map_err(|_| Error::DecryptionFailed)
}

/// An encrypted message as stored by the relay
///
/// Field names on the wire are the relay's column names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedPayload {
    /// base64 AES-GCM ciphertext without the tag
    #[serde(rename = "encrypted_content")]
    pub ciphertext: String,
    /// base64 RSA-OAEP-wrapped AES key
    #[serde(rename = "encrypted_aes_key")]
    pub wrapped_key: String,
    /// base64 12-byte nonce
    pub nonce: String,
    /// base64 16-byte authentication tag
    #[serde(rename = "mac")]
    pub tag: String,
}

/// Encrypt `plaintext` for the holder of `recipient`'s exchange key
pub fn encrypt_message(plaintext: &str, recipient: &RsaPublicKey) -> Result<EncryptedPayload> {
    let recipient_key = recipient.to_rsa_key()?;

    let key = EncryptionKey::random();
    let nonce = Nonce::random();

    let (ciphertext, tag) = seal(&key, &nonce, plaintext.as_bytes())?;

    let wrapped_key = recipient_key
        .encrypt(&mut OsRng, Oaep::new::<Sha256>(), key.as_bytes())
        .map_err(|e| Error::EncryptionFailed(format!("RSA-OAEP: {}", e)))?;

    Ok(EncryptedPayload {
        ciphertext: STANDARD.encode(ciphertext),
        wrapped_key: STANDARD.encode(wrapped_key),
        nonce: STANDARD.encode(nonce.as_bytes()),
        tag: STANDARD.encode(tag),
    })
}

/// Decrypt a payload addressed to `exchange_key`
///
/// Every failure (bad base64, wrong field size, OAEP error, tag mismatch,
/// invalid UTF-8) is reported as [`Error::DecryptionFailed`].
pub fn decrypt_message(payload: &EncryptedPayload, exchange_key: &ExchangeKeyPair) -> Result<String> {
    let field = |value: &str| STANDARD.decode(value).map_err(|_| Error::DecryptionFailed);

    let wrapped_key = field(&payload.wrapped_key)?;
    let ciphertext = field(&payload.ciphertext)?;
    let nonce = Nonce::from_slice(&field(&payload.nonce)?).ok_or(Error::DecryptionFailed)?;
    let tag: [u8; TAG_SIZE] = field(&payload.tag)?
        .try_into()
        .map_err(|_| Error::DecryptionFailed)?;

    let raw_key = exchange_key.unwrap_key(&wrapped_key)?;
    let key_bytes: Zeroizing<[u8; KEY_SIZE]> = Zeroizing::new(
        raw_key
            .as_slice()
            .try_into()
            .map_err(|_| Error::DecryptionFailed)?,
    );
    let key = EncryptionKey::from_bytes(*key_bytes);

    let plaintext = open(&key, &nonce, &ciphertext, &tag)?;
    String::from_utf8(plaintext).map_err(|_| Error::DecryptionFailed)
}

// ============================================================================
// TESTS
// ============================================================================

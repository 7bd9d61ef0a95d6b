//! # Cryptography Module
//!
//! The cryptographic primitives both Mercurio clients must agree on
//! byte-for-byte.
//!
//! ## Security Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    CRYPTOGRAPHIC ARCHITECTURE                           │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    KEY HIERARCHY                                │   │
//! │  ├─────────────────────────────────────────────────────────────────┤   │
//! │  │                                                                 │   │
//! │  │  Recovery Phrase (BIP39 - 12 words, 128 bits of entropy)       │   │
//! │  │                          │                                      │   │
//! │  │                          ▼                                      │   │
//! │  │  ┌─────────────────────────────────────────────────────────┐   │   │
//! │  │  │              BIP39 Seed (512 bits)                       │   │   │
//! │  │  │         Derived via PBKDF2-SHA512 (2048 rounds)         │   │   │
//! │  │  └─────────────────────────────────────────────────────────┘   │   │
//! │  │                          │ first 32 bytes, unclamped           │   │
//! │  │                          ▼                                      │   │
//! │  │  ┌─────────────────┐         ┌─────────────────┐              │   │
//! │  │  │  Signing Key    │         │ Exchange Key    │              │   │
//! │  │  │  (Ed25519)      │         │ (RSA-2048)      │              │   │
//! │  │  │                 │         │                 │              │   │
//! │  │  │ • Identifier    │         │ • Random, NOT   │              │   │
//! │  │  │ • Signatures    │         │   from phrase   │              │   │
//! │  │  └─────────────────┘         └─────────────────┘              │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Algorithm Choices
//!
//! | Algorithm | Purpose |
//! |-----------|---------|
//! | Ed25519 | Signing identity, identifier derivation |
//! | RSA-2048 OAEP-SHA256 | Wrapping per-message AES keys |
//! | AES-256-GCM | Message content |
//! | BIP39 | Recovery phrase |
//!
//! The browser client relies on WebCrypto, which is why the exchange key is
//! RSA rather than X25519.

pub mod codec;
mod encryption;
mod keys;

pub use codec::{decode_public_key_der, encode_public_key_der, RsaPublicKey, RsaPublicKeyWire};
pub use encryption::{
    decrypt_message, encrypt_message, open, open_with_aad, seal, seal_with_aad, EncryptedPayload,
    EncryptionKey, Nonce, KEY_SIZE, NONCE_SIZE, TAG_SIZE,
};
pub use keys::{verify, ExchangeKeyPair, SigningKeyPair, EXCHANGE_KEY_BITS, SIGNATURE_SIZE};

#[cfg(test)]
pub(crate) use keys::test_keys;

/// Size of Ed25519 public keys in bytes
pub const PUBLIC_KEY_SIZE: usize = 32;

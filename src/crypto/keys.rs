//! # Key Management
//!
//! Wrappers around the two asymmetric keypairs an identity owns.
//!
//! ## Key Types
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          KEY TYPES                                      │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │  SigningKeyPair (Ed25519)                                       │   │
//! │  │  ─────────────────────────                                       │   │
//! │  │                                                                  │   │
//! │  │  Purpose:                                                       │   │
//! │  │  • Deriving the "05..." identifier                              │   │
//! │  │  • Signing published material                                   │   │
//! │  │                                                                  │   │
//! │  │  Format:                                                        │   │
//! │  │  • Private key: 32-byte seed (zeroized on drop)                │   │
//! │  │  • Public key: 32 bytes                                        │   │
//! │  │  • Deterministic: recoverable from the recovery phrase         │   │
//! │  │                                                                  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │  ExchangeKeyPair (RSA-2048, e = 65537)                          │   │
//! │  │  ─────────────────────────────────────                           │   │
//! │  │                                                                  │   │
//! │  │  Purpose:                                                       │   │
//! │  │  • Unwrapping per-message AES keys (RSA-OAEP-SHA256)            │   │
//! │  │                                                                  │   │
//! │  │  Format:                                                        │   │
//! │  │  • Private key: PKCS#1 DER (zeroized on drop)                  │   │
//! │  │  • Public key: modulus + exponent (see codec)                  │   │
//! │  │  • Random: NOT recoverable from the recovery phrase            │   │
//! │  │                                                                  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use rsa::pkcs1::{DecodeRsaPrivateKey, EncodeRsaPrivateKey};
use rsa::{Oaep, RsaPrivateKey};
use sha2::Sha256;
use zeroize::{ZeroizeOnDrop, Zeroizing};

use super::codec::RsaPublicKey;
use crate::error::{Error, Result};

/// Size of the exchange modulus in bits
pub const EXCHANGE_KEY_BITS: usize = 2048;

/// Size of an Ed25519 signature in bytes
pub const SIGNATURE_SIZE: usize = 64;

/// Ed25519 signing keypair
#[derive(ZeroizeOnDrop)]
pub struct SigningKeyPair {
    #[zeroize(skip)] // ed25519_dalek::SigningKey handles its own zeroization
    secret: SigningKey,
}

impl SigningKeyPair {
    /// Create from a 32-byte seed, used as-is
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            secret: SigningKey::from_bytes(seed),
        }
    }

    /// Create from stored bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let seed: [u8; 32] = bytes.try_into().map_err(|_| {
            Error::StoreReadError(format!(
                "signing private key must be 32 bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self::from_seed(&seed))
    }

    /// Get the secret key bytes (for secure storage only)
    pub fn secret_bytes(&self) -> Zeroizing<[u8; 32]> {
        Zeroizing::new(self.secret.to_bytes())
    }

    /// Get the public key bytes
    pub fn public_bytes(&self) -> [u8; 32] {
        self.secret.verifying_key().to_bytes()
    }

    /// Sign a message
    pub fn sign(&self, message: &[u8]) -> [u8; SIGNATURE_SIZE] {
        self.secret.sign(message).to_bytes()
    }
}

impl std::fmt::Debug for SigningKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SigningKeyPair({})", hex::encode(self.public_bytes()))
    }
}

/// Verify an Ed25519 signature against a raw 32-byte public key
pub fn verify(public_key: &[u8; 32], message: &[u8], signature: &[u8]) -> Result<()> {
    let key = VerifyingKey::from_bytes(public_key).map_err(|_| Error::VerificationFailed)?;
    let signature =
        ed25519_dalek::Signature::from_slice(signature).map_err(|_| Error::VerificationFailed)?;
    key.verify(message, &signature)
        .map_err(|_| Error::VerificationFailed)
}

/// RSA-2048 keypair used to unwrap message keys
#[derive(ZeroizeOnDrop)]
pub struct ExchangeKeyPair {
    #[zeroize(skip)] // rsa::RsaPrivateKey zeroizes its own components
    secret: RsaPrivateKey,
}

impl ExchangeKeyPair {
    /// Generate a fresh keypair with public exponent 65537
    pub fn generate() -> Result<Self> {
        let secret = RsaPrivateKey::new(&mut OsRng, EXCHANGE_KEY_BITS)
            .map_err(|e| Error::KeyGenerationError(format!("RSA keypair: {}", e)))?;
        Ok(Self { secret })
    }

    /// Load from PKCS#1 DER
    pub fn from_pkcs1_der(der: &[u8]) -> Result<Self> {
        let secret = RsaPrivateKey::from_pkcs1_der(der)
            .map_err(|e| Error::StoreReadError(format!("exchange private key: {}", e)))?;
        Ok(Self { secret })
    }

    /// Export as PKCS#1 DER (for secure storage only)
    pub fn to_pkcs1_der(&self) -> Result<Zeroizing<Vec<u8>>> {
        let document = self
            .secret
            .to_pkcs1_der()
            .map_err(|e| Error::KeyGenerationError(format!("PKCS#1 export: {}", e)))?;
        Ok(Zeroizing::new(document.as_bytes().to_vec()))
    }

    /// Public half as integer components
    pub fn public_key(&self) -> RsaPublicKey {
        RsaPublicKey::from_rsa_key(&self.secret.to_public_key())
    }

    /// RSA-OAEP-SHA256 decrypt
    pub(crate) fn unwrap_key(&self, wrapped: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
        self.secret
            .decrypt(Oaep::new::<Sha256>(), wrapped)
            .map(Zeroizing::new)
            .map_err(|_| Error::DecryptionFailed)
    }
}

impl std::fmt::Debug for ExchangeKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ExchangeKeyPair([REDACTED])")
    }
}

/// Shared RSA keys for tests; 2048-bit generation is too slow to repeat.
#[cfg(test)]
pub(crate) mod test_keys {
    use super::*;
    use std::sync::OnceLock;

    static ALICE: OnceLock<RsaPrivateKey> = OnceLock::new();
    static BOB: OnceLock<RsaPrivateKey> = OnceLock::new();

    fn cached(cell: &'static OnceLock<RsaPrivateKey>) -> RsaPrivateKey {
        cell.get_or_init(|| RsaPrivateKey::new(&mut OsRng, EXCHANGE_KEY_BITS).unwrap())
            .clone()
    }

    pub fn rsa_private_key() -> RsaPrivateKey {
        cached(&ALICE)
    }

    pub fn alice() -> ExchangeKeyPair {
        ExchangeKeyPair {
            secret: cached(&ALICE),
        }
    }

    pub fn bob() -> ExchangeKeyPair {
        ExchangeKeyPair {
            secret: cached(&BOB),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distinct_seeds_give_distinct_keys() {
        let kp1 = SigningKeyPair::from_seed(&[1u8; 32]);
        let kp2 = SigningKeyPair::from_seed(&[2u8; 32]);

        assert_ne!(kp1.public_bytes(), kp2.public_bytes());
    }

    #[test]
    fn test_signing_seed_is_deterministic() {
        let seed = [42u8; 32];

        let kp1 = SigningKeyPair::from_seed(&seed);
        let kp2 = SigningKeyPair::from_seed(&seed);

        assert_eq!(kp1.public_bytes(), kp2.public_bytes());
        assert_eq!(*kp1.secret_bytes(), seed);
    }

    #[test]
    fn test_signing_from_bytes_rejects_bad_length() {
        assert!(SigningKeyPair::from_bytes(&[0u8; 31]).is_err());
        assert!(SigningKeyPair::from_bytes(&[0u8; 32]).is_ok());
    }

    #[test]
    fn test_sign_and_verify() {
        let kp = SigningKeyPair::from_seed(&[7u8; 32]);
        let signature = kp.sign(b"published keys");

        assert!(verify(&kp.public_bytes(), b"published keys", &signature).is_ok());
        assert!(matches!(
            verify(&kp.public_bytes(), b"other keys", &signature),
            Err(Error::VerificationFailed)
        ));
        assert!(verify(&kp.public_bytes(), b"published keys", &signature[..10]).is_err());
    }

    #[test]
    fn test_exchange_keypair_shape() {
        let kp = test_keys::alice();
        let public = kp.public_key();

        // DER integer contents: pad byte + 256-byte modulus
        assert_eq!(public.modulus().len(), 257);
        assert_eq!(public.modulus()[0], 0x00);
        assert_eq!(public.exponent(), &[0x01, 0x00, 0x01]);
        assert_eq!(public.modulus_bits(), EXCHANGE_KEY_BITS);
    }

    #[test]
    fn test_exchange_keypair_pkcs1_round_trip() {
        let kp = test_keys::alice();
        let der = kp.to_pkcs1_der().unwrap();

        let restored = ExchangeKeyPair::from_pkcs1_der(&der).unwrap();
        assert_eq!(restored.public_key(), kp.public_key());

        assert!(matches!(
            ExchangeKeyPair::from_pkcs1_der(&der[..40]),
            Err(Error::StoreReadError(_))
        ));
    }

    #[test]
    fn test_debug_redacts() {
        let debug = format!("{:?}", test_keys::alice());
        assert!(debug.contains("REDACTED"));
    }
}

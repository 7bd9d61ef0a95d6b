//! # Recovery Phrase (BIP39)
//!
//! 12-word BIP39 mnemonics for identity backup and recovery.
//!
//! ## BIP39 Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      BIP39 MNEMONIC GENERATION                          │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Step 1: Generate Entropy                                              │
//! │  ────────────────────────────                                           │
//! │  128 bits from the OS CSPRNG                                           │
//! │                                                                         │
//! │  Step 2: Calculate Checksum                                            │
//! │  ───────────────────────────                                            │
//! │  checksum = first 4 bits of SHA256(entropy)                            │
//! │                                                                         │
//! │  Step 3: Combine and Split                                             │
//! │  ──────────────────────────                                             │
//! │  128 + 4 = 132 bits  →  12 segments of 11 bits                         │
//! │                                                                         │
//! │  Step 4: Map to Words                                                  │
//! │  ────────────────────                                                   │
//! │  Each 11-bit value (0-2047) indexes the English wordlist               │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Seed Derivation
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      BIP39 SEED DERIVATION                              │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  PBKDF2-HMAC-SHA512(                                                   │
//! │    password   = mnemonic sentence (NFKD),                              │
//! │    salt       = "mnemonic" (empty passphrase),                         │
//! │    iterations = 2048,                                                  │
//! │    key_length = 64 bytes                                               │
//! │  )                                                                      │
//! │                                                                         │
//! │  seed[0..32] is the Ed25519 signing seed, used without clamping.      │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Security Considerations
//!
//! | Aspect | Measure |
//! |--------|---------|
//! | Entropy | 128 bits from OS CSPRNG |
//! | Checksum | 4 bits, rejected before any derivation |
//! | KDF | PBKDF2 with 2048 iterations |
//! | Display | Show once, never log |

use bip39::{Language, Mnemonic};
use rand::RngCore;
use zeroize::{ZeroizeOnDrop, Zeroizing};

use crate::error::{Error, Result};

/// Number of words in a recovery phrase
pub const WORD_COUNT: usize = 12;

/// Entropy size in bytes for 12 words (128 bits)
const ENTROPY_BYTES: usize = 16;

/// Maximum number of autocomplete suggestions
const MAX_SUGGESTIONS: usize = 10;

/// A BIP39 recovery phrase for identity backup
///
/// ## Security Warning
///
/// - This phrase fully recovers the user's signing identity
/// - Should never be logged
#[derive(ZeroizeOnDrop)]
pub struct RecoveryPhrase {
    #[zeroize(skip)] // bip39::Mnemonic doesn't implement Zeroize
    mnemonic: Mnemonic,
}

impl RecoveryPhrase {
    /// Generate a new random 12-word phrase
    pub fn generate() -> Result<Self> {
        let mut entropy = Zeroizing::new([0u8; ENTROPY_BYTES]);
        rand::rngs::OsRng
            .try_fill_bytes(&mut entropy[..])
            .map_err(|e| Error::KeyGenerationError(format!("entropy: {}", e)))?;

        let mnemonic = Mnemonic::from_entropy(&entropy[..])
            .map_err(|e| Error::KeyGenerationError(format!("mnemonic: {}", e)))?;

        Ok(Self { mnemonic })
    }

    /// Parse a phrase typed or pasted by the user
    ///
    /// Input is trimmed, lowercased and whitespace-collapsed first.
    ///
    /// ## Validation
    ///
    /// - Must be exactly 12 words
    /// - All words must be in the BIP39 English wordlist
    /// - Checksum must be valid
    pub fn from_phrase(phrase: &str) -> Result<Self> {
        let normalized = Zeroizing::new(normalize(phrase));

        let mnemonic = Mnemonic::parse_normalized(&normalized)
            .map_err(|e| Error::InvalidRecoveryPhrase(format!("{}", e)))?;

        if mnemonic.word_count() != WORD_COUNT {
            return Err(Error::InvalidRecoveryPhrase(format!(
                "Expected {} words, got {}",
                WORD_COUNT,
                mnemonic.word_count()
            )));
        }

        Ok(Self { mnemonic })
    }

    /// Get the words as a vector
    pub fn words(&self) -> Vec<&'static str> {
        self.mnemonic.words().collect()
    }

    /// Words joined by single spaces
    ///
    /// ## Security Warning
    ///
    /// Only use this for display to the user or for secure storage.
    pub fn phrase(&self) -> Zeroizing<String> {
        Zeroizing::new(self.mnemonic.to_string())
    }

    /// Full 64-byte BIP39 seed (empty passphrase)
    pub fn to_seed(&self) -> Zeroizing<[u8; 64]> {
        Zeroizing::new(self.mnemonic.to_seed(""))
    }

    /// First 32 bytes of the seed, as the Ed25519 signing seed
    pub fn signing_seed(&self) -> Zeroizing<[u8; 32]> {
        let seed = self.to_seed();
        let mut signing = Zeroizing::new([0u8; 32]);
        signing.copy_from_slice(&seed[..32]);
        signing
    }

    /// Check if a single word is in the BIP39 wordlist
    pub fn is_valid_word(word: &str) -> bool {
        let word_lower = word.trim().to_lowercase();
        Language::English
            .word_list()
            .iter()
            .any(|w| *w == word_lower)
    }

    /// Wordlist entries starting with `prefix`, for autocomplete
    pub fn suggest_words(prefix: &str) -> Vec<&'static str> {
        let prefix_lower = prefix.trim().to_lowercase();
        if prefix_lower.is_empty() {
            return vec![];
        }

        Language::English
            .word_list()
            .iter()
            .copied()
            .filter(|word| word.starts_with(&prefix_lower))
            .take(MAX_SUGGESTIONS)
            .collect()
    }
}

fn normalize(phrase: &str) -> String {
    phrase
        .split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

// Prevent accidental logging
impl std::fmt::Debug for RecoveryPhrase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RecoveryPhrase([REDACTED])")
    }
}

// ============================================================================
// TESTS
// ============================================================================

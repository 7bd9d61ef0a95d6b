//! # Identifiers
//!
//! The public handle every Mercurio user is known by.
//!
//! ## Format
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        IDENTIFIER FORMAT                                │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Example: 05d75a980182b10ab7d54bfed3c964073a0ee172f3daa62325af021a...  │
//! │                                                                         │
//! │  ┌─────────┬───────────────────────────────────────────────────────┐   │
//! │  │ Version │           Ed25519 public key                          │   │
//! │  ├─────────┼───────────────────────────────────────────────────────┤   │
//! │  │   05    │  64 lowercase hex characters (32 bytes)               │   │
//! │  └─────────┴───────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! │  66 ASCII characters in total                                          │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The identifier is derivable from the signing public key alone, so anyone
//! holding the recovery phrase regenerates the same handle on any device.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Version prefix of every identifier
pub const IDENTIFIER_PREFIX: &str = "05";

/// Length of an identifier in characters
pub const IDENTIFIER_LEN: usize = 66;

/// Characters kept by [`Identifier::short`]
const SHORT_LEN: usize = 20;

/// A "05" + hex(Ed25519 public key) identifier
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identifier {
    value: String,
}

impl Identifier {
    /// Derive the identifier of a signing public key
    pub fn from_signing_key(public_key: &[u8; 32]) -> Self {
        Self {
            value: format!("{}{}", IDENTIFIER_PREFIX, hex::encode(public_key)),
        }
    }

    /// Parse and fully validate an identifier string
    ///
    /// ## Validation
    ///
    /// - Exactly 66 characters
    /// - Starts with "05"
    /// - Remainder is lowercase hex
    pub fn parse(value: &str) -> Result<Self> {
        if !Self::looks_valid(value) {
            return Err(Error::InvalidIdentifier(format!(
                "expected {} characters starting with '{}', got {} characters",
                IDENTIFIER_LEN,
                IDENTIFIER_PREFIX,
                value.len()
            )));
        }

        let key = &value[IDENTIFIER_PREFIX.len()..];
        if !key.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')) {
            return Err(Error::InvalidIdentifier(
                "public key part must be lowercase hex".into(),
            ));
        }

        Ok(Self {
            value: value.to_string(),
        })
    }

    /// The shape check both clients run before adding a contact
    pub fn looks_valid(value: &str) -> bool {
        value.len() == IDENTIFIER_LEN && value.starts_with(IDENTIFIER_PREFIX)
    }

    /// Extract the signing public key
    pub fn signing_public_key(&self) -> Result<[u8; 32]> {
        let mut key = [0u8; 32];
        hex::decode_to_slice(&self.value[IDENTIFIER_PREFIX.len()..], &mut key)
            .map_err(|e| Error::InvalidIdentifier(format!("invalid hex: {}", e)))?;
        Ok(key)
    }

    /// Truncated form for logs
    pub fn short(&self) -> &str {
        &self.value[..SHORT_LEN.min(self.value.len())]
    }

    /// Get the full identifier string
    pub fn as_str(&self) -> &str {
        &self.value
    }
}

impl std::fmt::Display for Identifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.value)
    }
}

impl std::str::FromStr for Identifier {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Identifier {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<Identifier> for String {
    fn from(id: Identifier) -> Self {
        id.value
    }
}

impl AsRef<str> for Identifier {
    fn as_ref(&self) -> &str {
        &self.value
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_from_public_key() {
        let id = Identifier::from_signing_key(&[0xab; 32]);

        assert_eq!(id.as_str().len(), IDENTIFIER_LEN);
        assert!(id.as_str().starts_with("05abab"));
        assert_eq!(id.signing_public_key().unwrap(), [0xab; 32]);
    }

    #[test]
    fn test_parse_round_trip() {
        let id = Identifier::from_signing_key(&[7u8; 32]);
        let parsed: Identifier = id.as_str().parse().unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn test_parse_rejects_bad_identifiers() {
        let good = Identifier::from_signing_key(&[1u8; 32]).to_string();

        // Wrong prefix
        assert!(Identifier::parse(&format!("06{}", &good[2..])).is_err());
        // Too short
        assert!(Identifier::parse(&good[..65]).is_err());
        // Uppercase hex
        assert!(Identifier::parse(&good.to_uppercase()).is_err());
        // Non-hex with the right shape
        let bogus = format!("05{}", "z".repeat(64));
        assert!(Identifier::looks_valid(&bogus));
        assert!(matches!(
            Identifier::parse(&bogus),
            Err(Error::InvalidIdentifier(_))
        ));
    }

    #[test]
    fn test_short_form() {
        let id = Identifier::from_signing_key(&[0xff; 32]);
        assert_eq!(id.short().len(), 20);
        assert!(id.as_str().starts_with(id.short()));
    }

    #[test]
    fn test_serde_validates() {
        let id = Identifier::from_signing_key(&[3u8; 32]);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id));

        let back: Identifier = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);

        assert!(serde_json::from_str::<Identifier>("\"05abc\"").is_err());
    }
}

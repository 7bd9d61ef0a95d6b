//! # Error Handling
//!
//! Error types shared by every Mercurio Core module.
//!
//! ## Error Hierarchy
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           ERROR HIERARCHY                               │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Error (top-level)                                                     │
//! │  │                                                                      │
//! │  ├── Identity Errors                                                   │
//! │  │   ├── InvalidRecoveryPhrase - Bad checksum or unknown word          │
//! │  │   ├── KeysNotFound          - No active identity                    │
//! │  │   ├── KeyGenerationError    - Keypair generation failed             │
//! │  │   └── InvalidIdentifier     - Malformed "05..." handle              │
//! │  │                                                                      │
//! │  ├── Crypto Errors                                                     │
//! │  │   ├── MalformedKeyEncoding  - Corrupt DER / base64 public key       │
//! │  │   ├── RecipientKeyInvalid   - Peer key failed import                │
//! │  │   ├── EncryptionFailed      - Sealing a message failed              │
//! │  │   ├── DecryptionFailed      - Unwrap OR authentication failed       │
//! │  │   └── VerificationFailed    - Signature did not verify              │
//! │  │                                                                      │
//! │  ├── Storage Errors                                                    │
//! │  │   ├── StoreWriteError       - Save/delete failed (platform status)  │
//! │  │   └── StoreReadError        - Stored entry unreadable               │
//! │  │                                                                      │
//! │  └── Collaborator Errors                                               │
//! │      ├── PeerNotFound          - Identifier unknown to the directory   │
//! │      └── RelayError            - Directory / relay call failed         │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! `DecryptionFailed` deliberately carries no detail. Key unwrap failures,
//! padding errors, tag mismatches and invalid UTF-8 all collapse into the
//! same value.

use thiserror::Error;

/// Result type alias for Mercurio Core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for Mercurio Core
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Identity Errors (200-299)
    // ========================================================================

    /// Recovery phrase failed word-list or checksum validation
    #[error("Invalid recovery phrase: {0}")]
    InvalidRecoveryPhrase(String),

    /// No identity is active on this device
    #[error("No identity keys found. Create or restore an identity first.")]
    KeysNotFound,

    /// Asymmetric keypair or mnemonic generation failed
    #[error("Key generation failed: {0}")]
    KeyGenerationError(String),

    /// Identifier is not "05" followed by 64 lowercase hex characters
    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    // ========================================================================
    // Crypto Errors (300-399)
    // ========================================================================

    /// Public key bytes are corrupt or in a foreign format
    #[error("Malformed key encoding: {0}")]
    MalformedKeyEncoding(String),

    /// A peer's published exchange key could not be imported
    #[error("Recipient key invalid: {0}")]
    RecipientKeyInvalid(String),

    /// Encryption failed
    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    /// Decryption failed
    #[error("Decryption failed")]
    DecryptionFailed,

    /// Signature verification failed
    #[error("Signature verification failed")]
    VerificationFailed,

    // ========================================================================
    // Storage Errors (400-499)
    // ========================================================================

    /// Writing or deleting a credential failed
    #[error("Failed to write to credential store (status {status}): {message}")]
    StoreWriteError {
        /// Platform status code (e.g. an `OSStatus` on Apple targets)
        status: i32,
        /// Human-readable detail
        message: String,
    },

    /// A stored credential could not be read or parsed
    #[error("Failed to read from credential store: {0}")]
    StoreReadError(String),

    // ========================================================================
    // Collaborator Errors (500-599)
    // ========================================================================

    /// The directory has no record for this identifier
    #[error("Peer not found: {0}")]
    PeerNotFound(String),

    /// Directory or relay call failed
    #[error("Relay error: {0}")]
    RelayError(String),

    // ========================================================================
    // Internal Errors (900-999)
    // ========================================================================

    /// Internal error (should not happen in normal operation)
    #[error("Internal error: {0}")]
    Internal(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl Error {
    /// Get the error code for FFI
    ///
    /// Error codes are organized by category:
    /// - 200-299: Identity
    /// - 300-399: Crypto
    /// - 400-499: Storage
    /// - 500-599: Directory / relay
    /// - 900-999: Internal
    pub fn code(&self) -> i32 {
        match self {
            // Identity (200-299)
            Error::InvalidRecoveryPhrase(_) => 200,
            Error::KeysNotFound => 201,
            Error::KeyGenerationError(_) => 202,
            Error::InvalidIdentifier(_) => 203,

            // Crypto (300-399)
            Error::MalformedKeyEncoding(_) => 300,
            Error::RecipientKeyInvalid(_) => 301,
            Error::EncryptionFailed(_) => 302,
            Error::DecryptionFailed => 303,
            Error::VerificationFailed => 304,

            // Storage (400-499)
            Error::StoreWriteError { .. } => 400,
            Error::StoreReadError(_) => 401,

            // Collaborators (500-599)
            Error::PeerNotFound(_) => 500,
            Error::RelayError(_) => 501,

            // Internal (900-999)
            Error::Internal(_) => 900,
            Error::SerializationError(_) => 901,
        }
    }

    /// Check if this error is recoverable
    ///
    /// Recoverable errors leave the core in a consistent state; the caller
    /// can retry or skip the affected item.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::KeyGenerationError(_)
                | Error::DecryptionFailed
                | Error::RelayError(_)
                | Error::PeerNotFound(_)
        )
    }

    /// Check if this error requires user action
    pub fn requires_user_action(&self) -> bool {
        matches!(
            self,
            Error::KeysNotFound | Error::InvalidRecoveryPhrase(_) | Error::InvalidIdentifier(_)
        )
    }

    /// Message suitable for showing to the end user
    pub fn user_message(&self) -> String {
        match self {
            Error::InvalidRecoveryPhrase(_) => self.to_string(),
            Error::KeysNotFound => "not authenticated".into(),
            Error::MalformedKeyEncoding(_) => "invalid key".into(),
            Error::RecipientKeyInvalid(_) | Error::PeerNotFound(_) => {
                "cannot message this user".into()
            }
            Error::DecryptionFailed => "message could not be decrypted".into(),
            Error::InvalidIdentifier(_) => "invalid identifier".into(),
            _ => "something went wrong, please try again".into(),
        }
    }
}

// ============================================================================
// ERROR CONVERSIONS
// ============================================================================

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::SerializationError(err.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::StoreWriteError {
            status: err.raw_os_error().unwrap_or(-1),
            message: err.to_string(),
        }
    }
}

// ============================================================================
// FFI ERROR REPRESENTATION
// ============================================================================

/// FFI-friendly error representation
///
/// Returned by the binding dispatcher and serialized to the host as
/// `{"code", "message", "recoverable"}`
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct FfiError {
    /// Numeric error code
    pub code: i32,
    /// Human-readable error message
    pub message: String,
    /// Whether the error is recoverable
    pub recoverable: bool,
}

impl FfiError {
    /// Binding-layer failure that has no [`Error`] counterpart
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            recoverable: false,
        }
    }
}

impl From<Error> for FfiError {
    fn from(err: Error) -> Self {
        Self {
            code: err.code(),
            message: err.to_string(),
            recoverable: err.is_recoverable(),
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
    fn test_error_codes() {
        assert_eq!(Error::InvalidRecoveryPhrase("x".into()).code(), 200);
        assert_eq!(Error::KeysNotFound.code(), 201);
        assert_eq!(Error::MalformedKeyEncoding("x".into()).code(), 300);
        assert_eq!(Error::DecryptionFailed.code(), 303);
        assert_eq!(
            Error::StoreWriteError {
                status: -25299,
                message: "dup".into()
            }
            .code(),
            400
        );
        assert_eq!(Error::PeerNotFound("05ab".into()).code(), 500);
        assert_eq!(Error::Internal("test".into()).code(), 900);
    }

    #[test]
    fn test_decryption_failed_has_no_detail() {
        assert_eq!(Error::DecryptionFailed.to_string(), "Decryption failed");
    }

    #[test]
    fn test_recoverable_errors() {
        assert!(Error::DecryptionFailed.is_recoverable());
        assert!(Error::KeyGenerationError("rng".into()).is_recoverable());
        assert!(!Error::KeysNotFound.is_recoverable());
        assert!(!Error::MalformedKeyEncoding("x".into()).is_recoverable());
    }

    #[test]
    fn test_user_messages() {
        assert_eq!(Error::KeysNotFound.user_message(), "not authenticated");
        assert_eq!(
            Error::MalformedKeyEncoding("short".into()).user_message(),
            "invalid key"
        );
        assert_eq!(
            Error::RecipientKeyInvalid("e=1".into()).user_message(),
            "cannot message this user"
        );
        assert!(Error::InvalidRecoveryPhrase("bad checksum".into())
            .user_message()
            .contains("bad checksum"));
    }

    #[test]
    fn test_store_write_error_carries_status() {
        let err = Error::StoreWriteError {
            status: -34018,
            message: "missing entitlement".into(),
        };
        assert!(err.to_string().contains("-34018"));
    }

    #[test]
    fn test_ffi_error_conversion() {
        let err = Error::InvalidRecoveryPhrase("bad phrase".into());
        let ffi_err: FfiError = err.into();

        assert_eq!(ffi_err.code, 200);
        assert!(ffi_err.message.contains("bad phrase"));
        assert!(!ffi_err.recoverable);
    }
}

//! # FFI Dispatcher
//!
//! JSON-RPC style dispatcher that routes method names to [`MercurioCore`] calls.
//! Called from `mercurio_call(method, args)` in c_api.rs and from
//! `mercurio_wasm_call` in wasm.rs.
//!
//! Arguments are a JSON object (an empty string counts as `{}`). Binary
//! values travel as standard base64. Returns `Ok(json_string)` on success.
//!
//! | Method | Args | Result |
//! |--------|------|--------|
//! | `identity_create` | | `identifier`, `recovery_phrase` |
//! | `identity_restore` | `recovery_phrase` | `identifier` |
//! | `identity_status` | | `has_identity`, `identifier` |
//! | `identity_get_recovery_phrase` | | `recovery_phrase` (or null) |
//! | `identity_get_public_record` | | the directory row to publish |
//! | `identity_clear` | | `success` |
//! | `identity_sign` | `message` | `signature` |
//! | `identity_verify` | `identifier`, `message`, `signature` | `valid` |
//! | `messaging_encrypt` | `recipient` {`modulus`, `exponent`}, `text` | payload |
//! | `messaging_decrypt` | `payload` | `text` |
//! | `messaging_conversation_id` | `a`, `b` | `conversation_id` |
//! | `keys_from_der` | `der` | {`modulus`, `exponent`} |
//! | `keys_to_der` | `modulus`, `exponent` | `der` |

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};

use super::{ERR_INVALID_JSON, ERR_MISSING_FIELD, ERR_UNKNOWN_METHOD};
use crate::crypto::{self, EncryptedPayload, RsaPublicKey, RsaPublicKeyWire};
use crate::directory::{conversation_id, UserRecord};
use crate::error::{Error, FfiError};
use crate::identity::{Identifier, IdentityManager};
use crate::MercurioCore;

/// Dispatcher result: a JSON string or an error for the host
pub type DResult = std::result::Result<String, FfiError>;

// ============================================================================
// HELPERS
// ============================================================================

fn json_parse(args: &str) -> Result<Value, FfiError> {
    if args.trim().is_empty() {
        return Ok(json!({}));
    }
    serde_json::from_str(args)
        .map_err(|e| FfiError::new(ERR_INVALID_JSON, format!("Invalid JSON: {}", e)))
}

fn require_str<'a>(data: &'a Value, field: &str) -> Result<&'a str, FfiError> {
    data[field]
        .as_str()
        .ok_or_else(|| FfiError::new(ERR_MISSING_FIELD, format!("Missing {}", field)))
}

fn require_b64(data: &Value, field: &str) -> Result<Vec<u8>, FfiError> {
    STANDARD
        .decode(require_str(data, field)?)
        .map_err(|e| FfiError::new(ERR_MISSING_FIELD, format!("{} is not base64: {}", field, e)))
}

fn require<T: DeserializeOwned>(data: &Value, field: &str) -> Result<T, FfiError> {
    serde_json::from_value(data[field].clone())
        .map_err(|e| FfiError::new(ERR_MISSING_FIELD, format!("Invalid {}: {}", field, e)))
}

fn ok_json(v: Value) -> DResult {
    Ok(v.to_string())
}

fn ok_serialized<T: Serialize>(value: &T) -> DResult {
    serde_json::to_string(value).map_err(|e| Error::from(e).into())
}

// ============================================================================
// DISPATCH
// ============================================================================

/// Route `method` with JSON `args` to the matching handler
pub fn dispatch(core: &MercurioCore, method: &str, args: &str) -> DResult {
    let data = json_parse(args)?;
    let identity = core.identity();

    match method {
        // ── Identity ────────────────────────────────────────────────
        "identity_create" => identity_create(identity),
        "identity_restore" => identity_restore(identity, &data),
        "identity_status" => identity_status(identity),
        "identity_get_recovery_phrase" => identity_get_recovery_phrase(identity),
        "identity_get_public_record" => identity_get_public_record(identity),
        "identity_clear" => {
            identity.clear_identity()?;
            ok_json(json!({ "success": true }))
        }
        "identity_sign" => identity_sign(identity, &data),
        "identity_verify" => identity_verify(&data),

        // ── Messaging ───────────────────────────────────────────────
        "messaging_encrypt" => messaging_encrypt(&data),
        "messaging_decrypt" => messaging_decrypt(identity, &data),
        "messaging_conversation_id" => {
            let a = Identifier::parse(require_str(&data, "a")?)?;
            let b = Identifier::parse(require_str(&data, "b")?)?;
            ok_json(json!({ "conversation_id": conversation_id(&a, &b) }))
        }

        // ── Key codec ───────────────────────────────────────────────
        "keys_from_der" => {
            let key = RsaPublicKey::from_der(&require_b64(&data, "der")?)?;
            ok_serialized(&key.to_wire())
        }
        "keys_to_der" => {
            let key = RsaPublicKey::from_wire(&RsaPublicKeyWire {
                modulus: require_str(&data, "modulus")?.to_string(),
                exponent: require_str(&data, "exponent")?.to_string(),
            })?;
            ok_json(json!({ "der": STANDARD.encode(key.to_der()) }))
        }

        _ => Err(FfiError::new(
            ERR_UNKNOWN_METHOD,
            format!("Unknown method: {}", method),
        )),
    }
}

// ============================================================================
// IDENTITY
// ============================================================================

fn identity_create(identity: &IdentityManager) -> DResult {
    let identifier = identity.generate_identity()?;
    let phrase = identity.recovery_phrase()?.ok_or(Error::KeysNotFound)?;
    ok_json(json!({
        "identifier": identifier.as_str(),
        "recovery_phrase": phrase.as_str(),
    }))
}

fn identity_restore(identity: &IdentityManager, data: &Value) -> DResult {
    let identifier = identity.restore_from_phrase(require_str(data, "recovery_phrase")?)?;
    ok_json(json!({ "identifier": identifier.as_str() }))
}

fn identity_status(identity: &IdentityManager) -> DResult {
    let identifier = identity.identifier()?;
    ok_json(json!({
        "has_identity": identifier.is_some(),
        "identifier": identifier.as_ref().map(Identifier::as_str),
    }))
}

fn identity_get_recovery_phrase(identity: &IdentityManager) -> DResult {
    let phrase = identity.recovery_phrase()?;
    ok_json(json!({ "recovery_phrase": phrase.as_ref().map(|p| p.as_str()) }))
}

fn identity_get_public_record(identity: &IdentityManager) -> DResult {
    let material = identity.public_material()?;
    ok_serialized(&UserRecord::from_public_material(&material))
}

fn identity_sign(identity: &IdentityManager, data: &Value) -> DResult {
    let signature = identity.sign(&require_b64(data, "message")?)?;
    ok_json(json!({ "signature": STANDARD.encode(signature) }))
}

fn identity_verify(data: &Value) -> DResult {
    let identifier = Identifier::parse(require_str(data, "identifier")?)?;
    let message = require_b64(data, "message")?;
    let signature = require_b64(data, "signature")?;

    let valid = match IdentityManager::verify(&identifier, &message, &signature) {
        Ok(()) => true,
        Err(Error::VerificationFailed) => false,
        Err(e) => return Err(e.into()),
    };
    ok_json(json!({ "valid": valid }))
}

// ============================================================================
// MESSAGING
// ============================================================================

fn messaging_encrypt(data: &Value) -> DResult {
    let wire: RsaPublicKeyWire = require(data, "recipient")?;
    let recipient = RsaPublicKey::from_wire(&wire)?;
    let payload = crypto::encrypt_message(require_str(data, "text")?, &recipient)?;
    ok_serialized(&payload)
}

fn messaging_decrypt(identity: &IdentityManager, data: &Value) -> DResult {
    let payload: EncryptedPayload = require(data, "payload")?;
    let text = identity.decrypt_message(&payload)?;
    ok_json(json!({ "text": text }))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CoreConfig, CredentialBackend};
    use crate::crypto::test_keys;

    const PHRASE: &str =
        "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    fn core() -> MercurioCore {
        MercurioCore::open(CoreConfig {
            credential_backend: CredentialBackend::Memory,
            ..CoreConfig::default()
        })
        .unwrap()
    }

    fn call(core: &MercurioCore, method: &str, args: Value) -> Value {
        let out = dispatch(core, method, &args.to_string()).unwrap();
        serde_json::from_str(&out).unwrap()
    }

    fn call_err(core: &MercurioCore, method: &str, args: Value) -> FfiError {
        dispatch(core, method, &args.to_string()).unwrap_err()
    }

    #[test]
    fn test_identity_lifecycle() {
        let core = core();
        assert_eq!(
            call(&core, "identity_status", json!({})),
            json!({ "has_identity": false, "identifier": null })
        );

        let created = call(&core, "identity_create", json!({}));
        let identifier = created["identifier"].as_str().unwrap().to_string();
        let phrase = created["recovery_phrase"].as_str().unwrap().to_string();
        assert!(identifier.starts_with("05"));
        assert_eq!(phrase.split_whitespace().count(), 12);

        let status = call(&core, "identity_status", json!({}));
        assert_eq!(status["has_identity"], true);
        assert_eq!(status["identifier"], identifier.as_str());
        assert_eq!(
            call(&core, "identity_get_recovery_phrase", json!({}))["recovery_phrase"],
            phrase.as_str()
        );

        let record = call(&core, "identity_get_public_record", json!({}));
        assert_eq!(record["mercurio_id"], identifier.as_str());
        assert!(record["rsa_public_key_modulus"].is_string());

        assert_eq!(call(&core, "identity_clear", json!({}))["success"], true);
        assert_eq!(call(&core, "identity_status", json!({}))["has_identity"], false);
        assert!(call(&core, "identity_get_recovery_phrase", json!({}))["recovery_phrase"].is_null());
    }

    #[test]
    fn test_restore_is_deterministic_and_validated() {
        let core = core();
        let first = call(&core, "identity_restore", json!({ "recovery_phrase": PHRASE }));
        let second = call(&core, "identity_restore", json!({ "recovery_phrase": PHRASE }));
        assert_eq!(first["identifier"], second["identifier"]);

        let err = call_err(
            &core,
            "identity_restore",
            json!({ "recovery_phrase": "abandon abandon abandon" }),
        );
        assert_eq!(err.code, 200);
    }

    #[test]
    fn test_sign_and_verify() {
        let core = core();
        let identifier = call(&core, "identity_restore", json!({ "recovery_phrase": PHRASE }))
            ["identifier"]
            .as_str()
            .unwrap()
            .to_string();

        let message = STANDARD.encode(b"published keys");
        let signature = call(&core, "identity_sign", json!({ "message": message }))["signature"]
            .as_str()
            .unwrap()
            .to_string();

        let verify = |message: &str| {
            call(
                &core,
                "identity_verify",
                json!({ "identifier": identifier, "message": message, "signature": signature }),
            )["valid"]
                .as_bool()
                .unwrap()
        };
        assert!(verify(&message));
        assert!(!verify(&STANDARD.encode(b"other keys")));
    }

    #[test]
    fn test_encrypt_for_self_and_decrypt() {
        let core = core();
        call(&core, "identity_restore", json!({ "recovery_phrase": PHRASE }));
        let record = call(&core, "identity_get_public_record", json!({}));

        let recipient = json!({
            "modulus": record["rsa_public_key_modulus"],
            "exponent": record["rsa_public_key_exponent"],
        });
        let payload = call(
            &core,
            "messaging_encrypt",
            json!({ "recipient": recipient, "text": "hello bob" }),
        );
        assert!(payload["encrypted_content"].is_string());
        assert!(payload["encrypted_aes_key"].is_string());

        let opened = call(&core, "messaging_decrypt", json!({ "payload": payload }));
        assert_eq!(opened["text"], "hello bob");

        let mut tampered = payload.clone();
        tampered["mac"] = json!(STANDARD.encode([0u8; 16]));
        let err = call_err(&core, "messaging_decrypt", json!({ "payload": tampered }));
        assert_eq!(err.code, 303);
        assert_eq!(err.message, "Decryption failed");
    }

    #[test]
    fn test_decrypt_without_identity() {
        let core = core();
        let recipient = test_keys::bob().public_key().to_wire();
        let payload = call(
            &core,
            "messaging_encrypt",
            json!({ "recipient": recipient, "text": "hi" }),
        );

        let err = call_err(&core, "messaging_decrypt", json!({ "payload": payload }));
        assert_eq!(err.code, 201);
    }

    #[test]
    fn test_key_codec_round_trip() {
        let core = core();
        let wire = test_keys::alice().public_key().to_wire();

        let der = call(
            &core,
            "keys_to_der",
            json!({ "modulus": wire.modulus, "exponent": wire.exponent }),
        );
        let back = call(&core, "keys_from_der", json!({ "der": der["der"] }));
        assert_eq!(back["modulus"], wire.modulus.as_str());
        assert_eq!(back["exponent"], wire.exponent.as_str());

        let err = call_err(&core, "keys_from_der", json!({ "der": STANDARD.encode([0x30, 0x01]) }));
        assert_eq!(err.code, 300);
    }

    #[test]
    fn test_conversation_id_is_symmetric() {
        let core = core();
        let a = format!("05{}", "11".repeat(32));
        let b = format!("05{}", "22".repeat(32));

        let ab = call(&core, "messaging_conversation_id", json!({ "a": a, "b": b }));
        let ba = call(&core, "messaging_conversation_id", json!({ "a": b, "b": a }));
        assert_eq!(ab, ba);

        let err = call_err(&core, "messaging_conversation_id", json!({ "a": "06ab", "b": b }));
        assert_eq!(err.code, 203);
    }

    #[test]
    fn test_argument_errors() {
        let core = core();

        let err = dispatch(&core, "identity_status", "{not json").unwrap_err();
        assert_eq!(err.code, ERR_INVALID_JSON);

        let err = call_err(&core, "identity_restore", json!({}));
        assert_eq!(err.code, ERR_MISSING_FIELD);

        let err = call_err(&core, "identity_sign", json!({ "message": "%%%" }));
        assert_eq!(err.code, ERR_MISSING_FIELD);

        let err = call_err(&core, "friends_list", json!({}));
        assert_eq!(err.code, ERR_UNKNOWN_METHOD);

        assert!(dispatch(&core, "identity_status", "").is_ok());
    }
}

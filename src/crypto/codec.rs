//! # Public Key Codec
//!
//! Converts an RSA public key between its raw integer components, the
//! ASN.1/DER encodings platform crypto APIs import, and the base64 wire form
//! stored by the user directory.
//!
//! ## Encodings
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      RSA PUBLIC KEY ENCODINGS                           │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  PKCS#1 (what SecKeyCopyExternalRepresentation produces)               │
//! │  ─────────────────────────────────────────────────────                  │
//! │  30 len                          SEQUENCE                              │
//! │     02 len <modulus>             INTEGER n                             │
//! │     02 len <exponent>            INTEGER e                             │
//! │                                                                         │
//! │  SubjectPublicKeyInfo (what WebCrypto "spki" imports)                  │
//! │  ────────────────────────────────────────────────────                   │
//! │  30 len                          SEQUENCE                              │
//! │     30 0d                        SEQUENCE (AlgorithmIdentifier)        │
//! │        06 09 2a864886f70d010101  OID rsaEncryption                     │
//! │        05 00                     NULL                                  │
//! │     03 len 00 <PKCS#1 bytes>     BIT STRING                            │
//! │                                                                         │
//! │  Length octets                                                         │
//! │  ─────────────                                                          │
//! │  len < 128   →  one byte                                               │
//! │  len ≥ 128   →  0x80 | n, then n big-endian length bytes               │
//! │                                                                         │
//! │  Wire (directory columns)                                              │
//! │  ────────────────────────                                               │
//! │  rsa_public_key_modulus  = base64(modulus integer contents)            │
//! │  rsa_public_key_exponent = base64(exponent integer contents)           │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Integer contents are kept exactly as they appear inside the INTEGER,
//! including the `0x00` pad byte in front of a modulus whose top bit is set.
//! Re-encoding therefore reproduces the original bytes.

use base64::{
    engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD},
    Engine as _,
};
use rsa::traits::PublicKeyParts;
use rsa::{BigUint, RsaPublicKey as RsaKey};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Smallest modulus accepted when importing a peer's key
pub const MIN_MODULUS_BITS: usize = 2048;

/// More length octets than this cannot describe a key we would accept
const MAX_LENGTH_OCTETS: usize = 4;

/// DER encoding of OID 1.2.840.113549.1.1.1 (rsaEncryption)
const RSA_ENCRYPTION_OID: [u8; 9] = [0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01, 0x01, 0x01];

/// The ASN.1 tags this codec understands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tag {
    Integer,
    BitString,
    Null,
    ObjectIdentifier,
    Sequence,
}

impl Tag {
    fn byte(self) -> u8 {
        match self {
            Tag::Integer => 0x02,
            Tag::BitString => 0x03,
            Tag::Null => 0x05,
            Tag::ObjectIdentifier => 0x06,
            Tag::Sequence => 0x30,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Tag::Integer => "INTEGER",
            Tag::BitString => "BIT STRING",
            Tag::Null => "NULL",
            Tag::ObjectIdentifier => "OBJECT IDENTIFIER",
            Tag::Sequence => "SEQUENCE",
        }
    }
}

fn malformed(msg: impl Into<String>) -> Error {
    Error::MalformedKeyEncoding(msg.into())
}

/// Cursor over a DER buffer. Every read is bounds-checked.
struct DerReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> DerReader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn is_empty(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn next_byte(&mut self) -> Result<u8> {
        let byte = *self
            .bytes
            .get(self.pos)
            .ok_or_else(|| malformed("unexpected end of input"))?;
        self.pos += 1;
        Ok(byte)
    }

    fn read_length(&mut self) -> Result<usize> {
        let first = self.next_byte()?;
        if first & 0x80 == 0 {
            return Ok(first as usize);
        }

        let count = (first & 0x7f) as usize;
        if count == 0 {
            return Err(malformed("indefinite length form is not allowed"));
        }
        if count > MAX_LENGTH_OCTETS {
            return Err(malformed(format!("{} length octets is too many", count)));
        }

        let mut length = 0usize;
        for _ in 0..count {
            length = (length << 8) | self.next_byte()? as usize;
        }
        Ok(length)
    }

    /// Read one tag-length-value element and return its contents.
    fn read(&mut self, tag: Tag) -> Result<&'a [u8]> {
        let found = self.next_byte()?;
        if found != tag.byte() {
            return Err(malformed(format!(
                "expected {} (0x{:02x}), found 0x{:02x}",
                tag.name(),
                tag.byte(),
                found
            )));
        }

        let length = self.read_length()?;
        let end = self
            .pos
            .checked_add(length)
            .filter(|end| *end <= self.bytes.len())
            .ok_or_else(|| {
                malformed(format!(
                    "{} length {} overruns the {} remaining bytes",
                    tag.name(),
                    length,
                    self.bytes.len() - self.pos
                ))
            })?;

        let contents = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(contents)
    }

    fn finish(&self, context: &str) -> Result<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(malformed(format!(
                "{} trailing bytes after {}",
                self.bytes.len() - self.pos,
                context
            )))
        }
    }
}

fn encode_length(length: usize, out: &mut Vec<u8>) {
    if length < 0x80 {
        out.push(length as u8);
        return;
    }

    let octets: Vec<u8> = length
        .to_be_bytes()
        .into_iter()
        .skip_while(|b| *b == 0)
        .collect();
    out.push(0x80 | octets.len() as u8);
    out.extend_from_slice(&octets);
}

fn encode_element(tag: Tag, contents: &[u8], out: &mut Vec<u8>) {
    out.push(tag.byte());
    encode_length(contents.len(), out);
    out.extend_from_slice(contents);
}

fn encode_integer(value: &[u8], out: &mut Vec<u8>) {
    match value.first() {
        None => encode_element(Tag::Integer, &[0x00], out),
        Some(first) if first & 0x80 != 0 => {
            let mut padded = Vec::with_capacity(value.len() + 1);
            padded.push(0x00);
            padded.extend_from_slice(value);
            encode_element(Tag::Integer, &padded, out);
        }
        Some(_) => encode_element(Tag::Integer, value, out),
    }
}

/// Parse a PKCS#1 `SEQUENCE { INTEGER modulus, INTEGER exponent }`.
pub fn decode_public_key_der(bytes: &[u8]) -> Result<RsaPublicKey> {
    let mut outer = DerReader::new(bytes);
    let body = outer.read(Tag::Sequence)?;
    outer.finish("public key sequence")?;

    let mut fields = DerReader::new(body);
    let modulus = fields.read(Tag::Integer)?;
    let exponent = fields.read(Tag::Integer)?;
    fields.finish("exponent")?;

    if modulus.is_empty() || exponent.is_empty() {
        return Err(malformed("zero-length INTEGER"));
    }

    tracing::debug!(
        "Decoded RSA public key: {} modulus bytes, {} exponent bytes",
        modulus.len(),
        exponent.len()
    );

    Ok(RsaPublicKey {
        modulus: modulus.to_vec(),
        exponent: exponent.to_vec(),
    })
}

/// Encode a key as PKCS#1 DER. Inverse of [`decode_public_key_der`].
pub fn encode_public_key_der(key: &RsaPublicKey) -> Vec<u8> {
    let mut fields = Vec::with_capacity(key.modulus.len() + key.exponent.len() + 16);
    encode_integer(&key.modulus, &mut fields);
    encode_integer(&key.exponent, &mut fields);

    let mut out = Vec::with_capacity(fields.len() + 4);
    encode_element(Tag::Sequence, &fields, &mut out);
    out
}

fn decode_component(value: &str, field: &str) -> Result<Vec<u8>> {
    let bytes = STANDARD
        .decode(value)
        .or_else(|_| URL_SAFE_NO_PAD.decode(value))
        .map_err(|e| malformed(format!("{} is not base64: {}", field, e)))?;

    if bytes.is_empty() {
        return Err(malformed(format!("{} is empty", field)));
    }
    Ok(bytes)
}

/// RSA public key as raw big-endian integer components
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RsaPublicKey {
    modulus: Vec<u8>,
    exponent: Vec<u8>,
}

impl RsaPublicKey {
    /// Create from raw big-endian components
    pub fn new(modulus: Vec<u8>, exponent: Vec<u8>) -> Self {
        Self { modulus, exponent }
    }

    /// Modulus bytes, as they appear inside the DER INTEGER
    pub fn modulus(&self) -> &[u8] {
        &self.modulus
    }

    /// Exponent bytes
    pub fn exponent(&self) -> &[u8] {
        &self.exponent
    }

    /// Parse PKCS#1 DER
    pub fn from_der(bytes: &[u8]) -> Result<Self> {
        decode_public_key_der(bytes)
    }

    /// Encode as PKCS#1 DER
    pub fn to_der(&self) -> Vec<u8> {
        encode_public_key_der(self)
    }

    /// Parse a SubjectPublicKeyInfo carrying an `rsaEncryption` key
    pub fn from_spki_der(bytes: &[u8]) -> Result<Self> {
        let mut outer = DerReader::new(bytes);
        let body = outer.read(Tag::Sequence)?;
        outer.finish("SubjectPublicKeyInfo")?;

        let mut info = DerReader::new(body);
        let mut algorithm = DerReader::new(info.read(Tag::Sequence)?);
        if algorithm.read(Tag::ObjectIdentifier)? != RSA_ENCRYPTION_OID {
            return Err(malformed("algorithm is not rsaEncryption"));
        }
        if !algorithm.is_empty() && !algorithm.read(Tag::Null)?.is_empty() {
            return Err(malformed("rsaEncryption parameters must be NULL"));
        }
        algorithm.finish("algorithm parameters")?;

        let bits = info.read(Tag::BitString)?;
        info.finish("subjectPublicKey")?;
        match bits.split_first() {
            Some((0, key)) => decode_public_key_der(key),
            Some((unused, _)) => Err(malformed(format!(
                "BIT STRING has {} unused bits",
                unused
            ))),
            None => Err(malformed("empty BIT STRING")),
        }
    }

    /// Encode as a SubjectPublicKeyInfo
    pub fn to_spki_der(&self) -> Vec<u8> {
        let mut algorithm = Vec::with_capacity(15);
        encode_element(Tag::ObjectIdentifier, &RSA_ENCRYPTION_OID, &mut algorithm);
        encode_element(Tag::Null, &[], &mut algorithm);

        let pkcs1 = self.to_der();
        let mut bits = Vec::with_capacity(pkcs1.len() + 1);
        bits.push(0x00);
        bits.extend_from_slice(&pkcs1);

        let mut info = Vec::with_capacity(bits.len() + 24);
        encode_element(Tag::Sequence, &algorithm, &mut info);
        encode_element(Tag::BitString, &bits, &mut info);

        let mut out = Vec::with_capacity(info.len() + 4);
        encode_element(Tag::Sequence, &info, &mut out);
        out
    }

    /// Base64 representation stored by the directory
    pub fn to_wire(&self) -> RsaPublicKeyWire {
        RsaPublicKeyWire {
            modulus: STANDARD.encode(&self.modulus),
            exponent: STANDARD.encode(&self.exponent),
        }
    }

    /// Parse the directory representation.
    ///
    /// Standard padded base64 is tried first; unpadded URL-safe base64 (the
    /// JWK `n`/`e` form) is accepted as a fallback.
    pub fn from_wire(wire: &RsaPublicKeyWire) -> Result<Self> {
        Ok(Self {
            modulus: decode_component(&wire.modulus, "modulus")?,
            exponent: decode_component(&wire.exponent, "exponent")?,
        })
    }

    /// Number of significant bits in the modulus
    pub fn modulus_bits(&self) -> usize {
        BigUint::from_bytes_be(&self.modulus).bits()
    }

    /// Build from an `rsa` key, laying the integers out the way a DER
    /// encoder does (pad byte in front of a high-bit modulus).
    pub fn from_rsa_key(key: &RsaKey) -> Self {
        let mut modulus = key.n().to_bytes_be();
        if modulus.first().is_some_and(|b| b & 0x80 != 0) {
            modulus.insert(0, 0x00);
        }
        Self {
            modulus,
            exponent: key.e().to_bytes_be(),
        }
    }

    /// Import as an encryption key for a recipient
    pub fn to_rsa_key(&self) -> Result<RsaKey> {
        let bits = self.modulus_bits();
        if bits < MIN_MODULUS_BITS {
            return Err(Error::RecipientKeyInvalid(format!(
                "modulus is {} bits, need at least {}",
                bits, MIN_MODULUS_BITS
            )));
        }

        RsaKey::new(
            BigUint::from_bytes_be(&self.modulus),
            BigUint::from_bytes_be(&self.exponent),
        )
        .map_err(|e| Error::RecipientKeyInvalid(e.to_string()))
    }
}

/// The base64 pair published to the directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RsaPublicKeyWire {
    /// base64 of the modulus integer
    pub modulus: String,
    /// base64 of the exponent integer
    pub exponent: String,
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::keys::test_keys;
    use rsa::pkcs1::EncodeRsaPublicKey;
    use rsa::pkcs8::EncodePublicKey;

    /// 2048-bit modulus with its top bit set, 65537 exponent
    fn high_bit_key() -> RsaPublicKey {
        let mut modulus = vec![0xc3u8; 256];
        modulus[255] = 0x01;
        RsaPublicKey::new(modulus, vec![0x01, 0x00, 0x01])
    }

    #[test]
    fn test_short_form_round_trip() {
        let der = [0x30, 0x08, 0x02, 0x03, 0x00, 0xb1, 0x05, 0x02, 0x01, 0x03];

        let key = decode_public_key_der(&der).unwrap();
        assert_eq!(key.modulus(), &[0x00, 0xb1, 0x05]);
        assert_eq!(key.exponent(), &[0x03]);
        assert_eq!(encode_public_key_der(&key), der);
    }

    #[test]
    fn test_pad_byte_inserted_for_high_bit() {
        let der = high_bit_key().to_der();

        // 30 82 01 0a | 02 82 01 01 00 c3 ...
        assert_eq!(&der[..4], &[0x30, 0x82, 0x01, 0x0a]);
        assert_eq!(&der[4..9], &[0x02, 0x82, 0x01, 0x01, 0x00]);
        assert_eq!(der[9], 0xc3);
        assert_eq!(&der[der.len() - 5..], &[0x02, 0x03, 0x01, 0x00, 0x01]);

        let decoded = decode_public_key_der(&der).unwrap();
        assert_eq!(decoded.modulus().len(), 257);
        assert_eq!(decoded.modulus()[0], 0x00);
        assert_eq!(decoded.to_der(), der);
    }

    #[test]
    fn test_long_form_with_single_length_octet() {
        // 200-byte modulus: 0x81 0xc8
        let key = RsaPublicKey::new(vec![0x41; 200], vec![0x03]);
        let der = key.to_der();
        assert_eq!(&der[2..5], &[0x02, 0x81, 0xc8]);
        assert_eq!(decode_public_key_der(&der).unwrap(), key);
    }

    #[test]
    fn test_matches_rsa_crate_pkcs1() {
        let private = test_keys::rsa_private_key();
        let public = private.to_public_key();

        let reference = public.to_pkcs1_der().unwrap();
        let ours = RsaPublicKey::from_rsa_key(&public);

        assert_eq!(ours.to_der(), reference.as_bytes());
        assert_eq!(RsaPublicKey::from_der(reference.as_bytes()).unwrap(), ours);
    }

    #[test]
    fn test_matches_rsa_crate_spki() {
        let private = test_keys::rsa_private_key();
        let public = private.to_public_key();

        let reference = public.to_public_key_der().unwrap();
        let ours = RsaPublicKey::from_rsa_key(&public);

        assert_eq!(ours.to_spki_der(), reference.as_bytes());
        assert_eq!(
            RsaPublicKey::from_spki_der(reference.as_bytes()).unwrap(),
            ours
        );
    }

    #[test]
    fn test_rejects_missing_sequence_tag() {
        let der = [0x31, 0x03, 0x02, 0x01, 0x03];
        assert!(matches!(
            decode_public_key_der(&der),
            Err(Error::MalformedKeyEncoding(_))
        ));
    }

    #[test]
    fn test_rejects_missing_integer_tag() {
        let der = [0x30, 0x06, 0x04, 0x01, 0x05, 0x02, 0x01, 0x03];
        assert!(matches!(
            decode_public_key_der(&der),
            Err(Error::MalformedKeyEncoding(_))
        ));
    }

    #[test]
    fn test_rejects_length_overrun() {
        // Modulus claims 0x0100 bytes, buffer holds far fewer
        let der = [0x30, 0x08, 0x02, 0x82, 0x01, 0x00, 0xaa, 0x02, 0x01, 0x03];
        assert!(matches!(
            decode_public_key_der(&der),
            Err(Error::MalformedKeyEncoding(_))
        ));

        // Truncated inside the length octets
        assert!(decode_public_key_der(&[0x30, 0x82, 0x01]).is_err());
        assert!(decode_public_key_der(&[]).is_err());
    }

    #[test]
    fn test_rejects_indefinite_and_oversized_lengths() {
        assert!(decode_public_key_der(&[0x30, 0x80, 0x02, 0x01, 0x03, 0x00, 0x00]).is_err());
        assert!(decode_public_key_der(&[0x30, 0x85, 0, 0, 0, 0, 0x05]).is_err());
    }

    #[test]
    fn test_rejects_missing_exponent_and_trailing_data() {
        assert!(decode_public_key_der(&[0x30, 0x03, 0x02, 0x01, 0x05]).is_err());

        let mut der = RsaPublicKey::new(vec![0x05], vec![0x03]).to_der();
        der.push(0x00);
        assert!(decode_public_key_der(&der).is_err());
    }

    #[test]
    fn test_spki_rejects_other_algorithms() {
        let mut spki = high_bit_key().to_spki_der();
        // Flip the last OID arc (rsaEncryption → 1.2.840.113549.1.1.2)
        let oid_end = spki
            .windows(RSA_ENCRYPTION_OID.len())
            .position(|w| w == RSA_ENCRYPTION_OID)
            .unwrap()
            + RSA_ENCRYPTION_OID.len()
            - 1;
        spki[oid_end] = 0x02;

        assert!(matches!(
            RsaPublicKey::from_spki_der(&spki),
            Err(Error::MalformedKeyEncoding(_))
        ));
    }

    #[test]
    fn test_wire_format() {
        let key = RsaPublicKey::new(vec![0x00, 0xc3, 0xfb, 0xff], vec![0x01, 0x00, 0x01]);
        let wire = key.to_wire();

        assert_eq!(wire.exponent, "AQAB");
        assert_eq!(wire.modulus, "AMP7/w==");
        assert_eq!(RsaPublicKey::from_wire(&wire).unwrap(), key);

        let json = serde_json::to_string(&wire).unwrap();
        assert_eq!(json, r#"{"modulus":"AMP7/w==","exponent":"AQAB"}"#);
    }

    #[test]
    fn test_wire_accepts_jwk_base64url() {
        let jwk = RsaPublicKeyWire {
            modulus: "w_v_".into(),
            exponent: "AQAB".into(),
        };
        let key = RsaPublicKey::from_wire(&jwk).unwrap();
        assert_eq!(key.modulus(), &[0xc3, 0xfb, 0xff]);
        assert_eq!(key.exponent(), &[0x01, 0x00, 0x01]);
    }

    #[test]
    fn test_wire_rejects_garbage() {
        let wire = RsaPublicKeyWire {
            modulus: "not base64!".into(),
            exponent: "AQAB".into(),
        };
        assert!(matches!(
            RsaPublicKey::from_wire(&wire),
            Err(Error::MalformedKeyEncoding(_))
        ));

        let empty = RsaPublicKeyWire {
            modulus: String::new(),
            exponent: "AQAB".into(),
        };
        assert!(RsaPublicKey::from_wire(&empty).is_err());
    }

    #[test]
    fn test_import_requires_2048_bits() {
        let small = RsaPublicKey::new(vec![0xc3; 128], vec![0x01, 0x00, 0x01]);
        assert!(matches!(
            small.to_rsa_key(),
            Err(Error::RecipientKeyInvalid(_))
        ));

        let public = test_keys::rsa_private_key().to_public_key();
        let ours = RsaPublicKey::from_rsa_key(&public);
        assert_eq!(ours.modulus_bits(), 2048);
        assert_eq!(ours.to_rsa_key().unwrap(), public);
    }
}

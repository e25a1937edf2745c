//! The `PrivateToken` HTTP authentication scheme used by the RSA-based
//! token-type variant: binary `TokenChallenge` / `TokenRequest` /
//! `TokenResponse` / `Token` layouts, `WWW-Authenticate` header parsing and
//! SPKI decoding of issuer token keys.
//!
//! Binary layouts are big-endian with length-prefixed variable fields.
//! Header parsing is deliberately lenient: a challenge that fails to parse
//! is skipped so one hostile header cannot take down the interception
//! pipeline around it.

use base64::Engine as _;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use sha2::{Digest, Sha256};

use privacypass_core::blindrsa::RsaPublicKey;

use crate::WireError;

/// Token type 0x0002: publicly verifiable, RSA blind signatures.
pub const BASIC_PUBLIC_TOKEN_TYPE: u16 = 0x0002;
/// Token type 0x0003: rate-limited variant.
pub const RATE_LIMITED_TOKEN_TYPE: u16 = 0x0003;

/// Well-known path of the issuer directory.
pub const TOKEN_ISSUER_DIRECTORY: &str = "/.well-known/token-issuer-directory";
/// Media type of a serialized [`TokenRequest`].
pub const TOKEN_REQUEST_MEDIA_TYPE: &str = "message/token-request";
/// Media type of a serialized [`TokenResponse`].
pub const TOKEN_RESPONSE_MEDIA_TYPE: &str = "message/token-response";

// WWW-Authenticate attribute names.
const ATTR_CHALLENGE: &str = "challenge";
const ATTR_TOKEN_KEY: &str = "token-key";
const ATTR_MAX_AGE: &str = "max-age";

/// A challenge issued by an origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenChallenge {
    /// The token type the origin accepts.
    pub token_type: u16,
    /// Issuer host name.
    pub issuer_name: String,
    /// Redemption nonce (u8-prefixed on the wire).
    pub redemption_nonce: Vec<u8>,
    /// Origin info entries (comma-joined on the wire).
    pub origin_info: Vec<String>,
}

impl TokenChallenge {
    /// Serializes to the wire layout.
    pub fn serialize(&self) -> Vec<u8> {
        let origin_info = self.origin_info.join(",");
        let mut out = Vec::new();
        out.extend_from_slice(&self.token_type.to_be_bytes());
        out.extend_from_slice(&(self.issuer_name.len() as u16).to_be_bytes());
        out.extend_from_slice(self.issuer_name.as_bytes());
        out.push(self.redemption_nonce.len() as u8);
        out.extend_from_slice(&self.redemption_nonce);
        out.extend_from_slice(&(origin_info.len() as u16).to_be_bytes());
        out.extend_from_slice(origin_info.as_bytes());
        out
    }

    /// Parses the wire layout.
    pub fn parse(bytes: &[u8]) -> Result<Self, WireError> {
        let mut reader = Reader::new(bytes);
        let token_type = reader.read_u16()?;
        let name_len = reader.read_u16()? as usize;
        let issuer_name = String::from_utf8(reader.read_bytes(name_len)?.to_vec())
            .map_err(|_| WireError::Truncated)?;
        let nonce_len = reader.read_u8()? as usize;
        let redemption_nonce = reader.read_bytes(nonce_len)?.to_vec();
        let info_len = reader.read_u16()? as usize;
        let all_info = String::from_utf8(reader.read_bytes(info_len)?.to_vec())
            .map_err(|_| WireError::Truncated)?;
        let origin_info = if all_info.is_empty() {
            Vec::new()
        } else {
            all_info.split(',').map(str::to_string).collect()
        };
        Ok(TokenChallenge {
            token_type,
            issuer_name,
            redemption_nonce,
            origin_info,
        })
    }
}

/// A request for one token, shipped as `message/token-request`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenRequest {
    /// Token type (0x0002 for the RSA variant).
    pub token_type: u16,
    /// Last byte of the key-id digest, identifying the issuer key.
    pub token_key_id: u8,
    /// The blinded message, modulus-sized.
    pub blinded_msg: Vec<u8>,
}

impl TokenRequest {
    /// Serializes to the wire layout.
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(3 + self.blinded_msg.len());
        out.extend_from_slice(&self.token_type.to_be_bytes());
        out.push(self.token_key_id);
        out.extend_from_slice(&self.blinded_msg);
        out
    }

    /// Parses the wire layout; the remainder after the fixed header is the
    /// blinded message.
    pub fn parse(bytes: &[u8]) -> Result<Self, WireError> {
        let mut reader = Reader::new(bytes);
        let token_type = reader.read_u16()?;
        let token_key_id = reader.read_u8()?;
        Ok(TokenRequest {
            token_type,
            token_key_id,
            blinded_msg: reader.rest().to_vec(),
        })
    }
}

/// The issuer's answer: the raw blind signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenResponse {
    /// Blind signature bytes.
    pub blind_sig: Vec<u8>,
}

impl TokenResponse {
    /// Serializes to the wire layout (the bytes themselves).
    pub fn serialize(&self) -> Vec<u8> {
        self.blind_sig.clone()
    }
}

/// The signed structure a finished token authenticates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPayload {
    /// Token type.
    pub token_type: u16,
    /// Client nonce.
    pub nonce: [u8; 32],
    /// SHA-256 of the originating challenge.
    pub context: [u8; 32],
    /// SHA-256 of the issuer token key.
    pub key_id: [u8; 32],
}

impl TokenPayload {
    /// Builds the payload for a challenge and issuer key, deriving the
    /// context and key-id digests.
    pub fn new(token_type: u16, nonce: [u8; 32], challenge: &[u8], token_key: &[u8]) -> Self {
        TokenPayload {
            token_type,
            nonce,
            context: sha256(challenge),
            key_id: sha256(token_key),
        }
    }

    /// The one-byte key id used in [`TokenRequest`].
    pub fn truncated_key_id(&self) -> u8 {
        self.key_id[31]
    }

    /// Serializes to the wire layout.
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(2 + 96);
        out.extend_from_slice(&self.token_type.to_be_bytes());
        out.extend_from_slice(&self.nonce);
        out.extend_from_slice(&self.context);
        out.extend_from_slice(&self.key_id);
        out
    }
}

/// A finished token: payload plus the RSA-PSS authenticator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrivateToken {
    /// The signed payload.
    pub payload: TokenPayload,
    /// The signature over the serialized payload.
    pub authenticator: Vec<u8>,
}

impl PrivateToken {
    /// Serializes to the wire layout.
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = self.payload.serialize();
        out.extend_from_slice(&self.authenticator);
        out
    }
}

/// One usable challenge extracted from a `WWW-Authenticate` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenDetails {
    /// Token type, read from the first two challenge bytes.
    pub token_type: u16,
    /// The raw challenge blob.
    pub challenge: Vec<u8>,
    /// The issuer token key (SPKI), when provided.
    pub token_key: Vec<u8>,
    /// The `max-age` attribute, when provided.
    pub max_age: Option<u64>,
}

/// Parses every `PrivateToken` challenge in a `WWW-Authenticate` header.
/// Garbled entries are skipped rather than failing the HTTP pipeline this
/// gets called from.
pub fn parse_www_authenticate(header: &str) -> Vec<TokenDetails> {
    let mut details = Vec::new();
    for challenge in header.split("PrivateToken ") {
        if challenge.trim().is_empty() {
            continue;
        }
        let mut blob = Vec::new();
        let mut token_key = Vec::new();
        let mut max_age = None;
        for attribute in challenge.split(',') {
            let Some((key, value)) = attribute.split_once('=') else {
                continue;
            };
            match (key.trim(), value.trim()) {
                (ATTR_CHALLENGE, v) => blob = b64_any(v),
                (ATTR_TOKEN_KEY, v) => token_key = b64_any(v),
                (ATTR_MAX_AGE, v) => max_age = v.parse().ok(),
                _ => {}
            }
        }
        if blob.len() < 2 {
            continue;
        }
        let token_type = u16::from_be_bytes([blob[0], blob[1]]);
        details.push(TokenDetails {
            token_type,
            challenge: blob,
            token_key,
            max_age,
        });
    }
    details
}

// Attribute values appear in both base64url and plain base64; empty on any
// failure so the challenge gets skipped upstream.
fn b64_any(value: &str) -> Vec<u8> {
    URL_SAFE_NO_PAD
        .decode(value.trim_end_matches('='))
        .or_else(|_| STANDARD.decode(value))
        .unwrap_or_default()
}

fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

// DER object identifiers for RSA keys. Browsers cannot import RSA-PSS SPKI
// directly, so issuers publish either flavor.
const OID_RSA_ENCRYPTION: &[u8] = &[0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01, 0x01, 0x01];
const OID_RSASSA_PSS: &[u8] = &[0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01, 0x01, 0x0a];

/// Extracts `(n, e)` from a SubjectPublicKeyInfo structure carrying an
/// `rsaEncryption` or RSASSA-PSS key. Any other algorithm is a
/// [`WireError::KeyNotRsaPss`].
pub fn decode_rsa_spki(der: &[u8]) -> Result<RsaPublicKey, WireError> {
    let mut spki = Reader::new(der);
    let mut seq = Reader::new(spki.read_tlv(0x30)?);

    // AlgorithmIdentifier ::= SEQUENCE { algorithm OID, parameters ANY }
    let mut alg = Reader::new(seq.read_tlv(0x30)?);
    let oid = alg.read_tlv(0x06)?;
    if oid != OID_RSA_ENCRYPTION && oid != OID_RSASSA_PSS {
        return Err(WireError::KeyNotRsaPss);
    }

    // subjectPublicKey BIT STRING, zero unused bits, wrapping
    // RSAPublicKey ::= SEQUENCE { modulus INTEGER, publicExponent INTEGER }
    let bit_string = seq.read_tlv(0x03)?;
    let (&pad, key_der) = bit_string.split_first().ok_or(WireError::MalformedDer)?;
    if pad != 0 {
        return Err(WireError::MalformedDer);
    }
    let mut key = Reader::new(Reader::new(key_der).read_tlv(0x30)?);
    let n = key.read_tlv(0x02)?;
    let e = key.read_tlv(0x02)?;
    RsaPublicKey::from_be_bytes(n, e).map_err(|_| WireError::MalformedDer)
}

// A minimal cursor over DER/binary data.
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Reader { buf, pos: 0 }
    }

    fn read_u8(&mut self) -> Result<u8, WireError> {
        let b = *self.buf.get(self.pos).ok_or(WireError::Truncated)?;
        self.pos += 1;
        Ok(b)
    }

    fn read_u16(&mut self) -> Result<u16, WireError> {
        let hi = self.read_u8()?;
        let lo = self.read_u8()?;
        Ok(u16::from_be_bytes([hi, lo]))
    }

    fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], WireError> {
        let end = self.pos.checked_add(len).ok_or(WireError::Truncated)?;
        let slice = self.buf.get(self.pos..end).ok_or(WireError::Truncated)?;
        self.pos = end;
        Ok(slice)
    }

    fn rest(&self) -> &'a [u8] {
        &self.buf[self.pos..]
    }

    // Reads one DER TLV, checking the tag and supporting one- and two-byte
    // long-form lengths.
    fn read_tlv(&mut self, expected_tag: u8) -> Result<&'a [u8], WireError> {
        let tag = self.read_u8()?;
        if tag != expected_tag {
            return Err(WireError::MalformedDer);
        }
        let first = self.read_u8()?;
        let len = match first {
            0..=0x7f => first as usize,
            0x81 => self.read_u8()? as usize,
            0x82 => self.read_u16()? as usize,
            _ => return Err(WireError::MalformedDer),
        };
        self.read_bytes(len).map_err(|_| WireError::MalformedDer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPKI_RSA_B64: &str = "MIIBIjANBgkqhkiG9w0BAQEFAAOCAQ8AMIIBCgKCAQEA7s5sSIN6RGx7aq45hdV4g6Qn23wSWBnQiJ1jbLREvgAHOnf8t2ZGPpapeXKAQ3gcG9ujPz1QWoDmfjInKs0c2qXQFbAeabP/IoTyIdybVmP+KqaA5fprnI5O/V+LYnsT7FGPi9zap0O0GZ9VnDSzk1k91OXjMqGQ8K2M+Z2qq4lKHKW67OfaSrsqRntARpbxr3pc+/HUYKgjeYAG8R1fbfLeTnx2oe1R6J+alkmzUNAp5k5vaghF3yI5KXNvVIU1uvOCapAAyFPXYo0Hpd/RPi7v+W8Vhwe/9fhaO+wUuUvytlIuUtZT1T9N96V0D0yHSHtmAwKHGT6GKGjLH3gS/wIDAQAB";
    const SPKI_PSS_B64: &str = "MIIBIDALBgkqhkiG9w0BAQoDggEPADCCAQoCggEBAO7ObEiDekRse2quOYXVeIOkJ9t8ElgZ0IidY2y0RL4ABzp3/LdmRj6WqXlygEN4HBvboz89UFqA5n4yJyrNHNql0BWwHmmz/yKE8iHcm1Zj/iqmgOX6a5yOTv1fi2J7E+xRj4vc2qdDtBmfVZw0s5NZPdTl4zKhkPCtjPmdqquJShyluuzn2kq7KkZ7QEaW8a96XPvx1GCoI3mABvEdX23y3k58dqHtUeifmpZJs1DQKeZOb2oIRd8iOSlzb1SFNbrzgmqQAMhT12KNB6Xf0T4u7/lvFYcHv/X4WjvsFLlL8rZSLlLWU9U/TfeldA9Mh0h7ZgMChxk+hihoyx94Ev8CAwEAAQ==";
    // An EC key (not RSA) in SPKI form.
    const SPKI_EC_B64: &str = "MFkwEwYHKoZIzj0CAQYIKoZIzj0DAQcDQgAEQzC7ZNljAnDBtisT5+NU3kVSgTspwPoj76LRo5XiL742WyQg9mnzhsOzIloTdcrXRC1XFJcsLIuq9Scmtqb3+g==";

    fn challenge() -> TokenChallenge {
        TokenChallenge {
            token_type: BASIC_PUBLIC_TOKEN_TYPE,
            issuer_name: "issuer.example".into(),
            redemption_nonce: vec![7; 32],
            origin_info: vec!["origin.example".into(), "alt.example".into()],
        }
    }

    #[test]
    fn challenge_round_trip() {
        let c = challenge();
        let bytes = c.serialize();
        assert_eq!(TokenChallenge::parse(&bytes).unwrap(), c);
    }

    #[test]
    fn challenge_empty_origin_info() {
        let c = TokenChallenge {
            origin_info: vec![],
            ..challenge()
        };
        let parsed = TokenChallenge::parse(&c.serialize()).unwrap();
        assert_eq!(parsed.origin_info, Vec::<String>::new());
    }

    #[test]
    fn truncated_challenge_is_rejected() {
        let bytes = challenge().serialize();
        for cut in [0, 1, 3, bytes.len() - 1] {
            assert!(TokenChallenge::parse(&bytes[..cut]).is_err());
        }
    }

    #[test]
    fn token_request_round_trip() {
        let req = TokenRequest {
            token_type: BASIC_PUBLIC_TOKEN_TYPE,
            token_key_id: 0xab,
            blinded_msg: vec![1, 2, 3, 4],
        };
        let bytes = req.serialize();
        assert_eq!(bytes[..3], [0x00, 0x02, 0xab]);
        assert_eq!(TokenRequest::parse(&bytes).unwrap(), req);
    }

    #[test]
    fn token_payload_layout() {
        let payload = TokenPayload::new(
            BASIC_PUBLIC_TOKEN_TYPE,
            [9; 32],
            b"challenge bytes",
            b"token key bytes",
        );
        let bytes = payload.serialize();
        assert_eq!(bytes.len(), 2 + 32 + 32 + 32);
        assert_eq!(payload.truncated_key_id(), payload.key_id[31]);
        assert_eq!(bytes[2..34], [9; 32]);
    }

    #[test]
    fn www_authenticate_parses_and_skips_garbage() {
        let c = challenge();
        let blob = STANDARD.encode(c.serialize());
        let header = format!(
            "PrivateToken challenge={blob}, token-key={SPKI_RSA_B64}, max-age=60, \
             PrivateToken challenge=!!not-base64!!, token-key={SPKI_RSA_B64}"
        );
        let details = parse_www_authenticate(&header);
        assert_eq!(details.len(), 1);
        assert_eq!(details[0].token_type, BASIC_PUBLIC_TOKEN_TYPE);
        assert_eq!(details[0].max_age, Some(60));
        assert_eq!(
            TokenChallenge::parse(&details[0].challenge).unwrap(),
            c
        );
        assert!(decode_rsa_spki(&details[0].token_key).is_ok());
    }

    #[test]
    fn www_authenticate_empty_header() {
        assert!(parse_www_authenticate("").is_empty());
        assert!(parse_www_authenticate("Basic realm=x").is_empty());
    }

    #[test]
    fn spki_decodes_both_rsa_flavors() {
        for spki in [SPKI_RSA_B64, SPKI_PSS_B64] {
            let der = STANDARD.decode(spki).unwrap();
            let key = decode_rsa_spki(&der).unwrap();
            assert_eq!(key.modulus_len(), 256);
        }
        // same modulus under both encodings
        let a = decode_rsa_spki(&STANDARD.decode(SPKI_RSA_B64).unwrap()).unwrap();
        let b = decode_rsa_spki(&STANDARD.decode(SPKI_PSS_B64).unwrap()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn spki_rejects_non_rsa_keys() {
        let der = STANDARD.decode(SPKI_EC_B64).unwrap();
        assert_eq!(decode_rsa_spki(&der), Err(WireError::KeyNotRsaPss));
    }

    #[test]
    fn spki_rejects_garbage() {
        assert!(decode_rsa_spki(&[0x30, 0x03, 0x01]).is_err());
        assert!(decode_rsa_spki(&[]).is_err());
    }
}

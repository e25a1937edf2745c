//! Issuance wire format.
//!
//! A request is `base64(JSON {"type":"Issue","contents":[…]})` with SEC1
//! *compressed* points, shipped as the `blinded-tokens` form parameter. The
//! response is either the legacy `signatures=<b64>` string or a JSON object
//! `{"signatures":"<b64>"}`; the decoded payload is a flat array
//! `[sig…, proof]` or an object `{sigs, proof, version?, prng?}`.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

use privacypass_core::curve::{Affine, decode_scalar, encode_scalar, sec1_decode};
use privacypass_core::dleq::{BatchProof, ScalarPrng};
use privacypass_core::token::Token;

use crate::{WireError, point_from_b64, point_to_b64};

/// Form parameter carrying the issuance request body.
pub const ISSUE_BODY_PARAM: &str = "blinded-tokens";

/// Legacy prefix some issuers wrap around the batch proof.
const BATCH_PROOF_PREFIX: &str = "batch-proof=";

/// The shared JSON shell of issuance and redemption payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlindTokenRequest {
    /// `"Issue"` or `"Redeem"`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Base64 blobs; meaning depends on `kind`.
    pub contents: Vec<String>,
}

/// How the issuer formats its response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseFormat {
    /// `signatures=<base64>` somewhere in the body.
    #[default]
    String,
    /// `{"signatures": "<base64>"}`.
    Json,
}

/// A fully decoded issuance response.
#[derive(Debug, Clone, PartialEq)]
pub struct IssueResponse {
    /// The signed blinded points, validated and in request order.
    pub signed_points: Vec<Affine>,
    /// The batched DLEQ proof.
    pub proof: BatchProof,
    /// The commitment version the issuer signed under, if stated.
    pub version: Option<String>,
    /// The PRNG to verify the proof with (`shake` when unstated).
    pub prng: ScalarPrng,
}

/// Encodes the issuance request for a set of freshly blinded tokens.
/// Compression is mandatory on the wire.
pub fn encode_issue_request(tokens: &[Token]) -> Result<String, WireError> {
    let contents = tokens
        .iter()
        .map(|t| point_to_b64(t.blinded_point(), true))
        .collect::<Result<Vec<_>, _>>()?;
    let request = BlindTokenRequest {
        kind: "Issue".into(),
        contents,
    };
    let json = serde_json::to_string(&request).map_err(|_| WireError::Json)?;
    Ok(STANDARD.encode(json))
}

/// Decodes an issuance request back into blinded points (the issuer side of
/// the exchange).
pub fn decode_issue_request(body: &str) -> Result<Vec<Affine>, WireError> {
    let json = STANDARD.decode(body).map_err(|_| WireError::Base64)?;
    let request: BlindTokenRequest =
        serde_json::from_slice(&json).map_err(|_| WireError::Json)?;
    if request.kind != "Issue" {
        return Err(WireError::UnexpectedType(request.kind));
    }
    request.contents.iter().map(|c| point_from_b64(c)).collect()
}

// The two inner payload shapes issuers are known to produce.
#[derive(Deserialize)]
#[serde(untagged)]
enum InnerResponse {
    Object {
        sigs: Vec<String>,
        proof: String,
        version: Option<String>,
        prng: Option<String>,
    },
    Flat(Vec<String>),
}

/// Parses and validates an issuance response body.
///
/// All decode failures — base64, JSON, point validation, proof scalars —
/// surface as errors here so the verification step never sees malformed
/// input.
pub fn parse_issue_response(
    body: &str,
    format: ResponseFormat,
) -> Result<IssueResponse, WireError> {
    let payload_b64 = match format {
        ResponseFormat::String => body
            .split_once("signatures=")
            .map(|(_, rest)| rest.trim())
            .ok_or(WireError::MissingSignatures)?
            .to_string(),
        ResponseFormat::Json => {
            #[derive(Deserialize)]
            struct Outer {
                signatures: String,
            }
            let outer: Outer = serde_json::from_str(body).map_err(|_| WireError::Json)?;
            outer.signatures
        }
    };
    let payload = STANDARD.decode(payload_b64).map_err(|_| WireError::Base64)?;
    let inner: InnerResponse = serde_json::from_slice(&payload).map_err(|_| WireError::Json)?;

    let (sigs, proof, version, prng) = match inner {
        InnerResponse::Object {
            sigs,
            proof,
            version,
            prng,
        } => (sigs, proof, version, prng),
        InnerResponse::Flat(mut items) => {
            let proof = items.pop().ok_or(WireError::MissingProof)?;
            (items, proof, None, None)
        }
    };
    if sigs.is_empty() {
        return Err(WireError::MissingSignatures);
    }

    let prng = match prng {
        None => ScalarPrng::default(),
        Some(name) => ScalarPrng::from_name(&name).ok_or(WireError::UnknownPrng(name))?,
    };

    Ok(IssueResponse {
        signed_points: decode_signed_points(&sigs)?,
        proof: parse_batch_proof(&proof)?,
        version,
        prng,
    })
}

// Decodes the signed points, insisting on one compression form across the
// whole batch.
fn decode_signed_points(sigs: &[String]) -> Result<Vec<Affine>, WireError> {
    let mut compressed: Option<bool> = None;
    let mut points = Vec::with_capacity(sigs.len());
    for sig in sigs {
        let bytes = STANDARD.decode(sig).map_err(|_| WireError::Base64)?;
        let is_compressed = matches!(bytes.first(), Some(&0x02) | Some(&0x03));
        match compressed {
            None => compressed = Some(is_compressed),
            Some(expected) if expected != is_compressed => {
                return Err(WireError::MixedCompression);
            }
            Some(_) => {}
        }
        points.push(sec1_decode(&bytes)?);
    }
    Ok(points)
}

/// Parses the wire batch proof: base64 of (optionally `batch-proof=`
/// prefixed) JSON `{"P": b64(JSON {"R","C"})}` with big-endian scalars.
pub fn parse_batch_proof(proof_b64: &str) -> Result<BatchProof, WireError> {
    let outer = STANDARD.decode(proof_b64).map_err(|_| WireError::Base64)?;
    let outer = String::from_utf8(outer).map_err(|_| WireError::Json)?;
    let outer = outer
        .strip_prefix(BATCH_PROOF_PREFIX)
        .unwrap_or(outer.as_str());

    #[derive(Deserialize)]
    struct Wrapper {
        #[serde(rename = "P")]
        p: String,
    }
    let wrapper: Wrapper = serde_json::from_str(outer).map_err(|_| WireError::Json)?;
    let inner = STANDARD.decode(&wrapper.p).map_err(|_| WireError::Base64)?;

    #[derive(Deserialize)]
    struct ProofWire {
        #[serde(rename = "R")]
        r: String,
        #[serde(rename = "C")]
        c: String,
    }
    let wire: ProofWire = serde_json::from_slice(&inner).map_err(|_| WireError::Json)?;
    let r = decode_scalar(&STANDARD.decode(wire.r).map_err(|_| WireError::Base64)?)?;
    let c = decode_scalar(&STANDARD.decode(wire.c).map_err(|_| WireError::Base64)?)?;
    Ok(BatchProof { c, r })
}

/// Encodes a batch proof the way [`parse_batch_proof`] expects it (issuer
/// side, also used by tests).
pub fn encode_batch_proof(proof: &BatchProof) -> String {
    let inner = serde_json::json!({
        "R": STANDARD.encode(encode_scalar(&proof.r)),
        "C": STANDARD.encode(encode_scalar(&proof.c)),
    });
    let wrapper = serde_json::json!({ "P": STANDARD.encode(inner.to_string()) });
    STANDARD.encode(wrapper.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ark_secp256r1::Fr;
    use privacypass_core::config::{CurveConfig, CurveId, H2cMethod, HashId};
    use privacypass_core::token::IssuerKey;

    fn tokens(n: usize) -> Vec<Token> {
        let config = CurveConfig::new(CurveId::P256, HashId::Sha256, H2cMethod::Swu);
        let mut rng = rand::thread_rng();
        (0..n)
            .map(|_| Token::generate(&config, &mut rng).unwrap())
            .collect()
    }

    #[test]
    fn issue_request_round_trip() {
        let tokens = tokens(3);
        let encoded = encode_issue_request(&tokens).unwrap();
        let points = decode_issue_request(&encoded).unwrap();
        assert_eq!(points.len(), 3);
        for (token, point) in tokens.iter().zip(points.iter()) {
            assert_eq!(token.blinded_point(), point);
        }
    }

    #[test]
    fn issue_request_uses_compressed_points() {
        let tokens = tokens(1);
        let encoded = encode_issue_request(&tokens).unwrap();
        let json = STANDARD.decode(encoded).unwrap();
        let request: BlindTokenRequest = serde_json::from_slice(&json).unwrap();
        assert_eq!(request.kind, "Issue");
        let point = STANDARD.decode(&request.contents[0]).unwrap();
        assert_eq!(point.len(), 33);
    }

    #[test]
    fn redeem_typed_request_is_rejected() {
        let request = BlindTokenRequest {
            kind: "Redeem".into(),
            contents: vec![],
        };
        let body = STANDARD.encode(serde_json::to_string(&request).unwrap());
        assert_eq!(
            decode_issue_request(&body),
            Err(WireError::UnexpectedType("Redeem".into()))
        );
    }

    fn response_payload(sigs: &[String], proof: &str) -> String {
        serde_json::json!({ "sigs": sigs, "proof": proof, "version": "1.0", "prng": "hkdf" })
            .to_string()
    }

    fn signed_points_b64(tokens: &[Token], key: &IssuerKey, compressed: bool) -> Vec<String> {
        tokens
            .iter()
            .map(|t| point_to_b64(&key.evaluate(t.blinded_point()), compressed).unwrap())
            .collect()
    }

    #[test]
    fn parse_object_response_in_both_outer_forms() {
        let mut rng = rand::thread_rng();
        let key = IssuerKey::random(&mut rng);
        let tokens = tokens(2);
        let sigs = signed_points_b64(&tokens, &key, true);
        let proof = encode_batch_proof(&BatchProof {
            c: Fr::from(7u64),
            r: Fr::from(9u64),
        });
        let payload = STANDARD.encode(response_payload(&sigs, &proof));

        let string_body = format!("signatures={payload}");
        let parsed = parse_issue_response(&string_body, ResponseFormat::String).unwrap();
        assert_eq!(parsed.signed_points.len(), 2);
        assert_eq!(parsed.version.as_deref(), Some("1.0"));
        assert_eq!(parsed.prng, ScalarPrng::Hkdf);
        assert_eq!(parsed.proof.c, Fr::from(7u64));
        assert_eq!(parsed.proof.r, Fr::from(9u64));

        let json_body = serde_json::json!({ "signatures": payload }).to_string();
        let parsed_json = parse_issue_response(&json_body, ResponseFormat::Json).unwrap();
        assert_eq!(parsed_json.signed_points, parsed.signed_points);
    }

    #[test]
    fn parse_flat_array_response_defaults() {
        let mut rng = rand::thread_rng();
        let key = IssuerKey::random(&mut rng);
        let tokens = tokens(2);
        let mut items = signed_points_b64(&tokens, &key, false);
        items.push(encode_batch_proof(&BatchProof {
            c: Fr::from(1u64),
            r: Fr::from(2u64),
        }));
        let payload = STANDARD.encode(serde_json::to_string(&items).unwrap());
        let body = format!("signatures={payload}");

        let parsed = parse_issue_response(&body, ResponseFormat::String).unwrap();
        assert_eq!(parsed.signed_points.len(), 2);
        assert_eq!(parsed.version, None);
        assert_eq!(parsed.prng, ScalarPrng::Shake);
    }

    #[test]
    fn mixed_compression_is_rejected() {
        let mut rng = rand::thread_rng();
        let key = IssuerKey::random(&mut rng);
        let tokens = tokens(2);
        let mut sigs = signed_points_b64(&tokens, &key, true);
        sigs[1] = point_to_b64(&key.evaluate(tokens[1].blinded_point()), false).unwrap();
        let proof = encode_batch_proof(&BatchProof {
            c: Fr::from(1u64),
            r: Fr::from(2u64),
        });
        let payload = STANDARD.encode(response_payload(&sigs, &proof));
        let body = format!("signatures={payload}");
        assert_eq!(
            parse_issue_response(&body, ResponseFormat::String),
            Err(WireError::MixedCompression)
        );
    }

    #[test]
    fn unknown_prng_is_rejected() {
        let mut rng = rand::thread_rng();
        let key = IssuerKey::random(&mut rng);
        let tokens = tokens(1);
        let sigs = signed_points_b64(&tokens, &key, true);
        let proof = encode_batch_proof(&BatchProof {
            c: Fr::from(1u64),
            r: Fr::from(2u64),
        });
        let payload = serde_json::json!({ "sigs": sigs, "proof": proof, "prng": "chacha" });
        let body = format!("signatures={}", STANDARD.encode(payload.to_string()));
        assert_eq!(
            parse_issue_response(&body, ResponseFormat::String),
            Err(WireError::UnknownPrng("chacha".into()))
        );
    }

    #[test]
    fn batch_proof_round_trip_with_legacy_prefix() {
        let proof = BatchProof {
            c: Fr::from(1234567u64),
            r: Fr::from(7654321u64),
        };
        let encoded = encode_batch_proof(&proof);
        assert_eq!(parse_batch_proof(&encoded).unwrap(), proof);

        // same payload wrapped in the legacy prefix
        let outer = STANDARD.decode(&encoded).unwrap();
        let prefixed =
            STANDARD.encode([BATCH_PROOF_PREFIX.as_bytes(), &outer].concat());
        assert_eq!(parse_batch_proof(&prefixed).unwrap(), proof);
    }

    #[test]
    fn garbled_proof_fails_to_parse() {
        assert_eq!(parse_batch_proof("!!!"), Err(WireError::Base64));
        let not_json = STANDARD.encode("nonsense");
        assert_eq!(parse_batch_proof(&not_json), Err(WireError::Json));
    }

    #[test]
    fn missing_signatures_marker_is_rejected() {
        assert_eq!(
            parse_issue_response("captcha-bypass=true", ResponseFormat::String),
            Err(WireError::MissingSignatures)
        );
    }
}

//! End-to-end VOPRF issuance and redemption against an in-process issuer.

use ark_ec::AffineRepr;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;

use privacypass_client::{
    Error, build_issue_request, build_redemption_header, generate_tokens, process_issue_response,
};
use privacypass_core::commitment::{Commitment, CommitmentCache};
use privacypass_core::config::{CurveConfig, CurveId, H2cMethod, HashId};
use privacypass_core::curve::Affine;
use privacypass_core::dleq::{BatchProof, ScalarPrng, prove_batch};
use privacypass_core::h2c::h2_curve;
use privacypass_core::token::{IssuerKey, derive_key, request_binding};
use privacypass_types::issuance::{ResponseFormat, decode_issue_request, encode_batch_proof};
use privacypass_types::point_to_b64;
use privacypass_types::redemption::decode_redemption_header;

fn config() -> CurveConfig {
    CurveConfig::new(CurveId::P256, HashId::Sha256, H2cMethod::Swu)
}

// What a real issuer does with the request body: decode, evaluate, prove.
fn issuer_respond(
    key: &IssuerKey,
    request_body: &str,
    prng: ScalarPrng,
    rng: &mut (impl rand::Rng + rand::CryptoRng),
) -> (Vec<Affine>, BatchProof) {
    let blinded = decode_issue_request(request_body).unwrap();
    let signed = key.evaluate_batch(&blinded);
    let proof = prove_batch(key, &blinded, &signed, &Affine::generator(), prng, rng).unwrap();
    (signed, proof)
}

fn response_body(signed: &[Affine], proof: &BatchProof, prng: ScalarPrng) -> String {
    let sigs: Vec<String> = signed
        .iter()
        .map(|p| point_to_b64(p, true).unwrap())
        .collect();
    let payload = serde_json::json!({
        "sigs": sigs,
        "proof": encode_batch_proof(proof),
        "version": "1.0",
        "prng": prng.name(),
    });
    format!("signatures={}", STANDARD.encode(payload.to_string()))
}

fn cache_with_commitment(key: &IssuerKey) -> CommitmentCache {
    let (g, h) = key.commitment(&Affine::generator());
    let mut cache = CommitmentCache::new();
    cache.insert("1.0", Commitment { g, h });
    cache
}

#[test]
fn issue_and_redeem_three_tokens() {
    let mut rng = rand::thread_rng();
    let config = config();
    let key = IssuerKey::random(&mut rng);

    // Client: three blinded tokens in one request.
    let tokens = generate_tokens(&config, 3, &mut rng).unwrap();
    let request_body = build_issue_request(&tokens).unwrap();

    // Issuer: sign and prove.
    let (signed, proof) = issuer_respond(&key, &request_body, ScalarPrng::Shake, &mut rng);
    let body = response_body(&signed, &proof, ScalarPrng::Shake);

    // Client: verify the proof and unblind.
    let cache = cache_with_commitment(&key);
    let signed_tokens =
        process_issue_response(&body, ResponseFormat::String, &tokens, &cache).unwrap();
    assert_eq!(signed_tokens.len(), 3);

    // Client: redeem the first token against example.com.
    let token = &signed_tokens[0];
    let header = build_redemption_header(token, "example.com", "GET /", None).unwrap();

    // Verifier: decode the header and recompute the binding from k.
    let redeem = decode_redemption_header(&header).unwrap();
    assert_eq!(redeem.seed, token.seed().to_vec());

    let t = h2_curve(&redeem.seed, &config).unwrap();
    let q = key.evaluate(&t);
    let shared_key = derive_key(&q, &redeem.seed).unwrap();
    let expected = request_binding(&shared_key, b"example.com", b"GET /");
    assert_eq!(redeem.binding, expected.to_vec());
}

#[test]
fn hkdf_prng_responses_verify_too() {
    let mut rng = rand::thread_rng();
    let key = IssuerKey::random(&mut rng);
    let tokens = generate_tokens(&config(), 5, &mut rng).unwrap();
    let request_body = build_issue_request(&tokens).unwrap();
    let (signed, proof) = issuer_respond(&key, &request_body, ScalarPrng::Hkdf, &mut rng);
    let body = response_body(&signed, &proof, ScalarPrng::Hkdf);

    let cache = cache_with_commitment(&key);
    let signed_tokens =
        process_issue_response(&body, ResponseFormat::String, &tokens, &cache).unwrap();
    assert_eq!(signed_tokens.len(), 5);
}

#[test]
fn proof_prng_mismatch_is_rejected() {
    let mut rng = rand::thread_rng();
    let key = IssuerKey::random(&mut rng);
    let tokens = generate_tokens(&config(), 3, &mut rng).unwrap();
    let request_body = build_issue_request(&tokens).unwrap();
    let (signed, proof) = issuer_respond(&key, &request_body, ScalarPrng::Shake, &mut rng);
    // The response lies about the PRNG the proof was built with.
    let body = response_body(&signed, &proof, ScalarPrng::Hkdf);

    let cache = cache_with_commitment(&key);
    let err = process_issue_response(&body, ResponseFormat::String, &tokens, &cache).unwrap_err();
    assert!(matches!(err, Error::InvalidProof));
}

#[test]
fn swapped_signatures_are_rejected() {
    let mut rng = rand::thread_rng();
    let key = IssuerKey::random(&mut rng);
    let tokens = generate_tokens(&config(), 3, &mut rng).unwrap();
    let request_body = build_issue_request(&tokens).unwrap();
    let (mut signed, proof) = issuer_respond(&key, &request_body, ScalarPrng::Shake, &mut rng);
    signed.swap(0, 2);
    let body = response_body(&signed, &proof, ScalarPrng::Shake);

    let cache = cache_with_commitment(&key);
    let err = process_issue_response(&body, ResponseFormat::String, &tokens, &cache).unwrap_err();
    assert!(matches!(err, Error::InvalidProof));
}

#[test]
fn wrong_issuer_key_is_rejected() {
    let mut rng = rand::thread_rng();
    let key = IssuerKey::random(&mut rng);
    let rogue = IssuerKey::random(&mut rng);
    let tokens = generate_tokens(&config(), 3, &mut rng).unwrap();
    let request_body = build_issue_request(&tokens).unwrap();
    let (signed, proof) = issuer_respond(&rogue, &request_body, ScalarPrng::Shake, &mut rng);
    let body = response_body(&signed, &proof, ScalarPrng::Shake);

    // Commitment is for the honest key; the rogue proof must not pass.
    let cache = cache_with_commitment(&key);
    let err = process_issue_response(&body, ResponseFormat::String, &tokens, &cache).unwrap_err();
    assert!(matches!(err, Error::InvalidProof));
}

#[test]
fn missing_commitment_version_is_reported() {
    let mut rng = rand::thread_rng();
    let key = IssuerKey::random(&mut rng);
    let tokens = generate_tokens(&config(), 2, &mut rng).unwrap();
    let request_body = build_issue_request(&tokens).unwrap();
    let (signed, proof) = issuer_respond(&key, &request_body, ScalarPrng::Shake, &mut rng);
    let body = response_body(&signed, &proof, ScalarPrng::Shake);

    let err = process_issue_response(&body, ResponseFormat::String, &tokens, &CommitmentCache::new())
        .unwrap_err();
    match err {
        Error::UnknownCommitmentVersion(version) => assert_eq!(version, "1.0"),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn truncated_signature_batch_is_rejected() {
    let mut rng = rand::thread_rng();
    let key = IssuerKey::random(&mut rng);
    let tokens = generate_tokens(&config(), 3, &mut rng).unwrap();
    let request_body = build_issue_request(&tokens).unwrap();
    let (signed, proof) = issuer_respond(&key, &request_body, ScalarPrng::Shake, &mut rng);
    let body = response_body(&signed[..2], &proof, ScalarPrng::Shake);

    let cache = cache_with_commitment(&key);
    let err = process_issue_response(&body, ResponseFormat::String, &tokens, &cache).unwrap_err();
    assert!(matches!(
        err,
        Error::SignatureCountMismatch {
            got: 2,
            expected: 3
        }
    ));
}

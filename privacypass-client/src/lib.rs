#![deny(missing_docs, clippy::unwrap_used)]
//! Client-side Privacy Pass flows.
//!
//! This crate is the engine's surface toward the embedding layer (a browser
//! extension, a proxy, a test harness): it turns protocol state into wire
//! bytes and wire bytes back into protocol state, and owns the error surface
//! the embedder reacts to. It performs no I/O — shipping request bodies and
//! fetching commitment documents is the caller's job, which keeps every
//! function here synchronous and deterministic.
//!
//! The VOPRF flow lives at the crate root; the RSA-based `PrivateToken` flow
//! lives in [`public_token`].

use rand::{CryptoRng, Rng};
use tracing::{debug, instrument, warn};

use privacypass_core::blindrsa::BlindRsaError;
use privacypass_core::commitment::{Commitment, CommitmentCache, CommitmentError};
use privacypass_core::config::{ConfigError, CurveConfig};
use privacypass_core::curve::Affine;
use privacypass_core::dleq::{DleqError, verify_batch};
use privacypass_core::h2c::H2cError;
use privacypass_core::token::{Token, TokenError};
use privacypass_types::WireError;
use privacypass_types::issuance::{IssueResponse, ResponseFormat, parse_issue_response};
use privacypass_types::redemption::{H2cParams, encode_redemption_header};

pub mod public_token;

/// Commitment version assumed when the issuer does not state one.
pub const DEFAULT_COMMITMENT_VERSION: &str = "1.0";

/// Errors surfaced to the embedding layer, with the failure classes kept
/// apart: configuration problems are fatal, wire problems mean "discard the
/// message", verification failures may warrant wiping stored state,
/// exhaustion means "try something else".
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Unsupported curve/hash/method combination. Fatal for the session.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// A wire payload could not be decoded. Discard and move on.
    #[error(transparent)]
    Wire(#[from] WireError),
    /// The batched DLEQ proof failed verification. The issuer may be
    /// misbehaving; callers should treat stored state as suspect.
    #[error("DLEQ batch proof could not be verified")]
    InvalidProof,
    /// The proof could not be checked for structural reasons (bad points,
    /// batch length mismatch).
    #[error(transparent)]
    Dleq(#[from] DleqError),
    /// No commitment is cached for this version; fetch and verify the
    /// issuer's commitment document, then retry.
    #[error("no commitment cached for version {0:?}")]
    UnknownCommitmentVersion(String),
    /// Commitment document verification failed.
    #[error(transparent)]
    Commitment(#[from] CommitmentError),
    /// A token operation failed.
    #[error(transparent)]
    Token(#[from] TokenError),
    /// Hash-to-curve failed.
    #[error(transparent)]
    H2c(#[from] H2cError),
    /// The RSA blind-signature flow failed.
    #[error(transparent)]
    BlindRsa(#[from] BlindRsaError),
    /// Every requested token failed to generate.
    #[error("all {0} token generations failed")]
    NoUsableTokens(usize),
    /// The issuer answered with the wrong number of signatures.
    #[error("issuer returned {got} signatures for {expected} tokens")]
    SignatureCountMismatch {
        /// signatures in the response
        got: usize,
        /// tokens in the request
        expected: usize,
    },
}

/// Generates `count` fresh blinded tokens.
///
/// Individual hash-to-curve failures (possible only with the legacy
/// increment method) drop that token and continue, matching deployed
/// behavior; only a fully failed batch is an error.
#[instrument(level = "debug", skip(config, rng))]
pub fn generate_tokens<R: Rng + CryptoRng>(
    config: &CurveConfig,
    count: usize,
    rng: &mut R,
) -> Result<Vec<Token>, Error> {
    let mut tokens = Vec::with_capacity(count);
    for _ in 0..count {
        match Token::generate(config, rng) {
            Ok(token) => tokens.push(token),
            Err(err) => {
                warn!("dropping token that failed to map to the curve: {err}");
            }
        }
    }
    if tokens.is_empty() && count > 0 {
        return Err(Error::NoUsableTokens(count));
    }
    debug!("generated {} blinded tokens", tokens.len());
    Ok(tokens)
}

/// Encodes the issuance request body for a token batch. Ship it as the
/// `blinded-tokens` form parameter.
pub fn build_issue_request(tokens: &[Token]) -> Result<String, Error> {
    Ok(privacypass_types::issuance::encode_issue_request(tokens)?)
}

/// Decodes an issuance response, checks the batched DLEQ proof against the
/// cached commitment for the response's version, and unblinds the signed
/// tokens.
///
/// Fails with [`Error::UnknownCommitmentVersion`] when the needed commitment
/// is not cached yet; the caller fetches and verifies the commitment
/// document, inserts it, and calls again.
#[instrument(level = "debug", skip_all, fields(tokens = tokens.len()))]
pub fn process_issue_response(
    body: &str,
    format: ResponseFormat,
    tokens: &[Token],
    commitments: &CommitmentCache,
) -> Result<Vec<Token>, Error> {
    let response = parse_issue_response(body, format)?;
    let version = response
        .version
        .clone()
        .unwrap_or_else(|| DEFAULT_COMMITMENT_VERSION.to_string());
    let commitment = commitments
        .get(&version)
        .copied()
        .ok_or(Error::UnknownCommitmentVersion(version))?;
    verify_and_unblind(response, tokens, &commitment)
}

/// Verifies the response's batch proof against a specific commitment and
/// unblinds the signed tokens. The input tokens are left untouched (so a
/// failed attempt loses nothing); on success each returned token carries its
/// signature.
#[instrument(level = "debug", skip_all)]
pub fn verify_and_unblind(
    response: IssueResponse,
    tokens: &[Token],
    commitment: &Commitment,
) -> Result<Vec<Token>, Error> {
    if response.signed_points.len() != tokens.len() {
        return Err(Error::SignatureCountMismatch {
            got: response.signed_points.len(),
            expected: tokens.len(),
        });
    }

    let blinded: Vec<Affine> = tokens.iter().map(|t| *t.blinded_point()).collect();
    verify_batch(
        &response.proof,
        &blinded,
        &response.signed_points,
        &commitment.g,
        &commitment.h,
        response.prng,
    )
    .map_err(|err| match err {
        DleqError::Invalid => {
            warn!("issuer batch proof failed verification");
            Error::InvalidProof
        }
        other => Error::Dleq(other),
    })?;
    debug!("batch proof verified, unblinding {} tokens", tokens.len());

    tokens
        .iter()
        .zip(response.signed_points)
        .map(|(token, signed)| Ok(token.clone().into_signed(signed)?))
        .collect()
}

/// Builds the `challenge-bypass-token` redemption header for one signed
/// token. When `config` is given, its h2c parameters ride along so the
/// verifier can reproduce the seed mapping.
#[instrument(level = "debug", skip(token, config))]
pub fn build_redemption_header(
    token: &Token,
    host: &str,
    path: &str,
    config: Option<&CurveConfig>,
) -> Result<String, Error> {
    let params = config.map(H2cParams::from);
    Ok(encode_redemption_header(token, host, path, params.as_ref())?)
}

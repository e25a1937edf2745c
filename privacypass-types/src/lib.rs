#![deny(missing_docs)]
//! Wire formats exchanged with Privacy Pass issuers.
//!
//! This crate owns every byte layout that crosses the HTTP boundary —
//! issuance requests and responses, the redemption header, and the binary
//! `PrivateToken` authentication scheme — and converts between those layouts
//! and the strongly-typed values of `privacypass-core`. Transport itself
//! (fetching, posting, retrying) belongs to the embedding layer.
//!
//! Decoding is strict where the engine's security depends on it (points,
//! scalars, proofs) and forgiving where the HTTP pipeline must keep running
//! (unparseable `WWW-Authenticate` challenges are skipped, not raised).

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;

use privacypass_core::curve::{Affine, PointError, ScalarError, sec1_decode, sec1_encode};

pub mod auth;
pub mod issuance;
pub mod redemption;

/// Errors from (de)serializing wire payloads.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    /// A layer that should be base64 is not.
    #[error("payload is not valid base64")]
    Base64,
    /// A layer that should be JSON is not.
    #[error("payload is not valid JSON")]
    Json,
    /// The request/response `type` tag is not the expected one.
    #[error("unexpected payload type {0:?}")]
    UnexpectedType(String),
    /// A redemption or issuance payload misses required contents.
    #[error("payload is missing required contents")]
    MissingContents,
    /// The issuance response carries no signatures.
    #[error("issuance response carries no signed tokens")]
    MissingSignatures,
    /// The issuance response carries no batch proof.
    #[error("issuance response carries no batch proof")]
    MissingProof,
    /// Signed points mix compressed and uncompressed encodings.
    #[error("mixed point compression within one response batch")]
    MixedCompression,
    /// The response names a PRNG this engine does not implement.
    #[error("issuance response names unsupported PRNG {0:?}")]
    UnknownPrng(String),
    /// A binary structure ended early.
    #[error("truncated binary structure")]
    Truncated,
    /// A DER structure is malformed.
    #[error("malformed DER structure")]
    MalformedDer,
    /// The issuer key is not an RSA / RSA-PSS key.
    #[error("key is not RSA-PSS")]
    KeyNotRsaPss,
    /// A point failed validation.
    #[error(transparent)]
    Point(#[from] PointError),
    /// A scalar failed validation.
    #[error(transparent)]
    Scalar(#[from] ScalarError),
}

/// Decodes a base64 SEC1 point (either compression).
pub fn point_from_b64(b64: &str) -> Result<Affine, WireError> {
    let bytes = STANDARD.decode(b64).map_err(|_| WireError::Base64)?;
    Ok(sec1_decode(&bytes)?)
}

/// Encodes a point as base64 SEC1.
pub fn point_to_b64(point: &Affine, compressed: bool) -> Result<String, WireError> {
    Ok(STANDARD.encode(sec1_encode(point, compressed)?))
}

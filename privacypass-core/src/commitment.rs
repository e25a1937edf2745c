//! Issuer commitment handling.
//!
//! Issuers publish a document mapping version strings to commitment records
//! `{G, H, expiry, sig}`. A record is only usable after its ECDSA signature
//! verifies under the out-of-band (PEM) distributed key and its expiry lies
//! in the future; verified pairs are cached keyed by version. Changing the
//! session configuration must clear the cache wholesale — entries are never
//! patched in place.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use p256::ecdsa::signature::Verifier as _;
use p256::ecdsa::{Signature, VerifyingKey};
use p256::pkcs8::DecodePublicKey as _;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::curve::{Affine, PointError, sec1_decode};

/// One commitment record as it appears in the issuer's document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitmentData {
    /// Base64 SEC1 encoding of the base point `G`.
    #[serde(rename = "G")]
    pub g: String,
    /// Base64 SEC1 encoding of the issuer commitment `H = k·G`.
    #[serde(rename = "H")]
    pub h: String,
    /// RFC 3339 expiry timestamp.
    pub expiry: String,
    /// Base64 DER ECDSA-P256/SHA-256 signature over the canonical record
    /// JSON. Absent means unusable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sig: Option<String>,
}

// The signature covers this exact serialization of the record (field order
// G, H, expiry; compact JSON).
#[derive(Serialize)]
struct SignedPayload<'a> {
    #[serde(rename = "G")]
    g: &'a str,
    #[serde(rename = "H")]
    h: &'a str,
    expiry: &'a str,
}

/// A commitment pair whose signature and expiry have been checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Commitment {
    /// The base point.
    pub g: Affine,
    /// The issuer commitment `H = k·G`.
    pub h: Affine,
}

/// Commitment verification failures. `Expired` and `BadSignature` indicate a
/// stale or hostile document and warrant aggressive caller-side action;
/// the rest are decode problems.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommitmentError {
    /// The record carries no signature.
    #[error("commitment record has no signature")]
    MissingSignature,
    /// The expiry field is not a valid RFC 3339 timestamp.
    #[error("commitment expiry is malformed: {0}")]
    MalformedExpiry(String),
    /// The expiry has passed.
    #[error("commitment expired at {0}")]
    Expired(DateTime<Utc>),
    /// The verification key PEM could not be parsed.
    #[error("commitment verification key is malformed")]
    MalformedKey,
    /// The signature bytes could not be decoded.
    #[error("commitment signature is malformed")]
    MalformedSignature,
    /// The signature does not verify over the record.
    #[error("commitment signature does not verify")]
    BadSignature,
    /// The commitments document is not the expected JSON shape.
    #[error("commitments document is malformed")]
    MalformedDocument,
    /// A commitment point failed base64 decoding.
    #[error("commitment point is not valid base64")]
    MalformedPoint,
    /// A commitment point failed curve validation.
    #[error(transparent)]
    Point(#[from] PointError),
}

impl CommitmentData {
    /// Verifies this record against the issuer's ECDSA key at time `now` and
    /// returns the usable commitment pair. All-or-nothing: no partially
    /// validated state escapes.
    pub fn verify(&self, key_pem: &str, now: DateTime<Utc>) -> Result<Commitment, CommitmentError> {
        let sig_b64 = self.sig.as_deref().ok_or(CommitmentError::MissingSignature)?;

        let expiry = DateTime::parse_from_rfc3339(&self.expiry)
            .map_err(|_| CommitmentError::MalformedExpiry(self.expiry.clone()))?
            .with_timezone(&Utc);
        if now >= expiry {
            return Err(CommitmentError::Expired(expiry));
        }

        let key =
            VerifyingKey::from_public_key_pem(key_pem).map_err(|_| CommitmentError::MalformedKey)?;
        let sig_der = STANDARD
            .decode(sig_b64)
            .map_err(|_| CommitmentError::MalformedSignature)?;
        let signature =
            Signature::from_der(&sig_der).map_err(|_| CommitmentError::MalformedSignature)?;

        let payload = serde_json::to_vec(&SignedPayload {
            g: &self.g,
            h: &self.h,
            expiry: &self.expiry,
        })
        .expect("commitment payload serializes");
        key.verify(&payload, &signature)
            .map_err(|_| CommitmentError::BadSignature)?;

        let g = decode_point_b64(&self.g)?;
        let h = decode_point_b64(&self.h)?;
        Ok(Commitment { g, h })
    }
}

fn decode_point_b64(b64: &str) -> Result<Affine, CommitmentError> {
    let bytes = STANDARD
        .decode(b64)
        .map_err(|_| CommitmentError::MalformedPoint)?;
    Ok(sec1_decode(&bytes)?)
}

/// Parses an issuer commitments document: JSON keyed by version string.
/// Records are *not* verified here; run [`CommitmentData::verify`] on the
/// version you need before use.
pub fn parse_document(json: &str) -> Result<HashMap<String, CommitmentData>, CommitmentError> {
    serde_json::from_str(json).map_err(|_| CommitmentError::MalformedDocument)
}

/// Verified commitments keyed by the issuer's version string.
///
/// Read-mostly; a configuration change is a [`CommitmentCache::clear`]
/// followed by re-verification, never an in-place update.
#[derive(Debug, Default)]
pub struct CommitmentCache {
    entries: HashMap<String, Commitment>,
}

impl CommitmentCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up a verified commitment.
    pub fn get(&self, version: &str) -> Option<&Commitment> {
        self.entries.get(version)
    }

    /// Caches a commitment that passed [`CommitmentData::verify`].
    pub fn insert(&mut self, version: impl Into<String>, commitment: Commitment) {
        self.entries.insert(version.into(), commitment);
    }

    /// Drops every entry. Required whenever the session configuration
    /// changes.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of cached versions.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` iff nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

//! VOPRF token lifecycle: creation, blinding, unblinding, shared-key
//! derivation and the request-binding MAC used at redemption.
//!
//! A [`Token`] is created client-side from random seed bytes. The seed is
//! mapped to a curve point `T`, blinded with a random scalar `r` and shipped
//! to the issuer as `r·T`. A successful issuance response is attached with
//! [`Token::into_signed`], which unblinds the issuer's answer into
//! `Q = k·T`; from then on the token is immutable and ready to be redeemed
//! (and consumed) by the caller's store.

use ark_ec::CurveGroup;
use ark_ff::{Field, UniformRand, Zero};
use hmac::{Hmac, Mac};
use rand::{CryptoRng, Rng};
use sha2::Sha256;
use zeroize::ZeroizeOnDrop;

use crate::config::CurveConfig;
use crate::curve::{Affine, PointError, ScalarField, sec1_encode};
use crate::h2c::{H2cError, h2_curve};

type HmacSha256 = Hmac<Sha256>;

// The exact tag bytes deployed verifiers key their MACs with.
const DERIVE_KEY_TAG: &[u8] = b"hash_derive_key";
const REQUEST_BINDING_TAG: &[u8] = b"hash_request_binding";

/// Byte length of the random token seed.
pub const SEED_LEN: usize = 32;

/// Errors from token operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    /// A signature was attached to a token that already carries one.
    #[error("token is already signed")]
    AlreadySigned,
    /// A redemption was attempted on a token that was never signed.
    #[error("token has not been signed")]
    NotSigned,
    /// The blinding factor has no inverse (zero), so the response cannot be
    /// unblinded.
    #[error("blinding factor is zero")]
    ZeroBlindingFactor,
    /// A point involved in the operation could not be encoded or validated.
    #[error(transparent)]
    Point(#[from] PointError),
    /// The stored seed could not be mapped back onto the curve.
    #[error(transparent)]
    H2c(#[from] H2cError),
}

/// The issuer's view of a signed token, attached after a successful unblind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignedToken {
    /// The issuer's answer `k·(r·T)` exactly as received.
    pub blinded: Affine,
    /// The unblinded signature `Q = k·T`.
    pub unblinded: Affine,
}

/// A client-side token. Secret material (seed and blinding factor) is wiped
/// on drop.
#[derive(Clone, ZeroizeOnDrop)]
pub struct Token {
    seed: [u8; SEED_LEN],
    factor: ScalarField,
    #[zeroize(skip)]
    blinded: Affine,
    #[zeroize(skip)]
    unblinded: Affine,
    #[zeroize(skip)]
    signed: Option<SignedToken>,
}

impl Token {
    /// Creates a fresh token: samples seed bytes, maps them to a point `T`
    /// with the configured hash-to-curve method, samples a non-zero blinding
    /// scalar `r` and computes the blinded point `r·T`.
    pub fn generate<R: Rng + CryptoRng>(
        config: &CurveConfig,
        rng: &mut R,
    ) -> Result<Self, H2cError> {
        let mut seed = [0u8; SEED_LEN];
        rng.fill_bytes(&mut seed);
        let unblinded = h2_curve(&seed, config)?;
        let factor = loop {
            let candidate = ScalarField::rand(rng);
            if !candidate.is_zero() {
                break candidate;
            }
        };
        let blinded = (unblinded * factor).into_affine();
        Ok(Token {
            seed,
            factor,
            blinded,
            unblinded,
            signed: None,
        })
    }

    /// Rebuilds a signed token from its stored parts, recomputing and
    /// re-validating everything derivable: `T` from the seed, the blinded
    /// point from `r·T`, and the unblinded signature from the stored issuer
    /// answer.
    pub fn from_stored(
        seed: [u8; SEED_LEN],
        factor: ScalarField,
        signed_blinded: Affine,
        config: &CurveConfig,
    ) -> Result<Self, TokenError> {
        let unblinded = h2_curve(&seed, config)?;
        let token = Token {
            seed,
            factor,
            blinded: (unblinded * factor).into_affine(),
            unblinded,
            signed: None,
        };
        token.into_signed(signed_blinded)
    }

    /// The random seed this token was created from.
    pub fn seed(&self) -> &[u8; SEED_LEN] {
        &self.seed
    }

    /// The blinding factor. Needed by the external store; treat as secret.
    pub fn blinding_factor(&self) -> &ScalarField {
        &self.factor
    }

    /// The blinded point `r·T` sent to the issuer.
    pub fn blinded_point(&self) -> &Affine {
        &self.blinded
    }

    /// The unblinded point `T = h2Curve(seed)`.
    pub fn unblinded_point(&self) -> &Affine {
        &self.unblinded
    }

    /// The attached issuer signature, if any.
    pub fn signed(&self) -> Option<&SignedToken> {
        self.signed.as_ref()
    }

    /// Attaches an issuer response, unblinding it into `Q = k·T`. Consumes
    /// the token; a token carrying a signature is immutable.
    pub fn into_signed(mut self, signed_blinded: Affine) -> Result<Self, TokenError> {
        if self.signed.is_some() {
            return Err(TokenError::AlreadySigned);
        }
        let unblinded = unblind_point(&self.factor, &signed_blinded)?;
        self.signed = Some(SignedToken {
            blinded: signed_blinded,
            unblinded,
        });
        Ok(self)
    }

    /// Computes the redemption MAC binding this token to `host` and `path`.
    pub fn redemption_binding(&self, host: &[u8], path: &[u8]) -> Result<[u8; 32], TokenError> {
        let signed = self.signed.as_ref().ok_or(TokenError::NotSigned)?;
        let key = derive_key(&signed.unblinded, &self.seed)?;
        Ok(request_binding(&key, host, path))
    }
}

impl std::fmt::Debug for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Token")
            .field("blinded", &self.blinded.to_string())
            .field("signed", &self.signed.is_some())
            .finish_non_exhaustive()
    }
}

/// Removes a blinding factor: computes `factor⁻¹ · point`.
pub fn unblind_point(factor: &ScalarField, point: &Affine) -> Result<Affine, TokenError> {
    let inverse = factor.inverse().ok_or(TokenError::ZeroBlindingFactor)?;
    Ok((*point * inverse).into_affine())
}

/// Derives the shared redemption key: `HMAC-SHA256(key = "hash_derive_key",
/// msg = seed ‖ SEC1-uncompressed(Q))`.
///
/// `Q` must be a validated curve point; the identity is rejected rather than
/// silently MACed.
pub fn derive_key(q: &Affine, seed: &[u8]) -> Result<[u8; 32], PointError> {
    let encoded = sec1_encode(q, false)?;
    let mut mac = HmacSha256::new_from_slice(DERIVE_KEY_TAG)
        .expect("HMAC accepts keys of any length");
    mac.update(seed);
    mac.update(&encoded);
    Ok(mac.finalize().into_bytes().into())
}

/// Computes the request-binding MAC `HMAC-SHA256(key, "hash_request_binding"
/// ‖ host ‖ path)`, tying a redemption to one origin and request.
pub fn request_binding(key: &[u8], host: &[u8], path: &[u8]) -> [u8; 32] {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts keys of any length");
    mac.update(REQUEST_BINDING_TAG);
    mac.update(host);
    mac.update(path);
    mac.finalize().into_bytes().into()
}

/// An issuer signing key. Held client-side only in tests; the commitment
/// `H = k·G` is what clients normally see.
#[derive(ZeroizeOnDrop)]
pub struct IssuerKey {
    k: ScalarField,
}

impl IssuerKey {
    /// Wraps an existing secret scalar.
    pub fn new(k: ScalarField) -> Self {
        IssuerKey { k }
    }

    /// Samples a fresh non-zero key.
    pub fn random<R: Rng + CryptoRng>(rng: &mut R) -> Self {
        let k = loop {
            let candidate = ScalarField::rand(rng);
            if !candidate.is_zero() {
                break candidate;
            }
        };
        IssuerKey { k }
    }

    /// The secret scalar.
    pub fn secret(&self) -> &ScalarField {
        &self.k
    }

    /// The public commitment pair `(G, H = k·G)` over the given base point.
    pub fn commitment(&self, g: &Affine) -> (Affine, Affine) {
        (*g, (*g * self.k).into_affine())
    }

    /// Evaluates the PRF on one blinded point: `k·P`.
    pub fn evaluate(&self, point: &Affine) -> Affine {
        (*point * self.k).into_affine()
    }

    /// Evaluates a whole batch.
    pub fn evaluate_batch(&self, points: &[Affine]) -> Vec<Affine> {
        points.iter().map(|p| self.evaluate(p)).collect()
    }
}

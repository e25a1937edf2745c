//! RSA-PSS blind signatures (the `blind` / `blind_sign` / `finalize` flow of
//! draft-irtf-cfrg-rsa-blind-signatures).
//!
//! The client PSS-encodes its message, multiplies it by `rᵉ` for a random
//! blind `r`, and sends the product. The issuer exponentiates with `d`
//! without ever seeing the message; the client strips the blind with `r⁻¹`
//! and obtains a plain RSA-PSS signature. [`finalize`] always verifies the
//! result before returning it — a garbage response from an issuer is caught
//! here, not trusted blindly.

pub mod pss;

use num_bigint::{BigInt, BigUint};
use num_integer::Integer;
use num_traits::{One, Zero};
use rand::{CryptoRng, Rng};
use zeroize::Zeroize;

pub use pss::PssHash;

/// Failures of the blind-signature flow. Distinguishable so callers can
/// decide between retrying, aborting and alerting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum BlindRsaError {
    /// An input byte string does not have the modulus length.
    #[error("unexpected input size")]
    UnexpectedInputSize,
    /// A decoded integer is not reduced modulo `n`.
    #[error("invalid message length")]
    InvalidMessageLength,
    /// The final signature does not verify under RSA-PSS.
    #[error("invalid signature")]
    InvalidSignature,
    /// The sampled blind is not invertible modulo `n`.
    #[error("invalid blind")]
    InvalidBlind,
    /// PSS encoding is impossible for these parameters.
    #[error("encoding error")]
    EncodingError,
    /// The key parameters are nonsensical.
    #[error("invalid key parameters")]
    InvalidKey,
}

/// An RSA public key `(n, e)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RsaPublicKey {
    n: BigUint,
    e: BigUint,
}

impl RsaPublicKey {
    /// Wraps the modulus and public exponent.
    pub fn new(n: BigUint, e: BigUint) -> Result<Self, BlindRsaError> {
        if n <= BigUint::one() || e <= BigUint::one() {
            return Err(BlindRsaError::InvalidKey);
        }
        Ok(RsaPublicKey { n, e })
    }

    /// Builds a key from big-endian byte strings.
    pub fn from_be_bytes(n: &[u8], e: &[u8]) -> Result<Self, BlindRsaError> {
        Self::new(BigUint::from_bytes_be(n), BigUint::from_bytes_be(e))
    }

    /// The modulus size in bytes.
    pub fn modulus_len(&self) -> usize {
        ((self.n.bits() + 7) / 8) as usize
    }

    /// The modulus size in bits.
    pub fn modulus_bits(&self) -> usize {
        self.n.bits() as usize
    }
}

/// An RSA secret key `(n, d)`. Held by issuers; this engine carries it for
/// the signing half of the protocol and its tests.
#[derive(Debug, Clone)]
pub struct RsaSecretKey {
    public: RsaPublicKey,
    d: BigUint,
}

impl RsaSecretKey {
    /// Wraps the public half and the secret exponent.
    pub fn new(public: RsaPublicKey, d: BigUint) -> Result<Self, BlindRsaError> {
        if d.is_zero() {
            return Err(BlindRsaError::InvalidKey);
        }
        Ok(RsaSecretKey { public, d })
    }

    /// The corresponding public key.
    pub fn public(&self) -> &RsaPublicKey {
        &self.public
    }
}

/// PSS parameters for one token type: the hash and the salt length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PssParams {
    /// Hash used for message digest and MGF1.
    pub hash: PssHash,
    /// Salt length in bytes.
    pub salt_len: usize,
}

/// Client-side state between [`blind`] and [`finalize`]: the blinded message
/// to ship and the blind inverse to strip later. Single-use; consumed by
/// [`finalize`] whether it succeeds or fails.
#[derive(Debug)]
pub struct RsaBlindContext {
    blinded_msg: Vec<u8>,
    blind_inv: Vec<u8>,
}

impl RsaBlindContext {
    /// The blinded message, a fixed-length big-endian string of the modulus
    /// size.
    pub fn blinded_msg(&self) -> &[u8] {
        &self.blinded_msg
    }
}

impl Drop for RsaBlindContext {
    fn drop(&mut self) {
        self.blind_inv.zeroize();
    }
}

/// Blinds `msg` under `pk`: PSS-encodes it, multiplies by `rᵉ mod n` for a
/// fresh uniform blind `r`, and returns the shipping bytes plus the inverse
/// needed to finalize.
pub fn blind<R: Rng + CryptoRng>(
    pk: &RsaPublicKey,
    msg: &[u8],
    params: &PssParams,
    rng: &mut R,
) -> Result<RsaBlindContext, BlindRsaError> {
    let mut salt = vec![0u8; params.salt_len];
    rng.fill_bytes(&mut salt);

    let k_len = pk.modulus_len();
    let mut r_bytes = vec![0u8; k_len];
    loop {
        // r uniform in [1, n); retry when the draw is out of range or not
        // invertible.
        rng.fill_bytes(&mut r_bytes);
        let r = BigUint::from_bytes_be(&r_bytes);
        if r.is_zero() || r >= pk.n {
            continue;
        }
        match blind_with(pk, msg, &salt, &r, params) {
            Err(BlindRsaError::InvalidBlind) => continue,
            other => return other,
        }
    }
}

// Deterministic core of `blind`, split out so known-answer tests can pin the
// salt and the blind.
fn blind_with(
    pk: &RsaPublicKey,
    msg: &[u8],
    salt: &[u8],
    r: &BigUint,
    params: &PssParams,
) -> Result<RsaBlindContext, BlindRsaError> {
    let k_len = pk.modulus_len();
    let em = pss::emsa_pss_encode(msg, pk.modulus_bits() - 1, salt, params.hash)?;
    let m = BigUint::from_bytes_be(&em);

    let r_inv = inverse_mod(r, &pk.n).ok_or(BlindRsaError::InvalidBlind)?;
    let x = r.modpow(&pk.e, &pk.n);
    let z = (&m * &x) % &pk.n;

    Ok(RsaBlindContext {
        blinded_msg: i2osp(&z, k_len)?,
        blind_inv: i2osp(&r_inv, k_len)?,
    })
}

/// Issuer side: raises the blinded message to the secret exponent. Rejects
/// inputs of the wrong length and values not reduced modulo `n`.
pub fn blind_sign(sk: &RsaSecretKey, blinded_msg: &[u8]) -> Result<Vec<u8>, BlindRsaError> {
    let k_len = sk.public.modulus_len();
    if blinded_msg.len() != k_len {
        return Err(BlindRsaError::UnexpectedInputSize);
    }
    let m = BigUint::from_bytes_be(blinded_msg);
    if m >= sk.public.n {
        return Err(BlindRsaError::InvalidMessageLength);
    }
    let s = m.modpow(&sk.d, &sk.public.n);
    i2osp(&s, k_len)
}

/// Strips the blind from the issuer's response and verifies the resulting
/// signature over `msg` under standard RSA-PSS before returning it.
pub fn finalize(
    pk: &RsaPublicKey,
    msg: &[u8],
    context: RsaBlindContext,
    blind_sig: &[u8],
    params: &PssParams,
) -> Result<Vec<u8>, BlindRsaError> {
    let k_len = pk.modulus_len();
    if blind_sig.len() != k_len || context.blind_inv.len() != k_len {
        return Err(BlindRsaError::UnexpectedInputSize);
    }
    let z = BigUint::from_bytes_be(blind_sig);
    let r_inv = BigUint::from_bytes_be(&context.blind_inv);
    let s = (&z * &r_inv) % &pk.n;
    let sig = i2osp(&s, k_len)?;
    verify(pk, msg, &sig, params)?;
    Ok(sig)
}

/// Standard RSA-PSS verification.
pub fn verify(
    pk: &RsaPublicKey,
    msg: &[u8],
    sig: &[u8],
    params: &PssParams,
) -> Result<(), BlindRsaError> {
    if sig.len() != pk.modulus_len() {
        return Err(BlindRsaError::InvalidSignature);
    }
    let s = BigUint::from_bytes_be(sig);
    if s >= pk.n {
        return Err(BlindRsaError::InvalidSignature);
    }
    let m = s.modpow(&pk.e, &pk.n);
    let em_bits = pk.modulus_bits() - 1;
    let em_len = em_bits.div_ceil(8);
    let em = i2osp(&m, em_len).map_err(|_| BlindRsaError::InvalidSignature)?;
    pss::emsa_pss_verify(msg, &em, em_bits, params.salt_len, params.hash)
        .map_err(|_| BlindRsaError::InvalidSignature)
}

// Fixed-length big-endian encoding (RFC 8017 I2OSP).
fn i2osp(v: &BigUint, len: usize) -> Result<Vec<u8>, BlindRsaError> {
    let bytes = v.to_bytes_be();
    if bytes.len() > len {
        return Err(BlindRsaError::EncodingError);
    }
    let mut out = vec![0u8; len];
    out[len - bytes.len()..].copy_from_slice(&bytes);
    Ok(out)
}

// Modular inverse via the extended Euclidean algorithm; `None` when
// gcd(a, n) != 1.
fn inverse_mod(a: &BigUint, n: &BigUint) -> Option<BigUint> {
    let a = BigInt::from(a.clone());
    let n = BigInt::from(n.clone());
    let ext = a.extended_gcd(&n);
    if !ext.gcd.is_one() {
        return None;
    }
    ext.x.mod_floor(&n).to_biguint()
}

//! Batched discrete-log-equality (Chaum-Pedersen) proofs.
//!
//! An issuer holding a secret `k` publishes the commitment pair `(G, H = k·G)`
//! and, for a batch of blinded points `Mᵢ`, returns signed points `Zᵢ = k·Mᵢ`
//! together with a proof that the same `k` links every pair. The batch is
//! compressed into one composite pair `(M, Z)` using pseudorandom weights
//! `cᵢ` derived from a seed that commits to the whole transcript, so a single
//! Chaum-Pedersen proof covers all tokens.
//!
//! Verification is the soundness-critical routine of this crate: accepting an
//! invalid proof would let an issuer segregate users or an attacker mint
//! tokens. Every decode or length problem is a verification failure; nothing
//! is skipped.

use ark_ec::{AffineRepr, CurveGroup};
use ark_ff::{PrimeField, UniformRand, Zero};
use hkdf::Hkdf;
use num_bigint::BigUint;
use rand::{CryptoRng, Rng};
use sha2::{Digest, Sha256};
use sha3::Shake256;
use sha3::digest::XofReader;

use crate::curve::{Affine, PointError, Projective, ScalarField, sec1_encode};
use crate::token::IssuerKey;

/// Fixed info tag for the HKDF weight derivation.
const DLEQ_HKDF_INFO: &[u8] = b"DLEQ_PROOF";

/// Bound on rejection-sampling attempts per weight. For P-256 a single
/// rejection already has probability ≈ 2⁻³²; hitting this bound means the
/// PRNG is broken.
const MAX_SAMPLE_ATTEMPTS: u32 = 128;

/// A batched DLEQ proof: the Fiat-Shamir challenge `c` and response `r`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchProof {
    /// The challenge scalar `C`.
    pub c: ScalarField,
    /// The response scalar `R`.
    pub r: ScalarField,
}

/// The pseudorandom generator used to derive batch weights. A closed set of
/// variants, selected once per issuance response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScalarPrng {
    /// SHAKE-256 extendable-output squeeze.
    #[default]
    Shake,
    /// HKDF-SHA256 expand with the fixed `DLEQ_PROOF` info tag.
    Hkdf,
}

impl ScalarPrng {
    /// Resolves a wire PRNG name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "shake" => Some(ScalarPrng::Shake),
            "hkdf" => Some(ScalarPrng::Hkdf),
            _ => None,
        }
    }

    /// The wire name of this variant.
    pub fn name(&self) -> &'static str {
        match self {
            ScalarPrng::Shake => "shake",
            ScalarPrng::Hkdf => "hkdf",
        }
    }
}

/// Errors from proof generation or verification. `Invalid` is the
/// cryptographic failure; everything else is a malformed-input failure.
/// Both directions fail closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DleqError {
    /// The blinded and signed batches have different lengths.
    #[error("number of blinded points does not match number of signed points")]
    LengthMismatch,
    /// The batch is empty.
    #[error("batch proof over an empty batch")]
    EmptyBatch,
    /// A point involved in the proof is malformed (identity, off-curve).
    #[error(transparent)]
    Point(#[from] PointError),
    /// Weight sampling hit its rejection bound.
    #[error("PRNG weight sampling exceeded {MAX_SAMPLE_ATTEMPTS} attempts")]
    PrngExhausted,
    /// The recomputed challenge does not match the proof.
    #[error("batch proof does not verify")]
    Invalid,
}

enum PrngState {
    Shake(sha3::Shake256Reader),
    Hkdf { seed: [u8; 32], counter: u32 },
}

/// Streams batch weights from the seeded PRNG, right-masked to the group bit
/// length and rejection-sampled against the group order to avoid bias.
struct WeightSampler {
    state: PrngState,
}

impl WeightSampler {
    fn new(prng: ScalarPrng, seed: &[u8; 32]) -> Self {
        let state = match prng {
            ScalarPrng::Shake => {
                use sha3::digest::{ExtendableOutput, Update};
                let mut hasher = Shake256::default();
                hasher.update(seed);
                PrngState::Shake(hasher.finalize_xof())
            }
            ScalarPrng::Hkdf => PrngState::Hkdf {
                seed: *seed,
                counter: 0,
            },
        };
        WeightSampler { state }
    }

    fn next_weight(&mut self) -> Result<ScalarField, DleqError> {
        for _ in 0..MAX_SAMPLE_ATTEMPTS {
            let mut block = [0u8; 32];
            match &mut self.state {
                PrngState::Shake(reader) => reader.read(&mut block),
                PrngState::Hkdf { seed, counter } => {
                    let hk = Hkdf::<Sha256>::new(Some(&counter.to_be_bytes()), seed);
                    hk.expand(DLEQ_HKDF_INFO, &mut block)
                        .expect("32 bytes is a valid HKDF-SHA256 output length");
                    *counter += 1;
                }
            }
            mask_to_group_bits(&mut block);
            let v = BigUint::from_bytes_be(&block);
            if v < ScalarField::MODULUS.into() {
                return Ok(ScalarField::from(v));
            }
        }
        Err(DleqError::PrngExhausted)
    }
}

// Clears the excess top bits so the sampled block spans exactly the group's
// bit length. A no-op for P-256 but kept curve-generic.
fn mask_to_group_bits(block: &mut [u8; 32]) {
    let excess = block.len() * 8 - ScalarField::MODULUS_BIT_SIZE as usize;
    if excess > 0 {
        block[0] &= 0xff >> excess;
    }
}

/// The PRNG seed committing to the whole transcript:
/// `SHA-256(unc(G) ‖ unc(H) ‖ unc(M₀) ‖ unc(Z₀) ‖ …)`.
fn composite_seed(
    g: &Affine,
    h: &Affine,
    blinded: &[Affine],
    signed: &[Affine],
) -> Result<[u8; 32], PointError> {
    let mut hasher = Sha256::new();
    hasher.update(sec1_encode(g, false)?);
    hasher.update(sec1_encode(h, false)?);
    for (m, z) in blinded.iter().zip(signed.iter()) {
        hasher.update(sec1_encode(m, false)?);
        hasher.update(sec1_encode(z, false)?);
    }
    Ok(hasher.finalize().into())
}

/// The composite pair `(M, Z) = (Σ cᵢ·Mᵢ, Σ cᵢ·Zᵢ)`, accumulated in Jacobian
/// form.
fn recompute_composites(
    blinded: &[Affine],
    signed: &[Affine],
    sampler: &mut WeightSampler,
) -> Result<(Affine, Affine), DleqError> {
    let mut m = Projective::zero();
    let mut z = Projective::zero();
    for (bp, sp) in blinded.iter().zip(signed.iter()) {
        let c = sampler.next_weight()?;
        m += *bp * c;
        z += *sp * c;
    }
    Ok((m.into_affine(), z.into_affine()))
}

/// The Fiat-Shamir challenge `SHA-256(unc(G) ‖ unc(H) ‖ unc(M) ‖ unc(Z) ‖
/// unc(A) ‖ unc(B))` reduced into the scalar field.
fn challenge_scalar(
    g: &Affine,
    h: &Affine,
    m: &Affine,
    z: &Affine,
    a: &Affine,
    b: &Affine,
) -> Result<ScalarField, PointError> {
    let mut hasher = Sha256::new();
    for p in [g, h, m, z, a, b] {
        hasher.update(sec1_encode(p, false)?);
    }
    Ok(ScalarField::from_be_bytes_mod_order(&hasher.finalize()))
}

fn check_batch(
    g: &Affine,
    h: &Affine,
    blinded: &[Affine],
    signed: &[Affine],
) -> Result<(), DleqError> {
    if blinded.len() != signed.len() {
        return Err(DleqError::LengthMismatch);
    }
    if blinded.is_empty() {
        return Err(DleqError::EmptyBatch);
    }
    // All points need to be valid non-identity group elements.
    for p in [g, h].into_iter().chain(blinded).chain(signed) {
        if !p.is_on_curve() || !p.is_in_correct_subgroup_assuming_on_curve() {
            return Err(DleqError::Point(PointError::NotOnCurve));
        }
        if p.is_zero() {
            return Err(DleqError::Point(PointError::Identity));
        }
    }
    Ok(())
}

/// Issuer side: proves `Zᵢ = k·Mᵢ` for every pair and `H = k·G`, with one
/// batched proof.
pub fn prove_batch<R: Rng + CryptoRng>(
    key: &IssuerKey,
    blinded: &[Affine],
    signed: &[Affine],
    g: &Affine,
    prng: ScalarPrng,
    rng: &mut R,
) -> Result<BatchProof, DleqError> {
    let h = (*g * *key.secret()).into_affine();
    check_batch(g, &h, blinded, signed)?;

    let nonce = loop {
        let candidate = ScalarField::rand(rng);
        if !candidate.is_zero() {
            break candidate;
        }
    };

    let seed = composite_seed(g, &h, blinded, signed)?;
    let mut sampler = WeightSampler::new(prng, &seed);
    let (m, z) = recompute_composites(blinded, signed, &mut sampler)?;

    let a = (*g * nonce).into_affine();
    let b = (m * nonce).into_affine();
    let c = challenge_scalar(g, &h, &m, &z, &a, &b)?;
    let r = nonce - c * *key.secret();
    Ok(BatchProof { c, r })
}

/// Client side: verifies a batched proof against the commitment pair
/// `(G, H)`.
///
/// Recomputes `A = C·H + R·G` and `B = C·Z + R·M` over the pseudorandom
/// composites and accepts iff the recomputed challenge equals `C` exactly.
/// Pure function of its inputs; any malformed point, length mismatch or
/// challenge difference is a failure.
pub fn verify_batch(
    proof: &BatchProof,
    blinded: &[Affine],
    signed: &[Affine],
    g: &Affine,
    h: &Affine,
    prng: ScalarPrng,
) -> Result<(), DleqError> {
    check_batch(g, h, blinded, signed)?;

    let seed = composite_seed(g, h, blinded, signed)?;
    let mut sampler = WeightSampler::new(prng, &seed);
    let (m, z) = recompute_composites(blinded, signed, &mut sampler)?;

    let a = (*h * proof.c + *g * proof.r).into_affine();
    let b = (z * proof.c + m * proof.r).into_affine();

    let expected = challenge_scalar(g, h, &m, &z, &a, &b)?;
    if expected == proof.c {
        Ok(())
    } else {
        Err(DleqError::Invalid)
    }
}

//! Field and curve-point primitives for the P-256 token protocol.
//!
//! This module owns the pieces every other component builds on: constant-time
//! selection over field elements, the Euler-criterion squareness test, the
//! `p ≡ 3 (mod 4)` square root, SEC1 point encoding with fully validating
//! decoding, and the flat [`StorablePoint`] value type that is the only point
//! representation ever persisted.
//!
//! Arithmetic happens on the arkworks types; points are accumulated in
//! projective (Jacobian) form via [`Projective`] and converted to affine only
//! at boundaries.

use ark_ec::AffineRepr;
use ark_ec::short_weierstrass::SWCurveConfig;
use ark_ff::{BigInt, BigInteger, Field, PrimeField};
use ark_serialize::CanonicalSerialize;
use num_bigint::BigUint;
use serde::{Deserialize, Serialize};
use subtle::{Choice, ConstantTimeEq, ConstantTimeGreater};

/// The curve group in projective coordinates.
pub type Projective = ark_secp256r1::Projective;
/// An affine curve point.
pub type Affine = ark_secp256r1::Affine;
/// The scalar field (integers modulo the group order).
pub type ScalarField = ark_secp256r1::Fr;
/// The base field of the curve.
pub type BaseField = ark_secp256r1::Fq;
/// The arkworks curve parameters (Weierstrass coefficients, generator).
pub type CurveParams = ark_secp256r1::Config;

/// Byte length of a base-field element or scalar.
pub const FIELD_BYTES: usize = 32;

const TAG_UNCOMPRESSED: u8 = 0x04;
const TAG_COMPRESSED_EVEN: u8 = 0x02;
const TAG_COMPRESSED_ODD: u8 = 0x03;

/// Errors from decoding or encoding curve points. Always recoverable by
/// discarding the offending message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PointError {
    /// The leading SEC1 tag byte is not 0x02/0x03/0x04.
    #[error("point encoding has invalid tag {0:#04x}")]
    InvalidTag(u8),
    /// The encoding does not have the length its tag demands.
    #[error("point encoding has invalid length {0}")]
    InvalidLength(usize),
    /// A coordinate is not a canonically reduced field element.
    #[error("coordinate is not a canonical field element")]
    InvalidFieldElement,
    /// The coordinates do not satisfy the curve equation.
    #[error("point is not on the curve")]
    NotOnCurve,
    /// The point is the identity, which has no SEC1 encoding.
    #[error("point is the identity")]
    Identity,
}

/// Errors from decoding scalars.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ScalarError {
    /// The encoding is not exactly [`FIELD_BYTES`] long.
    #[error("scalar encoding has invalid length {0}")]
    InvalidLength(usize),
    /// The value is not reduced into `[0, order)`.
    #[error("scalar is not reduced modulo the group order")]
    NotReduced,
}

// p - 2 and (p + 1) / 4 for the P-256 base field. Exponentiating by these
// gives a branch-free inverse and square root (p ≡ 3 mod 4).
const MODULUS_MINUS_2: BigInt<4> =
    BigInt!("115792089210356248762697446949407573530086143415290314195533631308867097853949");
const SQRT_EXPONENT: BigInt<4> =
    BigInt!("28948022302589062190674361737351893382521535853822578548883407827216774463488");

/// Selects `lhs` if `choice` is set, `rhs` otherwise, without branching on
/// `choice`.
pub fn ct_select<F: PrimeField>(lhs: F, rhs: F, choice: Choice) -> F {
    // Ideally the ark ecosystem would support subtle directly; masked field
    // arithmetic is the best we can do.
    let choice = F::from(choice.unwrap_u8());
    rhs + (lhs - rhs) * choice
}

/// Constant-time test for zero.
pub fn ct_is_zero<F: PrimeField>(v: F) -> Choice {
    // Ideally the ark ecosystem would support subtle, so this is currently
    // the best thing we can do. Serialize the elements and then compare the
    // byte representation.
    let mut lhs_v = Vec::with_capacity(v.uncompressed_size());
    let rhs_v = vec![0; v.uncompressed_size()];
    v.serialize_uncompressed(&mut lhs_v)
        .expect("can serialize field element into a vec");
    lhs_v.ct_eq(&rhs_v)
}

/// Euler-criterion squareness test: `x^((p-1)/2)` is 0 or 1 exactly for the
/// squares.
pub fn ct_is_square<F: PrimeField>(x: F) -> Choice {
    let x = x.pow(F::MODULUS_MINUS_ONE_DIV_TWO);
    let mut x_v = Vec::with_capacity(x.uncompressed_size());
    let mut one_v = Vec::with_capacity(x.uncompressed_size());
    let zero_v = vec![0; x.uncompressed_size()];
    x.serialize_uncompressed(&mut x_v)
        .expect("can serialize field element into a vec");
    F::one()
        .serialize_uncompressed(&mut one_v)
        .expect("can serialize field element into a vec");
    let is_zero = x_v.ct_eq(&zero_v);
    let is_one = x_v.ct_eq(&one_v);
    is_zero ^ is_one
}

/// Constant-time lexicographic greater-than on big-endian byte strings of
/// equal length.
pub fn ct_gt_be(lhs: &[u8], rhs: &[u8]) -> Choice {
    debug_assert_eq!(lhs.len(), rhs.len());
    let mut gt = Choice::from(0u8);
    let mut eq = Choice::from(1u8);
    for (l, r) in lhs.iter().zip(rhs.iter()) {
        gt |= eq & l.ct_gt(r);
        eq &= l.ct_eq(r);
    }
    gt
}

/// Computes the inverse of a base-field element by exponentiation, returning
/// zero for zero.
pub fn inv0(x: BaseField) -> BaseField {
    x.pow(MODULUS_MINUS_2)
}

/// The square-root candidate `x^((p+1)/4)`. This is a root exactly when `x`
/// is a square; callers must check `y² == x` themselves when `x` is
/// untrusted.
pub fn sqrt_candidate(x: &BaseField) -> BaseField {
    x.pow(SQRT_EXPONENT)
}

/// Fixed-length big-endian encoding of a base-field element.
pub fn base_field_to_bytes(v: &BaseField) -> [u8; FIELD_BYTES] {
    v.into_bigint()
        .to_bytes_be()
        .try_into()
        .expect("a 256-bit BigInt serializes to 32 bytes")
}

/// Strict decoding of a base-field element: wrong length or a value at or
/// above the modulus is rejected, never reduced.
pub fn base_field_from_bytes(bytes: &[u8]) -> Option<BaseField> {
    if bytes.len() != FIELD_BYTES {
        return None;
    }
    let v = BigUint::from_bytes_be(bytes);
    if v >= BaseField::MODULUS.into() {
        return None;
    }
    Some(BaseField::from(v))
}

/// Fixed-length big-endian encoding of a scalar.
pub fn encode_scalar(v: &ScalarField) -> [u8; FIELD_BYTES] {
    v.into_bigint()
        .to_bytes_be()
        .try_into()
        .expect("a 256-bit BigInt serializes to 32 bytes")
}

/// Strict decoding of a scalar: rejects wrong lengths and values not reduced
/// into `[0, order)`.
pub fn decode_scalar(bytes: &[u8]) -> Result<ScalarField, ScalarError> {
    if bytes.len() != FIELD_BYTES {
        return Err(ScalarError::InvalidLength(bytes.len()));
    }
    let v = BigUint::from_bytes_be(bytes);
    if v >= ScalarField::MODULUS.into() {
        return Err(ScalarError::NotReduced);
    }
    Ok(ScalarField::from(v))
}

/// Encodes a point in SEC1 form, compressed (tag ‖ x) or uncompressed
/// (tag ‖ x ‖ y). The identity has no encoding and is rejected.
pub fn sec1_encode(point: &Affine, compressed: bool) -> Result<Vec<u8>, PointError> {
    let (x, y) = point.xy().ok_or(PointError::Identity)?;
    let x_bytes = base_field_to_bytes(&x);
    if compressed {
        let tag = if y.into_bigint().is_odd() {
            TAG_COMPRESSED_ODD
        } else {
            TAG_COMPRESSED_EVEN
        };
        let mut out = Vec::with_capacity(1 + FIELD_BYTES);
        out.push(tag);
        out.extend_from_slice(&x_bytes);
        Ok(out)
    } else {
        let mut out = Vec::with_capacity(1 + 2 * FIELD_BYTES);
        out.push(TAG_UNCOMPRESSED);
        out.extend_from_slice(&x_bytes);
        out.extend_from_slice(&base_field_to_bytes(&y));
        Ok(out)
    }
}

/// Decodes an SEC1-encoded point from untrusted bytes.
///
/// Every path validates: tags and lengths are checked, coordinates must be
/// canonical field elements, the result must satisfy the curve equation and
/// lie in the prime-order subgroup. There is no way to obtain an unchecked
/// point from wire data.
pub fn sec1_decode(bytes: &[u8]) -> Result<Affine, PointError> {
    let tag = *bytes.first().ok_or(PointError::InvalidLength(0))?;
    match tag {
        TAG_COMPRESSED_EVEN | TAG_COMPRESSED_ODD => {
            if bytes.len() != 1 + FIELD_BYTES {
                return Err(PointError::InvalidLength(bytes.len()));
            }
            let x =
                base_field_from_bytes(&bytes[1..]).ok_or(PointError::InvalidFieldElement)?;
            // y² = x³ + Ax + B
            let rhs = (x.square() + CurveParams::COEFF_A) * x + CurveParams::COEFF_B;
            let mut y = sqrt_candidate(&rhs);
            if y.square() != rhs {
                return Err(PointError::NotOnCurve);
            }
            let want_odd = tag == TAG_COMPRESSED_ODD;
            if y.into_bigint().is_odd() != want_odd {
                y = -y;
            }
            finish_decode(x, y)
        }
        TAG_UNCOMPRESSED => {
            if bytes.len() != 1 + 2 * FIELD_BYTES {
                return Err(PointError::InvalidLength(bytes.len()));
            }
            let x = base_field_from_bytes(&bytes[1..1 + FIELD_BYTES])
                .ok_or(PointError::InvalidFieldElement)?;
            let y = base_field_from_bytes(&bytes[1 + FIELD_BYTES..])
                .ok_or(PointError::InvalidFieldElement)?;
            finish_decode(x, y)
        }
        other => Err(PointError::InvalidTag(other)),
    }
}

fn finish_decode(x: BaseField, y: BaseField) -> Result<Affine, PointError> {
    let point = Affine::new_unchecked(x, y);
    if !point.is_on_curve() || !point.is_in_correct_subgroup_assuming_on_curve() {
        return Err(PointError::NotOnCurve);
    }
    if point.is_zero() {
        return Err(PointError::Identity);
    }
    Ok(point)
}

/// A flat, serializable point value: fixed-length big-endian coordinates and
/// nothing else. This is the only representation that may be persisted;
/// arithmetic happens on [`Affine`]/[`Projective`] after an explicit,
/// validating conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorablePoint {
    #[serde(with = "b64bytes")]
    x: [u8; FIELD_BYTES],
    #[serde(with = "b64bytes")]
    y: [u8; FIELD_BYTES],
}

impl StorablePoint {
    /// Flattens an affine point. The identity is rejected.
    pub fn from_affine(point: &Affine) -> Result<Self, PointError> {
        let (x, y) = point.xy().ok_or(PointError::Identity)?;
        Ok(StorablePoint {
            x: base_field_to_bytes(&x),
            y: base_field_to_bytes(&y),
        })
    }

    /// Rebuilds the in-memory point, re-validating curve membership. Stored
    /// data is not trusted more than wire data.
    pub fn to_affine(&self) -> Result<Affine, PointError> {
        let x = base_field_from_bytes(&self.x).ok_or(PointError::InvalidFieldElement)?;
        let y = base_field_from_bytes(&self.y).ok_or(PointError::InvalidFieldElement)?;
        finish_decode(x, y)
    }
}

mod b64bytes {
    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer, de};

    pub fn serialize<S: Serializer>(bytes: &[u8; 32], ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<[u8; 32], D::Error> {
        let s = String::deserialize(de)?;
        let bytes = STANDARD
            .decode(&s)
            .map_err(|_| de::Error::custom("invalid base64"))?;
        bytes
            .try_into()
            .map_err(|_| de::Error::custom("coordinate must be 32 bytes"))
    }
}

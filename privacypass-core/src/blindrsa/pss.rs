//! EMSA-PSS encoding and verification (RFC 8017 §9.1) with MGF1 mask
//! generation, the primitive under the blind-signature flow. Matches the
//! standard bit-for-bit, including the fixed `0xbc` trailer.

use sha2::{Digest, Sha256, Sha384, Sha512};

use super::BlindRsaError;

/// The hash underlying the PSS encoding and MGF1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PssHash {
    /// SHA-256, 32-byte output.
    Sha256,
    /// SHA-384, 48-byte output.
    Sha384,
    /// SHA-512, 64-byte output.
    Sha512,
}

impl PssHash {
    /// Digest length in bytes.
    pub fn output_len(&self) -> usize {
        match self {
            PssHash::Sha256 => 32,
            PssHash::Sha384 => 48,
            PssHash::Sha512 => 64,
        }
    }

    /// Hashes the concatenation of `parts`.
    pub fn digest(&self, parts: &[&[u8]]) -> Vec<u8> {
        match self {
            PssHash::Sha256 => {
                let mut h = Sha256::new();
                for p in parts {
                    h.update(p);
                }
                h.finalize().to_vec()
            }
            PssHash::Sha384 => {
                let mut h = Sha384::new();
                for p in parts {
                    h.update(p);
                }
                h.finalize().to_vec()
            }
            PssHash::Sha512 => {
                let mut h = Sha512::new();
                for p in parts {
                    h.update(p);
                }
                h.finalize().to_vec()
            }
        }
    }
}

/// MGF1 (RFC 8017 B.2.1): iterated hash of `seed ‖ BE32(counter)`,
/// concatenated and truncated to `mask_len`.
pub fn mgf1(hash: PssHash, seed: &[u8], mask_len: usize) -> Vec<u8> {
    let h_len = hash.output_len();
    let mut mask = Vec::with_capacity(mask_len.next_multiple_of(h_len));
    let blocks = mask_len.div_ceil(h_len);
    for counter in 0..blocks as u32 {
        mask.extend_from_slice(&hash.digest(&[seed, &counter.to_be_bytes()]));
    }
    mask.truncate(mask_len);
    mask
}

/// EMSA-PSS-ENCODE (RFC 8017 §9.1.1) with a caller-provided salt.
pub fn emsa_pss_encode(
    msg: &[u8],
    em_bits: usize,
    salt: &[u8],
    hash: PssHash,
) -> Result<Vec<u8>, BlindRsaError> {
    let h_len = hash.output_len();
    let s_len = salt.len();
    let em_len = em_bits.div_ceil(8);

    let m_hash = hash.digest(&[msg]);
    if em_len < h_len + s_len + 2 {
        return Err(BlindRsaError::EncodingError);
    }

    // M' = 8x00 ‖ mHash ‖ salt
    let h = hash.digest(&[&[0u8; 8], &m_hash, salt]);

    // DB = PS ‖ 0x01 ‖ salt
    let mut db = vec![0u8; em_len - h_len - 1];
    let ps_len = em_len - s_len - h_len - 2;
    db[ps_len] = 0x01;
    db[ps_len + 1..].copy_from_slice(salt);

    let db_mask = mgf1(hash, &h, em_len - h_len - 1);
    for (b, m) in db.iter_mut().zip(db_mask.iter()) {
        *b ^= m;
    }
    // clear the leftmost 8·emLen − emBits bits
    db[0] &= 0xff >> (8 * em_len - em_bits);

    let mut em = db;
    em.extend_from_slice(&h);
    em.push(0xbc);
    Ok(em)
}

/// EMSA-PSS-VERIFY (RFC 8017 §9.1.2).
pub fn emsa_pss_verify(
    msg: &[u8],
    em: &[u8],
    em_bits: usize,
    salt_len: usize,
    hash: PssHash,
) -> Result<(), BlindRsaError> {
    let h_len = hash.output_len();
    let em_len = em_bits.div_ceil(8);
    if em.len() != em_len || em_len < h_len + salt_len + 2 {
        return Err(BlindRsaError::InvalidSignature);
    }
    if em[em_len - 1] != 0xbc {
        return Err(BlindRsaError::InvalidSignature);
    }

    let (masked_db, rest) = em.split_at(em_len - h_len - 1);
    let h = &rest[..h_len];

    let excess = 8 * em_len - em_bits;
    let top_mask = if excess == 0 { 0u8 } else { 0xffu8 << (8 - excess) };
    if masked_db[0] & top_mask != 0 {
        return Err(BlindRsaError::InvalidSignature);
    }

    let db_mask = mgf1(hash, h, em_len - h_len - 1);
    let mut db: Vec<u8> = masked_db
        .iter()
        .zip(db_mask.iter())
        .map(|(a, b)| a ^ b)
        .collect();
    db[0] &= 0xff >> excess;

    let ps_len = em_len - h_len - salt_len - 2;
    if db[..ps_len].iter().any(|&b| b != 0) || db[ps_len] != 0x01 {
        return Err(BlindRsaError::InvalidSignature);
    }
    let salt = &db[db.len() - salt_len..];

    let m_hash = hash.digest(&[msg]);
    let h_prime = hash.digest(&[&[0u8; 8], &m_hash, salt]);
    if h_prime != h {
        return Err(BlindRsaError::InvalidSignature);
    }
    Ok(())
}

//! This crate implements the cryptographic core of the Privacy Pass anonymous
//! token protocol: elliptic-curve token blinding and unblinding, deterministic
//! hash-to-curve encodings, batched discrete-log-equality proofs over issuer
//! commitments, and the RSA-PSS blind-signature variant used by newer token
//! types.
//!
//! Modules include:
//! - **config**: Immutable per-session curve/hash/method configuration.
//! - **curve**: Field and point primitives, constant-time selects, SEC1 codec.
//! - **h2c**: Hash-to-curve (simplified SWU and legacy hash-and-increment).
//! - **token**: VOPRF token lifecycle, key derivation and request binding.
//! - **dleq**: Batched Chaum-Pedersen proof generation and verification.
//! - **commitment**: Issuer commitment verification and caching.
//! - **blindrsa**: RSA-PSS blind signatures (blind / blind-sign / finalize).
//!
//! Everything in here is pure, synchronous computation. Network transport,
//! persistent storage and any user-visible behavior belong to the embedding
//! layer, which talks to this engine through `Result` values only.

pub mod blindrsa;
pub mod commitment;
pub mod config;
pub mod curve;
pub mod dleq;
pub mod h2c;
pub mod token;

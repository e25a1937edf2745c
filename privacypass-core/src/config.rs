//! Per-session curve configuration.
//!
//! A [`CurveConfig`] is an immutable value constructed once (typically from
//! the issuer's `h2c-params`) and passed into every engine call. Selecting a
//! new configuration means building a new value and discarding all state
//! derived from the old one (cached commitments, in-flight tokens); there is
//! no global curve state anywhere in this crate.

use std::str::FromStr;

/// The supported elliptic curves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CurveId {
    /// NIST P-256 (secp256r1).
    P256,
}

/// The supported base-field hash functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashId {
    /// SHA-256.
    Sha256,
}

/// The supported hash-to-curve methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum H2cMethod {
    /// Legacy hash-and-increment. Deprecated, kept for interop with
    /// already-deployed issuers.
    Increment,
    /// Simplified SWU. One-shot, succeeds for every input.
    Swu,
}

/// The domain-separation label used for P-256 hash-to-curve.
///
/// These are the exact bytes of `"1.2.840.10045.3.1.7 point generation seed"`,
/// matching what deployed issuers hash.
pub const P256_H2C_LABEL: &[u8] = b"1.2.840.10045.3.1.7 point generation seed";

/// Errors raised when constructing a [`CurveConfig`]. These are fatal to the
/// session: there is no point retrying with the same parameters.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// The curve name is not supported.
    #[error("incompatible curve chosen: {0}")]
    UnsupportedCurve(String),
    /// The hash is not valid for the chosen curve.
    #[error("incompatible h2c hash '{hash}' for curve {curve}")]
    UnsupportedHash {
        /// the requested hash name
        hash: String,
        /// the curve it was requested for
        curve: String,
    },
    /// The hash-to-curve method is not valid for the chosen curve.
    #[error("incompatible h2c method '{method}' for curve {curve}")]
    UnsupportedMethod {
        /// the requested method name
        method: String,
        /// the curve it was requested for
        curve: String,
    },
}

/// Immutable curve settings for one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurveConfig {
    curve: CurveId,
    hash: HashId,
    method: H2cMethod,
    label: Vec<u8>,
}

impl CurveConfig {
    /// Creates a validated configuration.
    pub fn new(curve: CurveId, hash: HashId, method: H2cMethod) -> Self {
        let label = match curve {
            CurveId::P256 => P256_H2C_LABEL.to_vec(),
        };
        CurveConfig {
            curve,
            hash,
            method,
            label,
        }
    }

    /// Builds a configuration from the wire-format `h2c-params` strings,
    /// rejecting any combination this engine does not implement.
    pub fn from_params(curve: &str, hash: &str, method: &str) -> Result<Self, ConfigError> {
        let curve_id =
            CurveId::from_str(curve).map_err(|_| ConfigError::UnsupportedCurve(curve.into()))?;
        let method_id = H2cMethod::from_str(method).map_err(|_| ConfigError::UnsupportedMethod {
            method: method.into(),
            curve: curve.into(),
        })?;
        let hash_id = HashId::from_str(hash).map_err(|_| ConfigError::UnsupportedHash {
            hash: hash.into(),
            curve: curve.into(),
        })?;
        match (curve_id, hash_id) {
            (CurveId::P256, HashId::Sha256) => {}
        }
        Ok(Self::new(curve_id, hash_id, method_id))
    }

    /// The curve this session runs on.
    pub fn curve(&self) -> CurveId {
        self.curve
    }

    /// The base-field hash.
    pub fn hash(&self) -> HashId {
        self.hash
    }

    /// The hash-to-curve method.
    pub fn method(&self) -> H2cMethod {
        self.method
    }

    /// The domain-separation label for hash-to-curve.
    pub fn label(&self) -> &[u8] {
        &self.label
    }
}

impl FromStr for CurveId {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "p256" => Ok(CurveId::P256),
            _ => Err(()),
        }
    }
}

impl FromStr for HashId {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sha256" => Ok(HashId::Sha256),
            _ => Err(()),
        }
    }
}

impl FromStr for H2cMethod {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "increment" => Ok(H2cMethod::Increment),
            "swu" => Ok(H2cMethod::Swu),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for CurveId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CurveId::P256 => f.write_str("p256"),
        }
    }
}

impl std::fmt::Display for HashId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HashId::Sha256 => f.write_str("sha256"),
        }
    }
}

impl std::fmt::Display for H2cMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            H2cMethod::Increment => f.write_str("increment"),
            H2cMethod::Swu => f.write_str("swu"),
        }
    }
}

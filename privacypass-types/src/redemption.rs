//! Redemption wire format.
//!
//! A redemption travels in the `challenge-bypass-token` header as
//! `base64(JSON {"type":"Redeem","contents":[seed, binding, h2c-params?]})`
//! where the contents are base64 blobs. The optional third element tells the
//! verifier which hash-to-curve settings the client used.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

use privacypass_core::config::{ConfigError, CurveConfig};
use privacypass_core::token::{Token, TokenError};

use crate::WireError;
use crate::issuance::BlindTokenRequest;

/// Header carrying the redemption request.
pub const REDEMPTION_HEADER: &str = "challenge-bypass-token";

/// The hash-to-curve parameter triple as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct H2cParams {
    /// Curve name, e.g. `"p256"`.
    pub curve: String,
    /// Hash name, e.g. `"sha256"`.
    pub hash: String,
    /// Method name, `"swu"` or `"increment"`.
    pub method: String,
}

impl From<&CurveConfig> for H2cParams {
    fn from(config: &CurveConfig) -> Self {
        H2cParams {
            curve: config.curve().to_string(),
            hash: config.hash().to_string(),
            method: config.method().to_string(),
        }
    }
}

impl TryFrom<&H2cParams> for CurveConfig {
    type Error = ConfigError;

    fn try_from(params: &H2cParams) -> Result<Self, Self::Error> {
        CurveConfig::from_params(&params.curve, &params.hash, &params.method)
    }
}

/// A decoded redemption request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedeemRequest {
    /// The token's original seed bytes.
    pub seed: Vec<u8>,
    /// The request-binding MAC over host and path.
    pub binding: Vec<u8>,
    /// Hash-to-curve parameters, when the client includes them.
    pub h2c_params: Option<H2cParams>,
}

/// Builds the redemption header value for a signed token, binding it to
/// `host` and `path`.
pub fn encode_redemption_header(
    token: &Token,
    host: &str,
    path: &str,
    h2c_params: Option<&H2cParams>,
) -> Result<String, TokenError> {
    let binding = token.redemption_binding(host.as_bytes(), path.as_bytes())?;
    let mut contents = vec![
        STANDARD.encode(token.seed()),
        STANDARD.encode(binding),
    ];
    if let Some(params) = h2c_params {
        let json = serde_json::to_string(params).expect("h2c params serialize");
        contents.push(STANDARD.encode(json));
    }
    let request = BlindTokenRequest {
        kind: "Redeem".into(),
        contents,
    };
    let json = serde_json::to_string(&request).expect("redeem request serializes");
    Ok(STANDARD.encode(json))
}

/// Decodes a redemption header value (the verifier side).
pub fn decode_redemption_header(value: &str) -> Result<RedeemRequest, WireError> {
    let json = STANDARD.decode(value).map_err(|_| WireError::Base64)?;
    let request: BlindTokenRequest =
        serde_json::from_slice(&json).map_err(|_| WireError::Json)?;
    if request.kind != "Redeem" {
        return Err(WireError::UnexpectedType(request.kind));
    }
    let mut contents = request.contents.into_iter();
    let seed = contents.next().ok_or(WireError::MissingContents)?;
    let binding = contents.next().ok_or(WireError::MissingContents)?;
    let h2c_params = contents
        .next()
        .map(|b64| {
            let bytes = STANDARD.decode(b64).map_err(|_| WireError::Base64)?;
            serde_json::from_slice::<H2cParams>(&bytes).map_err(|_| WireError::Json)
        })
        .transpose()?;
    Ok(RedeemRequest {
        seed: STANDARD.decode(seed).map_err(|_| WireError::Base64)?,
        binding: STANDARD.decode(binding).map_err(|_| WireError::Base64)?,
        h2c_params,
    })
}

//! The publicly verifiable (RSA blind signature) token flow, token type
//! 0x0002.
//!
//! The client derives a token payload from the origin's challenge, blinds
//! its serialization, and ships a [`TokenRequest`] as
//! `message/token-request`. The issuer's raw blind signature comes back as
//! `message/token-response`; [`PublicTokenClient::finalize`] strips the
//! blind, verifies the signature and assembles the finished token.

use rand::{CryptoRng, Rng};
use tracing::{debug, instrument};

use privacypass_core::blindrsa::{
    PssHash, PssParams, RsaBlindContext, RsaPublicKey, RsaSecretKey, blind, blind_sign, finalize,
};
use privacypass_types::auth::{
    BASIC_PUBLIC_TOKEN_TYPE, PrivateToken, TokenPayload, TokenRequest, TokenResponse,
};

use crate::Error;

/// PSS parameters fixed by token type 0x0002: SHA-384 with a 48-byte salt.
pub const PUBLIC_TOKEN_PSS: PssParams = PssParams {
    hash: PssHash::Sha384,
    salt_len: 48,
};

/// Client state for requesting tokens from one issuer key.
pub struct PublicTokenClient {
    key: RsaPublicKey,
    key_enc: Vec<u8>,
}

/// State held between request creation and finalization. Single-use.
pub struct PendingToken {
    payload: TokenPayload,
    token_input: Vec<u8>,
    context: RsaBlindContext,
}

impl PublicTokenClient {
    /// Builds a client from the issuer's SPKI-encoded token key (the
    /// `token-key` challenge attribute).
    pub fn new(token_key_spki: &[u8]) -> Result<Self, Error> {
        let key = privacypass_types::auth::decode_rsa_spki(token_key_spki)?;
        Ok(PublicTokenClient {
            key,
            key_enc: token_key_spki.to_vec(),
        })
    }

    /// The issuer public key.
    pub fn key(&self) -> &RsaPublicKey {
        &self.key
    }

    /// Creates a [`TokenRequest`] for a challenge: fresh nonce, payload
    /// digests, blinded payload serialization.
    #[instrument(level = "debug", skip_all)]
    pub fn create_token_request<R: Rng + CryptoRng>(
        &self,
        challenge: &[u8],
        rng: &mut R,
    ) -> Result<(TokenRequest, PendingToken), Error> {
        let mut nonce = [0u8; 32];
        rng.fill_bytes(&mut nonce);
        let payload = TokenPayload::new(BASIC_PUBLIC_TOKEN_TYPE, nonce, challenge, &self.key_enc);
        let token_input = payload.serialize();

        let context = blind(&self.key, &token_input, &PUBLIC_TOKEN_PSS, rng)?;
        let request = TokenRequest {
            token_type: BASIC_PUBLIC_TOKEN_TYPE,
            token_key_id: payload.truncated_key_id(),
            blinded_msg: context.blinded_msg().to_vec(),
        };
        debug!("created token request for key id {}", request.token_key_id);
        Ok((request, PendingToken {
            payload,
            token_input,
            context,
        }))
    }

    /// Finalizes an issuer response into a usable token. The pending state
    /// is consumed either way; the issuer's signature is verified before
    /// anything is returned.
    #[instrument(level = "debug", skip_all)]
    pub fn finalize(
        &self,
        pending: PendingToken,
        response: &TokenResponse,
    ) -> Result<PrivateToken, Error> {
        let authenticator = finalize(
            &self.key,
            &pending.token_input,
            pending.context,
            &response.blind_sig,
            &PUBLIC_TOKEN_PSS,
        )?;
        Ok(PrivateToken {
            payload: pending.payload,
            authenticator,
        })
    }
}

/// Issuer side: blind-signs a token request. Exists for conceptual
/// completeness and round-trip tests; production issuance happens elsewhere.
pub fn issue_public_token(
    key: &RsaSecretKey,
    request: &TokenRequest,
) -> Result<TokenResponse, Error> {
    let blind_sig = blind_sign(key, &request.blinded_msg)?;
    Ok(TokenResponse { blind_sig })
}

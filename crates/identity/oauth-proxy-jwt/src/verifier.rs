//! Verifier backed by a single key configured up front.

use crate::error::{VerifyError, VerifyResult};
use crate::token::VerifiedToken;
use crate::{DEFAULT_LEEWAY_SECONDS, TokenVerifier};
use async_trait::async_trait;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde_json::Value;

pub struct StaticKeyVerifier {
    issuer: String,
    key: DecodingKey,
    validation: Validation,
}

impl StaticKeyVerifier {
    /// Accepts tokens from `issuer` signed with `key` using `algorithm`.
    /// An empty `audiences` list disables the audience check.
    pub fn new(
        issuer: impl Into<String>,
        audiences: &[String],
        algorithm: Algorithm,
        key: DecodingKey,
    ) -> Self {
        let issuer = issuer.into();
        Self {
            validation: build_validation(&issuer, audiences, &[algorithm]),
            issuer,
            key,
        }
    }

    /// HS256 verifier for a shared secret.
    pub fn hmac(issuer: impl Into<String>, audiences: &[String], secret: &[u8]) -> Self {
        Self::new(
            issuer,
            audiences,
            Algorithm::HS256,
            DecodingKey::from_secret(secret),
        )
    }

    /// Verifier for an asymmetric public key in PEM form.
    pub fn from_pem(
        issuer: impl Into<String>,
        audiences: &[String],
        algorithm: Algorithm,
        pem: &[u8],
    ) -> VerifyResult<Self> {
        let key = match algorithm {
            Algorithm::RS256
            | Algorithm::RS384
            | Algorithm::RS512
            | Algorithm::PS256
            | Algorithm::PS384
            | Algorithm::PS512 => DecodingKey::from_rsa_pem(pem),
            Algorithm::ES256 | Algorithm::ES384 => DecodingKey::from_ec_pem(pem),
            Algorithm::EdDSA => DecodingKey::from_ed_pem(pem),
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => {
                return Err(VerifyError::InvalidKey(
                    "HMAC algorithms take a shared secret, not a PEM key".to_string(),
                ));
            }
        }
        .map_err(|e| VerifyError::InvalidKey(e.to_string()))?;

        Ok(Self::new(issuer, audiences, algorithm, key))
    }
}

#[async_trait]
impl TokenVerifier for StaticKeyVerifier {
    fn issuer(&self) -> &str {
        &self.issuer
    }

    async fn verify(&self, raw_token: &str) -> VerifyResult<VerifiedToken> {
        let data = decode::<Value>(raw_token, &self.key, &self.validation)?;
        Ok(VerifiedToken::from_payload(data.claims))
    }
}

pub(crate) fn build_validation(
    issuer: &str,
    audiences: &[String],
    algorithms: &[Algorithm],
) -> Validation {
    let mut validation = Validation::new(algorithms.first().copied().unwrap_or_default());
    validation.algorithms = algorithms.to_vec();
    validation.set_issuer(&[issuer]);
    if audiences.is_empty() {
        validation.validate_aud = false;
    } else {
        validation.set_audience(audiences);
    }
    validation.leeway = DEFAULT_LEEWAY_SECONDS;
    validation.set_required_spec_claims(&["exp", "iss"]);
    validation
}

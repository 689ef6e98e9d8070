//! JWT verification for bearer tokens.
//!
//! A [`TokenVerifier`] checks a raw JWT against one trusted signing authority
//! (signature, issuer, audience, expiry) and hands back a [`VerifiedToken`].
//! Two implementations are provided: [`StaticKeyVerifier`] for a key known up
//! front and [`JwksVerifier`] for issuers that publish a JWKS document.

use async_trait::async_trait;

mod error;
mod jwks;
mod token;
mod verifier;

#[cfg(test)]
mod test_keys;

pub use error::{VerifyError, VerifyResult};
pub use jwks::{DEFAULT_MIN_REFRESH_INTERVAL, JwksVerifier};
pub use token::VerifiedToken;
pub use verifier::StaticKeyVerifier;

// Re-exported so callers can name algorithms and keys without a direct dependency
pub use jsonwebtoken::{Algorithm, DecodingKey};

/// Allowed clock skew when checking `exp` and `nbf`.
pub const DEFAULT_LEEWAY_SECONDS: u64 = 60;

/// Verifies raw JWTs issued by a single authority.
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    /// Issuer this verifier trusts, used in diagnostics.
    fn issuer(&self) -> &str;

    async fn verify(&self, raw_token: &str) -> VerifyResult<VerifiedToken>;
}

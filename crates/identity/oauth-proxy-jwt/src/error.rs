//! JWT verification error types.

use jsonwebtoken::Algorithm;
use thiserror::Error;

pub type VerifyResult<T> = Result<T, VerifyError>;

#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("JWT validation failed: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    #[error("Signing key not found: {kid}")]
    KeyNotFound { kid: String },

    #[error("Failed to fetch signing keys: {0}")]
    KeySource(String),

    #[error("Invalid verification key: {0}")]
    InvalidKey(String),

    #[error("Unsupported signing algorithm: {0:?}")]
    UnsupportedAlgorithm(Algorithm),
}

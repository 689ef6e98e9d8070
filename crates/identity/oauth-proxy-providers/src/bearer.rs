//! Session resolution from bearer JWTs.
//!
//! Verifiers are tried strictly in order. A verifier that cannot verify the
//! token is skipped; the first one that can decides the outcome, including
//! failures found after verification such as an unverified email.

use crate::error::{OAuth2Error, OAuth2Result};
use crate::types::BearerClaims;
use oauth_proxy_jwt::{TokenVerifier, VerifiedToken, VerifyError};
use oauth_proxy_session::SessionState;
use std::sync::Arc;
use tracing::{debug, warn};

/// Result of running one verifier against a raw token.
#[derive(Debug)]
pub enum VerifierOutcome {
    /// The verifier could not verify the token; try the next one.
    Rejected(VerifyError),
    Accepted(SessionState),
    /// The token verified but cannot become a session. Stops the search.
    Invalid(OAuth2Error),
}

/// Diagnostic events emitted while resolving a bearer session.
#[derive(Debug)]
pub enum BearerEvent<'a> {
    VerifierRejected {
        index: usize,
        issuer: &'a str,
        error: &'a VerifyError,
    },
    VerifierAccepted {
        index: usize,
        issuer: &'a str,
    },
    TokenInvalid {
        index: usize,
        issuer: &'a str,
        error: &'a OAuth2Error,
    },
}

/// Receives bearer resolution diagnostics.
pub trait BearerEventSink: Send + Sync {
    fn record(&self, event: &BearerEvent<'_>);
}

/// Default sink writing structured `tracing` events.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventSink;

impl BearerEventSink for TracingEventSink {
    fn record(&self, event: &BearerEvent<'_>) {
        match event {
            BearerEvent::VerifierRejected {
                index,
                issuer,
                error,
            } => {
                warn!(index, issuer, error = %error, "failed to verify bearer token");
            }
            BearerEvent::VerifierAccepted { index, issuer } => {
                debug!(index, issuer, "bearer token verified");
            }
            BearerEvent::TokenInvalid {
                index,
                issuer,
                error,
            } => {
                warn!(index, issuer, error = %error, "verified bearer token rejected");
            }
        }
    }
}

/// Build a session from a token that already passed verification.
pub fn session_from_verified(token: &VerifiedToken, raw_token: &str) -> OAuth2Result<SessionState> {
    let claims: BearerClaims = token
        .claims()
        .map_err(|e| OAuth2Error::ClaimsParse(e.to_string()))?;

    let email = claims.resolved_email();
    if claims.is_explicitly_unverified() {
        return Err(OAuth2Error::UnverifiedEmail(email));
    }

    Ok(SessionState {
        access_token: raw_token.to_string(),
        id_token: Some(raw_token.to_string()),
        refresh_token: None,
        email: Some(email.clone()),
        user: Some(email),
        created_at: None,
        expires_on: token.expiry,
    })
}

pub async fn evaluate_verifier(verifier: &dyn TokenVerifier, raw_token: &str) -> VerifierOutcome {
    let token = match verifier.verify(raw_token).await {
        Ok(token) => token,
        Err(e) => return VerifierOutcome::Rejected(e),
    };

    match session_from_verified(&token, raw_token) {
        Ok(session) => VerifierOutcome::Accepted(session),
        Err(e) => VerifierOutcome::Invalid(e),
    }
}

/// Resolve a raw bearer token into a session using the first verifier that
/// accepts it.
pub async fn resolve_bearer_session(
    verifiers: &[Arc<dyn TokenVerifier>],
    raw_token: &str,
    events: &dyn BearerEventSink,
) -> OAuth2Result<SessionState> {
    if verifiers.is_empty() {
        return Err(OAuth2Error::NoBearerVerifiers);
    }

    for (index, verifier) in verifiers.iter().enumerate() {
        let issuer = verifier.issuer();
        match evaluate_verifier(verifier.as_ref(), raw_token).await {
            VerifierOutcome::Rejected(error) => {
                events.record(&BearerEvent::VerifierRejected {
                    index,
                    issuer,
                    error: &error,
                });
            }
            VerifierOutcome::Accepted(session) => {
                events.record(&BearerEvent::VerifierAccepted { index, issuer });
                return Ok(session);
            }
            VerifierOutcome::Invalid(error) => {
                events.record(&BearerEvent::TokenInvalid {
                    index,
                    issuer,
                    error: &error,
                });
                return Err(error);
            }
        }
    }

    Err(OAuth2Error::AllVerifiersFailed)
}

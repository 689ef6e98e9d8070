//! OAuth2 provider error types.

use oauth_proxy_session::CodecError;
use thiserror::Error;

pub type OAuth2Result<T> = Result<T, OAuth2Error>;

#[derive(Debug, Error)]
pub enum OAuth2Error {
    #[error("Missing authorization code")]
    MissingAuthorizationCode,

    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    /// The token endpoint answered with something other than 200. The body is
    /// kept for operator logs and must not be echoed to end users.
    #[error("Got {status} from {url:?} {body}")]
    TokenExchangeFailed {
        status: u16,
        url: String,
        body: String,
    },

    #[error("Invalid token response: {0}")]
    InvalidTokenResponse(String),

    #[error("No access token found {body}")]
    NoAccessToken { body: String },

    #[error("No JWT bearer verifiers configured")]
    NoBearerVerifiers,

    #[error("Bearer token was rejected by every configured verifier")]
    AllVerifiersFailed,

    #[error("Failed to parse bearer token claims: {0}")]
    ClaimsParse(String),

    #[error("Email in id_token ({0}) isn't verified")]
    UnverifiedEmail(String),

    #[error("Not implemented: {0}")]
    NotImplemented(&'static str),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("URL parsing error: {0}")]
    UrlError(#[from] url::ParseError),

    #[error("Settings error: {0}")]
    SettingsError(#[from] config::ConfigError),

    #[error("Session codec error: {0}")]
    CodecError(#[from] CodecError),
}

impl OAuth2Error {
    /// Whether the caller may reasonably retry the same call. Only transport
    /// failures qualify; everything else is deterministic for the given input.
    pub fn is_retryable(&self) -> bool {
        matches!(self, OAuth2Error::HttpError(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_error_message() {
        let err = OAuth2Error::TokenExchangeFailed {
            status: 400,
            url: "https://idp.example.com/token".to_string(),
            body: "bad_verification_code".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Got 400 from \"https://idp.example.com/token\" bad_verification_code"
        );
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_unverified_email_message() {
        let err = OAuth2Error::UnverifiedEmail("user@example.com".to_string());
        assert_eq!(
            err.to_string(),
            "Email in id_token (user@example.com) isn't verified"
        );
    }
}

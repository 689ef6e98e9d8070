//! OAuth2 provider layer for an authenticating reverse proxy.
//!
//! The [`Provider`] trait captures what the proxy needs from an identity
//! provider: a login URL to redirect to, code redemption, session
//! validation and bearer JWT sessions. [`DefaultProvider`] implements the
//! generic OAuth2 behaviour; provider-specific types override the trait's
//! default methods where their IdP differs.
//!
//! # Example
//!
//! ```no_run
//! use oauth_proxy_providers::{DefaultProvider, Provider, ProviderData};
//! use url::Url;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let data = ProviderData::new("corp-sso")
//!     .with_client_credentials("client-id", "client-secret")
//!     .with_login_url(Url::parse("https://sso.example.com/authorize")?)
//!     .with_redeem_url(Url::parse("https://sso.example.com/token")?)
//!     .with_scope("openid email");
//! let provider = DefaultProvider::new(data);
//!
//! let redirect = provider.login_url("https://proxy.example.com/callback", "nonce");
//! let session = provider
//!     .redeem("https://proxy.example.com/callback", "code-from-callback")
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod bearer;
pub mod client;
pub mod config;
pub mod error;
pub mod provider;
pub mod types;


pub use bearer::{
    BearerEvent, BearerEventSink, TracingEventSink, VerifierOutcome, resolve_bearer_session,
};
pub use client::{cancellable, decode_token_body, login_url, redeem, validate_token};
pub use config::{ENV_PREFIX, ProviderData, ProviderSettings, VerifierSettings};
pub use error::{OAuth2Error, OAuth2Result};
pub use provider::{DefaultProvider, Provider};
pub use types::{BearerClaims, TokenBody};

pub use oauth_proxy_jwt::{JwksVerifier, StaticKeyVerifier, TokenVerifier, VerifiedToken};
pub use oauth_proxy_session::{CookieSessionCodec, SessionCodec, SessionState};

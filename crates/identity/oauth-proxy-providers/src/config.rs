//! Provider configuration.
//!
//! [`ProviderData`] is the runtime form: URLs already parsed, verifiers
//! already built. It is created once at startup and only read afterwards, so
//! it can be shared between requests behind an `Arc` without locking.
//!
//! [`ProviderSettings`] is the serializable form loaded from a TOML file
//! and/or `OAUTH_PROXY__*` environment variables.

use crate::error::{OAuth2Error, OAuth2Result};
use config::{Config as ConfigBuilder, Environment, File};
use oauth_proxy_jwt::{Algorithm, JwksVerifier, StaticKeyVerifier, TokenVerifier};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

pub const ENV_PREFIX: &str = "OAUTH_PROXY";

/// Everything a provider needs to talk to its identity provider.
#[derive(Clone, Default)]
pub struct ProviderData {
    pub provider_name: String,
    pub client_id: String,
    pub client_secret: String,
    pub login_url: Option<Url>,
    pub redeem_url: Option<Url>,
    pub profile_url: Option<Url>,
    pub protected_resource: Option<Url>,
    pub validate_url: Option<Url>,
    pub scope: String,
    pub approval_prompt: String,
    /// Tried in order by the bearer flow. Empty disables bearer JWT sessions.
    pub jwt_bearer_verifiers: Vec<Arc<dyn TokenVerifier>>,
}

impl ProviderData {
    pub fn new(provider_name: impl Into<String>) -> Self {
        Self {
            provider_name: provider_name.into(),
            approval_prompt: default_approval_prompt(),
            ..Self::default()
        }
    }

    pub fn with_client_credentials(
        mut self,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        self.client_id = client_id.into();
        self.client_secret = client_secret.into();
        self
    }

    pub fn with_login_url(mut self, url: Url) -> Self {
        self.login_url = Some(url);
        self
    }

    pub fn with_redeem_url(mut self, url: Url) -> Self {
        self.redeem_url = Some(url);
        self
    }

    pub fn with_profile_url(mut self, url: Url) -> Self {
        self.profile_url = Some(url);
        self
    }

    pub fn with_protected_resource(mut self, url: Url) -> Self {
        self.protected_resource = Some(url);
        self
    }

    pub fn with_validate_url(mut self, url: Url) -> Self {
        self.validate_url = Some(url);
        self
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = scope.into();
        self
    }

    pub fn with_approval_prompt(mut self, approval_prompt: impl Into<String>) -> Self {
        self.approval_prompt = approval_prompt.into();
        self
    }

    pub fn with_verifier(mut self, verifier: Arc<dyn TokenVerifier>) -> Self {
        self.jwt_bearer_verifiers.push(verifier);
        self
    }

    /// Build runtime configuration from settings. URL and key problems are
    /// reported here so they never surface mid-request.
    pub fn from_settings(settings: &ProviderSettings, client: &Client) -> OAuth2Result<Self> {
        settings.validate()?;

        let mut verifiers: Vec<Arc<dyn TokenVerifier>> = Vec::new();
        for verifier in &settings.jwt_bearer_verifiers {
            verifiers.push(verifier.build(client)?);
        }

        let data = Self {
            provider_name: settings.provider_name.clone(),
            client_id: settings.client_id.clone(),
            client_secret: settings.client_secret.clone(),
            login_url: parse_optional_url("login_url", settings.login_url.as_deref())?,
            redeem_url: parse_optional_url("redeem_url", settings.redeem_url.as_deref())?,
            profile_url: parse_optional_url("profile_url", settings.profile_url.as_deref())?,
            protected_resource: parse_optional_url(
                "protected_resource",
                settings.protected_resource.as_deref(),
            )?,
            validate_url: parse_optional_url("validate_url", settings.validate_url.as_deref())?,
            scope: settings.scope.clone(),
            approval_prompt: settings.approval_prompt.clone(),
            jwt_bearer_verifiers: verifiers,
        };

        debug!(
            "Configured provider {} with {} bearer verifiers",
            data.provider_name,
            data.jwt_bearer_verifiers.len()
        );
        Ok(data)
    }
}

impl fmt::Debug for ProviderData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderData")
            .field("provider_name", &self.provider_name)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("login_url", &self.login_url.as_ref().map(Url::as_str))
            .field("redeem_url", &self.redeem_url.as_ref().map(Url::as_str))
            .field("profile_url", &self.profile_url.as_ref().map(Url::as_str))
            .field(
                "protected_resource",
                &self.protected_resource.as_ref().map(Url::as_str),
            )
            .field("validate_url", &self.validate_url.as_ref().map(Url::as_str))
            .field("scope", &self.scope)
            .field("approval_prompt", &self.approval_prompt)
            .field(
                "jwt_bearer_verifiers",
                &self
                    .jwt_bearer_verifiers
                    .iter()
                    .map(|v| v.issuer())
                    .collect::<Vec<_>>(),
            )
            .finish()
    }
}

fn parse_optional_url(field: &str, value: Option<&str>) -> OAuth2Result<Option<Url>> {
    match value.map(str::trim) {
        None | Some("") => Ok(None),
        Some(raw) => Url::parse(raw)
            .map(Some)
            .map_err(|e| OAuth2Error::ConfigError(format!("{} {:?}: {}", field, raw, e))),
    }
}

/// Provider settings as they appear in configuration files.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    pub provider_name: String,
    pub client_id: String,
    pub client_secret: String,
    pub login_url: Option<String>,
    pub redeem_url: Option<String>,
    pub profile_url: Option<String>,
    pub protected_resource: Option<String>,
    pub validate_url: Option<String>,
    pub scope: String,
    #[serde(default = "default_approval_prompt")]
    pub approval_prompt: String,
    /// Request timeout for the provider's HTTP client. Unset means the
    /// client's own default (no deadline).
    pub http_timeout_seconds: Option<u64>,
    pub jwt_bearer_verifiers: Vec<VerifierSettings>,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            provider_name: default_provider_name(),
            client_id: String::new(),
            client_secret: String::new(),
            login_url: None,
            redeem_url: None,
            profile_url: None,
            protected_resource: None,
            validate_url: None,
            scope: String::new(),
            approval_prompt: default_approval_prompt(),
            http_timeout_seconds: None,
            jwt_bearer_verifiers: Vec::new(),
        }
    }
}

/// One trusted token issuer for the bearer flow. Exactly one of `secret`,
/// `public_key_pem` or `jwks_url` must be set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifierSettings {
    pub issuer: String,
    #[serde(default)]
    pub audiences: Vec<String>,
    #[serde(default)]
    pub algorithm: Option<Algorithm>,
    #[serde(default)]
    pub secret: Option<String>,
    #[serde(default)]
    pub public_key_pem: Option<String>,
    #[serde(default)]
    pub jwks_url: Option<String>,
}

impl VerifierSettings {
    fn validate(&self) -> OAuth2Result<()> {
        if self.issuer.trim().is_empty() {
            return Err(OAuth2Error::ConfigError(
                "bearer verifier issuer cannot be empty".to_string(),
            ));
        }

        let sources = [&self.secret, &self.public_key_pem, &self.jwks_url]
            .iter()
            .filter(|source| source.is_some())
            .count();
        if sources != 1 {
            return Err(OAuth2Error::ConfigError(format!(
                "bearer verifier for {} needs exactly one of secret, public_key_pem or jwks_url",
                self.issuer
            )));
        }

        Ok(())
    }

    fn build(&self, client: &Client) -> OAuth2Result<Arc<dyn TokenVerifier>> {
        if let Some(secret) = &self.secret {
            let verifier = match self.algorithm {
                None | Some(Algorithm::HS256) => {
                    StaticKeyVerifier::hmac(&self.issuer, &self.audiences, secret.as_bytes())
                }
                Some(other) => {
                    return Err(OAuth2Error::ConfigError(format!(
                        "shared secret verifier for {} only supports HS256, got {:?}",
                        self.issuer, other
                    )));
                }
            };
            return Ok(Arc::new(verifier));
        }

        if let Some(pem) = &self.public_key_pem {
            let algorithm = self.algorithm.unwrap_or(Algorithm::RS256);
            let verifier = StaticKeyVerifier::from_pem(
                &self.issuer,
                &self.audiences,
                algorithm,
                pem.as_bytes(),
            )
            .map_err(|e| OAuth2Error::ConfigError(format!("{}: {}", self.issuer, e)))?;
            return Ok(Arc::new(verifier));
        }

        let jwks_url = parse_optional_url("jwks_url", self.jwks_url.as_deref())?
            .ok_or_else(|| {
                OAuth2Error::ConfigError(format!("missing key source for {}", self.issuer))
            })?;
        let mut verifier =
            JwksVerifier::new(&self.issuer, self.audiences.clone(), jwks_url, client.clone());
        if let Some(algorithm) = self.algorithm {
            verifier = verifier.with_algorithms(vec![algorithm]);
        }
        Ok(Arc::new(verifier))
    }
}

impl ProviderSettings {
    /// Load settings from an optional TOML file, then apply environment
    /// overrides such as `OAUTH_PROXY__CLIENT_ID`.
    pub fn load(path: Option<&Path>) -> OAuth2Result<Self> {
        Self::load_with_environment(path, Environment::with_prefix(ENV_PREFIX))
    }

    /// Like [`ProviderSettings::load`] with a caller-built environment
    /// source, e.g. one backed by an explicit map via [`Environment::source`].
    pub fn load_with_environment(
        path: Option<&Path>,
        environment: Environment,
    ) -> OAuth2Result<Self> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = path {
            if path.exists() {
                info!("Loading provider settings from {}", path.display());
                builder = builder.add_source(File::from(path));
            } else {
                debug!("No settings file at {}, using defaults", path.display());
            }
        }

        builder = builder.add_source(environment.separator("__").try_parsing(true));

        let settings: ProviderSettings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> OAuth2Result<()> {
        if self.provider_name.trim().is_empty() {
            return Err(OAuth2Error::ConfigError(
                "provider_name cannot be empty".to_string(),
            ));
        }

        if self.http_timeout_seconds == Some(0) {
            return Err(OAuth2Error::ConfigError(
                "http_timeout_seconds must be positive when set".to_string(),
            ));
        }

        for verifier in &self.jwt_bearer_verifiers {
            verifier.validate()?;
        }

        Ok(())
    }

    /// HTTP client honoring `http_timeout_seconds`.
    pub fn http_client(&self) -> OAuth2Result<Client> {
        let mut builder = Client::builder();
        if let Some(seconds) = self.http_timeout_seconds {
            builder = builder.timeout(Duration::from_secs(seconds));
        }
        Ok(builder.build()?)
    }
}

fn default_provider_name() -> String {
    "oauth2".to_string()
}

fn default_approval_prompt() -> String {
    "force".to_string()
}

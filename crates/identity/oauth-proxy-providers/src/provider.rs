//! The provider contract and the generic OAuth2 provider.

use crate::bearer::{TracingEventSink, resolve_bearer_session};
use crate::client;
use crate::config::{ProviderData, ProviderSettings};
use crate::error::{OAuth2Error, OAuth2Result};
use async_trait::async_trait;
use oauth_proxy_session::{SessionCodec, SessionState};
use reqwest::Client;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Operations the proxy performs against an identity provider.
///
/// Only [`Provider::data`] and [`Provider::http_client`] are required. Every
/// other method has a default built on the generic OAuth2 flows, which
/// provider-specific implementations override where their IdP differs.
#[async_trait]
pub trait Provider: Send + Sync {
    fn data(&self) -> &ProviderData;

    fn http_client(&self) -> &Client;

    fn provider_name(&self) -> &str {
        &self.data().provider_name
    }

    fn login_url(&self, redirect_uri: &str, state: &str) -> String {
        client::login_url(self.data(), redirect_uri, state)
    }

    async fn redeem(&self, redirect_uri: &str, code: &str) -> OAuth2Result<SessionState> {
        client::redeem(self.data(), self.http_client(), redirect_uri, code).await
    }

    async fn email_address(&self, _session: &SessionState) -> OAuth2Result<String> {
        Err(OAuth2Error::NotImplemented("email_address"))
    }

    async fn user_name(&self, _session: &SessionState) -> OAuth2Result<String> {
        Err(OAuth2Error::NotImplemented("user_name"))
    }

    /// Group membership check. Accepts everyone by default.
    async fn validate_group(&self, _email: &str) -> bool {
        true
    }

    async fn validate_session_state(&self, session: &SessionState) -> bool {
        client::validate_token(self.data(), self.http_client(), &session.access_token).await
    }

    /// Returns whether the session was refreshed. The default never refreshes.
    async fn refresh_session_if_needed(&self, _session: &mut SessionState) -> OAuth2Result<bool> {
        Ok(false)
    }

    fn cookie_for_session(
        &self,
        session: &SessionState,
        codec: &dyn SessionCodec,
    ) -> OAuth2Result<String> {
        Ok(codec.encode(session)?)
    }

    fn session_from_cookie(
        &self,
        value: &str,
        codec: &dyn SessionCodec,
    ) -> OAuth2Result<SessionState> {
        Ok(codec.decode(value)?)
    }

    async fn jwt_session(&self, raw_bearer_token: &str) -> OAuth2Result<SessionState> {
        resolve_bearer_session(
            &self.data().jwt_bearer_verifiers,
            raw_bearer_token,
            &TracingEventSink,
        )
        .await
    }
}

/// Generic OAuth2 provider using only the default flows.
#[derive(Debug, Clone)]
pub struct DefaultProvider {
    data: Arc<ProviderData>,
    http_client: Client,
}

impl DefaultProvider {
    pub fn new(data: ProviderData) -> Self {
        Self::with_client(data, Client::new())
    }

    pub fn with_client(data: ProviderData, http_client: Client) -> Self {
        Self {
            data: Arc::new(data),
            http_client,
        }
    }

    pub fn from_settings(settings: &ProviderSettings) -> OAuth2Result<Self> {
        let http_client = settings.http_client()?;
        let data = ProviderData::from_settings(settings, &http_client)?;
        info!("Initialized provider {}", data.provider_name);
        Ok(Self::with_client(data, http_client))
    }

    /// Load settings (file plus environment) and build the provider.
    pub fn load(path: Option<&Path>) -> OAuth2Result<Self> {
        Self::from_settings(&ProviderSettings::load(path)?)
    }
}

#[async_trait]
impl Provider for DefaultProvider {
    fn data(&self) -> &ProviderData {
        &self.data
    }

    fn http_client(&self) -> &Client {
        &self.http_client
    }
}

//! Verifier backed by an issuer's published JWKS document.

use crate::TokenVerifier;
use crate::error::{VerifyError, VerifyResult};
use crate::token::VerifiedToken;
use crate::verifier::build_validation;
use async_trait::async_trait;
use jsonwebtoken::jwk::{AlgorithmParameters, Jwk, JwkSet};
use jsonwebtoken::{Algorithm, DecodingKey, decode, decode_header};
use reqwest::Client;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, warn};
use url::Url;

/// Minimum time between two fetches triggered by unknown key ids.
pub const DEFAULT_MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(60);

struct CachedKeys {
    keys: Arc<JwkSet>,
    fetched_at: Instant,
}

/// Verifies tokens against keys fetched from a JWKS endpoint.
///
/// Keys are cached after the first fetch. A token whose `kid` is not in the
/// cached set triggers a refetch, at most once per refresh interval, which
/// covers routine key rotation on the issuer side. Concurrent misses wait on
/// the same fetch. A token without a `kid` is tried against every cached
/// key that fits its algorithm and never causes a refetch.
pub struct JwksVerifier {
    issuer: String,
    audiences: Vec<String>,
    jwks_url: Url,
    algorithms: Vec<Algorithm>,
    min_refresh_interval: Duration,
    client: Client,
    cache: RwLock<Option<CachedKeys>>,
}

impl JwksVerifier {
    pub fn new(
        issuer: impl Into<String>,
        audiences: Vec<String>,
        jwks_url: Url,
        client: Client,
    ) -> Self {
        Self {
            issuer: issuer.into(),
            audiences,
            jwks_url,
            algorithms: vec![Algorithm::RS256],
            min_refresh_interval: DEFAULT_MIN_REFRESH_INTERVAL,
            client,
            cache: RwLock::new(None),
        }
    }

    /// Replace the accepted signing algorithms (RS256 only by default).
    pub fn with_algorithms(mut self, algorithms: Vec<Algorithm>) -> Self {
        self.algorithms = algorithms;
        self
    }

    pub fn with_min_refresh_interval(mut self, interval: Duration) -> Self {
        self.min_refresh_interval = interval;
        self
    }

    pub fn jwks_url(&self) -> &Url {
        &self.jwks_url
    }

    async fn download(&self) -> VerifyResult<JwkSet> {
        let response = self
            .client
            .get(self.jwks_url.clone())
            .send()
            .await
            .map_err(|e| VerifyError::KeySource(e.to_string()))?;

        if !response.status().is_success() {
            return Err(VerifyError::KeySource(format!(
                "got {} from {}",
                response.status(),
                self.jwks_url
            )));
        }

        let keys: JwkSet = response
            .json()
            .await
            .map_err(|e| VerifyError::KeySource(format!("invalid key set: {}", e)))?;

        debug!(
            "Fetched {} signing keys from {}",
            keys.keys.len(),
            self.jwks_url
        );
        Ok(keys)
    }

    /// The cached key set, fetched on first use.
    async fn current_keys(&self) -> VerifyResult<Arc<JwkSet>> {
        let cached = self.cache.read().await.as_ref().map(|c| c.keys.clone());
        if let Some(keys) = cached {
            return Ok(keys);
        }

        let mut cache = self.cache.write().await;
        if let Some(cached) = cache.as_ref() {
            return Ok(cached.keys.clone());
        }

        let keys = Arc::new(self.download().await?);
        *cache = Some(CachedKeys {
            keys: keys.clone(),
            fetched_at: Instant::now(),
        });
        Ok(keys)
    }

    async fn key_by_id(&self, kid: &str) -> VerifyResult<Jwk> {
        let keys = self.current_keys().await?;
        if let Some(jwk) = keys.find(kid) {
            return Ok(jwk.clone());
        }

        // Re-check under the write lock: another task may have refetched
        let mut cache = self.cache.write().await;
        if let Some(cached) = cache.as_ref() {
            if let Some(jwk) = cached.keys.find(kid) {
                return Ok(jwk.clone());
            }
            if cached.fetched_at.elapsed() < self.min_refresh_interval {
                debug!(
                    "Unknown key id {} for {}, keys refreshed too recently to refetch",
                    kid, self.issuer
                );
                return Err(key_not_found(kid));
            }
        }

        match self.download().await {
            Ok(keys) => {
                let jwk = keys.find(kid).cloned();
                *cache = Some(CachedKeys {
                    keys: Arc::new(keys),
                    fetched_at: Instant::now(),
                });
                jwk.ok_or_else(|| key_not_found(kid))
            }
            Err(e) => {
                // A failing endpoint is rate limited like a successful one
                if let Some(cached) = cache.as_mut() {
                    cached.fetched_at = Instant::now();
                }
                Err(e)
            }
        }
    }

    async fn keys_for_algorithm(&self, algorithm: Algorithm) -> VerifyResult<Vec<Jwk>> {
        let keys = self.current_keys().await?;
        let candidates: Vec<Jwk> = keys
            .keys
            .iter()
            .filter(|jwk| key_fits(jwk, algorithm))
            .cloned()
            .collect();

        if candidates.is_empty() {
            return Err(key_not_found("missing"));
        }
        Ok(candidates)
    }
}

fn key_not_found(kid: &str) -> VerifyError {
    VerifyError::KeyNotFound {
        kid: kid.to_string(),
    }
}

/// Whether a key could have produced a signature with `algorithm`.
fn key_fits(jwk: &Jwk, algorithm: Algorithm) -> bool {
    if let Some(key_algorithm) = &jwk.common.key_algorithm {
        if key_algorithm.to_string() != format!("{:?}", algorithm) {
            return false;
        }
    }

    matches!(
        (&jwk.algorithm, algorithm),
        (
            AlgorithmParameters::RSA(_),
            Algorithm::RS256
                | Algorithm::RS384
                | Algorithm::RS512
                | Algorithm::PS256
                | Algorithm::PS384
                | Algorithm::PS512
        ) | (
            AlgorithmParameters::EllipticCurve(_),
            Algorithm::ES256 | Algorithm::ES384
        ) | (AlgorithmParameters::OctetKeyPair(_), Algorithm::EdDSA)
            | (
                AlgorithmParameters::OctetKey(_),
                Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512
            )
    )
}

#[async_trait]
impl TokenVerifier for JwksVerifier {
    fn issuer(&self) -> &str {
        &self.issuer
    }

    async fn verify(&self, raw_token: &str) -> VerifyResult<VerifiedToken> {
        let header = decode_header(raw_token)?;
        if !self.algorithms.contains(&header.alg) {
            warn!(
                "Rejecting token signed with {:?} for issuer {}",
                header.alg, self.issuer
            );
            return Err(VerifyError::UnsupportedAlgorithm(header.alg));
        }

        let candidates = match header.kid.as_deref() {
            Some(kid) => vec![self.key_by_id(kid).await?],
            None => self.keys_for_algorithm(header.alg).await?,
        };

        let validation = build_validation(&self.issuer, &self.audiences, &[header.alg]);
        let mut last_error = None;
        for jwk in &candidates {
            let key = match DecodingKey::from_jwk(jwk) {
                Ok(key) => key,
                Err(e) => {
                    last_error = Some(VerifyError::InvalidKey(e.to_string()));
                    continue;
                }
            };
            match decode::<Value>(raw_token, &key, &validation) {
                Ok(data) => return Ok(VerifiedToken::from_payload(data.claims)),
                Err(e) => last_error = Some(VerifyError::Jwt(e)),
            }
        }

        Err(last_error.unwrap_or_else(|| key_not_found("missing")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_keys::{self, AUDIENCE, ISSUER};
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn setup_jwks_server(kid: &str) -> MockServer {
        serve_jwks(test_keys::jwks_document(kid)).await
    }

    async fn serve_jwks(document: Value) -> MockServer {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/jwks"))
            .respond_with(ResponseTemplate::new(200).set_body_json(document))
            .mount(&mock_server)
            .await;
        mock_server
    }

    async fn fetch_count(mock_server: &MockServer) -> usize {
        mock_server.received_requests().await.unwrap().len()
    }

    fn verifier_for(mock_server: &MockServer) -> JwksVerifier {
        let url = Url::parse(&format!("{}/jwks", mock_server.uri())).unwrap();
        JwksVerifier::new(ISSUER, vec![AUDIENCE.to_string()], url, Client::new())
    }

    #[tokio::test]
    async fn test_verifies_with_fetched_key() {
        let mock_server = setup_jwks_server("key-1").await;
        let verifier = verifier_for(&mock_server);

        let token = test_keys::sign_rs256(&test_keys::claims("jwks-user"), Some("key-1"));
        let verified = verifier.verify(&token).await.unwrap();
        assert_eq!(verified.subject, "jwks-user");
        assert!(verified.expiry.is_some());

        // Second verification is served from the cache
        verifier.verify(&token).await.unwrap();
        let requests = mock_server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_kid_refetches_once() {
        let mock_server = setup_jwks_server("key-1").await;
        let verifier = verifier_for(&mock_server).with_min_refresh_interval(Duration::ZERO);

        let good = test_keys::sign_rs256(&test_keys::claims("user"), Some("key-1"));
        verifier.verify(&good).await.unwrap();

        let unknown = test_keys::sign_rs256(&test_keys::claims("user"), Some("rotated"));
        let result = verifier.verify(&unknown).await;
        assert!(matches!(result, Err(VerifyError::KeyNotFound { ref kid }) if kid == "rotated"));

        let requests = mock_server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 2);
    }

    #[tokio::test]
    async fn test_token_without_kid_uses_single_key() {
        let mock_server = setup_jwks_server("only").await;
        let verifier = verifier_for(&mock_server);

        let token = test_keys::sign_rs256(&test_keys::claims("user"), None);
        assert!(verifier.verify(&token).await.is_ok());
    }

    #[tokio::test]
    async fn test_rejects_unlisted_algorithm() {
        let mock_server = setup_jwks_server("key-1").await;
        let verifier = verifier_for(&mock_server);

        let token = test_keys::sign_hs256(&test_keys::claims("user"), b"secret");
        assert!(matches!(
            verifier.verify(&token).await,
            Err(VerifyError::UnsupportedAlgorithm(Algorithm::HS256))
        ));

        // Never reached the key endpoint
        let requests = mock_server.received_requests().await.unwrap();
        assert!(requests.is_empty());
    }

    #[tokio::test]
    async fn test_key_source_failure() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/jwks"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&mock_server)
            .await;

        let verifier = verifier_for(&mock_server);
        let token = test_keys::sign_rs256(&test_keys::claims("user"), Some("key-1"));
        assert!(matches!(
            verifier.verify(&token).await,
            Err(VerifyError::KeySource(_))
        ));
    }

    #[tokio::test]
    async fn test_wrong_audience_rejected() {
        let mock_server = setup_jwks_server("key-1").await;
        let verifier = verifier_for(&mock_server);

        let mut claims = test_keys::claims("user");
        claims["aud"] = serde_json::json!("someone-else");
        let token = test_keys::sign_rs256(&claims, Some("key-1"));
        assert!(matches!(verifier.verify(&token).await, Err(VerifyError::Jwt(_))));
    }

    #[tokio::test]
    async fn test_unknown_kids_are_rate_limited() {
        let mock_server = setup_jwks_server("key-1").await;
        let verifier = Arc::new(verifier_for(&mock_server));

        for i in 0..20 {
            let token =
                test_keys::sign_rs256(&test_keys::claims("user"), Some(&format!("bogus-{}", i)));
            assert!(matches!(
                verifier.verify(&token).await,
                Err(VerifyError::KeyNotFound { .. })
            ));
        }
        assert_eq!(fetch_count(&mock_server).await, 1);

        let mut handles = Vec::new();
        for i in 0..10 {
            let verifier = verifier.clone();
            handles.push(tokio::spawn(async move {
                let token = test_keys::sign_rs256(
                    &test_keys::claims("user"),
                    Some(&format!("concurrent-{}", i)),
                );
                verifier.verify(&token).await
            }));
        }
        for handle in handles {
            assert!(handle.await.unwrap().is_err());
        }
        assert_eq!(fetch_count(&mock_server).await, 1);

        // The known key keeps working from the cache
        let good = test_keys::sign_rs256(&test_keys::claims("user"), Some("key-1"));
        assert!(verifier.verify(&good).await.is_ok());
        assert_eq!(fetch_count(&mock_server).await, 1);
    }

    #[tokio::test]
    async fn test_concurrent_misses_share_one_fetch() {
        let mock_server = setup_jwks_server("key-1").await;
        let verifier = Arc::new(verifier_for(&mock_server));

        let mut handles = Vec::new();
        for i in 0..10 {
            let verifier = verifier.clone();
            handles.push(tokio::spawn(async move {
                let token =
                    test_keys::sign_rs256(&test_keys::claims("user"), Some(&format!("k-{}", i)));
                verifier.verify(&token).await
            }));
        }
        for handle in handles {
            assert!(handle.await.unwrap().is_err());
        }
        assert_eq!(fetch_count(&mock_server).await, 1);
    }

    #[tokio::test]
    async fn test_token_without_kid_tries_every_key() {
        let mock_server = serve_jwks(json!({
            "keys": [test_keys::foreign_rsa_jwk("old"), test_keys::rsa_jwk("current")]
        }))
        .await;
        let verifier = verifier_for(&mock_server);

        let token = test_keys::sign_rs256(&test_keys::claims("rotating-user"), None);
        let verified = verifier.verify(&token).await.unwrap();
        assert_eq!(verified.subject, "rotating-user");
        verifier.verify(&token).await.unwrap();

        assert_eq!(fetch_count(&mock_server).await, 1);
    }

    #[tokio::test]
    async fn test_token_without_kid_and_no_matching_key() {
        let mock_server = serve_jwks(json!({
            "keys": [test_keys::foreign_rsa_jwk("a"), test_keys::foreign_rsa_jwk("b")]
        }))
        .await;
        let verifier = verifier_for(&mock_server);

        let token = test_keys::sign_rs256(&test_keys::claims("user"), None);
        assert!(matches!(verifier.verify(&token).await, Err(VerifyError::Jwt(_))));
        assert!(verifier.verify(&token).await.is_err());

        // Signature failures never trigger a refetch
        assert_eq!(fetch_count(&mock_server).await, 1);
    }

    #[test]
    fn test_key_fits_algorithm() {
        let jwk: Jwk = serde_json::from_value(test_keys::rsa_jwk("k")).unwrap();
        assert!(key_fits(&jwk, Algorithm::RS256));
        assert!(!key_fits(&jwk, Algorithm::RS512));
        assert!(!key_fits(&jwk, Algorithm::ES256));

        let mut untagged = test_keys::rsa_jwk("k");
        untagged.as_object_mut().unwrap().remove("alg");
        let jwk: Jwk = serde_json::from_value(untagged).unwrap();
        assert!(key_fits(&jwk, Algorithm::PS256));
        assert!(!key_fits(&jwk, Algorithm::HS256));
    }
}

//! Default OAuth2 flows: login URL construction, authorization code
//! redemption and access token validation.

use crate::config::ProviderData;
use crate::error::{OAuth2Error, OAuth2Result};
use crate::types::TokenBody;
use chrono::Utc;
use oauth_proxy_session::SessionState;
use reqwest::{Client, StatusCode};
use std::collections::BTreeMap;
use std::future::Future;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use url::form_urlencoded;

/// Build the authorization endpoint URL the user is redirected to.
///
/// Query parameters already present on the login URL are kept. The client
/// identity parameters are overwritten, while `scope` and `state` are added
/// next to any existing values. Keys are emitted in sorted order so the
/// output is stable for identical input. Escaping matches Go's
/// `url.Values.Encode` byte for byte: `*` becomes `%2A` and `~` stays literal.
pub fn login_url(data: &ProviderData, redirect_uri: &str, state: &str) -> String {
    let mut params: BTreeMap<String, Vec<String>> = BTreeMap::new();
    if let Some(url) = &data.login_url {
        for (key, value) in url.query_pairs() {
            params
                .entry(key.into_owned())
                .or_default()
                .push(value.into_owned());
        }
    }

    set_param(&mut params, "redirect_uri", redirect_uri);
    set_param(&mut params, "approval_prompt", &data.approval_prompt);
    add_param(&mut params, "scope", &data.scope);
    set_param(&mut params, "client_id", &data.client_id);
    set_param(&mut params, "response_type", "code");
    add_param(&mut params, "state", state);

    let query = encode_params(&params);
    debug!(
        "Generated authorization URL for provider {}",
        data.provider_name
    );

    match &data.login_url {
        Some(url) => {
            let mut url = url.clone();
            url.set_query(Some(&query));
            url.to_string()
        }
        None => format!("?{}", query),
    }
}

fn set_param(params: &mut BTreeMap<String, Vec<String>>, key: &str, value: &str) {
    params.insert(key.to_string(), vec![value.to_string()]);
}

fn add_param(params: &mut BTreeMap<String, Vec<String>>, key: &str, value: &str) {
    params
        .entry(key.to_string())
        .or_default()
        .push(value.to_string());
}

fn encode_params(params: &BTreeMap<String, Vec<String>>) -> String {
    let mut pairs = Vec::new();
    for (key, values) in params {
        for value in values {
            pairs.push(format!("{}={}", query_escape(key), query_escape(value)));
        }
    }
    pairs.join("&")
}

/// `form_urlencoded` escaping with `*` escaped and `~` left alone.
///
/// `%` itself is always escaped to `%25`, so a `%7E` in the output can only
/// come from a `~` in the input.
fn query_escape(value: &str) -> String {
    form_urlencoded::byte_serialize(value.as_bytes())
        .collect::<String>()
        .replace('*', "%2A")
        .replace("%7E", "~")
}

/// Exchange an authorization code for a session.
pub async fn redeem(
    data: &ProviderData,
    client: &Client,
    redirect_uri: &str,
    code: &str,
) -> OAuth2Result<SessionState> {
    if code.is_empty() {
        return Err(OAuth2Error::MissingAuthorizationCode);
    }

    let redeem_url = data
        .redeem_url
        .as_ref()
        .ok_or_else(|| OAuth2Error::ConfigError("Redeem URL not configured".to_string()))?;

    let resource = data
        .protected_resource
        .as_ref()
        .map(|url| url.to_string())
        .filter(|url| !url.is_empty());

    let mut params = vec![
        ("redirect_uri", redirect_uri),
        ("client_id", data.client_id.as_str()),
        ("client_secret", data.client_secret.as_str()),
        ("code", code),
        ("grant_type", "authorization_code"),
    ];
    if let Some(resource) = &resource {
        params.push(("resource", resource.as_str()));
    }

    let response = client.post(redeem_url.clone()).form(&params).send().await?;

    let status = response.status();
    let body = response.text().await?;

    if status != StatusCode::OK {
        error!(
            "Token exchange with {} failed with status {}",
            data.provider_name, status
        );
        return Err(OAuth2Error::TokenExchangeFailed {
            status: status.as_u16(),
            url: redeem_url.to_string(),
            body,
        });
    }

    let session = match decode_token_body(&body)? {
        // A JSON body is accepted as-is, even with an empty token
        TokenBody::Json { access_token } => SessionState::new(access_token),
        TokenBody::Form {
            access_token: Some(access_token),
        } if !access_token.is_empty() => SessionState {
            access_token,
            created_at: Some(Utc::now()),
            ..SessionState::default()
        },
        TokenBody::Form { .. } => return Err(OAuth2Error::NoAccessToken { body }),
    };

    info!(
        "Successfully exchanged code for tokens with {}",
        data.provider_name
    );
    Ok(session)
}

/// Classify a token endpoint body: JSON first, then form encoding.
///
/// The order matters. Some endpoints return bodies that are valid form data
/// but also parse as JSON, and JSON wins for those.
pub fn decode_token_body(body: &str) -> OAuth2Result<TokenBody> {
    if let Some(access_token) = json_access_token(body) {
        return Ok(TokenBody::Json { access_token });
    }

    let pairs = parse_form(body).map_err(OAuth2Error::InvalidTokenResponse)?;
    let access_token = pairs
        .into_iter()
        .find(|(key, _)| key == "access_token")
        .map(|(_, value)| value);

    Ok(TokenBody::Form { access_token })
}

/// `Some` when the body is a JSON object (or `null`) whose `access_token`,
/// if present, is a string. Anything else is not a JSON token response.
fn json_access_token(body: &str) -> Option<String> {
    match serde_json::from_str::<serde_json::Value>(body).ok()? {
        serde_json::Value::Null => Some(String::new()),
        serde_json::Value::Object(map) => match map.get("access_token") {
            None | Some(serde_json::Value::Null) => Some(String::new()),
            Some(serde_json::Value::String(token)) => Some(token.clone()),
            Some(_) => None,
        },
        _ => None,
    }
}

/// Strict `application/x-www-form-urlencoded` parser.
///
/// Unlike the lossy `form_urlencoded::parse`, this rejects
/// malformed percent escapes and `;` separators so a garbage body is reported
/// as such instead of silently yielding no token.
pub fn parse_form(body: &str) -> Result<Vec<(String, String)>, String> {
    let mut pairs = Vec::new();
    for segment in body.split('&') {
        if segment.is_empty() {
            continue;
        }
        if segment.contains(';') {
            return Err(format!("invalid semicolon separator in {:?}", segment));
        }
        let (key, value) = segment.split_once('=').unwrap_or((segment, ""));
        pairs.push((unescape(key)?, unescape(value)?));
    }
    Ok(pairs)
}

fn unescape(component: &str) -> Result<String, String> {
    let bytes = component.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => decoded.push(b' '),
            b'%' => {
                let hex = bytes
                    .get(i + 1..i + 3)
                    .filter(|h| h.iter().all(u8::is_ascii_hexdigit))
                    .and_then(|h| std::str::from_utf8(h).ok())
                    .and_then(|h| u8::from_str_radix(h, 16).ok())
                    .ok_or_else(|| format!("invalid escape in {:?}", component))?;
                decoded.push(hex);
                i += 2;
            }
            b => decoded.push(b),
        }
        i += 1;
    }
    Ok(String::from_utf8_lossy(&decoded).into_owned())
}

/// Check an access token against the provider's validation endpoint.
///
/// The token is sent as an `access_token` query parameter, the form
/// tokeninfo-style endpoints expect. Never fails: an unset endpoint, a transport error or any status other
/// than 200 all mean the token is not valid.
pub async fn validate_token(data: &ProviderData, client: &Client, access_token: &str) -> bool {
    if access_token.is_empty() {
        return false;
    }

    let Some(validate_url) = &data.validate_url else {
        debug!(
            "No validate URL configured for {}, treating token as invalid",
            data.provider_name
        );
        return false;
    };

    let mut endpoint = validate_url.clone();
    endpoint
        .query_pairs_mut()
        .append_pair("access_token", access_token);

    let response = match client.get(endpoint).send().await {
        Ok(response) => response,
        Err(e) => {
            // The request URL carries the token, keep it out of the logs
            error!(
                "Token validation request to {} failed: {}",
                validate_url,
                e.without_url()
            );
            return false;
        }
    };

    let status = response.status();
    if status == StatusCode::OK {
        true
    } else {
        warn!("Token validation against {} returned {}", validate_url, status);
        false
    }
}

/// Run a provider call until it finishes or `token` is cancelled.
///
/// Cancellation drops the in-flight request and yields
/// [`OAuth2Error::Cancelled`]; no partial session is ever returned.
pub async fn cancellable<T, F>(token: &CancellationToken, future: F) -> OAuth2Result<T>
where
    F: Future<Output = OAuth2Result<T>>,
{
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(OAuth2Error::Cancelled),
        result = future => result,
    }
}

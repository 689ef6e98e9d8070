//! Core session types for the OAuth2 proxy.
//!
//! A [`SessionState`] is what every successful authentication produces. The
//! proxy hands it to a [`SessionCodec`] to turn it into a cookie value and
//! back; the providers never look inside the encoded form.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

mod cipher;
mod codec;

pub use cipher::SessionCipher;
pub use codec::CookieSessionCodec;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Session decoding failed: {0}")]
    Decoding(String),

    #[error("Cipher error: {0}")]
    Cipher(String),

    #[error("Invalid cipher key: {0}")]
    InvalidKey(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type CodecResult<T> = Result<T, CodecError>;

/// An authenticated session.
///
/// `access_token` is always set when a provider hands one out; every other
/// field is best-effort and depends on the flow that produced the session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_on: Option<DateTime<Utc>>,
}

impl SessionState {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            ..Self::default()
        }
    }

    /// True once `expires_on` lies in the past. Sessions without an expiry
    /// never expire on their own.
    pub fn is_expired(&self) -> bool {
        self.expires_on.is_some_and(|expires| expires < Utc::now())
    }

    /// Time elapsed since the session was created, if the creation time is known.
    pub fn age(&self) -> Option<Duration> {
        self.created_at.map(|created| Utc::now() - created)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Session{{")?;
        if let Some(email) = &self.email {
            write!(f, "email:{} ", email)?;
        }
        if let Some(user) = &self.user {
            write!(f, "user:{} ", user)?;
        }
        write!(f, "token:{}", !self.access_token.is_empty())?;
        if self.id_token.is_some() {
            write!(f, " id_token:true")?;
        }
        if let Some(created) = self.created_at {
            write!(f, " created:{}", created.to_rfc3339())?;
        }
        if let Some(expires) = self.expires_on {
            write!(f, " expires:{}", expires.to_rfc3339())?;
        }
        if self.refresh_token.is_some() {
            write!(f, " refresh_token:true")?;
        }
        write!(f, "}}")
    }
}

/// Turns a session into a transportable cookie value and back.
///
/// Implementations own their serialization format and any encryption; the
/// value they produce is opaque to everyone else.
pub trait SessionCodec: Send + Sync {
    fn encode(&self, session: &SessionState) -> CodecResult<String>;

    fn decode(&self, value: &str) -> CodecResult<SessionState>;
}

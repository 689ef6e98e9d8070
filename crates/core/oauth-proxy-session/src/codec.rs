//! Cookie codec: JSON session, optionally sealed token fields, base64url framing.

use crate::{CodecError, CodecResult, SessionCipher, SessionCodec, SessionState};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct CookieSessionCodec {
    cipher: Option<Arc<SessionCipher>>,
}

impl CookieSessionCodec {
    /// A codec that stores tokens in the clear. Only suitable when the cookie
    /// layer itself encrypts.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cipher(cipher: SessionCipher) -> Self {
        Self {
            cipher: Some(Arc::new(cipher)),
        }
    }

    fn seal(&self, session: &SessionState) -> CodecResult<SessionState> {
        let Some(cipher) = &self.cipher else {
            return Ok(session.clone());
        };

        Ok(SessionState {
            access_token: cipher.encrypt(&session.access_token)?,
            id_token: session
                .id_token
                .as_deref()
                .map(|t| cipher.encrypt(t))
                .transpose()?,
            refresh_token: session
                .refresh_token
                .as_deref()
                .map(|t| cipher.encrypt(t))
                .transpose()?,
            ..session.clone()
        })
    }

    fn open(&self, mut session: SessionState) -> CodecResult<SessionState> {
        let Some(cipher) = &self.cipher else {
            return Ok(session);
        };

        session.access_token = cipher.decrypt(&session.access_token)?;
        session.id_token = session
            .id_token
            .map(|t| cipher.decrypt(&t))
            .transpose()?;
        session.refresh_token = session
            .refresh_token
            .map(|t| cipher.decrypt(&t))
            .transpose()?;
        Ok(session)
    }
}

impl SessionCodec for CookieSessionCodec {
    fn encode(&self, session: &SessionState) -> CodecResult<String> {
        let sealed = self.seal(session)?;
        let json = serde_json::to_vec(&sealed)?;
        Ok(URL_SAFE_NO_PAD.encode(json))
    }

    fn decode(&self, value: &str) -> CodecResult<SessionState> {
        let json = URL_SAFE_NO_PAD
            .decode(value)
            .map_err(|e| CodecError::Decoding(e.to_string()))?;
        let sealed: SessionState = serde_json::from_slice(&json)?;
        self.open(sealed)
    }
}

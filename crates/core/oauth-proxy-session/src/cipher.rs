//! AES-256-GCM cipher for sealing token fields inside session cookies.

use crate::{CodecError, CodecResult};
use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, AeadCore, KeyInit, OsRng},
};
use base64::{Engine, engine::general_purpose::STANDARD};
use std::fmt;

const NONCE_LEN: usize = 12;

pub struct SessionCipher {
    cipher: Aes256Gcm,
}

impl SessionCipher {
    /// Build a cipher from a raw 32-byte key.
    pub fn new(key: &[u8]) -> CodecResult<Self> {
        let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| {
            CodecError::InvalidKey(format!("expected 32 bytes, got {}", key.len()))
        })?;
        Ok(Self { cipher })
    }

    /// Build a cipher from a base64 encoded 32-byte secret, the form cookie
    /// secrets usually take in configuration.
    pub fn from_base64(secret: &str) -> CodecResult<Self> {
        let key = STANDARD
            .decode(secret.trim())
            .map_err(|e| CodecError::InvalidKey(e.to_string()))?;
        Self::new(&key)
    }

    /// Encrypt a value. The output is `base64(nonce || ciphertext)`.
    pub fn encrypt(&self, plaintext: &str) -> CodecResult<String> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|e| CodecError::Cipher(format!("encryption failed: {}", e)))?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);
        Ok(STANDARD.encode(sealed))
    }

    pub fn decrypt(&self, sealed: &str) -> CodecResult<String> {
        let bytes = STANDARD
            .decode(sealed)
            .map_err(|e| CodecError::Decoding(e.to_string()))?;

        if bytes.len() < NONCE_LEN {
            return Err(CodecError::Cipher("sealed value too short".to_string()));
        }

        let (nonce, ciphertext) = bytes.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|e| CodecError::Cipher(format!("decryption failed: {}", e)))?;

        String::from_utf8(plaintext).map_err(|e| CodecError::Decoding(e.to_string()))
    }
}

impl fmt::Debug for SessionCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionCipher").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encrypt_decrypt() {
        let cipher = SessionCipher::new(&[7u8; 32]).unwrap();

        let sealed = cipher.encrypt("access-token").unwrap();
        assert_ne!(sealed, "access-token");
        assert_eq!(cipher.decrypt(&sealed).unwrap(), "access-token");

        // Fresh nonce per call
        let sealed_again = cipher.encrypt("access-token").unwrap();
        assert_ne!(sealed, sealed_again);
    }

    #[test]
    fn test_invalid_key_length() {
        let result = SessionCipher::new(&[1u8; 16]);
        assert!(matches!(result, Err(CodecError::InvalidKey(_))));
    }

    #[test]
    fn test_from_base64() {
        let secret = STANDARD.encode([3u8; 32]);
        let cipher = SessionCipher::from_base64(&secret).unwrap();
        let sealed = cipher.encrypt("value").unwrap();
        assert_eq!(cipher.decrypt(&sealed).unwrap(), "value");

        assert!(SessionCipher::from_base64("not base64!").is_err());
    }

    #[test]
    fn test_wrong_key_fails() {
        let cipher = SessionCipher::new(&[1u8; 32]).unwrap();
        let other = SessionCipher::new(&[2u8; 32]).unwrap();

        let sealed = cipher.encrypt("value").unwrap();
        assert!(matches!(other.decrypt(&sealed), Err(CodecError::Cipher(_))));
    }

    #[test]
    fn test_truncated_value() {
        let cipher = SessionCipher::new(&[1u8; 32]).unwrap();
        let short = STANDARD.encode([0u8; 4]);
        assert!(matches!(cipher.decrypt(&short), Err(CodecError::Cipher(_))));
    }
}

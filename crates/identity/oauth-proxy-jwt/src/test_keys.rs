//! Key material and token minting shared by the verifier tests.

use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use serde_json::{Value, json};

pub const RSA_PRIVATE_PEM: &str = include_str!("../tests/fixtures/rsa_private.pem");
pub const RSA_PUBLIC_PEM: &str = include_str!("../tests/fixtures/rsa_public.pem");
const RSA_MODULUS: &str = include_str!("../tests/fixtures/rsa_modulus.b64url");

pub const ISSUER: &str = "https://issuer.example.com";
pub const AUDIENCE: &str = "proxy-client";

pub fn claims(subject: &str) -> Value {
    let now = chrono::Utc::now().timestamp();
    json!({
        "iss": ISSUER,
        "aud": AUDIENCE,
        "sub": subject,
        "iat": now,
        "exp": now + 3600,
    })
}

pub fn sign_rs256(claims: &Value, kid: Option<&str>) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = kid.map(String::from);
    let key = EncodingKey::from_rsa_pem(RSA_PRIVATE_PEM.as_bytes()).unwrap();
    encode(&header, claims, &key).unwrap()
}

pub fn sign_hs256(claims: &Value, secret: &[u8]) -> String {
    encode(
        &Header::new(Algorithm::HS256),
        claims,
        &EncodingKey::from_secret(secret),
    )
    .unwrap()
}

pub fn rsa_jwk(kid: &str) -> Value {
    rsa_jwk_with_modulus(kid, RSA_MODULUS.trim().to_string())
}

/// A well-formed RSA key of the same size that signed nothing here.
pub fn foreign_rsa_jwk(kid: &str) -> Value {
    let mut modulus: Vec<char> = RSA_MODULUS.trim().chars().collect();
    modulus[10] = if modulus[10] == 'A' { 'B' } else { 'A' };
    rsa_jwk_with_modulus(kid, modulus.into_iter().collect())
}

fn rsa_jwk_with_modulus(kid: &str, modulus: String) -> Value {
    json!({
        "kty": "RSA",
        "kid": kid,
        "use": "sig",
        "alg": "RS256",
        "n": modulus,
        "e": "AQAB"
    })
}

pub fn jwks_document(kid: &str) -> Value {
    json!({ "keys": [rsa_jwk(kid)] })
}

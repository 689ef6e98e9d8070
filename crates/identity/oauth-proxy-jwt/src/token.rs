//! Verified token payloads.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde_json::Value;

/// A token whose signature and registered claims have been checked.
///
/// The standard claims are lifted out for convenience; anything else is read
/// with [`VerifiedToken::claims`], which can still fail if the payload does
/// not have the shape the caller expects.
#[derive(Debug, Clone)]
pub struct VerifiedToken {
    pub issuer: String,
    pub subject: String,
    pub audience: Vec<String>,
    pub expiry: Option<DateTime<Utc>>,
    pub issued_at: Option<DateTime<Utc>>,
    payload: Value,
}

impl VerifiedToken {
    pub fn from_payload(payload: Value) -> Self {
        let issuer = string_claim(&payload, "iss");
        let subject = string_claim(&payload, "sub");
        let audience = match payload.get("aud") {
            Some(Value::String(aud)) => vec![aud.clone()],
            Some(Value::Array(values)) => values
                .iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect(),
            _ => Vec::new(),
        };
        let expiry = timestamp_claim(&payload, "exp");
        let issued_at = timestamp_claim(&payload, "iat");

        Self {
            issuer,
            subject,
            audience,
            expiry,
            issued_at,
            payload,
        }
    }

    /// Decode the payload into a caller-defined claims type.
    pub fn claims<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.payload.clone())
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }
}

fn string_claim(payload: &Value, name: &str) -> String {
    payload
        .get(name)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn timestamp_claim(payload: &Value, name: &str) -> Option<DateTime<Utc>> {
    let value = payload.get(name)?;
    let seconds = value
        .as_i64()
        .or_else(|| value.as_f64().map(|f| f as i64))?;
    DateTime::<Utc>::from_timestamp(seconds, 0)
}

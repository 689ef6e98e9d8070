//! OAuth2 protocol types.

use serde::{Deserialize, Serialize};

/// A decoded token endpoint response body.
///
/// Token endpoints answer with either JSON or form-encoded bodies, often
/// without a reliable content type, so the body is classified by which
/// parser accepted it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenBody {
    /// The body was JSON. The token may be empty.
    Json { access_token: String },
    /// The body was form-encoded. `None` when no `access_token` pair was present.
    Form { access_token: Option<String> },
}

/// Claims read from a verified bearer token.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BearerClaims {
    #[serde(rename = "sub", default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub email_verified: Option<bool>,
}

impl BearerClaims {
    /// The email claim, falling back to the subject when it is empty.
    pub fn resolved_email(&self) -> String {
        self.email
            .as_deref()
            .filter(|email| !email.is_empty())
            .or(self.subject.as_deref())
            .unwrap_or_default()
            .to_string()
    }

    /// Only an explicit `false` counts as unverified; a missing claim does not.
    pub fn is_explicitly_unverified(&self) -> bool {
        self.email_verified == Some(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_email_falls_back_to_subject() {
        let claims: BearerClaims = serde_json::from_value(json!({ "sub": "user-1" })).unwrap();
        assert_eq!(claims.resolved_email(), "user-1");

        let claims: BearerClaims =
            serde_json::from_value(json!({ "sub": "user-1", "email": "" })).unwrap();
        assert_eq!(claims.resolved_email(), "user-1");

        let claims: BearerClaims =
            serde_json::from_value(json!({ "sub": "user-1", "email": "a@example.com" })).unwrap();
        assert_eq!(claims.resolved_email(), "a@example.com");
    }

    #[test]
    fn test_null_claims_are_tolerated() {
        let claims: BearerClaims = serde_json::from_value(json!({
            "sub": null,
            "email": null,
            "email_verified": null
        }))
        .unwrap();
        assert_eq!(claims.resolved_email(), "");
        assert!(!claims.is_explicitly_unverified());
    }

    #[test]
    fn test_verification_flag() {
        let claims: BearerClaims =
            serde_json::from_value(json!({ "email_verified": false })).unwrap();
        assert!(claims.is_explicitly_unverified());

        let claims: BearerClaims = serde_json::from_value(json!({ "email_verified": true })).unwrap();
        assert!(!claims.is_explicitly_unverified());
    }

    #[test]
    fn test_wrong_claim_types_fail() {
        let result = serde_json::from_value::<BearerClaims>(json!({ "email_verified": "yes" }));
        assert!(result.is_err());
    }
}

//! Typed access-token claims

use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

use crate::error::AuthError;

/// Dashboard role carried in the access token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    User,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::User => "user",
        }
    }

    /// Route a freshly signed-in user lands on when no other location was requested
    pub fn landing_path(&self) -> &'static str {
        match self {
            Self::Admin => "/admin/dashboard",
            Self::User => "/dashboard",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Claims decoded from an access token
///
/// Only `role`, `id` and `exp` are interpreted. Anything else the backend puts
/// in the payload is kept untouched in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    pub role: Role,

    /// Subject identifier; numeric ids are normalized to their decimal string
    #[serde(deserialize_with = "subject_id")]
    pub id: String,

    /// Expiry in seconds since the unix epoch
    pub exp: i64,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Claims {
    /// Decode the payload of `token` without verifying its signature.
    ///
    /// Signature trust stays with the backend, which checks the token on every
    /// API call.
    pub fn decode(token: &str) -> Result<Self, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.insecure_disable_signature_validation();
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        jsonwebtoken::decode::<Claims>(token, &DecodingKey::from_secret(&[]), &validation)
            .map(|data| data.claims)
            .map_err(|err| AuthError::MalformedToken(err.to_string()))
    }

    /// Whether the token is expired at `now`, treating anything within `margin_secs`
    /// of expiry as already expired
    pub fn is_expired_at(&self, now: i64, margin_secs: i64) -> bool {
        now.saturating_add(margin_secs) >= self.exp
    }

    pub fn is_expired(&self, margin_secs: i64) -> bool {
        self.is_expired_at(Utc::now().timestamp(), margin_secs)
    }
}

fn subject_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Subject {
        Text(String),
        Number(i64),
    }

    Ok(match Subject::deserialize(deserializer)? {
        Subject::Text(id) => id,
        Subject::Number(id) => id.to_string(),
    })
}

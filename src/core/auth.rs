//! Signed-in session

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::domain::User;

#[derive(Debug, Clone)]
pub struct AuthSession {
    pub token: String,
    pub user: Option<User>,
    /// From the token's `exp` claim, when it has one
    pub expires_at: Option<DateTime<Utc>>,
}

impl AuthSession {
    pub fn new(token: impl Into<String>, user: Option<User>) -> Self {
        let token = token.into();
        let expires_at = token_expiry(&token);
        Self {
            token,
            user,
            expires_at,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|at| at <= now).unwrap_or(false)
    }
}

/// Read `exp` from a JWT payload without verifying the signature
pub fn token_expiry(token: &str) -> Option<DateTime<Utc>> {
    let payload = token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    let claims: Value = serde_json::from_slice(&bytes).ok()?;
    let exp = claims.get("exp")?.as_i64()?;
    DateTime::from_timestamp(exp, 0)
}

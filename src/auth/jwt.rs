//! Bearer tokens for API callers.
//!
//! HS256 with a shared secret. Claims carry the user id as `sub` plus
//! `iat`/`exp`; validation uses zero leeway so a token is dead the second
//! it expires.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use super::AuthError;

/// Minimum accepted secret length.
pub const MIN_SECRET_LEN: usize = 32;

const DEV_SECRET: &str = "orion-dev-mode-secret-not-for-production-use";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id, as a decimal string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    pub iat: u64,
    pub exp: u64,
}

/// Issues and verifies access tokens.
#[derive(Clone)]
pub struct TokenService {
    secret: String,
    ttl: Duration,
}

impl std::fmt::Debug for TokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenService")
            .field("secret", &"<redacted>")
            .field("ttl", &self.ttl)
            .finish()
    }
}

fn unix_now() -> Result<u64, AuthError> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .map_err(|e| AuthError::Config(format!("System time error: {}", e)))
}

impl TokenService {
    pub fn new(secret: impl Into<String>, ttl: Duration) -> Result<Self, AuthError> {
        let secret = secret.into();
        if secret.is_empty() {
            return Err(AuthError::Config("JWT_SECRET is required".into()));
        }
        if secret.len() < MIN_SECRET_LEN {
            return Err(AuthError::Config(format!(
                "JWT_SECRET must be at least {} characters",
                MIN_SECRET_LEN
            )));
        }
        Ok(Self { secret, ttl })
    }

    /// Fixed-secret service for local development.
    pub fn new_dev(ttl: Duration) -> Self {
        Self {
            secret: DEV_SECRET.into(),
            ttl,
        }
    }

    pub fn issue(&self, user_id: i64) -> Result<String, AuthError> {
        self.issue_at(user_id, unix_now()?)
    }

    fn issue_at(&self, user_id: i64, issued_at: u64) -> Result<String, AuthError> {
        let exp = issued_at
            .checked_add(self.ttl.as_secs())
            .ok_or_else(|| AuthError::Config("Token lifetime overflows the clock".into()))?;
        let claims = Claims {
            sub: Some(user_id.to_string()),
            iat: issued_at,
            exp,
        };
        self.encode(&claims)
    }

    fn encode(&self, claims: &Claims) -> Result<String, AuthError> {
        encode(
            &Header::new(Algorithm::HS256),
            claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| AuthError::InvalidToken(format!("Failed to sign token: {}", e)))
    }

    /// Verify signature and expiry, returning the subject user id.
    pub fn verify(&self, token: &str) -> Result<i64, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        let data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &validation,
        )
        .map_err(|err| match err.kind() {
            ErrorKind::ExpiredSignature => AuthError::Expired,
            ErrorKind::InvalidSignature => AuthError::InvalidToken("Invalid signature".into()),
            _ => AuthError::InvalidToken("Token validation failed".into()),
        })?;

        let sub = data.claims.sub.ok_or(AuthError::MissingSubject)?;
        sub.parse::<i64>()
            .map_err(|_| AuthError::InvalidToken("Subject is not a user id".into()))
    }
}

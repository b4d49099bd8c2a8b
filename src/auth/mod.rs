//! Credential layer: password hashing, bearer tokens, and the request
//! extractor that turns an `Authorization` header into a user.

pub mod jwt;
pub mod password;

pub use jwt::{Claims, TokenService};
pub use password::{hash_password, verify_password};

use std::sync::Arc;

use axum::extract::{FromRef, FromRequestParts};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use thiserror::Error;
use tracing::debug;

use crate::studio::api::ApiError;
use crate::studio::db::DbHandle;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Token expired")]
    Expired,

    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("Token has no subject")]
    MissingSubject,

    #[error("{0}")]
    Hashing(String),

    #[error("Auth configuration error: {0}")]
    Config(String),
}

/// Pull the token out of an `Authorization: Bearer <token>` header. The
/// scheme is matched case-insensitively.
pub fn extract_bearer(header: Option<&str>) -> Option<&str> {
    let (scheme, token) = header?.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

/// What the `AuthUser` extractor needs from application state.
#[derive(Clone)]
pub struct AuthContext {
    pub tokens: Arc<TokenService>,
    pub db: DbHandle,
}

/// The authenticated caller.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: i64,
}

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    AuthContext: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let ctx = AuthContext::from_ref(state);

        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok());
        let token = extract_bearer(header)
            .ok_or_else(|| ApiError::Unauthorized("Not authenticated".into()))?;

        let user_id = ctx.tokens.verify(token).map_err(|e| {
            debug!(error = %e, "Rejected bearer token");
            ApiError::Unauthorized("Could not validate credentials".into())
        })?;

        let user = ctx
            .db
            .call(move |db| db.get_user(user_id))
            .await
            .map_err(|e| ApiError::Internal(e.to_string()))?
            .ok_or_else(|| ApiError::Unauthorized("Could not validate credentials".into()))?;

        Ok(AuthUser { id: user.id })
    }
}

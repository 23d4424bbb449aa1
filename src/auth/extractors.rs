use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts},
};
use tracing::warn;
use uuid::Uuid;

use super::{
    claims::{Claims, Role, TokenKind},
    jwt::{JwtKeys, TokenError},
};
use crate::{dietologists::repo::Dietologist, error::ApiError, state::AppState};

/// Authenticated end user, identified by the `sub` of an access token.
pub struct AuthUser(pub Uuid);

/// Authenticated, active dietologist loaded from the database.
pub struct AuthDietologist(pub Dietologist);

fn bearer_token(parts: &Parts) -> Result<&str, ApiError> {
    let header = parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| {
            ApiError::unauthorized(
                "not_authenticated",
                "Authentication credentials were not provided.",
            )
        })?;

    header
        .strip_prefix("Bearer ")
        .or_else(|| header.strip_prefix("bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ApiError::unauthorized("invalid_token", "Invalid authorization header"))
}

fn access_claims(parts: &Parts, keys: &JwtKeys) -> Result<Claims, ApiError> {
    let token = bearer_token(parts)?;
    keys.verify_kind(token, TokenKind::Access).map_err(|e| match e {
        TokenError::Expired => {
            ApiError::forbidden("expired_access_token", "Access token has expired")
        }
        other => {
            warn!(error = %other, "access token rejected");
            ApiError::unauthorized("invalid_token", "Invalid token")
        }
    })
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    JwtKeys: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let keys = JwtKeys::from_ref(state);
        let claims = access_claims(parts, &keys)?;
        if claims.role != Role::User {
            return Err(ApiError::forbidden("forbidden", "User access required"));
        }
        Ok(AuthUser(claims.sub))
    }
}

#[async_trait]
impl FromRequestParts<AppState> for AuthDietologist {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let keys = JwtKeys::from_ref(state);
        let claims = access_claims(parts, &keys)?;
        if claims.role != Role::Dietologist {
            return Err(ApiError::unauthorized("not_authenticated", "Unauthorized"));
        }
        let dietologist = Dietologist::find_active(&state.db, claims.sub)
            .await?
            .ok_or_else(|| ApiError::unauthorized("not_authenticated", "Unauthorized"))?;
        Ok(AuthDietologist(dietologist))
    }
}

use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts},
    middleware::Next,
    response::Response,
};
use service_core::error::AppError;
use uuid::Uuid;

use crate::{
    services::{AccessTokenClaims, AuthError},
    AppState,
};

fn bearer_token(req: &Request) -> Option<&str> {
    req.headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Middleware to require authentication.
///
/// Besides signature and lifetime, the token's security stamp must match the
/// user's current stamp, so logout and revoke-all cut off outstanding access
/// tokens.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let claims = bearer_token(&req)
        .and_then(|token| state.tokens.validate_access_token(token))
        .ok_or(AuthError::Unauthorized)?;

    let user_id = claims.user_id().ok_or(AuthError::Unauthorized)?;

    let user = state
        .users
        .find_by_id(user_id)
        .await
        .map_err(AuthError::from)?
        .ok_or(AuthError::Unauthorized)?;

    if !user.is_active || user.security_stamp != claims.security_stamp {
        tracing::debug!(user_id = %user_id, "Access token no longer matches account state");
        return Err(AuthError::Unauthorized.into());
    }

    // Store claims in request extensions so handlers can access them
    req.extensions_mut().insert(claims);

    Ok(next.run(req).await)
}

/// Extractor to easily get claims in handlers
#[derive(Debug, Clone)]
pub struct AuthUser(pub AccessTokenClaims);

impl AuthUser {
    pub fn id(&self) -> Result<Uuid, AppError> {
        self.0.user_id().ok_or_else(|| AuthError::Unauthorized.into())
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let claims = parts
            .extensions
            .get::<AccessTokenClaims>()
            .ok_or(AuthError::Unauthorized)?;

        Ok(AuthUser(claims.clone()))
    }
}

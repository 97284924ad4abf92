use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use tracing::warn;

use crate::auth::dto::PublicUser;
use crate::auth::jwt::{JwtKeys, TokenPurpose};
use crate::auth::repo::{User, UserRole};
use crate::error::AppError;
use crate::state::AppState;

/// Access guard: resolves the bearer token into the current user.
///
/// Verification only accepts `access`-purpose tokens; confirmation and reset
/// tokens are rejected here. The user is resolved through the read-through
/// cache, falling back to the database on a miss.
pub struct AuthUser(pub PublicUser);

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AppError::Unauthorized("Missing Authorization header".into()))?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .or_else(|| auth_header.strip_prefix("bearer "))
            .ok_or_else(|| AppError::Unauthorized("Invalid Authorization header".into()))?;

        let keys = JwtKeys::from_ref(state);
        let claims = keys.verify(token, TokenPurpose::Access).map_err(|e| {
            warn!(error = %e, "access token rejected");
            AppError::Unauthorized("Invalid or expired token".into())
        })?;

        if let Some(user) = state.cache.get(claims.sub).await {
            return Ok(AuthUser(user));
        }

        let user = User::find_by_id(&state.db, claims.sub)
            .await?
            .ok_or_else(|| AppError::Unauthorized("User not found".into()))?;

        let public = PublicUser::from(&user);
        state.cache.put(&public).await;
        Ok(AuthUser(public))
    }
}

/// Role gate on top of [`AuthUser`]: a valid identity without the admin role
/// is a 403, distinct from the 401 for a missing or bad token.
pub struct AdminUser(pub PublicUser);

#[async_trait]
impl FromRequestParts<AppState> for AdminUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let AuthUser(user) = AuthUser::from_request_parts(parts, state).await?;
        if user.role != UserRole::Admin {
            warn!(user_id = %user.id, "admin endpoint called without admin role");
            return Err(AppError::Forbidden(
                "Administrator rights are required to perform this operation".into(),
            ));
        }
        Ok(AdminUser(user))
    }
}

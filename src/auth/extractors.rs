use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use axum_extra::extract::cookie::CookieJar;
use tracing::warn;

use crate::auth::repo::{User, UserRole};
use crate::auth::session::{SessionKeys, SESSION_COOKIE};
use crate::error::AppError;
use crate::state::AppState;

/// Authentication gate. Pulls the session token from the cookie (falling
/// back to a bearer header), verifies it, and re-fetches the identity from
/// the credential store; the token is trusted for the user id only.
pub struct CurrentUser(pub User);

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);
        let token = jar
            .get(SESSION_COOKIE)
            .map(|c| c.value().to_string())
            .or_else(|| {
                parts
                    .headers
                    .get(axum::http::header::AUTHORIZATION)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.strip_prefix("Bearer "))
                    .map(str::to_string)
            })
            .ok_or_else(|| {
                AppError::Unauthorized("Login first to access this resource".into())
            })?;

        let keys = SessionKeys::from_ref(state);
        let user_id = keys.verify(&token).map_err(|e| {
            warn!(error = %e, "session token rejected");
            AppError::Unauthorized("Invalid or expired session".into())
        })?;

        // The user may have been deleted since the token was issued.
        let user = User::find_by_id(&state.db, user_id)
            .await?
            .ok_or_else(|| AppError::Unauthorized("User no longer exists".into()))?;

        Ok(CurrentUser(user))
    }
}

/// Authorization check: the identity's role must be in the allowed set.
pub fn authorize(user: &User, allowed: &[UserRole]) -> Result<(), AppError> {
    if allowed.contains(&user.role) {
        return Ok(());
    }
    Err(AppError::Forbidden(format!(
        "Role ({}) is not allowed to access this resource",
        user.role
    )))
}

/// Authentication plus Admin-role authorization, in that order.
pub struct AdminUser(pub User);

#[async_trait]
impl FromRequestParts<AppState> for AdminUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let CurrentUser(user) = CurrentUser::from_request_parts(parts, state).await?;
        authorize(&user, &[UserRole::Admin])?;
        Ok(AdminUser(user))
    }
}

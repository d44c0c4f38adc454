use axum::{
    extract::{FromRef, Path, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use axum_extra::extract::cookie::CookieJar;
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::auth::{
    avatar,
    dto::{
        AuthResponse, ForgotPasswordRequest, LoginRequest, MessageResponse, RegisterRequest,
        ResetPasswordRequest, UpdatePasswordRequest, UpdateProfileRequest,
    },
    extractors::CurrentUser,
    password::verify_password,
    repo::{NewUser, ProfileChanges, User},
    reset,
    session::SessionKeys,
};
use crate::error::{AppError, Result};
use crate::state::AppState;

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/logout", get(logout))
        .route("/password/forgot", post(forgot_password))
        .route("/password/reset/:token", put(reset_password))
}

pub fn me_routes() -> Router<AppState> {
    Router::new()
        .route("/me", get(get_me))
        .route("/me/update", put(update_me))
        .route("/password/update", put(update_password))
}

const MIN_PASSWORD_LEN: usize = 6;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

fn check_password_strength(password: &str) -> Result<()> {
    if password.len() < MIN_PASSWORD_LEN {
        return Err(AppError::Validation(
            "Your password must be at least 6 characters".into(),
        ));
    }
    Ok(())
}

/// Issue a session token and attach it as an HTTP-only cookie.
fn start_session(state: &AppState, jar: CookieJar, user_id: Uuid) -> Result<(CookieJar, String)> {
    let keys = SessionKeys::from_ref(state);
    let token = keys.issue(user_id)?;
    let jar = jar.add(keys.session_cookie(token.clone()));
    Ok((jar, token))
}

#[instrument(skip(state, jar, payload))]
pub async fn register(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, CookieJar, Json<AuthResponse>)> {
    let username = payload.username.trim().to_string();
    let email = payload.email.trim().to_lowercase();

    if username.is_empty() || email.is_empty() || payload.password.is_empty() {
        return Err(AppError::Validation(
            "Please provide all required fields".into(),
        ));
    }
    if !is_valid_email(&email) {
        warn!(email = %email, "invalid email");
        return Err(AppError::Validation(
            "Please enter a valid email address".into(),
        ));
    }
    check_password_strength(&payload.password)?;

    let new = NewUser {
        username: &username,
        email: &email,
        first_name: payload.first_name.as_deref(),
        last_name: payload.last_name.as_deref(),
        role: payload.role.unwrap_or_default(),
    };
    let user = User::create(&state.db, &new, &payload.password).await?;

    info!(user_id = %user.id, username = %user.username, "user registered");
    let (jar, token) = start_session(&state, jar, user.id)?;
    Ok((StatusCode::CREATED, jar, Json(AuthResponse { token, user })))
}

#[instrument(skip(state, jar, payload))]
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(payload): Json<LoginRequest>,
) -> Result<(CookieJar, Json<AuthResponse>)> {
    if payload.username.is_empty() || payload.password.is_empty() {
        return Err(AppError::Validation(
            "Please enter username and password".into(),
        ));
    }

    // Unknown username and wrong password produce the same response.
    let user = match User::find_by_username(&state.db, payload.username.trim()).await? {
        Some(u) => u,
        None => {
            warn!(username = %payload.username, "login unknown username");
            return Err(AppError::Unauthorized(
                "Incorrect username or password".into(),
            ));
        }
    };

    if !verify_password(&payload.password, &user.password_hash)? {
        warn!(user_id = %user.id, "login invalid password");
        return Err(AppError::Unauthorized(
            "Incorrect username or password".into(),
        ));
    }

    info!(user_id = %user.id, username = %user.username, "user logged in");
    let (jar, token) = start_session(&state, jar, user.id)?;
    Ok((jar, Json(AuthResponse { token, user })))
}

/// Replaces the session cookie with an already-expired one. Tokens are not
/// tracked server-side, so a previously issued token stays valid until its
/// natural expiry.
#[instrument(skip(jar))]
pub async fn logout(jar: CookieJar) -> (CookieJar, Json<MessageResponse>) {
    (
        jar.add(SessionKeys::expired_cookie()),
        Json(MessageResponse {
            message: "Logged out successfully".into(),
        }),
    )
}

#[instrument(skip(state, payload))]
pub async fn forgot_password(
    State(state): State<AppState>,
    Json(payload): Json<ForgotPasswordRequest>,
) -> Result<Json<MessageResponse>> {
    let email = payload.email.trim().to_lowercase();
    let user = User::find_by_email(&state.db, &email)
        .await?
        .ok_or_else(|| AppError::NotFound("No account found with this email".into()))?;

    let token = reset::generate();
    User::set_reset_token(&state.db, user.id, &token.token_hash, token.expires_at).await?;

    let reset_url = format!(
        "{}/password/reset/{}",
        state.config.frontend_url.trim_end_matches('/'),
        token.secret
    );
    let body = format!(
        "Your password reset token is as follows:\n\n{}\n\n\
         If you have not requested this email, then ignore it.",
        reset_url
    );

    match state
        .mailer
        .send(&user.email, "Loadlink Password Recovery", &body)
        .await
    {
        Ok(()) => {
            info!(user_id = %user.id, "reset password email sent");
            Ok(Json(MessageResponse {
                message: format!("Reset password email sent to: {}", user.email),
            }))
        }
        Err(e) => {
            // Never leave a valid reset token the user was not told about.
            error!(error = %e, user_id = %user.id, "reset email dispatch failed");
            User::clear_reset_token(&state.db, user.id).await?;
            Err(AppError::Internal(e))
        }
    }
}

#[instrument(skip_all)]
pub async fn reset_password(
    State(state): State<AppState>,
    jar: CookieJar,
    Path(token): Path<String>,
    Json(payload): Json<ResetPasswordRequest>,
) -> Result<(CookieJar, Json<AuthResponse>)> {
    let token_hash = reset::hash_secret(&token);
    let user = User::find_by_reset_token(&state.db, &token_hash)
        .await?
        .ok_or(AppError::InvalidOrExpired)?;

    if payload.password != payload.confirm_password {
        return Err(AppError::Validation("Password does not match".into()));
    }
    check_password_strength(&payload.password)?;

    // Sets the new hash and consumes the reset token in one statement.
    let user = User::set_password(&state.db, user.id, &payload.password).await?;

    info!(user_id = %user.id, "password reset completed");
    let (jar, token) = start_session(&state, jar, user.id)?;
    Ok((jar, Json(AuthResponse { token, user })))
}

#[instrument(skip_all)]
pub async fn get_me(CurrentUser(user): CurrentUser) -> Json<User> {
    Json(user)
}

#[instrument(skip_all)]
pub async fn update_password(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    jar: CookieJar,
    Json(payload): Json<UpdatePasswordRequest>,
) -> Result<(CookieJar, Json<AuthResponse>)> {
    if !verify_password(&payload.old_password, &user.password_hash)? {
        return Err(AppError::Unauthorized("Old password is incorrect".into()));
    }
    if verify_password(&payload.new_password, &user.password_hash)? {
        return Err(AppError::Validation(
            "New password should not be closely related to the old one".into(),
        ));
    }
    check_password_strength(&payload.new_password)?;

    let user = User::set_password(&state.db, user.id, &payload.new_password).await?;

    info!(user_id = %user.id, "password updated");
    let (jar, token) = start_session(&state, jar, user.id)?;
    Ok((jar, Json(AuthResponse { token, user })))
}

#[instrument(skip_all)]
pub async fn update_me(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(payload): Json<UpdateProfileRequest>,
) -> Result<Json<User>> {
    let email = payload
        .email
        .as_deref()
        .map(|e| e.trim().to_lowercase());
    if let Some(e) = &email {
        if !is_valid_email(e) {
            return Err(AppError::Validation(
                "Please enter a valid email address".into(),
            ));
        }
    }

    if let Some(data) = payload.avatar.as_deref().filter(|s| !s.is_empty()) {
        let new_avatar = avatar::replace(&state, &user, data).await?;
        User::set_avatar(&state.db, user.id, &new_avatar.id, &new_avatar.url).await?;
    }

    let changes = ProfileChanges {
        first_name: payload.first_name.as_deref(),
        last_name: payload.last_name.as_deref(),
        username: payload.username.as_deref(),
        email: email.as_deref(),
        role: None,
    };
    let updated = User::update_profile(&state.db, user.id, &changes).await?;

    info!(user_id = %updated.id, "profile updated");
    Ok(Json(updated))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_validation_accepts_reasonable_addresses() {
        assert!(is_valid_email("dispatch@loadlink.io"));
        assert!(is_valid_email("a.b+c@d.example.org"));
    }

    #[test]
    fn email_validation_rejects_garbage() {
        assert!(!is_valid_email("not-an-email"));
        assert!(!is_valid_email("two@at@signs.com"));
        assert!(!is_valid_email("spaces in@address.com"));
        assert!(!is_valid_email("missing@tld"));
    }

    #[test]
    fn short_passwords_are_rejected() {
        assert!(check_password_strength("five5").is_err());
        assert!(check_password_strength("six6ok").is_ok());
    }

    #[test]
    fn auth_response_carries_token_but_no_hash() {
        let user = crate::auth::repo::User {
            id: uuid::Uuid::new_v4(),
            username: "dana".into(),
            email: "dana@example.com".into(),
            first_name: None,
            last_name: None,
            password_hash: "$argon2id$hidden".into(),
            role: crate::auth::repo::UserRole::Shipper,
            avatar_id: None,
            avatar_url: None,
            reset_token_hash: None,
            reset_expires: None,
            created_at: time::OffsetDateTime::now_utc(),
        };
        let json = serde_json::to_string(&AuthResponse {
            token: "jwt-goes-here".into(),
            user,
        })
        .unwrap();
        assert!(json.contains("jwt-goes-here"));
        assert!(json.contains("dana@example.com"));
        assert!(!json.contains("argon2id"));
    }
}

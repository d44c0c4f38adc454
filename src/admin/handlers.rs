use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::admin::dto::AdminUpdateRequest;
use crate::auth::{
    avatar,
    extractors::AdminUser,
    handlers::is_valid_email,
    repo::{ProfileChanges, User},
};
use crate::error::{AppError, Result};
use crate::state::AppState;

pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/admin/users", get(list_users))
        .route(
            "/admin/user/:id",
            get(get_user).put(update_user).delete(delete_user),
        )
}

#[instrument(skip(state, _admin))]
pub async fn list_users(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> Result<Json<Vec<User>>> {
    let users = User::list(&state.db).await?;
    Ok(Json(users))
}

#[instrument(skip(state, _admin))]
pub async fn get_user(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
) -> Result<Json<User>> {
    let user = User::find_by_id(&state.db, id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User not found with id: {}", id)))?;
    Ok(Json(user))
}

#[instrument(skip(state, admin, payload))]
pub async fn update_user(
    State(state): State<AppState>,
    admin: AdminUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<AdminUpdateRequest>,
) -> Result<Json<User>> {
    let email = payload.email.as_deref().map(|e| e.trim().to_lowercase());
    if let Some(e) = &email {
        if !is_valid_email(e) {
            return Err(AppError::Validation(
                "Please enter a valid email address".into(),
            ));
        }
    }

    let changes = ProfileChanges {
        first_name: payload.first_name.as_deref(),
        last_name: payload.last_name.as_deref(),
        username: payload.username.as_deref(),
        email: email.as_deref(),
        role: payload.role,
    };
    let updated = User::update_profile(&state.db, id, &changes).await?;

    info!(admin_id = %admin.0.id, user_id = %updated.id, "admin updated user");
    Ok(Json(updated))
}

/// Destroys the record and its externally stored avatar. The avatar goes
/// first so a storage failure surfaces before the row disappears.
#[instrument(skip(state, admin))]
pub async fn delete_user(
    State(state): State<AppState>,
    admin: AdminUser,
    Path(id): Path<Uuid>,
) -> Result<Json<crate::auth::dto::MessageResponse>> {
    let user = User::find_by_id(&state.db, id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User not found with id: {}", id)))?;

    avatar::remove(&state, &user).await?;
    User::delete(&state.db, id).await?;

    info!(admin_id = %admin.0.id, user_id = %id, "admin deleted user");
    Ok(Json(crate::auth::dto::MessageResponse {
        message: "User deleted successfully".into(),
    }))
}

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use lazy_static::lazy_static;
use serde::Serialize;
use tracing::error;

lazy_static! {
    /// Development posture exposes failure detail in 500 responses.
    static ref EXPOSE_DETAIL: bool = std::env::var("APP_ENV")
        .map(|v| v.eq_ignore_ascii_case("development"))
        .unwrap_or(false);
}

/// Domain error type, converted to an HTTP response at the boundary.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Invalid or expired reset password token")]
    InvalidOrExpired,

    #[error("database error")]
    Database(#[source] sqlx::Error),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// JSON error body sent to the client.
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => AppError::NotFound("User not found".into()),
            sqlx::Error::Database(db) if db.code().as_deref() == Some("23505") => {
                // unique_violation on username or email
                let field = if db.message().contains("email") {
                    "email"
                } else {
                    "username"
                };
                AppError::Conflict(format!("Duplicate {} entered", field))
            }
            _ => AppError::Database(err),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, slug, details) = match &self {
            AppError::Validation(msg) => {
                (StatusCode::BAD_REQUEST, "validation_error", Some(msg.clone()))
            }
            AppError::Unauthorized(msg) => {
                (StatusCode::UNAUTHORIZED, "unauthorized", Some(msg.clone()))
            }
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, "forbidden", Some(msg.clone())),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", Some(msg.clone())),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", Some(msg.clone())),
            AppError::InvalidOrExpired => (
                StatusCode::BAD_REQUEST,
                "invalid_or_expired_token",
                Some(self.to_string()),
            ),
            AppError::Database(err) => {
                error!(error = %err, "database error");
                let details = EXPOSE_DETAIL.then(|| err.to_string());
                (StatusCode::INTERNAL_SERVER_ERROR, "database_error", details)
            }
            AppError::Internal(err) => {
                error!(error = %err, "internal server error");
                let details = EXPOSE_DETAIL.then(|| err.to_string());
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", details)
            }
        };

        let body = ErrorResponse {
            error: slug.to_string(),
            details,
        };
        (status, Json(body)).into_response()
    }
}

/// Result alias for handlers.
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn taxonomy_maps_to_expected_status_codes() {
        let cases = [
            (AppError::Validation("bad".into()), StatusCode::BAD_REQUEST),
            (
                AppError::Unauthorized("no".into()),
                StatusCode::UNAUTHORIZED,
            ),
            (AppError::Forbidden("role".into()), StatusCode::FORBIDDEN),
            (AppError::NotFound("gone".into()), StatusCode::NOT_FOUND),
            (AppError::Conflict("dup".into()), StatusCode::CONFLICT),
            (AppError::InvalidOrExpired, StatusCode::BAD_REQUEST),
            (
                AppError::Internal(anyhow::anyhow!("boom")),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, expected) in cases {
            assert_eq!(err.into_response().status(), expected);
        }
    }

    #[test]
    fn row_not_found_translates_to_not_found() {
        let err: AppError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}

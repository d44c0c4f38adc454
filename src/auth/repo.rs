use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::auth::password::hash_password;
use crate::error::AppError;

/// Coarse-grained authorization role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "user_role")]
pub enum UserRole {
    Shipper,
    Carrier,
    Admin,
}

impl Default for UserRole {
    fn default() -> Self {
        UserRole::Shipper
    }
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            UserRole::Shipper => "Shipper",
            UserRole::Carrier => "Carrier",
            UserRole::Admin => "Admin",
        };
        f.write_str(s)
    }
}

/// User record. The password hash and reset-token fields never serialize
/// into API responses.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: UserRole,
    pub avatar_id: Option<String>,
    pub avatar_url: Option<String>,
    #[serde(skip_serializing)]
    pub reset_token_hash: Option<String>,
    #[serde(skip_serializing)]
    pub reset_expires: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
}

pub struct NewUser<'a> {
    pub username: &'a str,
    pub email: &'a str,
    pub first_name: Option<&'a str>,
    pub last_name: Option<&'a str>,
    pub role: UserRole,
}

#[derive(Default)]
pub struct ProfileChanges<'a> {
    pub first_name: Option<&'a str>,
    pub last_name: Option<&'a str>,
    pub username: Option<&'a str>,
    pub email: Option<&'a str>,
    /// Only set by admin updates.
    pub role: Option<UserRole>,
}

const USER_COLUMNS: &str = "id, username, email, first_name, last_name, password_hash, role, \
                            avatar_id, avatar_url, reset_token_hash, reset_expires, created_at";

impl User {
    /// Create a user. Hashing happens here, on the write path; callers never
    /// handle the hash.
    pub async fn create(
        db: &PgPool,
        new: &NewUser<'_>,
        password: &str,
    ) -> Result<User, AppError> {
        let password_hash = hash_password(password)?;
        let sql = format!(
            "INSERT INTO users (username, email, first_name, last_name, password_hash, role) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {USER_COLUMNS}"
        );
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(new.username)
            .bind(new.email)
            .bind(new.first_name)
            .bind(new.last_name)
            .bind(&password_hash)
            .bind(new.role)
            .fetch_one(db)
            .await?;
        Ok(user)
    }

    pub async fn find_by_id(db: &PgPool, id: Uuid) -> Result<Option<User>, sqlx::Error> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        sqlx::query_as::<_, User>(&sql).bind(id).fetch_optional(db).await
    }

    /// Login-path lookup; the returned record carries the password hash for
    /// verification.
    pub async fn find_by_username(db: &PgPool, username: &str) -> Result<Option<User>, sqlx::Error> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE username = $1");
        sqlx::query_as::<_, User>(&sql)
            .bind(username)
            .fetch_optional(db)
            .await
    }

    pub async fn find_by_email(db: &PgPool, email: &str) -> Result<Option<User>, sqlx::Error> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");
        sqlx::query_as::<_, User>(&sql)
            .bind(email)
            .fetch_optional(db)
            .await
    }

    pub async fn list(db: &PgPool) -> Result<Vec<User>, sqlx::Error> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users ORDER BY created_at");
        sqlx::query_as::<_, User>(&sql).fetch_all(db).await
    }

    /// Partial update of identity fields (and role, for admin callers).
    /// Absent fields keep their current value. Never touches the password.
    pub async fn update_profile(
        db: &PgPool,
        id: Uuid,
        changes: &ProfileChanges<'_>,
    ) -> Result<User, sqlx::Error> {
        let sql = format!(
            "UPDATE users SET \
                 first_name = COALESCE($2, first_name), \
                 last_name  = COALESCE($3, last_name), \
                 username   = COALESCE($4, username), \
                 email      = COALESCE($5, email), \
                 role       = COALESCE($6, role) \
             WHERE id = $1 RETURNING {USER_COLUMNS}"
        );
        sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .bind(changes.first_name)
            .bind(changes.last_name)
            .bind(changes.username)
            .bind(changes.email)
            .bind(changes.role)
            .fetch_one(db)
            .await
    }

    /// The single password write path: hashes the new password and clears any
    /// outstanding reset token in the same statement.
    pub async fn set_password(
        db: &PgPool,
        id: Uuid,
        new_password: &str,
    ) -> Result<User, AppError> {
        let password_hash = hash_password(new_password)?;
        let sql = format!(
            "UPDATE users SET password_hash = $2, reset_token_hash = NULL, reset_expires = NULL \
             WHERE id = $1 RETURNING {USER_COLUMNS}"
        );
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .bind(&password_hash)
            .fetch_one(db)
            .await?;
        Ok(user)
    }

    pub async fn set_reset_token(
        db: &PgPool,
        id: Uuid,
        token_hash: &str,
        expires_at: OffsetDateTime,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE users SET reset_token_hash = $2, reset_expires = $3 WHERE id = $1")
            .bind(id)
            .bind(token_hash)
            .bind(expires_at)
            .execute(db)
            .await?;
        Ok(())
    }

    pub async fn clear_reset_token(db: &PgPool, id: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE users SET reset_token_hash = NULL, reset_expires = NULL WHERE id = $1")
            .bind(id)
            .execute(db)
            .await?;
        Ok(())
    }

    /// Resolve a presented (already digested) reset token. Matches only while
    /// the expiry is still in the future; a wrong and an expired token are
    /// indistinguishable to the caller.
    pub async fn find_by_reset_token(
        db: &PgPool,
        token_hash: &str,
    ) -> Result<Option<User>, sqlx::Error> {
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users \
             WHERE reset_token_hash = $1 AND reset_expires > now()"
        );
        sqlx::query_as::<_, User>(&sql)
            .bind(token_hash)
            .fetch_optional(db)
            .await
    }

    pub async fn set_avatar(
        db: &PgPool,
        id: Uuid,
        avatar_id: &str,
        avatar_url: &str,
    ) -> Result<User, sqlx::Error> {
        let sql = format!(
            "UPDATE users SET avatar_id = $2, avatar_url = $3 \
             WHERE id = $1 RETURNING {USER_COLUMNS}"
        );
        sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .bind(avatar_id)
            .bind(avatar_url)
            .fetch_one(db)
            .await
    }

    pub async fn delete(db: &PgPool, id: Uuid) -> Result<(), sqlx::Error> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(db)
            .await?;
        if result.rows_affected() == 0 {
            return Err(sqlx::Error::RowNotFound);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_defaults_to_shipper() {
        assert_eq!(UserRole::default(), UserRole::Shipper);
    }

    #[test]
    fn role_round_trips_through_serde() {
        for (role, json) in [
            (UserRole::Shipper, "\"Shipper\""),
            (UserRole::Carrier, "\"Carrier\""),
            (UserRole::Admin, "\"Admin\""),
        ] {
            assert_eq!(serde_json::to_string(&role).unwrap(), json);
            assert_eq!(serde_json::from_str::<UserRole>(json).unwrap(), role);
        }
    }

    #[test]
    fn unknown_role_is_rejected_at_deserialization() {
        assert!(serde_json::from_str::<UserRole>("\"Superuser\"").is_err());
    }

    #[test]
    fn serialized_user_never_exposes_credential_fields() {
        let user = User {
            id: Uuid::new_v4(),
            username: "marta".into(),
            email: "marta@example.com".into(),
            first_name: Some("Marta".into()),
            last_name: None,
            password_hash: "$argon2id$v=19$secret".into(),
            role: UserRole::Carrier,
            avatar_id: None,
            avatar_url: None,
            reset_token_hash: Some("deadbeef".into()),
            reset_expires: Some(OffsetDateTime::now_utc()),
            created_at: OffsetDateTime::now_utc(),
        };
        let json = serde_json::to_string(&user).unwrap();
        assert!(json.contains("marta@example.com"));
        assert!(!json.contains("password_hash"));
        assert!(!json.contains("argon2"));
        assert!(!json.contains("reset_token_hash"));
        assert!(!json.contains("reset_expires"));
        assert!(!json.contains("deadbeef"));
    }
}

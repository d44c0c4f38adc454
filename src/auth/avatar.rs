use anyhow::Context;
use base64ct::{Base64, Encoding};
use bytes::Bytes;
use tracing::warn;
use uuid::Uuid;

use crate::auth::repo::User;
use crate::error::AppError;
use crate::state::AppState;

const AVATAR_FOLDER: &str = "avatars";

/// Reference to an externally stored avatar image.
pub struct AvatarRef {
    pub id: String,
    pub url: String,
}

/// Store a new avatar for `user`, removing the previous object first. A
/// failed removal is logged and does not block the upload.
pub async fn replace(state: &AppState, user: &User, payload: &str) -> Result<AvatarRef, AppError> {
    let (content_type, data) = decode_payload(payload)?;

    if let Some(old_id) = &user.avatar_id {
        if let Err(e) = state.storage.delete(old_id).await {
            warn!(error = %e, avatar_id = %old_id, "failed to delete previous avatar");
        }
    }

    let ext = ext_from_mime(&content_type).unwrap_or("bin");
    let key = format!("{}/{}.{}", AVATAR_FOLDER, Uuid::new_v4(), ext);
    let url = state
        .storage
        .upload(&key, Bytes::from(data), &content_type)
        .await
        .context("upload avatar")?;

    Ok(AvatarRef { id: key, url })
}

/// Remove the user's avatar object, if any. Failures propagate; callers that
/// are about to destroy the record must not orphan the media object silently.
pub async fn remove(state: &AppState, user: &User) -> anyhow::Result<()> {
    if let Some(id) = &user.avatar_id {
        state
            .storage
            .delete(id)
            .await
            .with_context(|| format!("delete avatar {}", id))?;
    }
    Ok(())
}

/// Accepts either a `data:<mime>;base64,<data>` URI or bare base64 (assumed
/// PNG).
fn decode_payload(payload: &str) -> Result<(String, Vec<u8>), AppError> {
    let (mime, b64) = match payload.strip_prefix("data:") {
        Some(rest) => {
            let (meta, data) = rest
                .split_once(',')
                .ok_or_else(|| AppError::Validation("Malformed avatar payload".into()))?;
            (meta.trim_end_matches(";base64").to_string(), data)
        }
        None => ("image/png".to_string(), payload),
    };
    let data = Base64::decode_vec(b64)
        .map_err(|_| AppError::Validation("Avatar payload is not valid base64".into()))?;
    if data.is_empty() {
        return Err(AppError::Validation("Avatar payload is empty".into()));
    }
    Ok((mime, data))
}

fn ext_from_mime(ct: &str) -> Option<&'static str> {
    match ct {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/webp" => Some("webp"),
        "image/heic" => Some("heic"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ext_from_mime() {
        assert_eq!(ext_from_mime("image/jpeg"), Some("jpg"));
        assert_eq!(ext_from_mime("image/png"), Some("png"));
        assert_eq!(ext_from_mime("image/webp"), Some("webp"));
        assert_eq!(ext_from_mime("application/octet-stream"), None);
    }

    #[test]
    fn decodes_data_uri_with_mime() {
        // "hi" in base64
        let (mime, data) = decode_payload("data:image/jpeg;base64,aGk=").unwrap();
        assert_eq!(mime, "image/jpeg");
        assert_eq!(data, b"hi");
    }

    #[test]
    fn bare_base64_defaults_to_png() {
        let (mime, data) = decode_payload("aGk=").unwrap();
        assert_eq!(mime, "image/png");
        assert_eq!(data, b"hi");
    }

    #[test]
    fn rejects_invalid_base64() {
        assert!(decode_payload("data:image/png;base64,!!!").is_err());
        assert!(decode_payload("not base64 at all???").is_err());
    }

    #[tokio::test]
    async fn replace_uploads_under_avatars_prefix() {
        let state = AppState::fake();
        let user = crate::auth::repo::User {
            id: Uuid::new_v4(),
            username: "pic".into(),
            email: "pic@example.com".into(),
            first_name: None,
            last_name: None,
            password_hash: "hash".into(),
            role: crate::auth::repo::UserRole::Shipper,
            avatar_id: Some("avatars/old.png".into()),
            avatar_url: Some("https://fake.local/avatars/old.png".into()),
            reset_token_hash: None,
            reset_expires: None,
            created_at: time::OffsetDateTime::now_utc(),
        };
        let avatar = replace(&state, &user, "data:image/png;base64,aGk=")
            .await
            .unwrap();
        assert!(avatar.id.starts_with("avatars/"));
        assert!(avatar.id.ends_with(".png"));
        assert!(avatar.url.contains(&avatar.id));
    }
}

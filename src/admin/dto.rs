use serde::Deserialize;

use crate::auth::repo::UserRole;

/// Admin-side partial update of another user's identity and role. Absent
/// fields are left unchanged. Passwords and avatars are not admin-editable.
#[derive(Debug, Deserialize)]
pub struct AdminUpdateRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub username: Option<String>,
    pub email: Option<String>,
    pub role: Option<UserRole>,
}

use axum::extract::FromRef;
use axum_extra::extract::cookie::{Cookie, SameSite};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::debug;
use uuid::Uuid;

use crate::{config::SessionConfig, state::AppState};

/// Name of the HTTP-only cookie carrying the session token.
pub const SESSION_COOKIE: &str = "token";

/// Signed session claims. Only the user id is carried; the full identity is
/// re-fetched from the database on every authenticated request.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub iat: usize,
    pub exp: usize,
    pub iss: String,
    pub aud: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("malformed session token")]
    Malformed,
    #[error("session token signature mismatch")]
    SignatureInvalid,
    #[error("session token expired")]
    Expired,
}

/// Signing and verification keys plus token lifetime. One fixed algorithm
/// (HS256) and one secret; tokens signed any other way are rejected.
#[derive(Clone)]
pub struct SessionKeys {
    pub encoding: EncodingKey,
    pub decoding: DecodingKey,
    pub issuer: String,
    pub audience: String,
    pub ttl: Duration,
}

impl FromRef<AppState> for SessionKeys {
    fn from_ref(state: &AppState) -> Self {
        let SessionConfig {
            secret,
            issuer,
            audience,
            ttl_hours,
        } = state.config.session.clone();
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            issuer,
            audience,
            ttl: Duration::from_secs((ttl_hours as u64) * 3600),
        }
    }
}

impl SessionKeys {
    pub fn issue(&self, user_id: Uuid) -> anyhow::Result<String> {
        self.issue_with_ttl(user_id, self.ttl.as_secs() as i64)
    }

    fn issue_with_ttl(&self, user_id: Uuid, ttl_secs: i64) -> anyhow::Result<String> {
        let now = OffsetDateTime::now_utc();
        let exp = now + TimeDuration::seconds(ttl_secs);
        let claims = Claims {
            sub: user_id,
            iat: now.unix_timestamp() as usize,
            exp: exp.unix_timestamp() as usize,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)?;
        debug!(user_id = %user_id, "session token issued");
        Ok(token)
    }

    /// Verify a presented token and return the embedded user id.
    pub fn verify(&self, token: &str) -> Result<Uuid, SessionError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_audience(std::slice::from_ref(&self.audience));
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        let data = decode::<Claims>(token, &self.decoding, &validation).map_err(|e| {
            match e.kind() {
                ErrorKind::ExpiredSignature => SessionError::Expired,
                ErrorKind::InvalidSignature
                | ErrorKind::InvalidAlgorithm
                | ErrorKind::ImmatureSignature
                | ErrorKind::InvalidIssuer
                | ErrorKind::InvalidAudience => SessionError::SignatureInvalid,
                _ => SessionError::Malformed,
            }
        })?;
        Ok(data.claims.sub)
    }

    /// HTTP-only session cookie whose lifetime matches the token's expiry.
    pub fn session_cookie(&self, token: String) -> Cookie<'static> {
        Cookie::build((SESSION_COOKIE, token))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .max_age(TimeDuration::seconds(self.ttl.as_secs() as i64))
            .build()
    }

    /// Already-expired replacement cookie used by logout.
    pub fn expired_cookie() -> Cookie<'static> {
        Cookie::build((SESSION_COOKIE, ""))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .max_age(TimeDuration::ZERO)
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_keys() -> SessionKeys {
        SessionKeys {
            encoding: EncodingKey::from_secret(b"test-secret"),
            decoding: DecodingKey::from_secret(b"test-secret"),
            issuer: "test-issuer".into(),
            audience: "test-aud".into(),
            ttl: Duration::from_secs(24 * 3600),
        }
    }

    #[test]
    fn issue_and_verify_resolves_same_user() {
        let keys = make_keys();
        let user_id = Uuid::new_v4();
        let token = keys.issue(user_id).expect("issue");
        assert_eq!(keys.verify(&token), Ok(user_id));
    }

    #[test]
    fn tampered_signature_is_rejected() {
        let keys = make_keys();
        let token = keys.issue(Uuid::new_v4()).expect("issue");

        let mut parts: Vec<String> = token.split('.').map(str::to_string).collect();
        assert_eq!(parts.len(), 3);
        let mut sig = parts[2].clone().into_bytes();
        sig[0] = if sig[0] == b'A' { b'B' } else { b'A' };
        parts[2] = String::from_utf8(sig).unwrap();
        let tampered = parts.join(".");

        assert_eq!(keys.verify(&tampered), Err(SessionError::SignatureInvalid));
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let keys = make_keys();
        let other = SessionKeys {
            encoding: EncodingKey::from_secret(b"a-different-secret"),
            ..keys.clone()
        };
        let token = other.issue(Uuid::new_v4()).expect("issue");
        assert_eq!(keys.verify(&token), Err(SessionError::SignatureInvalid));
    }

    #[test]
    fn expired_token_is_rejected_even_with_valid_signature() {
        let keys = make_keys();
        let token = keys
            .issue_with_ttl(Uuid::new_v4(), -120)
            .expect("issue expired");
        assert_eq!(keys.verify(&token), Err(SessionError::Expired));
    }

    #[test]
    fn garbage_is_malformed() {
        let keys = make_keys();
        assert_eq!(keys.verify("definitely-not-a-jwt"), Err(SessionError::Malformed));
        assert_eq!(keys.verify(""), Err(SessionError::Malformed));
    }

    #[test]
    fn session_cookie_is_http_only_and_expiry_aligned() {
        let keys = make_keys();
        let cookie = keys.session_cookie("tok".into());
        assert_eq!(cookie.name(), SESSION_COOKIE);
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.path(), Some("/"));
        assert_eq!(cookie.max_age(), Some(TimeDuration::hours(24)));
    }

    #[test]
    fn logout_cookie_expires_immediately() {
        let cookie = SessionKeys::expired_cookie();
        assert_eq!(cookie.value(), "");
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.max_age(), Some(TimeDuration::ZERO));
    }
}

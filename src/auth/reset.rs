use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};
use time::{Duration, OffsetDateTime};

/// Reset secrets are valid for 30 minutes.
pub const RESET_TTL_MINUTES: i64 = 30;

/// Entropy of the plaintext secret: 20 bytes = 160 bits.
const SECRET_BYTES: usize = 20;

/// A freshly generated reset token. `secret` goes to the user exactly once;
/// only `token_hash` and `expires_at` are persisted.
pub struct ResetToken {
    pub secret: String,
    pub token_hash: String,
    pub expires_at: OffsetDateTime,
}

pub fn generate() -> ResetToken {
    let mut bytes = [0u8; SECRET_BYTES];
    OsRng.fill_bytes(&mut bytes);
    let secret = hex::encode(bytes);
    ResetToken {
        token_hash: hash_secret(&secret),
        expires_at: OffsetDateTime::now_utc() + Duration::minutes(RESET_TTL_MINUTES),
        secret,
    }
}

/// Fast one-way digest for reset secrets. The input is already high-entropy
/// and single-use, so a plain sha256 suffices; the slow password hash is not
/// used here.
pub fn hash_secret(secret: &str) -> String {
    hex::encode(Sha256::digest(secret.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secret_has_full_entropy_and_hex_shape() {
        let token = generate();
        assert_eq!(token.secret.len(), SECRET_BYTES * 2);
        assert!(token.secret.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn secrets_are_unique() {
        assert_ne!(generate().secret, generate().secret);
    }

    #[test]
    fn stored_hash_is_not_the_secret() {
        let token = generate();
        assert_ne!(token.token_hash, token.secret);
        assert_eq!(token.token_hash, hash_secret(&token.secret));
    }

    #[test]
    fn digest_is_deterministic() {
        assert_eq!(hash_secret("abc123"), hash_secret("abc123"));
        assert_ne!(hash_secret("abc123"), hash_secret("abc124"));
    }

    #[test]
    fn expiry_is_thirty_minutes_out() {
        let before = OffsetDateTime::now_utc();
        let token = generate();
        let after = OffsetDateTime::now_utc();
        assert!(token.expires_at >= before + Duration::minutes(RESET_TTL_MINUTES));
        assert!(token.expires_at <= after + Duration::minutes(RESET_TTL_MINUTES));
    }
}

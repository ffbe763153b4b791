use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::SaltString,
};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rand::RngCore;
use rand_core::OsRng;
use survey_types::api::{Claims, TokenKind};

use crate::config::Settings;

pub const ACCESS_COOKIE: &str = "access_token";
pub const REFRESH_COOKIE: &str = "refresh_token";
pub const CSRF_COOKIE: &str = "csrf_token";
pub const CSRF_HEADER: &str = "x-csrf-token";
pub const CSRF_FORM_FIELD: &str = "csrf_token";

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("token expired")]
    Expired,
    #[error("token invalid")]
    Invalid,
}

// -- Passwords --

/// Argon2id with a fresh random salt, PHC string format.
pub fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Password hashing failed: {}", e))?
        .to_string();
    Ok(hash)
}

/// False for a wrong password and for stored hashes that do not parse.
pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(stored_hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

// -- Tokens --

fn issue_token(secret: &str, email: &str, kind: TokenKind, lifetime: chrono::Duration) -> anyhow::Result<String> {
    let claims = Claims {
        sub: email.to_string(),
        kind,
        exp: (chrono::Utc::now() + lifetime).timestamp().max(0) as usize,
    };
    let token = encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;
    Ok(token)
}

pub fn issue_access_token(settings: &Settings, email: &str) -> anyhow::Result<String> {
    issue_token(
        &settings.jwt_secret,
        email,
        TokenKind::Access,
        chrono::Duration::minutes(settings.access_token_minutes),
    )
}

pub fn issue_refresh_token(settings: &Settings, email: &str) -> anyhow::Result<String> {
    issue_token(
        &settings.jwt_secret,
        email,
        TokenKind::Refresh,
        chrono::Duration::days(settings.refresh_token_days),
    )
}

/// Verify signature and expiry (no leeway). The caller checks the kind.
pub fn decode_token(secret: &str, token: &str) -> Result<Claims, TokenError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 0;

    decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation)
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => TokenError::Expired,
            _ => TokenError::Invalid,
        })
}

// -- CSRF --

/// 32 random bytes, URL-safe base64 without padding.
pub fn generate_csrf_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_hash_verifies() {
        let hash = hash_password("secret1").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("secret1", &hash));
        assert!(!verify_password("secret2", &hash));
        assert!(!verify_password("secret1", "not-a-hash"));
    }

    #[test]
    fn tokens_carry_email_and_kind() {
        let settings = Settings::for_secret("unit-test-secret", "unused.db");
        let access = issue_access_token(&settings, "anna@example.com").unwrap();
        let refresh = issue_refresh_token(&settings, "anna@example.com").unwrap();

        let claims = decode_token("unit-test-secret", &access).unwrap();
        assert_eq!(claims.sub, "anna@example.com");
        assert_eq!(claims.kind, TokenKind::Access);
        assert_eq!(decode_token("unit-test-secret", &refresh).unwrap().kind, TokenKind::Refresh);
    }

    #[test]
    fn expired_and_forged_tokens_are_told_apart() {
        let expired = issue_token(
            "unit-test-secret",
            "anna@example.com",
            TokenKind::Access,
            chrono::Duration::minutes(-5),
        )
        .unwrap();
        assert_eq!(decode_token("unit-test-secret", &expired).unwrap_err(), TokenError::Expired);

        let settings = Settings::for_secret("other-secret", "unused.db");
        let forged = issue_access_token(&settings, "anna@example.com").unwrap();
        assert_eq!(decode_token("unit-test-secret", &forged).unwrap_err(), TokenError::Invalid);
        assert_eq!(decode_token("unit-test-secret", "garbage").unwrap_err(), TokenError::Invalid);
    }

    #[test]
    fn csrf_tokens_are_random_and_url_safe() {
        let a = generate_csrf_token();
        let b = generate_csrf_token();
        assert_eq!(a.len(), 43);
        assert_ne!(a, b);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }
}

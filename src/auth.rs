use bcrypt::{hash, verify};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::Rng;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

use crate::models::{Admin, AdminClaims, User, UserClaims};

/// Cookie carrying the admin session.
pub const ADMIN_COOKIE: &str = "sid";
/// Cookie carrying a student/teacher token.
pub const USER_COOKIE: &str = "token";

pub const ADMIN_SESSION_HOURS: i64 = 4;
pub const USER_TOKEN_DAYS: i64 = 7;
pub const VERIFY_OTP_HOURS: i64 = 24;
pub const RESET_OTP_MINUTES: i64 = 15;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("password hashing failed: {0}")]
    Hash(#[from] bcrypt::BcryptError),
    #[error("invalid token: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),
}

pub fn hash_password(password: &str, cost: u32) -> Result<String, AuthError> {
    Ok(hash(password, cost)?)
}

pub fn verify_password(password: &str, hash: &str) -> Result<bool, AuthError> {
    Ok(verify(password, hash)?)
}

fn expiry(lifetime: Duration) -> usize {
    (Utc::now() + lifetime).timestamp().max(0) as usize
}

fn sign<C: Serialize>(claims: &C, secret: &str) -> Result<String, AuthError> {
    Ok(encode(&Header::default(), claims, &EncodingKey::from_secret(secret.as_bytes()))?)
}

fn check<C: DeserializeOwned>(token: &str, secret: &str) -> Result<C, AuthError> {
    let token_data = decode::<C>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::new(Algorithm::HS256),
    )?;
    Ok(token_data.claims)
}

pub fn create_user_token(user: &User, secret: &str) -> Result<String, AuthError> {
    let claims = UserClaims {
        sub: user.id.clone(),
        role: user.role,
        exp: expiry(Duration::days(USER_TOKEN_DAYS)),
    };
    sign(&claims, secret)
}

pub fn validate_user_token(token: &str, secret: &str) -> Result<UserClaims, AuthError> {
    check(token, secret)
}

pub fn create_admin_session(admin: &Admin, secret: &str) -> Result<String, AuthError> {
    let claims = AdminClaims {
        sub: admin.id.clone(),
        name: admin.name.clone(),
        role: admin.role,
        department: admin.department.clone(),
        exp: expiry(Duration::hours(ADMIN_SESSION_HOURS)),
    };
    sign(&claims, secret)
}

pub fn validate_admin_session(token: &str, secret: &str) -> Result<AdminClaims, AuthError> {
    check(token, secret)
}

/// Six-digit one-time code.
pub fn generate_otp() -> String {
    rand::thread_rng().gen_range(100_000..1_000_000).to_string()
}

/// Millisecond timestamp `lifetime` from now.
pub fn otp_deadline(lifetime: Duration) -> i64 {
    (Utc::now() + lifetime).timestamp_millis()
}

pub fn otp_matches(stored: Option<&str>, deadline: i64, given: &str) -> bool {
    match stored {
        Some(code) if !code.is_empty() => {
            code == given.trim() && Utc::now().timestamp_millis() <= deadline
        }
        _ => false,
    }
}

/// At least 8 characters with a lowercase, an uppercase, a digit and a symbol.
pub fn is_strong_password(password: &str) -> bool {
    password.chars().count() >= 8
        && password.chars().any(|c| c.is_lowercase())
        && password.chars().any(|c| c.is_uppercase())
        && password.chars().any(|c| c.is_ascii_digit())
        && password.chars().any(|c| !c.is_alphanumeric() && !c.is_whitespace())
}

/// Builds a `Set-Cookie` value. `max_age_secs == 0` clears the cookie.
pub fn session_cookie(name: &str, value: &str, max_age_secs: i64, production: bool) -> String {
    let same_site = if production { "None; Secure" } else { "Lax" };
    format!("{name}={value}; Path=/; HttpOnly; Max-Age={max_age_secs}; SameSite={same_site}")
}

/// Reads cookie `name` out of a `Cookie` header value.
pub fn cookie_value<'a>(header: &'a str, name: &str) -> Option<&'a str> {
    header.split(';').find_map(|pair| {
        let (key, value) = pair.trim().split_once('=')?;
        (key == name && !value.is_empty()).then_some(value)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AdminRole;

    fn admin() -> Admin {
        Admin {
            id: "a1".to_string(),
            name: "Dean".to_string(),
            email: "dean@uni.edu".to_string(),
            password_hash: String::new(),
            role: AdminRole::Superadmin,
            department: Some("Computer".to_string()),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_password_hash_roundtrip() {
        let hashed = hash_password("S3cret!pw", 4).unwrap();
        assert_ne!(hashed, "S3cret!pw");
        assert!(hashed.starts_with("$2"));
        assert!(verify_password("S3cret!pw", &hashed).unwrap());
        assert!(!verify_password("wrong", &hashed).unwrap());
    }

    #[test]
    fn test_admin_session_rejects_other_secret() {
        let token = create_admin_session(&admin(), "one").unwrap();
        let claims = validate_admin_session(&token, "one").unwrap();
        assert_eq!(claims.sub, "a1");
        assert_eq!(claims.role, AdminRole::Superadmin);
        assert!(validate_admin_session(&token, "two").is_err());
        // a user token is not an admin session
        assert!(validate_user_token(&token, "one").is_err());
    }

    #[test]
    fn test_otp_expiry() {
        let otp = generate_otp();
        assert_eq!(otp.len(), 6);
        let live = otp_deadline(Duration::minutes(5));
        let dead = otp_deadline(Duration::minutes(-5));
        assert!(otp_matches(Some(&otp), live, &otp));
        assert!(!otp_matches(Some(&otp), dead, &otp));
        assert!(!otp_matches(Some(""), live, ""));
        assert!(!otp_matches(None, live, &otp));
    }

    #[test]
    fn test_password_strength() {
        assert!(is_strong_password("Abcdef1!"));
        assert!(!is_strong_password("abcdef1!"));
        assert!(!is_strong_password("Abcdefg!"));
        assert!(!is_strong_password("Ab1!"));
    }

    #[test]
    fn test_cookie_parsing() {
        let header = "theme=dark; sid=abc.def; token=";
        assert_eq!(cookie_value(header, "sid"), Some("abc.def"));
        assert_eq!(cookie_value(header, "token"), None);
        assert_eq!(cookie_value(header, "missing"), None);
        assert!(session_cookie("sid", "x", 60, true).contains("SameSite=None; Secure"));
    }
}

//! Password hashing and JWT issuance/validation.
//!
//! Tokens are HS256 with the secret and lifetime taken from [`crate::config::Config`];
//! claims carry the user id and role so handlers can gate admin routes.

use bcrypt::{hash, verify, DEFAULT_COST};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::models::{AuthPayload, User};

pub fn hash_password(password: &str) -> Result<String, bcrypt::BcryptError> {
    hash(password, DEFAULT_COST)
}

pub fn verify_password(password: &str, hash: &str) -> Result<bool, bcrypt::BcryptError> {
    verify(password, hash)
}

pub fn create_jwt(
    user: &User,
    secret: &str,
    ttl_secs: u64,
) -> Result<String, jsonwebtoken::errors::Error> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();

    let claims = AuthPayload {
        sub: user.id.clone(),
        role: user.role,
        exp: (now + ttl_secs) as usize,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
}

pub fn validate_jwt(token: &str, secret: &str) -> Result<AuthPayload, jsonwebtoken::errors::Error> {
    let token_data = decode::<AuthPayload>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::new(Algorithm::HS256),
    )?;
    Ok(token_data.claims)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;
    use chrono::Utc;

    fn sample_user(role: Role) -> User {
        User {
            id: "user-1".to_string(),
            name: "Maria".to_string(),
            email: "maria@example.com".to_string(),
            password_hash: String::new(),
            phone: None,
            role,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_password_roundtrip() {
        let hashed = hash_password("segredo123").expect("hash");
        assert!(verify_password("segredo123", &hashed).expect("verify"));
        assert!(!verify_password("errada", &hashed).expect("verify"));
    }

    #[test]
    fn test_jwt_roundtrip_carries_role() {
        let user = sample_user(Role::Admin);
        let token = create_jwt(&user, "test-secret", 3600).expect("token");
        let claims = validate_jwt(&token, "test-secret").expect("claims");
        assert_eq!(claims.sub, "user-1");
        assert!(matches!(claims.role, Role::Admin));
    }

    #[test]
    fn test_jwt_rejects_wrong_secret() {
        let user = sample_user(Role::User);
        let token = create_jwt(&user, "secret-a", 3600).expect("token");
        assert!(validate_jwt(&token, "secret-b").is_err());
    }
}

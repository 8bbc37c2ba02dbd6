//! Session tokens and password hashing
//!
//! # Architecture
//!
//! - Admin and teacher passwords are stored as argon2id PHC strings.
//! - Every session is an HS256 JWT carrying the subject id and role.
//!   Student tokens carry the student id as subject.
//! - The signing secret comes from config or, when absent, from the
//!   `settings` table (generated on first start).
//!
//! # Pure Functions
//!
//! No HTTP framework dependencies here; the service crate wraps these in
//! Axum middleware.

use chrono::Utc;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::db::{get_setting, set_setting, Role};
use crate::{Error, Result};

/// Settings key holding the generated token secret
pub const JWT_SECRET_SETTING: &str = "jwt_secret";

// ========================================
// Password Hashing
// ========================================

/// Hash a plain password with argon2id
pub fn hash_password(password: &str) -> Result<String> {
    use argon2::Argon2;
    use password_hash::rand_core::OsRng;
    use password_hash::{PasswordHasher, SaltString};

    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| Error::Internal(format!("password hashing failed: {}", e)))
}

/// Verify a password against an argon2id hash
pub fn verify_password(password: &str, hash: &str) -> bool {
    use argon2::Argon2;
    use password_hash::{PasswordHash, PasswordVerifier};

    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

// ========================================
// Tokens
// ========================================

/// JWT claims payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// User id for admin/teacher, student id for students
    pub sub: String,
    pub role: Role,
    /// Display name
    pub name: String,
    pub iat: i64,
    pub exp: i64,
}

/// Authenticated caller, derived from validated claims
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub subject: String,
    pub role: Role,
    pub name: String,
}

impl Principal {
    /// Student id when the caller is a student
    pub fn student_id(&self) -> Option<&str> {
        (self.role == Role::Student).then_some(self.subject.as_str())
    }

    pub fn has_role(&self, roles: &[Role]) -> bool {
        roles.contains(&self.role)
    }
}

impl From<Claims> for Principal {
    fn from(claims: Claims) -> Self {
        Self {
            subject: claims.sub,
            role: claims.role,
            name: claims.name,
        }
    }
}

/// Issues and validates session tokens
#[derive(Clone)]
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    ttl_secs: i64,
}

impl TokenService {
    pub fn new(secret: &str, ttl_hours: i64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::default(),
            ttl_secs: ttl_hours * 3600,
        }
    }

    /// Issue a signed token for `subject`
    pub fn issue(&self, subject: &str, role: Role, name: &str) -> Result<String> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: subject.to_string(),
            role,
            name: name.to_string(),
            iat: now,
            exp: now + self.ttl_secs,
        };
        jsonwebtoken::encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| Error::Internal(format!("token signing failed: {}", e)))
    }

    /// Validate signature and expiry
    pub fn verify(&self, token: &str) -> Result<Principal> {
        jsonwebtoken::decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims.into())
            .map_err(|e| Error::Auth(e.to_string()))
    }
}

impl std::fmt::Debug for TokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenService")
            .field("ttl_secs", &self.ttl_secs)
            .finish_non_exhaustive()
    }
}

// ========================================
// Secret Management
// ========================================

/// Load the token secret from settings, generating one if missing
pub async fn load_or_init_jwt_secret(db: &SqlitePool) -> Result<String> {
    if let Some(secret) = get_setting(db, JWT_SECRET_SETTING).await? {
        if !secret.is_empty() {
            return Ok(secret);
        }
    }

    let secret = generate_secret();
    set_setting(db, JWT_SECRET_SETTING, &secret).await?;
    tracing::info!("Generated new session token secret");
    Ok(secret)
}

/// 32 random bytes as lowercase hex
fn generate_secret() -> String {
    use rand::RngCore;

    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

// ========================================
// Tests
// ========================================

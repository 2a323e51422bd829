use anyhow::{Result, anyhow};
use argon2::{
    Argon2, PasswordHash,
    password_hash::{PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use axum::http::{HeaderMap, header};
use chrono::{DateTime, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

pub const SESSION_COOKIE: &str = "labshare_session";

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SessionClaims {
    pub sub: String,
    pub exp: usize,
    pub iat: usize,
    pub jti: String,
}

pub fn create_session_token(
    subject: &str,
    token_id: &str,
    expires_at: DateTime<Utc>,
    secret: &str,
) -> Result<String> {
    let claims = SessionClaims {
        sub: subject.to_owned(),
        exp: expires_at.timestamp() as usize,
        iat: Utc::now().timestamp() as usize,
        jti: token_id.to_owned(),
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_ref()),
    )?;

    Ok(token)
}

/// Decodes a session token, rejecting bad signatures and expired tokens
pub fn validate_session_token(token: &str, secret: &str) -> Result<SessionClaims> {
    let mut validation = Validation::default();
    validation.leeway = 0;
    let data = decode::<SessionClaims>(
        token,
        &DecodingKey::from_secret(secret.as_ref()),
        &validation,
    )?;
    Ok(data.claims)
}

/// Decodes a session token without checking expiry; used on logout so a
/// stale token can still be revoked
pub fn decode_session_token_unchecked(token: &str, secret: &str) -> Result<SessionClaims> {
    let mut validation = Validation::default();
    validation.validate_exp = false;
    let data = decode::<SessionClaims>(
        token,
        &DecodingKey::from_secret(secret.as_ref()),
        &validation,
    )?;
    Ok(data.claims)
}

pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow!("Failed to hash password: {}", e))?
        .to_string();
    Ok(hash)
}

pub fn verify_password(password: &str, phc: &str) -> Result<bool> {
    let parsed = PasswordHash::new(phc).map_err(|e| anyhow!("Invalid password hash: {}", e))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

/// Configured administrator credential
#[derive(Debug, Clone)]
pub struct AdminCredentials {
    pub username: String,
    pub password_hash: String,
}

impl AdminCredentials {
    pub fn from_config(config: &crate::config::AppConfig) -> Result<Self> {
        let password_hash = match (&config.admin_password_hash, &config.admin_password) {
            (Some(hash), _) => {
                PasswordHash::new(hash).map_err(|e| anyhow!("Invalid ADMIN_PASSWORD_HASH: {}", e))?;
                hash.clone()
            }
            (None, Some(plain)) => hash_password(plain)?,
            (None, None) => {
                return Err(anyhow!(
                    "No admin credential configured (set ADMIN_PASSWORD or ADMIN_PASSWORD_HASH)"
                ));
            }
        };

        Ok(Self {
            username: config.admin_username.clone(),
            password_hash,
        })
    }

    /// Unknown user and wrong password are indistinguishable to the caller
    pub fn verify(&self, username: &str, password: &str) -> bool {
        let password_ok = verify_password(password, &self.password_hash).unwrap_or(false);
        password_ok && username == self.username
    }
}

/// Reads the session token from the `Cookie` header
pub fn session_token_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

pub fn session_cookie(token: &str, max_age_secs: i64, secure: bool) -> String {
    let mut cookie = format!(
        "{}={}; HttpOnly; Path=/; SameSite=Lax; Max-Age={}",
        SESSION_COOKIE, token, max_age_secs
    );
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

pub fn clear_session_cookie(secure: bool) -> String {
    session_cookie("", 0, secure)
}

//! JWT token generation and validation
//!
//! Implements JWT session tokens with HMAC-SHA256 signing. Every token
//! carries a unique `jti` so it can be tracked as outstanding and later
//! blacklisted, and a `token_type` claim separating access from refresh
//! tokens.

use chrono::{DateTime, TimeZone, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use portico_core::{AccountId, AuthConfig, TokenKind};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use uuid::Uuid;

/// JWT Claims structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Token issuer
    pub iss: String,
    /// Subject - account ID
    pub sub: String,
    /// JWT ID - unique token identifier for blacklisting
    pub jti: String,
    /// Issued at timestamp (Unix epoch)
    pub iat: u64,
    /// Expiration timestamp (Unix epoch)
    pub exp: u64,
    /// Access or refresh
    pub token_type: TokenKind,
}

impl Claims {
    /// Account ID from the subject claim
    pub fn account_id(&self) -> Result<AccountId, JwtError> {
        self.sub.parse().map_err(|_| JwtError::InvalidToken)
    }
}

/// JWT token generation and validation errors
#[derive(Debug, Error)]
pub enum JwtError {
    #[error("Failed to encode JWT: {0}")]
    EncodingError(#[from] jsonwebtoken::errors::Error),

    #[error("Invalid token format")]
    InvalidToken,

    #[error("Token has expired")]
    ExpiredToken,

    #[error("Invalid token signature")]
    InvalidSignature,

    #[error("Expected {expected} token")]
    WrongTokenType { expected: &'static str },

    #[error("System time error: {0}")]
    SystemTimeError(#[from] std::time::SystemTimeError),
}

/// JWT Configuration
#[derive(Debug, Clone)]
pub struct JwtConfig {
    /// Secret key for HMAC signing
    pub secret: String,
    /// Access token lifetime in seconds
    pub access_expiration_secs: u64,
    /// Refresh token lifetime in seconds
    pub refresh_expiration_secs: u64,
    /// Token issuer identifier
    pub issuer: String,
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self::from(&AuthConfig::default())
    }
}

impl From<&AuthConfig> for JwtConfig {
    fn from(auth: &AuthConfig) -> Self {
        Self {
            secret: auth.secret.clone(),
            access_expiration_secs: auth.access_expiration_secs,
            refresh_expiration_secs: auth.refresh_expiration_secs,
            issuer: auth.issuer.clone(),
        }
    }
}

impl JwtConfig {
    fn lifetime(&self, kind: TokenKind) -> u64 {
        match kind {
            TokenKind::Access => self.access_expiration_secs,
            TokenKind::Refresh => self.refresh_expiration_secs,
        }
    }
}

/// A freshly signed token with the bookkeeping needed to track it
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub jti: String,
    pub kind: TokenKind,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

fn to_datetime(secs: u64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs as i64, 0)
        .single()
        .unwrap_or_else(Utc::now)
}

/// Sign a new session token for an account
///
/// # Example
///
/// ```no_run
/// use portico_api::auth::jwt::{issue_token, JwtConfig};
/// use portico_core::TokenKind;
///
/// let config = JwtConfig::default();
/// let issued = issue_token(&config, 42, TokenKind::Access).expect("Failed to sign token");
/// println!("jti={} expires={}", issued.jti, issued.expires_at);
/// ```
pub fn issue_token(
    config: &JwtConfig,
    account_id: AccountId,
    kind: TokenKind,
) -> Result<IssuedToken, JwtError> {
    let now = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs();
    let exp = now + config.lifetime(kind);

    let claims = Claims {
        iss: config.issuer.clone(),
        sub: account_id.to_string(),
        jti: Uuid::new_v4().simple().to_string(),
        iat: now,
        exp,
        token_type: kind,
    };

    let token = encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(config.secret.as_bytes()),
    )?;

    Ok(IssuedToken {
        token,
        jti: claims.jti,
        kind,
        issued_at: to_datetime(now),
        expires_at: to_datetime(exp),
    })
}

/// Validate a token's signature, issuer, expiry and type
pub fn validate_token(
    config: &JwtConfig,
    token: &str,
    expected: TokenKind,
) -> Result<Claims, JwtError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_issuer(&[&config.issuer]);
    validation.leeway = 0;

    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.secret.as_bytes()),
        &validation,
    )
    .map_err(|e| match e.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => JwtError::ExpiredToken,
        jsonwebtoken::errors::ErrorKind::InvalidSignature => JwtError::InvalidSignature,
        _ => JwtError::InvalidToken,
    })?;

    if token_data.claims.token_type != expected {
        return Err(JwtError::WrongTokenType {
            expected: expected.as_str(),
        });
    }

    Ok(token_data.claims)
}

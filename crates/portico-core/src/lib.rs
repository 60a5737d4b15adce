//! Portico Core - Domain models, store traits, and shared types
//!
//! This crate defines the core abstractions used throughout Portico:
//! - Account, session token and entity models
//! - Common error types
//! - Store traits for accounts, session tokens and entities
//! - Field validation rules
//! - Configuration management
//! - In-memory and PostgreSQL store implementations

pub mod config;
pub mod memory;
pub mod postgres;
pub mod store;
pub mod validation;

pub use config::{
    AppConfig, AuthConfig, ConfigError, DatabaseBackend, DatabaseConfig, EmailConfig,
    EmailTransportConfig, EntitiesConfig, LoggingConfig, ServerConfig,
};
pub use memory::MemoryStore;
pub use postgres::PgStore;
pub use store::{AccountStore, EntityStore, TokenStore};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

// ============================================================================
// Error Types
// ============================================================================

/// Core error types for Portico operations
#[derive(Error, Debug)]
pub enum PorticoError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("{field} is already in use")]
    Conflict { field: UniqueField },

    #[error("Validation failed for {} field(s)", .0.len())]
    ValidationError(Vec<FieldError>),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, PorticoError>;

/// A validation problem scoped to one request field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Columns carrying a uniqueness constraint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UniqueField {
    Username,
    Email,
    /// The case-folded display alias
    AltName,
    /// Entity link
    Link,
}

impl UniqueField {
    /// Request field name this constraint reports against
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Username => "username",
            Self::Email => "email",
            Self::AltName => "alt_name",
            Self::Link => "link",
        }
    }

    /// Message shown to the caller when the constraint is violated
    pub fn conflict_message(&self) -> &'static str {
        match self {
            Self::Username => "A user with that username already exists.",
            Self::Email => "This email address is already in use.",
            Self::AltName => "This alias is already in use.",
            Self::Link => "An entity with this link already exists.",
        }
    }

    pub fn to_field_error(self) -> FieldError {
        FieldError::new(self.as_str(), self.conflict_message())
    }
}

impl std::fmt::Display for UniqueField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Accounts
// ============================================================================

/// Store-assigned account identifier
pub type AccountId = i64;

/// Persisted user account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,

    /// Opaque external identifier, assigned once at creation
    pub uid: Uuid,

    pub username: String,

    /// Display alias, case preserved
    pub alt_name: String,

    /// Lowercased alias, unique across accounts
    pub alt_name_folded: String,

    pub email: String,

    /// Argon2id PHC string, never serialized
    #[serde(skip_serializing)]
    pub password_hash: String,

    pub is_active: bool,
    pub email_validated: bool,
    pub is_staff: bool,
    pub date_joined: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

/// Case-fold an alias for uniqueness checks
pub fn fold_alias(alias: &str) -> String {
    alias.trim().to_lowercase()
}

/// Values needed to create an account; the store assigns `id` and `uid`
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub username: String,
    pub alt_name: String,
    pub email: String,
    pub password_hash: String,
    pub is_staff: bool,
}

impl NewAccount {
    pub fn alt_name_folded(&self) -> String {
        fold_alias(&self.alt_name)
    }
}

/// Replacement values for the mutable profile fields
#[derive(Debug, Clone)]
pub struct ProfileUpdate {
    pub username: String,
    pub email: String,
    pub alt_name: String,
}

// ============================================================================
// Session Tokens
// ============================================================================

/// Kind of session token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

impl TokenKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenKind::Access => "access",
            TokenKind::Refresh => "refresh",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "access" => Some(TokenKind::Access),
            "refresh" => Some(TokenKind::Refresh),
            _ => None,
        }
    }
}

/// A session token that was issued and may still be presented
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutstandingToken {
    /// JWT ID of the token
    pub jti: String,
    pub account_id: AccountId,
    pub kind: TokenKind,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// Entities
// ============================================================================

/// Store-assigned entity identifier
pub type EntityId = i64;

/// Secondary resource owned by an account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    pub name: String,
    pub link: String,
    pub views: i64,
    pub author_id: AccountId,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

/// Values needed to create an entity
#[derive(Debug, Clone)]
pub struct NewEntity {
    pub name: String,
    pub link: String,
    pub views: i64,
    pub author_id: AccountId,
}

/// Partial entity update; `None` leaves a field unchanged
#[derive(Debug, Clone, Default)]
pub struct EntityChanges {
    pub name: Option<String>,
    pub link: Option<String>,
    pub views: Option<i64>,
}

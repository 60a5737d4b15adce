//! Request and response bodies for the account endpoints
//!
//! Field names mirror the HTTP contract: registration and password forms
//! carry a `password2` confirmation, token pairs are `{refresh, access}`.

use chrono::{DateTime, Utc};
use portico_core::{Account, AccountId};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Registration form
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    /// Display alias, unique ignoring case
    pub alt_name: String,
    pub password: String,
    /// Confirmation of `password`
    pub password2: String,
}

/// Created-record echo returned by registration
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RegisterResponse {
    pub id: AccountId,
    pub username: String,
    pub email: String,
    pub alt_name: String,
    pub is_active: bool,
}

impl From<&Account> for RegisterResponse {
    fn from(account: &Account) -> Self {
        Self {
            id: account.id,
            username: account.username.clone(),
            email: account.email.clone(),
            alt_name: account.alt_name.clone(),
            is_active: account.is_active,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Session token pair
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TokenPairResponse {
    pub refresh: String,
    pub access: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RefreshRequest {
    pub refresh: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AccessResponse {
    pub access: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ChangePasswordRequest {
    pub old_password: String,
    pub password: String,
    pub password2: String,
}

/// Full replacement of the mutable profile fields
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UpdateProfileRequest {
    pub username: String,
    pub email: String,
    pub alt_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ResetPasswordRequest {
    pub password: String,
    pub password2: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Public projection of an account
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AccountPublic {
    pub id: AccountId,
    pub uid: Uuid,
    pub username: String,
    pub email: String,
    pub alt_name: String,
    pub email_validated: bool,
    pub is_staff: bool,
    pub date_joined: DateTime<Utc>,
}

impl From<Account> for AccountPublic {
    fn from(account: Account) -> Self {
        Self {
            id: account.id,
            uid: account.uid,
            username: account.username,
            email: account.email,
            alt_name: account.alt_name,
            email_validated: account.email_validated,
            is_staff: account.is_staff,
            date_joined: account.date_joined,
        }
    }
}

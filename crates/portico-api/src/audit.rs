//! Security audit logging for account events
//!
//! Every event is logged at INFO level with the "audit" target so it can be
//! filtered and routed separately from application logs. The serialized
//! event is attached as a JSON field for log aggregators.
//!
//! # Example
//!
//! ```ignore
//! use portico_api::audit::{AuditEvent, audit_log};
//!
//! audit_log(&AuditEvent::LoginSuccess {
//!     account_id: account.id,
//!     username: account.username.clone(),
//!     ip_address: Some("192.168.1.1".to_string()),
//! });
//! ```
//!
//! Author: hephaex@gmail.com

use chrono::Utc;
use portico_core::AccountId;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Security audit events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum AuditEvent {
    /// Account created, activation email pending
    Registration {
        account_id: AccountId,
        username: String,
        email: String,
        ip_address: Option<String>,
    },

    /// Registration rejected after validation or persistence failed
    RegistrationFailure {
        username: String,
        reason: String,
        ip_address: Option<String>,
    },

    /// Account activated through its emailed link
    Activation {
        account_id: AccountId,
        username: String,
        ip_address: Option<String>,
    },

    LoginSuccess {
        account_id: AccountId,
        username: String,
        ip_address: Option<String>,
    },

    LoginFailure {
        username: String,
        reason: String,
        ip_address: Option<String>,
        user_agent: Option<String>,
    },

    /// Access token issued from a refresh token
    TokenRefresh {
        account_id: AccountId,
        ip_address: Option<String>,
    },

    /// Every outstanding token of the account was blacklisted
    Logout {
        account_id: AccountId,
        tokens_blacklisted: usize,
        ip_address: Option<String>,
    },

    PasswordChange {
        account_id: AccountId,
        ip_address: Option<String>,
    },

    PasswordResetRequested {
        account_id: AccountId,
        email: String,
        ip_address: Option<String>,
    },

    PasswordResetCompleted {
        account_id: AccountId,
        ip_address: Option<String>,
    },

    ProfileUpdate {
        account_id: AccountId,
        username: String,
        ip_address: Option<String>,
    },

    /// Authenticated caller acted on a resource it does not own
    AccessDenied {
        account_id: AccountId,
        resource: String,
        ip_address: Option<String>,
    },

    /// Invalid, expired or revoked token presented
    InvalidToken {
        ip_address: Option<String>,
        user_agent: Option<String>,
        reason: String,
    },
}

impl AuditEvent {
    /// Short human-readable summary used as the log message
    pub fn summary(&self) -> &'static str {
        match self {
            AuditEvent::Registration { .. } => "Registration successful",
            AuditEvent::RegistrationFailure { .. } => "Registration failed",
            AuditEvent::Activation { .. } => "Account activated",
            AuditEvent::LoginSuccess { .. } => "Login successful",
            AuditEvent::LoginFailure { .. } => "Login failed",
            AuditEvent::TokenRefresh { .. } => "Token refresh",
            AuditEvent::Logout { .. } => "User logout",
            AuditEvent::PasswordChange { .. } => "Password changed",
            AuditEvent::PasswordResetRequested { .. } => "Password reset requested",
            AuditEvent::PasswordResetCompleted { .. } => "Password reset completed",
            AuditEvent::ProfileUpdate { .. } => "Profile updated",
            AuditEvent::AccessDenied { .. } => "Access denied",
            AuditEvent::InvalidToken { .. } => "Invalid token",
        }
    }

    /// Account the event concerns, when one is known
    pub fn account_id(&self) -> Option<AccountId> {
        match self {
            AuditEvent::Registration { account_id, .. }
            | AuditEvent::Activation { account_id, .. }
            | AuditEvent::LoginSuccess { account_id, .. }
            | AuditEvent::TokenRefresh { account_id, .. }
            | AuditEvent::Logout { account_id, .. }
            | AuditEvent::PasswordChange { account_id, .. }
            | AuditEvent::PasswordResetRequested { account_id, .. }
            | AuditEvent::PasswordResetCompleted { account_id, .. }
            | AuditEvent::ProfileUpdate { account_id, .. }
            | AuditEvent::AccessDenied { account_id, .. } => Some(*account_id),
            AuditEvent::RegistrationFailure { .. }
            | AuditEvent::LoginFailure { .. }
            | AuditEvent::InvalidToken { .. } => None,
        }
    }

    fn ip_address(&self) -> Option<&str> {
        match self {
            AuditEvent::Registration { ip_address, .. }
            | AuditEvent::RegistrationFailure { ip_address, .. }
            | AuditEvent::Activation { ip_address, .. }
            | AuditEvent::LoginSuccess { ip_address, .. }
            | AuditEvent::LoginFailure { ip_address, .. }
            | AuditEvent::TokenRefresh { ip_address, .. }
            | AuditEvent::Logout { ip_address, .. }
            | AuditEvent::PasswordChange { ip_address, .. }
            | AuditEvent::PasswordResetRequested { ip_address, .. }
            | AuditEvent::PasswordResetCompleted { ip_address, .. }
            | AuditEvent::ProfileUpdate { ip_address, .. }
            | AuditEvent::AccessDenied { ip_address, .. }
            | AuditEvent::InvalidToken { ip_address, .. } => ip_address.as_deref(),
        }
    }
}

/// Log a security audit event with structured fields
pub fn audit_log(event: &AuditEvent) {
    let timestamp = Utc::now();

    let event_json = serde_json::to_string(event)
        .unwrap_or_else(|e| format!("{{\"error\":\"Failed to serialize audit event: {e}\"}}"));

    info!(
        target: "audit",
        timestamp = %timestamp,
        event = %event_json,
        account_id = ?event.account_id(),
        ip_address = ?event.ip_address(),
        "{}",
        event.summary()
    );
}

/// Extract client IP address from request headers
///
/// Checks X-Forwarded-For (first hop), then X-Real-IP.
pub fn extract_ip_address(headers: &axum::http::HeaderMap) -> Option<String> {
    if let Some(first_ip) = headers
        .get("x-forwarded-for")
        .and_then(|xff| xff.to_str().ok())
        .and_then(|xff| xff.split(',').next())
    {
        return Some(first_ip.trim().to_string());
    }

    headers
        .get("x-real-ip")
        .and_then(|ip| ip.to_str().ok())
        .map(|s| s.to_string())
}

/// Extract user agent from request headers
pub fn extract_user_agent(headers: &axum::http::HeaderMap) -> Option<String> {
    headers
        .get(axum::http::header::USER_AGENT)
        .and_then(|ua| ua.to_str().ok())
        .map(|s| s.to_string())
}

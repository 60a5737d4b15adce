//! API error handling
//!
//! Author: hephaex@gmail.com

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use portico_core::{FieldError, PorticoError};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// A problem with one request field
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct FieldErrorBody {
    /// Request field name
    pub field: String,
    pub message: String,
}

impl From<FieldError> for FieldErrorBody {
    fn from(err: FieldError) -> Self {
        Self {
            field: err.field,
            message: err.message,
        }
    }
}

/// API error response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    /// Error code
    pub code: String,
    /// Human-readable message
    pub message: String,
    /// Additional details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    /// Field-scoped validation problems
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<FieldErrorBody>>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
            fields: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_fields(mut self, fields: Vec<FieldError>) -> Self {
        self.fields = Some(fields.into_iter().map(FieldErrorBody::from).collect());
        self
    }

    pub fn not_found(resource: &str) -> Self {
        Self::new("NOT_FOUND", format!("{resource} not found"))
    }

    pub fn unauthorized() -> Self {
        Self::new("UNAUTHORIZED", "Authentication required")
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new("FORBIDDEN", message)
    }

    pub fn internal_error() -> Self {
        Self::new("INTERNAL_ERROR", "Internal server error")
    }
}

/// Application error type
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// One or more fields failed validation
    #[error("validation failed on {} field(s)", .0.len())]
    Validation(Vec<FieldError>),
    /// Caller is authenticated but not allowed to act on the target
    #[error("forbidden: {0}")]
    Authorization(String),
    /// Supplied current password did not verify
    #[error("incorrect credential")]
    IncorrectCredential,
    /// Action token or account link is invalid or expired
    #[error("invalid token")]
    InvalidToken,
    #[error("{0} not found")]
    NotFound(String),
    /// Persisting a validated record failed
    #[error("creation failed: {0}")]
    Creation(String),
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// Outbound email could not be sent
    #[error("delivery failed: {0}")]
    Delivery(String),
    #[error("internal error: {0}")]
    Internal(String),
    #[error("database error: {0}")]
    Database(String),
}

impl AppError {
    /// Shorthand for a single-field validation failure
    pub fn field(field: &str, message: impl Into<String>) -> Self {
        AppError::Validation(vec![FieldError::new(field, message)])
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_)
            | AppError::IncorrectCredential
            | AppError::InvalidToken
            | AppError::Creation(_) => StatusCode::BAD_REQUEST,
            AppError::Authorization(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Delivery(_) => StatusCode::BAD_GATEWAY,
            AppError::Internal(_) | AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error = match self {
            AppError::Validation(fields) => {
                ApiError::new("VALIDATION_ERROR", "Invalid input").with_fields(fields)
            }
            AppError::Authorization(msg) => ApiError::forbidden(msg),
            AppError::IncorrectCredential => {
                ApiError::new("INCORRECT_CREDENTIAL", "Current password is incorrect")
            }
            AppError::InvalidToken => {
                ApiError::new("INVALID_TOKEN", "The link is invalid or has expired")
            }
            AppError::NotFound(what) => ApiError::not_found(&what),
            AppError::Creation(cause) => {
                tracing::error!(cause = %cause, "Record creation failed");
                ApiError::new("CREATION_FAILED", "Could not create the record")
            }
            AppError::Unauthorized(reason) => ApiError::unauthorized().with_details(reason),
            AppError::Delivery(cause) => {
                tracing::error!(cause = %cause, "Email delivery failed");
                ApiError::new("DELIVERY_FAILED", "Could not send email")
            }
            AppError::Internal(cause) => {
                tracing::error!(cause = %cause, "Internal error");
                ApiError::internal_error()
            }
            AppError::Database(cause) => {
                tracing::error!(cause = %cause, "Database error");
                ApiError::new("DATABASE_ERROR", "Database operation failed")
            }
        };

        (status, Json(error)).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

/// Malformed request bodies become field errors. A missing field is
/// reported under its own name, anything else under `body`.
impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        let text = rejection.body_text();
        if let Some(field) = missing_field(&text) {
            return AppError::field(field, "This field is required.");
        }
        AppError::field("body", text)
    }
}

/// Field name from serde's "missing field `name`" message
fn missing_field(text: &str) -> Option<&str> {
    let rest = &text[text.find("missing field `")? + "missing field `".len()..];
    rest.find('`').map(|end| &rest[..end])
}

impl From<PorticoError> for AppError {
    fn from(err: PorticoError) -> Self {
        match err {
            PorticoError::NotFound(msg) => AppError::NotFound(msg),
            PorticoError::Conflict { field } => AppError::Validation(vec![field.to_field_error()]),
            PorticoError::ValidationError(fields) => AppError::Validation(fields),
            PorticoError::DatabaseError(msg) => AppError::Database(msg),
            PorticoError::ConfigError(msg) => {
                AppError::Internal(format!("Configuration error: {msg}"))
            }
            PorticoError::Other(err) => AppError::Internal(err.to_string()),
        }
    }
}
